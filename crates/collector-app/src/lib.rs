pub mod config;
pub mod sinks;
pub mod wiring;

pub use config::{CollectorConfig, ComponentConfig, DeviceConfig, DeviceFamily};
pub use sinks::{ComponentState, StateBoard, TracingFaultSink};
pub use wiring::{
    initialize_components, isolate_panics, plan_devices, Collaborators, DevicePlan, Transport,
};
