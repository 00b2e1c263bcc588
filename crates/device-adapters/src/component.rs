use crate::kostal_piko_old::KostalPikoOldInverter;
use crate::sma::{SmaSunnyBoyBat, SmaSunnyBoyInverter, SmaSunnyIslandBat};
use crate::solar_log::SolarLogCounter;
use crate::{AdapterError, ComponentInfo};

/// A ready adapter of any supported family.
pub enum Component {
    SmaSunnyBoyInverter(SmaSunnyBoyInverter),
    SmaSunnyBoyBat(SmaSunnyBoyBat),
    SmaSunnyIslandBat(SmaSunnyIslandBat),
    SolarLogCounter(SolarLogCounter),
    KostalPikoOldInverter(KostalPikoOldInverter),
}

impl Component {
    pub fn info(&self) -> &ComponentInfo {
        match self {
            Component::SmaSunnyBoyInverter(component) => component.info(),
            Component::SmaSunnyBoyBat(component) => component.info(),
            Component::SmaSunnyIslandBat(component) => component.info(),
            Component::SolarLogCounter(component) => component.info(),
            Component::KostalPikoOldInverter(component) => component.info(),
        }
    }

    /// Runs one polling cycle. Calls for the same component must not overlap.
    pub async fn update(&mut self) -> Result<(), AdapterError> {
        match self {
            Component::SmaSunnyBoyInverter(component) => component.update().await,
            Component::SmaSunnyBoyBat(component) => component.update().await,
            Component::SmaSunnyIslandBat(component) => component.update().await,
            Component::SolarLogCounter(component) => component.update().await,
            Component::KostalPikoOldInverter(component) => component.update().await,
        }
    }
}

impl From<SmaSunnyBoyInverter> for Component {
    fn from(component: SmaSunnyBoyInverter) -> Self {
        Component::SmaSunnyBoyInverter(component)
    }
}

impl From<SmaSunnyBoyBat> for Component {
    fn from(component: SmaSunnyBoyBat) -> Self {
        Component::SmaSunnyBoyBat(component)
    }
}

impl From<SmaSunnyIslandBat> for Component {
    fn from(component: SmaSunnyIslandBat) -> Self {
        Component::SmaSunnyIslandBat(component)
    }
}

impl From<SolarLogCounter> for Component {
    fn from(component: SolarLogCounter) -> Self {
        Component::SolarLogCounter(component)
    }
}

impl From<KostalPikoOldInverter> for Component {
    fn from(component: KostalPikoOldInverter) -> Self {
        Component::KostalPikoOldInverter(component)
    }
}
