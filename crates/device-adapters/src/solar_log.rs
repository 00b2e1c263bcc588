//! Solar-Log data logger acting as the grid meter. The logger only reports power, so
//! energy totals come from a simulated counter.

use std::sync::Arc;

use http_client::HttpSource;
use serde_json::{json, Value};
use simcount::{CounterIdentity, SimCounter};
use tracing::debug;
use types::CounterState;

use crate::{AdapterError, ComponentContext, ComponentInfo, ComponentKind, ValueStore};

const REQUEST_PATH: &str = "getjp";
const POWER_FIELD: &str = "801.170.110";

#[derive(Debug, Clone)]
pub struct SolarLogCounterSetup {
    pub id: u32,
    pub name: String,
}

impl SolarLogCounterSetup {
    pub async fn initialize(
        self,
        http: Arc<dyn HttpSource>,
        store: Arc<dyn ValueStore<CounterState>>,
        context: &ComponentContext,
    ) -> Result<SolarLogCounter, AdapterError> {
        let sim_counter = SimCounter::load(
            CounterIdentity::new(context.device_id, self.id, "grid"),
            context.counters.clone(),
            context.sim_count.clone(),
        )
        .await?;

        Ok(SolarLogCounter {
            info: context.info(self.id, &self.name, ComponentKind::Counter),
            http,
            store,
            sim_counter,
        })
    }
}

pub struct SolarLogCounter {
    info: ComponentInfo,
    http: Arc<dyn HttpSource>,
    store: Arc<dyn ValueStore<CounterState>>,
    sim_counter: SimCounter,
}

impl SolarLogCounter {
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub async fn update(&mut self) -> Result<(), AdapterError> {
        let response = self
            .http
            .post_json(REQUEST_PATH, &json!({"801": {"170": null}}))
            .await?;
        self.apply(&response).await
    }

    /// Normalizes one logger response and stores it.
    pub async fn apply(&mut self, response: &Value) -> Result<(), AdapterError> {
        let power = parse_power(response)?;
        // Consumption from the grid is positive; the counter books it as imported.
        let (imported, exported) = self.sim_counter.sim_count(-power).await?;

        debug!(component = %self.info.name, power, imported, exported, "counter normalized");
        self.store.set(CounterState {
            power,
            imported,
            exported,
        });
        Ok(())
    }
}

/// Whole watts of the consumption power field. The logger sends numbers or numeric strings.
fn parse_power(response: &Value) -> Result<i64, AdapterError> {
    let field = &response["801"]["170"]["110"];
    let watts = match field {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match watts {
        Some(watts) if watts.is_finite() => Ok(watts.trunc() as i64),
        _ => Err(AdapterError::Parse {
            field: POWER_FIELD,
            detail: format!("expected a number, got {field}"),
        }),
    }
}
