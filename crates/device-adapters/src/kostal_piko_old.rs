//! Kostal Piko inverters of the first generation, read from their HTML status page.
//! Exported energy comes from a simulated counter.

use std::sync::Arc;

use http_client::HttpSource;
use simcount::{CounterIdentity, SimCounter};
use tracing::debug;
use types::InverterState;

use crate::{AdapterError, ComponentContext, ComponentInfo, ComponentKind, ValueStore};

const PAGE_PATH: &str = "index.fhtml";
const POWER_LABEL: &str = "aktuell";
/// What the page shows in place of a value while the inverter is off.
const OFF_MARKER: &str = "x x x";

#[derive(Debug, Clone)]
pub struct KostalPikoOldInverterSetup {
    pub id: u32,
    pub name: String,
}

impl KostalPikoOldInverterSetup {
    pub async fn initialize(
        self,
        http: Arc<dyn HttpSource>,
        store: Arc<dyn ValueStore<InverterState>>,
        context: &ComponentContext,
    ) -> Result<KostalPikoOldInverter, AdapterError> {
        let sim_counter = SimCounter::load(
            CounterIdentity::new(context.device_id, self.id, "inverter"),
            context.counters.clone(),
            context.sim_count.clone(),
        )
        .await?;

        Ok(KostalPikoOldInverter {
            info: context.info(self.id, &self.name, ComponentKind::Inverter),
            http,
            store,
            sim_counter,
        })
    }
}

pub struct KostalPikoOldInverter {
    info: ComponentInfo,
    http: Arc<dyn HttpSource>,
    store: Arc<dyn ValueStore<InverterState>>,
    sim_counter: SimCounter,
}

impl KostalPikoOldInverter {
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub async fn update(&mut self) -> Result<(), AdapterError> {
        let page = self.http.get_text(PAGE_PATH).await?;
        self.apply(&page).await
    }

    /// Normalizes one status page and stores it.
    pub async fn apply(&mut self, page: &str) -> Result<(), AdapterError> {
        // Production is negative; an inverter that is off produces nothing.
        let power = parse_power(page)?.map_or(0, |watts| -watts);
        let (imported, exported) = self.sim_counter.sim_count(-power).await?;

        debug!(component = %self.info.name, power, exported, "inverter normalized");
        self.store.set(InverterState {
            power,
            dc_power: None,
            currents: None,
            imported,
            exported,
        });
        Ok(())
    }
}

/// AC power in W from the "aktuell" row, `None` while the inverter is off.
fn parse_power(page: &str) -> Result<Option<i64>, AdapterError> {
    let cell = cell_after(page, POWER_LABEL).ok_or_else(|| AdapterError::Parse {
        field: POWER_LABEL,
        detail: "row not found".to_string(),
    })?;

    if cell == OFF_MARKER {
        return Ok(None);
    }
    cell.parse::<i64>()
        .map(Some)
        .map_err(|_| AdapterError::Parse {
            field: POWER_LABEL,
            detail: format!("'{cell}' is not a number"),
        })
}

/// Text of the table cell following the cell labelled `label`, without markup and
/// non-breaking spaces.
fn cell_after<'a>(page: &'a str, label: &str) -> Option<&'a str> {
    let label_at = page.find(label)?;
    let rest = &page[label_at + label.len()..];
    let cell_start = rest.find("<td")?;
    let rest = &rest[cell_start..];
    let content_start = rest.find('>')? + 1;
    let rest = &rest[content_start..];
    let content_end = rest.find("</td>")?;

    let content = rest[..content_end].trim();
    let content = content.trim_end_matches(';');
    let content = content.trim_end_matches("&nbsp").trim();
    Some(content)
}
