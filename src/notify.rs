//! Messages exchanged with the display and the dispatcher that emits them
//!
//! Each message is one JSON object with a `notification` name and an optional
//! `payload`, mirroring the display's socket notifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::aggregator::AggregateResult;
use crate::config::InitConfig;
use crate::data::{Reading, SourceData};

/// Messages sent from the display
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "notification", content = "payload")]
pub enum Inbound {
    /// Establishes the source set and unit system; required before any cycle
    #[serde(rename = "MMM-RemoteTemperature.INIT")]
    Init(InitConfig),
    /// Forces an immediate cycle outside the schedule
    #[serde(rename = "MMM-RemoteTemperature.FETCH")]
    FetchNow,
}

/// Messages sent to the display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notification", content = "payload")]
pub enum Outbound {
    /// Full per-source snapshot for one cycle
    #[serde(rename = "MMM-RemoteTemperature.VALUE_RECEIVED")]
    Data(BTreeMap<String, SourceData>),
    /// Cross-source average temperature
    #[serde(rename = "INDOOR_TEMPERATURE")]
    Aggregate { temperature: Reading },
}

/// Forwards finished cycles to the display
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Outbound>,
}

impl Dispatcher {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// Sends the complete snapshot as one push, then the aggregate if there is one
    ///
    /// A cycle where every source failed is still pushed, as error markers.
    pub async fn dispatch(&self, result: &AggregateResult) {
        let data = Outbound::Data(result.per_source.clone());
        if self.tx.send(data).await.is_err() {
            warn!("display channel closed, dropping data push");
            return;
        }

        if let Some(derived) = &result.derived {
            let aggregate = Outbound::Aggregate {
                temperature: derived.average_temperature,
            };
            if self.tx.send(aggregate).await.is_err() {
                warn!("display channel closed, dropping aggregate push");
                return;
            }
        }
        debug!(sources = result.per_source.len(), "dispatched cycle");
    }
}
