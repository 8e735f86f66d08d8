use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    config::{DeviceConfig, DeviceId},
    error::IngestError,
    reading::{Quantity, RawMeasure, RawReading, Unit},
    sensor::SensorReader,
};

/// Entity suffixes Home Assistant's HomeKit integration creates for an Eve Room.
const ENTITY_SUFFIXES: &[(&str, Quantity)] = &[
    ("temperature", Quantity::Temperature),
    ("humidity", Quantity::Humidity),
    ("voc", Quantity::Voc),
    ("battery", Quantity::Battery),
];

#[derive(Debug, Deserialize)]
pub struct EntityState {
    pub entity_id: String,

    pub state: String,

    #[serde(default)]
    pub attributes: EntityAttributes,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntityAttributes {
    pub unit_of_measurement: Option<String>,
}

impl EntityState {
    /// `None` when the hub has no usable value (offline sensor, unknown unit).
    pub fn to_measure(&self, quantity: Quantity) -> Option<RawMeasure> {
        let value: f64 = self.state.trim().parse().ok()?;
        let unit = match &self.attributes.unit_of_measurement {
            Some(symbol) => Unit::from_symbol(symbol)?,
            None => default_unit(quantity)?,
        };

        Some(RawMeasure {
            quantity,
            value,
            unit,
        })
    }
}

fn default_unit(quantity: Quantity) -> Option<Unit> {
    match quantity {
        Quantity::Humidity | Quantity::Battery => Some(Unit::Percent),
        _ => None,
    }
}

/// Reads an Eve Room through Home Assistant's REST API, since HomeKit
/// encryption blocks direct BLE attribute reads.
#[derive(Debug, Clone)]
pub struct EveRoomReader {
    http: Client,
    base_url: String,
    token: String,
}

impl EveRoomReader {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn fetch_state(
        &self,
        name: &str,
        entity_id: &str,
    ) -> Result<Option<EntityState>, IngestError> {
        let url = state_url(&self.base_url, entity_id);
        debug!(device = name, %url, "fetching entity state");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| IngestError::unreachable(name, format!("Home Assistant: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                IngestError::authentication_required(
                    name,
                    format!("Home Assistant rejected HA_TOKEN ({})", response.status()),
                ),
            ),
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let state = response.json::<EntityState>().await.map_err(|e| {
                    IngestError::unreachable(name, format!("malformed state for {entity_id}: {e}"))
                })?;
                Ok(Some(state))
            }
            status => Err(IngestError::unreachable(
                name,
                format!("Home Assistant responded {status} for {entity_id}"),
            )),
        }
    }
}

impl SensorReader for EveRoomReader {
    async fn read(&self, device: &DeviceConfig) -> Result<RawReading, IngestError> {
        let DeviceId::Entity(prefix) = &device.id else {
            return Err(IngestError::unreachable(
                &device.name,
                format!("not a Home Assistant entity: {}", device.id),
            ));
        };

        let mut raw = RawReading::new();
        for (suffix, quantity) in ENTITY_SUFFIXES {
            let entity_id = format!("{prefix}_{suffix}");

            let Some(state) = self.fetch_state(&device.name, &entity_id).await? else {
                debug!(device = %device.name, %entity_id, "entity not found");
                continue;
            };

            match state.to_measure(*quantity) {
                Some(measure) => raw.measures.push(measure),
                None => warn!(
                    device = %device.name,
                    %entity_id,
                    state = %state.state,
                    unit = ?state.attributes.unit_of_measurement,
                    "entity has no usable value"
                ),
            }
        }

        if raw.is_empty() {
            return Err(IngestError::unreachable(
                &device.name,
                format!("no entity under {prefix} reported a value"),
            ));
        }

        info!(device = %device.name, quantities = raw.measures.len(), "read from Home Assistant");
        Ok(raw)
    }
}

fn state_url(base_url: &str, entity_id: &str) -> String {
    format!("{base_url}/api/states/{entity_id}")
}
