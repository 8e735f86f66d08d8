mod aranet4;
mod eve_room;

use std::time::Duration;

use anyhow::{Context as _, Result};

pub use aranet4::*;
pub use eve_room::*;

use crate::{
    config::{DeviceConfig, DeviceKind, HomeAssistantConfig},
    error::IngestError,
    reading::RawReading,
};

/// Fetches the current values of one physical sensor. Each call opens and
/// closes its own connection and never retries.
#[allow(async_fn_in_trait)]
pub trait SensorReader {
    async fn read(&self, device: &DeviceConfig) -> Result<RawReading, IngestError>;
}

#[derive(Debug)]
pub enum Sensor {
    Aranet4(Aranet4Reader),
    EveRoom(EveRoomReader),
}

impl Sensor {
    pub fn new(
        device: &DeviceConfig,
        home_assistant: &HomeAssistantConfig,
        timeout: Duration,
    ) -> Result<Self> {
        match device.kind {
            DeviceKind::Aranet4 => Ok(Sensor::Aranet4(Aranet4Reader::new(timeout))),
            DeviceKind::EveRoom => {
                let token = home_assistant
                    .token
                    .clone()
                    .context("HA_TOKEN must be set for an eve-room sensor")?;
                let reader = EveRoomReader::new(&home_assistant.url, token, timeout)
                    .context("failed to build Home Assistant client")?;

                Ok(Sensor::EveRoom(reader))
            }
        }
    }
}

impl SensorReader for Sensor {
    async fn read(&self, device: &DeviceConfig) -> Result<RawReading, IngestError> {
        match self {
            Sensor::Aranet4(reader) => reader.read(device).await,
            Sensor::EveRoom(reader) => reader.read(device).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceId;

    fn home_assistant(token: Option<&str>) -> HomeAssistantConfig {
        HomeAssistantConfig {
            url: "http://homeassistant.local:8123".to_string(),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn eve_room_requires_token() {
        let device = DeviceConfig::new(
            DeviceKind::EveRoom,
            DeviceId::Entity("sensor.eve_room_1c22".to_string()),
            "eve_room_1c22",
            "bedroom",
        );

        assert!(Sensor::new(&device, &home_assistant(None), Duration::from_secs(5)).is_err());
        assert!(matches!(
            Sensor::new(&device, &home_assistant(Some("t")), Duration::from_secs(5)),
            Ok(Sensor::EveRoom(_))
        ));
    }

    #[test]
    fn aranet4_needs_no_hub() {
        let device = DeviceConfig::new(
            DeviceKind::Aranet4,
            DeviceId::Mac("DF:C1:53:75:BA:4E".parse().unwrap()),
            "aranet4",
            "office",
        );

        assert!(matches!(
            Sensor::new(&device, &home_assistant(None), Duration::from_secs(5)),
            Ok(Sensor::Aranet4(_))
        ));
    }
}
