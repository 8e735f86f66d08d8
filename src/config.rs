use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Context as _, Error, Result, bail};
use clap::Args;
use macaddr::MacAddr6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Aranet4,
    EveRoom,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Aranet4 => "aranet4",
            DeviceKind::EveRoom => "eve-room",
        }
    }

    pub fn measurement(&self) -> &'static str {
        match self {
            DeviceKind::Aranet4 => "aranet4_readings",
            DeviceKind::EveRoom => "eve_room_readings",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aranet4" => Ok(DeviceKind::Aranet4),
            "eve-room" | "eve_room" => Ok(DeviceKind::EveRoom),
            _ => bail!("unknown sensor kind: {}", s),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the physical sensor is addressed: a BLE MAC address, or the entity
/// prefix a home-automation hub exposes it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    Mac(MacAddr6),
    Entity(String),
}

impl DeviceId {
    pub fn tag_key(&self) -> &'static str {
        match self {
            DeviceId::Mac(_) => "mac_address",
            DeviceId::Entity(_) => "entity_id",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Mac(mac) => write!(f, "{mac}"),
            DeviceId::Entity(entity) => f.write_str(entity),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub kind: DeviceKind,

    pub id: DeviceId,

    pub name: String,

    pub location: String,

    pub measurement: String,
}

impl DeviceConfig {
    pub fn new(
        kind: DeviceKind,
        id: DeviceId,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
            location: location.into(),
            measurement: kind.measurement().to_string(),
        }
    }
}

#[derive(Clone, Args)]
pub struct InfluxConfig {
    #[arg(id = "influx_url", long = "influx-url", env = "INFLUX_URL")]
    pub url: String,

    #[arg(id = "influx_token", long = "influx-token", env = "INFLUXDB_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(id = "influx_org", long = "influx-org", env = "INFLUX_ORG")]
    pub org: String,

    #[arg(id = "influx_bucket", long = "influx-bucket", env = "INFLUX_BUCKET")]
    pub bucket: String,

    #[arg(long = "write-timeout-secs", env = "WRITE_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl InfluxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Args)]
pub struct HomeAssistantConfig {
    #[arg(id = "ha_url", long = "ha-url", env = "HA_URL", default_value = "http://homeassistant.local:8123")]
    pub url: String,

    #[arg(id = "ha_token", long = "ha-token", env = "HA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl fmt::Debug for HomeAssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    #[arg(long = "sensor", env = "SENSOR_KIND", default_value = "aranet4")]
    pub kind: DeviceKind,

    #[arg(long, env = "ARANET_MAC")]
    pub aranet_mac: Option<MacAddr6>,

    #[arg(long, env = "EVE_DEVICE_NAME")]
    pub eve_device_name: Option<String>,

    #[arg(long, env = "DEVICE_NAME")]
    pub device_name: Option<String>,

    #[arg(long, env = "LOCATION")]
    pub location: String,
}

impl DeviceArgs {
    pub fn into_device_config(self) -> Result<DeviceConfig> {
        // Both end up as tag values, which InfluxDB rejects when empty.
        if self.location.trim().is_empty() {
            bail!("LOCATION must not be empty");
        }
        if let Some(name) = &self.device_name
            && name.trim().is_empty()
        {
            bail!("DEVICE_NAME must not be empty when set");
        }

        match self.kind {
            DeviceKind::Aranet4 => {
                let mac = self
                    .aranet_mac
                    .context("ARANET_MAC must be set for an aranet4 sensor")?;
                let name = self.device_name.unwrap_or_else(|| "aranet4".to_string());

                Ok(DeviceConfig::new(
                    self.kind,
                    DeviceId::Mac(mac),
                    name,
                    self.location,
                ))
            }
            DeviceKind::EveRoom => {
                let eve_name = self
                    .eve_device_name
                    .context("EVE_DEVICE_NAME must be set for an eve-room sensor")?;
                if eve_name.trim().is_empty() || eve_name.contains('.') {
                    bail!("EVE_DEVICE_NAME must be a bare entity name, got {eve_name:?}");
                }
                let name = self.device_name.unwrap_or_else(|| eve_name.clone());

                Ok(DeviceConfig::new(
                    self.kind,
                    DeviceId::Entity(format!("sensor.{eve_name}")),
                    name,
                    self.location,
                ))
            }
        }
    }
}
