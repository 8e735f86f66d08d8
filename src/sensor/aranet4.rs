mod history;

use std::{collections::BTreeSet, fmt::Display, future::Future, time::Duration};

use anyhow::{Result, anyhow, bail};
use btleplug::{
    api::{
        Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        WriteType,
    },
    platform::{Adapter, Manager, Peripheral},
};
use macaddr::MacAddr6;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_stream::StreamExt as _;
use tracing::{debug, info, warn};
use uuid::{Uuid, uuid};

pub use history::*;

use crate::{
    config::{DeviceConfig, DeviceId},
    error::IngestError,
    reading::{Quantity, RawReading, Unit},
    sensor::SensorReader,
};

// Ref: https://github.com/Anrijs/Aranet4-Python/blob/master/docs/UUIDs.md
const CURRENT_READINGS_DETAILED_UUID: Uuid = uuid!("f0cd3001-95da-4f4b-9ac8-aa55d312af0c");
const CURRENT_READINGS_UUID: Uuid = uuid!("f0cd1503-95da-4f4b-9ac8-aa55d312af0c");

const CURRENT_READINGS_LEN: usize = 9;
const CURRENT_READINGS_DETAILED_LEN: usize = 13;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct Aranet4Current {
    pub co2_ppm: u16,
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
    pub humidity_percent: u8,
    pub battery_percent: u8,
    pub status: u8,
    pub interval_secs: Option<u16>,
    pub age_secs: Option<u16>,
}

impl Aranet4Current {
    pub fn to_raw(&self) -> RawReading {
        RawReading::new()
            .with(Quantity::Co2, self.co2_ppm as f64, Unit::Ppm)
            .with(
                Quantity::Temperature,
                self.temperature_celsius as f64,
                Unit::Celsius,
            )
            .with(Quantity::Pressure, self.pressure_hpa as f64, Unit::HectoPascal)
            .with(Quantity::Humidity, self.humidity_percent as f64, Unit::Percent)
            .with(Quantity::Battery, self.battery_percent as f64, Unit::Percent)
    }
}

pub fn decode_current_readings(data: &[u8]) -> Result<Aranet4Current> {
    if data.len() < CURRENT_READINGS_LEN {
        bail!(
            "Aranet4 current readings too short: expected at least {CURRENT_READINGS_LEN} bytes, got {}",
            data.len()
        )
    }

    let co2_ppm = u16::from_le_bytes([data[0], data[1]]);
    let temperature_celsius = u16::from_le_bytes([data[2], data[3]]) as f32 / 20f32;
    let pressure_hpa = u16::from_le_bytes([data[4], data[5]]) as f32 / 10f32;
    let humidity_percent = data[6];
    let battery_percent = data[7];
    let status = data[8];

    let (interval_secs, age_secs) = if data.len() >= CURRENT_READINGS_DETAILED_LEN {
        (
            Some(u16::from_le_bytes([data[9], data[10]])),
            Some(u16::from_le_bytes([data[11], data[12]])),
        )
    } else {
        (None, None)
    };

    Ok(Aranet4Current {
        co2_ppm,
        temperature_celsius,
        pressure_hpa,
        humidity_percent,
        battery_percent,
        status,
        interval_secs,
        age_secs,
    })
}

#[derive(Debug, Clone)]
pub struct Aranet4Reader {
    timeout: Duration,
}

impl Aranet4Reader {
    /// `timeout` bounds a whole session, from adapter setup to the last read.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Scans for `mac`, connects and discovers its services. Every step shares
    /// one deadline; the caller must `close` the returned connection.
    async fn connect(
        &self,
        mac: MacAddr6,
        name: &str,
    ) -> Result<Aranet4Connection, IngestError> {
        let deadline = Instant::now() + self.timeout;

        let adapter = within(deadline, name, "Bluetooth adapter setup", async {
            first_adapter()
                .await
                .map_err(|e| IngestError::unreachable(name, format!("{e:#}")))
        })
        .await?;

        info!(device = name, %mac, "scanning for Aranet4");
        let found = within(deadline, name, &format!("scan for {mac}"), async {
            find_peripheral(&adapter, mac)
                .await
                .map_err(|e| classify_ble_error(name, e))
        })
        .await;
        cleanup(name, "stop BLE scan", adapter.stop_scan()).await;

        let connection = Aranet4Connection {
            peripheral: found?,
            characteristics: BTreeSet::new(),
            name: name.to_string(),
            deadline,
        };

        let connected = within(deadline, name, "connect", async {
            connection
                .peripheral
                .connect()
                .await
                .map_err(|e| classify_ble_error(name, e))?;
            connection
                .peripheral
                .discover_services()
                .await
                .map_err(|e| classify_ble_error(name, e))?;
            Ok::<_, IngestError>(())
        })
        .await;

        if let Err(err) = connected {
            connection.close().await;
            return Err(err);
        }

        let characteristics = connection.peripheral.characteristics();
        Ok(Aranet4Connection {
            characteristics,
            ..connection
        })
    }

    async fn read_current(&self, mac: MacAddr6, name: &str) -> Result<Aranet4Current, IngestError> {
        let connection = self.connect(mac, name).await?;

        let payload = match find_current_readings(&connection.characteristics) {
            Some(characteristic) => connection.read(characteristic).await,
            None => Err(IngestError::unreachable(
                name,
                "current readings characteristic not found",
            )),
        };
        connection.close().await;

        let payload = payload?;
        debug!(device = name, payload = ?payload, "read Aranet4 current readings");

        decode_current_readings(&payload).map_err(|e| IngestError::invalid(name, format!("{e:#}")))
    }
}

impl SensorReader for Aranet4Reader {
    async fn read(&self, device: &DeviceConfig) -> Result<RawReading, IngestError> {
        let mac = ble_address(device)?;

        let current = self.read_current(mac, &device.name).await?;
        info!(
            device = %device.name,
            co2 = current.co2_ppm,
            temperature_c = current.temperature_celsius,
            "read from Aranet4"
        );

        Ok(current.to_raw())
    }
}

/// A connected Aranet4 with its services discovered.
struct Aranet4Connection {
    peripheral: Peripheral,
    characteristics: BTreeSet<Characteristic>,
    name: String,
    deadline: Instant,
}

impl Aranet4Connection {
    fn name(&self) -> &str {
        &self.name
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, IngestError> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| {
                IngestError::unreachable(&self.name, format!("characteristic {uuid} not found"))
            })
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, IngestError> {
        within(self.deadline, &self.name, "read", async {
            self.peripheral
                .read(characteristic)
                .await
                .map_err(|e| classify_ble_error(&self.name, e))
        })
        .await
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
    ) -> Result<(), IngestError> {
        within(self.deadline, &self.name, "write", async {
            self.peripheral
                .write(characteristic, data, WriteType::WithResponse)
                .await
                .map_err(|e| classify_ble_error(&self.name, e))
        })
        .await
    }

    async fn close(self) {
        cleanup(&self.name, "disconnect", self.peripheral.disconnect()).await;
    }
}

fn ble_address(device: &DeviceConfig) -> Result<MacAddr6, IngestError> {
    match device.id {
        DeviceId::Mac(mac) => Ok(mac),
        _ => Err(IngestError::unreachable(
            &device.name,
            format!("not addressable over BLE: {}", device.id),
        )),
    }
}

/// Runs one step of a session, failing with `DeviceUnreachable` once `deadline` has passed.
async fn within<T>(
    deadline: Instant,
    name: &str,
    step: &str,
    fut: impl Future<Output = Result<T, IngestError>>,
) -> Result<T, IngestError> {
    timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| Err(IngestError::unreachable(name, format!("{step} timed out"))))
}

/// Best effort: a hung adapter must not hold the process past the session deadline.
async fn cleanup<E: Display>(
    name: &str,
    step: &str,
    fut: impl Future<Output = Result<(), E>>,
) {
    match timeout(CLEANUP_TIMEOUT, fut).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(device = name, "failed to {step}: {err}"),
        Err(_) => warn!(
            device = name,
            "{step} did not finish within {}s",
            CLEANUP_TIMEOUT.as_secs()
        ),
    }
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| anyhow!("failed to initialize Bluetooth manager: {e}"))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|e| anyhow!("failed to get Bluetooth adapters: {e}"))?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no Bluetooth adapters found"))
}

async fn find_peripheral(adapter: &Adapter, mac: MacAddr6) -> btleplug::Result<Peripheral> {
    let mut events = adapter.events().await?;

    adapter.start_scan(ScanFilter::default()).await?;

    // BlueZ already lists peripherals it has bonded with.
    for peripheral in adapter.peripherals().await? {
        if peripheral_mac(&peripheral) == mac {
            return Ok(peripheral);
        }
    }

    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };

        let peripheral = adapter.peripheral(&id).await?;
        if peripheral_mac(&peripheral) == mac {
            return Ok(peripheral);
        }
    }

    Err(btleplug::Error::DeviceNotFound)
}

fn find_current_readings(characteristics: &BTreeSet<Characteristic>) -> Option<&Characteristic> {
    [CURRENT_READINGS_DETAILED_UUID, CURRENT_READINGS_UUID]
        .iter()
        .find_map(|uuid| characteristics.iter().find(|c| c.uuid == *uuid))
}

fn peripheral_mac(peripheral: &Peripheral) -> MacAddr6 {
    peripheral.address().into_inner().into()
}

fn classify_ble_error(name: &str, err: btleplug::Error) -> IngestError {
    match err {
        btleplug::Error::PermissionDenied => IngestError::authentication_required(name, err),
        err if is_authentication_failure(&err.to_string()) => {
            IngestError::authentication_required(name, err)
        }
        err => IngestError::unreachable(name, err),
    }
}

/// BlueZ and CoreBluetooth report missing pairing as free-form text.
fn is_authentication_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();

    ["authentication", "encryption", "not permitted", "notpermitted", "not paired"]
        .iter()
        .any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    // co2=450, 22.3 °C (446/20), 1013.2 hPa, 40 %, 90 %, status 1, interval 300 s, age 42 s
    const DETAILED: [u8; 13] = [
        0xc2, 0x01, 0xbe, 0x01, 0x94, 0x27, 0x28, 0x5a, 0x01, 0x2c, 0x01, 0x2a, 0x00,
    ];

    #[test]
    fn decodes_detailed_readings() {
        let current = decode_current_readings(&DETAILED).unwrap();

        assert_eq!(current.co2_ppm, 450);
        assert!((current.temperature_celsius - 22.3).abs() < 1e-4);
        assert!((current.pressure_hpa - 1013.2).abs() < 1e-3);
        assert_eq!(current.humidity_percent, 40);
        assert_eq!(current.battery_percent, 90);
        assert_eq!(current.status, 1);
        assert_eq!(current.interval_secs, Some(300));
        assert_eq!(current.age_secs, Some(42));
    }

    #[test]
    fn decodes_simple_readings() {
        let current = decode_current_readings(&DETAILED[..9]).unwrap();

        assert_eq!(current.co2_ppm, 450);
        assert_eq!(current.interval_secs, None);
        assert_eq!(current.age_secs, None);
    }

    #[test]
    fn rejects_short_payload() {
        assert!(decode_current_readings(&DETAILED[..8]).is_err());
        assert!(decode_current_readings(&[]).is_err());
    }

    #[test]
    fn raw_reading_carries_vendor_units() {
        let raw = decode_current_readings(&DETAILED).unwrap().to_raw();

        assert_eq!(raw.measures.len(), 5);
        assert_eq!(raw.get(Quantity::Temperature).unwrap().unit, Unit::Celsius);
        assert_eq!(raw.get(Quantity::Pressure).unwrap().unit, Unit::HectoPascal);
        assert_eq!(raw.get(Quantity::Co2).unwrap().value, 450.0);
    }

    #[test]
    fn detects_authentication_failures() {
        assert!(is_authentication_failure(
            "org.bluez.Error.Failed: Operation failed with ATT error: 0x05 (Insufficient Authentication)"
        ));
        assert!(is_authentication_failure("org.bluez.Error.NotPermitted: Read not permitted"));
        assert!(is_authentication_failure("Insufficient Encryption"));
        assert!(!is_authentication_failure("Device not found"));
        assert!(!is_authentication_failure("Timed out after 30s"));
    }

    #[test]
    fn permission_denied_requires_authentication() {
        let err = classify_ble_error("eve", btleplug::Error::PermissionDenied);
        assert!(matches!(err, IngestError::AuthenticationRequired { .. }));

        let err = classify_ble_error("aranet4", btleplug::Error::DeviceNotFound);
        assert!(matches!(err, IngestError::DeviceUnreachable { .. }));
    }

    async fn slow_step() -> Result<(), IngestError> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        Ok(())
    }

    #[tokio::test]
    async fn steps_share_one_deadline() {
        let deadline = Instant::now() + Duration::from_millis(200);

        assert!(within(deadline, "aranet4", "scan", slow_step()).await.is_ok());

        // Each step alone fits in the budget, the second one no longer does.
        let err = within(deadline, "aranet4", "read", slow_step())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::DeviceUnreachable { .. }));
        assert!(err.to_string().contains("read timed out"));
    }

    #[tokio::test]
    async fn hung_step_is_unreachable() {
        let deadline = Instant::now() + Duration::from_millis(50);

        let err = within(
            deadline,
            "aranet4",
            "Bluetooth adapter setup",
            std::future::pending::<Result<(), IngestError>>(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IngestError::DeviceUnreachable { .. }));
    }

    #[test]
    fn eve_room_has_no_ble_address() {
        let device = DeviceConfig::new(
            crate::config::DeviceKind::EveRoom,
            DeviceId::Entity("sensor.eve_room_1c22".to_string()),
            "eve_room_1c22",
            "bedroom",
        );

        assert!(matches!(
            ble_address(&device),
            Err(IngestError::DeviceUnreachable { .. })
        ));
    }
}
