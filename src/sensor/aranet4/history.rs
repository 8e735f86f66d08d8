use anyhow::{Result, bail};
use btleplug::api::Characteristic;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use uuid::{Uuid, uuid};

use super::{Aranet4Connection, Aranet4Reader, ble_address};
use crate::{
    config::DeviceConfig,
    error::IngestError,
    reading::{Quantity, RawReading, Unit},
};

// Ref: https://github.com/Anrijs/Aranet4-Python/blob/master/docs/UUIDs.md
const COMMAND_UUID: Uuid = uuid!("f0cd1402-95da-4f4b-9ac8-aa55d312af0c");
const HISTORY_V2_UUID: Uuid = uuid!("f0cd2005-95da-4f4b-9ac8-aa55d312af0c");

const HISTORY_REQUEST: u8 = 0x61;
const HISTORY_HEADER_LEN: usize = 10;
const MAX_STALE_RESPONSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryParam {
    Temperature = 1,
    Humidity = 2,
    Pressure = 3,
    Co2 = 4,
}

impl HistoryParam {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(HistoryParam::Temperature),
            2 => Ok(HistoryParam::Humidity),
            3 => Ok(HistoryParam::Pressure),
            4 => Ok(HistoryParam::Co2),
            _ => bail!("unknown Aranet4 history parameter: {value}"),
        }
    }

    /// Humidity is logged as one byte, everything else as u16.
    fn value_width(self) -> usize {
        match self {
            HistoryParam::Humidity => 1,
            _ => 2,
        }
    }
}

/// One response of the history characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryChunk {
    pub param: HistoryParam,
    pub interval_secs: u16,
    pub total: u16,
    pub ago_secs: u16,
    /// 1-based index of the first value.
    pub start: u16,
    pub values: Vec<u16>,
}

/// Request for `param` values starting at the 1-based index `start`.
pub fn history_request(param: HistoryParam, start: u16) -> [u8; 4] {
    let [lo, hi] = start.to_le_bytes();
    [HISTORY_REQUEST, param as u8, lo, hi]
}

pub fn decode_history_chunk(data: &[u8]) -> Result<HistoryChunk> {
    if data.len() < HISTORY_HEADER_LEN {
        bail!(
            "Aranet4 history response too short: expected at least {HISTORY_HEADER_LEN} bytes, got {}",
            data.len()
        )
    }

    let param = HistoryParam::from_u8(data[0])?;
    let interval_secs = u16::from_le_bytes([data[1], data[2]]);
    let total = u16::from_le_bytes([data[3], data[4]]);
    let ago_secs = u16::from_le_bytes([data[5], data[6]]);
    let start = u16::from_le_bytes([data[7], data[8]]);
    let count = data[9] as usize;

    let width = param.value_width();
    let end = HISTORY_HEADER_LEN + count * width;
    if data.len() < end {
        bail!(
            "Aranet4 history response truncated: {count} values need {end} bytes, got {}",
            data.len()
        )
    }

    let values = data[HISTORY_HEADER_LEN..end]
        .chunks_exact(width)
        .map(|value| match value {
            [v] => *v as u16,
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            _ => unreachable!("chunks_exact yields {width}-byte slices"),
        })
        .collect();

    Ok(HistoryChunk {
        param,
        interval_secs,
        total,
        ago_secs,
        start,
        values,
    })
}

/// Every logged value of one parameter, with the header of its first response.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySeries {
    pub interval_secs: u16,
    pub total: u16,
    pub ago_secs: u16,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub measured_at: DateTime<Utc>,
    pub co2_ppm: u16,
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
    pub humidity_percent: u8,
}

impl HistoryRecord {
    /// The device does not log battery, so it never appears here.
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
    }
}

/// Zips the per-parameter series into records, oldest first. The newest
/// logged value was taken `ago_secs` before `fetched_at` and older ones sit
/// one interval apart.
pub fn assemble_history(
    fetched_at: DateTime<Utc>,
    temperature: &HistorySeries,
    humidity: &HistorySeries,
    pressure: &HistorySeries,
    co2: &HistorySeries,
) -> Vec<HistoryRecord> {
    let total = temperature.total as usize;
    let len = [temperature, humidity, pressure, co2]
        .iter()
        .map(|series| series.values.len())
        .min()
        .unwrap_or(0)
        .min(total);

    let newest = fetched_at - TimeDelta::seconds(temperature.ago_secs as i64);
    let interval = TimeDelta::seconds(temperature.interval_secs as i64);

    (0..len)
        .map(|i| HistoryRecord {
            measured_at: newest - interval * (total - 1 - i) as i32,
            co2_ppm: co2.values[i],
            temperature_celsius: temperature.values[i] as f32 / 20f32,
            pressure_hpa: pressure.values[i] as f32 / 10f32,
            humidity_percent: humidity.values[i].min(u8::MAX as u16) as u8,
        })
        .collect()
}

impl Aranet4Reader {
    /// Downloads every record the device still holds in memory, oldest first.
    pub async fn read_history(
        &self,
        device: &DeviceConfig,
    ) -> Result<Vec<HistoryRecord>, IngestError> {
        let mac = ble_address(device)?;

        let connection = self.connect(mac, &device.name).await?;
        let records = download_history(&connection).await;
        connection.close().await;

        records
    }
}

async fn download_history(connection: &Aranet4Connection) -> Result<Vec<HistoryRecord>, IngestError> {
    let command = connection.characteristic(COMMAND_UUID)?;
    let history = connection.characteristic(HISTORY_V2_UUID)?;

    let fetched_at = Utc::now();
    let temperature = fetch_series(connection, command, history, HistoryParam::Temperature).await?;
    let humidity = fetch_series(connection, command, history, HistoryParam::Humidity).await?;
    let pressure = fetch_series(connection, command, history, HistoryParam::Pressure).await?;
    let co2 = fetch_series(connection, command, history, HistoryParam::Co2).await?;

    info!(
        device = connection.name(),
        total = temperature.total,
        interval_secs = temperature.interval_secs,
        "downloaded Aranet4 history"
    );

    Ok(assemble_history(
        fetched_at,
        &temperature,
        &humidity,
        &pressure,
        &co2,
    ))
}

async fn fetch_series(
    connection: &Aranet4Connection,
    command: &Characteristic,
    history: &Characteristic,
    param: HistoryParam,
) -> Result<HistorySeries, IngestError> {
    let mut series: Option<HistorySeries> = None;
    let mut start: u16 = 1;
    let mut stale = 0;

    loop {
        connection
            .write(command, &history_request(param, start))
            .await?;
        let data = connection.read(history).await?;
        let chunk = decode_history_chunk(&data)
            .map_err(|e| IngestError::invalid(connection.name(), format!("{e:#}")))?;

        // The characteristic keeps serving the previous answer until the
        // device has processed the new request.
        if chunk.param != param || chunk.start != start {
            stale += 1;
            if stale > MAX_STALE_RESPONSES {
                return Err(IngestError::unreachable(
                    connection.name(),
                    format!("no history for {param:?} from index {start}"),
                ));
            }
            continue;
        }
        stale = 0;

        let current = series.get_or_insert_with(|| HistorySeries {
            interval_secs: chunk.interval_secs,
            total: chunk.total,
            ago_secs: chunk.ago_secs,
            values: Vec::with_capacity(chunk.total as usize),
        });
        if chunk.values.is_empty() {
            break;
        }

        start = start.saturating_add(chunk.values.len() as u16);
        current.values.extend(chunk.values);
        debug!(device = connection.name(), ?param, start, total = current.total, "history chunk");

        if start > current.total {
            break;
        }
    }

    series.ok_or_else(|| {
        IngestError::unreachable(connection.name(), format!("no history for {param:?}"))
    })
}
