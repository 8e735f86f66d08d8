//! One linear pass: read one sensor, normalize, write one point.

use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    config::DeviceConfig,
    error::IngestError,
    influx::{Point, PointSink},
    normalize::normalize,
    sensor::SensorReader,
};

pub async fn run_once<R, S>(reader: &R, sink: &S, device: &DeviceConfig) -> Result<Point, IngestError>
where
    R: SensorReader,
    S: PointSink,
{
    let started = Instant::now();
    info!(device = %device.name, kind = %device.kind, location = %device.location, "starting collection");

    let raw = reader.read(device).await?;

    let normalized = normalize(device, &raw, Utc::now())?;
    for dropped in &normalized.dropped {
        warn!("{dropped}; field omitted");
    }

    let point = Point::from_reading(&normalized.reading, device);
    sink.write(std::slice::from_ref(&point)).await?;

    info!(
        device = %device.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "logged {}",
        normalized.reading.summary()
    );

    Ok(point)
}
