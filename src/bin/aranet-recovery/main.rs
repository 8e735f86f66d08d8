mod args;

use std::{
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::{Context as _, Result, ensure};
use args::Args;
use clap::Parser as _;
use home_sensors::{
    config::DeviceKind,
    influx::{InfluxClient, Point, PointSink as _},
    logging,
    normalize::normalize,
    sensor::Aranet4Reader,
};
use tracing::{debug, error, info, warn};

const BULK_WRITE_SIZE: usize = 1000;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = logging::init(args.log_file.as_deref(), args.timezone) {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    if let Err(e) = run(args).await {
        error!("recovery failed: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run(args: Args) -> Result<()> {
    let started = Instant::now();

    let device = args
        .device
        .into_device_config()
        .context("invalid device configuration")?;
    ensure!(
        device.kind == DeviceKind::Aranet4,
        "history recovery is only supported for aranet4, got {}",
        device.kind
    );

    let influx = InfluxClient::new(&args.influx).context("failed to build InfluxDB client")?;
    let reader = Aranet4Reader::new(Duration::from_secs(args.history_timeout_secs));

    info!(device = %device.name, id = %device.id, "recovering Aranet4 history");
    let records = reader
        .read_history(&device)
        .await
        .context("failed to download history")?;

    let (Some(oldest), Some(newest)) = (records.first(), records.last()) else {
        warn!(device = %device.name, "no history stored on device");
        return Ok(());
    };
    info!(
        "retrieved {} records from {} to {}",
        records.len(),
        oldest.measured_at.with_timezone(&args.timezone),
        newest.measured_at.with_timezone(&args.timezone)
    );

    let mut points: Vec<Point> = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for record in &records {
        let normalized = match normalize(&device, &record.to_raw(), record.measured_at) {
            Ok(n) => n,
            Err(e) => {
                warn!(measured_at = %record.measured_at, "skipping record: {e}");
                skipped += 1;
                continue;
            }
        };
        for dropped in &normalized.dropped {
            debug!(measured_at = %record.measured_at, "{dropped}");
        }

        points.push(Point::from_reading(&normalized.reading, &device));
    }

    for batch in points.chunks(BULK_WRITE_SIZE) {
        influx
            .write(batch)
            .await
            .context("failed to bulk write points")?;
    }

    info!(
        skipped,
        "wrote {} historical points in {:.2}s",
        points.len(),
        started.elapsed().as_secs_f64()
    );

    Ok(())
}
