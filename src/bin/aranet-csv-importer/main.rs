mod args;
mod csv;

use std::{fs::File, process::ExitCode};

use anyhow::{Context as _, Result, ensure};
use args::Args;
use chrono::Utc;
use clap::Parser as _;
use home_sensors::{
    config::DeviceKind,
    influx::{InfluxClient, Point, PointSink as _},
    logging,
    normalize::normalize,
};
use tracing::{debug, error, info, warn};

use crate::csv::AranetCsvRows;

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
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run(args: Args) -> Result<()> {
    let device = args
        .device
        .into_device_config()
        .context("invalid device configuration")?;
    ensure!(
        device.kind == DeviceKind::Aranet4,
        "CSV exports are only supported for aranet4, got {}",
        device.kind
    );

    let file =
        File::open(&args.file).with_context(|| format!("failed to open file: {:?}", args.file))?;
    let rows = AranetCsvRows::new(file, args.timezone)
        .context("failed to create Aranet4 CSV reader")?;

    let influx = InfluxClient::new(&args.influx).context("failed to build InfluxDB client")?;

    let mut buffer: Vec<Point> = Vec::with_capacity(BULK_WRITE_SIZE);
    let mut total = 0;
    let mut skipped = 0;

    for result in rows {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping row: {e:#}");
                skipped += 1;
                continue;
            }
        };

        let normalized = match normalize(&device, &row.raw, row.measured_at.with_timezone(&Utc)) {
            Ok(n) => n,
            Err(e) => {
                warn!(line = row.line, "skipping row: {e}");
                skipped += 1;
                continue;
            }
        };
        for dropped in &normalized.dropped {
            debug!(line = row.line, "{dropped}");
        }

        buffer.push(Point::from_reading(&normalized.reading, &device));

        if buffer.len() >= BULK_WRITE_SIZE {
            influx
                .write(&buffer)
                .await
                .context("failed to bulk write points")?;
            total += buffer.len();
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        influx
            .write(&buffer)
            .await
            .context("failed to bulk write remaining points")?;
        total += buffer.len();
    }

    if total == 0 {
        warn!("no points to write from {:?}", args.file);
    }
    info!(skipped, "wrote {} historical points from {:?}", total, args.file);

    Ok(())
}
