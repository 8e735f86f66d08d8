mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use home_sensors::{influx::InfluxClient, logging, pipeline::run_once, sensor::Sensor};
use tracing::error;

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

    let sensor = Sensor::new(
        &device,
        &args.home_assistant,
        Duration::from_secs(args.read_timeout_secs),
    )?;

    let influx = InfluxClient::new(&args.influx).context("failed to build InfluxDB client")?;

    run_once(&sensor, &influx, &device)
        .await
        .context("failed to log sensor reading")?;

    Ok(())
}
