use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;
use home_sensors::config::{DeviceArgs, HomeAssistantConfig, InfluxConfig};

/// Reads one sensor once and writes the reading to InfluxDB.
#[derive(Debug, Parser)]
pub struct Args {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub influx: InfluxConfig,

    #[command(flatten)]
    pub home_assistant: HomeAssistantConfig,

    #[arg(long, env = "READ_TIMEOUT_SECS", default_value_t = 30)]
    pub read_timeout_secs: u64,

    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,
}
