use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;
use home_sensors::config::{DeviceArgs, InfluxConfig};

/// Imports an Aranet4 app CSV export into InfluxDB.
#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, env = "TZ")]
    pub timezone: Tz,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub influx: InfluxConfig,

    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }
}
