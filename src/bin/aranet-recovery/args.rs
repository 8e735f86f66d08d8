use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;
use home_sensors::config::{DeviceArgs, InfluxConfig};

/// Downloads the history an Aranet4 keeps in memory and writes it to InfluxDB.
#[derive(Debug, Parser)]
pub struct Args {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub influx: InfluxConfig,

    /// Upper bound for the whole download; a full memory takes a few minutes.
    #[arg(long, env = "HISTORY_TIMEOUT_SECS", default_value_t = 300)]
    pub history_timeout_secs: u64,

    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_history_timeout() {
        let args = Args::try_parse_from([
            "aranet-recovery",
            "--sensor",
            "aranet4",
            "--aranet-mac",
            "AA:BB:CC:DD:EE:FF",
            "--location",
            "office",
            "--influx-url",
            "http://localhost:8086",
            "--influx-token",
            "secret",
            "--influx-org",
            "home",
            "--influx-bucket",
            "sensors",
            "--history-timeout-secs",
            "600",
            "--timezone",
            "UTC",
        ])
        .unwrap();

        assert_eq!(args.history_timeout_secs, 600);
        assert_eq!(args.timezone, Tz::UTC);
    }
}
