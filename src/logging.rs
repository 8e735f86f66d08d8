use std::{
    fs::{File, OpenOptions},
    path::Path,
    sync::Mutex,
};

use anyhow::{Context as _, Result};
use chrono::Utc;
use chrono_tz::Tz;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

/// Renders event timestamps in a fixed IANA timezone rather than UTC.
#[derive(Debug, Clone, Copy)]
pub struct ZonedTimer(pub Tz);

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            Utc::now()
                .with_timezone(&self.0)
                .format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Logs to stderr and, when `log_file` is given, appends plain text to it.
pub fn init(log_file: Option<&Path>, timezone: Tz) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = open_append(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(ZonedTimer(timezone))
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(ZonedTimer(timezone))
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
