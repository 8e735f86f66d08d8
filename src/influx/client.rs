use reqwest::{Client, header};
use tracing::debug;

use crate::{
    config::InfluxConfig,
    error::IngestError,
    influx::{Point, encode_batch},
};

/// Destination for time-series points.
#[allow(async_fn_in_trait)]
pub trait PointSink {
    async fn write(&self, points: &[Point]) -> Result<(), IngestError>;
}

/// InfluxDB v2 HTTP write API client.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: Client,
    write_url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            write_url: write_url(&config.url),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        })
    }
}

impl PointSink for InfluxClient {
    async fn write(&self, points: &[Point]) -> Result<(), IngestError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = encode_batch(points)?;
        debug!(points = points.len(), bytes = body.len(), "writing to InfluxDB");

        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| IngestError::write_rejected(format!("InfluxDB unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(IngestError::write_rejected(format!(
            "InfluxDB responded {status}: {}",
            detail.trim()
        )))
    }
}

fn write_url(base: &str) -> String {
    format!("{}/api/v2/write", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_write_url() {
        assert_eq!(
            write_url("http://docker20.local:8086/"),
            "http://docker20.local:8086/api/v2/write"
        );
        assert_eq!(
            write_url("https://influx.example.com"),
            "https://influx.example.com/api/v2/write"
        );
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let config = InfluxConfig {
            url: "http://127.0.0.1:9".to_string(),
            token: "token".to_string(),
            org: "homelab".to_string(),
            bucket: "aranet4".to_string(),
            timeout_secs: 1,
        };
        let client = InfluxClient::new(&config).unwrap();

        assert!(client.write(&[]).await.is_ok());
    }
}
