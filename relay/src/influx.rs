//! InfluxDB 1.x HTTP write API.

use crate::config::InfluxConfig;
use crate::errors::SinkError;
use crate::normalize::{FieldValue, NormalizedPoint};
use crate::sink::TimeSeriesSink;
use async_trait::async_trait;
use std::fmt::Write;
use std::time::Duration;
use url::Url;

pub struct InfluxSink {
    client: reqwest::Client,
    write_url: Url,
    credentials: Option<(String, String)>,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let base = format!("{}://{}:{}/write", config.protocol, config.host, config.port);
        let mut write_url = Url::parse(&base).map_err(|e| SinkError::InvalidUrl(e.to_string()))?;
        write_url
            .query_pairs_mut()
            .append_pair("db", &config.database)
            .append_pair("precision", "ms");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let credentials = config.username.clone().zip(config.password.clone());

        Ok(InfluxSink {
            client,
            write_url,
            credentials,
        })
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn write_points(
        &self,
        measurement: &str,
        points: &[NormalizedPoint],
    ) -> Result<(), SinkError> {
        let body = points
            .iter()
            .map(|point| encode_line(measurement, point))
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = self.client.post(self.write_url.clone()).body(body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("wrote {} point(s) to {measurement}", points.len());
        Ok(())
    }
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' ', '\\'];
const TAG_SPECIAL: &[char] = &[',', '=', ' ', '\\'];

/// Encode one point in line protocol with a millisecond timestamp.
pub fn encode_line(measurement: &str, point: &NormalizedPoint) -> String {
    let mut line = escape(measurement, MEASUREMENT_SPECIAL);

    for (key, value) in point.tags() {
        // Empty tag values are not representable
        if value.is_empty() {
            continue;
        }
        let _ = write!(
            line,
            ",{}={}",
            escape(key, TAG_SPECIAL),
            escape(value, TAG_SPECIAL)
        );
    }

    let fields = point
        .fields()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Integer(n) => format!("{n}i"),
                FieldValue::Text(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
            };
            format!("{}={value}", escape(key, TAG_SPECIAL))
        })
        .collect::<Vec<_>>()
        .join(",");

    let _ = write!(line, " {fields} {}", point.timestamp.timestamp_millis());
    line
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        // A line break would end the line, so outside quoted fields it becomes a space
        let c = match c {
            '\n' | '\r' if special.contains(&' ') => ' ',
            c => c,
        };
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
