//! StatHat EZ API counters.

use crate::config::StatHatConfig;
use crate::errors::SinkError;
use crate::sink::CounterSink;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

pub struct StatHatSink {
    client: reqwest::Client,
    url: Url,
    key: String,
}

impl StatHatSink {
    pub fn new(config: &StatHatConfig) -> Result<Self, SinkError> {
        let url = Url::parse(&config.url).map_err(|e| SinkError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(StatHatSink {
            client,
            url,
            key: config.key.clone(),
        })
    }
}

#[async_trait]
impl CounterSink for StatHatSink {
    fn name(&self) -> &'static str {
        "stathat"
    }

    async fn increment(&self, name: &str, value: u64, timestamp: i64) -> Result<(), SinkError> {
        let value = value.to_string();
        let timestamp = timestamp.to_string();
        let form = [
            ("ezkey", self.key.as_str()),
            ("stat", name),
            ("count", value.as_str()),
            ("t", timestamp.as_str()),
        ];

        let response = self.client.post(self.url.clone()).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
