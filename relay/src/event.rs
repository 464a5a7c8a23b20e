//! Webhook payload types.
//!
//! A webhook delivery is a JSON array of events. Each event wraps exactly one
//! record under `msys`, keyed by the event category:
//!
//! ```json
//! {"msys": {"message_event": {"type": "click", "timestamp": 1234567890}}}
//! ```
//!
//! An event with an empty `msys` object is the provider's connectivity ping.

use crate::errors::RelayError;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WebhookEvent {
    #[serde(default)]
    pub msys: BTreeMap<String, EventRecord>,
}

impl WebhookEvent {
    pub fn new(category: impl Into<String>, record: EventRecord) -> Self {
        WebhookEvent {
            msys: BTreeMap::from([(category.into(), record)]),
        }
    }

    /// The category key and its record, or `None` for a ping event.
    pub fn category(&self) -> Result<Option<(&str, &EventRecord)>, RelayError> {
        let mut entries = self.msys.iter();
        match (entries.next(), entries.next()) {
            (None, _) => Ok(None),
            (Some((category, record)), None) => Ok(Some((category.as_str(), record))),
            (Some(_), Some(_)) => Err(RelayError::InvalidEvent(format!(
                "expected a single event category, got {}",
                self.msys.keys().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub geo_ip: Option<GeoIp>,
    #[serde(default)]
    pub campaign_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct GeoIp {
    #[serde(default)]
    pub country: Option<String>,
}

impl EventRecord {
    pub fn country(&self) -> Option<&str> {
        self.geo_ip.as_ref()?.country.as_deref()
    }
}

// Production payloads carry the timestamp as a string, the documented samples as a number.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Number(i64),
        Text(String),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Number(n) => Ok(n),
        RawTimestamp::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid timestamp: {s:?}"))),
    }
}
