//! Pure conversion of one webhook record into a time-series point and the
//! counter increments derived from it.

use crate::errors::RelayError;
use crate::event::EventRecord;
use chrono::{DateTime, Utc};

/// Measurement name for points and prefix for counter names.
pub const MEASUREMENT: &str = "transactionalEmailEvent";

/// Field value as written to the time-series backend.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i64),
    Text(&'a str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPoint {
    pub count: i64,
    pub country: Option<String>,
    pub campaign_id: Option<String>,
    pub category: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedPoint {
    /// Fields in write order. Absent optional fields are left out.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        let mut fields = vec![("count", FieldValue::Integer(self.count))];
        if let Some(country) = &self.country {
            fields.push(("country", FieldValue::Text(country)));
        }
        if let Some(campaign_id) = &self.campaign_id {
            fields.push(("campaignId", FieldValue::Text(campaign_id)));
        }
        fields
    }

    pub fn tags(&self) -> [(&'static str, &str); 2] {
        [("category", &self.category), ("type", &self.event_type)]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CounterEmission {
    pub name: String,
    pub value: u64,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Everything sent to the backends for a single event.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedMetrics {
    pub point: NormalizedPoint,
    pub counters: Vec<CounterEmission>,
}

pub fn derive_metrics(category: &str, record: &EventRecord) -> Result<DerivedMetrics, RelayError> {
    let timestamp = DateTime::from_timestamp(record.timestamp, 0).ok_or_else(|| {
        RelayError::InvalidEvent(format!("timestamp out of range: {}", record.timestamp))
    })?;

    let point = NormalizedPoint {
        count: 1,
        country: record
            .country()
            .filter(|c| !c.is_empty())
            .map(normalize_country),
        campaign_id: record
            .campaign_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(slugify_campaign_id),
        category: category.to_string(),
        event_type: record.event_type.clone(),
        timestamp,
    };

    let counters = [
        format!("{MEASUREMENT}.count"),
        format!("{MEASUREMENT}.count.category.{category}"),
        format!("{MEASUREMENT}.count.type.{}", record.event_type),
    ]
    .into_iter()
    .map(|name| CounterEmission {
        name,
        value: 1,
        timestamp: record.timestamp,
    })
    .collect();

    Ok(DerivedMetrics { point, counters })
}

pub fn normalize_country(raw: &str) -> String {
    raw.to_uppercase()
}

pub fn slugify_campaign_id(raw: &str) -> String {
    raw.replace(' ', "-")
}
