use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;

/// Envelope of every message on the bus.
///
/// `event_type` is the topic the event was first published to, `source` the
/// publishing service. `id` stays the same across redeliveries and requeues
/// so handlers can log and deduplicate by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: &T,
    ) -> Result<Self, BusError> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: source.into(),
            payload: serde_json::to_value(payload)?,
            retry_count: 0,
            created_at: Utc::now(),
        })
    }

    /// Decode the payload; failure maps to [`BusError::Malformed`], which is permanent
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            BusError::Malformed(format!("{} payload of event {}: {}", self.event_type, self.id, e))
        })
    }

    pub(crate) fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct ShopCreated {
        id: Uuid,
        name: String,
    }

    #[test]
    fn test_wire_format_uses_type_field() {
        let event = DomainEvent::new("v1.shop.created", "company_service", &json!({"a": 1})).unwrap();
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "v1.shop.created");
        assert_eq!(wire["source"], "company_service");
        assert_eq!(wire["payload"]["a"], 1);
    }

    #[test]
    fn test_envelope_from_foreign_producer_defaults_bookkeeping() {
        let id = Uuid::new_v4();
        let raw = json!({
            "id": id,
            "type": "v1.shop.created",
            "source": "company_service",
            "payload": {"id": id, "name": "Main"}
        });
        let event: DomainEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.retry_count, 0);

        let shop: ShopCreated = event.decode().unwrap();
        assert_eq!(shop.name, "Main");
    }

    #[test]
    fn test_decode_failure_is_permanent() {
        let event = DomainEvent::new("v1.shop.created", "test", &json!({"name": 5})).unwrap();
        let err = event.decode::<ShopCreated>().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(err.to_string().contains("v1.shop.created"));
    }

    #[test]
    fn test_with_retry_keeps_identity() {
        let event = DomainEvent::new("t", "s", &json!(null)).unwrap();
        let retried = event.with_retry().with_retry();
        assert_eq!(retried.id, event.id);
        assert_eq!(retried.retry_count, 2);
    }
}
