use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Unique identifier for a triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The event that initiated a saga.
///
/// The payload is opaque to the engine: it is stored verbatim so a retry can
/// replay the saga with exactly the same input, and every step receives the
/// same value for both its forward action and its compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeringEvent {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type of the event (e.g., "OrderCreated").
    pub event_type: String,

    /// The business entity the event concerns, if any (e.g., an order ID).
    pub aggregate_id: Option<String>,

    /// Correlation ID propagated from the inbound source.
    pub correlation_id: Option<String>,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl TriggeringEvent {
    /// Creates an event with a raw JSON payload.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            aggregate_id: None,
            correlation_id: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Creates an event whose payload is the JSON form of `data`.
    pub fn from_data<T: Serialize>(
        event_type: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(data)?))
    }

    /// Returns a copy of this event tagged with an aggregate ID.
    pub fn with_aggregate_id(self, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
            ..self
        }
    }

    /// Returns a copy of this event tagged with a correlation ID.
    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..self
        }
    }

    /// Returns true if the event is of the given type.
    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Decodes the payload into a typed value.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
