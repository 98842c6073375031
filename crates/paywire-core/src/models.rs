//! Core domain models and strongly-typed identifiers.
//!
//! Defines the webhook event record, its processing status and the newtype ID
//! wrapper used throughout the claim/resolve pipeline. Includes database
//! serialization traits and the state transition rules every store enforces.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed event identifier.
///
/// Wraps a UUID to keep the storage identity apart from the caller-supplied
/// business `event_id` string. Generated once at creation and never changed.
///
/// # Example
///
/// ```
/// use paywire_core::models::EventId;
/// let id = EventId::new();
/// println!("Processing event: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Event processing status.
///
/// Events move through a single claim cycle. `Pending` is the only initial
/// state and `Done`/`Failed` are terminal:
///
/// ```text
/// Pending -> Processing -> Done
///                       -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Persisted and waiting in the backlog for a worker to claim it.
    Pending,

    /// Claimed by exactly one worker and being processed.
    ///
    /// An event left here after a crash or a failed resolution is an
    /// orphaned claim; nothing moves it back automatically.
    Processing,

    /// Processing completed. Terminal.
    Done,

    /// Processing raised an error, recorded in `last_error`. Terminal.
    Failed,
}

impl EventStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Processing, Self::Done, Self::Failed];

    /// Lower-case name used on the wire and in the `status` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for states no operation may leave.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Only claiming (`Pending -> Processing`) and resolving
    /// (`Processing -> Done | Failed`) are allowed. There is no re-queue.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Done)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid event status: {s}")),
        }
    }
}

impl sqlx::Type<PgDb> for EventStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as sqlx::Type<PgDb>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl sqlx::Encode<'_, PgDb> for EventStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// A webhook event as stored.
///
/// Everything except `status`, `last_error` and `updated_at` is fixed at
/// creation. `last_error` is set if and only if `status` is `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    /// Storage identity, generated at creation.
    pub id: EventId,

    /// Caller-supplied business identifier (e.g. `evt_1`).
    ///
    /// Not guaranteed unique unless the store enforces it.
    pub event_id: String,

    /// Free-form event category such as `payment.completed`.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,

    /// Serialized event body. Opaque to the store.
    pub payload: Vec<u8>,

    /// Current processing status.
    pub status: EventStatus,

    /// Diagnostic from the most recent failed resolution.
    pub last_error: Option<String>,

    /// When the event was persisted.
    pub created_at: DateTime<Utc>,

    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Builds a freshly created `pending` event from ingestion input.
    pub fn pending(new_event: NewWebhookEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            event_id: new_event.event_id,
            event_type: new_event.event_type,
            payload: new_event.payload.to_vec(),
            status: EventStatus::Pending,
            last_error: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Decodes the payload as JSON.
    ///
    /// Returns `None` for an empty or unparsable payload. Processing treats
    /// both the same way, so the parse error itself is not surfaced.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        if self.payload.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.payload).ok()
    }
}

/// Input to `create`: what the ingestion endpoint knows about an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    /// Caller-supplied business identifier.
    pub event_id: String,

    /// Event category.
    pub event_type: String,

    /// Serialized event body.
    pub payload: Bytes,
}

impl NewWebhookEvent {
    /// Creates ingestion input.
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self { event_id: event_id.into(), event_type: event_type.into(), payload: payload.into() }
    }
}
