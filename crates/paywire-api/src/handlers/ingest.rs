//! Payment webhook ingestion.
//!
//! Validates the request, records it as a `pending` event and acknowledges.
//! The stored payload is the request re-serialized, so fields unknown to
//! `PaymentWebhookRequest` are dropped before the workers see it.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use paywire_core::{models::NewWebhookEvent, CoreError, PaywireError, WebhookEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;

/// Payment webhook as posted by the payment provider.
///
/// Missing string fields deserialize as empty and are rejected by
/// [`PaymentWebhookRequest::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWebhookRequest {
    /// Provider event identifier, e.g. `evt_1`.
    #[serde(default)]
    pub event_id: String,
    /// Event category, e.g. `payment.completed`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Amount in minor units, as sent.
    #[serde(default)]
    pub amount: String,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: String,
    /// When the payment event happened at the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl PaymentWebhookRequest {
    /// Checks that every required field is non-empty.
    ///
    /// # Errors
    ///
    /// Returns `PaywireError::MissingRequiredFields` listing the empty fields.
    pub fn validate(&self) -> Result<(), PaywireError> {
        let fields: Vec<&'static str> = [
            ("event_id", &self.event_id),
            ("type", &self.event_type),
            ("amount", &self.amount),
            ("currency", &self.currency),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if fields.is_empty() {
            Ok(())
        } else {
            Err(PaywireError::MissingRequiredFields { fields })
        }
    }
}

/// Acknowledgement returned once the event is recorded.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Always `true`.
    pub ok: bool,
}

/// Error body returned for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code, repeated in the body.
    pub code: u16,
    /// Short, client-safe description.
    pub message: String,
}

/// Records a payment webhook for asynchronous processing.
///
/// Responds before any processing happens:
/// - 200 `{"ok":true}` once the event is stored as `pending`
/// - 400 for an unparsable body or empty required fields
/// - 409 when the store rejects a duplicate `event_id`
/// - 500 when the store fails
#[instrument(
    name = "ingest_payment_webhook",
    skip(state, body),
    fields(
        body_size = body.len(),
        event_id = tracing::field::Empty,
    )
)]
pub async fn ingest_payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    debug!("processing payment webhook");

    match record_event(&state, &body).await {
        Ok(event) => {
            info!(
                id = %event.id,
                event_type = %event.event_type,
                "payment webhook recorded"
            );
            (StatusCode::OK, Json(WebhookAck { ok: true })).into_response()
        },
        Err(error) => {
            match &error {
                PaywireError::Storage(_) => {
                    error!(code = error.code(), error = %error, "failed to record payment webhook");
                },
                _ => warn!(code = error.code(), error = %error, "payment webhook rejected"),
            }
            create_error_response(&error)
        },
    }
}

async fn record_event(state: &AppState, body: &[u8]) -> Result<WebhookEvent, PaywireError> {
    let request: PaymentWebhookRequest = serde_json::from_slice(body)
        .map_err(|e| PaywireError::InvalidRequestBody { reason: e.to_string() })?;

    request.validate()?;
    tracing::Span::current().record("event_id", request.event_id.as_str());

    let payload = serde_json::to_vec(&request)
        .map_err(|e| PaywireError::InvalidRequestBody { reason: e.to_string() })?;

    let new_event = NewWebhookEvent::new(request.event_id.clone(), request.event_type, payload);

    state.store.create(new_event).await.map_err(|e| match e {
        CoreError::ConstraintViolation(_) => {
            PaywireError::DuplicateEvent { event_id: request.event_id }
        },
        other => PaywireError::Storage(other),
    })
}

/// Maps an error to its status code and `{"code","message"}` body.
fn create_error_response(error: &PaywireError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse { code: status.as_u16(), message: error.public_message().to_string() };

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_uses_public_message() {
        let error = PaywireError::Storage(CoreError::Database("connection refused".into()));
        let response = create_error_response(&error);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validate_lists_every_empty_field() {
        let request = PaymentWebhookRequest {
            event_id: "evt_1".into(),
            event_type: "payment.completed".into(),
            ..Default::default()
        };

        match request.validate() {
            Err(PaywireError::MissingRequiredFields { fields }) => {
                assert_eq!(fields, vec!["amount", "currency"]);
            },
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn occurred_at_is_optional() {
        let request: PaymentWebhookRequest = serde_json::from_str(
            r#"{"event_id":"evt_1","type":"payment.pending","amount":"100","currency":"USD"}"#,
        )
        .unwrap();

        assert!(request.validate().is_ok());
        assert_eq!(request.occurred_at, None);
    }

    #[test]
    fn occurred_at_must_be_rfc3339() {
        let result = serde_json::from_str::<PaymentWebhookRequest>(
            r#"{"event_id":"evt_1","type":"payment.pending","amount":"100","currency":"USD","occurred_at":"yesterday"}"#,
        );

        assert!(result.is_err());
    }
}
