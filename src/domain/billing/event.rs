//! Billing provider webhook payloads.
//!
//! Only fields relevant to subscription processing are captured. The envelope is
//! `{"meta": {"event_name", ...}, "data": {"id", "type", "attributes": {...}}}`.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use super::WebhookError;
use crate::domain::foundation::Timestamp;

/// Known billing event types that we handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingEventType {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SubscriptionResumed,
    SubscriptionExpired,
    SubscriptionPaused,
    SubscriptionUnpaused,
    PaymentFailed,
    PaymentSuccess,
    PaymentRecovered,
    /// Any event name we do not act on.
    Unknown,
}

impl BillingEventType {
    /// Parses the provider's `meta.event_name`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "subscription_created" => Self::SubscriptionCreated,
            "subscription_updated" => Self::SubscriptionUpdated,
            "subscription_cancelled" => Self::SubscriptionCancelled,
            "subscription_resumed" => Self::SubscriptionResumed,
            "subscription_expired" => Self::SubscriptionExpired,
            "subscription_paused" => Self::SubscriptionPaused,
            "subscription_unpaused" => Self::SubscriptionUnpaused,
            "subscription_payment_failed" => Self::PaymentFailed,
            "subscription_payment_success" => Self::PaymentSuccess,
            "subscription_payment_recovered" => Self::PaymentRecovered,
            _ => Self::Unknown,
        }
    }

    /// True for events whose `data` is the subscription object itself.
    ///
    /// Payment events carry an invoice; its id is not the subscription id.
    pub fn carries_subscription(&self) -> bool {
        !matches!(
            self,
            Self::PaymentFailed | Self::PaymentSuccess | Self::PaymentRecovered | Self::Unknown
        )
    }
}

impl fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::SubscriptionResumed => "subscription_resumed",
            Self::SubscriptionExpired => "subscription_expired",
            Self::SubscriptionPaused => "subscription_paused",
            Self::SubscriptionUnpaused => "subscription_unpaused",
            Self::PaymentFailed => "subscription_payment_failed",
            Self::PaymentSuccess => "subscription_payment_success",
            Self::PaymentRecovered => "subscription_payment_recovered",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Attributes of the subscription (or invoice) object that drive transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingAttributes {
    /// Plan identifier, normalized to a string (the provider sends numbers).
    pub variant_id: Option<String>,
    /// Lowercased customer email used to resolve the local user.
    pub user_email: Option<String>,
    /// Provider status string (`active`, `past_due`, ...).
    pub status: Option<String>,
    pub renews_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    /// Raw provider timestamp, only used to derive an event id.
    pub updated_at: Option<String>,
    /// Owning subscription id on invoice objects.
    pub subscription_id: Option<String>,
}

/// A parsed, not yet applied, billing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    /// Provider-assigned or derived idempotency key.
    pub event_id: String,
    pub event_name: String,
    pub event_type: BillingEventType,
    /// `data.id` of the object that triggered the event.
    pub object_id: Option<String>,
    pub attributes: BillingAttributes,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Option<Meta>,
    data: Option<Data>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    event_name: Option<String>,
    webhook_id: Option<String>,
    event_id: Option<String>,
    custom_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Data {
    id: Option<Value>,
    attributes: Option<Value>,
}

impl BillingEvent {
    /// Parses the raw webhook body.
    ///
    /// # Errors
    ///
    /// - `ParseError` if the body is not a JSON object
    /// - `MissingField` if `meta.event_name` or `data.attributes` is absent, or
    ///   if no event id is supplied and `data.id` is missing so none can be derived
    pub fn parse(raw: &[u8]) -> Result<Self, WebhookError> {
        let envelope: Envelope =
            serde_json::from_slice(raw).map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let meta = envelope.meta.ok_or(WebhookError::MissingField("meta"))?;
        let event_name = meta
            .event_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(WebhookError::MissingField("meta.event_name"))?;
        let data = envelope.data.ok_or(WebhookError::MissingField("data"))?;
        let raw_attributes = data
            .attributes
            .filter(Value::is_object)
            .ok_or(WebhookError::MissingField("data.attributes"))?;

        let object_id = data.id.as_ref().and_then(value_as_string);
        let custom_email = meta
            .custom_data
            .as_ref()
            .and_then(|custom| custom.get("email"))
            .and_then(Value::as_str);

        let attributes = BillingAttributes {
            variant_id: string_field(&raw_attributes, "variant_id"),
            user_email: string_field(&raw_attributes, "user_email")
                .as_deref()
                .or(custom_email)
                .map(|email| email.trim().to_lowercase())
                .filter(|email| !email.is_empty()),
            status: string_field(&raw_attributes, "status"),
            renews_at: timestamp_field(&raw_attributes, "renews_at"),
            ends_at: timestamp_field(&raw_attributes, "ends_at"),
            updated_at: string_field(&raw_attributes, "updated_at"),
            subscription_id: string_field(&raw_attributes, "subscription_id"),
        };

        let event_id = match meta.webhook_id.or(meta.event_id).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => derive_event_id(&event_name, object_id.as_deref(), &attributes)?,
        };

        Ok(Self {
            event_id,
            event_type: BillingEventType::from_name(&event_name),
            event_name,
            object_id,
            attributes,
        })
    }

    /// Provider subscription id, whichever object the event carries.
    pub fn subscription_ref(&self) -> Option<&str> {
        if self.event_type.carries_subscription() {
            self.object_id.as_deref()
        } else {
            self.attributes.subscription_id.as_deref()
        }
    }
}

/// Builds `event_name:data.id:updated_at` so redeliveries of the same change dedupe.
fn derive_event_id(
    event_name: &str,
    object_id: Option<&str>,
    attributes: &BillingAttributes,
) -> Result<String, WebhookError> {
    let object_id = object_id.ok_or(WebhookError::MissingField("data.id"))?;
    Ok(format!(
        "{}:{}:{}",
        event_name,
        object_id,
        attributes.updated_at.as_deref().unwrap_or("")
    ))
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(attributes: &Value, key: &str) -> Option<String> {
    attributes.get(key).and_then(value_as_string)
}

fn timestamp_field(attributes: &Value, key: &str) -> Option<Timestamp> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .and_then(Timestamp::parse_rfc3339)
}
