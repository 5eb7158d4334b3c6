//! Realtime wire protocol: frame envelope, event kinds and frame classification.
//!
//! Every frame is a JSON text message shaped as
//! `{ "type": string, "payload": any, "timestamp": number }`. Server frames may
//! omit `payload` and `timestamp`.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FrameError;
use crate::models::{
    ContentPayload, ErrorPayload, ExtraFields, MatchPayload, RedemptionPayload, RewardPayload,
    ShopItemPayload, StreamPayload, SurveyPayload,
};

/// Path of the realtime endpoint on the hosting origin
pub const WS_PATH: &str = "/ws";

/// Path of the HTTP side channel binding a socket to the cookie session
pub const WS_AUTH_PATH: &str = "/api/ws/auth";

// --- Kinds ---

/// Application events pushed by the server and forwarded to subscribers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContentPublished,
    MatchCreated,
    MatchUpdated,
    MatchStarted,
    MatchEnded,
    StreamOnline,
    StreamOffline,
    ShopItemAdded,
    ShopItemUpdated,
    SurveyPublished,
    RewardEarned,
    RedemptionStatusChanged,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::ContentPublished,
        EventKind::MatchCreated,
        EventKind::MatchUpdated,
        EventKind::MatchStarted,
        EventKind::MatchEnded,
        EventKind::StreamOnline,
        EventKind::StreamOffline,
        EventKind::ShopItemAdded,
        EventKind::ShopItemUpdated,
        EventKind::SurveyPublished,
        EventKind::RewardEarned,
        EventKind::RedemptionStatusChanged,
        EventKind::Error,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContentPublished => "content_published",
            EventKind::MatchCreated => "match_created",
            EventKind::MatchUpdated => "match_updated",
            EventKind::MatchStarted => "match_started",
            EventKind::MatchEnded => "match_ended",
            EventKind::StreamOnline => "stream_online",
            EventKind::StreamOffline => "stream_offline",
            EventKind::ShopItemAdded => "shop_item_added",
            EventKind::ShopItemUpdated => "shop_item_updated",
            EventKind::SurveyPublished => "survey_published",
            EventKind::RewardEarned => "reward_earned",
            EventKind::RedemptionStatusChanged => "redemption_status_changed",
            EventKind::Error => "error",
        }
    }

    /// Kinds that become user-facing notifications
    pub fn is_notifiable(&self) -> bool {
        !matches!(self, EventKind::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FrameError::UnknownType(s.to_string()))
    }
}

/// Frames consumed by the connection itself and never forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
    Ping,
    Pong,
    AuthSuccess,
    AuthError,
}

impl SystemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemKind::Ping => "ping",
            SystemKind::Pong => "pong",
            SystemKind::AuthSuccess => "auth_success",
            SystemKind::AuthError => "auth_error",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ping" => Some(SystemKind::Ping),
            "pong" => Some(SystemKind::Pong),
            "auth_success" => Some(SystemKind::AuthSuccess),
            "auth_error" => Some(SystemKind::AuthError),
            _ => None,
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Envelope ---

/// Raw frame envelope as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Frame {
    /// Outbound frame stamped with the current time in milliseconds
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    pub fn ping() -> Self {
        Self::new(SystemKind::Ping.as_str(), Value::Null)
    }

    pub fn pong() -> Self {
        Self::new(SystemKind::Pong.as_str(), Value::Null)
    }

    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Encode(e.to_string()))
    }
}

/// Body of `POST /api/ws/auth`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WsAuthRequest {
    pub client_id: String,
}

// --- Events ---

/// A server event with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ContentPublished(ContentPayload),
    MatchCreated(MatchPayload),
    MatchUpdated(MatchPayload),
    MatchStarted(MatchPayload),
    MatchEnded(MatchPayload),
    StreamOnline(StreamPayload),
    StreamOffline(StreamPayload),
    ShopItemAdded(ShopItemPayload),
    ShopItemUpdated(ShopItemPayload),
    SurveyPublished(SurveyPayload),
    RewardEarned(RewardPayload),
    RedemptionStatusChanged(RedemptionPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::ContentPublished(_) => EventKind::ContentPublished,
            ServerEvent::MatchCreated(_) => EventKind::MatchCreated,
            ServerEvent::MatchUpdated(_) => EventKind::MatchUpdated,
            ServerEvent::MatchStarted(_) => EventKind::MatchStarted,
            ServerEvent::MatchEnded(_) => EventKind::MatchEnded,
            ServerEvent::StreamOnline(_) => EventKind::StreamOnline,
            ServerEvent::StreamOffline(_) => EventKind::StreamOffline,
            ServerEvent::ShopItemAdded(_) => EventKind::ShopItemAdded,
            ServerEvent::ShopItemUpdated(_) => EventKind::ShopItemUpdated,
            ServerEvent::SurveyPublished(_) => EventKind::SurveyPublished,
            ServerEvent::RewardEarned(_) => EventKind::RewardEarned,
            ServerEvent::RedemptionStatusChanged(_) => EventKind::RedemptionStatusChanged,
            ServerEvent::Error(_) => EventKind::Error,
        }
    }

    /// Decode the payload of a frame of the given kind.
    ///
    /// A missing (`null`) payload decodes as an empty object.
    pub fn from_parts(kind: EventKind, payload: Value) -> Result<Self, FrameError> {
        let payload = match payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let event = match kind {
            EventKind::ContentPublished => ServerEvent::ContentPublished(decode(kind, payload)?),
            EventKind::MatchCreated => ServerEvent::MatchCreated(decode(kind, payload)?),
            EventKind::MatchUpdated => ServerEvent::MatchUpdated(decode(kind, payload)?),
            EventKind::MatchStarted => ServerEvent::MatchStarted(decode(kind, payload)?),
            EventKind::MatchEnded => ServerEvent::MatchEnded(decode(kind, payload)?),
            EventKind::StreamOnline => ServerEvent::StreamOnline(decode(kind, payload)?),
            EventKind::StreamOffline => ServerEvent::StreamOffline(decode(kind, payload)?),
            EventKind::ShopItemAdded => ServerEvent::ShopItemAdded(decode(kind, payload)?),
            EventKind::ShopItemUpdated => ServerEvent::ShopItemUpdated(decode(kind, payload)?),
            EventKind::SurveyPublished => ServerEvent::SurveyPublished(decode(kind, payload)?),
            EventKind::RewardEarned => ServerEvent::RewardEarned(decode(kind, payload)?),
            EventKind::RedemptionStatusChanged => {
                ServerEvent::RedemptionStatusChanged(decode(kind, payload)?)
            }
            EventKind::Error => ServerEvent::Error(decode(kind, payload)?),
        };
        Ok(event)
    }

    /// The payload re-encoded as JSON (unknown fields included)
    pub fn payload_json(&self) -> Value {
        let encoded = match self {
            ServerEvent::ContentPublished(p) => serde_json::to_value(p),
            ServerEvent::MatchCreated(p)
            | ServerEvent::MatchUpdated(p)
            | ServerEvent::MatchStarted(p)
            | ServerEvent::MatchEnded(p) => serde_json::to_value(p),
            ServerEvent::StreamOnline(p) | ServerEvent::StreamOffline(p) => {
                serde_json::to_value(p)
            }
            ServerEvent::ShopItemAdded(p) | ServerEvent::ShopItemUpdated(p) => {
                serde_json::to_value(p)
            }
            ServerEvent::SurveyPublished(p) => serde_json::to_value(p),
            ServerEvent::RewardEarned(p) => serde_json::to_value(p),
            ServerEvent::RedemptionStatusChanged(p) => serde_json::to_value(p),
            ServerEvent::Error(p) => serde_json::to_value(p),
        };
        encoded.unwrap_or(Value::Null)
    }
}

/// Decode a payload, parking fields whose shape does not match in `extra`
/// instead of dropping the frame.
fn decode<T>(kind: EventKind, payload: Value) -> Result<T, FrameError>
where
    T: DeserializeOwned + ExtraFields,
{
    let fields = match payload {
        Value::Object(fields) => fields,
        other => {
            let mut decoded = T::default();
            decoded.extra_mut().insert("value".to_string(), other);
            return Ok(decoded);
        }
    };
    if let Ok(decoded) = serde_json::from_value(Value::Object(fields.clone())) {
        return Ok(decoded);
    }

    let (typed, parked): (Map<String, Value>, Map<String, Value>) =
        fields.into_iter().partition(|(key, value)| {
            let single = Map::from_iter([(key.clone(), value.clone())]);
            serde_json::from_value::<T>(Value::Object(single)).is_ok()
        });
    let mut decoded: T =
        serde_json::from_value(Value::Object(typed)).map_err(|e| FrameError::Payload {
            kind,
            reason: e.to_string(),
        })?;
    decoded.extra_mut().extend(parked);
    Ok(decoded)
}

/// Borrow the typed payload out of a [`ServerEvent`].
///
/// Lets subscribers register for a kind with a closure over the concrete
/// payload type instead of matching on the whole event.
pub trait EventPayload: Sized {
    fn from_event(event: &ServerEvent) -> Option<&Self>;
}

impl EventPayload for ContentPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::ContentPublished(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for MatchPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::MatchCreated(p)
            | ServerEvent::MatchUpdated(p)
            | ServerEvent::MatchStarted(p)
            | ServerEvent::MatchEnded(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for StreamPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::StreamOnline(p) | ServerEvent::StreamOffline(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for ShopItemPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::ShopItemAdded(p) | ServerEvent::ShopItemUpdated(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for SurveyPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::SurveyPublished(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for RewardPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::RewardEarned(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for RedemptionPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::RedemptionStatusChanged(p) => Some(p),
            _ => None,
        }
    }
}

impl EventPayload for ErrorPayload {
    fn from_event(event: &ServerEvent) -> Option<&Self> {
        match event {
            ServerEvent::Error(p) => Some(p),
            _ => None,
        }
    }
}

// --- Classification ---

/// System frames handled by the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemFrame {
    Ping,
    Pong,
    AuthSuccess,
    AuthError { message: String },
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    System(SystemFrame),
    Event {
        event: ServerEvent,
        timestamp: Option<i64>,
    },
}

/// Parse and classify one inbound text frame.
pub fn parse_frame(text: &str) -> Result<Inbound, FrameError> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

    if let Some(system) = SystemKind::from_wire(&frame.kind) {
        let parsed = match system {
            SystemKind::Ping => SystemFrame::Ping,
            SystemKind::Pong => SystemFrame::Pong,
            SystemKind::AuthSuccess => SystemFrame::AuthSuccess,
            SystemKind::AuthError => SystemFrame::AuthError {
                message: auth_error_message(&frame.payload),
            },
        };
        return Ok(Inbound::System(parsed));
    }

    let kind: EventKind = frame.kind.parse()?;
    let event = ServerEvent::from_parts(kind, frame.payload)?;
    Ok(Inbound::Event {
        event,
        timestamp: frame.timestamp,
    })
}

fn auth_error_message(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
        .unwrap_or("authentication rejected")
        .to_string()
}
