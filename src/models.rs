//! Shared models and wire types
//!
//! Types shared across the synchronizer, the backend client and the view
//! layer. The backend speaks JSON over HTTP and over the event socket;
//! everything here mirrors that wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Image reference used when an alert arrives without one
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg?height=300&width=400";

/// Detection classification carried by an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Person,
    Animal,
}

/// Where a detection was processed: on the drone or by ground infrastructure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    Onboard,
    Offboard,
}

/// Operator-selected filter over alert sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    #[default]
    All,
    Onboard,
    Offboard,
}

impl SourceFilter {
    /// Whether an alert with the given source passes this filter
    pub fn matches(&self, source: Option<AlertSource>) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Onboard => source == Some(AlertSource::Onboard),
            SourceFilter::Offboard => source == Some(AlertSource::Offboard),
        }
    }
}

/// AI processing task requested of the drone
///
/// Single tagged state: `Off` is a real variant, not a flag next to a stale
/// mode value, so invalid combinations cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Off,
    Detection,
    #[serde(rename = "facerecognition")]
    FaceRecognition,
}

/// The two switchable processing tasks (everything except `Off`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingKind {
    Detection,
    FaceRecognition,
}

impl ProcessingKind {
    /// Backend endpoint path for this task's on/off command
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            ProcessingKind::Detection => "process/detection",
            ProcessingKind::FaceRecognition => "process/facerecognition",
        }
    }

    pub fn as_mode(&self) -> ProcessingMode {
        match self {
            ProcessingKind::Detection => ProcessingMode::Detection,
            ProcessingKind::FaceRecognition => ProcessingMode::FaceRecognition,
        }
    }
}

/// Event socket transport health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// One surveillance recording period, owned by the backend
///
/// Active ⇔ `ended_at` is absent. The backend guarantees at most one active
/// session; this side only mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Last reported drone position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroneLocation {
    pub lat: f64,
    pub long: f64,
}

/// One detection alert, normalized from the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub detection: DetectionType,
    pub message: String,
    pub image: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<AlertSource>,
}

impl Alert {
    /// Normalize a raw wire payload into an `Alert`.
    ///
    /// Missing id becomes a time+random composite, missing image the
    /// placeholder reference, missing timestamp `now`. A frame-level source
    /// tag wins over one embedded in the payload.
    pub fn from_payload(
        payload: AlertPayload,
        frame_source: Option<AlertSource>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = payload
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("alert-{}-{}", now.timestamp_millis(), Uuid::new_v4()));
        let image = payload
            .image
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

        Self {
            id,
            detection: payload.detection,
            message: payload.message,
            image,
            timestamp: payload.timestamp.unwrap_or(now),
            confidence: payload.confidence,
            drone_id: payload.drone_id,
            source: frame_source.or(payload.source),
        }
    }
}

/// Raw alert payload as it appears on the wire (socket frames and history
/// endpoints). History rows carry their timestamp under `createdAt`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub detection: DetectionType,
    pub message: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub drone_id: Option<String>,
    #[serde(default)]
    pub source: Option<AlertSource>,
}

/// Classified inbound socket frame
#[derive(Debug, Clone)]
pub enum SocketFrame {
    Alert {
        source: Option<AlertSource>,
        payload: AlertPayload,
    },
    Location(DroneLocation),
}

impl SocketFrame {
    /// Classify one inbound text frame.
    ///
    /// `Err` means the frame was malformed JSON or an alert/location frame
    /// with a broken body; `Ok(None)` means a well-formed frame of a type
    /// this side does not handle (or one missing its `data`), which is
    /// silently ignored.
    pub fn parse(text: &str) -> Result<Option<SocketFrame>> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("alert") => {
                let Some(data) = value.get("data") else {
                    return Ok(None);
                };
                let source = value
                    .get("source")
                    .and_then(|s| serde_json::from_value(s.clone()).ok());
                let payload: AlertPayload = serde_json::from_value(data.clone())?;
                Ok(Some(SocketFrame::Alert { source, payload }))
            }
            Some("location") => {
                let Some(data) = value.get("data") else {
                    return Ok(None);
                };
                let location: DroneLocation = serde_json::from_value(data.clone())?;
                Ok(Some(SocketFrame::Location(location)))
            }
            _ => Ok(None),
        }
    }
}

/// Standard backend response wrapper: `{status: bool, data?: T}`
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct StatusEnvelope<T> {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> StatusEnvelope<T> {
    /// Unwrap the envelope, treating `status: false` or missing data as an
    /// API-level failure.
    pub fn into_data(self, context: &str) -> Result<T> {
        if !self.status {
            return Err(Error::Api(format!("{context}: backend reported failure")));
        }
        self.data
            .ok_or_else(|| Error::Api(format!("{context}: response missing data")))
    }
}

/// History/listing response wrapper: `{data: T}`
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Render a confidence score for display.
///
/// The backend emits either a 0–1 ratio or a 0–100 percentage depending on
/// the detection path; values below 1.0 are treated as ratios.
pub fn format_confidence(confidence: Option<f64>) -> Option<String> {
    let value = confidence?;
    if value <= 0.0 {
        return None;
    }
    let percent = if value < 1.0 {
        (value * 100.0).round()
    } else {
        value.round()
    };
    Some(format!("{}%", percent as i64))
}
