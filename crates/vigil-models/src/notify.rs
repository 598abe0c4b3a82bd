//! Notifier message schemas.
//!
//! These messages maintain compatibility with the upstream notifier
//! protocol: UTF-8 JSON envelopes with a `cmdType`/`clientId` header and a
//! typed `data` payload. Detected-event coordinates are a JSON-encoded
//! string (double-encoded field) as the notifier expects.

use serde::{Deserialize, Serialize};
use serde_json::Error;

use crate::rect::Rect;
use crate::FrameIndex;

/// Application id carried on detected notifications.
pub const APP_ID: &str = "10080";

/// Client id carried on every notification.
pub const CLIENT_ID: &str = "jt001";

/// Corner-form position entry inside the double-encoded `coordinates` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lx: i64,
    pub ly: i64,
    pub rx: i64,
    pub ry: i64,
}

impl From<Rect> for Coordinate {
    fn from(rect: Rect) -> Self {
        Self {
            lx: rect.x,
            ly: rect.y,
            rx: rect.right(),
            ry: rect.bottom(),
        }
    }
}

impl From<Coordinate> for Rect {
    fn from(c: Coordinate) -> Self {
        Rect::new(c.lx, c.ly, c.rx - c.lx, c.ry - c.ly)
    }
}

/// Payload of a `detectedNotify` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectData {
    pub notify_type: String,
    pub video_stream: String,
    pub channel: u32,
    pub timestamp: FrameIndex,
    /// JSON-encoded array of [`Coordinate`] entries.
    pub coordinates: String,
}

/// Envelope of a `detectedNotify` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectMessage {
    pub cmd_type: String,
    pub app_id: String,
    pub client_id: String,
    pub data: DetectData,
}

impl DetectMessage {
    /// Decode the double-encoded `coordinates` field back into rectangles.
    pub fn rects(&self) -> Result<Vec<Rect>, Error> {
        let coords: Vec<Coordinate> = serde_json::from_str(&self.data.coordinates)?;
        Ok(coords.into_iter().map(Rect::from).collect())
    }
}

/// Payload of a `packagedNotify` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedData {
    pub notify_type: String,
    pub filename: String,
    pub path: String,
}

/// Envelope of a `packagedNotify` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedMessage {
    pub cmd_type: String,
    pub client_id: String,
    pub data: PackagedData,
}

/// Encode rectangles into the corner-form position array.
pub fn position_json(rects: &[Rect]) -> Result<String, Error> {
    let coords: Vec<Coordinate> = rects.iter().copied().map(Coordinate::from).collect();
    serde_json::to_string(&coords)
}

/// Build the JSON string for a detected notification.
pub fn detect_message(
    video_stream: &str,
    channel: u32,
    timestamp: FrameIndex,
    rects: &[Rect],
) -> Result<String, Error> {
    let msg = DetectMessage {
        cmd_type: "notify".to_string(),
        app_id: APP_ID.to_string(),
        client_id: CLIENT_ID.to_string(),
        data: DetectData {
            notify_type: "detectedNotify".to_string(),
            video_stream: video_stream.to_string(),
            channel,
            timestamp,
            coordinates: position_json(rects)?,
        },
    };
    serde_json::to_string(&msg)
}

/// Build the JSON string for a packaged notification.
pub fn packaged_message(filename: &str, path: &str) -> Result<String, Error> {
    let msg = PackagedMessage {
        cmd_type: "notify".to_string(),
        client_id: CLIENT_ID.to_string(),
        data: PackagedData {
            notify_type: "packagedNotify".to_string(),
            filename: filename.to_string(),
            path: path.to_string(),
        },
    };
    serde_json::to_string(&msg)
}
