//! JSON wire protocol between canvas clients and the hub.
//!
//! All messages are JSON text frames over a persistent WebSocket:
//! ```text
//! server → client   {"eventType":"pixelsRemainingEvent","pixelsRemaining":1000}
//! server → client   {"eventType":"initialImage","data":["#ffffff", ...]}   (N² entries)
//! server → client   {"eventType":"drawPixelEvent","index":42,"color":"#ff0000"}
//! client → server   {"index":42,"color":"#ff0000"}                          (no wrapper)
//! ```
//!
//! On connect the server sends `pixelsRemainingEvent` followed by
//! `initialImage`, in that order, before it processes any client frames —
//! that pair is the baseline every later `drawPixelEvent` delta applies to.

use fresco_core::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single client→server message kind: one edit request.
///
/// Deliberately unwrapped (no `eventType` tag) — the client only ever says
/// one thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Flat cell index, `y * size + x`.
    pub index: usize,
    /// Requested cell color.
    pub color: Color,
}

impl ClientFrame {
    pub fn new(index: usize, color: Color) -> Self {
        Self { index, color }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Server→client events, tagged by `eventType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum ServerEvent {
    /// Current quota for the receiving connection's identity.
    #[serde(rename = "pixelsRemainingEvent")]
    PixelsRemaining {
        #[serde(rename = "pixelsRemaining")]
        pixels_remaining: u32,
    },
    /// Full grid baseline sent once on connect; `data` has N² entries.
    #[serde(rename = "initialImage")]
    InitialImage { data: Vec<Color> },
    /// One accepted edit, fanned out to every other live connection.
    #[serde(rename = "drawPixelEvent")]
    DrawPixel { index: usize, color: Color },
}

impl ServerEvent {
    /// Quota-status event.
    pub fn pixels_remaining(pixels_remaining: u32) -> Self {
        Self::PixelsRemaining { pixels_remaining }
    }

    /// Full-grid baseline event.
    pub fn initial_image(data: Vec<Color>) -> Self {
        Self::InitialImage { data }
    }

    /// Single-cell delta event.
    pub fn draw_pixel(index: usize, color: Color) -> Self {
        Self::DrawPixel { index, color }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    ConnectionClosed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_roundtrip() {
        let frame = ClientFrame::new(42, Color::rgb(0xff, 0, 0));
        let encoded = frame.encode().unwrap();
        let decoded = ClientFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_client_frame_wire_shape() {
        // The client message carries no eventType wrapper.
        let frame = ClientFrame::decode(r##"{"index":7,"color":"#00ff00"}"##).unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(frame.color, Color::rgb(0, 0xff, 0));
    }

    #[test]
    fn test_pixels_remaining_wire_shape() {
        let event = ServerEvent::pixels_remaining(1000);
        let encoded = event.encode().unwrap();
        assert_eq!(
            encoded,
            r#"{"eventType":"pixelsRemainingEvent","pixelsRemaining":1000}"#
        );
    }

    #[test]
    fn test_draw_pixel_wire_shape() {
        let event = ServerEvent::draw_pixel(42, Color::rgb(0xff, 0, 0));
        let encoded = event.encode().unwrap();
        assert_eq!(
            encoded,
            r##"{"eventType":"drawPixelEvent","index":42,"color":"#ff0000"}"##
        );
    }

    #[test]
    fn test_initial_image_roundtrip() {
        let data = vec![Color::WHITE, Color::rgb(1, 2, 3), Color::rgb(4, 5, 6)];
        let event = ServerEvent::initial_image(data.clone());
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, ServerEvent::InitialImage { data });
    }

    #[test]
    fn test_decode_rejects_unknown_event_type() {
        let result = ServerEvent::decode(r#"{"eventType":"mystery","index":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ServerEvent::decode("not json").is_err());
        assert!(ClientFrame::decode("{\"index\":}").is_err());
    }

    #[test]
    fn test_client_frame_rejects_bad_color() {
        assert!(ClientFrame::decode(r#"{"index":0,"color":"red"}"#).is_err());
    }
}
