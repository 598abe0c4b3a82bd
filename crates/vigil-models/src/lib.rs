//! Shared data models for the Vigil stream monitor.
//!
//! This crate provides Serde-serializable types for:
//! - Rectangles and frame indices exchanged between pipeline stages
//! - Notifier message schemas (detected / packaged)
//! - Per-channel and server configuration

pub mod config;
pub mod notify;
pub mod rect;

// Re-export common types
pub use config::{ChannelConfig, MonitorConfig, NotifierConfig, TileRoutine};
pub use notify::{
    detect_message, packaged_message, position_json, Coordinate, DetectData, DetectMessage,
    PackagedData, PackagedMessage,
};
pub use rect::Rect;

/// Monotonic per-channel frame stamp, 1-based, assigned by the dispatcher.
pub type FrameIndex = u64;
