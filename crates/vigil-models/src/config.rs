//! Monitor, channel, and notifier configuration types.
//!
//! Loaded by the binary from a TOML file plus environment overrides;
//! unknown keys are ignored so channel files can carry operator notes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tile grid applied to every sampled frame of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRoutine {
    pub rows: u32,
    pub cols: u32,
}

impl TileRoutine {
    /// Number of tiles in the grid.
    pub fn tiles(&self) -> usize {
        (self.rows * self.cols) as usize
    }
}

impl Default for TileRoutine {
    fn default() -> Self {
        Self { rows: 2, cols: 2 }
    }
}

/// Per-channel pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel id, included in events.
    pub index: u32,
    /// Whether this channel is started at all.
    pub enable: bool,
    /// Stream URI, included in events.
    pub rtsp: String,
    /// Tile grid.
    pub routine: TileRoutine,
    /// Decoded frame shape as (height, width).
    pub shape: (u32, u32),
    /// Frames between sampled detection runs.
    pub sample_rate: u64,
    /// Dispatch lag: frames cached ahead of the detected index.
    pub pre_cache: u64,
    /// Half-window (in frames) for rendered clips.
    pub future_frames: u64,
    /// Debounce window (frames) for the continuous filter.
    pub detect_internal: u64,
    /// Look-ahead (frames) for the continuous filter hit test.
    pub search_window_size: u64,
    /// Input frame queue bound.
    pub max_streams_cache: usize,
    /// Enable clip rendering.
    pub render: bool,
    /// Margin (pixels) added on every side when expanding a box.
    pub bbox_pad: i64,
    /// Original frame cache bound.
    pub original_cache_size: usize,
    /// Render/rect cache bound.
    pub render_cache_size: usize,
    /// Preview aid: draw the tile grid on reconstructed frames.
    pub draw_boundary: bool,
    /// Preview aid: show a playback window. Carried for external viewers;
    /// the pipeline itself only passes it through.
    pub show_window: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            index: 0,
            enable: true,
            rtsp: String::new(),
            routine: TileRoutine::default(),
            shape: (1080, 1920),
            sample_rate: 1,
            pre_cache: 0,
            future_frames: 24,
            detect_internal: 48,
            search_window_size: 24,
            max_streams_cache: 500,
            render: true,
            bbox_pad: 80,
            original_cache_size: 1000,
            render_cache_size: 500,
            draw_boundary: false,
            show_window: false,
        }
    }
}

impl ChannelConfig {
    /// Frame width.
    pub fn width(&self) -> u32 {
        self.shape.1
    }

    /// Frame height.
    pub fn height(&self) -> u32 {
        self.shape.0
    }
}

/// Upstream notifier endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub host: String,
    pub port: u16,
}

impl NotifierConfig {
    /// Socket address string for connect calls.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Root of the per-channel workspace tree.
    pub workspace: PathBuf,
    /// Optional auto-shutdown after this many seconds.
    pub shut_down_after: Option<u64>,
    /// Upstream notifier endpoint.
    pub notifier: NotifierConfig,
    /// Configured channels; disabled entries are skipped at startup.
    pub channels: Vec<ChannelConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("workspace"),
            shut_down_after: None,
            notifier: NotifierConfig::default(),
            channels: Vec::new(),
        }
    }
}
