//! Per-channel workspace layout.
//!
//! Injected into the renderer and result sink as a value, keeping
//! ownership acyclic.

use std::path::{Path, PathBuf};

use crate::error::PipelineResult;

/// On-disk layout for one channel, rooted at the configured workspace.
#[derive(Debug, Clone)]
pub struct ChannelWorkspace {
    root: PathBuf,
}

impl ChannelWorkspace {
    /// Layout under `<workspace>/<run id>/<channel index>/`.
    pub fn new(workspace: &Path, run_id: &str, channel: u32) -> Self {
        Self {
            root: workspace.join(run_id).join(channel.to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-tile debug captures.
    pub fn blocks(&self, row: u32, col: u32) -> PathBuf {
        self.root.join("blocks").join(format!("{}-{}", row, col))
    }

    /// Result-writer frame dumps.
    pub fn frames(&self) -> PathBuf {
        self.root.join("frames")
    }

    /// Label crops around each detection.
    pub fn crops(&self) -> PathBuf {
        self.root.join("crops")
    }

    /// Clips with boxes drawn.
    pub fn render_streams(&self) -> PathBuf {
        self.root.join("render-streams")
    }

    /// Clips without boxes.
    pub fn original_streams(&self) -> PathBuf {
        self.root.join("original-streams")
    }

    /// Sidecar mapping result file names to their rectangles.
    pub fn bbox_json(&self) -> PathBuf {
        self.root.join("bbox.json")
    }

    /// Create the whole tree up front.
    pub fn create(&self, rows: u32, cols: u32) -> PipelineResult<()> {
        std::fs::create_dir_all(self.frames())?;
        std::fs::create_dir_all(self.crops())?;
        std::fs::create_dir_all(self.render_streams())?;
        std::fs::create_dir_all(self.original_streams())?;
        for row in 0..rows {
            for col in 0..cols {
                std::fs::create_dir_all(self.blocks(row, col))?;
            }
        }
        Ok(())
    }
}
