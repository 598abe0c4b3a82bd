//! Tile detector pool.
//!
//! Runs the injected tile kernel over the `rows × cols` grid of one
//! preprocessed frame, either fanned out across blocking workers (the
//! dispatcher's sampled path) or inline (the continuous filter's
//! synchronous re-detection).

use std::sync::Arc;

use tracing::info;
use vigil_media::{
    preprocess, DetectionResult, Frame, TileBlock, TileDetect, TileGeometry, TileParams,
};
use vigil_models::{ChannelConfig, FrameIndex};

use crate::error::{PipelineError, PipelineResult};

/// Shared tile fan-out used by the dispatcher and the reconstructor.
#[derive(Clone)]
pub struct TileRunner {
    cfg: ChannelConfig,
    geometry: TileGeometry,
    params: Vec<TileParams>,
    detector: Arc<dyn TileDetect>,
}

impl TileRunner {
    pub fn new(cfg: ChannelConfig, detector: Arc<dyn TileDetect>) -> Self {
        let geometry = TileGeometry::from_config(&cfg);
        info!(
            channel = cfg.index,
            "Init total [{}] detectors....",
            geometry.tiles()
        );
        let mut params = Vec::with_capacity(geometry.tiles());
        for row in 0..geometry.rows {
            for col in 0..geometry.cols {
                params.push(TileParams {
                    channel: cfg.index,
                    row,
                    col,
                    geometry,
                });
            }
        }
        info!(channel = cfg.index, "Detectors init done....");
        Self {
            cfg,
            geometry,
            params,
            detector,
        }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn tiles(&self) -> usize {
        self.params.len()
    }

    fn block(&self, frame: &Frame, index: FrameIndex, params: &TileParams) -> PipelineResult<TileBlock> {
        Ok(TileBlock {
            frame_index: index,
            tile: self.geometry.crop_tile(frame, params.row, params.col)?,
            frame_shape: frame.shape(),
        })
    }

    /// Fan one raw frame out to the worker pool and collect the results in
    /// grid order. Any failed tile fails the whole sample.
    pub async fn detect(&self, frame: &Frame, index: FrameIndex) -> PipelineResult<Vec<DetectionResult>> {
        let processed = preprocess(frame, &self.cfg);
        let mut handles = Vec::with_capacity(self.params.len());
        for params in &self.params {
            let block = self.block(&processed, index, params)?;
            let detector = Arc::clone(&self.detector);
            let params = *params;
            handles.push(tokio::task::spawn_blocking(move || {
                detector.detect(&block, &params)
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| PipelineError::tile_worker(e.to_string()))??;
            results.push(result);
        }
        Ok(results)
    }

    /// Run the kernels inline over one cached frame, without the
    /// classifier. Used by the continuous-filter hit test.
    pub fn detect_sync(&self, frame: &Frame, index: FrameIndex) -> PipelineResult<Vec<DetectionResult>> {
        let processed = preprocess(frame, &self.cfg);
        let mut results = Vec::with_capacity(self.params.len());
        for params in &self.params {
            let block = self.block(&processed, index, params)?;
            results.push(self.detector.detect(&block, params)?);
        }
        Ok(results)
    }
}
