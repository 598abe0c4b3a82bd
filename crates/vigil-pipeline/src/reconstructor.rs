//! Reconstructor: whole-frame verdicts from tile results.
//!
//! A single task per channel joins the tile results for one frame,
//! classifies every candidate rectangle, applies the continuous-detection
//! filter, and on confirmation publishes the event, stamps the render
//! frame, and arms the clip renderer.

use std::sync::Arc;

use ndarray::{s, Array2};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use vigil_media::{
    bbox_points, crop_by_rect, draw_boundary, draw_rectangle, hist_cosine_similarity,
    random_color, Classifier, DetectionResult, Frame, Verdict,
};
use vigil_models::{detect_message, ChannelConfig, FrameIndex, Rect};

use crate::error::{PipelineError, PipelineResult};
use crate::filter::{ContinuousFilter, FilterDecision, PreDecision};
use crate::render::{FrameCache, RectCache, StreamRender};
use crate::sink::ResultRecord;
use crate::tiles::TileRunner;

/// Delay between polls while waiting for an original frame.
const ORIGINAL_POLL_DELAY: Duration = Duration::from_millis(500);

/// Polls before a missing original frame is given up on.
const ORIGINAL_POLL_TRIES: u32 = 60;

/// Reconstruction output for one sampled frame.
#[derive(Debug, Clone)]
pub struct ConstructResult {
    /// Preview of the reconstructed frame: the original, with the tile
    /// grid overlaid when the channel's `draw_boundary` aid is on. Absent
    /// when eviction raced the reconstruction.
    pub frame: Option<Arc<Frame>>,
    /// Whole-frame binary mask assembled from the tile masks.
    pub binary: Array2<u8>,
}

/// Per-channel reconstructor.
pub struct Reconstructor {
    cfg: ChannelConfig,
    tiles: TileRunner,
    classifier: Arc<dyn Classifier>,
    original_cache: FrameCache,
    render_cache: FrameCache,
    rect_cache: RectCache,
    stream_render: Arc<StreamRender>,
    filter: ContinuousFilter,
    events: mpsc::Sender<String>,
    results: mpsc::Sender<ResultRecord>,
    shutdown: watch::Receiver<bool>,
}

impl Reconstructor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: ChannelConfig,
        tiles: TileRunner,
        classifier: Arc<dyn Classifier>,
        original_cache: FrameCache,
        render_cache: FrameCache,
        rect_cache: RectCache,
        stream_render: Arc<StreamRender>,
        events: mpsc::Sender<String>,
        results: mpsc::Sender<ResultRecord>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let filter = ContinuousFilter::new(&cfg);
        Self {
            cfg,
            tiles,
            classifier,
            original_cache,
            render_cache,
            rect_cache,
            stream_render,
            filter,
            events,
            results,
            shutdown,
        }
    }

    /// Consume tile result sets in index order until shutdown or the
    /// dispatcher hangs up. The in-flight frame always completes.
    pub async fn run(mut self, mut samples: mpsc::Receiver<Vec<DetectionResult>>) -> PipelineResult<()> {
        info!(channel = self.cfg.index, "Start collect and construct");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let results = tokio::select! {
                results = samples.recv() => match results {
                    Some(results) => results,
                    None => break,
                },
                _ = self.shutdown.changed() => continue,
            };
            if let Err(e) = self.collect_and_reconstruct(results).await {
                error!(channel = self.cfg.index, "Reconstruct failed: {}", e);
            }
        }
        info!(channel = self.cfg.index, "Reconstructor exit");
        Ok(())
    }

    /// Assemble the tile binary masks into a whole-frame mask, grid
    /// row-major.
    fn construct_binary(&self, results: &[DetectionResult]) -> Array2<u8> {
        let geometry = self.tiles.geometry();
        let th = geometry.tile_h as usize;
        let tw = geometry.tile_w as usize;
        let mut full = Array2::zeros((geometry.rows as usize * th, geometry.cols as usize * tw));
        for r in results {
            if r.binary.dim() != (th, tw) {
                warn!(
                    channel = self.cfg.index,
                    "Tile ({}, {}) mask shape {:?} does not match grid step ({}, {})",
                    r.row,
                    r.col,
                    r.binary.dim(),
                    th,
                    tw
                );
                continue;
            }
            let y0 = r.row as usize * th;
            let x0 = r.col as usize * tw;
            full.slice_mut(s![y0..y0 + th, x0..x0 + tw]).assign(&r.binary);
        }
        full
    }

    /// Join the tile results for one frame, classify candidates, and drive
    /// the renderer and event queue.
    pub async fn collect_and_reconstruct(
        &mut self,
        results: Vec<DetectionResult>,
    ) -> PipelineResult<ConstructResult> {
        let Some(first) = results.first() else {
            return Err(PipelineError::tile_worker("empty tile result set"));
        };
        let current_index = first.frame_index;
        let binary = self.construct_binary(&results);
        debug!(
            channel = self.cfg.index,
            "Construct frames into an original frame...."
        );

        let Some(original) = self.wait_original(current_index).await else {
            warn!(
                channel = self.cfg.index,
                "Frame [{}] left the original cache, proceeding with tile binary only",
                current_index
            );
            return Ok(ConstructResult { frame: None, binary });
        };
        let mut render_frame = (*original).clone();
        let geometry = self.tiles.geometry();

        for r in &results {
            if r.rects.is_empty() {
                continue;
            }
            let frame_rects: Vec<Rect> = r
                .rects
                .iter()
                .map(|rect| geometry.translate(*rect, r.row, r.col))
                .collect();
            let record = ResultRecord {
                frame: Arc::clone(&original),
                index: current_index,
                rects: frame_rects.clone(),
            };
            if self.results.try_send(record).is_err() {
                warn!(
                    channel = self.cfg.index,
                    "Result queue full, dropping record for frame [{}]", current_index
                );
            }
            for rect in &frame_rects {
                let patch = match crop_by_rect(self.cfg.bbox_pad, *rect, &render_frame) {
                    Ok(patch) => patch,
                    Err(e) => {
                        warn!(
                            channel = self.cfg.index,
                            "Skipping degenerate candidate at frame [{}]: {}", current_index, e
                        );
                        continue;
                    }
                };
                match self.classifier.predict(&patch) {
                    Ok(Verdict::Hit) => {}
                    Ok(Verdict::Miss) => continue,
                    Err(e) => {
                        warn!(
                            channel = self.cfg.index,
                            "Classifier failed at frame [{}]: {}", current_index, e
                        );
                        continue;
                    }
                }
                let decision = match self.filter.check(current_index) {
                    PreDecision::Emit => FilterDecision::Emit,
                    PreDecision::Suppress => FilterDecision::Suppress,
                    PreDecision::Probe => {
                        let average = self.similarity_sweep(current_index, &results, &original);
                        self.filter.resolve(current_index, average)
                    }
                };
                if decision == FilterDecision::Suppress {
                    // the rest of this frame is the same suppressed object;
                    // the renderer is not notified for it either
                    return Ok(ConstructResult {
                        frame: Some(self.preview_frame(&original)),
                        binary,
                    });
                }
                self.confirm(current_index, *rect, &frame_rects, &mut render_frame);
            }
        }

        if self.cfg.render {
            self.stream_render.notify(current_index);
        }
        self.render_cache.prune(self.cfg.render_cache_size);
        self.rect_cache.prune(self.cfg.render_cache_size);
        Ok(ConstructResult {
            frame: Some(self.preview_frame(&original)),
            binary,
        })
    }

    /// Preview of the reconstructed frame. With `draw_boundary` on, the
    /// tile grid is drawn over a copy; the cached original stays clean.
    fn preview_frame(&self, original: &Arc<Frame>) -> Arc<Frame> {
        if !self.cfg.draw_boundary {
            return Arc::clone(original);
        }
        let mut preview = (**original).clone();
        draw_boundary(&mut preview, &self.tiles.geometry());
        Arc::new(preview)
    }

    /// Publish one confirmed detection: event, render stamp, renderer arm.
    fn confirm(
        &mut self,
        index: FrameIndex,
        rect: Rect,
        frame_rects: &[Rect],
        render_frame: &mut Frame,
    ) {
        info!(
            channel = self.cfg.index,
            "============ Object detected at frame [{}] ============", index
        );
        match detect_message(&self.cfg.rtsp, self.cfg.index, index, frame_rects) {
            Ok(msg) => {
                if self.events.try_send(msg).is_err() {
                    warn!(
                        channel = self.cfg.index,
                        "Event queue full, detect message dropped"
                    );
                } else {
                    info!(channel = self.cfg.index, "Put detect message in event queue");
                }
            }
            Err(e) => error!(
                channel = self.cfg.index,
                "Failed to encode detect message: {}", e
            ),
        }
        if self.cfg.render {
            let (p1, p2) = bbox_points(self.cfg.bbox_pad, rect, render_frame.shape(), 0, 0);
            draw_rectangle(render_frame, p1, p2, random_color());
            self.render_cache.insert(index, Arc::new(render_frame.clone()));
            self.rect_cache.insert(index, frame_rects.to_vec());
            self.stream_render.reset(index);
        }
        self.filter.record(index);
    }

    /// Poll for the original frame of the reconstructed index.
    ///
    /// Gives up immediately when eviction has already raced past the
    /// index, and eventually on shutdown or poll exhaustion.
    async fn wait_original(&self, index: FrameIndex) -> Option<Arc<Frame>> {
        for _ in 0..ORIGINAL_POLL_TRIES {
            if let Some(frame) = self.original_cache.get(index) {
                return Some(frame);
            }
            if self.original_cache.min_key().is_some_and(|min| min > index) {
                return None;
            }
            if *self.shutdown.borrow() {
                return None;
            }
            info!(
                channel = self.cfg.index,
                "Current index [{}] not in original frame cache, may have been cleared", index
            );
            tokio::time::sleep(ORIGINAL_POLL_DELAY).await;
        }
        None
    }

    /// Average histogram similarity between the current candidates and the
    /// re-detected trail in the look-ahead window.
    fn similarity_sweep(
        &self,
        index: FrameIndex,
        current: &[DetectionResult],
        original: &Frame,
    ) -> Option<f64> {
        info!(
            channel = self.cfg.index,
            "Enter continuous exception handle process at frame [{}]", index
        );
        let start = std::time::Instant::now();
        let geometry = self.tiles.geometry();
        let mut hit_sum = 0.0_f64;
        let mut hit_cnt = 0_u32;
        for idx in index + 1..index + self.cfg.search_window_size {
            let Some(history) = self.original_cache.get(idx) else {
                continue;
            };
            let history_results = match self.tiles.detect_sync(&history, idx) {
                Ok(results) => results,
                Err(e) => {
                    warn!(
                        channel = self.cfg.index,
                        "Post-detect failed at frame [{}]: {}", idx, e
                    );
                    continue;
                }
            };
            for (tile, hist_result) in history_results.iter().enumerate() {
                let Some(cur_result) = current.get(tile) else {
                    continue;
                };
                let pairs = cur_result.rects.len().min(hist_result.rects.len());
                for k in 0..pairs {
                    let hist_rect =
                        geometry.translate(hist_result.rects[k], hist_result.row, hist_result.col);
                    let cur_rect =
                        geometry.translate(cur_result.rects[k], cur_result.row, cur_result.col);
                    let (Ok(hist_patch), Ok(cur_patch)) = (
                        crop_by_rect(self.cfg.bbox_pad, hist_rect, &history),
                        crop_by_rect(self.cfg.bbox_pad, cur_rect, original),
                    ) else {
                        continue;
                    };
                    let similarity = hist_cosine_similarity(&hist_patch, &cur_patch);
                    debug!(
                        channel = self.cfg.index,
                        "Frame [{}]: cosine similarity {:.2}", idx, similarity
                    );
                    hit_sum += similarity;
                    hit_cnt += 1;
                }
            }
        }
        info!(
            channel = self.cfg.index,
            "Continuous exception handle consumed [{:.2}]s over [{}] patch pairs",
            start.elapsed().as_secs_f64(),
            hit_cnt
        );
        if hit_cnt > 0 {
            Some(hit_sum / hit_cnt as f64)
        } else {
            None
        }
    }
}
