//! Frame dispatcher.
//!
//! A single task per channel: stamps every incoming frame with the next
//! index, inserts it into the original cache, and on sample boundaries
//! fans the lagged target frame out to the tile pool. Complete tile
//! result sets are handed to the reconstructor in index order.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vigil_media::{DetectionResult, Frame};
use vigil_models::{ChannelConfig, FrameIndex};

use crate::error::PipelineResult;
use crate::render::FrameCache;
use crate::tiles::TileRunner;

/// Per-channel frame dispatcher.
pub struct Dispatcher {
    cfg: ChannelConfig,
    tiles: TileRunner,
    original_cache: FrameCache,
    samples: mpsc::Sender<Vec<DetectionResult>>,
    shutdown: watch::Receiver<bool>,
    frame_cnt: FrameIndex,
    sample_cnt: u64,
    window_started: Instant,
}

impl Dispatcher {
    pub fn new(
        cfg: ChannelConfig,
        tiles: TileRunner,
        original_cache: FrameCache,
        samples: mpsc::Sender<Vec<DetectionResult>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cfg,
            tiles,
            original_cache,
            samples,
            shutdown,
            frame_cnt: 0,
            sample_cnt: 0,
            window_started: Instant::now(),
        }
    }

    /// Highest frame index stamped so far.
    pub fn frame_cnt(&self) -> FrameIndex {
        self.frame_cnt
    }

    /// Consume frames until shutdown or the receiver hangs up. The
    /// in-flight sample always completes before the latch is observed
    /// again.
    pub async fn run(mut self, mut frames: mpsc::Receiver<Frame>) -> PipelineResult<()> {
        info!(channel = self.cfg.index, "Dispatcher start");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let frame = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = self.shutdown.changed() => continue,
            };
            if !self.dispatch_frame(frame).await {
                break;
            }
        }
        info!(channel = self.cfg.index, "Dispatcher exit");
        Ok(())
    }

    /// Stamp and cache one frame; dispatch the lagged sample when due.
    /// Returns `false` once the reconstructor is gone.
    pub async fn dispatch_frame(&mut self, frame: Frame) -> bool {
        self.frame_cnt += 1;
        let index = self.frame_cnt;
        self.original_cache.insert(index, Arc::new(frame));

        // warm-up: keep a pre-roll cached ahead of the dispatched index so
        // interpolation and the filter's look-ahead stay in-cache
        let mut alive = true;
        if index > self.cfg.pre_cache {
            let target = index - self.cfg.pre_cache;
            if target % self.cfg.sample_rate == 0 {
                alive = self.dispatch_sample(target).await;
            }
        }
        self.original_cache.prune(self.cfg.original_cache_size);
        alive
    }

    async fn dispatch_sample(&mut self, target: FrameIndex) -> bool {
        debug!(
            channel = self.cfg.index,
            "Dispatch frame [{}] to all detectors....", target
        );
        let Some(original) = self.original_cache.get(target) else {
            warn!(
                channel = self.cfg.index,
                "Unknown frame index [{}] to fetch frame in cache", target
            );
            return true;
        };
        match self.tiles.detect(&original, target).await {
            Ok(results) => {
                if self.samples.send(results).await.is_err() {
                    return false;
                }
            }
            // a failed tile drops the whole sample; no partial result set
            // is ever handed over
            Err(e) => warn!(
                channel = self.cfg.index,
                "Sample [{}] dropped: {}", target, e
            ),
        }
        self.log_throughput();
        true
    }

    fn log_throughput(&mut self) {
        self.sample_cnt += 1;
        if (self.sample_cnt * self.cfg.sample_rate) % 100 == 0 {
            let elapsed = self.window_started.elapsed().as_secs_f64();
            info!(
                channel = self.cfg.index,
                "Operation speed rate [{:.2}]s/100fs, unit process rate [{:.2}]s/f",
                elapsed,
                elapsed / 100.0
            );
            self.window_started = Instant::now();
        }
    }
}
