//! Per-channel pipeline wiring.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vigil_media::{Classifier, Frame, TileDetect, WriterFactory};
use vigil_models::ChannelConfig;

use crate::cache::SharedCache;
use crate::dispatcher::Dispatcher;
use crate::error::PipelineResult;
use crate::paths::ChannelWorkspace;
use crate::reconstructor::Reconstructor;
use crate::render::{RenderContext, StreamRender};
use crate::sink::ResultSink;
use crate::tiles::TileRunner;

/// Bound of the per-channel event queue.
pub const EVENT_QUEUE_SIZE: usize = 500;

/// Injected collaborators shared by every channel.
#[derive(Clone)]
pub struct PipelineDeps {
    pub detector: Arc<dyn TileDetect>,
    pub classifier: Arc<dyn Classifier>,
    pub writer_factory: Arc<dyn WriterFactory>,
}

/// One running channel: the dispatcher, reconstructor, and result sink
/// tasks plus the queues feeding them.
pub struct StreamPipeline {
    channel: u32,
    frames: mpsc::Sender<Frame>,
    events: Option<mpsc::Receiver<String>>,
    dispatcher: JoinHandle<PipelineResult<()>>,
    reconstructor: JoinHandle<PipelineResult<()>>,
    stream_render: Arc<StreamRender>,
    sink: JoinHandle<PipelineResult<()>>,
}

impl StreamPipeline {
    /// Create the workspace tree, the caches, and spawn the channel tasks.
    pub fn start(
        cfg: ChannelConfig,
        workspace: ChannelWorkspace,
        deps: &PipelineDeps,
        shutdown: watch::Receiver<bool>,
    ) -> PipelineResult<Self> {
        workspace.create(cfg.routine.rows, cfg.routine.cols)?;

        let original_cache = SharedCache::new("original frame");
        let render_cache = SharedCache::new("render frame");
        let rect_cache = SharedCache::new("render rect");

        let (frames_tx, frames_rx) = mpsc::channel(cfg.max_streams_cache.max(1));
        let (samples_tx, samples_rx) = mpsc::channel(cfg.max_streams_cache.max(1));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (results_tx, results_rx) = mpsc::channel(cfg.max_streams_cache.max(1));

        let stream_render = StreamRender::new(RenderContext {
            cfg: cfg.clone(),
            workspace: workspace.clone(),
            original_cache: original_cache.clone(),
            render_cache: render_cache.clone(),
            rect_cache: rect_cache.clone(),
            writer_factory: Arc::clone(&deps.writer_factory),
            events: events_tx.clone(),
            shutdown: shutdown.clone(),
        });

        let tiles = TileRunner::new(cfg.clone(), Arc::clone(&deps.detector));
        let dispatcher = Dispatcher::new(
            cfg.clone(),
            tiles.clone(),
            original_cache.clone(),
            samples_tx,
            shutdown.clone(),
        );
        let reconstructor = Reconstructor::new(
            cfg.clone(),
            tiles,
            Arc::clone(&deps.classifier),
            original_cache,
            render_cache,
            rect_cache,
            Arc::clone(&stream_render),
            events_tx,
            results_tx,
            shutdown.clone(),
        );
        let sink = ResultSink::new(workspace, cfg.index, shutdown);

        info!(channel = cfg.index, "Init detector controller....");
        let dispatcher = tokio::spawn(dispatcher.run(frames_rx));
        let reconstructor = tokio::spawn(reconstructor.run(samples_rx));
        let sink = tokio::spawn(sink.run(results_rx));
        info!(channel = cfg.index, "Done init detector controller");

        Ok(Self {
            channel: cfg.index,
            frames: frames_tx,
            events: Some(events_rx),
            dispatcher,
            reconstructor,
            stream_render,
            sink,
        })
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Sender feeding decoded frames into the dispatcher.
    pub fn frames(&self) -> mpsc::Sender<Frame> {
        self.frames.clone()
    }

    /// Offer a frame, dropping it when the input queue is full.
    ///
    /// Recency beats completeness here: a stalled pipeline keeps observing
    /// fresh frames instead of queueing an ever-older backlog.
    pub fn offer(&self, frame: Frame) {
        if self.frames.try_send(frame).is_err() {
            warn!(channel = self.channel, "Input queue full, dropping frame");
        }
    }

    /// Take the event queue receiver for the notifier client. Yields
    /// `Some` exactly once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<String>> {
        self.events.take()
    }

    /// Await the channel tasks in unwind order: dispatcher, reconstructor,
    /// render tasks, then the result sink.
    pub async fn join(self) {
        // dropping the frame sender lets the dispatcher drain and stop
        drop(self.frames);
        for (name, handle) in [
            ("Dispatcher", self.dispatcher),
            ("Reconstructor", self.reconstructor),
        ] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(channel = self.channel, "{} failed: {}", name, e),
                Err(e) => error!(channel = self.channel, "{} panicked: {}", name, e),
            }
        }
        // with the reconstructor stopped no new window can arm; wait out
        // the writer tasks so their packaged notifications are queued
        // before the event client drains
        self.stream_render.join().await;
        match self.sink.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(channel = self.channel, "Result sink failed: {}", e),
            Err(e) => error!(channel = self.channel, "Result sink panicked: {}", e),
        }
        info!(channel = self.channel, "Pipeline exit");
    }
}
