//! Detection stream renderer.
//!
//! For each confirmed detection the renderer cuts two clips spanning the
//! frames around the detection index: a "rect" clip with boxes drawn and
//! interpolated across sample gaps, and an "original" clip of the same
//! window. Each armed window spawns exactly two writer tasks; the future
//! half of the window waits on a latch the reconstructor releases once
//! enough frames have accumulated.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use vigil_media::{
    bbox_points, draw_rectangle, random_color, Frame, VideoWriter, WriterFactory, CLIP_FPS,
};
use vigil_models::{packaged_message, ChannelConfig, FrameIndex, Rect};

use crate::cache::SharedCache;
use crate::paths::ChannelWorkspace;

/// Wall-clock bound for each render phase.
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between retries while a frame is missing from every cache.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Missing-frame retries before the index is skipped.
const MAX_TRIES: u32 = 100;

/// Frames keyed by index.
pub type FrameCache = SharedCache<Arc<Frame>>;

/// Rectangle lists keyed by index.
pub type RectCache = SharedCache<Vec<Rect>>;

/// Everything a render task needs, injected as a value so the renderer
/// holds no back-reference to its controller.
pub struct RenderContext {
    pub cfg: ChannelConfig,
    pub workspace: ChannelWorkspace,
    pub original_cache: FrameCache,
    pub render_cache: FrameCache,
    pub rect_cache: RectCache,
    pub writer_factory: Arc<dyn WriterFactory>,
    pub events: mpsc::Sender<String>,
    pub shutdown: watch::Receiver<bool>,
}

/// Set/clear/wait event in the shape the render tasks need.
#[derive(Debug)]
struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    fn new(set: bool) -> Self {
        let (tx, _) = watch::channel(set);
        Self { tx }
    }

    fn set(&self) {
        self.tx.send_replace(true);
    }

    fn clear(&self) {
        self.tx.send_replace(false);
    }

    fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until set or the timeout elapses. Returns the final state.
    async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            if *rx.borrow() {
                return true;
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                _ => return *rx.borrow(),
            }
        }
    }
}

#[derive(Debug)]
struct RenderState {
    /// Center of the window being (or last) written.
    detect_index: FrameIndex,
    /// A window is being written (`is_trigger_write` in the state machine).
    armed: bool,
    /// Both writer tasks for the window have been spawned.
    write_done: bool,
    /// Running clip sequence number.
    stream_cnt: u64,
    /// Writer tasks spawned so far, awaited by [`StreamRender::join`].
    tasks: Vec<JoinHandle<()>>,
}

/// Per-channel clip renderer.
pub struct StreamRender {
    ctx: Arc<RenderContext>,
    state: Mutex<RenderState>,
    next_prepared: Latch,
}

impl StreamRender {
    pub fn new(ctx: RenderContext) -> Arc<Self> {
        Arc::new(Self {
            ctx: Arc::new(ctx),
            state: Mutex::new(RenderState {
                detect_index: 0,
                armed: false,
                write_done: false,
                stream_cnt: 0,
                tasks: Vec::new(),
            }),
            next_prepared: Latch::new(true),
        })
    }

    /// Center of the current window.
    pub fn detect_index(&self) -> FrameIndex {
        self.state.lock().expect("render state poisoned").detect_index
    }

    /// Re-arm on a confirmed detection once the previous window has ended.
    pub fn reset(&self, detect_index: FrameIndex) {
        let mut state = self.state.lock().expect("render state poisoned");
        if detect_index.saturating_sub(state.detect_index) > self.ctx.cfg.future_frames {
            state.detect_index = detect_index;
            state.armed = false;
            state.write_done = false;
            self.next_prepared.set();
            info!(channel = self.ctx.cfg.index, "Reset stream render");
        }
    }

    /// Observe the reconstructor's progress.
    ///
    /// Spawns the two writer tasks for a freshly armed window, and releases
    /// the future-phase latch once the window edge is reached.
    pub fn notify(self: &Arc<Self>, current_index: FrameIndex) {
        let mut state = self.state.lock().expect("render state poisoned");
        // detect_index stays 0 until the first confirmed detection; there
        // is nothing to cut before that
        if !state.armed && state.detect_index > 0 && self.next_prepared.is_set() {
            self.next_prepared.clear();
            state.stream_cnt += 1;
            let seq = state.stream_cnt;
            let detect_index = state.detect_index;
            let this = Arc::clone(self);
            let rect =
                tokio::spawn(async move { this.rect_render_task(detect_index, seq).await });
            let this = Arc::clone(self);
            let original =
                tokio::spawn(async move { this.original_render_task(detect_index, seq).await });
            state.tasks.push(rect);
            state.tasks.push(original);
            state.armed = true;
            state.write_done = true;
        }
        if current_index.saturating_sub(state.detect_index) >= self.ctx.cfg.future_frames
            && state.write_done
            && !self.next_prepared.is_set()
        {
            self.next_prepared.set();
            info!(
                channel = self.ctx.cfg.index,
                "Notify detection stream writer. Current frame index [{}], previous detected frame index [{}]",
                current_index,
                state.detect_index
            );
        }
    }

    /// Await every spawned writer task.
    ///
    /// Called during shutdown once the reconstructor has stopped, so the
    /// packaged notification of an in-flight clip still reaches the event
    /// queue before the notifier client drains it.
    pub async fn join(&self) {
        let tasks = {
            let mut state = self.state.lock().expect("render state poisoned");
            std::mem::take(&mut state.tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!(channel = self.ctx.cfg.index, "Render task panicked: {}", e);
            }
        }
    }

    /// Wait for the future-phase latch, giving up on timeout or shutdown.
    async fn wait_next_prepared(&self) {
        let mut shutdown = self.ctx.shutdown.clone();
        tokio::select! {
            _ = self.next_prepared.wait(RENDER_TIMEOUT) => {}
            _ = shutdown.wait_for(|armed| *armed) => {}
        }
    }

    fn clip_name(seq: u64) -> String {
        format!("{}{}.mp4", chrono::Local::now().format("%m-%d-%H-%M-%S-"), seq)
    }

    async fn open_writer(&self, target: &std::path::Path) -> Option<Box<dyn VideoWriter>> {
        match self
            .ctx
            .writer_factory
            .open(target, CLIP_FPS, self.ctx.cfg.shape)
            .await
        {
            Ok(writer) => Some(writer),
            Err(e) => {
                error!(
                    channel = self.ctx.cfg.index,
                    "Failed to open clip writer [{}]: {}",
                    target.display(),
                    e
                );
                None
            }
        }
    }

    async fn rect_render_task(self: Arc<Self>, detect_index: FrameIndex, seq: u64) {
        let channel = self.ctx.cfg.index;
        let future_frames = self.ctx.cfg.future_frames;
        let target = self.ctx.workspace.render_streams().join(Self::clip_name(seq));
        info!(
            channel,
            "Rect render task [{}]: writing detection stream into [{}]",
            seq,
            target.display()
        );
        let Some(mut writer) = self.open_writer(&target).await else {
            return;
        };

        let started = Instant::now();
        let mut next_cnt = detect_index.saturating_sub(future_frames).max(1);
        next_cnt = self
            .write_render_video_work(writer.as_mut(), next_cnt, detect_index)
            .await;

        // wait until the frames ahead of the detection have accumulated;
        // give up on timeout and finish with whatever is cached
        if !self.next_prepared.is_set() {
            info!(channel, "Rect render task [{}] waits for future frames....", seq);
            let wait_start = Instant::now();
            self.wait_next_prepared().await;
            info!(
                channel,
                "Rect render task [{}] waited [{:.2}] seconds",
                seq,
                wait_start.elapsed().as_secs_f64()
            );
        }

        let end_cnt = next_cnt + future_frames;
        self.write_render_video_work(writer.as_mut(), next_cnt, end_cnt)
            .await;
        if let Err(e) = writer.finish().await {
            error!(channel, "Rect render task [{}] writer failed: {}", seq, e);
            return;
        }
        info!(
            channel,
            "Rect render task [{}]: consumed [{:.2}] seconds, wrote [{}]",
            seq,
            started.elapsed().as_secs_f64(),
            target.display()
        );

        let filename = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match packaged_message(&filename, &target.to_string_lossy()) {
            Ok(msg) => {
                if self.ctx.events.try_send(msg).is_err() {
                    warn!(channel, "Event queue full, packaged message dropped");
                } else {
                    info!(channel, "Put packaged message in the event queue");
                }
            }
            Err(e) => error!(channel, "Failed to encode packaged message: {}", e),
        }
    }

    async fn original_render_task(self: Arc<Self>, detect_index: FrameIndex, seq: u64) {
        let channel = self.ctx.cfg.index;
        let future_frames = self.ctx.cfg.future_frames;
        let target = self
            .ctx
            .workspace
            .original_streams()
            .join(Self::clip_name(seq));
        info!(
            channel,
            "Original render task [{}]: writing stream into [{}]",
            seq,
            target.display()
        );
        let Some(mut writer) = self.open_writer(&target).await else {
            return;
        };

        let started = Instant::now();
        let mut next_cnt = detect_index.saturating_sub(future_frames).max(1);
        next_cnt = self
            .write_original_video_work(writer.as_mut(), next_cnt, detect_index)
            .await;

        if !self.next_prepared.is_set() {
            info!(channel, "Original render task [{}] waits for future frames....", seq);
            self.wait_next_prepared().await;
        }

        let end_cnt = next_cnt + future_frames;
        self.write_original_video_work(writer.as_mut(), next_cnt, end_cnt)
            .await;
        if let Err(e) = writer.finish().await {
            error!(channel, "Original render task [{}] writer failed: {}", seq, e);
            return;
        }
        info!(
            channel,
            "Original render task [{}]: consumed [{:.2}] seconds, wrote [{}]",
            seq,
            started.elapsed().as_secs_f64(),
            target.display()
        );
    }

    /// Write `[next_cnt, end_cnt)` of the rect clip, interpolating boxes
    /// between stamped sample frames. Returns the next unwritten index.
    pub(crate) async fn write_render_video_work(
        &self,
        writer: &mut dyn VideoWriter,
        mut next_cnt: FrameIndex,
        end_cnt: FrameIndex,
    ) -> FrameIndex {
        let channel = self.ctx.cfg.index;
        let start = Instant::now();
        let mut try_times = 0u32;
        if next_cnt < 1 {
            next_cnt = 1;
        }
        while next_cnt < end_cnt {
            if *self.ctx.shutdown.borrow() {
                info!(channel, "Render task interrupted by exit signal");
                return next_cnt;
            }
            if self.ctx.render_cache.contains(next_cnt) {
                // look ahead one sample gap for the next stamped frame
                let mut forward_cnt = (next_cnt + self.ctx.cfg.sample_rate).min(end_cnt);
                while forward_cnt > next_cnt && !self.ctx.render_cache.contains(forward_cnt) {
                    forward_cnt -= 1;
                }
                if forward_cnt - next_cnt <= 1 {
                    if let Some(frame) = self.ctx.render_cache.get(next_cnt) {
                        self.write_frame(writer, &frame).await;
                    }
                    next_cnt += 1;
                } else {
                    next_cnt = self
                        .write_interpolated_span(writer, next_cnt, forward_cnt)
                        .await;
                }
            } else if let Some(frame) = self.ctx.original_cache.get(next_cnt) {
                self.write_frame(writer, &frame).await;
                next_cnt += 1;
            } else {
                try_times += 1;
                tokio::time::sleep(RETRY_DELAY).await;
                if try_times > MAX_TRIES {
                    try_times = 0;
                    info!(channel, "Try time overflow, round to the next cnt");
                    next_cnt += 1;
                }
                info!(channel, "Lost frame index: [{}]", next_cnt);
            }
            if start.elapsed() > RENDER_TIMEOUT {
                info!(channel, "Task time overflow, complete previous render task");
                break;
            }
        }
        next_cnt
    }

    /// Write the `[next_cnt, forward_cnt)` span with boxes translated
    /// linearly between the stamped rectangles at both ends.
    async fn write_interpolated_span(
        &self,
        writer: &mut dyn VideoWriter,
        mut next_cnt: FrameIndex,
        forward_cnt: FrameIndex,
    ) -> FrameIndex {
        let step = forward_cnt - next_cnt;
        let first_rects = self.ctx.rect_cache.get(next_cnt).unwrap_or_default();
        let last_rects = self.ctx.rect_cache.get(forward_cnt).unwrap_or_default();
        if first_rects.is_empty() || last_rects.len() != first_rects.len() {
            // mismatched windows cannot be paired up; write the stamped
            // frame untouched and move on
            if let Some(frame) = self.ctx.render_cache.get(next_cnt) {
                self.write_frame(writer, &frame).await;
            }
            return next_cnt + 1;
        }
        for i in 0..step {
            let Some(original) = self.ctx.original_cache.get(next_cnt) else {
                if let Some(frame) = self.ctx.render_cache.get(next_cnt) {
                    self.write_frame(writer, &frame).await;
                }
                next_cnt += 1;
                continue;
            };
            let mut frame = (*original).clone();
            let mut draw_flag = true;
            for (first, last) in first_rects.iter().zip(last_rects.iter()) {
                let delta_x = (last.x - first.x) as f64 / step as f64;
                let delta_y = (last.y - first.y) as f64 / step as f64;
                if delta_x.abs() > 100.0 / step as f64 || delta_y.abs() > 100.0 / step as f64 {
                    draw_flag = false;
                    break;
                }
                let (p1, p2) = bbox_points(
                    self.ctx.cfg.bbox_pad,
                    *first,
                    frame.shape(),
                    (i as f64 * delta_x) as i64,
                    (i as f64 * delta_y) as i64,
                );
                draw_rectangle(&mut frame, p1, p2, random_color());
            }
            if draw_flag {
                self.write_frame(writer, &frame).await;
            } else {
                self.write_frame(writer, &original).await;
            }
            next_cnt += 1;
        }
        next_cnt
    }

    /// Write `[next_cnt, end_cnt)` of the original clip.
    pub(crate) async fn write_original_video_work(
        &self,
        writer: &mut dyn VideoWriter,
        mut next_cnt: FrameIndex,
        end_cnt: FrameIndex,
    ) -> FrameIndex {
        let channel = self.ctx.cfg.index;
        let start = Instant::now();
        let mut try_times = 0u32;
        if next_cnt < 1 {
            next_cnt = 1;
        }
        while next_cnt < end_cnt {
            if *self.ctx.shutdown.borrow() {
                info!(channel, "Original task interrupted by exit signal");
                return next_cnt;
            }
            if let Some(frame) = self.ctx.original_cache.get(next_cnt) {
                self.write_frame(writer, &frame).await;
                next_cnt += 1;
            } else {
                try_times += 1;
                tokio::time::sleep(RETRY_DELAY).await;
                if try_times > MAX_TRIES {
                    try_times = 0;
                    info!(channel, "Try time overflow, round to the next cnt");
                    next_cnt += 1;
                }
                info!(channel, "Lost frame index: [{}]", next_cnt);
            }
            if start.elapsed() > RENDER_TIMEOUT {
                info!(channel, "Task time overflow, complete previous render task");
                break;
            }
        }
        next_cnt
    }

    async fn write_frame(&self, writer: &mut dyn VideoWriter, frame: &Frame) {
        if let Err(e) = writer.write(frame).await {
            // transient writer hiccups must not abort the clip
            warn!(channel = self.ctx.cfg.index, "Clip write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use vigil_media::MediaResult;

    type Frames = Arc<Mutex<Vec<Frame>>>;

    struct FakeWriter {
        path: PathBuf,
        frames: Frames,
    }

    #[async_trait]
    impl VideoWriter for FakeWriter {
        async fn write(&mut self, frame: &Frame) -> MediaResult<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        async fn finish(&mut self) -> MediaResult<()> {
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.frames.lock().unwrap().len() as u64
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    #[derive(Clone, Default)]
    struct FakeWriterFactory {
        opened: Arc<Mutex<HashMap<PathBuf, Frames>>>,
    }

    impl FakeWriterFactory {
        fn clips(&self, dir_part: &str) -> Vec<Vec<Frame>> {
            self.opened
                .lock()
                .unwrap()
                .iter()
                .filter(|(path, _)| path.to_string_lossy().contains(dir_part))
                .map(|(_, frames)| frames.lock().unwrap().clone())
                .collect()
        }
    }

    #[async_trait]
    impl WriterFactory for FakeWriterFactory {
        async fn open(
            &self,
            path: &Path,
            _fps: f64,
            _size: (u32, u32),
        ) -> MediaResult<Box<dyn VideoWriter>> {
            let frames: Frames = Arc::default();
            self.opened
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), Arc::clone(&frames));
            Ok(Box::new(FakeWriter {
                path: path.to_path_buf(),
                frames,
            }))
        }
    }

    struct Harness {
        render: Arc<StreamRender>,
        factory: FakeWriterFactory,
        events: mpsc::Receiver<String>,
        _dir: tempfile::TempDir,
        _shutdown: watch::Sender<bool>,
    }

    fn harness(cfg: ChannelConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let workspace = ChannelWorkspace::new(dir.path(), "run", cfg.index);
        workspace.create(1, 1).unwrap();
        let factory = FakeWriterFactory::default();
        let (events_tx, events_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let render = StreamRender::new(RenderContext {
            cfg,
            workspace,
            original_cache: SharedCache::new("original frame"),
            render_cache: SharedCache::new("render frame"),
            rect_cache: SharedCache::new("render rect"),
            writer_factory: Arc::new(factory.clone()),
            events: events_tx,
            shutdown: shutdown_rx,
        });
        Harness {
            render,
            factory,
            events: events_rx,
            _dir: dir,
            _shutdown: shutdown_tx,
        }
    }

    fn small_cfg() -> ChannelConfig {
        ChannelConfig {
            shape: (64, 64),
            sample_rate: 4,
            future_frames: 8,
            bbox_pad: 0,
            ..ChannelConfig::default()
        }
    }

    fn marker_frame(height: u32, width: u32, value: u8) -> Frame {
        let mut frame = Frame::zeros(height, width);
        frame.data_mut().fill(value);
        frame
    }

    fn is_blank(frame: &Frame) -> bool {
        frame.data().iter().all(|v| *v == 0)
    }

    async fn fake_writer(factory: &FakeWriterFactory, name: &str) -> (Box<dyn VideoWriter>, Frames) {
        let writer = factory
            .open(Path::new(name), CLIP_FPS, (64, 64))
            .await
            .unwrap();
        let frames = Arc::clone(factory.opened.lock().unwrap().get(Path::new(name)).unwrap());
        (writer, frames)
    }

    #[tokio::test]
    async fn test_interpolation_translates_boxes() {
        let h = harness(small_cfg());
        for idx in 96..=110 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
        }
        h.render.ctx.render_cache.insert(100, Arc::new(marker_frame(64, 64, 7)));
        h.render.ctx.render_cache.insert(104, Arc::new(marker_frame(64, 64, 7)));
        h.render.ctx.rect_cache.insert(100, vec![Rect::new(10, 20, 8, 8)]);
        h.render.ctx.rect_cache.insert(104, vec![Rect::new(50, 20, 8, 8)]);

        let (mut writer, frames) = fake_writer(&h.factory, "interp.mp4").await;
        let next = h
            .render
            .write_render_video_work(writer.as_mut(), 100, 110)
            .await;
        assert_eq!(next, 110);

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 10);
        // four interpolated frames with the box advancing by delta_x = 10
        for (i, frame) in frames.iter().take(4).enumerate() {
            let corner_x = 10 + 10 * i;
            let corner: Vec<u8> = (0..3).map(|c| frame.data()[[20, corner_x, c]]).collect();
            assert_ne!(corner, vec![0, 0, 0], "frame {} missing box at x={}", i, corner_x);
            // no box at the previous offset
            if i > 0 {
                let stale: Vec<u8> = (0..3).map(|c| frame.data()[[20, corner_x - 10, c]]).collect();
                assert_eq!(stale, vec![0, 0, 0]);
            }
        }
        // the stamped sample frame at 104 is written as-is
        assert_eq!(frames[4].data()[[0, 0, 0]], 7);
        // trailing frames come from the original cache
        assert!(frames[5..].iter().all(is_blank));
    }

    #[tokio::test]
    async fn test_interpolation_rejected_on_large_delta() {
        let cfg = ChannelConfig {
            shape: (64, 256),
            ..small_cfg()
        };
        let h = harness(cfg);
        for idx in 100..=110 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 256)));
        }
        h.render.ctx.render_cache.insert(100, Arc::new(marker_frame(64, 256, 7)));
        h.render.ctx.render_cache.insert(104, Arc::new(marker_frame(64, 256, 7)));
        h.render.ctx.rect_cache.insert(100, vec![Rect::new(20, 20, 8, 8)]);
        // 120 pixels in 4 steps: |delta_x| = 30 > 100 / step
        h.render.ctx.rect_cache.insert(104, vec![Rect::new(140, 20, 8, 8)]);

        let (mut writer, frames) = fake_writer(&h.factory, "reject.mp4").await;
        h.render
            .write_render_video_work(writer.as_mut(), 100, 104)
            .await;

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(is_blank), "span must fall back to unadorned frames");
    }

    #[tokio::test]
    async fn test_mismatched_rect_counts_skip_interpolation() {
        let h = harness(small_cfg());
        for idx in 100..=104 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
        }
        h.render.ctx.render_cache.insert(100, Arc::new(marker_frame(64, 64, 7)));
        h.render.ctx.render_cache.insert(104, Arc::new(marker_frame(64, 64, 9)));
        h.render.ctx.rect_cache.insert(100, vec![Rect::new(10, 20, 8, 8)]);
        h.render.ctx.rect_cache.insert(
            104,
            vec![Rect::new(30, 20, 8, 8), Rect::new(50, 20, 8, 8)],
        );

        let (mut writer, frames) = fake_writer(&h.factory, "mismatch.mp4").await;
        h.render
            .write_render_video_work(writer.as_mut(), 100, 104)
            .await;

        let frames = frames.lock().unwrap();
        // stamped frame written untouched, then originals
        assert_eq!(frames[0].data()[[0, 0, 0]], 7);
        assert!(frames[1..].iter().all(is_blank));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_timeout_truncates_clip() {
        let h = harness(small_cfg());
        // frame 102 is permanently missing; the 30 s phase timeout fires
        // before the per-index retry counter can exhaust
        for idx in [100u64, 101] {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
        }
        let (mut writer, frames) = fake_writer(&h.factory, "timeout.mp4").await;
        let next = h
            .render
            .write_original_video_work(writer.as_mut(), 100, 108)
            .await;
        assert_eq!(next, 102);
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_window_flow_emits_packaged_event() {
        let cfg = small_cfg();
        let h = harness(cfg);
        for idx in 1..=120 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
        }
        h.render.ctx.render_cache.insert(100, Arc::new(marker_frame(64, 64, 7)));
        h.render.ctx.rect_cache.insert(100, vec![Rect::new(10, 20, 8, 8)]);

        h.render.reset(100);
        h.render.notify(100);
        // the window edge releases the future phase
        h.render.notify(110);

        let mut h = h;
        let msg = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
            .await
            .expect("packaged event within deadline")
            .expect("event channel open");
        let parsed: vigil_models::PackagedMessage = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed.data.notify_type, "packagedNotify");
        assert!(parsed.data.filename.ends_with("1.mp4"));

        // both clips cover the full window
        for dir in ["render-streams", "original-streams"] {
            let clips = h.factory.clips(dir);
            assert_eq!(clips.len(), 1, "expected one {} clip", dir);
            assert_eq!(clips[0].len() as u64, 2 * h.render.ctx.cfg.future_frames);
        }
    }

    #[tokio::test]
    async fn test_join_queues_packaged_event_before_returning() {
        let h = harness(small_cfg());
        for idx in 92..=100 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
        }
        h.render.ctx.render_cache.insert(100, Arc::new(marker_frame(64, 64, 7)));
        h.render.ctx.rect_cache.insert(100, vec![Rect::new(10, 20, 8, 8)]);

        h.render.reset(100);
        h.render.notify(100);
        // shutdown lands mid-window; the writer tasks must still wind down
        // quickly instead of sitting out the latch timeout
        h._shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.render.join())
            .await
            .expect("render tasks stop promptly on shutdown");

        // the truncated rect clip was still released and announced
        let mut h = h;
        let msg = h.events.try_recv().expect("packaged event queued before join returns");
        let parsed: vigil_models::PackagedMessage = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed.data.notify_type, "packagedNotify");
        assert_eq!(h.factory.clips("render-streams").len(), 1);
        assert_eq!(h.factory.clips("original-streams").len(), 1);
    }

    #[tokio::test]
    async fn test_notify_without_detection_spawns_nothing() {
        let h = harness(small_cfg());
        for idx in 1..=20 {
            h.render.ctx.original_cache.insert(idx, Arc::new(Frame::zeros(64, 64)));
            h.render.notify(idx);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.factory.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_ignores_detection_inside_window() {
        let h = harness(small_cfg());
        h.render.reset(100);
        assert_eq!(h.render.detect_index(), 100);
        // 104 is still inside the armed window of 100
        h.render.reset(104);
        assert_eq!(h.render.detect_index(), 100);
        h.render.reset(120);
        assert_eq!(h.render.detect_index(), 120);
    }
}
