//! Whole-system test: fake source in, notifier socket out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use vigil_media::{
    Frame, FrameSource, LuminanceClassifier, MediaResult, SourceFactory, ThresholdDetector,
    VideoWriter, WriterFactory,
};
use vigil_models::{ChannelConfig, MonitorConfig, NotifierConfig, TileRoutine};
use vigil_monitor::Monitor;
use vigil_pipeline::PipelineDeps;

/// Source replaying a fixed frame a configured number of times.
struct ReplaySource {
    frame: Frame,
    remaining: u32,
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next(&mut self) -> MediaResult<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(self.frame.clone()))
    }
}

struct ReplaySourceFactory {
    frame: Frame,
    frames: u32,
}

#[async_trait]
impl SourceFactory for ReplaySourceFactory {
    async fn open(&self, _cfg: &ChannelConfig) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(ReplaySource {
            frame: self.frame.clone(),
            remaining: self.frames,
        }))
    }
}

struct NullWriter {
    path: PathBuf,
    written: u64,
}

#[async_trait]
impl VideoWriter for NullWriter {
    async fn write(&mut self, _frame: &Frame) -> MediaResult<()> {
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Clone, Default)]
struct NullWriterFactory {
    opened: Arc<Mutex<HashMap<PathBuf, ()>>>,
}

#[async_trait]
impl WriterFactory for NullWriterFactory {
    async fn open(
        &self,
        path: &Path,
        _fps: f64,
        _size: (u32, u32),
    ) -> MediaResult<Box<dyn VideoWriter>> {
        self.opened.lock().unwrap().insert(path.to_path_buf(), ());
        Ok(Box::new(NullWriter {
            path: path.to_path_buf(),
            written: 0,
        }))
    }
}

fn bright_blob_frame() -> Frame {
    let mut frame = Frame::zeros(32, 32);
    for y in 10..18 {
        for x in 10..18 {
            for c in 0..3 {
                frame.data_mut()[[y, x, c]] = 255;
            }
        }
    }
    frame
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detection_reaches_notifier_and_disk() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let cfg = MonitorConfig {
        workspace: workspace.path().to_path_buf(),
        shut_down_after: None,
        notifier: NotifierConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        channels: vec![ChannelConfig {
            index: 7,
            rtsp: "test://replay".to_string(),
            routine: TileRoutine { rows: 1, cols: 1 },
            shape: (32, 32),
            sample_rate: 1,
            pre_cache: 0,
            future_frames: 4,
            detect_internal: 5,
            search_window_size: 4,
            bbox_pad: 2,
            ..ChannelConfig::default()
        }],
    };

    let deps = PipelineDeps {
        detector: Arc::new(ThresholdDetector {
            threshold: 180,
            min_area: 4,
        }),
        classifier: Arc::new(LuminanceClassifier { min_mean: 60 }),
        writer_factory: Arc::new(NullWriterFactory::default()),
    };
    let sources = Arc::new(ReplaySourceFactory {
        frame: bright_blob_frame(),
        frames: 40,
    });

    let monitor = Monitor::new(cfg, deps, sources);
    let latch = monitor.latch();
    let run = tokio::spawn(monitor.run());

    // read the event stream until the first detection shows up
    let (mut conn, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("event client connects")
        .unwrap();
    let mut received = String::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !received.contains("detectedNotify") {
        let n = tokio::time::timeout_at(deadline, conn.read(&mut buf))
            .await
            .expect("detected event within deadline")
            .unwrap();
        assert_ne!(n, 0, "event stream closed before a detection arrived");
        received.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(received.contains("\"channel\":7"));
    assert!(received.contains("test://replay"));

    latch.arm();
    tokio::time::timeout(Duration::from_secs(15), run)
        .await
        .expect("monitor stops after the latch arms")
        .unwrap()
        .unwrap();

    // workspace tree: <root>/<run id>/<channel>/{frames,crops,...}
    let run_dir = std::fs::read_dir(workspace.path())
        .unwrap()
        .next()
        .expect("run directory created")
        .unwrap()
        .path();
    let channel_dir = run_dir.join("7");
    for sub in ["frames", "crops", "render-streams", "original-streams"] {
        assert!(channel_dir.join(sub).is_dir(), "missing {}", sub);
    }
    // the result sink persisted at least one confirmed frame
    assert!(std::fs::read_dir(channel_dir.join("frames")).unwrap().count() >= 1);
    assert!(channel_dir.join("bbox.json").is_file());
}
