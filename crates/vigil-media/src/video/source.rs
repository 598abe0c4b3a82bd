//! FFmpeg-backed frame source for RTSP/HTTP/file inputs.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::{FrameSource, SourceFactory};
use crate::error::MediaResult;
use crate::frame::Frame;
use vigil_models::ChannelConfig;

/// Opens [`FfmpegFrameSource`] instances from channel configuration.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSourceFactory;

#[async_trait]
impl SourceFactory for FfmpegSourceFactory {
    async fn open(&self, cfg: &ChannelConfig) -> MediaResult<Box<dyn FrameSource>> {
        let source = FfmpegFrameSource::open(&cfg.rtsp, cfg.shape).await?;
        Ok(Box::new(source))
    }
}

/// Decodes a stream URI into raw RGB24 frames over a pipe.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    size: (u32, u32),
    buf: Vec<u8>,
}

impl FfmpegFrameSource {
    /// Spawn the decoder. `size` is the (height, width) frames are scaled to.
    pub async fn open(uri: &str, size: (u32, u32)) -> MediaResult<Self> {
        super::check_ffmpeg()?;

        let dims = format!("{}x{}", size.1, size.0);
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-v").arg("error");
        if uri.starts_with("rtsp://") {
            cmd.arg("-rtsp_transport").arg("tcp");
        }
        cmd.arg("-i")
            .arg(uri)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(&dims)
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        debug!("Spawning stream decoder for [{}] at {}", uri, dims);

        let mut child = cmd.spawn()?;
        let stdout = BufReader::new(child.stdout.take().expect("stdout not captured"));

        Ok(Self {
            child,
            stdout,
            size,
            buf: vec![0u8; size.0 as usize * size.1 as usize * 3],
        })
    }

    /// Stop the decoder process.
    pub async fn close(mut self) -> MediaResult<()> {
        self.child.kill().await.ok();
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next(&mut self) -> MediaResult<Option<Frame>> {
        match self.stdout.read_exact(&mut self.buf).await {
            Ok(_) => Ok(Some(Frame::from_raw(
                self.size.0,
                self.size.1,
                self.buf.clone(),
            )?)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
