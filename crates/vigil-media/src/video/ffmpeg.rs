//! FFmpeg-backed clip writer.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use super::{VideoWriter, WriterFactory};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Opens [`FfmpegVideoWriter`] instances.
#[derive(Debug, Clone, Default)]
pub struct FfmpegWriterFactory;

#[async_trait]
impl WriterFactory for FfmpegWriterFactory {
    async fn open(
        &self,
        path: &Path,
        fps: f64,
        size: (u32, u32),
    ) -> MediaResult<Box<dyn VideoWriter>> {
        let writer = FfmpegVideoWriter::open(path, fps, size).await?;
        Ok(Box::new(writer))
    }
}

/// Clip writer piping raw RGB24 frames into an FFmpeg encode process.
pub struct FfmpegVideoWriter {
    path: PathBuf,
    size: (u32, u32),
    child: Child,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl FfmpegVideoWriter {
    /// Spawn the encoder. `size` is (height, width).
    pub async fn open(path: &Path, fps: f64, size: (u32, u32)) -> MediaResult<Self> {
        super::check_ffmpeg()?;

        let dims = format!("{}x{}", size.1, size.0);
        let rate = format!("{:.3}", fps);
        let args = [
            "-y",
            "-v",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            dims.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "-",
            "-c:v",
            "mpeg4",
            "-pix_fmt",
            "yuv420p",
        ];
        debug!("Spawning clip encoder: ffmpeg {} {}", args.join(" "), path.display());

        let mut child = Command::new("ffmpeg")
            .args(args)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();

        Ok(Self {
            path: path.to_path_buf(),
            size,
            child,
            stdin,
            frames_written: 0,
        })
    }
}

#[async_trait]
impl VideoWriter for FfmpegVideoWriter {
    async fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::WriterClosed(self.path.clone()))?;
        // the encoder was told one fixed geometry; conform stragglers to it
        let raw = if frame.shape() == self.size {
            frame.to_raw()
        } else {
            warn!(
                "Frame shape {:?} differs from clip size {:?}, resizing",
                frame.shape(),
                self.size
            );
            frame.resize_nearest(self.size.0, self.size.1).to_raw()
        };
        stdin.write_all(&raw).await?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        // closing stdin signals EOF to the encoder
        drop(self.stdin.take());
        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("clip encoder failed for {}", self.path.display()),
                status.code(),
            ))
        }
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
