//! FFmpeg CLI integration tests.

use vigil_media::{FfmpegFrameSource, FfmpegVideoWriter, Frame, FrameSource, VideoWriter};

fn gradient(height: u32, width: u32, seed: u8) -> Frame {
    let mut frame = Frame::zeros(height, width);
    for y in 0..height as usize {
        for x in 0..width as usize {
            frame.data_mut()[[y, x, 0]] = seed;
            frame.data_mut()[[y, x, 1]] = (x % 256) as u8;
            frame.data_mut()[[y, x, 2]] = (y % 256) as u8;
        }
    }
    frame
}

/// Encode a short clip, then decode it back through the frame source.
#[tokio::test]
#[ignore = "requires FFmpeg"]
async fn test_writer_then_source_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");

    let mut writer = FfmpegVideoWriter::open(&path, 24.0, (64, 96)).await.unwrap();
    for i in 0..12u8 {
        writer.write(&gradient(64, 96, i * 20)).await.unwrap();
    }
    assert_eq!(writer.frames_written(), 12);
    writer.finish().await.unwrap();
    assert!(path.is_file());

    let mut source = FfmpegFrameSource::open(path.to_str().unwrap(), (64, 96))
        .await
        .unwrap();
    let mut decoded = 0;
    while let Some(frame) = source.next().await.unwrap() {
        assert_eq!(frame.shape(), (64, 96));
        decoded += 1;
    }
    assert_eq!(decoded, 12);
}

/// Frames of the wrong geometry are conformed to the clip size.
#[tokio::test]
#[ignore = "requires FFmpeg"]
async fn test_writer_resizes_stragglers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.mp4");

    let mut writer = FfmpegVideoWriter::open(&path, 24.0, (64, 96)).await.unwrap();
    writer.write(&gradient(64, 96, 0)).await.unwrap();
    writer.write(&gradient(32, 48, 0)).await.unwrap();
    writer.finish().await.unwrap();
    assert!(path.is_file());
}
