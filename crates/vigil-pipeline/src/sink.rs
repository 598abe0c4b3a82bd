//! Best-effort result sink.
//!
//! Confirmed detections are queued to this task, which dumps the frame as
//! a PNG, cuts a square label crop around every rectangle, and appends the
//! rectangle list to the `bbox.json` sidecar. Failures are logged and
//! swallowed; the detection path never depends on this sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use vigil_media::{crop_center, Frame, MediaError};
use vigil_models::{FrameIndex, Rect};

use crate::error::PipelineResult;
use crate::paths::ChannelWorkspace;

/// One confirmed detection queued for persistence.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub frame: Arc<Frame>,
    pub index: FrameIndex,
    pub rects: Vec<Rect>,
}

/// Disk writer draining one channel's result queue.
pub struct ResultSink {
    workspace: ChannelWorkspace,
    channel: u32,
    shutdown: watch::Receiver<bool>,
    result_cnt: u64,
}

impl ResultSink {
    pub fn new(workspace: ChannelWorkspace, channel: u32, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            workspace,
            channel,
            shutdown,
            result_cnt: 0,
        }
    }

    /// Run until shutdown with an empty queue, or until all senders hang up.
    pub async fn run(mut self, mut records: mpsc::Receiver<ResultRecord>) -> PipelineResult<()> {
        info!(channel = self.channel, "Init detection frame write routine");
        loop {
            if *self.shutdown.borrow() {
                while let Ok(record) = records.try_recv() {
                    self.persist(&record);
                }
                break;
            }
            let record = tokio::select! {
                record = records.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
                _ = self.shutdown.changed() => continue,
            };
            self.persist(&record);
        }
        info!(channel = self.channel, "Frame write routine exit");
        Ok(())
    }

    fn persist(&mut self, record: &ResultRecord) {
        if let Err(e) = self.try_persist(record) {
            error!(
                channel = self.channel,
                "Failed to persist result frame [{}]: {}", record.index, e
            );
        }
    }

    fn try_persist(&mut self, record: &ResultRecord) -> PipelineResult<()> {
        self.result_cnt += 1;
        let name = format!(
            "{}{}.png",
            chrono::Local::now().format("%m-%d-%H-%M-"),
            self.result_cnt
        );
        let target = self.workspace.frames().join(&name);
        info!(
            channel = self.channel,
            "Writing result frame into [{}]",
            target.display()
        );
        record
            .frame
            .to_image()
            .save(&target)
            .map_err(MediaError::from)?;
        self.label_crop(record, &name)?;
        self.save_bbox(&name, &record.rects)?;
        Ok(())
    }

    /// Cut a label patch around every rectangle. The first crop reuses the
    /// frame's file name; further crops get a numeric suffix.
    fn label_crop(&self, record: &ResultRecord, name: &str) -> PipelineResult<()> {
        let stem = name.strip_suffix(".png").unwrap_or(name);
        for (k, rect) in record.rects.iter().enumerate() {
            let crop = crop_center(&record.frame, *rect)?;
            let crop_name = if k == 0 {
                name.to_string()
            } else {
                format!("{}-{}.png", stem, k)
            };
            crop.to_image()
                .save(self.workspace.crops().join(crop_name))
                .map_err(MediaError::from)?;
        }
        Ok(())
    }

    /// Read-modify-write the sidecar, flushed on every record.
    fn save_bbox(&self, name: &str, rects: &[Rect]) -> PipelineResult<()> {
        let path = self.workspace.bbox_json();
        let mut entries: BTreeMap<String, Vec<Rect>> = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        };
        entries.insert(name.to_string(), rects.to_vec());
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_with_dir() -> (ResultSink, ChannelWorkspace, tempfile::TempDir, watch::Sender<bool>) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = ChannelWorkspace::new(dir.path(), "run", 0);
        workspace.create(1, 1).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            ResultSink::new(workspace.clone(), 0, shutdown_rx),
            workspace,
            dir,
            shutdown_tx,
        )
    }

    fn record() -> ResultRecord {
        ResultRecord {
            frame: Arc::new(Frame::zeros(64, 64)),
            index: 7,
            rects: vec![Rect::new(10, 10, 20, 20), Rect::new(30, 5, 8, 8)],
        }
    }

    #[test]
    fn test_persist_writes_frame_crops_and_sidecar() {
        let (mut sink, workspace, _dir, _shutdown) = sink_with_dir();
        sink.persist(&record());

        let frames: Vec<_> = std::fs::read_dir(workspace.frames())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].ends_with("1.png"));

        let crops: Vec<_> = std::fs::read_dir(workspace.crops())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(crops.len(), 2);

        let sidecar: BTreeMap<String, Vec<Rect>> =
            serde_json::from_str(&std::fs::read_to_string(workspace.bbox_json()).unwrap()).unwrap();
        assert_eq!(sidecar[&frames[0]], record().rects);
    }

    #[test]
    fn test_sidecar_accumulates_across_records() {
        let (mut sink, workspace, _dir, _shutdown) = sink_with_dir();
        sink.persist(&record());
        sink.persist(&record());

        let sidecar: BTreeMap<String, Vec<Rect>> =
            serde_json::from_str(&std::fs::read_to_string(workspace.bbox_json()).unwrap()).unwrap();
        assert_eq!(sidecar.len(), 2);
    }

    #[tokio::test]
    async fn test_run_drains_queue_on_shutdown() {
        let (sink, workspace, _dir, shutdown) = sink_with_dir();
        let (tx, rx) = mpsc::channel(8);
        tx.send(record()).await.unwrap();
        tx.send(record()).await.unwrap();
        shutdown.send(true).unwrap();

        sink.run(rx).await.unwrap();
        assert_eq!(std::fs::read_dir(workspace.frames()).unwrap().count(), 2);
    }
}
