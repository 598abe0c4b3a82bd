//! Monitor: builds and supervises one pipeline per configured channel.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vigil_media::SourceFactory;
use vigil_models::MonitorConfig;
use vigil_notify::EventClient;
use vigil_pipeline::{ChannelWorkspace, PipelineDeps, StreamPipeline};

use crate::error::MonitorResult;
use crate::lifecycle::{self, ShutdownLatch};

/// Supervisor over all configured channels.
///
/// Each enabled channel gets an independent pipeline, event client, and
/// stream receiver; one channel failing never touches another. On
/// shutdown the monitor unwinds receivers first, then each pipeline
/// (dispatcher, reconstructor, render tasks, result sink), and stops the
/// event clients last so late packaged notifications still drain.
pub struct Monitor {
    cfg: MonitorConfig,
    deps: PipelineDeps,
    sources: Arc<dyn SourceFactory>,
    latch: Arc<ShutdownLatch>,
}

impl Monitor {
    pub fn new(cfg: MonitorConfig, deps: PipelineDeps, sources: Arc<dyn SourceFactory>) -> Self {
        Self {
            cfg,
            deps,
            sources,
            latch: Arc::new(ShutdownLatch::new()),
        }
    }

    /// The latch arming this monitor's shutdown.
    pub fn latch(&self) -> Arc<ShutdownLatch> {
        Arc::clone(&self.latch)
    }

    /// Run until the shutdown latch arms, then quiesce everything.
    pub async fn run(self) -> MonitorResult<()> {
        let run_id = chrono::Local::now().format("%m-%d-%H-%M-%S").to_string();
        let mut pipelines = Vec::new();
        let mut clients: Vec<JoinHandle<_>> = Vec::new();
        let mut receivers = Vec::new();

        for channel_cfg in self.cfg.channels.iter().filter(|c| c.enable) {
            let workspace =
                ChannelWorkspace::new(&self.cfg.workspace, &run_id, channel_cfg.index);
            let mut pipeline = StreamPipeline::start(
                channel_cfg.clone(),
                workspace,
                &self.deps,
                self.latch.subscribe(),
            )?;

            let events = pipeline.take_events().expect("events not yet taken");
            info!(
                channel = channel_cfg.index,
                "Event client [{}] is initializing...", channel_cfg.index
            );
            clients.push(tokio::spawn(
                EventClient::new(
                    &self.cfg.notifier,
                    channel_cfg.index,
                    events,
                    self.latch.subscribe(),
                )
                .run(),
            ));

            receivers.push(self.spawn_receiver(channel_cfg.clone(), &pipeline));
            pipelines.push(pipeline);
        }

        if let Some(seconds) = self.cfg.shut_down_after {
            tokio::spawn(lifecycle::shutdown_after(self.latch(), seconds));
        }
        tokio::spawn(lifecycle::stdin_shutdown(self.latch()));
        tokio::spawn(lifecycle::signal_shutdown(self.latch()));

        info!("Monitor: listening exit event");
        self.latch.armed().await;
        info!("Monitor: preparing exit system");

        for receiver in receivers {
            receiver.await.ok();
        }
        for pipeline in pipelines {
            pipeline.join().await;
        }
        for client in clients {
            match client.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Event client failed: {}", e),
                Err(e) => error!("Event client panicked: {}", e),
            }
        }
        info!("Monitor exit");
        Ok(())
    }

    /// Pump decoded frames from the channel's source into its pipeline.
    fn spawn_receiver(
        &self,
        cfg: vigil_models::ChannelConfig,
        pipeline: &StreamPipeline,
    ) -> JoinHandle<()> {
        let frames = pipeline.frames();
        let sources = Arc::clone(&self.sources);
        let mut shutdown = self.latch.subscribe();
        tokio::spawn(async move {
            let mut source = match sources.open(&cfg).await {
                Ok(source) => source,
                Err(e) => {
                    error!(
                        channel = cfg.index,
                        "Failed to open stream source [{}]: {}", cfg.rtsp, e
                    );
                    return;
                }
            };
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let next = tokio::select! {
                    next = source.next() => next,
                    _ = shutdown.changed() => continue,
                };
                match next {
                    Ok(Some(frame)) => {
                        if frames.try_send(frame).is_err() {
                            warn!(channel = cfg.index, "Input queue full, dropping frame");
                        }
                    }
                    Ok(None) => {
                        info!(channel = cfg.index, "Stream [{}] ended", cfg.rtsp);
                        break;
                    }
                    Err(e) => {
                        warn!(channel = cfg.index, "Stream read failed: {}", e);
                        break;
                    }
                }
            }
            info!(channel = cfg.index, "Stream receiver exit");
        })
    }
}
