use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::io::AsyncBufReadExt;
use kube::api::LogParams;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::kubernetes::{LogLines, PodApi};
use crate::receiver::Receiver;

pub struct StreamerConfig {
    pub pod_name: String,
    pub container_name: String,
    pub receiver: Arc<Receiver>,
    pub since_seconds: i64,
}

/// Owns the follow-mode log stream of one container.
pub struct Streamer {
    pod_name: String,
    container_name: String,
    receiver: Arc<Receiver>,
    since_seconds: i64,
    cancel: CancellationToken,
    finished: CancellationToken,
    closed: AtomicBool,
}

impl Streamer {
    pub fn new(cfg: StreamerConfig) -> Self {
        Self {
            pod_name: cfg.pod_name,
            container_name: cfg.container_name,
            receiver: cfg.receiver,
            since_seconds: cfg.since_seconds,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn log_params(&self) -> LogParams {
        LogParams {
            follow: true,
            container: Some(self.container_name.clone()),
            since_seconds: Some(self.since_seconds),
            ..Default::default()
        }
    }

    /// Open the stream and start the read loop in the background.
    pub async fn run<P: PodApi>(&self, api: &P) -> Result<(), Error> {
        let lines = api
            .logs(&self.pod_name, &self.log_params())
            .await
            .map_err(|source| Error::StreamOpen {
                pod: self.pod_name.clone(),
                container: self.container_name.clone(),
                source,
            })?;

        debug!(
            "Streaming logs for pod {}/{} (since {}s)",
            self.pod_name, self.container_name, self.since_seconds
        );
        self.receiver.connected();

        tokio::spawn(read_loop(
            lines,
            Arc::clone(&self.receiver),
            self.cancel.clone(),
            self.finished.clone(),
            format!("{}/{}", self.pod_name, self.container_name),
        ));
        Ok(())
    }

    /// Cancelled once the read loop has exited, for whatever reason.
    pub fn finished(&self) -> CancellationToken {
        self.finished.clone()
    }

    /// Stop reading and print the end-of-stream marker. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.receiver.close();
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    mut lines: LogLines,
    receiver: Arc<Receiver>,
    cancel: CancellationToken,
    finished: CancellationToken,
    name: String,
) {
    let _finished = finished.drop_guard();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = lines.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    debug!("Log stream ended for {}", name);
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        receiver.receive(line);
                    }
                }
                Err(e) => {
                    debug!("Error reading log stream for {}: {}", name, e);
                    break;
                }
            }
        }
    }
    // dropping `lines` releases the underlying connection
}
