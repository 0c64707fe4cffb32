use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::console::Console;
use crate::error::Error;
use crate::kubernetes::PodApi;
use crate::parser::Parser;
use crate::receiver::Receiver;
use crate::streamer::{Streamer, StreamerConfig};
use crate::theme::Theme;
use crate::types::Target;
use crate::watcher::Watcher;

struct StreamHandle {
    streamer: Streamer,
    color: usize,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    streams: HashMap<String, StreamHandle>,
    // ids whose stream open is in flight; a Removed event takes the id out
    opening: HashSet<String>,
    next_generation: u64,
}

impl Registry {
    /// Lowest palette index no live stream uses; wraps once every color is taken.
    fn free_color(&self, palette_len: usize) -> usize {
        let palette_len = palette_len.max(1);
        let used: HashSet<usize> = self.streams.values().map(|h| h.color).collect();
        (0..palette_len)
            .find(|i| !used.contains(i))
            .unwrap_or(self.streams.len() % palette_len)
    }
}

/// Owns the live target registry and keeps it in step with the watcher.
pub struct Runner<P: PodApi> {
    api: P,
    config: Arc<Config>,
    theme: Arc<Theme>,
    console: Console,
    registry: Mutex<Registry>,
    stop: CancellationToken,
}

impl<P: PodApi> Runner<P> {
    pub fn new(api: P, config: Arc<Config>, theme: Arc<Theme>, console: Console) -> Self {
        Self {
            api,
            config,
            theme,
            console,
            registry: Mutex::new(Registry::default()),
            stop: CancellationToken::new(),
        }
    }

    /// Start the watcher and both drain loops. The returned handle resolves when the
    /// watch loop ends; live streams keep running until [`Runner::stop`].
    pub fn run(self: &Arc<Self>) -> JoinHandle<Result<(), Error>> {
        let (watcher, mut events) = Watcher::new(Arc::clone(&self.config), self.stop.clone());

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(target) = events.added.recv().await {
                runner.add_target(target).await;
            }
        });

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(target) = events.removed.recv().await {
                runner.remove_target(&target).await;
            }
        });

        let api = self.api.clone();
        tokio::spawn(async move {
            let result = watcher.run(&api).await;
            if let Err(e) = &result {
                error!("{}", e);
            }
            result
        })
    }

    async fn add_target(self: &Arc<Self>, target: Target) {
        let id = target.id();

        // Modified events re-announce targets that are already streaming.
        let color = {
            let mut registry = self.registry.lock().await;
            if registry.streams.contains_key(&id) || registry.opening.contains(&id) {
                return;
            }
            registry.opening.insert(id.clone());
            registry.free_color(self.theme.palette_len())
        };

        let receiver = Arc::new(Receiver::new(
            &target,
            color,
            Parser::new(&self.config.mapping),
            Arc::clone(&self.theme),
            self.console.clone(),
        ));
        let streamer = Streamer::new(StreamerConfig {
            pod_name: target.pod_name.clone(),
            container_name: target.container_name.clone(),
            receiver,
            since_seconds: self.config.since_seconds(),
        });

        if let Err(e) = streamer.run(&self.api).await {
            debug!("Dropping target {}: {}", id, e);
            self.registry.lock().await.opening.remove(&id);
            return;
        }

        let mut registry = self.registry.lock().await;
        if !registry.opening.remove(&id) || self.stop.is_cancelled() {
            debug!("Target {} went away while opening", id);
            streamer.close();
            return;
        }
        info!("Tailing {}", id);
        let generation = registry.next_generation;
        registry.next_generation += 1;
        let finished = streamer.finished();
        registry.streams.insert(
            id.clone(),
            StreamHandle {
                streamer,
                color,
                generation,
            },
        );
        drop(registry);

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            finished.cancelled().await;
            runner.stream_finished(&id, generation).await;
        });
    }

    async fn remove_target(&self, target: &Target) {
        let id = target.id();
        let mut registry = self.registry.lock().await;
        registry.opening.remove(&id);
        if let Some(handle) = registry.streams.remove(&id) {
            info!("Stopped tailing {}", id);
            handle.streamer.close();
        }
    }

    /// Erase an entry whose read loop exited on its own (EOF or read error), so a
    /// later Added event for the same id opens a fresh stream.
    async fn stream_finished(&self, id: &str, generation: u64) {
        let mut registry = self.registry.lock().await;
        if registry.streams.get(id).map(|h| h.generation) != Some(generation) {
            return;
        }
        if let Some(handle) = registry.streams.remove(id) {
            info!("Log stream for {} ended", id);
            handle.streamer.close();
        }
    }

    /// Stop the watcher and close every live stream.
    pub async fn stop(&self) {
        self.stop.cancel();
        let mut registry = self.registry.lock().await;
        for (id, handle) in registry.streams.drain() {
            debug!("Closing {}", id);
            handle.streamer.close();
        }
    }

    /// Ids of the targets currently streaming, sorted.
    pub async fn active_targets(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.registry.lock().await.streams.keys().cloned().collect();
        ids.sort();
        ids
    }
}
