use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::kubernetes::{PodApi, PodEvent};
use crate::types::Target;

/// Receiving ends of the watcher's target deltas.
pub struct TargetEvents {
    pub added: mpsc::Receiver<Target>,
    pub removed: mpsc::Receiver<Target>,
}

/// Turns pod lifecycle events into Added/Removed targets according to the pod rules.
pub struct Watcher {
    config: Arc<Config>,
    added: mpsc::Sender<Target>,
    removed: mpsc::Sender<Target>,
    stop: CancellationToken,
}

impl Watcher {
    /// Both channels close when [`Watcher::run`] returns, which happens once `stop` is cancelled.
    pub fn new(config: Arc<Config>, stop: CancellationToken) -> (Self, TargetEvents) {
        let (added_tx, added_rx) = mpsc::channel(1);
        let (removed_tx, removed_rx) = mpsc::channel(1);
        let watcher = Self {
            config,
            added: added_tx,
            removed: removed_tx,
            stop,
        };
        let events = TargetEvents {
            added: added_rx,
            removed: removed_rx,
        };
        (watcher, events)
    }

    pub async fn run<P: PodApi>(self, api: &P) -> Result<(), Error> {
        let mut events = api.watch();
        info!("Watching pods in namespace {}", self.config.namespace());

        loop {
            let event = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                event = events.next() => event,
            };
            let keep_going = match event {
                Some(Ok(PodEvent::Applied(pod))) => self.pod_applied(&pod).await,
                Some(Ok(PodEvent::Deleted(pod))) => self.pod_deleted(&pod).await,
                Some(Err(e)) => return Err(Error::Subscription(e)),
                None => {
                    debug!("Pod watch stream ended");
                    false
                }
            };
            if !keep_going {
                break;
            }
        }

        info!("Pod watcher stopped");
        Ok(())
    }

    async fn pod_applied(&self, pod: &Pod) -> bool {
        let name = pod.name_any();
        let Some(pod_rule) = self.config.pod_rule(&name) else {
            return true;
        };

        for container in container_names(pod) {
            let Some(rule) = pod_rule.container_rule(container) else {
                continue;
            };
            let target = Target::new(&name, container, Some(rule.into_owned()));
            if !self.emit(&self.added, target).await {
                return false;
            }
        }
        true
    }

    async fn pod_deleted(&self, pod: &Pod) -> bool {
        let name = pod.name_any();
        if self.config.pod_rule(&name).is_none() {
            return true;
        }

        info!("Pod deleted: {}", name);
        for container in container_names(pod) {
            if !self.emit(&self.removed, Target::new(&name, container, None)).await {
                return false;
            }
        }
        true
    }

    /// Blocks until the consumer takes the target. False when stopping or the consumer is gone.
    async fn emit(&self, tx: &mpsc::Sender<Target>, target: Target) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            sent = tx.send(target) => sent.is_ok(),
        }
    }
}

/// Regular container names followed by init container names.
fn container_names(pod: &Pod) -> impl Iterator<Item = &str> {
    let status = pod.status.as_ref();
    let regular = status.and_then(|s| s.container_statuses.as_deref());
    let init = status.and_then(|s| s.init_container_statuses.as_deref());
    regular
        .unwrap_or_default()
        .iter()
        .chain(init.unwrap_or_default())
        .map(|c| c.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerRule, PodRule};
    use crate::testing::{FakePods, pod};

    fn start(config: Config, pods: &FakePods) -> (CancellationToken, TargetEvents, tokio::task::JoinHandle<Result<(), Error>>) {
        let stop = CancellationToken::new();
        let (watcher, events) = Watcher::new(Arc::new(config), stop.clone());
        let pods = pods.clone();
        let handle = tokio::spawn(async move { watcher.run(&pods).await });
        (stop, events, handle)
    }

    fn rules() -> Config {
        Config {
            pods: vec![
                PodRule {
                    pattern: "api-".into(),
                    containers: vec![ContainerRule {
                        pattern: "app".into(),
                        fields_order: vec![vec!["status".to_string()]],
                        show_all: false,
                    }],
                },
                PodRule {
                    pattern: "api-worker".into(),
                    containers: vec![],
                },
                PodRule {
                    pattern: "db-".into(),
                    containers: vec![],
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_accept_all_emits_every_container() {
        let pods = FakePods::new();
        let (_stop, mut events, _h) = start(Config::default(), &pods);

        pods.push_event(PodEvent::Applied(pod("web-1", &["nginx", "sidecar"], &["init"])));

        let mut names = Vec::new();
        for _ in 0..3 {
            let target = events.added.recv().await.unwrap();
            assert!(target.rule.is_some());
            names.push(target.id());
        }
        assert_eq!(names, vec!["web-1:nginx", "web-1:sidecar", "web-1:init"]);
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let pods = FakePods::new();
        let (_stop, mut events, _h) = start(rules(), &pods);

        // "api-worker-1" matches both "api-" and "api-worker"; the first rule applies
        // so only the "app" container is selected.
        pods.push_event(PodEvent::Applied(pod("api-worker-1", &["app", "proxy"], &[])));
        pods.push_event(PodEvent::Applied(pod("cache-0", &["redis"], &[])));
        pods.push_event(PodEvent::Applied(pod("db-0", &["postgres"], &[])));

        let first = events.added.recv().await.unwrap();
        assert_eq!(first.id(), "api-worker-1:app");
        let rule = first.rule.unwrap();
        assert_eq!(rule.fields_order, vec![vec!["status".to_string()]]);
        assert!(!rule.show_all);

        let second = events.added.recv().await.unwrap();
        assert_eq!(second.id(), "db-0:postgres");
        assert!(second.rule.unwrap().show_all);
    }

    #[tokio::test]
    async fn test_deleted_pod_emits_removed_targets() {
        let pods = FakePods::new();
        let (_stop, mut events, _h) = start(rules(), &pods);

        pods.push_event(PodEvent::Deleted(pod("cache-0", &["redis"], &[])));
        pods.push_event(PodEvent::Deleted(pod("db-0", &["postgres", "exporter"], &[])));

        let a = events.removed.recv().await.unwrap();
        let b = events.removed.recv().await.unwrap();
        assert_eq!((a.id().as_str(), b.id().as_str()), ("db-0:postgres", "db-0:exporter"));
        assert!(a.rule.is_none() && b.rule.is_none());
    }

    #[tokio::test]
    async fn test_stop_closes_both_channels() {
        let pods = FakePods::new();
        let (stop, mut events, handle) = start(Config::default(), &pods);

        stop.cancel();
        assert!(handle.await.unwrap().is_ok());
        assert!(events.added.recv().await.is_none());
        assert!(events.removed.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_watch_error_is_fatal() {
        let pods = FakePods::new();
        let (_stop, mut events, handle) = start(Config::default(), &pods);

        pods.push_watch_error("failed to decode pod");
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Subscription(_)));
        assert!(events.added.recv().await.is_none());
    }
}
