//! In-memory Pod API used by the async tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::LogParams;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::BoxError;
use crate::kubernetes::{LogLines, PodApi, PodEvent};

type LogChunk = std::io::Result<Vec<u8>>;

#[derive(Clone)]
pub struct FakePods {
    inner: Arc<Inner>,
}

struct Inner {
    events_tx: mpsc::UnboundedSender<Result<PodEvent, BoxError>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<PodEvent, BoxError>>>>,
    logs: Mutex<HashMap<String, fmpsc::UnboundedSender<LogChunk>>>,
    requests: Mutex<Vec<(String, LogParams)>>,
    failing: Mutex<HashSet<String>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakePods {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                logs: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                held: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn push_event(&self, event: PodEvent) {
        self.inner.events_tx.send(Ok(event)).unwrap();
    }

    pub fn push_watch_error(&self, reason: &str) {
        let err: BoxError = reason.to_string().into();
        self.inner.events_tx.send(Err(err)).unwrap();
    }

    pub fn fail_logs_for(&self, pod_name: &str) {
        self.inner.failing.lock().unwrap().insert(pod_name.to_string());
    }

    /// Log opens for `pod_name` stay pending until the returned handle is notified.
    pub fn hold_logs_for(&self, pod_name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .held
            .lock()
            .unwrap()
            .insert(pod_name.to_string(), Arc::clone(&gate));
        gate
    }

    /// Append raw bytes to the open log stream of `pod:container`.
    pub fn push_log(&self, id: &str, text: &str) {
        let logs = self.inner.logs.lock().unwrap();
        let tx = logs.get(id).unwrap_or_else(|| panic!("no log stream open for {id}"));
        tx.unbounded_send(Ok(text.as_bytes().to_vec())).unwrap();
    }

    /// Close the log stream of `pod:container` from the server side (EOF).
    pub fn end_log(&self, id: &str) {
        self.inner.logs.lock().unwrap().remove(id);
    }

    /// True once the reader side of the stream has been dropped.
    pub fn log_released(&self, id: &str) -> bool {
        self.inner
            .logs
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|tx| tx.is_closed())
    }

    pub fn log_requests(&self) -> Vec<(String, LogParams)> {
        self.inner.requests.lock().unwrap().clone()
    }
}

impl PodApi for FakePods {
    fn watch(&self) -> BoxStream<'static, Result<PodEvent, BoxError>> {
        match self.inner.events_rx.lock().unwrap().take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    fn logs(&self, pod_name: &str, params: &LogParams) -> BoxFuture<'static, Result<LogLines, BoxError>> {
        self.inner
            .requests
            .lock()
            .unwrap()
            .push((pod_name.to_string(), params.clone()));

        if self.inner.failing.lock().unwrap().contains(pod_name) {
            let err: BoxError = format!("pods \"{pod_name}\" not found").into();
            return futures::future::ready(Err(err)).boxed();
        }

        let (tx, rx) = fmpsc::unbounded::<LogChunk>();
        let id = format!("{}:{}", pod_name, params.container.clone().unwrap_or_default());
        self.inner.logs.lock().unwrap().insert(id, tx);
        let lines: LogLines = Box::pin(rx.into_async_read());
        let gate = self.inner.held.lock().unwrap().remove(pod_name);
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok::<_, BoxError>(lines)
        }
        .boxed()
    }
}

pub fn pod(name: &str, containers: &[&str], init_containers: &[&str]) -> Pod {
    let statuses = |names: &[&str]| {
        Some(
            names
                .iter()
                .map(|n| ContainerStatus {
                    name: n.to_string(),
                    ..Default::default()
                })
                .collect::<Vec<_>>(),
        )
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            container_statuses: statuses(containers),
            init_container_statuses: statuses(init_containers),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    let polled = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), polled)
        .await
        .expect("condition not reached in time");
}
