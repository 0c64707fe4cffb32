use std::pin::Pin;

use futures::future::BoxFuture;
use futures::io::AsyncBufRead;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;
use kube::runtime::watcher::{Config as WatcherConfig, Event, watcher};
use kube::{Api, Client, config};
use tracing::{debug, info};

use crate::error::{BoxError, Error};

/// Follow-mode log byte stream of one container.
pub type LogLines = Pin<Box<dyn AsyncBufRead + Send>>;

/// Pod lifecycle change as seen by the watcher.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The pod was created or modified.
    Applied(Pod),
    /// The pod was deleted; carries the last known state.
    Deleted(Pod),
}

/// The slice of the cluster Pod API the tailer consumes.
pub trait PodApi: Clone + Send + Sync + 'static {
    fn watch(&self) -> BoxStream<'static, Result<PodEvent, BoxError>>;

    fn logs(&self, pod_name: &str, params: &LogParams) -> BoxFuture<'static, Result<LogLines, BoxError>>;
}

/// [`PodApi`] backed by a namespaced `kube::Api<Pod>`.
#[derive(Clone)]
pub struct KubePods {
    api: Api<Pod>,
    namespace: String,
}

impl KubePods {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

impl PodApi for KubePods {
    fn watch(&self) -> BoxStream<'static, Result<PodEvent, BoxError>> {
        let namespace = self.namespace.clone();
        watcher(self.api.clone(), WatcherConfig::default())
            .try_filter_map(move |event| {
                let event = match event {
                    Event::Apply(pod) | Event::InitApply(pod) => Some(PodEvent::Applied(pod)),
                    Event::Delete(pod) => Some(PodEvent::Deleted(pod)),
                    Event::Init => {
                        info!("Initializing pod watcher for namespace: {}", namespace);
                        None
                    }
                    Event::InitDone => {
                        debug!("Pod watcher initialization complete for namespace: {}", namespace);
                        None
                    }
                };
                futures::future::ready(Ok(event))
            })
            .map_err(|e| Box::new(e) as BoxError)
            .boxed()
    }

    fn logs(&self, pod_name: &str, params: &LogParams) -> BoxFuture<'static, Result<LogLines, BoxError>> {
        let api = self.api.clone();
        let pod_name = pod_name.to_string();
        let params = params.clone();
        async move {
            let reader = api.log_stream(&pod_name, &params).await?;
            let lines: LogLines = Box::pin(reader);
            Ok::<_, BoxError>(lines)
        }
        .boxed()
    }
}

/// Build a client for the named kubeconfig context, or infer one
/// (in-cluster service account or the current context).
pub async fn create_client(context: Option<&str>) -> Result<Client, Error> {
    let config = match context {
        Some(ctx) => config::Config::from_kubeconfig(&config::KubeConfigOptions {
            context: Some(ctx.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| Error::Client(Box::new(e)))?,
        None => config::Config::infer()
            .await
            .map_err(|e| Error::Client(Box::new(e)))?,
    };
    let client = Client::try_from(config).map_err(|e| Error::Client(Box::new(e)))?;
    match context {
        Some(ctx) => info!("Initialized client for context: {}", ctx),
        None => info!("Using inferred cluster configuration"),
    }
    Ok(client)
}
