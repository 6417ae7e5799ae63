use std::future::Future;
use std::io::Write;

use hyper::header::CONTENT_TYPE;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResourceList, DeleteOptions};
use kube::{Client, ResourceExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

pub const EVICTION_SUBRESOURCE: &str = "pods/eviction";
pub const EVICTION_KIND: &str = "Eviction";

const DRY_RUN_ALL: &str = "All";

/// The two mutually exclusive versions of the eviction subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionApiVersion {
    PolicyV1,
    PolicyV1beta1,
}

impl EvictionApiVersion {
    pub fn api_version(&self) -> &'static str {
        match self {
            EvictionApiVersion::PolicyV1 => "policy/v1",
            EvictionApiVersion::PolicyV1beta1 => "policy/v1beta1",
        }
    }

    /// Pick the version advertised for `pods/eviction` in the core resource list.
    pub fn from_resources(resources: &APIResourceList) -> Self {
        let advertised = resources.resources.iter().find_map(|r| {
            let group = r.group.as_deref().filter(|g| !g.is_empty())?;
            let version = r.version.as_deref().filter(|v| !v.is_empty())?;
            (r.name == EVICTION_SUBRESOURCE && r.kind == EVICTION_KIND).then_some((group, version))
        });
        match advertised {
            Some(("policy", "v1")) => EvictionApiVersion::PolicyV1,
            _ => EvictionApiVersion::PolicyV1beta1,
        }
    }

    /// Ask the API server which version it serves. Discovery errors fall back
    /// to `policy/v1beta1`.
    #[instrument(skip(client))]
    pub async fn negotiate(client: &Client) -> Self {
        let version = match client.list_core_api_resources("v1").await {
            Ok(resources) => Self::from_resources(&resources),
            Err(err) => {
                warn!(error = %err, "eviction API discovery failed, assuming policy/v1beta1");
                EvictionApiVersion::PolicyV1beta1
            }
        };
        debug!(api_version = version.api_version(), "negotiated eviction API");
        version
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionOptions {
    pub grace_period_seconds: Option<i64>,
    pub dry_run: bool,
}

impl EvictionOptions {
    /// Negative grace periods mean "use the server default".
    pub fn new(grace_period_seconds: i64, dry_run: bool) -> Self {
        Self {
            grace_period_seconds: (grace_period_seconds >= 0).then_some(grace_period_seconds),
            dry_run,
        }
    }

    pub fn delete_options(&self) -> Option<DeleteOptions> {
        if self.grace_period_seconds.is_none() && !self.dry_run {
            return None;
        }
        Some(DeleteOptions {
            grace_period_seconds: self.grace_period_seconds,
            dry_run: self.dry_run.then(|| vec![DRY_RUN_ALL.to_string()]),
            ..DeleteOptions::default()
        })
    }

    fn verb(&self) -> &'static str {
        if self.dry_run {
            "evicted (dry-run)"
        } else {
            "evicted"
        }
    }
}

/// Eviction client bound to one negotiated API version for its whole lifetime.
#[derive(Clone)]
pub struct EvictionClient {
    client: Client,
    version: EvictionApiVersion,
}

impl EvictionClient {
    pub fn new(client: Client, version: EvictionApiVersion) -> Self {
        Self { client, version }
    }

    pub async fn negotiate(client: Client) -> Self {
        let version = EvictionApiVersion::negotiate(&client).await;
        Self::new(client, version)
    }

    pub fn version(&self) -> EvictionApiVersion {
        self.version
    }

    #[instrument(skip_all, fields(pod = %pod.name_any(), namespace = ?pod.namespace()))]
    pub async fn evict_pod(&self, pod: &Pod, opts: &EvictionOptions) -> Result<()> {
        let name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_default();
        let eviction_error = |source| Error::Eviction {
            namespace: namespace.clone(),
            name: name.clone(),
            source,
        };

        let mut body = json!({
            "apiVersion": self.version.api_version(),
            "kind": EVICTION_KIND,
            "metadata": { "name": name, "namespace": namespace },
        });
        if let Some(delete_options) = opts.delete_options() {
            body["deleteOptions"] = json!(delete_options);
        }

        let data = serde_json::to_vec(&body)
            .map_err(|e| eviction_error(kube::Error::SerdeError(e)))?;
        let request = hyper::Request::post(format!(
            "/api/v1/namespaces/{namespace}/pods/{name}/eviction"
        ))
        .header(CONTENT_TYPE, "application/json")
        .body(data)
        .map_err(|e| eviction_error(kube::Error::HttpError(e)))?;

        self.client
            .request_text(request)
            .await
            .map_err(eviction_error)?;
        Ok(())
    }
}

/// Evict `pods` one at a time in order, writing a line per evicted pod.
///
/// Stops at the first failure; later pods are left untouched.
pub async fn evict_pods<W: Write>(
    evictor: &EvictionClient,
    pods: &[Pod],
    opts: &EvictionOptions,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<()> {
    for pod in pods {
        cancellable(cancel, evictor.evict_pod(pod, opts)).await?;
        info!(
            pod = %pod.name_any(),
            api_version = evictor.version().api_version(),
            dry_run = opts.dry_run,
            "pod evicted"
        );
        writeln!(
            out,
            "pod {}/{} {}",
            pod.namespace().unwrap_or_default(),
            pod.name_any(),
            opts.verb()
        )?;
    }
    Ok(())
}

pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}
