use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams},
    Client,
};
use tracing::{debug, instrument};

use super::selector::{equality_query, label_selector_query};
use super::target::{Owner, Target};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodScope {
    Namespaced(String),
    AllNamespaces,
}

impl fmt::Display for PodScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodScope::Namespaced(ns) => write!(f, "namespace {ns}"),
            PodScope::AllNamespaces => f.write_str("all namespaces"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodFilter {
    Labels(String),
    Fields(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    pub scope: PodScope,
    pub filter: PodFilter,
}

impl SelectorSpec {
    fn list_params(&self) -> ListParams {
        match &self.filter {
            PodFilter::Labels(query) => ListParams::default().labels(query),
            PodFilter::Fields(query) => ListParams::default().fields(query),
        }
    }
}

pub fn selector_for_owner(owner: &Owner) -> Result<SelectorSpec> {
    let spec = match owner {
        Owner::Workload {
            kind,
            namespace,
            name,
            selector,
        } => {
            let translation_error = |reason: String| Error::SelectorTranslation {
                kind: kind.as_str(),
                namespace: namespace.clone(),
                name: name.clone(),
                reason,
            };
            let selector = selector
                .as_ref()
                .ok_or_else(|| translation_error("spec.selector is not set".to_string()))?;
            SelectorSpec {
                scope: PodScope::Namespaced(namespace.clone()),
                filter: PodFilter::Labels(
                    label_selector_query(selector).map_err(translation_error)?,
                ),
            }
        }
        Owner::ReplicationController {
            namespace,
            selector,
            ..
        } => SelectorSpec {
            scope: PodScope::Namespaced(namespace.clone()),
            filter: PodFilter::Labels(equality_query(selector)),
        },
        Owner::Service {
            namespace,
            name,
            selector,
        } => {
            if selector.is_empty() {
                return Err(Error::NoSelectorDefined {
                    namespace: namespace.clone(),
                    name: name.clone(),
                });
            }
            SelectorSpec {
                scope: PodScope::Namespaced(namespace.clone()),
                filter: PodFilter::Labels(equality_query(selector)),
            }
        }
        Owner::Node { name } => SelectorSpec {
            scope: PodScope::AllNamespaces,
            filter: PodFilter::Fields(format!("spec.nodeName={name}")),
        },
    };
    Ok(spec)
}

/// Resolve a target to its pods, in the order the API server returned them.
#[instrument(skip_all)]
pub async fn pods_for_target(client: &Client, target: Target) -> Result<Vec<Pod>> {
    let owner = match target {
        Target::Pods(pods) => return Ok(pods),
        Target::Pod(pod) => return Ok(vec![pod]),
        Target::Owner(owner) => owner,
    };
    let spec = selector_for_owner(&owner)?;
    debug!(owner = owner.name(), scope = %spec.scope, filter = ?spec.filter, "listing pods");

    let pods: Api<Pod> = match &spec.scope {
        PodScope::Namespaced(ns) => Api::namespaced(client.clone(), ns),
        PodScope::AllNamespaces => Api::all(client.clone()),
    };
    let list = pods
        .list(&spec.list_params())
        .await
        .map_err(|source| Error::ClusterQuery {
            kind: owner.kind(),
            name: owner.name().to_string(),
            scope: spec.scope.to_string(),
            source,
        })?;
    Ok(list.items)
}
