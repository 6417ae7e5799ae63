use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    batch::v1::Job,
    core::v1::{Node, Pod, ReplicationController, Service},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{
    api::{Api, ListParams},
    Client, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pod,
    ReplicaSet,
    ReplicationController,
    StatefulSet,
    DaemonSet,
    Deployment,
    Job,
    Service,
    Node,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::ReplicaSet => "replicaset",
            ResourceKind::ReplicationController => "replicationcontroller",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::DaemonSet => "daemonset",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Job => "job",
            ResourceKind::Service => "service",
            ResourceKind::Node => "node",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    /// Accepts singular, plural and short names, optionally qualified with
    /// an API group (`deployment.apps`).
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        let (resource, group) = match lower.split_once('.') {
            Some((resource, group)) => (resource, Some(group)),
            None => (lower.as_str(), None),
        };

        let (kind, expected_group) = match resource {
            "po" | "pod" | "pods" => (ResourceKind::Pod, ""),
            "rs" | "replicaset" | "replicasets" => (ResourceKind::ReplicaSet, "apps"),
            "rc" | "replicationcontroller" | "replicationcontrollers" => {
                (ResourceKind::ReplicationController, "")
            }
            "sts" | "statefulset" | "statefulsets" => (ResourceKind::StatefulSet, "apps"),
            "ds" | "daemonset" | "daemonsets" => (ResourceKind::DaemonSet, "apps"),
            "deploy" | "deployment" | "deployments" => (ResourceKind::Deployment, "apps"),
            "job" | "jobs" => (ResourceKind::Job, "batch"),
            "svc" | "service" | "services" => (ResourceKind::Service, ""),
            "no" | "node" | "nodes" => (ResourceKind::Node, ""),
            _ => return Err(Error::UnsupportedKind(s.to_string())),
        };

        match group {
            Some(group) if group != expected_group => Err(Error::UnsupportedKind(s.to_string())),
            _ => Ok(kind),
        }
    }
}

/// What the user asked to evict, before anything is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetQuery {
    Selector(String),
    Named { kind: ResourceKind, name: String },
}

impl TargetQuery {
    /// Parse the positional `POD` or `TYPE/NAME` argument.
    pub fn parse_resource_arg(arg: &str) -> Result<Self> {
        let (kind, name) = match arg.split('/').collect::<Vec<_>>().as_slice() {
            [name] => (ResourceKind::Pod, *name),
            [kind, name] => (kind.parse()?, *name),
            _ => {
                return Err(Error::Usage(format!(
                    "arguments in resource/name form may not have more than one slash: {arg:?}"
                )))
            }
        };
        if name.is_empty() {
            return Err(Error::Usage(format!("resource name may not be empty: {arg:?}")));
        }
        Ok(TargetQuery::Named {
            kind,
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Deployment,
    Job,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::ReplicaSet => "replicaset",
            WorkloadKind::StatefulSet => "statefulset",
            WorkloadKind::DaemonSet => "daemonset",
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::Job => "job",
        }
    }
}

/// A fetched object, reduced to what pod resolution needs.
#[derive(Debug, Clone)]
pub enum Target {
    Pods(Vec<Pod>),
    Pod(Pod),
    Owner(Owner),
}

#[derive(Debug, Clone)]
pub enum Owner {
    Workload {
        kind: WorkloadKind,
        namespace: String,
        name: String,
        selector: Option<LabelSelector>,
    },
    ReplicationController {
        namespace: String,
        name: String,
        selector: BTreeMap<String, String>,
    },
    Service {
        namespace: String,
        name: String,
        selector: BTreeMap<String, String>,
    },
    Node {
        name: String,
    },
}

impl Owner {
    fn workload(
        kind: WorkloadKind,
        object: &impl ResourceExt,
        selector: Option<LabelSelector>,
    ) -> Target {
        Target::Owner(Owner::Workload {
            kind,
            namespace: object.namespace().unwrap_or_default(),
            name: object.name_any(),
            selector,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Owner::Workload { kind, .. } => kind.as_str(),
            Owner::ReplicationController { .. } => ResourceKind::ReplicationController.as_str(),
            Owner::Service { .. } => ResourceKind::Service.as_str(),
            Owner::Node { .. } => ResourceKind::Node.as_str(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Owner::Workload { name, .. }
            | Owner::ReplicationController { name, .. }
            | Owner::Service { name, .. }
            | Owner::Node { name } => name,
        }
    }
}

impl From<ReplicaSet> for Target {
    fn from(rs: ReplicaSet) -> Self {
        let selector = rs.spec.as_ref().map(|s| s.selector.clone());
        Owner::workload(WorkloadKind::ReplicaSet, &rs, selector)
    }
}

impl From<StatefulSet> for Target {
    fn from(sts: StatefulSet) -> Self {
        let selector = sts.spec.as_ref().map(|s| s.selector.clone());
        Owner::workload(WorkloadKind::StatefulSet, &sts, selector)
    }
}

impl From<DaemonSet> for Target {
    fn from(ds: DaemonSet) -> Self {
        let selector = ds.spec.as_ref().map(|s| s.selector.clone());
        Owner::workload(WorkloadKind::DaemonSet, &ds, selector)
    }
}

impl From<Deployment> for Target {
    fn from(deploy: Deployment) -> Self {
        let selector = deploy.spec.as_ref().map(|s| s.selector.clone());
        Owner::workload(WorkloadKind::Deployment, &deploy, selector)
    }
}

impl From<Job> for Target {
    fn from(job: Job) -> Self {
        let selector = job.spec.as_ref().and_then(|s| s.selector.clone());
        Owner::workload(WorkloadKind::Job, &job, selector)
    }
}

impl From<ReplicationController> for Target {
    fn from(rc: ReplicationController) -> Self {
        Target::Owner(Owner::ReplicationController {
            namespace: rc.namespace().unwrap_or_default(),
            name: rc.name_any(),
            selector: rc.spec.and_then(|s| s.selector).unwrap_or_default(),
        })
    }
}

impl From<Service> for Target {
    fn from(svc: Service) -> Self {
        Target::Owner(Owner::Service {
            namespace: svc.namespace().unwrap_or_default(),
            name: svc.name_any(),
            selector: svc.spec.and_then(|s| s.selector).unwrap_or_default(),
        })
    }
}

impl From<Node> for Target {
    fn from(node: Node) -> Self {
        Target::Owner(Owner::Node {
            name: node.name_any(),
        })
    }
}

impl From<Pod> for Target {
    fn from(pod: Pod) -> Self {
        Target::Pod(pod)
    }
}

/// Fetch the object named by `query` from the cluster.
#[instrument(skip(client))]
pub async fn fetch_target(client: &Client, namespace: &str, query: &TargetQuery) -> Result<Target> {
    let (kind, name) = match query {
        TargetQuery::Selector(selector) => {
            let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
            let list = pods
                .list(&ListParams::default().labels(selector))
                .await
                .map_err(|source| Error::ClusterQuery {
                    kind: "selector",
                    name: selector.clone(),
                    scope: format!("namespace {namespace}"),
                    source,
                })?;
            if list.items.is_empty() {
                return Err(Error::NoResourcesFound(namespace.to_string()));
            }
            debug!(count = list.items.len(), "selector matched pods");
            return Ok(Target::Pods(list.items));
        }
        TargetQuery::Named { kind, name } => (*kind, name.as_str()),
    };

    let ns = Some(namespace);
    match kind {
        ResourceKind::Pod => get::<Pod>(Api::namespaced(client.clone(), namespace), kind, name, ns).await,
        ResourceKind::ReplicaSet => {
            get::<ReplicaSet>(Api::namespaced(client.clone(), namespace), kind, name, ns).await
        }
        ResourceKind::ReplicationController => {
            get::<ReplicationController>(Api::namespaced(client.clone(), namespace), kind, name, ns)
                .await
        }
        ResourceKind::StatefulSet => {
            get::<StatefulSet>(Api::namespaced(client.clone(), namespace), kind, name, ns).await
        }
        ResourceKind::DaemonSet => {
            get::<DaemonSet>(Api::namespaced(client.clone(), namespace), kind, name, ns).await
        }
        ResourceKind::Deployment => {
            get::<Deployment>(Api::namespaced(client.clone(), namespace), kind, name, ns).await
        }
        ResourceKind::Job => get::<Job>(Api::namespaced(client.clone(), namespace), kind, name, ns).await,
        ResourceKind::Service => {
            get::<Service>(Api::namespaced(client.clone(), namespace), kind, name, ns).await
        }
        ResourceKind::Node => get::<Node>(Api::all(client.clone()), kind, name, None).await,
    }
}

async fn get<K>(api: Api<K>, kind: ResourceKind, name: &str, namespace: Option<&str>) -> Result<Target>
where
    K: kube::Resource + Clone + fmt::Debug + DeserializeOwned + Into<Target>,
{
    api.get(name)
        .await
        .map(Into::into)
        .map_err(|source| Error::Fetch {
            kind: kind.as_str(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_k8s::mock::{self, Exchange};
    use serde_json::json;

    #[test]
    fn parses_kind_aliases() {
        for (input, expected) in [
            ("po", ResourceKind::Pod),
            ("rs", ResourceKind::ReplicaSet),
            ("ReplicationControllers", ResourceKind::ReplicationController),
            ("sts", ResourceKind::StatefulSet),
            ("daemonset.apps", ResourceKind::DaemonSet),
            ("deploy", ResourceKind::Deployment),
            ("jobs.batch", ResourceKind::Job),
            ("svc", ResourceKind::Service),
            ("node", ResourceKind::Node),
        ] {
            assert_eq!(input.parse::<ResourceKind>().unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn other_kinds_are_unsupported() {
        for input in ["configmap", "cronjob", "deployment.batch"] {
            assert!(matches!(
                input.parse::<ResourceKind>(),
                Err(Error::UnsupportedKind(k)) if k == input
            ));
        }
    }

    #[test]
    fn parses_resource_args() {
        assert_eq!(
            TargetQuery::parse_resource_arg("nginx").unwrap(),
            TargetQuery::Named {
                kind: ResourceKind::Pod,
                name: "nginx".to_string()
            }
        );
        assert_eq!(
            TargetQuery::parse_resource_arg("node/worker-1").unwrap(),
            TargetQuery::Named {
                kind: ResourceKind::Node,
                name: "worker-1".to_string()
            }
        );
        assert!(matches!(
            TargetQuery::parse_resource_arg("deploy/"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            TargetQuery::parse_resource_arg("a/b/c"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            TargetQuery::parse_resource_arg("secret/foo"),
            Err(Error::UnsupportedKind(_))
        ));
    }

    #[test]
    fn job_without_selector_keeps_none() {
        let job: Job = serde_json::from_value(json!({
            "metadata": { "name": "batch", "namespace": "jobs" },
            "spec": { "template": {} }
        }))
        .unwrap();
        match Target::from(job) {
            Target::Owner(Owner::Workload {
                kind,
                namespace,
                name,
                selector,
            }) => {
                assert_eq!(kind, WorkloadKind::Job);
                assert_eq!(namespace, "jobs");
                assert_eq!(name, "batch");
                assert!(selector.is_none());
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetches_named_deployment() {
        let (client, server) = mock::serve(vec![Exchange::ok(
            "GET",
            "/apis/apps/v1/namespaces/default/deployments/web",
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": { "name": "web", "namespace": "default" },
                "spec": {
                    "selector": { "matchLabels": { "app": "web" } },
                    "template": {}
                }
            }),
        )]);

        let query = TargetQuery::parse_resource_arg("deployment/web").unwrap();
        let target = fetch_target(&client, "default", &query).await.unwrap();
        assert!(matches!(
            target,
            Target::Owner(Owner::Workload { kind: WorkloadKind::Deployment, ref name, .. }) if name == "web"
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn node_is_fetched_cluster_wide() {
        let (client, server) = mock::serve(vec![Exchange::ok(
            "GET",
            "/api/v1/nodes/worker-1",
            json!({
                "apiVersion": "v1",
                "kind": "Node",
                "metadata": { "name": "worker-1" }
            }),
        )]);

        let query = TargetQuery::parse_resource_arg("no/worker-1").unwrap();
        let target = fetch_target(&client, "default", &query).await.unwrap();
        assert!(matches!(target, Target::Owner(Owner::Node { ref name }) if name == "worker-1"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_pod_is_a_fetch_error() {
        let (client, server) = mock::serve(vec![Exchange::not_found(
            "GET",
            "/api/v1/namespaces/staging/pods/ghost",
        )]);

        let query = TargetQuery::parse_resource_arg("ghost").unwrap();
        let err = fetch_target(&client, "staging", &query).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Fetch { kind: "pod", ref namespace, ref name, .. }
                if namespace.as_deref() == Some("staging") && name == "ghost"
        ));
        let message = err.to_string();
        assert!(message.starts_with("pod \"ghost\" in namespace staging not found"), "{message}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_selector_result_is_reported() {
        let (client, server) = mock::serve(vec![Exchange::ok(
            "GET",
            "/api/v1/namespaces/staging/pods",
            mock::pod_list(&[]),
        )]);

        let query = TargetQuery::Selector("app=nginx".to_string());
        let err = fetch_target(&client, "staging", &query).await.unwrap_err();
        assert!(matches!(err, Error::NoResourcesFound(ref ns) if ns == "staging"));

        let recorded = server.await.unwrap();
        assert!(recorded[0].query.contains("labelSelector=app%3Dnginx"));
    }
}
