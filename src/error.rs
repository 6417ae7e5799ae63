use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or ambiguous invocation.
    #[error("{0}")]
    Usage(String),

    #[error("--namespace should not be specified with node target")]
    NamespaceScope,

    #[error("{kind} {name:?}{} not found or not readable: {source}", in_namespace(.namespace))]
    Fetch {
        kind: &'static str,
        namespace: Option<String>,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("invalid label selector on {kind} {namespace}/{name}: {reason}")]
    SelectorTranslation {
        kind: &'static str,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("invalid service '{namespace}/{name}': Service is defined without a selector")]
    NoSelectorDefined { namespace: String, name: String },

    #[error("selector for resource type {0:?} not implemented")]
    UnsupportedKind(String),

    #[error("failed to list pods of {kind} {name:?} in {scope}: {source}")]
    ClusterQuery {
        kind: &'static str,
        name: String,
        scope: String,
        #[source]
        source: kube::Error,
    },

    #[error("no resources found in {0} namespace")]
    NoResourcesFound(String),

    #[error("failed to evict pod {namespace}/{name}: {source}")]
    Eviction {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn in_namespace(namespace: &Option<String>) -> String {
    namespace
        .as_deref()
        .map(|ns| format!(" in namespace {ns}"))
        .unwrap_or_default()
}
