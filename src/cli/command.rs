use std::io::Write;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::local_k8s::eviction::{cancellable, evict_pods, EvictionClient, EvictionOptions};
use crate::local_k8s::pods::pods_for_target;
use crate::local_k8s::target::{fetch_target, ResourceKind, TargetQuery};

pub const USAGE: &str = "kube-evict (POD | TYPE/NAME)";

const EXAMPLES: &str = "Examples:
  # Evict a pod nginx
  kube-evict nginx

  # Evict all pods defined by label app=nginx
  kube-evict -l app=nginx

  # Evict all pods of a deployment named nginx
  kube-evict deployment/nginx

  # Evict all pods from node worker-1
  kube-evict node/worker-1";

pub struct EvictCli {
    pub target: TargetQuery,
    pub options: EvictionOptions,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub verbose: bool,
}

impl EvictCli {
    pub fn command() -> Command {
        Command::new("kube-evict")
            .version("v0.1.0")
            .about("Evict a pod or the pods of a specified resource from the cluster")
            .override_usage(USAGE)
            .after_help(EXAMPLES)
            .arg(
                Arg::new("resource")
                    .value_name("POD | TYPE/NAME")
                    .help("pod name, or TYPE/NAME of a resource owning pods"),
            )
            .arg(
                Arg::new("selector")
                    .short('l')
                    .long("selector")
                    .default_value("")
                    .help("Selector (label query) to filter on"),
            )
            .arg(
                Arg::new("dry-run")
                    .long("dry-run")
                    .action(ArgAction::SetTrue)
                    .help("If true, submit server-side request without persisting the resource"),
            )
            .arg(
                Arg::new("grace-period")
                    .long("grace-period")
                    .value_parser(value_parser!(i64))
                    .allow_negative_numbers(true)
                    .default_value("-1")
                    .help("Period of time in seconds given to the pod to terminate gracefully. Ignored if negative"),
            )
            .arg(
                Arg::new("namespace")
                    .short('n')
                    .long("namespace")
                    .help("If present, the namespace scope for this request"),
            )
            .arg(
                Arg::new("context")
                    .long("context")
                    .help("The name of the kubeconfig context to use"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Enable debug logging"),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let selector = matches
            .get_one::<String>("selector")
            .filter(|s| !s.is_empty());
        let resource = matches.get_one::<String>("resource");

        let target = match (resource, selector) {
            (None, None) => {
                return Err(Error::Usage(format!(
                    "expected '{USAGE}'.\nPOD or TYPE/NAME is a required argument for the evict command"
                )))
            }
            (Some(_), Some(_)) => {
                return Err(Error::Usage(
                    "only a selector (-l) or a resource name is allowed".to_string(),
                ))
            }
            (Some(resource), None) => TargetQuery::parse_resource_arg(resource)?,
            (None, Some(selector)) => TargetQuery::Selector(selector.clone()),
        };

        let grace_period = matches
            .get_one::<i64>("grace-period")
            .copied()
            .unwrap_or(-1);

        Ok(Self {
            target,
            options: EvictionOptions::new(grace_period, matches.get_flag("dry-run")),
            namespace: matches.get_one::<String>("namespace").cloned(),
            context: matches.get_one::<String>("context").cloned(),
            verbose: matches.get_flag("verbose"),
        })
    }

    /// Resolve the target to pods and evict them one by one.
    ///
    /// `default_namespace` applies unless `--namespace` was given.
    pub async fn run<W: Write>(
        &self,
        client: &Client,
        default_namespace: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let TargetQuery::Named {
            kind: ResourceKind::Node,
            ..
        } = self.target
        {
            if self.namespace.is_some() {
                return Err(Error::NamespaceScope);
            }
        }
        let namespace = self.namespace.as_deref().unwrap_or(default_namespace);

        let target = cancellable(cancel, fetch_target(client, namespace, &self.target)).await?;
        let pods = cancellable(cancel, pods_for_target(client, target)).await?;
        if pods.is_empty() {
            warn!(target = ?self.target, "no pods matched the target, nothing to evict");
            return Ok(());
        }
        info!(count = pods.len(), "resolved pods to evict");

        let evictor = cancellable(cancel, async {
            Ok::<_, Error>(EvictionClient::negotiate(client.clone()).await)
        })
        .await?;
        evict_pods(&evictor, &pods, &self.options, out, cancel).await
    }
}
