mod cli;
mod error;
mod local_k8s;

use kube::{
    config::{Config, KubeConfigOptions},
    Client,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::EvictCli;

/// Log to stderr so stdout only carries the per-pod results.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        "kube_evict=debug"
    } else {
        "kube_evict=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build a client from kubeconfig (or in-cluster config) and return it with
/// the context's namespace.
async fn connect(context: Option<&str>) -> anyhow::Result<(Client, String)> {
    let config = match context {
        Some(context) => {
            Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context.to_string()),
                ..KubeConfigOptions::default()
            })
            .await?
        }
        None => Config::infer().await?,
    };
    let namespace = config.default_namespace.clone();
    let client = Client::try_from(config)?;
    Ok((client, namespace))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = EvictCli::command().get_matches();
    let cli = EvictCli::from_matches(&matches)?;
    init_logging(cli.verbose);

    let (client, namespace) = connect(cli.context.as_deref()).await?;
    debug!(%namespace, "connected to cluster");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    cli.run(&client, &namespace, &mut std::io::stdout(), &cancel)
        .await?;

    Ok(())
}
