//! Roost Operator - managed stateful agent-runtime instances on Kubernetes

use clap::Parser;
use kube::{Client, CustomResourceExt};

use roost_common::crd::{RoostConfigRequest, RoostInstance};

mod controller_runner;
mod telemetry;

/// Roost - CRD-driven Kubernetes operator for managed agent instances
#[derive(Parser, Debug)]
#[command(name = "roost-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON
    #[arg(long, env = "ROOST_LOG_JSON")]
    json_logs: bool,

    /// Container image used for data-mover jobs
    #[arg(
        long,
        env = "ROOST_DATA_MOVER_IMAGE",
        default_value = "ghcr.io/roost-run/data-mover:v2"
    )]
    data_mover_image: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        // Print CRDs for `kubectl apply -f -`; no cluster access needed.
        print!("{}", serde_yaml::to_string(&RoostInstance::crd())?);
        println!("---");
        print!("{}", serde_yaml::to_string(&RoostConfigRequest::crd())?);
        return Ok(());
    }

    telemetry::init(cli.json_logs);
    tracing::info!("starting roost-operator");

    let client = Client::try_default().await?;

    tracing::info!("starting controllers:");
    let instance_ctrl =
        controller_runner::build_instance_controller(client.clone(), cli.data_mover_image.clone())
            .await;
    let config_ctrl = controller_runner::build_config_request_controller(client.clone());
    let occupancy = controller_runner::build_occupancy_sampler(client);

    tokio::select! {
        _ = instance_ctrl => tracing::info!("instance controller stopped"),
        _ = config_ctrl => tracing::info!("config request controller stopped"),
        _ = occupancy => tracing::info!("occupancy sampler stopped"),
    }

    tracing::info!("roost-operator shut down");
    Ok(())
}
