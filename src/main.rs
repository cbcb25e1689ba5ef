// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::{Node, Service};
use kube::{Api, Client};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hcloud_ccm::config::Config;
use hcloud_ccm::hcloud::{HcloudClient, RemoteClient};
use hcloud_ccm::instances::{Instances, ServerResolver};
use hcloud_ccm::reconcilers::{load_balancer_name, LoadBalancerReconciler, RouteReconciler};

/// hcloud cloud controller diagnostics
#[derive(Parser, Debug)]
#[command(name = "hcloud-ccm", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the routes of the configured network
    Routes,

    /// Show the load balancer status of a Service
    Status {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Service name
        name: String,

        #[arg(long, env = "CLUSTER_NAME", default_value = "kubernetes")]
        cluster_name: String,
    },

    /// Show the instance metadata of a Node
    Instance {
        /// Node name
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Using hcloud endpoint {}", config.endpoint);

    let client: Arc<dyn RemoteClient> = Arc::new(HcloudClient::new(&config)?);

    match cli.command {
        Commands::Routes => {
            let reconciler = RouteReconciler::new(client, config.network_id);
            for route in reconciler.list_routes().await? {
                let target = route.target_node.as_deref().unwrap_or("-");
                let marker = if route.blackhole { " (blackhole)" } else { "" };
                println!("{}\t{}{}", route.name, target, marker);
            }
        }
        Commands::Status {
            namespace,
            name,
            cluster_name,
        } => {
            let kube = Client::try_default().await?;
            let service = Api::<Service>::namespaced(kube, &namespace)
                .get(&name)
                .await
                .with_context(|| format!("Failed to get service {}/{}", namespace, name))?;

            let resolver = Arc::new(ServerResolver::new(client.clone()));
            let reconciler = LoadBalancerReconciler::new(client, resolver, &config);
            let lb_name = load_balancer_name(&cluster_name, &service);

            match reconciler.get_status(&cluster_name, &service).await? {
                Some(status) => {
                    println!("{}", lb_name);
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
                None => println!("{}: no load balancer", lb_name),
            }
        }
        Commands::Instance { node } => {
            let kube = Client::try_default().await?;
            let node = Api::<Node>::all(kube)
                .get(&node)
                .await
                .with_context(|| format!("Failed to get node {}", node))?;

            let instances = Instances::new(client, config.network_id);
            if !instances.instance_exists(&node).await? {
                println!("no server backs this node");
                return Ok(());
            }

            let metadata = instances.instance_metadata(&node).await?;
            println!("provider ID:   {}", metadata.provider_id);
            println!("instance type: {}", metadata.instance_type);
            println!("zone / region: {} / {}", metadata.zone, metadata.region);
            println!("shut down:     {}", instances.instance_shutdown(&node).await?);
            for address in &metadata.node_addresses {
                println!("{:<14} {}", format!("{}:", address.type_), address.address);
            }
        }
    }

    Ok(())
}
