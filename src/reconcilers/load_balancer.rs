// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Load balancer reconciler - converges one hcloud load balancer to a Service.

use crate::config::{Config, ConvergenceMode};
use crate::error::{CcmError, Result};
use crate::hcloud::{ActionWaiter, RemoteClient};
use crate::instances::NodeResolver;
use crate::types::{ListenerBinding, LoadBalancer, LoadBalancerCreateOpts};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A corrective mutation of the listener set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerChange {
    Add(ListenerBinding),
    Update(ListenerBinding),
    Remove(u16),
}

/// A corrective mutation of the server target set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    Add(i64),
    Remove(i64),
}

fn service_key(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_default(),
        service.name_any()
    )
}

/// Deterministic load balancer name for a Service.
///
/// Namespaces and Service names are DNS labels and never contain '.', so
/// distinct (cluster, namespace, name) triples never map to the same name.
pub fn load_balancer_name(cluster_name: &str, service: &Service) -> String {
    let namespace = service
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    format!("{}.{}.{}", cluster_name, namespace, service.name_any())
}

/// Listener bindings demanded by the Service's TCP ports
pub fn desired_listeners(service: &Service) -> Result<Vec<ListenerBinding>> {
    let ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(|p| p.as_slice())
        .unwrap_or_default();

    let mut bindings: Vec<ListenerBinding> = Vec::with_capacity(ports.len());
    for port in ports {
        let protocol = port.protocol.as_deref().unwrap_or("TCP");
        if protocol != "TCP" {
            warn!(
                "Skipping {} port {} of service {}, only TCP is supported",
                protocol,
                port.port,
                service_key(service)
            );
            continue;
        }

        let listen_port = u16::try_from(port.port).map_err(|_| {
            CcmError::InvalidService(format!(
                "{}: port {} out of range",
                service_key(service),
                port.port
            ))
        })?;
        let node_port = port.node_port.ok_or_else(|| {
            CcmError::InvalidService(format!(
                "{}: port {} has no node port assigned",
                service_key(service),
                port.port
            ))
        })?;
        let destination_port = u16::try_from(node_port).map_err(|_| {
            CcmError::InvalidService(format!(
                "{}: node port {} out of range",
                service_key(service),
                node_port
            ))
        })?;

        if bindings.iter().any(|b| b.listen_port == listen_port) {
            continue;
        }
        bindings.push(ListenerBinding::tcp(listen_port, destination_port));
    }

    Ok(bindings)
}

/// Changes that bring `existing` listeners to `desired`.
///
/// Mismatched destination ports are updated in place. Bindings that are not
/// desired are only removed in [`ConvergenceMode::Full`].
pub fn plan_listeners(
    existing: &[ListenerBinding],
    desired: &[ListenerBinding],
    mode: ConvergenceMode,
) -> Vec<ListenerChange> {
    let mut changes = Vec::new();

    for want in desired {
        match existing.iter().find(|b| b.listen_port == want.listen_port) {
            Some(have) if have.destination_port == want.destination_port => {}
            Some(_) => changes.push(ListenerChange::Update(want.clone())),
            None => changes.push(ListenerChange::Add(want.clone())),
        }
    }

    if mode == ConvergenceMode::Full {
        changes.extend(
            existing
                .iter()
                .filter(|have| !desired.iter().any(|want| want.listen_port == have.listen_port))
                .map(|have| ListenerChange::Remove(have.listen_port)),
        );
    }

    changes
}

/// Changes that bring `existing` server targets to `desired`
pub fn plan_targets(existing: &[i64], desired: &[i64], mode: ConvergenceMode) -> Vec<TargetChange> {
    let have: BTreeSet<i64> = existing.iter().copied().collect();
    let want: BTreeSet<i64> = desired.iter().copied().collect();

    let mut changes: Vec<TargetChange> = desired
        .iter()
        .copied()
        .filter(|id| !have.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(TargetChange::Add)
        .collect();

    if mode == ConvergenceMode::Full {
        changes.extend(have.difference(&want).copied().map(TargetChange::Remove));
    }

    changes
}

/// Ingress entries for every assigned public address of a load balancer
pub fn ingress_status(load_balancer: &LoadBalancer) -> LoadBalancerStatus {
    let ingress = load_balancer
        .public_addresses()
        .into_iter()
        .map(|(ip, hostname)| LoadBalancerIngress {
            ip: Some(ip.to_string()),
            hostname: hostname.map(str::to_string),
            ..Default::default()
        })
        .collect();

    LoadBalancerStatus {
        ingress: Some(ingress),
    }
}

/// Converges hcloud load balancers to Services.
///
/// Holds no state between calls: every call re-reads the load balancer.
pub struct LoadBalancerReconciler {
    client: Arc<dyn RemoteClient>,
    resolver: Arc<dyn NodeResolver>,
    waiter: ActionWaiter,
    load_balancer_type: String,
    location: String,
    mode: ConvergenceMode,
}

impl LoadBalancerReconciler {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        resolver: Arc<dyn NodeResolver>,
        config: &Config,
    ) -> Self {
        Self {
            waiter: ActionWaiter::new(client.clone()),
            client,
            resolver,
            load_balancer_type: config.load_balancer_type.clone(),
            location: config.load_balancer_location.clone(),
            mode: config.convergence_mode,
        }
    }

    /// Status of the Service's load balancer, `None` if it does not exist
    #[instrument(skip(self, service), fields(service = %service_key(service)))]
    pub async fn get_status(
        &self,
        cluster_name: &str,
        service: &Service,
    ) -> Result<Option<LoadBalancerStatus>> {
        let name = load_balancer_name(cluster_name, service);
        let load_balancer = self.client.load_balancer_by_name(&name).await?;
        Ok(load_balancer.as_ref().map(ingress_status))
    }

    /// Create the load balancer if needed and converge listeners and targets
    #[instrument(skip(self, service, nodes, cancel), fields(service = %service_key(service)))]
    pub async fn ensure_converged(
        &self,
        cluster_name: &str,
        service: &Service,
        nodes: &[Node],
        cancel: &CancellationToken,
    ) -> Result<LoadBalancerStatus> {
        let desired = desired_listeners(service)?;
        let name = load_balancer_name(cluster_name, service);

        let load_balancer = match self.client.load_balancer_by_name(&name).await? {
            Some(lb) => lb,
            None => self.create(&name, cancel).await?,
        };

        self.converge_listeners(&load_balancer, &desired).await?;
        self.converge_targets(&load_balancer, nodes).await?;

        Ok(ingress_status(&load_balancer))
    }

    /// Converge the targets of an existing load balancer only
    #[instrument(skip(self, service, nodes), fields(service = %service_key(service)))]
    pub async fn update_targets(
        &self,
        cluster_name: &str,
        service: &Service,
        nodes: &[Node],
    ) -> Result<()> {
        let name = load_balancer_name(cluster_name, service);
        let Some(load_balancer) = self.client.load_balancer_by_name(&name).await? else {
            return Err(CcmError::NotFound(format!("load balancer {}", name)));
        };

        self.converge_targets(&load_balancer, nodes).await
    }

    /// Delete the load balancer if it exists, without waiting for completion
    #[instrument(skip(self, service), fields(service = %service_key(service)))]
    pub async fn ensure_deleted(&self, cluster_name: &str, service: &Service) -> Result<()> {
        let name = load_balancer_name(cluster_name, service);
        match self.client.load_balancer_by_name(&name).await? {
            Some(load_balancer) => {
                info!("Deleting load balancer {} ({})", name, load_balancer.id);
                self.client.delete_load_balancer(load_balancer.id).await
            }
            None => {
                debug!("Load balancer {} does not exist, nothing to delete", name);
                Ok(())
            }
        }
    }

    async fn create(&self, name: &str, cancel: &CancellationToken) -> Result<LoadBalancer> {
        info!("Creating load balancer {}", name);
        let opts = LoadBalancerCreateOpts {
            name: name.to_string(),
            load_balancer_type: self.load_balancer_type.clone(),
            location: self.location.clone(),
        };

        let (created, action) = self.client.create_load_balancer(&opts).await?;
        self.waiter.wait(&action, cancel).await?.into_result(&action)?;

        // Public addresses are assigned while the create action runs
        let load_balancer = self
            .client
            .load_balancer_by_id(created.id)
            .await?
            .ok_or_else(|| {
                CcmError::NotFound(format!("load balancer {} ({}) after creation", name, created.id))
            })?;

        info!("Load balancer {} ({}) created", name, load_balancer.id);
        Ok(load_balancer)
    }

    async fn converge_listeners(
        &self,
        load_balancer: &LoadBalancer,
        desired: &[ListenerBinding],
    ) -> Result<()> {
        let changes = plan_listeners(&load_balancer.services, desired, self.mode);
        if changes.is_empty() {
            debug!("Listeners of {} are converged", load_balancer.name);
        }

        for change in changes {
            let action = match &change {
                ListenerChange::Add(binding) => {
                    info!(
                        "Adding listener {} -> {}",
                        binding.listen_port, binding.destination_port
                    );
                    self.client.add_service(load_balancer.id, binding).await?
                }
                ListenerChange::Update(binding) => {
                    info!(
                        "Updating listener {} -> {}",
                        binding.listen_port, binding.destination_port
                    );
                    self.client.update_service(load_balancer.id, binding).await?
                }
                ListenerChange::Remove(listen_port) => {
                    info!("Removing listener {}", listen_port);
                    self.client
                        .delete_service(load_balancer.id, *listen_port)
                        .await?
                }
            };
            debug!("{:?} started action {}", change, action.id);
        }

        Ok(())
    }

    async fn converge_targets(&self, load_balancer: &LoadBalancer, nodes: &[Node]) -> Result<()> {
        let mut desired = Vec::with_capacity(nodes.len());
        for node in nodes {
            desired.push(self.resolver.resolve(node).await?);
        }

        let changes = plan_targets(&load_balancer.server_target_ids(), &desired, self.mode);
        if changes.is_empty() {
            debug!("Targets of {} are converged", load_balancer.name);
        }

        for change in changes {
            let action = match change {
                TargetChange::Add(server) => {
                    info!("Adding server target {}", server);
                    self.client.add_server_target(load_balancer.id, server).await?
                }
                TargetChange::Remove(server) => {
                    info!("Removing server target {}", server);
                    self.client
                        .remove_server_target(load_balancer.id, server)
                        .await?
                }
            };
            debug!("{:?} started action {}", change, action.id);
        }

        Ok(())
    }
}
