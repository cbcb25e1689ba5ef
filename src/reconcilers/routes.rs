// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Route reconciler - pod CIDR routes in the cluster's private network.

use crate::error::{CcmError, Result};
use crate::hcloud::{ActionWaiter, RemoteClient};
use crate::instances::{internal_ip, node_addresses};
use crate::types::{Action, Network, NetworkRoute, Server};
use ipnet::IpNet;
use k8s_openapi::api::core::v1::NodeAddress;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A route as the route controller sees it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub name: String,
    pub target_node: Option<String>,
    pub target_node_addresses: Vec<NodeAddress>,
    pub destination_cidr: String,
    pub blackhole: bool,
}

/// Network and servers as read at the start of one call
struct RouteSnapshot {
    network: Network,
    servers: Vec<Server>,
}

impl RouteSnapshot {
    fn server_with_private_ip(&self, ip: IpAddr) -> Option<&Server> {
        self.servers
            .iter()
            .find(|s| s.private_ip(self.network.id) == Some(ip))
    }

    fn routes(&self) -> Vec<Route> {
        self.network
            .routes
            .iter()
            .map(|route| {
                let target = self.server_with_private_ip(route.gateway);
                if target.is_none() {
                    warn!("No server owns gateway {} of route {}", route.gateway, route);
                }
                Route {
                    name: route.to_string(),
                    target_node: target.map(|s| s.name.clone()),
                    target_node_addresses: target
                        .map(|s| node_addresses(s, self.network.id))
                        .unwrap_or_default(),
                    destination_cidr: route.destination.to_string(),
                    blackhole: target.is_none(),
                }
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
enum RouteOperation {
    Create,
    Delete,
}

impl RouteOperation {
    fn verb(self) -> &'static str {
        match self {
            RouteOperation::Create => "create",
            RouteOperation::Delete => "delete",
        }
    }
}

/// Creates, deletes and lists routes of one private network
pub struct RouteReconciler {
    client: Arc<dyn RemoteClient>,
    waiter: ActionWaiter,
    network_id: i64,
}

impl RouteReconciler {
    pub fn new(client: Arc<dyn RemoteClient>, network_id: i64) -> Self {
        Self {
            waiter: ActionWaiter::new(client.clone()),
            client,
            network_id,
        }
    }

    async fn network(&self) -> Result<Network> {
        self.client
            .network_by_id(self.network_id)
            .await?
            .ok_or_else(|| CcmError::NotFound(format!("network {}", self.network_id)))
    }

    async fn snapshot(&self) -> Result<RouteSnapshot> {
        let network = self.network().await?;
        let servers = self.client.all_servers().await?;
        Ok(RouteSnapshot { network, servers })
    }

    #[instrument(skip(self), fields(network = self.network_id))]
    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        let routes = self.snapshot().await?.routes();
        debug!("Found {} routes", routes.len());
        Ok(routes)
    }

    #[instrument(skip(self, route, cancel), fields(network = self.network_id, destination = %route.destination_cidr))]
    pub async fn create_route(&self, route: &Route, cancel: &CancellationToken) -> Result<()> {
        self.apply(RouteOperation::Create, route, cancel).await
    }

    #[instrument(skip(self, route, cancel), fields(network = self.network_id, destination = %route.destination_cidr))]
    pub async fn delete_route(&self, route: &Route, cancel: &CancellationToken) -> Result<()> {
        self.apply(RouteOperation::Delete, route, cancel).await
    }

    async fn apply(
        &self,
        operation: RouteOperation,
        route: &Route,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let network_route = self.resolve(route).await?;
        info!("Requesting {} of route {}", operation.verb(), network_route);

        let submitted = match operation {
            RouteOperation::Create => self.client.add_route(self.network_id, &network_route).await,
            RouteOperation::Delete => {
                self.client
                    .delete_route(self.network_id, &network_route)
                    .await
            }
        };
        let action: Action = submitted.map_err(|e| CcmError::RouteRejected {
            operation: operation.verb(),
            route: network_route.to_string(),
            source: Box::new(e),
        })?;

        self.waiter.wait(&action, cancel).await?.into_result(&action)?;
        info!("Route {} {}d", network_route, operation.verb());
        Ok(())
    }

    /// Destination and gateway of a route.
    ///
    /// The gateway is the target node's InternalIP. Without one, the gateway
    /// of an existing route to the same destination is used.
    async fn resolve(&self, route: &Route) -> Result<NetworkRoute> {
        let destination: IpNet = route.destination_cidr.parse().map_err(|e| {
            CcmError::InvalidRoute(format!("destination '{}': {}", route.destination_cidr, e))
        })?;
        let destination = destination.trunc();

        if let Some(address) = internal_ip(&route.target_node_addresses) {
            let gateway: IpAddr = address.parse().map_err(|e| {
                CcmError::InvalidRoute(format!("gateway '{}': {}", address, e))
            })?;
            return Ok(NetworkRoute {
                destination,
                gateway,
            });
        }

        debug!("Target node has no InternalIP, looking for an existing route");
        let gateway = self.network().await?.gateway_for(&destination).ok_or_else(|| {
            CcmError::GatewayResolution(format!(
                "node {} has no InternalIP and no route to {} exists",
                route.target_node.as_deref().unwrap_or("<none>"),
                destination
            ))
        })?;

        Ok(NetworkRoute {
            destination,
            gateway,
        })
    }
}
