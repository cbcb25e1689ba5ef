// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mapping Kubernetes Nodes to hcloud servers.

use crate::constants::PROVIDER_NAME;
use crate::error::{CcmError, Result};
use crate::hcloud::RemoteClient;
use crate::types::Server;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeAddress};
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Format the provider ID stamped on a Node for a server
pub fn provider_id(server_id: i64) -> String {
    format!("{}://{}", PROVIDER_NAME, server_id)
}

/// Parse a `hcloud-from-scratch://<id>` provider ID
pub fn parse_provider_id(provider_id: &str) -> Result<i64> {
    let prefix = format!("{}://", PROVIDER_NAME);
    let Some(id) = provider_id.strip_prefix(&prefix) else {
        return Err(CcmError::MalformedIdentifier(format!(
            "'{}' does not start with '{}'",
            provider_id, prefix
        )));
    };

    id.parse::<i64>().map_err(|e| {
        CcmError::MalformedIdentifier(format!("'{}' has no integer server ID: {}", provider_id, e))
    })
}

fn stamped_provider_id(node: &Node) -> Option<&str> {
    node.spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Resolves a Node to the ID of the server backing it
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, node: &Node) -> Result<i64>;
}

/// Resolves Nodes through the provider ID, falling back to the server name
#[derive(Clone)]
pub struct ServerResolver {
    client: Arc<dyn RemoteClient>,
}

impl ServerResolver {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, node), fields(node = %node.name_any()))]
    pub async fn server_for_node(&self, node: &Node) -> Result<Server> {
        let name = node.name_any();

        let server = match stamped_provider_id(node) {
            Some(provider_id) => {
                let id = parse_provider_id(provider_id)?;
                debug!("Looking up server {} by provider ID", id);
                self.client.server_by_id(id).await?
            }
            None => {
                debug!("Node has no provider ID, looking up server by name");
                self.client.server_by_name(&name).await?
            }
        };

        server.ok_or_else(|| CcmError::NotFound(format!("server for node {}", name)))
    }
}

#[async_trait]
impl NodeResolver for ServerResolver {
    async fn resolve(&self, node: &Node) -> Result<i64> {
        Ok(self.server_for_node(node).await?.id)
    }
}

/// What the host stamps on a Node once its server is known
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMetadata {
    pub provider_id: String,
    pub instance_type: String,
    pub node_addresses: Vec<NodeAddress>,
    pub zone: String,
    pub region: String,
}

/// Instance lookups for Nodes
#[derive(Clone)]
pub struct Instances {
    resolver: ServerResolver,
    network_id: i64,
}

impl Instances {
    pub fn new(client: Arc<dyn RemoteClient>, network_id: i64) -> Self {
        Self {
            resolver: ServerResolver::new(client),
            network_id,
        }
    }

    pub async fn instance_exists(&self, node: &Node) -> Result<bool> {
        match self.resolver.server_for_node(node).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn instance_shutdown(&self, node: &Node) -> Result<bool> {
        let server = self.resolver.server_for_node(node).await?;
        Ok(!server.is_running())
    }

    pub async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata> {
        let server = self.resolver.server_for_node(node).await?;
        let (zone, region) = server
            .datacenter
            .as_ref()
            .map(|dc| (dc.location.name.clone(), dc.location.network_zone.clone()))
            .unwrap_or_default();

        Ok(InstanceMetadata {
            provider_id: provider_id(server.id),
            instance_type: server
                .server_type
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            node_addresses: node_addresses(&server, self.network_id),
            zone,
            region,
        })
    }
}

fn node_address(type_: &str, address: String) -> NodeAddress {
    NodeAddress {
        type_: type_.to_string(),
        address,
    }
}

/// Addresses of a server as Node addresses: hostname, public IPs, private IP
/// in the configured network
pub fn node_addresses(server: &Server, network_id: i64) -> Vec<NodeAddress> {
    let mut addresses = vec![node_address("Hostname", server.name.clone())];

    if let Some(ipv4) = server.public_net.ipv4.as_ref().filter(|v4| !v4.ip.is_unspecified()) {
        addresses.push(node_address("ExternalIP", ipv4.ip.to_string()));
    }

    if let Some(ipv6) = server
        .public_net
        .ipv6
        .as_ref()
        .filter(|v6| !v6.ip.addr().is_unspecified())
    {
        addresses.push(node_address("ExternalIP", ipv6.ip.addr().to_string()));
    }

    if let Some(private_ip) = server.private_ip(network_id) {
        addresses.push(node_address("InternalIP", private_ip.to_string()));
    }

    addresses
}

/// The first InternalIP address of a set of Node addresses
pub fn internal_ip(addresses: &[NodeAddress]) -> Option<&str> {
    addresses
        .iter()
        .find(|a| a.type_ == "InternalIP")
        .map(|a| a.address.as_str())
}
