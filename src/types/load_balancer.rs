// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Http,
    Https,
}

/// A load balancer "service": traffic on `listen_port` is forwarded to
/// `destination_port` on every target.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListenerBinding {
    #[serde(default)]
    pub protocol: Protocol,
    pub listen_port: u16,
    pub destination_port: u16,
}

impl ListenerBinding {
    pub fn tcp(listen_port: u16, destination_port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            listen_port,
            destination_port,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerRef {
    pub id: i64,
}

/// A load balancer target. Only server targets are managed; label selector
/// and IP targets are kept opaque.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Server { server: ServerRef },
    #[serde(other)]
    Other,
}

impl Target {
    pub fn server(id: i64) -> Self {
        Target::Server {
            server: ServerRef { id },
        }
    }

    pub fn server_id(&self) -> Option<i64> {
        match self {
            Target::Server { server } => Some(server.id),
            Target::Other => None,
        }
    }
}

/// A public address, optionally with its reverse DNS entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct PublicAddress {
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub dns_ptr: Option<String>,
}

impl PublicAddress {
    /// The address, unless it is absent or unspecified
    pub fn specified_ip(&self) -> Option<IpAddr> {
        self.ip.filter(|ip| !ip.is_unspecified())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct LoadBalancerPublicNet {
    #[serde(default)]
    pub ipv4: PublicAddress,
    #[serde(default)]
    pub ipv6: PublicAddress,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub public_net: LoadBalancerPublicNet,
    #[serde(default)]
    pub services: Vec<ListenerBinding>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl LoadBalancer {
    /// IDs of all servers targeted by this load balancer
    pub fn server_target_ids(&self) -> Vec<i64> {
        self.targets.iter().filter_map(Target::server_id).collect()
    }

    /// Public IPv4 and IPv6 addresses that are actually assigned
    pub fn public_addresses(&self) -> Vec<(IpAddr, Option<&str>)> {
        [&self.public_net.ipv4, &self.public_net.ipv6]
            .into_iter()
            .filter_map(|a| a.specified_ip().map(|ip| (ip, a.dns_ptr.as_deref())))
            .collect()
    }
}

/// Request body for creating a load balancer
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerCreateOpts {
    pub name: String,
    pub load_balancer_type: String,
    pub location: String,
}
