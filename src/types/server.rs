// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Initializing,
    Starting,
    Stopping,
    Off,
    Deleting,
    Migrating,
    Rebuilding,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerIpv4 {
    pub ip: Ipv4Addr,
}

/// Servers get a whole /64; the network address is reported as the node address
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerIpv6 {
    pub ip: IpNet,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ServerPublicNet {
    #[serde(default)]
    pub ipv4: Option<ServerIpv4>,
    #[serde(default)]
    pub ipv6: Option<ServerIpv6>,
}

/// Attachment of a server to a private network
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PrivateNet {
    pub network: i64,
    pub ip: IpAddr,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerType {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    pub network_zone: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Datacenter {
    pub location: Location,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub public_net: ServerPublicNet,
    #[serde(default)]
    pub private_net: Vec<PrivateNet>,
    #[serde(default)]
    pub server_type: Option<ServerType>,
    #[serde(default)]
    pub datacenter: Option<Datacenter>,
}

impl Server {
    /// The server's private IP in the given network
    pub fn private_ip(&self, network_id: i64) -> Option<IpAddr> {
        self.private_net
            .iter()
            .find(|n| n.network == network_id)
            .map(|n| n.ip)
    }

    pub fn is_running(&self) -> bool {
        self.status == ServerStatus::Running
    }
}
