// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A static route of a private network. Unique by (destination, gateway).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetworkRoute {
    pub destination: IpNet,
    pub gateway: IpAddr,
}

impl fmt::Display for NetworkRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.destination, self.gateway)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub routes: Vec<NetworkRoute>,
}

impl Network {
    /// Gateway of an existing route to `destination`, if any
    pub fn gateway_for(&self, destination: &IpNet) -> Option<IpAddr> {
        self.routes
            .iter()
            .find(|r| r.destination.trunc() == destination.trunc())
            .map(|r| r.gateway)
    }
}
