// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote resources as returned by the hcloud API.

pub mod action;
pub mod load_balancer;
pub mod network;
pub mod server;

pub use action::{Action, ActionError, ActionStatus};
pub use load_balancer::{
    ListenerBinding, LoadBalancer, LoadBalancerCreateOpts, LoadBalancerPublicNet, Protocol,
    PublicAddress, Target,
};
pub use network::{Network, NetworkRoute};
pub use server::{Server, ServerStatus};
