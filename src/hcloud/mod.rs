// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! hcloud API access: the client abstraction, its HTTP implementation and
//! waiting on asynchronous actions.

pub mod action;
pub mod client;

pub use action::{ActionOutcome, ActionWaiter};
pub use client::HcloudClient;

use crate::error::Result;
use crate::types::{
    Action, ListenerBinding, LoadBalancer, LoadBalancerCreateOpts, Network, NetworkRoute, Server,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Typed access to the provider resources the reconcilers read and mutate.
///
/// Lookups return `Ok(None)` when the resource does not exist; only transport
/// and API failures are errors. Mutations return the action tracking them.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>>;

    async fn load_balancer_by_id(&self, id: i64) -> Result<Option<LoadBalancer>>;

    /// The returned load balancer reflects the create response and may not
    /// carry public addresses yet.
    async fn create_load_balancer(
        &self,
        opts: &LoadBalancerCreateOpts,
    ) -> Result<(LoadBalancer, Action)>;

    async fn delete_load_balancer(&self, id: i64) -> Result<()>;

    async fn add_service(&self, load_balancer: i64, binding: &ListenerBinding) -> Result<Action>;

    async fn update_service(&self, load_balancer: i64, binding: &ListenerBinding)
        -> Result<Action>;

    async fn delete_service(&self, load_balancer: i64, listen_port: u16) -> Result<Action>;

    async fn add_server_target(&self, load_balancer: i64, server: i64) -> Result<Action>;

    async fn remove_server_target(&self, load_balancer: i64, server: i64) -> Result<Action>;

    async fn network_by_id(&self, id: i64) -> Result<Option<Network>>;

    async fn add_route(&self, network: i64, route: &NetworkRoute) -> Result<Action>;

    async fn delete_route(&self, network: i64, route: &NetworkRoute) -> Result<Action>;

    /// The full server inventory of the project
    async fn all_servers(&self) -> Result<Vec<Server>>;

    async fn server_by_id(&self, id: i64) -> Result<Option<Server>>;

    async fn server_by_name(&self, name: &str) -> Result<Option<Server>>;

    /// Subscribe to progress of an action. The stream yields action snapshots
    /// and ends after the first terminal one.
    fn watch_action(&self, id: i64) -> BoxStream<'static, Result<Action>>;
}
