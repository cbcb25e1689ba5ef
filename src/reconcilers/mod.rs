// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers converging hcloud resources to the cluster's desired state.

pub mod load_balancer;
pub mod routes;

pub use load_balancer::{load_balancer_name, LoadBalancerReconciler};
pub use routes::{Route, RouteReconciler};
