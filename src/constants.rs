// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Scheme of the provider IDs stamped on Nodes (`hcloud-from-scratch://<server id>`)
pub const PROVIDER_NAME: &str = "hcloud-from-scratch";

/// User agent sent with every API request
pub const USER_AGENT: &str = concat!("hcloud-ccm/", env!("CARGO_PKG_VERSION"));

/// hcloud API defaults
pub mod api {
    pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";
    /// Page size used when listing the full server inventory
    pub const SERVERS_PER_PAGE: u32 = 50;
}

/// Defaults for newly created load balancers
pub mod load_balancer {
    pub const DEFAULT_TYPE: &str = "lb11";
    pub const DEFAULT_LOCATION: &str = "fsn1";
}

/// Action progress polling configuration
pub mod action {
    /// Initial polling interval in milliseconds
    pub const POLL_INTERVAL_MS: u64 = 500;
    /// Maximum polling interval in milliseconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_MS: u64 = 5_000;
}
