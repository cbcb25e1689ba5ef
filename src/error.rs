// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CcmError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("hcloud API request failed: {0}")]
    Transport(String),

    #[error("Unable to resolve gateway IP: {0}")]
    GatewayResolution(String),

    #[error("Action {command} ({id}) failed: {reason}")]
    ActionFailed {
        id: i64,
        command: String,
        reason: String,
    },

    #[error("Malformed provider ID: {0}")]
    MalformedIdentifier(String),

    #[error("Canceled while waiting for action {0}")]
    Canceled(i64),

    #[error("Unable to {operation} route {route}: request rejected: {source}")]
    RouteRejected {
        operation: &'static str,
        route: String,
        #[source]
        source: Box<CcmError>,
    },

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Invalid service: {0}")]
    InvalidService(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CcmError {
    /// True for absence of an expected remote resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, CcmError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CcmError>;
