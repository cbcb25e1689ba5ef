// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Blocking on provider actions until they finish or the caller gives up.

use crate::error::{CcmError, Result};
use crate::hcloud::RemoteClient;
use crate::types::{Action, ActionStatus};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Terminal result of waiting on an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure(String),
    Canceled,
}

impl ActionOutcome {
    /// Outcome of an action snapshot, `None` while it is still running
    pub fn of(action: &Action) -> Option<Self> {
        match action.status {
            ActionStatus::Running => None,
            ActionStatus::Success => Some(ActionOutcome::Success),
            ActionStatus::Error => Some(ActionOutcome::Failure(action.failure_reason())),
        }
    }

    /// Turn a non-successful outcome into the matching error
    pub fn into_result(self, action: &Action) -> Result<()> {
        match self {
            ActionOutcome::Success => Ok(()),
            ActionOutcome::Failure(reason) => Err(CcmError::ActionFailed {
                id: action.id,
                command: action.command.clone(),
                reason,
            }),
            ActionOutcome::Canceled => Err(CcmError::Canceled(action.id)),
        }
    }
}

/// Waits for actions through the client's progress subscription.
///
/// The action itself is never retried here; the remote action keeps running
/// on cancellation.
#[derive(Clone)]
pub struct ActionWaiter {
    client: Arc<dyn RemoteClient>,
}

impl ActionWaiter {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, action, cancel), fields(action = action.id, command = %action.command))]
    pub async fn wait(&self, action: &Action, cancel: &CancellationToken) -> Result<ActionOutcome> {
        if let Some(outcome) = ActionOutcome::of(action) {
            return Ok(outcome);
        }

        let mut progress = self.client.watch_action(action.id);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Canceled while waiting for action");
                    return Ok(ActionOutcome::Canceled);
                }
                next = progress.next() => match next {
                    Some(Ok(snapshot)) => match ActionOutcome::of(&snapshot) {
                        Some(outcome) => {
                            debug!("Action finished: {:?}", outcome);
                            return Ok(outcome);
                        }
                        None => debug!("Action progress: {}%", snapshot.progress),
                    },
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(CcmError::Transport(format!(
                            "progress of action {} ended before it finished",
                            action.id
                        )))
                    }
                },
            }
        }
    }
}
