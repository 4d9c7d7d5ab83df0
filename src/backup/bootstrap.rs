//! Fail-fast credential check run before any archive work.

use crate::backup::remote::ObjectStore;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Probes made before giving up on the credentials
pub const CREDENTIAL_ATTEMPTS: u32 = 5;
/// Fixed pause between two probes
pub const CREDENTIAL_RETRY_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    #[validate(range(min = 1))]
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: CREDENTIAL_ATTEMPTS,
            interval: CREDENTIAL_RETRY_INTERVAL,
        }
    }
}

/// Probes `store` until it answers, at most `policy.attempts` times.
///
/// Waits `policy.interval` between failed probes, never after the last one.
/// Cancellation is honored before each probe, during a probe and during the wait.
pub async fn validate_credentials<S: ObjectStore>(
    store: S,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<S> {
    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled).with_msg("Credential validation interrupted");
        }

        let probed = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = store.probe() => res,
        };

        match probed {
            Ok(()) => {
                tracing::info!("Object store credentials validated on attempt {}", attempt);
                return Ok(store);
            }
            Err(e) if e.is_cancelled() => {
                return Err(e).with_msg("Credential validation interrupted");
            }
            Err(e) => {
                tracing::warn!(
                    "Could not probe object store (attempt {}/{}): {}",
                    attempt,
                    policy.attempts,
                    e
                );
            }
        }

        if attempt < policy.attempts {
            tracing::warn!("Will retry in {:?}", policy.interval);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled).with_msg("Credential validation interrupted");
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Err(Error::CredentialValidation {
        attempts: policy.attempts,
    })
}
