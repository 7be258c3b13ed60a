//! Scheduled key rotation for the hosted operator

use fedtrust_core::{FederationOperator, KeyBundleStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Rotate and republish the operator's keys every `period`.
///
/// The first rotation happens one full period after the call.
pub fn spawn_key_rotation(
    operator: FederationOperator,
    bundles: Arc<dyn KeyBundleStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match operator.rotate_and_publish(bundles.as_ref()).await {
                Ok(()) => info!(issuer = %operator.issuer(), "Rotated operator keys"),
                Err(e) => error!(issuer = %operator.issuer(), error = %e, "Key rotation failed"),
            }
        }
    })
}
