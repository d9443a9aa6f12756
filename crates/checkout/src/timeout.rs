use std::future::Future;
use std::time::Duration;

use crate::error::{CheckoutError, Result};

/// Runs `future` with an upper bound, reporting expiry as `Timeout`.
pub(crate) async fn bounded<T, E>(
    operation: &'static str,
    after: Duration,
    future: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    CheckoutError: From<E>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result.map_err(CheckoutError::from),
        Err(_) => {
            metrics::counter!("checkout_timeouts_total", "operation" => operation).increment(1);
            tracing::warn!(operation, after_ms = after.as_millis() as u64, "persistence call timed out");
            Err(CheckoutError::Timeout { operation, after })
        }
    }
}
