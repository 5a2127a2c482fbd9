use std::future::Future;
use tokio::time::{timeout_at, Instant};

use crate::error::EngineError;
use crate::ports::StoreResult;

/// Runs a store call against a shared deadline.
pub(crate) async fn store_call<T, F>(deadline: Instant, what: &str, call: F) -> Result<T, EngineError>
where
    F: Future<Output = StoreResult<T>>,
{
    match timeout_at(deadline, call).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => Err(EngineError::Timeout(what.to_string())),
    }
}

/// Like [`store_call`] for futures that cannot fail on their own.
pub(crate) async fn wait<T, F>(deadline: Instant, what: &str, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = T>,
{
    timeout_at(deadline, fut)
        .await
        .map_err(|_| EngineError::Timeout(what.to_string()))
}
