//! Deferred loader data: values that settle after the snapshot commits.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::cancel::Cancellation;
use crate::data::{classify_error, RouteError};

/// Why a deferred value did not produce data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeferredError {
    /// Its route data was replaced, its route left the match set, or its
    /// navigation was superseded
    #[error("deferred value was cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(RouteError),
}

type DeferredFuture = Shared<BoxFuture<'static, Result<Value, DeferredError>>>;

/// Clonable handle to one pending value
///
/// Every clone observes the same result. When created inside a tokio runtime
/// the value is driven in the background, so [`peek`](Self::peek) settles
/// even if nobody awaits it.
#[derive(Clone)]
pub struct DeferredHandle {
    future: DeferredFuture,
    cancellation: Cancellation,
}

impl DeferredHandle {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let cancellation = Cancellation::new();
        let token = cancellation.clone();

        let future = async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(DeferredError::Cancelled),
                result = future => result.map_err(|err| match classify_error(err) {
                    Ok(redirect) => DeferredError::Failed(RouteError::unexpected(format!(
                        "deferred values cannot redirect (to {})",
                        redirect.location
                    ))),
                    Err(error) => DeferredError::Failed(error),
                }),
            }
        }
        .boxed()
        .shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(future.clone());
        }

        Self {
            future,
            cancellation,
        }
    }

    /// The result, if already settled
    pub fn peek(&self) -> Option<Result<Value, DeferredError>> {
        self.future.peek().cloned()
    }

    pub fn is_settled(&self) -> bool {
        self.future.peek().is_some()
    }

    /// Cancels the value; a no-op once settled
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub async fn resolve(&self) -> Result<Value, DeferredError> {
        self.future.clone().await
    }
}

impl fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("settled", &self.peek())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// One entry of [`DeferredData`]
#[derive(Debug, Clone)]
pub enum DeferredValue {
    Ready(Value),
    Pending(DeferredHandle),
}

/// Route data where some keys are available now and others later
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use silcrow_nav::{DeferredData, DeferredValue};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let data = DeferredData::new()
///     .ready("user", json!({"name": "ada"}))
///     .pending("stats", async { Ok(json!({"posts": 3})) });
///
/// assert!(matches!(data.get("user"), Some(DeferredValue::Ready(_))));
/// assert_eq!(data.pending_keys(), vec!["stats"]);
///
/// let all = data.resolve_all().await.unwrap();
/// assert_eq!(all, json!({"user": {"name": "ada"}, "stats": {"posts": 3}}));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeferredData {
    entries: BTreeMap<String, DeferredValue>,
}

impl DeferredData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), DeferredValue::Ready(value));
        self
    }

    pub fn pending<F>(mut self, key: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.entries
            .insert(key.into(), DeferredValue::Pending(DeferredHandle::new(future)));
        self
    }

    pub fn get(&self, key: &str) -> Option<&DeferredValue> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Keys whose values have not settled yet
    pub fn pending_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                DeferredValue::Pending(handle) if !handle.is_settled() => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_settled(&self) -> bool {
        self.pending_keys().is_empty()
    }

    /// Ready values plus pending values that settled successfully
    pub fn current_value(&self) -> Value {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .filter_map(|(key, value)| match value {
                DeferredValue::Ready(value) => Some((key.clone(), value.clone())),
                DeferredValue::Pending(handle) => match handle.peek() {
                    Some(Ok(value)) => Some((key.clone(), value)),
                    _ => None,
                },
            })
            .collect();
        Value::Object(object)
    }

    pub fn cancel(&self) {
        for value in self.entries.values() {
            if let DeferredValue::Pending(handle) = value {
                handle.cancel();
            }
        }
    }

    /// Awaits every pending value and returns the whole map as one object
    pub async fn resolve_all(&self) -> Result<Value, RouteError> {
        let mut object = Map::new();
        for (key, value) in &self.entries {
            let resolved = match value {
                DeferredValue::Ready(value) => value.clone(),
                DeferredValue::Pending(handle) => match handle.resolve().await {
                    Ok(value) => value,
                    Err(DeferredError::Failed(error)) => return Err(error),
                    Err(DeferredError::Cancelled) => {
                        return Err(RouteError::unexpected(DeferredError::Cancelled))
                    }
                },
            };
            object.insert(key.clone(), resolved);
        }
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ErrorResponse;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_pending_settles_in_background() {
        let handle = DeferredHandle::new(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!(42))
        });
        assert!(handle.peek().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.peek(), Some(Ok(json!(42))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_settle() {
        let handle = DeferredHandle::new(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!(1))
        });
        handle.cancel();
        assert_eq!(handle.resolve().await, Err(DeferredError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_after_settle_keeps_value() {
        let handle = DeferredHandle::new(async { Ok(json!("done")) });
        assert_eq!(handle.resolve().await, Ok(json!("done")));
        handle.cancel();
        assert_eq!(handle.resolve().await, Ok(json!("done")));
    }

    #[tokio::test]
    async fn test_failure_is_classified() {
        let handle =
            DeferredHandle::new(async { Err(ErrorResponse::new(404, "Not Found").into()) });
        match handle.resolve().await {
            Err(DeferredError::Failed(error)) => assert_eq!(error.status(), 404),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_value_only_includes_settled() {
        let data = DeferredData::new()
            .ready("now", json!(1))
            .pending("later", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(json!(2))
            });

        assert_eq!(data.current_value(), json!({"now": 1}));
        assert!(!data.is_settled());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(data.current_value(), json!({"now": 1, "later": 2}));
        assert!(data.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_all_reports_cancellation() {
        let data = DeferredData::new().pending("slow", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(json!(null))
        });
        data.cancel();
        assert!(data.resolve_all().await.is_err());
    }
}
