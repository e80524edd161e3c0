//! Loader and action contracts: arguments, tagged results and route errors.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cancel::Cancellation;
use crate::deferred::DeferredData;
use crate::location::Location;
use crate::submission::Submission;
use crate::Params;

/// Control-flow signal that sends the navigation elsewhere
///
/// Returned as [`DataResponse::Redirect`] or raised as an `Err` from a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("redirect ({status}) to {location}")]
pub struct Redirect {
    pub location: String,
    pub status: u16,
    /// Replace the current history entry instead of pushing
    pub replace: bool,
    /// Force revalidation of every loader at the target
    pub revalidate: bool,
}

impl Redirect {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: 302,
            replace: false,
            revalidate: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn revalidating(mut self) -> Self {
        self.revalidate = true;
        self
    }

    /// 307 and 308 re-submit with the original method and body
    pub fn preserves_submission(&self) -> bool {
        matches!(self.status, 307 | 308)
    }
}

/// Structured, status-bearing error raised on purpose by a handler
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{status} {status_text}")]
pub struct ErrorResponse {
    pub status: u16,
    pub status_text: String,
    pub data: Option<Value>,
    /// Raised by the navigator itself rather than application code
    pub internal: bool,
}

impl ErrorResponse {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            data: None,
            internal: false,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn not_found(pathname: &str) -> Self {
        Self {
            status: 404,
            status_text: "Not Found".to_string(),
            data: Some(Value::String(format!(
                "No route matches URL \"{}\"",
                pathname
            ))),
            internal: true,
        }
    }

    pub fn method_not_allowed(method: &str, pathname: &str, route_id: &str) -> Self {
        Self {
            status: 405,
            status_text: "Method Not Allowed".to_string(),
            data: Some(Value::String(format!(
                "You made a {} request to \"{}\" but did not provide an action for route \"{}\"",
                method, pathname, route_id
            ))),
            internal: true,
        }
    }
}

/// Error recorded against a route in a committed snapshot
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteError {
    #[error("{0}")]
    Response(ErrorResponse),

    #[error("{message}")]
    Unexpected { message: String },
}

impl RouteError {
    pub fn unexpected(message: impl fmt::Display) -> Self {
        RouteError::Unexpected {
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            RouteError::Response(response) => response.status,
            RouteError::Unexpected { .. } => 500,
        }
    }

    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            RouteError::Response(response) => Some(response),
            RouteError::Unexpected { .. } => None,
        }
    }
}

impl From<ErrorResponse> for RouteError {
    fn from(response: ErrorResponse) -> Self {
        RouteError::Response(response)
    }
}

/// What a route's data may be: a plain value or a partly pending map
#[derive(Debug, Clone)]
pub enum RouteData {
    Value(Value),
    Deferred(DeferredData),
}

impl RouteData {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RouteData::Value(value) => Some(value),
            RouteData::Deferred(_) => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredData> {
        match self {
            RouteData::Value(_) => None,
            RouteData::Deferred(deferred) => Some(deferred),
        }
    }

    /// Cancels any pending deferred values
    pub fn cancel_deferred(&self) {
        if let RouteData::Deferred(deferred) = self {
            deferred.cancel();
        }
    }

    /// Waits for every deferred part and collapses to a plain value
    pub async fn resolve(self) -> Result<Value, RouteError> {
        match self {
            RouteData::Value(value) => Ok(value),
            RouteData::Deferred(deferred) => deferred.resolve_all().await,
        }
    }
}

impl From<Value> for RouteData {
    fn from(value: Value) -> Self {
        RouteData::Value(value)
    }
}

impl From<DeferredData> for RouteData {
    fn from(deferred: DeferredData) -> Self {
        RouteData::Deferred(deferred)
    }
}

/// Tagged result of a loader or action
#[derive(Debug, Clone)]
pub enum DataResponse {
    Data(RouteData),
    Redirect(Redirect),
    Error(ErrorResponse),
}

/// Handler return type
///
/// An `Err` carrying a [`Redirect`] or [`ErrorResponse`] is interpreted as
/// that control-flow value; any other `Err` is an unexpected error.
pub type DataResult = anyhow::Result<DataResponse>;

/// `Ok(DataResponse::Data(value))`
pub fn json(value: Value) -> DataResult {
    Ok(DataResponse::Data(RouteData::Value(value)))
}

/// `Ok(DataResponse::Data(deferred))`
pub fn defer(deferred: DeferredData) -> DataResult {
    Ok(DataResponse::Data(RouteData::Deferred(deferred)))
}

/// `Ok(DataResponse::Redirect(..))` with a 302
pub fn redirect(location: impl Into<String>) -> DataResult {
    Ok(DataResponse::Redirect(Redirect::new(location)))
}

/// Arguments handed to every loader and action
#[derive(Debug, Clone)]
pub struct DataArgs {
    pub route_id: String,
    pub location: Location,
    pub params: Params,
    /// Present for actions and GET form submissions
    pub submission: Option<Submission>,
    pub cancellation: Cancellation,
}

/// A loader or action
///
/// Implemented for any `Fn(DataArgs) -> impl Future<Output = DataResult>`.
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn call(&self, args: DataArgs) -> DataResult;
}

#[async_trait]
impl<F, Fut> DataHandler for F
where
    F: Fn(DataArgs) -> Fut + Send + Sync,
    Fut: Future<Output = DataResult> + Send + 'static,
{
    async fn call(&self, args: DataArgs) -> DataResult {
        (self)(args).await
    }
}

/// A handler result with control flow made explicit
#[derive(Debug)]
pub(crate) enum HandlerOutcome {
    Data(RouteData),
    Redirect(Redirect),
    Error(RouteError),
}

impl From<DataResult> for HandlerOutcome {
    fn from(result: DataResult) -> Self {
        match result {
            Ok(DataResponse::Data(data)) => HandlerOutcome::Data(data),
            Ok(DataResponse::Redirect(redirect)) => HandlerOutcome::Redirect(redirect),
            Ok(DataResponse::Error(response)) => HandlerOutcome::Error(response.into()),
            Err(err) => match classify_error(err) {
                Ok(redirect) => HandlerOutcome::Redirect(redirect),
                Err(error) => HandlerOutcome::Error(error),
            },
        }
    }
}

/// Splits a raised error into a redirect or a route error
pub(crate) fn classify_error(err: anyhow::Error) -> Result<Redirect, RouteError> {
    let err = match err.downcast::<Redirect>() {
        Ok(redirect) => return Ok(redirect),
        Err(err) => err,
    };
    match err.downcast::<ErrorResponse>() {
        Ok(response) => Err(RouteError::Response(response)),
        Err(err) => Err(RouteError::unexpected(format!("{:#}", err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(result: DataResult) -> HandlerOutcome {
        HandlerOutcome::from(result)
    }

    #[test]
    fn test_raised_redirect_is_control_flow() {
        let result: DataResult = Err(Redirect::new("/login").into());
        assert!(matches!(
            outcome(result),
            HandlerOutcome::Redirect(Redirect { ref location, .. }) if location == "/login"
        ));
    }

    #[test]
    fn test_raised_error_response_keeps_status() {
        let result: DataResult = Err(ErrorResponse::new(403, "Forbidden").into());
        match outcome(result) {
            HandlerOutcome::Error(error) => assert_eq!(error.status(), 403),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_are_unexpected() {
        let result: DataResult = Err(anyhow::anyhow!("db down").context("loading user"));
        match outcome(result) {
            HandlerOutcome::Error(RouteError::Unexpected { message }) => {
                assert_eq!(message, "loading user: db down")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_returned_error_response() {
        let result: DataResult = Ok(DataResponse::Error(ErrorResponse::new(400, "Bad Request")));
        assert!(matches!(outcome(result), HandlerOutcome::Error(RouteError::Response(_))));
    }

    #[test]
    fn test_redirect_status_semantics() {
        assert!(!Redirect::new("/a").preserves_submission());
        assert!(Redirect::new("/a").with_status(307).preserves_submission());
        assert!(Redirect::new("/a").with_status(308).preserves_submission());
    }

    #[test]
    fn test_route_error_serializes_tagged() {
        let error = RouteError::Response(ErrorResponse::not_found("/nope"));
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["kind"], json!("response"));
        assert_eq!(value["status"], json!(404));
        let back: RouteError = serde_json::from_value(value).unwrap();
        assert_eq!(back, error);
    }

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = |args: DataArgs| async move { json(json!({ "route": args.route_id })) };
        let args = DataArgs {
            route_id: "root".to_string(),
            location: Location::default(),
            params: Params::new(),
            submission: None,
            cancellation: Cancellation::new(),
        };
        match handler.call(args).await.unwrap() {
            DataResponse::Data(data) => assert_eq!(data.as_value(), Some(&json!({"route": "root"}))),
            other => panic!("unexpected response {:?}", other),
        }
    }
}
