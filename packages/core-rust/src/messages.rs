//! Wire message schemas for the dispatch protocol.
//!
//! One `DispatchRequest` travels caller -> worker and at most one
//! `DispatchResponse` travels back on the same connection. Both are JSON
//! objects; optional response fields are omitted rather than sent as `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Positional arguments carried by a request.
pub type Args = Vec<Value>;

/// Keyword arguments carried by a request.
pub type Kwargs = Map<String, Value>;

/// Failure text sent when the requested task is not in the worker's registry.
pub const UNREGISTERED_TASK: &str = "Unregistered task.";

/// Failure text sent when a request frame could not be decoded.
pub const MALFORMED_REQUEST: &str = "Malformed request.";

// ---------------------------------------------------------------------------
// DispatchRequest
// ---------------------------------------------------------------------------

/// Invocation request naming one registered task.
///
/// `task` is optional on the wire so that a request without it still decodes
/// and can be classified as invalid instead of malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl DispatchRequest {
    #[must_use]
    pub fn new(task: impl Into<String>, args: Args, kwargs: Kwargs) -> Self {
        Self {
            task: Some(task.into()),
            args,
            kwargs,
        }
    }

    /// Returns the task name, or `None` when it is absent or empty.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.task.as_deref().filter(|name| !name.is_empty())
    }
}

// ---------------------------------------------------------------------------
// DispatchResponse
// ---------------------------------------------------------------------------

/// Acknowledgment written by the worker for each request it answers.
///
/// On success `message` holds the dispatch identifier. On failure it holds a
/// description, except for dispatch failures where it still carries the
/// identifier and `error`/`traceback` describe what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl DispatchResponse {
    /// The task was scheduled under `dispatch_id`.
    #[must_use]
    pub fn dispatched(dispatch_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: dispatch_id.into(),
            error: None,
            traceback: None,
        }
    }

    /// The requested task name is not registered.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            success: false,
            message: UNREGISTERED_TASK.to_string(),
            error: None,
            traceback: None,
        }
    }

    /// Scheduling failed after an identifier was assigned.
    #[must_use]
    pub fn dispatch_failed(
        dispatch_id: impl Into<String>,
        error: impl Into<String>,
        traceback: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: dispatch_id.into(),
            error: Some(error.into()),
            traceback: Some(traceback.into()),
        }
    }

    /// The request payload could not be decoded.
    #[must_use]
    pub fn malformed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: MALFORMED_REQUEST.to_string(),
            error: Some(error.into()),
            traceback: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_defaults_args_and_kwargs() {
        let req: DispatchRequest = serde_json::from_value(json!({ "task": "x" })).unwrap();
        assert_eq!(req.task_name(), Some("x"));
        assert!(req.args.is_empty());
        assert!(req.kwargs.is_empty());
    }

    #[test]
    fn request_without_task_decodes_as_invalid() {
        let req: DispatchRequest = serde_json::from_value(json!({ "args": [1] })).unwrap();
        assert!(req.task.is_none());
        assert!(req.task_name().is_none());
    }

    #[test]
    fn empty_task_name_is_invalid() {
        let req: DispatchRequest = serde_json::from_value(json!({ "task": "" })).unwrap();
        assert!(req.task_name().is_none());
    }

    #[test]
    fn null_task_is_invalid() {
        let req: DispatchRequest = serde_json::from_value(json!({ "task": null })).unwrap();
        assert!(req.task_name().is_none());
    }

    #[test]
    fn non_array_args_fail_to_decode() {
        let result: Result<DispatchRequest, _> =
            serde_json::from_value(json!({ "task": "x", "args": "nope" }));
        assert!(result.is_err());
    }

    #[test]
    fn request_serializes_all_fields() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("waiting".to_string(), json!(3));
        let req = DispatchRequest::new("hello_world", vec![json!(1), json!("a")], kwargs);

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({ "task": "hello_world", "args": [1, "a"], "kwargs": { "waiting": 3 } })
        );
    }

    #[test]
    fn unregistered_response_omits_error_fields() {
        let value = serde_json::to_value(DispatchResponse::unregistered()).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "message": "Unregistered task." })
        );
    }

    #[test]
    fn dispatched_response_shape() {
        let value = serde_json::to_value(DispatchResponse::dispatched("abc")).unwrap();
        assert_eq!(value, json!({ "success": true, "message": "abc" }));
    }

    #[test]
    fn dispatch_failed_response_carries_identifier() {
        let resp = DispatchResponse::dispatch_failed("abc", "boom", "trace");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "message": "abc",
                "error": "boom",
                "traceback": "trace"
            })
        );
    }

    #[test]
    fn response_decodes_without_optional_fields() {
        let resp: DispatchResponse =
            serde_json::from_str(r#"{"success":true,"message":"id-1"}"#).unwrap();
        assert_eq!(resp, DispatchResponse::dispatched("id-1"));
    }
}
