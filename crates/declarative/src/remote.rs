//! The remote API seam.
//!
//! [`RemoteApi`] is the CRUD surface the lifecycle driver talks to. The HTTP
//! implementation lives with the binary; [`MockRemote`] keeps objects in
//! memory and can rewrite them on the way in, the way a real server injects
//! defaults and reorders keys.
//!
//! ```
//! use declarative::remote::{MockRemote, RemoteApi};
//! use serde_json::json;
//!
//! let remote = MockRemote::new();
//! let created = remote.create("alert", &json!({"alert": "cpu"})).unwrap();
//! let id = created["id"].as_str().unwrap();
//! assert!(remote.read("alert", id).unwrap().is_some());
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Result type alias for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Categories of remote failures for retry logic and user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Could not reach the server, or it timed out.
    Network,
    /// Credentials rejected.
    Auth,
    /// Object does not exist.
    NotFound,
    /// The server rejected the payload.
    Rejected,
    /// The server failed (5xx).
    Server,
    /// Response could not be understood.
    Protocol,
}

impl ErrorCategory {
    /// Whether this category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication failed",
            Self::NotFound => "Remote object not found",
            Self::Rejected => "Request rejected by the server",
            Self::Server => "Server error",
            Self::Protocol => "Unexpected response from the server",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the endpoint and your connection, then try again",
            Self::Auth => "Check that the API key is set and still valid",
            Self::NotFound => "Refresh state to forget objects deleted outside this tool",
            Self::Rejected => "Check the resource definition against the server's validation message",
            Self::Server => "The server may be degraded, try again later",
            Self::Protocol => "Check that the endpoint points at a compatible server version",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server message, if any.
        message: String,
    },

    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Categorize for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Status { status: 401 | 403, .. } => ErrorCategory::Auth,
            Self::Status { status: 404, .. } => ErrorCategory::NotFound,
            Self::Status { status: 500..=599, .. } => ErrorCategory::Server,
            Self::Status { .. } => ErrorCategory::Rejected,
            Self::Transport(_) => ErrorCategory::Network,
            Self::InvalidResponse(_) => ErrorCategory::Protocol,
        }
    }

    /// Whether the call is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// CRUD operations against the remote API.
///
/// `kind` selects the collection ("alert", "dashboard"). Payloads and
/// responses are the API's own JSON shapes; resource types translate them.
pub trait RemoteApi: Send + Sync {
    /// Create an object and return the server's representation of it.
    fn create(&self, kind: &str, payload: &Value) -> RemoteResult<Value>;

    /// Fetch an object. `Ok(None)` when the server has no such object.
    fn read(&self, kind: &str, id: &str) -> RemoteResult<Option<Value>>;

    /// Replace an object and return the server's representation of it.
    fn update(&self, kind: &str, id: &str, payload: &Value) -> RemoteResult<Value>;

    /// Delete an object.
    fn delete(&self, kind: &str, id: &str) -> RemoteResult<()>;
}

/// A server-side rewrite applied to every stored object.
pub type Rewrite = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// One call recorded by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { kind: String },
    Read { kind: String, id: String },
    Update { kind: String, id: String },
    Delete { kind: String, id: String },
}

impl Call {
    /// Whether the call modifies remote state.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Read { .. })
    }
}

#[derive(Default)]
struct MockState {
    objects: HashMap<(String, String), Value>,
    calls: Vec<Call>,
    next_id: u64,
    fail_next: Option<RemoteError>,
}

/// In-memory remote for testing without network access.
///
/// Objects are stored with an `id` field added at the top level. Clones
/// share the same store.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
    rewrite: Option<Rewrite>,
}

impl fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRemote")
            .field("rewrite", &self.rewrite.is_some())
            .finish_non_exhaustive()
    }
}

impl MockRemote {
    /// Create an empty mock remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every payload before it is stored, like a server that injects
    /// defaults into what it was sent.
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        self.lock().fail_next = Some(err);
    }

    /// Store an object directly, as if created outside this tool.
    pub fn insert(&self, kind: &str, id: &str, object: Value) {
        let object = with_id(object, id);
        self.lock().objects.insert((kind.to_string(), id.to_string()), object);
    }

    /// Modify a stored object in place, as if edited outside this tool.
    pub fn edit(&self, kind: &str, id: &str, edit: impl FnOnce(&mut Value)) {
        if let Some(object) = self.lock().objects.get_mut(&(kind.to_string(), id.to_string())) {
            edit(object);
        }
    }

    /// Stored object, if any.
    pub fn get(&self, kind: &str, id: &str) -> Option<Value> {
        self.lock().objects.get(&(kind.to_string(), id.to_string())).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// Whether no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of create, update and delete calls made so far.
    pub fn write_calls(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, call: Call) -> RemoteResult<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn store(&self, kind: &str, payload: &Value) -> Value {
        match &self.rewrite {
            Some(rewrite) => rewrite(kind, payload),
            None => payload.clone(),
        }
    }
}

fn with_id(mut object: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut object {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    object
}

fn not_found(kind: &str, id: &str) -> RemoteError {
    RemoteError::Status {
        status: 404,
        message: format!("{kind} {id} not found"),
    }
}

impl RemoteApi for MockRemote {
    fn create(&self, kind: &str, payload: &Value) -> RemoteResult<Value> {
        let stored = self.store(kind, payload);
        let mut state = self.begin(Call::Create { kind: kind.to_string() })?;
        state.next_id += 1;
        let id = state.next_id.to_string();
        let object = with_id(stored, &id);
        state.objects.insert((kind.to_string(), id), object.clone());
        Ok(object)
    }

    fn read(&self, kind: &str, id: &str) -> RemoteResult<Option<Value>> {
        let state = self.begin(Call::Read {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;
        Ok(state.objects.get(&(kind.to_string(), id.to_string())).cloned())
    }

    fn update(&self, kind: &str, id: &str, payload: &Value) -> RemoteResult<Value> {
        let stored = self.store(kind, payload);
        let mut state = self.begin(Call::Update {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;
        let key = (kind.to_string(), id.to_string());
        if !state.objects.contains_key(&key) {
            return Err(not_found(kind, id));
        }
        let object = with_id(stored, id);
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    fn delete(&self, kind: &str, id: &str) -> RemoteResult<()> {
        let mut state = self.begin(Call::Delete {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;
        state
            .objects
            .remove(&(kind.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_category() {
        let status = |status| RemoteError::Status {
            status,
            message: String::new(),
        };
        assert_eq!(status(401).category(), ErrorCategory::Auth);
        assert_eq!(status(404).category(), ErrorCategory::NotFound);
        assert_eq!(status(400).category(), ErrorCategory::Rejected);
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(RemoteError::Transport("timeout".into()).is_retryable());
        assert!(!RemoteError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_mock_crud() {
        let remote = MockRemote::new();
        let created = remote.create("alert", &json!({"alert": "cpu"})).unwrap();
        assert_eq!(created, json!({"alert": "cpu", "id": "1"}));

        let updated = remote.update("alert", "1", &json!({"alert": "mem"})).unwrap();
        assert_eq!(updated["alert"], "mem");
        assert_eq!(remote.read("alert", "1").unwrap(), Some(updated));

        remote.delete("alert", "1").unwrap();
        assert_eq!(remote.read("alert", "1").unwrap(), None);
        assert!(remote.is_empty());
        assert_eq!(remote.write_calls(), 3);
        assert_eq!(remote.calls().len(), 5);
    }

    #[test]
    fn test_mock_kinds_are_separate() {
        let remote = MockRemote::new();
        remote.insert("alert", "1", json!({}));
        assert!(remote.read("dashboard", "1").unwrap().is_none());
        assert!(remote.update("dashboard", "1", &json!({})).is_err());
    }

    #[test]
    fn test_mock_rewrite() {
        let remote = MockRemote::new().with_rewrite(|_, payload| {
            let mut v = payload.clone();
            v["injected"] = json!(true);
            v
        });
        let created = remote.create("alert", &json!({"a": 1})).unwrap();
        assert_eq!(created["injected"], json!(true));
        assert_eq!(remote.get("alert", "1"), Some(created));
    }

    #[test]
    fn test_mock_fail_next() {
        let remote = MockRemote::new();
        remote.fail_next(RemoteError::Transport("connection reset".into()));
        assert!(remote.create("alert", &json!({})).is_err());
        assert!(remote.create("alert", &json!({})).is_ok());
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn test_mock_edit_and_delete_missing() {
        let remote = MockRemote::new();
        remote.insert("alert", "9", json!({"alert": "cpu"}));
        remote.edit("alert", "9", |v| v["alert"] = json!("renamed"));
        assert_eq!(remote.get("alert", "9").unwrap()["alert"], "renamed");
        let err = remote.delete("alert", "10").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }
}
