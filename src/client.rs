//! SigNoz HTTP client
//!
//! Implements [`RemoteApi`] over the SigNoz query service. Every response is
//! wrapped in `{"status": ..., "data": ...}`; the client unwraps it so resource
//! types only ever see the object itself.

use declarative::remote::RemoteResult;
use declarative::{RemoteApi, RemoteError};
use serde_json::Value;
use std::time::Duration;
use ureq::http::Response;
use ureq::{Agent, Body};

/// Header carrying the API key
const API_KEY_HEADER: &str = "SIGNOZ-API-KEY";

/// Error bodies are cut to this many characters in messages
const MAX_MESSAGE_LEN: usize = 200;

/// Blocking HTTP implementation of [`RemoteApi`]
pub struct HttpRemote {
    agent: Agent,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRemote {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn collection_url(&self, kind: &str) -> RemoteResult<String> {
        Ok(format!("{}/api/v1/{}", self.endpoint, collection(kind)?))
    }

    fn object_url(&self, kind: &str, id: &str) -> RemoteResult<String> {
        Ok(format!("{}/{id}", self.collection_url(kind)?))
    }

    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    fn get(&self, url: &str) -> RemoteResult<Reply> {
        log::debug!("GET {url}");
        let result = self.agent.get(url).header(API_KEY_HEADER, self.key()).call();
        Reply::from_result(result)
    }

    fn post(&self, url: &str, payload: &Value) -> RemoteResult<Reply> {
        log::debug!("POST {url}");
        let result = self
            .agent
            .post(url)
            .header(API_KEY_HEADER, self.key())
            .send_json(payload);
        Reply::from_result(result)
    }

    fn put(&self, url: &str, payload: &Value) -> RemoteResult<Reply> {
        log::debug!("PUT {url}");
        let result = self
            .agent
            .put(url)
            .header(API_KEY_HEADER, self.key())
            .send_json(payload);
        Reply::from_result(result)
    }

    fn delete_url(&self, url: &str) -> RemoteResult<Reply> {
        log::debug!("DELETE {url}");
        let result = self.agent.delete(url).header(API_KEY_HEADER, self.key()).call();
        Reply::from_result(result)
    }
}

impl RemoteApi for HttpRemote {
    fn create(&self, kind: &str, payload: &Value) -> RemoteResult<Value> {
        self.post(&self.collection_url(kind)?, payload)?.into_data()
    }

    fn read(&self, kind: &str, id: &str) -> RemoteResult<Option<Value>> {
        let reply = self.get(&self.object_url(kind, id)?)?;
        if reply.status == 404 {
            return Ok(None);
        }
        reply.into_data().map(Some)
    }

    fn update(&self, kind: &str, id: &str, payload: &Value) -> RemoteResult<Value> {
        self.put(&self.object_url(kind, id)?, payload)?.into_data()
    }

    fn delete(&self, kind: &str, id: &str) -> RemoteResult<()> {
        self.delete_url(&self.object_url(kind, id)?)?.into_data().map(|_| ())
    }
}

/// Path segment of a kind's collection
fn collection(kind: &str) -> RemoteResult<&'static str> {
    match kind {
        "alert" => Ok("rules"),
        "dashboard" => Ok("dashboards"),
        other => Err(RemoteError::InvalidResponse(format!("no API path for kind `{other}`"))),
    }
}

/// Status and raw body of a completed exchange
#[derive(Debug)]
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn from_result(result: Result<Response<Body>, ureq::Error>) -> RemoteResult<Self> {
        let mut response = result.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().map_err(transport)?;
        log::trace!("HTTP {status}: {body}");
        Ok(Self { status, body })
    }

    /// The envelope's `data`, or a status error for non-2xx replies.
    fn into_data(self) -> RemoteResult<Value> {
        if !(200..300).contains(&self.status) {
            return Err(RemoteError::Status {
                status: self.status,
                message: error_message(&self.body),
            });
        }
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&self.body)
            .map_err(|e| RemoteError::InvalidResponse(format!("response is not JSON: {e}")))?;
        Ok(unwrap_envelope(value))
    }
}

fn transport(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(status) => RemoteError::Status {
            status,
            message: format!("HTTP {status}"),
        },
        other => RemoteError::Transport(other.to_string()),
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("status") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Best human-readable message from an error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"].as_str().or_else(|| v["message"].as_str()))
        .map_or_else(|| body.trim().to_string(), str::to_string);
    if message.chars().count() > MAX_MESSAGE_LEN {
        let cut: String = message.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        message
    }
}
