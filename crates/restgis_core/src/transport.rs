//! Request/response seam to the remote service.

use crate::error::{ServiceError, ServiceResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Request parameters, sent as form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    params: BTreeMap<String, String>,
}

impl RequestParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parameter set asking for a JSON response.
    pub fn json() -> Self {
        Self::new().with("f", "json")
    }

    /// Adds or replaces a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Adds or replaces a parameter in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Sets a parameter only if it is not present yet.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns true if the parameter is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterates over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Form field pairs.
    pub fn to_form(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Extend<(String, String)> for RequestParams {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.params.extend(iter);
    }
}

/// Performs requests against the remote service.
///
/// Implementations own session, authentication and HTTP concerns and hand
/// back the parsed JSON body. Error payloads are returned as-is; callers run
/// them through [`check_response`].
pub trait RestTransport: Send + Sync {
    /// Sends `params` to `url` and returns the parsed response.
    fn perform_request(&self, url: &str, params: &RequestParams) -> ServiceResult<Value>;
}

impl<T: RestTransport + ?Sized> RestTransport for Arc<T> {
    fn perform_request(&self, url: &str, params: &RequestParams) -> ServiceResult<Value> {
        (**self).perform_request(url, params)
    }
}

impl<T: RestTransport + ?Sized> RestTransport for &T {
    fn perform_request(&self, url: &str, params: &RequestParams) -> ServiceResult<Value> {
        (**self).perform_request(url, params)
    }
}

/// Raises [`ServiceError::RemoteError`] if the payload carries an `error` object.
pub fn check_response(response: Value) -> ServiceResult<Value> {
    let Some(error) = response.get("error").filter(|e| e.is_object()) else {
        return Ok(response);
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .or_else(|| error.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let details = error
        .get("details")
        .and_then(Value::as_array)
        .map(|d| {
            d.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    tracing::debug!(code, %message, "service returned an error payload");
    Err(ServiceError::RemoteError {
        code,
        message,
        details,
    })
}

/// Performs a request and checks the payload for an error object.
pub fn request_checked<T: RestTransport + ?Sized>(
    transport: &T,
    url: &str,
    params: &RequestParams,
) -> ServiceResult<Value> {
    tracing::debug!(url, params = params.len(), "service request");
    check_response(transport.perform_request(url, params)?)
}

/// One request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Request URL.
    pub url: String,
    /// Request parameters.
    pub params: RequestParams,
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Value),
    Fail(String),
}

/// A scripted transport for testing.
///
/// Responses are queued per URL. The last queued response for a URL is
/// repeated once the queue is down to one entry.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Creates a transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `url`.
    pub fn respond(&self, url: impl Into<String>, response: Value) -> &Self {
        self.push(url.into(), Scripted::Reply(response));
        self
    }

    /// Queues a transport failure for `url`.
    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) -> &Self {
        self.push(url.into(), Scripted::Fail(message.into()));
        self
    }

    /// All requests performed so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests performed against `url`.
    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    /// Forgets recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn push(&self, url: String, response: Scripted) {
        self.responses
            .lock()
            .entry(url)
            .or_default()
            .push_back(response);
    }
}

impl RestTransport for MockTransport {
    fn perform_request(&self, url: &str, params: &RequestParams) -> ServiceResult<Value> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            params: params.clone(),
        });

        let mut responses = self.responses.lock();
        let queue = responses
            .get_mut(url)
            .ok_or_else(|| ServiceError::Protocol(format!("no mock response for {url}")))?;
        let scripted = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match scripted {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail(message)) => Err(ServiceError::transport_retryable(message)),
            None => Err(ServiceError::Protocol(format!("no mock response for {url}"))),
        }
    }
}
