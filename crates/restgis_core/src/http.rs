//! HTTP transport adapter.
//!
//! The actual HTTP client is abstracted via a trait so any library (reqwest,
//! ureq, a proxy page client) can be plugged in. This module only deals
//! with form encoding conventions and JSON decoding.

use crate::error::{ServiceError, ServiceResult};
use crate::transport::{RequestParams, RestTransport};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a form-encoded POST request and returns the response body.
    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// [`RestTransport`] over an [`HttpClient`].
///
/// Every request asks for a JSON response (`f=json`) unless the caller set
/// another format, and carries the session token when one is configured.
pub struct HttpTransport<C: HttpClient> {
    client: C,
    token: Option<String>,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self {
            client,
            token: None,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Attaches a token obtained elsewhere.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the message of the last failed request, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if the transport can send requests.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Stops sending requests until [`HttpTransport::reconnect`].
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Allows requests again after [`HttpTransport::close`].
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<C: HttpClient> RestTransport for HttpTransport<C> {
    fn perform_request(&self, url: &str, params: &RequestParams) -> ServiceResult<Value> {
        if !self.is_connected() {
            return Err(ServiceError::transport_fatal("not connected"));
        }

        let mut params = params.clone();
        params.set_default("f", "json");
        if let Some(token) = &self.token {
            params.set_default("token", token.clone());
        }

        let body = self.client.post_form(url, &params.to_form()).map_err(|e| {
            self.set_error(&e);
            ServiceError::transport_retryable(e)
        })?;

        self.clear_error();

        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::Protocol(format!("failed to decode response from {url}: {e}"))
        })
    }
}
