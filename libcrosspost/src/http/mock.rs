//! Scriptable in-process transport
//!
//! Available in all builds (not only `cfg(test)`) so integration tests and
//! downstream crates can drive adapters without a server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::PlatformError;

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, PlatformError> + Send + Sync;

/// Transport that answers every request with a closure and records it
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, PlatformError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Transport that fails the test run loudly if anything is sent
    pub fn unreachable() -> Self {
        Self::new(|req| {
            Err(PlatformError::Network(format!(
                "unexpected request: {} {}",
                req.method, req.url
            )))
        })
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Requests whose path matches exactly
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PlatformError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        (self.handler)(&request)
    }
}
