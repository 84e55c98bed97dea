#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use drm_fairplay::{
    EngineError, HttpRequest, HttpResponse, HttpTransport, KeyExchangeError, KeyRequest,
    LicenseClient, SourceConfig, TransportError,
};
use reqwest::Method;

pub const SOURCE_URL: &str = "https://cdn.example.com/master.m3u8";
pub const CERTIFICATE_URL: &str = "https://license.example.com/fps/cert";
pub const LICENSE_URL: &str = "https://license.example.com/fps/license";

pub fn full_config() -> SourceConfig {
    SourceConfig::new(SOURCE_URL)
        .with_certificate_url(CERTIFICATE_URL)
        .with_license_url(LICENSE_URL)
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Clone, Debug)]
pub enum Reply {
    Status(u16, Vec<u8>),
    Delayed(Duration, u16, Vec<u8>),
    Timeout,
    Pending,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Status(200, body.into())
    }
}

/**
    Transport answering every GET with one reply and every POST with another,
    recording all requests it sees.
*/
pub struct MockTransport {
    get: Reply,
    post: Reply,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(get: Reply, post: Reply) -> Arc<Self> {
        Arc::new(Self {
            get,
            post,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn client(self: &Arc<Self>) -> LicenseClient {
        LicenseClient::new(self.clone())
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = if request.method == Method::GET {
            self.get.clone()
        } else {
            self.post.clone()
        };
        self.requests.lock().unwrap().push(request);

        match reply {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            }),
            Reply::Delayed(delay, status, body) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status,
                    body: Bytes::from(body),
                })
            }
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Pending => std::future::pending().await,
        }
    }
}

// ============================================================================
// Key request
// ============================================================================

#[derive(Debug)]
pub enum Outcome {
    Response(Bytes),
    Error(KeyExchangeError),
}

/**
    Key request that answers payload requests with a fixed result and
    records everything the coordinator tells it.
*/
pub struct MockKeyRequest {
    payload: Result<Vec<u8>, EngineError>,
    payload_calls: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    outcomes: Mutex<Vec<Outcome>>,
}

impl MockKeyRequest {
    pub fn new(payload: Result<Vec<u8>, EngineError>) -> Arc<Self> {
        Arc::new(Self {
            payload,
            payload_calls: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        })
    }

    pub fn with_payload(payload: &[u8]) -> Arc<Self> {
        Self::new(Ok(payload.to_vec()))
    }

    /// (certificate, content identifier) pairs passed to the engine.
    pub fn payload_calls(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.payload_calls.lock().unwrap().clone()
    }

    pub fn take_outcomes(&self) -> Vec<Outcome> {
        std::mem::take(&mut *self.outcomes.lock().unwrap())
    }
}

#[async_trait]
impl KeyRequest for MockKeyRequest {
    async fn make_request_payload(
        &self,
        certificate: &[u8],
        content_identifier: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.payload_calls
            .lock()
            .unwrap()
            .push((certificate.to_vec(), content_identifier.to_vec()));
        self.payload.clone()
    }

    fn process_response(&self, key_response: Bytes) {
        self.outcomes
            .lock()
            .unwrap()
            .push(Outcome::Response(key_response));
    }

    fn process_error(&self, error: KeyExchangeError) {
        self.outcomes.lock().unwrap().push(Outcome::Error(error));
    }
}
