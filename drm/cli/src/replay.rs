use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use drm_fairplay::{EngineError, KeyExchangeError, KeyRequest};
use tracing::{debug, info};

/**
    Key request that answers with a request payload captured earlier,
    instead of synthesizing one from the certificate.

    Useful for replaying a payload recorded from a real device against a
    license server.
*/
pub struct ReplayRequest {
    payload: Vec<u8>,
    outcome: Mutex<Option<Result<Bytes, KeyExchangeError>>>,
}

impl ReplayRequest {
    pub fn new(payload: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            payload,
            outcome: Mutex::new(None),
        })
    }

    /**
        Take the answer the coordinator delivered, if any.
    */
    pub fn take_outcome(&self) -> Option<Result<Bytes, KeyExchangeError>> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<Bytes, KeyExchangeError>>> {
        // Poisoning only happens if a panic occurred while storing an outcome
        self.outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyRequest for ReplayRequest {
    async fn make_request_payload(
        &self,
        certificate: &[u8],
        content_identifier: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        if self.payload.is_empty() {
            return Err(EngineError::new("replayed request payload is empty"));
        }
        info!(
            certificate = certificate.len(),
            content_id = %String::from_utf8_lossy(content_identifier),
            payload = self.payload.len(),
            "replaying captured request payload"
        );
        Ok(self.payload.clone())
    }

    fn process_response(&self, key_response: Bytes) {
        debug!(bytes = key_response.len(), "key response delivered");
        *self.lock() = Some(Ok(key_response));
    }

    fn process_error(&self, error: KeyExchangeError) {
        debug!(%error, "key request rejected");
        *self.lock() = Some(Err(error));
    }
}
