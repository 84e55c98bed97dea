/*!
    Boundary to the platform key-session engine.

    The engine owns each in-flight key request and exposes it as a
    [`KeyRequest`] handle. The coordinator only ever holds handles weakly.
*/

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::error::KeyExchangeError;

/**
    Failure reported by the key-session engine while synthesizing a
    request payload. Passed through to the request unchanged.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key session engine error: {message}")]
pub struct EngineError {
    pub code: Option<i64>,
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

/**
    One in-flight key request issued by the key-session engine.

    The coordinator calls exactly one of [`process_response`] or
    [`process_error`] for every request that reaches a terminal state,
    and never calls either once the request has been dropped by the engine.

    [`process_response`]: KeyRequest::process_response
    [`process_error`]: KeyRequest::process_error
*/
#[async_trait]
pub trait KeyRequest: Send + Sync {
    /**
        Synthesize the request payload (SPC) for `content_identifier`,
        bound to the application `certificate`.
    */
    async fn make_request_payload(
        &self,
        certificate: &[u8],
        content_identifier: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /**
        Deliver the key response (CKC) for this request.
    */
    fn process_response(&self, key_response: Bytes);

    /**
        Report that this request failed.
    */
    fn process_error(&self, error: KeyExchangeError);
}

/**
    Single-use delivery slot for one key request.

    Resolving consumes the responder, so a request can only be answered
    once. If the engine already dropped the request, resolving is a no-op
    and reports `false`.
*/
pub(crate) struct Responder {
    request: Weak<dyn KeyRequest>,
}

impl Responder {
    pub(crate) fn new(request: &Arc<dyn KeyRequest>) -> Self {
        Self {
            request: Arc::downgrade(request),
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn KeyRequest>> {
        self.request.upgrade()
    }

    pub(crate) fn resolve(self, key_response: Bytes) -> bool {
        match self.request.upgrade() {
            Some(request) => {
                request.process_response(key_response);
                true
            }
            None => {
                debug!("key request released before the response could be delivered");
                false
            }
        }
    }

    pub(crate) fn reject(self, error: KeyExchangeError) -> bool {
        match self.request.upgrade() {
            Some(request) => {
                request.process_error(error);
                true
            }
            None => {
                debug!(%error, "key request released before the error could be delivered");
                false
            }
        }
    }
}
