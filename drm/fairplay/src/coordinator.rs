/*!
    The license-acquisition state machine.

    Every key request runs as its own task:

    ```text
    Idle -> ValidatingConfig -> FetchingCertificate -> AwaitingRequestPayload
         -> ExchangingLicense -> DecodingResponse -> Delivered
    ```

    Any step may instead end in `Failed`, which is reported to the request,
    or in `Abandoned` when the request or the coordinator is gone.
*/

use std::sync::Arc;

use bytes::Bytes;
use data_encoding::BASE64;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::client::LicenseClient;
use crate::config::SourceConfig;
use crate::decoder;
use crate::engine::{KeyRequest, Responder};
use crate::error::KeyExchangeError;
use crate::locator::KeyRequestContext;
use crate::state::KeyExchangeState;

/**
    Drives key requests from the key-session engine to completion.

    Holds the session's [`SourceConfig`] read-only and shares it with all
    in-flight requests. Dropping the coordinator (or calling [`shutdown`])
    stops every in-flight request without resolving it.

    [`shutdown`]: KeyExchangeCoordinator::shutdown
*/
pub struct KeyExchangeCoordinator {
    config: Arc<SourceConfig>,
    client: LicenseClient,
    cancel: CancellationToken,
}

impl KeyExchangeCoordinator {
    pub fn new(config: impl Into<Arc<SourceConfig>>, client: LicenseClient) -> Self {
        Self {
            config: config.into(),
            client,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /**
        Start processing a key request issued for `locator`.

        The coordinator keeps only a weak reference to `request`; the
        engine is expected to hold on to it until it has been answered.
        Must be called from within a Tokio runtime.
    */
    pub fn on_key_request(
        &self,
        locator: impl Into<String>,
        request: Arc<dyn KeyRequest>,
    ) -> KeyExchangeTask {
        let locator = locator.into();
        let (state_tx, state_rx) = watch::channel(KeyExchangeState::Idle);

        let exchange = KeyExchange {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            state: state_tx,
        };
        let responder = Responder::new(&request);
        drop(request);

        let cancel = self.cancel.clone();
        let span = info_span!("key_request", %locator);

        let handle = tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    outcome = exchange.run(&locator, &responder) => outcome,
                    _ = cancel.cancelled() => Err(Halt::Abandoned),
                };
                exchange.finish(outcome, responder);
            }
            .instrument(span),
        );

        KeyExchangeTask {
            state: state_rx,
            handle,
        }
    }

    /**
        Stop all in-flight requests. They end as
        [`Abandoned`](KeyExchangeState::Abandoned) without being resolved.
    */
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!("shutting down key exchange coordinator");
            self.cancel.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for KeyExchangeCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/**
    Handle to one running key request.
*/
#[derive(Debug)]
pub struct KeyExchangeTask {
    state: watch::Receiver<KeyExchangeState>,
    handle: JoinHandle<()>,
}

impl KeyExchangeTask {
    pub fn state(&self) -> KeyExchangeState {
        *self.state.borrow()
    }

    /**
        Receiver that observes every state change of this request.
    */
    pub fn subscribe(&self) -> watch::Receiver<KeyExchangeState> {
        self.state.clone()
    }

    /**
        Wait for the request to finish and return its terminal state.
    */
    pub async fn finished(self) -> KeyExchangeState {
        if let Err(err) = self.handle.await {
            warn!(%err, "key exchange task did not complete");
            return KeyExchangeState::Abandoned;
        }
        *self.state.borrow()
    }
}

/// Why a run stopped before producing a key response.
enum Halt {
    Failed(KeyExchangeError),
    Abandoned,
}

impl From<KeyExchangeError> for Halt {
    fn from(error: KeyExchangeError) -> Self {
        Self::Failed(error)
    }
}

/// Endpoints resolved during validation.
struct ExchangePlan {
    context: KeyRequestContext,
    certificate_url: Url,
    license_url: Url,
}

/// State of one key request, owned by its task.
struct KeyExchange {
    config: Arc<SourceConfig>,
    client: LicenseClient,
    state: watch::Sender<KeyExchangeState>,
}

impl KeyExchange {
    fn transition(&self, next: KeyExchangeState) {
        debug!(state = ?next, "key exchange transition");
        self.state.send_replace(next);
    }

    async fn run(&self, locator: &str, responder: &Responder) -> Result<Bytes, Halt> {
        self.transition(KeyExchangeState::ValidatingConfig);
        let plan = self.validate(locator)?;
        info!(
            content_id = plan.context.content_identifier(),
            certificate_url = %plan.certificate_url,
            license_url = %plan.license_url,
            "processing key request"
        );

        self.transition(KeyExchangeState::FetchingCertificate);
        let certificate = self
            .client
            .fetch_certificate(&plan.certificate_url)
            .await
            .map_err(|source| KeyExchangeError::CertDataEmpty {
                url: plan.certificate_url.clone(),
                source: Some(source),
            })?;
        if certificate.is_empty() {
            return Err(KeyExchangeError::CertDataEmpty {
                url: plan.certificate_url,
                source: None,
            }
            .into());
        }

        self.transition(KeyExchangeState::AwaitingRequestPayload);
        let request = responder.upgrade().ok_or(Halt::Abandoned)?;
        let payload = request
            .make_request_payload(&certificate, plan.context.content_identifier_bytes())
            .await
            .map_err(KeyExchangeError::from)?;
        drop(request);
        debug!(bytes = payload.len(), "request payload generated");

        self.transition(KeyExchangeState::ExchangingLicense);
        let body = self
            .client
            .exchange_license(
                &plan.license_url,
                &BASE64.encode(&payload),
                self.config.headers(),
            )
            .await
            .map_err(|source| KeyExchangeError::LicenseServerError {
                url: plan.license_url.clone(),
                status: source.status(),
                source,
            })?;
        if body.is_empty() {
            return Err(KeyExchangeError::NoData.into());
        }

        self.transition(KeyExchangeState::DecodingResponse);
        let key_response = decoder::normalize(&body);
        if key_response.is_empty() {
            return Err(KeyExchangeError::EmptyCkcData.into());
        }

        Ok(Bytes::from(key_response))
    }

    /**
        Check the config and locator before any network traffic.

        Order matters: a missing certificate URL is reported before a
        missing license URL, and both before a bad locator.
    */
    fn validate(&self, locator: &str) -> Result<ExchangePlan, KeyExchangeError> {
        let certificate_url = self
            .config
            .certificate_url()
            .ok_or(KeyExchangeError::CertUrlEmpty)?;
        let license_url = self
            .config
            .license_url()
            .ok_or(KeyExchangeError::LicenseUrlMissing)?;

        let context = KeyRequestContext::from_locator(locator)?;
        let certificate_url = parse_url(certificate_url)?;
        let license_url = parse_url(license_url)?;
        let query = self.config.content_id_query();
        let license_url = context.license_url(&license_url, query);

        Ok(ExchangePlan {
            context,
            certificate_url,
            license_url,
        })
    }

    fn finish(self, outcome: Result<Bytes, Halt>, responder: Responder) {
        let state = match outcome {
            Ok(key_response) => {
                let bytes = key_response.len();
                if responder.resolve(key_response) {
                    info!(bytes, "delivered key response");
                    KeyExchangeState::Delivered
                } else {
                    KeyExchangeState::Abandoned
                }
            }
            Err(Halt::Failed(error)) => {
                let kind = error.kind();
                warn!(%error, ?kind, "key request failed");
                if responder.reject(error) {
                    KeyExchangeState::Failed(kind)
                } else {
                    KeyExchangeState::Abandoned
                }
            }
            Err(Halt::Abandoned) => {
                debug!("key request abandoned");
                KeyExchangeState::Abandoned
            }
        };
        self.transition(state);
    }
}

fn parse_url(url: &str) -> Result<Url, KeyExchangeError> {
    Url::parse(url).map_err(|source| KeyExchangeError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}
