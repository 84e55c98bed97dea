use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::decoder;
use crate::error::status_label;
use crate::transport::{
    HttpRequest, HttpTransport, ReqwestTransport, TransportError, TransportOptions,
};

/**
    Default `Content-Type` and `Accept` of license requests.
*/
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("certificate fetch from {url} failed ({})", status_label(.status))]
    CertificateFetchFailed {
        url: Url,
        status: Option<u16>,
        #[source]
        source: Option<TransportError>,
    },

    #[error("license exchange with {url} failed ({})", status_label(.status))]
    LicenseServer {
        url: Url,
        status: Option<u16>,
        #[source]
        source: Option<TransportError>,
    },

    #[error("invalid license request header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl ClientError {
    /**
        HTTP status the server answered with, if the request got that far.
    */
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CertificateFetchFailed { status, .. } | Self::LicenseServer { status, .. } => {
                *status
            }
            Self::InvalidHeader { .. } => None,
        }
    }
}

/**
    Performs the certificate fetch and license exchange over an [`HttpTransport`].

    Cheap to clone; clones share the underlying transport.
*/
#[derive(Clone)]
pub struct LicenseClient {
    transport: Arc<dyn HttpTransport>,
}

impl LicenseClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /**
        Create a client on a fresh [`ReqwestTransport`].
    */
    pub fn with_options(options: TransportOptions) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(options)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /**
        Fetch the application certificate with a `GET`.

        Only `200 OK` counts as success. The body is normalized, since
        certificates may also arrive base64-wrapped in a `<cert>` element.
    */
    pub async fn fetch_certificate(&self, url: &Url) -> Result<Bytes, ClientError> {
        let response = self
            .transport
            .execute(HttpRequest::get(url.clone()))
            .await
            .map_err(|source| {
                warn!(%url, error = %source, "certificate request failed");
                ClientError::CertificateFetchFailed {
                    url: url.clone(),
                    status: None,
                    source: Some(source),
                }
            })?;

        if response.status != 200 {
            warn!(%url, status = response.status, "certificate server error");
            return Err(ClientError::CertificateFetchFailed {
                url: url.clone(),
                status: Some(response.status),
                source: None,
            });
        }

        let certificate = decoder::normalize(&response.body);
        debug!(
            received = response.body.len(),
            certificate = certificate.len(),
            "fetched certificate"
        );
        Ok(Bytes::from(certificate))
    }

    /**
        Send a base64 request payload to the license server with a `POST`.

        `Content-Type` and `Accept` default to `application/octet-stream`;
        `extra_headers` are applied on top and win over the defaults.
        Any 2xx status is a success. The body is returned as received.
    */
    pub async fn exchange_license(
        &self,
        url: &Url,
        request_payload_base64: &str,
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<Bytes, ClientError> {
        let headers = license_headers(extra_headers)?;
        let request = HttpRequest::post(url.clone(), request_payload_base64.to_owned())
            .with_headers(headers);

        let response = self.transport.execute(request).await.map_err(|source| {
            warn!(%url, error = %source, "license request failed");
            ClientError::LicenseServer {
                url: url.clone(),
                status: None,
                source: Some(source),
            }
        })?;

        if !(200..300).contains(&response.status) {
            warn!(%url, status = response.status, "license server returned error status");
            return Err(ClientError::LicenseServer {
                url: url.clone(),
                status: Some(response.status),
                source: None,
            });
        }

        debug!(bytes = response.body.len(), "received license response");
        Ok(response.body)
    }
}

fn license_headers(extra: &BTreeMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    headers.insert(ACCEPT, HeaderValue::from_static(OCTET_STREAM));

    for (name, value) in extra {
        let invalid = |reason: String| ClientError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| invalid(e.to_string()))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
