use std::io;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::client::ClientError;
use crate::engine::EngineError;

/**
    Tag identifying which kind of [`KeyExchangeError`] ended a key request.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    CertUrlEmpty,
    LicenseUrlMissing,
    InvalidContentIdOrSkd,
    CertDataEmpty,
    LicenseServerError,
    EmptyCkcData,
    NoData,
    Engine,
}

/**
    Terminal outcome of a failed key request.

    Every variant is reported to the key-session engine exactly once.
*/
#[derive(Debug, Error)]
pub enum KeyExchangeError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("certificate URL is empty")]
    CertUrlEmpty,

    #[error("license URL is missing")]
    LicenseUrlMissing,

    #[error("invalid content identifier or SKD locator: {locator:?}")]
    InvalidContentIdOrSkd { locator: String },

    #[error("no certificate data from {url}")]
    CertDataEmpty {
        url: Url,
        #[source]
        source: Option<ClientError>,
    },

    #[error("license server error ({}) for {url}", status_label(.status))]
    LicenseServerError {
        url: Url,
        status: Option<u16>,
        #[source]
        source: ClientError,
    },

    #[error("decoded CKC data is empty")]
    EmptyCkcData,

    /// Raised when the license server answers 2xx with an empty body.
    #[error("license server returned no data")]
    NoData,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl KeyExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::CertUrlEmpty => ErrorKind::CertUrlEmpty,
            Self::LicenseUrlMissing => ErrorKind::LicenseUrlMissing,
            Self::InvalidContentIdOrSkd { .. } => ErrorKind::InvalidContentIdOrSkd,
            Self::CertDataEmpty { .. } => ErrorKind::CertDataEmpty,
            Self::LicenseServerError { .. } => ErrorKind::LicenseServerError,
            Self::EmptyCkcData => ErrorKind::EmptyCkcData,
            Self::NoData => ErrorKind::NoData,
            Self::Engine(_) => ErrorKind::Engine,
        }
    }

    /**
        HTTP status observed when the license server rejected the request,
        if one was observable.
    */
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::LicenseServerError { status, .. } => *status,
            Self::CertDataEmpty {
                source: Some(source),
                ..
            } => source.status(),
            _ => None,
        }
    }
}

/**
    Errors from loading a [`SourceConfig`](crate::SourceConfig) from disk or text.
*/
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML source config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON source config: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!("HTTP {status}"),
        None => String::from("no HTTP status"),
    }
}
