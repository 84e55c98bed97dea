/*!
    Client-side FairPlay Streaming license acquisition.

    For every key request the platform key-session engine issues, the
    [`KeyExchangeCoordinator`] fetches the application certificate, has the
    engine build the request payload (SPC), exchanges it with the license
    server, normalizes the response into a raw key response (CKC) and hands
    that back to the engine, or tells the engine why it failed.
*/

mod client;
mod config;
mod coordinator;
mod engine;
mod error;
mod locator;
mod state;
mod transport;

pub mod decoder;

pub use self::client::{ClientError, LicenseClient, OCTET_STREAM};
pub use self::config::{DEFAULT_CONTENT_ID_QUERY, SourceConfig};
pub use self::coordinator::{KeyExchangeCoordinator, KeyExchangeTask};
pub use self::engine::{EngineError, KeyRequest};
pub use self::error::{ConfigError, ErrorKind, KeyExchangeError};
pub use self::locator::{KeyRequestContext, SKD_SCHEME_PREFIX};
pub use self::state::KeyExchangeState;
pub use self::transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError, TransportOptions,
};
