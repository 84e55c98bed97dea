use crate::error::ErrorKind;

/**
    Where a single key request currently is in the license-acquisition flow.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyExchangeState {
    #[default]
    Idle,
    ValidatingConfig,
    FetchingCertificate,
    AwaitingRequestPayload,
    ExchangingLicense,
    DecodingResponse,
    /// The key response was handed to the engine.
    Delivered,
    /// The engine was told the request failed.
    Failed(ErrorKind),
    /// The request or the coordinator went away before it could be resolved.
    Abandoned,
}

impl KeyExchangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed(_) | Self::Abandoned)
    }
}
