use url::Url;

use crate::error::KeyExchangeError;

/**
    Scheme prefix of FairPlay key locators as issued by the key-session engine.
*/
pub const SKD_SCHEME_PREFIX: &str = "skd://";

/**
    Per-request view of an incoming key request.

    Created when the engine hands over a locator and dropped once the
    request has been resolved or rejected.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequestContext {
    content_identifier: String,
    raw_locator: String,
}

impl KeyRequestContext {
    /**
        Extract the content identifier from an `skd://` locator.

        The locator must carry the scheme prefix and something after it.
    */
    pub fn from_locator(locator: &str) -> Result<Self, KeyExchangeError> {
        let content_identifier = locator
            .strip_prefix(SKD_SCHEME_PREFIX)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| KeyExchangeError::InvalidContentIdOrSkd {
                locator: locator.to_string(),
            })?;

        Ok(Self {
            content_identifier: content_identifier.to_string(),
            raw_locator: locator.to_string(),
        })
    }

    pub fn content_identifier(&self) -> &str {
        &self.content_identifier
    }

    /**
        Content identifier as handed to the engine when synthesizing the request payload.
    */
    pub fn content_identifier_bytes(&self) -> &[u8] {
        self.content_identifier.as_bytes()
    }

    pub fn raw_locator(&self) -> &str {
        &self.raw_locator
    }

    /**
        License URL for this request.

        With a parameter name, the content identifier is appended after any
        query items already present on `license_url`. Without one the URL
        is returned as-is.
    */
    pub fn license_url(&self, license_url: &Url, query_param: Option<&str>) -> Url {
        let mut url = license_url.clone();
        if let Some(name) = query_param {
            url.query_pairs_mut()
                .append_pair(name, &self.content_identifier);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn strips_scheme_prefix() {
        let ctx = KeyRequestContext::from_locator("skd://abc123").unwrap();
        assert_eq!(ctx.content_identifier(), "abc123");
        assert_eq!(ctx.content_identifier_bytes(), b"abc123");
        assert_eq!(ctx.raw_locator(), "skd://abc123");
    }

    #[test]
    fn keeps_rest_of_locator_verbatim() {
        let ctx = KeyRequestContext::from_locator("skd://host/asset?id=7").unwrap();
        assert_eq!(ctx.content_identifier(), "host/asset?id=7");
    }

    #[test]
    fn rejects_bad_locators() {
        for locator in ["", "skd://", "https://abc123", "abc123", "SKD://abc123"] {
            let err = KeyRequestContext::from_locator(locator).unwrap_err();
            match err {
                KeyExchangeError::InvalidContentIdOrSkd { locator: got } => {
                    assert_eq!(got, locator)
                }
                other => panic!("unexpected error for {locator:?}: {other}"),
            }
        }
    }

    #[test]
    fn appends_after_existing_query() {
        let ctx = KeyRequestContext::from_locator("skd://abc123").unwrap();
        let base = url("https://license.example.com/fps?token=t0k&region=eu");

        let url = ctx.license_url(&base, Some("key_id"));
        assert_eq!(
            url.as_str(),
            "https://license.example.com/fps?token=t0k&region=eu&key_id=abc123"
        );
    }

    #[test]
    fn appends_to_bare_url() {
        let ctx = KeyRequestContext::from_locator("skd://abc 123").unwrap();
        let base = url("https://license.example.com/fps");

        let url = ctx.license_url(&base, Some("key_id"));
        assert_eq!(
            url.as_str(),
            "https://license.example.com/fps?key_id=abc+123"
        );
    }

    #[test]
    fn leaves_url_alone_without_param() {
        let ctx = KeyRequestContext::from_locator("skd://abc123").unwrap();
        let base = url("https://license.example.com/fps?token=t0k");
        assert_eq!(ctx.license_url(&base, None), base);
    }
}
