use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, KeyExchangeError};

/**
    Query parameter the content identifier is sent under by default.
*/
pub const DEFAULT_CONTENT_ID_QUERY: &str = "key_id";

fn default_content_id_query() -> Option<String> {
    Some(String::from(DEFAULT_CONTENT_ID_QUERY))
}

/**
    Endpoints and custom headers for one playback session.

    Built once by the caller and then shared read-only with the
    coordinator for the lifetime of the session. Empty endpoint
    strings are treated the same as absent ones.

    ```yaml
    source_url: https://cdn.example.com/master.m3u8
    license_url: https://license.example.com/fps
    certificate_url: https://license.example.com/fps/cert
    headers:
      X-Custom-Token: abc
    content_id_query: key_id
    ```
*/
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    source_url: String,
    #[serde(default)]
    license_url: Option<String>,
    #[serde(default)]
    certificate_url: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default = "default_content_id_query")]
    content_id_query: Option<String>,
}

impl SourceConfig {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            license_url: None,
            certificate_url: None,
            headers: BTreeMap::new(),
            content_id_query: default_content_id_query(),
        }
    }

    pub fn with_license_url(mut self, url: impl Into<String>) -> Self {
        self.license_url = Some(url.into());
        self
    }

    pub fn with_certificate_url(mut self, url: impl Into<String>) -> Self {
        self.certificate_url = Some(url.into());
        self
    }

    /**
        Add a header sent with license requests. A later header with the
        same name replaces an earlier one.
    */
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /**
        Set the query parameter name the content identifier is appended under.
    */
    pub fn with_content_id_query(mut self, name: impl Into<String>) -> Self {
        self.content_id_query = Some(name.into());
        self
    }

    /**
        Send license requests to the license URL exactly as configured.
    */
    pub fn without_content_id_query(mut self) -> Self {
        self.content_id_query = None;
        self
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn license_url(&self) -> Option<&str> {
        non_empty(self.license_url.as_deref())
    }

    pub fn certificate_url(&self) -> Option<&str> {
        non_empty(self.certificate_url.as_deref())
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn content_id_query(&self) -> Option<&str> {
        non_empty(self.content_id_query.as_deref())
    }

    pub fn parsed_source_url(&self) -> Result<Url, KeyExchangeError> {
        Url::parse(&self.source_url).map_err(|source| KeyExchangeError::InvalidUrl {
            url: self.source_url.clone(),
            source,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /**
        Load a config file. Files ending in `.json` are read as JSON,
        anything else as YAML.
    */
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = SourceConfig::new("https://cdn.example.com/master.m3u8")
            .with_license_url("https://license.example.com/fps")
            .with_certificate_url("https://license.example.com/cert")
            .with_header("X-Token", "one");

        assert_eq!(config.source_url(), "https://cdn.example.com/master.m3u8");
        assert_eq!(
            config.license_url(),
            Some("https://license.example.com/fps")
        );
        assert_eq!(
            config.certificate_url(),
            Some("https://license.example.com/cert")
        );
        assert_eq!(config.headers()["X-Token"], "one");
        assert_eq!(config.content_id_query(), Some(DEFAULT_CONTENT_ID_QUERY));
    }

    #[test]
    fn later_header_wins() {
        let config = SourceConfig::new("https://cdn.example.com/a.m3u8")
            .with_header("X-Token", "one")
            .with_header("X-Token", "two");

        assert_eq!(config.headers().len(), 1);
        assert_eq!(config.headers()["X-Token"], "two");
    }

    #[test]
    fn empty_endpoints_are_absent() {
        let config = SourceConfig::new("https://cdn.example.com/a.m3u8")
            .with_license_url("")
            .with_certificate_url("   ");

        assert_eq!(config.license_url(), None);
        assert_eq!(config.certificate_url(), None);
    }

    #[test]
    fn yaml_defaults() {
        let config = SourceConfig::from_yaml_str("source_url: https://cdn.example.com/a.m3u8\n")
            .unwrap();

        assert_eq!(config.license_url(), None);
        assert_eq!(config.certificate_url(), None);
        assert!(config.headers().is_empty());
        assert_eq!(config.content_id_query(), Some("key_id"));
    }

    #[test]
    fn yaml_null_disables_content_id_query() {
        let yaml = "source_url: https://cdn.example.com/a.m3u8\ncontent_id_query: null\n";
        let config = SourceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.content_id_query(), None);
    }

    #[test]
    fn json_full() {
        let json = r#"{
            "source_url": "https://cdn.example.com/a.m3u8",
            "license_url": "https://license.example.com/fps",
            "certificate_url": "https://license.example.com/cert",
            "headers": { "Authorization": "Bearer abc" },
            "content_id_query": "assetId"
        }"#;
        let config = SourceConfig::from_json_str(json).unwrap();

        assert_eq!(config.headers()["Authorization"], "Bearer abc");
        assert_eq!(config.content_id_query(), Some("assetId"));
    }

    #[test]
    fn missing_source_url_is_rejected() {
        let yaml = "license_url: https://x.example.com\n";
        let err = SourceConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("source.json");
        let json = r#"{"source_url": "https://cdn.example.com/a.m3u8"}"#;
        std::fs::write(&json_path, json).unwrap();
        let config = SourceConfig::load(&json_path).unwrap();
        assert_eq!(config.source_url(), "https://cdn.example.com/a.m3u8");

        let yaml_path = dir.path().join("source.yaml");
        let yaml = "source_url: https://cdn.example.com/b.m3u8\n";
        std::fs::write(&yaml_path, yaml).unwrap();
        let config = SourceConfig::load(&yaml_path).unwrap();
        assert_eq!(config.source_url(), "https://cdn.example.com/b.m3u8");

        let missing_path = dir.path().join("nope.yaml");
        let missing = SourceConfig::load(&missing_path).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn parsed_source_url() {
        let good = SourceConfig::new("https://cdn.example.com/a.m3u8");
        let url = good.parsed_source_url().unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));

        let bad = SourceConfig::new("not a url");
        let err = bad.parsed_source_url().unwrap_err();
        assert!(matches!(err, KeyExchangeError::InvalidUrl { .. }));
    }
}
