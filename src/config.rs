//! Line to feed endpoint mapping for the NYC subway GTFS Realtime feeds.
//!
//! The mapping is a YAML document with four sections: `metadata`, `feeds`
//! (one entry per feed group), `line_to_feed` and `line_colors`. A default
//! copy is compiled in; [`FeedConfig::load`] reads an override from disk.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_FEEDS: &str = include_str!("../config/mta-feeds.yaml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub base_url: String,
    pub api_version: String,
    pub update_frequency_seconds: u64,
    pub api_key_header: String,
    #[serde(default)]
    pub api_key_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedGroup {
    pub name: String,
    pub endpoint: String,
    pub full_url: String,
    pub division: String,
    pub lines: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Resolved URL plus the headers a fetch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub metadata: Metadata,
    pub feeds: BTreeMap<String, FeedGroup>,
    pub line_to_feed: BTreeMap<String, String>,
    #[serde(default)]
    pub line_colors: BTreeMap<String, String>,
}

fn normalize(line: &str) -> String {
    line.trim().to_uppercase()
}

impl FeedConfig {
    /// The compiled-in feed map.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(DEFAULT_FEEDS)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&contents)
    }

    /// Loads `path` when given, the embedded map otherwise.
    pub fn load_or_embedded(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!("loading feed configuration from {}", path.display());
                Self::load(path)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.line_to_feed =
            config.line_to_feed.into_iter().map(|(line, group)| (normalize(&line), group)).collect();
        config.line_colors =
            config.line_colors.into_iter().map(|(line, color)| (normalize(&line), color)).collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (line, group) in &self.line_to_feed {
            if !self.feeds.contains_key(group) {
                return Err(Error::Config(format!(
                    "line {line} maps to unknown feed group {group}"
                )));
            }
        }
        for (name, group) in &self.feeds {
            if group.full_url.trim().is_empty() {
                return Err(Error::Config(format!("feed group {name} has no endpoint")));
            }
        }
        Ok(())
    }

    /// Full endpoint URL for a train line such as `L`, `a`, `6` or `SIR`.
    pub fn endpoint_for_line(&self, line: &str) -> Result<&str> {
        let group = self
            .feed_group_for_line(line)
            .ok_or_else(|| Error::UnknownLine(line.to_string()))?;
        self.feeds
            .get(group)
            .map(|feed| feed.full_url.as_str())
            .ok_or_else(|| Error::UnknownFeedGroup(group.to_string()))
    }

    pub fn feed_group_for_line(&self, line: &str) -> Option<&str> {
        self.line_to_feed.get(&normalize(line)).map(String::as_str)
    }

    pub fn is_valid_line(&self, line: &str) -> bool {
        self.line_to_feed.contains_key(&normalize(line))
    }

    pub fn all_lines(&self) -> Vec<&str> {
        self.line_to_feed.keys().map(String::as_str).collect()
    }

    pub fn all_feed_groups(&self) -> Vec<&str> {
        self.feeds.keys().map(String::as_str).collect()
    }

    pub fn feed_info(&self, group: &str) -> Result<&FeedGroup> {
        self.feeds.get(group).ok_or_else(|| Error::UnknownFeedGroup(group.to_string()))
    }

    pub fn lines_in_feed(&self, group: &str) -> Result<&[String]> {
        self.feed_info(group).map(|feed| feed.lines.as_slice())
    }

    pub fn lines_by_feed(&self) -> BTreeMap<&str, &[String]> {
        self.feeds.iter().map(|(name, feed)| (name.as_str(), feed.lines.as_slice())).collect()
    }

    /// Official MTA colour, as a hex string.
    pub fn line_color(&self, line: &str) -> Option<&str> {
        self.line_colors.get(&normalize(line)).map(String::as_str)
    }

    pub fn lines_by_color(&self, color: &str) -> Vec<&str> {
        self.line_colors
            .iter()
            .filter(|(_, c)| c.eq_ignore_ascii_case(color))
            .map(|(line, _)| line.as_str())
            .collect()
    }

    pub fn base_url(&self) -> &str {
        &self.metadata.base_url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Endpoint plus the API key header, which is only set for a non-empty key.
    pub fn endpoint_config(&self, line: &str, api_key: Option<&str>) -> Result<EndpointConfig> {
        let url = self.endpoint_for_line(line)?.to_string();
        let headers = api_key
            .filter(|key| !key.is_empty())
            .map(|key| vec![(self.metadata.api_key_header.clone(), key.to_string())])
            .unwrap_or_default();
        Ok(EndpointConfig { url, headers })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config() -> FeedConfig {
        FeedConfig::embedded().unwrap()
    }

    #[test]
    fn endpoint_for_known_lines() {
        let config = config();
        assert_eq!(
            config.endpoint_for_line("L").unwrap(),
            "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-l"
        );
        assert_eq!(
            config.endpoint_for_line("6").unwrap(),
            "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs"
        );
        assert_eq!(
            config.endpoint_for_line("SIR").unwrap(),
            "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-si"
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let config = config();
        assert_eq!(config.endpoint_for_line("g").unwrap(), config.endpoint_for_line("G").unwrap());
        assert_eq!(config.feed_group_for_line("sir"), Some("si"));
        assert!(config.is_valid_line(" a "));
    }

    #[test]
    fn unknown_line_is_an_error() {
        let config = config();
        for line in ["X", "Z9", "99", ""] {
            let err = config.endpoint_for_line(line).unwrap_err();
            assert!(matches!(err, Error::UnknownLine(_)), "{line} resolved to a URL");
            assert!(!config.is_valid_line(line));
        }
        assert_eq!(config.feed_group_for_line("X"), None);
    }

    #[test]
    fn every_line_resolves() {
        let config = config();
        for line in config.all_lines() {
            assert!(config.endpoint_for_line(line).is_ok(), "{line} does not resolve");
        }
    }

    #[test]
    fn feed_groups_list_their_lines() {
        let config = config();
        assert_eq!(config.lines_in_feed("l").unwrap(), ["L".to_string()]);
        assert_eq!(config.lines_in_feed("jz").unwrap(), ["J".to_string(), "Z".to_string()]);
        assert!(matches!(config.lines_in_feed("xyz"), Err(Error::UnknownFeedGroup(_))));
        assert_eq!(config.lines_by_feed().len(), config.all_feed_groups().len());
    }

    #[test]
    fn feed_info() {
        let info = config().feed_info("l").unwrap().clone();
        assert_eq!(info.endpoint, "nyct%2Fgtfs-l");
        assert_eq!(info.division, "B");
    }

    #[test]
    fn colors() {
        let config = config();
        assert_eq!(config.line_color("l"), Some("#A7A9AC"));
        assert_eq!(config.line_color("X"), None);
        assert_eq!(config.lines_by_color("#ee352e"), vec!["1", "2", "3"]);
    }

    #[test]
    fn endpoint_config_only_sends_key_when_present() {
        let config = config();
        let with_key = config.endpoint_config("L", Some("test-api-key-123")).unwrap();
        assert_eq!(
            with_key.headers,
            vec![("x-api-key".to_string(), "test-api-key-123".to_string())]
        );
        assert!(config.endpoint_config("L", None).unwrap().headers.is_empty());
        assert!(config.endpoint_config("L", Some("")).unwrap().headers.is_empty());
    }

    #[test]
    fn metadata() {
        let config = config();
        assert_eq!(config.base_url(), "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds");
        assert_eq!(config.metadata().update_frequency_seconds, 30);
    }

    #[test]
    fn dangling_feed_group_is_rejected() {
        let yaml = r#"
metadata:
  base_url: "https://example.test"
  api_version: "1"
  update_frequency_seconds: 30
  api_key_header: "x-api-key"
feeds:
  l:
    name: "L"
    endpoint: "l"
    full_url: "https://example.test/l"
    division: "B"
    lines: ["L"]
line_to_feed:
  L: l
  G: g
"#;
        let err = FeedConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn lowercase_keys_are_normalized() {
        let yaml = r#"
metadata:
  base_url: "https://example.test"
  api_version: "1"
  update_frequency_seconds: 30
  api_key_header: "x-api-key"
feeds:
  l:
    name: "L"
    endpoint: "l"
    full_url: "https://example.test/l"
    division: "B"
    lines: ["L"]
line_to_feed:
  l: l
"#;
        let config = FeedConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.endpoint_for_line("L").unwrap(), "https://example.test/l");
    }
}
