//! Fetching and decoding the MTA GTFS Realtime feeds.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gtfs_realtime::FeedMessage;
use prost::Message;
use reqwest::Client;

use crate::arrivals::{Arrival, ArrivalFilter, extract_arrivals};
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::stations::Station;

/// Anything that can hand back the current feed for a subway line.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_line(&self, line: &str) -> Result<FeedMessage>;
}

/// Decodes a protobuf `FeedMessage`.
pub fn decode_feed(bytes: &[u8]) -> Result<FeedMessage> {
    FeedMessage::decode(bytes).map_err(Error::from)
}

/// Fetches feeds over HTTP from the endpoints in a [`FeedConfig`].
pub struct HttpFeedSource {
    client: Client,
    config: Arc<FeedConfig>,
    api_key: Option<String>,
}

impl HttpFeedSource {
    pub fn new(config: Arc<FeedConfig>, api_key: Option<String>) -> Self {
        Self { client: Client::new(), config, api_key }
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_line(&self, line: &str) -> Result<FeedMessage> {
        let endpoint = self.config.endpoint_config(line, self.api_key.as_deref())?;
        tracing::debug!("fetching {line} feed from {}", endpoint.url);

        let mut request = self.client.get(&endpoint.url);
        for (name, value) in &endpoint.headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!("HTTP error! status: {}", response.status())));
        }

        let bytes = response.bytes().await?;
        let feed = decode_feed(&bytes)?;
        tracing::debug!("{line} feed: {} bytes, {} entities", bytes.len(), feed.entity.len());
        Ok(feed)
    }
}

/// Arrivals at `station` across every feed that serves it, soonest first.
///
/// Lines sharing a feed group are fetched once. A feed that fails is logged
/// and skipped; the call only fails when every feed did.
pub async fn station_arrivals(
    source: &dyn FeedSource, config: &FeedConfig, station: &Station, filter: &ArrivalFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Arrival>> {
    let mut groups = BTreeSet::new();
    let mut lines = Vec::new();
    for &line in station.lines {
        if filter.line.as_deref().is_some_and(|wanted| !wanted.eq_ignore_ascii_case(line)) {
            continue;
        }
        match config.feed_group_for_line(line) {
            Some(group) if groups.insert(group) => lines.push(line),
            Some(_) => {}
            None => tracing::warn!("{} lists unknown line {line}", station.name),
        }
    }
    if lines.is_empty() {
        let line = filter.line.as_deref().unwrap_or_else(|| station.primary_line());
        return Err(Error::UnknownLine(line.to_string()));
    }

    let mut arrivals = Vec::new();
    let mut last_error = None;
    let mut fetched = 0;
    for line in lines {
        match source.fetch_line(line).await {
            Ok(feed) => {
                fetched += 1;
                arrivals.extend(extract_arrivals(&feed, station, filter, now));
            }
            Err(e) => {
                tracing::warn!("skipping {line} feed for {}: {e}", station.name);
                last_error = Some(e);
            }
        }
    }
    if fetched == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    crate::arrivals::sort_arrivals(&mut arrivals);
    Ok(arrivals)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::arrivals::tests::{feed, now, stop_time, trip};
    use crate::stations::station_by_stop_id;

    /// Serves canned feeds keyed by feed group and records what was asked for.
    pub(crate) struct StaticFeeds {
        config: FeedConfig,
        feeds: HashMap<String, FeedMessage>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl StaticFeeds {
        pub(crate) fn new(feeds: Vec<(&str, FeedMessage)>) -> Self {
            Self {
                config: FeedConfig::embedded().unwrap(),
                feeds: feeds.into_iter().map(|(g, f)| (g.to_string(), f)).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FeedSource for StaticFeeds {
        async fn fetch_line(&self, line: &str) -> Result<FeedMessage> {
            self.requests.lock().unwrap().push(line.to_string());
            let group = self
                .config
                .feed_group_for_line(line)
                .ok_or_else(|| Error::UnknownLine(line.to_string()))?;
            self.feeds
                .get(group)
                .cloned()
                .ok_or_else(|| Error::Upstream(format!("HTTP error! status: 503 ({group})")))
        }
    }

    fn at(seconds: i64) -> i64 {
        now().timestamp() + seconds
    }

    #[test]
    fn decode_round_trip() {
        let original = feed(vec![trip("t1", Some("L"), vec![stop_time("L11N", Some(at(60)), None)])]);
        let decoded = decode_feed(&original.encode_to_vec()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_feed(&[0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn shared_feed_group_is_fetched_once() {
        let marcy = station_by_stop_id("M16").unwrap();
        let source = StaticFeeds::new(vec![
            ("jz", feed(vec![trip("j", Some("J"), vec![stop_time("M16S", Some(at(300)), None)])])),
            ("bdfm", feed(vec![trip("m", Some("M"), vec![stop_time("M16S", Some(at(120)), None)])])),
        ]);
        let config = FeedConfig::embedded().unwrap();

        let arrivals =
            station_arrivals(&source, &config, marcy, &ArrivalFilter::default(), now()).await.unwrap();
        let lines: Vec<_> = arrivals.iter().map(|a| a.line.as_str()).collect();
        assert_eq!(lines, vec!["M", "J"]);
        assert_eq!(*source.requests.lock().unwrap(), vec!["J".to_string(), "M".to_string()]);
    }

    #[tokio::test]
    async fn failing_feed_is_skipped() {
        let marcy = station_by_stop_id("M16").unwrap();
        let source = StaticFeeds::new(vec![(
            "bdfm",
            feed(vec![trip("m", Some("M"), vec![stop_time("M16N", Some(at(120)), None)])]),
        )]);
        let config = FeedConfig::embedded().unwrap();

        let arrivals =
            station_arrivals(&source, &config, marcy, &ArrivalFilter::default(), now()).await.unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].direction, "Queens");
    }

    #[tokio::test]
    async fn all_feeds_failing_is_an_error() {
        let graham = station_by_stop_id("L11").unwrap();
        let source = StaticFeeds::new(vec![]);
        let config = FeedConfig::embedded().unwrap();

        let err = station_arrivals(&source, &config, graham, &ArrivalFilter::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    /// Serves `body` at `/l` and a 503 at `/down`, recording the API key
    /// header of every `/l` request. Returns the config pointed at it.
    async fn local_feeds(body: Vec<u8>) -> (Arc<FeedConfig>, Arc<Mutex<Vec<Option<String>>>>) {
        use axum::Router;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::get;

        let keys = Arc::new(Mutex::new(Vec::new()));
        let seen = keys.clone();
        let app = Router::new()
            .route(
                "/l",
                get(move |headers: HeaderMap| {
                    let seen = seen.clone();
                    let body = body.clone();
                    async move {
                        let key = headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string);
                        seen.lock().unwrap().push(key);
                        body
                    }
                }),
            )
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut config = FeedConfig::embedded().unwrap();
        config.feeds.get_mut("l").unwrap().full_url = format!("http://{addr}/l");
        config.feeds.get_mut("g").unwrap().full_url = format!("http://{addr}/down");
        (Arc::new(config), keys)
    }

    #[tokio::test]
    async fn http_source_decodes_the_response_body() {
        let sent = feed(vec![trip("t1", Some("L"), vec![stop_time("L11N", Some(at(60)), None)])]);
        let (config, _) = local_feeds(sent.encode_to_vec()).await;

        let received = HttpFeedSource::new(config, None).fetch_line("l").await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn http_source_sends_the_key_only_when_set() {
        let (config, keys) = local_feeds(feed(vec![]).encode_to_vec()).await;

        HttpFeedSource::new(config.clone(), None).fetch_line("L").await.unwrap();
        HttpFeedSource::new(config.clone(), Some(String::new())).fetch_line("L").await.unwrap();
        HttpFeedSource::new(config, Some("secret".to_string())).fetch_line("L").await.unwrap();
        assert_eq!(*keys.lock().unwrap(), vec![None, None, Some("secret".to_string())]);
    }

    #[tokio::test]
    async fn http_source_rejects_error_status() {
        let (config, _) = local_feeds(Vec::new()).await;

        let err = HttpFeedSource::new(config, None).fetch_line("G").await.unwrap_err();
        match err {
            Error::Upstream(message) => assert!(message.contains("503"), "{message}"),
            other => panic!("expected an upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_source_rejects_a_body_that_is_not_a_feed() {
        let (config, _) = local_feeds(vec![0xff, 0xff, 0xff, 0x01]).await;

        let err = HttpFeedSource::new(config, None).fetch_line("L").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn line_filter_limits_fetches() {
        let station = station_by_stop_id("D15").unwrap();
        let source = StaticFeeds::new(vec![(
            "bdfm",
            feed(vec![trip("f", Some("F"), vec![stop_time("D15S", Some(at(120)), None)])]),
        )]);
        let config = FeedConfig::embedded().unwrap();
        let filter = ArrivalFilter::default().with_line("F");

        let arrivals = station_arrivals(&source, &config, station, &filter, now()).await.unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(*source.requests.lock().unwrap(), vec!["F".to_string()]);

        let filter = ArrivalFilter::default().with_line("L");
        let err = station_arrivals(&source, &config, station, &filter, now()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownLine(_)));
    }
}
