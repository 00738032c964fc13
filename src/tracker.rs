//! Console polling loop for a single station.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::arrivals::{Arrival, ArrivalFilter};
use crate::config::FeedConfig;
use crate::display::{BoardHeader, render_board};
use crate::error::Result;
use crate::feed::{FeedSource, station_arrivals};
use crate::stations::Station;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";

pub struct Tracker {
    source: Arc<dyn FeedSource>,
    config: Arc<FeedConfig>,
    station: &'static Station,
    filter: ArrivalFilter,
    header: BoardHeader,
}

impl Tracker {
    pub fn new(source: Arc<dyn FeedSource>, config: Arc<FeedConfig>, station: &'static Station) -> Self {
        let header = BoardHeader {
            title: format!("MTA TRAIN TRACKER - {} Station ({} train)", station.name, station.lines.join("/")),
            notes: Vec::new(),
        };
        Self { source, config, station, filter: ArrivalFilter::default(), header }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: ArrivalFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.header.notes.push(note.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.header.title = title.into();
        self
    }

    /// Current arrivals, soonest first.
    pub async fn arrivals(&self) -> Result<Vec<Arrival>> {
        station_arrivals(self.source.as_ref(), &self.config, self.station, &self.filter, Utc::now()).await
    }

    /// Fetches once and renders the board.
    pub async fn board(&self) -> Result<String> {
        let arrivals = self.arrivals().await?;
        Ok(render_board(&self.header, &arrivals, Utc::now()))
    }

    /// Redraws the board every `every` until the process is stopped. A failed
    /// poll is logged and retried on the next tick. A zero period falls back
    /// to [`POLL_INTERVAL`].
    pub async fn run(&self, every: Duration) {
        let every = if every.is_zero() { POLL_INTERVAL } else { every };
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.board().await {
                Ok(board) => println!("{CLEAR_SCREEN}{board}"),
                Err(e) => tracing::error!("Update failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::Direction;
    use crate::arrivals::tests::{feed, stop_time, trip};
    use crate::feed::tests::StaticFeeds;
    use crate::stations::station_by_stop_id;

    fn in_minutes(minutes: i64) -> i64 {
        Utc::now().timestamp() + minutes * 60 + 30
    }

    #[tokio::test]
    async fn board_shows_next_train() {
        let station = station_by_stop_id("L10").unwrap();
        let source = StaticFeeds::new(vec![(
            "l",
            feed(vec![trip(
                "t1",
                Some("L"),
                vec![stop_time("L10N", Some(in_minutes(7)), None), stop_time("L10S", Some(in_minutes(3)), None)],
            )]),
        )]);
        let tracker = Tracker::new(Arc::new(source), Arc::new(FeedConfig::embedded().unwrap()), station)
            .with_filter(ArrivalFilter::direction(Direction::North))
            .with_note("Direction: To Manhattan");

        let board = tracker.board().await.unwrap();
        assert!(board.contains("Lorimer St"));
        assert!(board.contains("Direction: To Manhattan"));
        assert!(board.contains("L train to Manhattan"));
        assert!(board.contains("Arriving in: 7 minutes"));
        assert!(!board.contains("Canarsie"));
    }

    #[tokio::test]
    async fn failed_fetch_is_an_error() {
        let station = station_by_stop_id("L10").unwrap();
        let tracker = Tracker::new(
            Arc::new(StaticFeeds::new(vec![])),
            Arc::new(FeedConfig::embedded().unwrap()),
            station,
        );
        assert!(tracker.board().await.is_err());
    }

    #[tokio::test]
    async fn zero_period_does_not_panic() {
        let station = station_by_stop_id("L10").unwrap();
        let source = Arc::new(StaticFeeds::new(vec![]));
        let tracker = Tracker::new(source.clone(), Arc::new(FeedConfig::embedded().unwrap()), station);

        let stopped = tokio::time::timeout(Duration::from_millis(200), tracker.run(Duration::ZERO)).await;
        assert!(stopped.is_err());
        // first tick fires immediately, the next one is 30 s away
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }
}
