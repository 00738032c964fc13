//! Extracts upcoming arrivals for one station from a decoded GTFS Realtime feed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gtfs_realtime::FeedMessage;
use gtfs_realtime::trip_update::StopTimeUpdate;
use serde::Serialize;

use crate::stations::Station;

/// Arrivals kept per direction by the API and the boards.
pub const DISPLAY_COUNT: usize = 6;

/// Platform direction, taken from the `N`/`S` suffix of a GTFS stop ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    North,
    South,
}

impl Direction {
    /// `N` means north. Anything else, including a missing suffix, is south.
    pub fn from_stop_id(stop_id: &str) -> Self {
        if stop_id.ends_with('N') { Self::North } else { Self::South }
    }

    pub const fn suffix(self) -> char {
        match self {
            Self::North => 'N',
            Self::South => 'S',
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NORTH" | "NORTHBOUND" | "UPTOWN" => Some(Self::North),
            "S" | "SOUTH" | "SOUTHBOUND" | "DOWNTOWN" => Some(Self::South),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    pub line: String,
    pub station: String,
    /// Human label of the direction, e.g. "Manhattan".
    pub direction: String,
    #[serde(skip)]
    pub bound: Direction,
    pub minutes_away: i64,
    pub arrival_time: DateTime<Utc>,
}

/// Narrows which stop-time updates count for a station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrivalFilter {
    /// Only this platform.
    pub direction: Option<Direction>,
    /// Only trips on this line. Trips without a route ID are kept.
    pub line: Option<String>,
}

impl ArrivalFilter {
    pub fn direction(direction: Direction) -> Self {
        Self { direction: Some(direction), ..Self::default() }
    }

    #[must_use]
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }
}

/// Epoch seconds of the arrival, or of the departure when the arrival is
/// missing or zero.
fn event_time(update: &StopTimeUpdate) -> Option<i64> {
    let arrival = update.arrival.as_ref().and_then(|e| e.time).filter(|t| *t != 0);
    arrival.or_else(|| update.departure.as_ref().and_then(|e| e.time).filter(|t| *t != 0))
}

/// Collects future arrivals at `station`. The result is unordered; see
/// [`sort_arrivals`].
pub fn extract_arrivals(
    feed: &FeedMessage, station: &Station, filter: &ArrivalFilter, now: DateTime<Utc>,
) -> Vec<Arrival> {
    let mut prefix = station.stop_id.to_string();
    if let Some(direction) = filter.direction {
        prefix.push(direction.suffix());
    }

    let mut arrivals = Vec::new();
    for entity in &feed.entity {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };
        let route = trip_update.trip.route_id.as_deref().filter(|r| !r.is_empty());
        if let (Some(wanted), Some(route)) = (filter.line.as_deref(), route) {
            if !wanted.eq_ignore_ascii_case(route) {
                continue;
            }
        }

        for update in &trip_update.stop_time_update {
            let Some(stop_id) = update.stop_id.as_deref() else {
                continue;
            };
            if !stop_id.starts_with(&prefix) {
                continue;
            }
            let Some(timestamp) = event_time(update) else {
                continue;
            };
            let Some(arrival_time) = DateTime::from_timestamp(timestamp, 0) else {
                tracing::debug!("skipping out of range timestamp {timestamp} for {stop_id}");
                continue;
            };
            if arrival_time <= now {
                continue;
            }

            let bound = Direction::from_stop_id(stop_id);
            let line = route
                .map(ToString::to_string)
                .or_else(|| filter.line.as_deref().map(str::to_uppercase))
                .unwrap_or_else(|| station.primary_line().to_string());
            arrivals.push(Arrival {
                line,
                station: station.name.to_string(),
                direction: station.direction_label(bound).to_string(),
                bound,
                minutes_away: (arrival_time - now).num_seconds() / 60,
                arrival_time,
            });
        }
    }
    arrivals
}

/// Soonest first.
pub fn sort_arrivals(arrivals: &mut [Arrival]) {
    arrivals.sort_by_key(|a| (a.minutes_away, a.arrival_time));
}

pub fn next_arrival(arrivals: &[Arrival]) -> Option<&Arrival> {
    arrivals.iter().min_by_key(|a| (a.minutes_away, a.arrival_time))
}

/// Sorted arrivals keyed by direction label, [`DISPLAY_COUNT`] per direction.
pub fn group_by_direction(arrivals: Vec<Arrival>) -> BTreeMap<String, Vec<Arrival>> {
    let mut grouped: BTreeMap<String, Vec<Arrival>> = BTreeMap::new();
    for arrival in arrivals {
        grouped.entry(arrival.direction.clone()).or_default().push(arrival);
    }
    for list in grouped.values_mut() {
        sort_arrivals(list);
        list.truncate(DISPLAY_COUNT);
    }
    grouped
}
