//! Next-train arrivals for NYC subway stations, read from the MTA GTFS
//! Realtime feeds, plus a small client for the finance and health dashboard
//! backend.

pub mod arrivals;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod feed;
pub mod server;
pub mod stations;
pub mod tracker;

pub use arrivals::{Arrival, ArrivalFilter, Direction, extract_arrivals};
pub use config::FeedConfig;
pub use dashboard::DashboardClient;
pub use error::{Error, Result};
pub use feed::{FeedSource, HttpFeedSource, decode_feed, station_arrivals};
pub use stations::{Coordinates, Station, find_closest_station, find_nearby_stations, haversine_miles};
