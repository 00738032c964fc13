//! HTTP front end: a status page for one station plus a small JSON API.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::arrivals::{Arrival, ArrivalFilter, group_by_direction};
use crate::config::FeedConfig;
use crate::display::render_html;
use crate::error::{Error, Result};
use crate::feed::{FeedSource, station_arrivals};
use crate::stations::{
    Coordinates, DEFAULT_NEARBY_RADIUS_MILES, MAX_NEARBY_STATIONS, STATIONS, Station,
    find_closest_station, nearby_or_closest, station_by_stop_id,
};

/// Largest search radius accepted by `/api/nearby`, in miles.
const MAX_RADIUS_MILES: f64 = 5.0;

static STOP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{2,4}[NSns]?$").expect("valid stop id pattern"));

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FeedConfig>,
    pub source: Arc<dyn FeedSource>,
    /// Station shown by `/` and `/api`.
    pub station: &'static Station,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api", get(default_station))
        .route("/api/nearest", get(nearest))
        .route("/api/nearby", get(nearby))
        .route("/api/station", get(station))
        .route("/api/stations", get(stations))
        .fallback(not_found)
        .with_state(state)
}

/// Binds `port` on all interfaces and serves until ctrl-c.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("MTA Train Time web server running at http://localhost:{port}");
    tracing::info!("monitoring {} ({})", state.station.name, state.station.lines.join(", "));
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultStationReply {
    pub station: &'static str,
    pub line: &'static str,
    pub arrivals: Vec<Arrival>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationReport {
    pub station: &'static str,
    pub stop_id: &'static str,
    pub lines: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub arrivals: BTreeMap<String, Vec<Arrival>>,
}

#[derive(Debug, Serialize)]
pub struct NearbyReply {
    pub stations: Vec<StationReport>,
}

#[derive(Debug, Serialize)]
pub struct StationsReply {
    pub stations: &'static [Station],
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    lat: Option<String>,
    lon: Option<String>,
    radius: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StationQuery {
    #[serde(rename = "stopId")]
    stop_id: Option<String>,
}

fn required_f64(name: &str, value: Option<&str>) -> Result<f64> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::BadRequest(format!("missing query parameter: {name}")))?;
    value.parse().map_err(|_| Error::BadRequest(format!("{name} is not a number: {value}")))
}

impl LocationQuery {
    fn coordinates(&self) -> Result<Coordinates> {
        let lat = required_f64("lat", self.lat.as_deref())?;
        let lon = required_f64("lon", self.lon.as_deref())?;
        Coordinates::new(lat, lon)
    }

    fn radius(&self) -> Result<f64> {
        let Some(radius) = self.radius.as_deref() else {
            return Ok(DEFAULT_NEARBY_RADIUS_MILES);
        };
        let radius = required_f64("radius", Some(radius))?;
        if !(radius > 0.0 && radius <= MAX_RADIUS_MILES) {
            return Err(Error::BadRequest(format!(
                "radius must be in (0, {MAX_RADIUS_MILES}] miles"
            )));
        }
        Ok(radius)
    }
}

fn round_miles(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

async fn report(
    state: &AppState, station: &'static Station, distance: Option<f64>, now: DateTime<Utc>,
) -> Result<StationReport> {
    let arrivals =
        station_arrivals(state.source.as_ref(), &state.config, station, &ArrivalFilter::default(), now)
            .await?;
    Ok(StationReport {
        station: station.name,
        stop_id: station.stop_id,
        lines: station.lines,
        distance: distance.map(round_miles),
        arrivals: group_by_direction(arrivals),
    })
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let now = Utc::now();
    let arrivals = station_arrivals(
        state.source.as_ref(),
        &state.config,
        state.station,
        &ArrivalFilter::default(),
        now,
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Error fetching train data: {e}");
        Vec::new()
    });
    Html(render_html(state.station, &arrivals, now))
}

async fn default_station(State(state): State<AppState>) -> Json<DefaultStationReply> {
    let now = Utc::now();
    let arrivals = station_arrivals(
        state.source.as_ref(),
        &state.config,
        state.station,
        &ArrivalFilter::default(),
        now,
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Error fetching train data: {e}");
        Vec::new()
    });
    Json(DefaultStationReply {
        station: state.station.name,
        line: state.station.primary_line(),
        arrivals,
        timestamp: now,
    })
}

async fn nearest(
    State(state): State<AppState>, Query(query): Query<LocationQuery>,
) -> Result<Json<StationReport>> {
    let point = query.coordinates()?;
    let closest = find_closest_station(point)
        .ok_or_else(|| Error::NotFound("no stations configured".to_string()))?;
    tracing::debug!("nearest to {point:?} is {} ({:.2} mi)", closest.station.name, closest.distance);
    report(&state, closest.station, Some(closest.distance), Utc::now()).await.map(Json)
}

async fn nearby(
    State(state): State<AppState>, Query(query): Query<LocationQuery>,
) -> Result<Json<NearbyReply>> {
    let point = query.coordinates()?;
    let radius = query.radius()?;
    let now = Utc::now();

    let mut stations = Vec::new();
    for candidate in nearby_or_closest(point, radius, MAX_NEARBY_STATIONS) {
        match report(&state, candidate.station, Some(candidate.distance), now).await {
            Ok(report) => stations.push(report),
            Err(e) => {
                tracing::warn!("no arrivals for {}: {e}", candidate.station.name);
                stations.push(StationReport {
                    station: candidate.station.name,
                    stop_id: candidate.station.stop_id,
                    lines: candidate.station.lines,
                    distance: Some(round_miles(candidate.distance)),
                    arrivals: BTreeMap::new(),
                });
            }
        }
    }
    Ok(Json(NearbyReply { stations }))
}

async fn station(
    State(state): State<AppState>, Query(query): Query<StationQuery>,
) -> Result<Json<StationReport>> {
    let stop_id = query
        .stop_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::BadRequest("missing query parameter: stopId".to_string()))?;
    if !STOP_ID.is_match(stop_id) {
        return Err(Error::BadRequest(format!("invalid stop id: {stop_id}")));
    }
    let station =
        station_by_stop_id(stop_id).ok_or_else(|| Error::NotFound(format!("unknown stop id: {stop_id}")))?;
    report(&state, station, None, Utc::now()).await.map(Json)
}

async fn stations() -> Json<StationsReply> {
    Json(StationsReply { stations: STATIONS })
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
