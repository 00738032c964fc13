//! Static station table and great-circle lookups over it.

use serde::Serialize;

use crate::arrivals::Direction;
use crate::error::{Error, Result};

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;
pub const DEFAULT_NEARBY_RADIUS_MILES: f64 = 0.4;
pub const MAX_NEARBY_STATIONS: usize = 5;
/// Inside this distance of home the home station wins over the closest one.
pub const HOME_RADIUS_MILES: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Validated constructor for user supplied coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::BadRequest(format!("latitude out of range: {latitude}")));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::BadRequest(format!("longitude out of range: {longitude}")));
        }
        Ok(Self { latitude, longitude })
    }
}

/// A subway station, identified by its parent GTFS stop ID (no `N`/`S` suffix).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub stop_id: &'static str,
    pub name: &'static str,
    pub lines: &'static [&'static str],
    pub latitude: f64,
    pub longitude: f64,
    /// Where trains on the `N` platform are headed.
    pub northbound: &'static str,
    /// Where trains on the `S` platform are headed.
    pub southbound: &'static str,
}

impl Station {
    pub const fn location(&self) -> Coordinates {
        Coordinates { latitude: self.latitude, longitude: self.longitude }
    }

    pub fn primary_line(&self) -> &'static str {
        self.lines.first().copied().unwrap_or_default()
    }

    pub const fn direction_label(&self, direction: Direction) -> &'static str {
        match direction {
            Direction::North => self.northbound,
            Direction::South => self.southbound,
        }
    }

    pub fn serves(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l.eq_ignore_ascii_case(line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NearbyStation {
    pub station: &'static Station,
    /// Miles from the query point.
    pub distance: f64,
}

/// A remembered location whose own station is preferred when close to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Home {
    pub location: Coordinates,
    pub station: &'static Station,
}

/// Great-circle distance in miles.
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    // rounding can push `h` just past 1 for antipodal points
    let h = ((d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2))
    .min(1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

fn closest_in(table: &'static [Station], point: Coordinates) -> Option<NearbyStation> {
    let mut best: Option<NearbyStation> = None;
    for station in table {
        let distance = haversine_miles(point, station.location());
        if best.is_none_or(|b| distance < b.distance) {
            best = Some(NearbyStation { station, distance });
        }
    }
    best
}

fn nearby_in(
    table: &'static [Station], point: Coordinates, radius: f64, max: usize,
) -> Vec<NearbyStation> {
    let mut nearby: Vec<NearbyStation> = table
        .iter()
        .map(|station| NearbyStation { station, distance: haversine_miles(point, station.location()) })
        .filter(|n| n.distance <= radius)
        .collect();
    nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    nearby.truncate(max);
    nearby
}

/// The station closest to `point`. Ties keep the first station in table order.
pub fn find_closest_station(point: Coordinates) -> Option<NearbyStation> {
    closest_in(STATIONS, point)
}

/// Stations within `radius` miles, nearest first, at most `max` of them.
pub fn find_nearby_stations(point: Coordinates, radius: f64, max: usize) -> Vec<NearbyStation> {
    nearby_in(STATIONS, point, radius, max)
}

/// Like [`find_nearby_stations`], falling back to the single closest station
/// when nothing is in range.
pub fn nearby_or_closest(point: Coordinates, radius: f64, max: usize) -> Vec<NearbyStation> {
    let nearby = find_nearby_stations(point, radius, max);
    if nearby.is_empty() {
        return find_closest_station(point).into_iter().collect();
    }
    nearby
}

/// Looks a station up by stop ID. A trailing `N`/`S` platform suffix is ignored.
pub fn station_by_stop_id(stop_id: &str) -> Option<&'static Station> {
    let stop_id = stop_id.trim().to_uppercase();
    STATIONS.iter().find(|s| s.stop_id == stop_id).or_else(|| {
        let base = stop_id.strip_suffix('N').or_else(|| stop_id.strip_suffix('S'))?;
        STATIONS.iter().find(|s| s.stop_id == base)
    })
}

/// The home station when `point` is within [`HOME_RADIUS_MILES`] of home,
/// the closest station otherwise.
pub fn select_station(point: Coordinates, home: Option<&Home>) -> Option<&'static Station> {
    if let Some(home) = home {
        let from_home = haversine_miles(point, home.location);
        if from_home <= HOME_RADIUS_MILES {
            tracing::debug!("{from_home:.2} mi from home, using {}", home.station.name);
            return Some(home.station);
        }
    }
    find_closest_station(point).map(|n| n.station)
}

macro_rules! station {
    ($id:literal, $name:literal, [$($line:literal),+], $lat:literal, $lon:literal, $north:literal, $south:literal) => {
        Station {
            stop_id: $id,
            name: $name,
            lines: &[$($line),+],
            latitude: $lat,
            longitude: $lon,
            northbound: $north,
            southbound: $south,
        }
    };
}

/// Hand-maintained subset of NYCT stations, mostly north Brooklyn.
pub static STATIONS: &[Station] = &[
    // 14 St-Canarsie line
    station!("L03", "14 St-Union Sq", ["L"], 40.734789, -73.990730, "8 Av", "Brooklyn"),
    station!("L06", "1 Av", ["L"], 40.730953, -73.981628, "8 Av", "Brooklyn"),
    station!("L08", "Bedford Av", ["L"], 40.717304, -73.956872, "Manhattan", "Canarsie"),
    station!("L10", "Lorimer St", ["L"], 40.714063, -73.950275, "Manhattan", "Canarsie"),
    station!("L11", "Graham Av", ["L"], 40.714565, -73.944053, "Manhattan", "Canarsie"),
    station!("L12", "Grand St", ["L"], 40.711926, -73.940670, "Manhattan", "Canarsie"),
    station!("L13", "Montrose Av", ["L"], 40.707739, -73.939850, "Manhattan", "Canarsie"),
    station!("L14", "Morgan Av", ["L"], 40.706152, -73.933147, "Manhattan", "Canarsie"),
    station!("L15", "Jefferson St", ["L"], 40.706607, -73.922913, "Manhattan", "Canarsie"),
    station!("L16", "DeKalb Av", ["L"], 40.703811, -73.918425, "Manhattan", "Canarsie"),
    station!("L17", "Myrtle-Wyckoff Avs", ["L"], 40.699814, -73.911586, "Manhattan", "Canarsie"),
    // Crosstown line
    station!("G22", "Court Sq", ["G"], 40.746554, -73.943832, "Court Sq", "Church Av"),
    station!("G24", "21 St", ["G"], 40.744065, -73.949724, "Court Sq", "Church Av"),
    station!("G26", "Greenpoint Av", ["G"], 40.731352, -73.954449, "Court Sq", "Church Av"),
    station!("G28", "Nassau Av", ["G"], 40.724635, -73.951277, "Court Sq", "Church Av"),
    station!("G29", "Metropolitan Av", ["G"], 40.712792, -73.951418, "Court Sq", "Church Av"),
    station!("G30", "Broadway", ["G"], 40.706092, -73.950308, "Court Sq", "Church Av"),
    station!("G31", "Flushing Av", ["G"], 40.700377, -73.950234, "Court Sq", "Church Av"),
    station!("G32", "Myrtle-Willoughby Avs", ["G"], 40.694568, -73.949046, "Court Sq", "Church Av"),
    station!("G33", "Bedford-Nostrand Avs", ["G"], 40.689627, -73.953522, "Court Sq", "Church Av"),
    station!("G34", "Classon Av", ["G"], 40.688873, -73.960070, "Court Sq", "Church Av"),
    station!("G35", "Clinton-Washington Avs", ["G"], 40.688089, -73.966839, "Court Sq", "Church Av"),
    station!("G36", "Fulton St", ["G"], 40.687119, -73.975375, "Court Sq", "Church Av"),
    // Jamaica line
    station!("M16", "Marcy Av", ["J", "M", "Z"], 40.708359, -73.957757, "Queens", "Manhattan"),
    station!("M14", "Hewes St", ["J", "M"], 40.706870, -73.953431, "Queens", "Manhattan"),
    station!("M13", "Lorimer St", ["J", "M"], 40.703869, -73.947408, "Queens", "Manhattan"),
    station!("M12", "Flushing Av", ["J", "M"], 40.700260, -73.941126, "Queens", "Manhattan"),
    station!("M18", "Delancey St-Essex St", ["J", "M", "Z"], 40.718315, -73.987437, "Brooklyn", "Broad St"),
    // Manhattan trunk lines
    station!("D15", "47-50 Sts-Rockefeller Ctr", ["B", "D", "F", "M"], 40.758663, -73.981329, "Uptown", "Brooklyn"),
    station!("A31", "14 St", ["A", "C", "E"], 40.740893, -74.001690, "Uptown", "Downtown"),
    station!("R20", "14 St-Union Sq", ["N", "Q", "R", "W"], 40.735736, -73.990568, "Uptown", "Downtown"),
    station!("635", "14 St-Union Sq", ["4", "5", "6"], 40.734673, -73.989951, "Uptown", "Downtown"),
    station!("631", "Grand Central-42 St", ["4", "5", "6"], 40.751776, -73.976848, "Uptown", "Downtown"),
    station!("127", "Times Sq-42 St", ["1", "2", "3"], 40.755290, -73.987495, "Uptown", "Downtown"),
];
