#[derive(serde::Deserialize)]
pub(super) struct OsrmRouteResponse {
    pub(super) code: String,
    pub(super) message: Option<String>,
    pub(super) routes: Option<Vec<OsrmRoute>>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmRoute {
    /// Metres.
    pub(super) distance: Option<f64>,
    pub(super) geometry: Option<OsrmGeometry>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmGeometry {
    /// `[lon, lat]` pairs.
    pub(super) coordinates: Vec<[f64; 2]>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmNearestResponse {
    pub(super) code: String,
    pub(super) message: Option<String>,
    pub(super) waypoints: Option<Vec<OsrmNearestWaypoint>>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmNearestWaypoint {
    pub(super) location: [f64; 2],
}
