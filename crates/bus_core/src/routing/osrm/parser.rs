use crate::geo::GeoPoint;
use crate::routing::{RoadRoute, RoutingError};

use super::response::{OsrmNearestResponse, OsrmRouteResponse};

fn api_error(code: String, message: Option<String>) -> RoutingError {
    match message.filter(|m| !m.trim().is_empty()) {
        Some(message) => RoutingError::Api(format!("{}: {}", code, message)),
        None => RoutingError::Api(code),
    }
}

pub(super) fn parse_route_response(resp: OsrmRouteResponse) -> Result<RoadRoute, RoutingError> {
    if resp.code != "Ok" {
        return Err(api_error(resp.code, resp.message));
    }

    let route = resp
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RoutingError::NoGeometry)?;
    let geometry: Vec<GeoPoint> = route
        .geometry
        .map(|g| g.coordinates)
        .unwrap_or_default()
        .into_iter()
        .map(|[lon, lat]| GeoPoint::new(lat, lon)) // OSRM sends [lon, lat]
        .collect();

    if geometry.len() < 2 {
        return Err(RoutingError::NoGeometry);
    }

    Ok(RoadRoute {
        geometry,
        distance_m: route.distance.filter(|d| d.is_finite() && *d >= 0.0),
    })
}

pub(super) fn parse_nearest_response(resp: OsrmNearestResponse) -> Result<GeoPoint, RoutingError> {
    if resp.code != "Ok" {
        return Err(api_error(resp.code, resp.message));
    }

    let waypoint = resp
        .waypoints
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or(RoutingError::NoGeometry)?;
    Ok(GeoPoint::new(waypoint.location[1], waypoint.location[0]))
}
