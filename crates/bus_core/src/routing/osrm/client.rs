use reqwest::{blocking::Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::geo::GeoPoint;
use crate::routing::{RoadRoute, RoadRouter, RoutingError};

use super::parser::{parse_nearest_response, parse_route_response};
use super::radius::encode_radiuses;
use super::response::{OsrmNearestResponse, OsrmRouteResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin HTTP client for OSRM's driving profile.
#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    endpoint: String,
}

impl OsrmRouter {
    /// Create a router for the given endpoint (e.g. `https://router.project-osrm.org`).
    pub fn new(endpoint: &str) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RoutingError::Http)?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Use a preconfigured client (proxies, custom timeouts, user agent).
    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(super) fn route_url(
        &self,
        coords: &[GeoPoint],
        radius_m: Option<f64>,
    ) -> Result<Url, RoutingError> {
        let coord_segment = coords
            .iter()
            .map(|point| format!("{},{}", point.lon, point.lat))
            .collect::<Vec<_>>()
            .join(";");

        let base = format!("{}/route/v1/driving/{}", self.endpoint, coord_segment);
        let mut url = Url::parse(&base)
            .map_err(|err| RoutingError::Api(format!("failed to build OSRM URL: {}", err)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("overview", "full")
                .append_pair("geometries", "geojson")
                .append_pair("steps", "false")
                .append_pair("continue_straight", "false");
            if let Some(radius) = radius_m {
                query.append_pair("radiuses", &encode_radiuses(coords.len(), &[radius]));
            }
        }
        Ok(url)
    }

    pub(super) fn nearest_url(&self, point: GeoPoint) -> Result<Url, RoutingError> {
        let coord = format!("{:.6},{:.6}", point.lon, point.lat);
        let mut url = Url::parse(&format!("{}/nearest/v1/driving/{}", self.endpoint, coord))
            .map_err(|err| RoutingError::Api(format!("failed to build OSRM URL: {}", err)))?;
        url.query_pairs_mut().append_pair("number", "1");
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RoutingError> {
        let response = self.client.get(url).send().map_err(RoutingError::Http)?;
        let status = response.status();
        // OSRM reports NoRoute/NoSegment as 400 with a JSON body carrying the code
        if !status.is_success() && status.as_u16() != 400 {
            return Err(RoutingError::Status(status.as_u16()));
        }
        response.json().map_err(RoutingError::Json)
    }
}

impl RoadRouter for OsrmRouter {
    fn route(&self, coords: &[GeoPoint], radius_m: Option<f64>) -> Result<RoadRoute, RoutingError> {
        if coords.len() < 2 {
            return Err(RoutingError::NoGeometry);
        }
        let url = self.route_url(coords, radius_m)?;
        let parsed: OsrmRouteResponse = self.get_json(url)?;
        parse_route_response(parsed)
    }

    fn nearest(&self, point: GeoPoint) -> Result<GeoPoint, RoutingError> {
        let url = self.nearest_url(point)?;
        let parsed: OsrmNearestResponse = self.get_json(url)?;
        parse_nearest_response(parsed)
    }
}
