//! Route assembly: roster → ordered waypoints → street path → [`Route`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::geo::{almost_equal, GeoPoint, COORD_EPSILON_DEG};
use crate::optimizer;
use crate::polyline::{polyline_length_m, Polyline};
use crate::roster::{BusId, RosterGateway};
use crate::route::{Route, Waypoint};
use crate::routing::path::{PathBuilderConfig, StreetPathBuilder};
use crate::routing::RoadRouter;
use crate::telemetry::TelemetrySink;

/// Name given to an origin the roster left unnamed.
pub const DEFAULT_ORIGIN_NAME: &str = "Route start";

/// Name of the origin taken from the bus's last stored position.
pub const CURRENT_POSITION_NAME: &str = "Current position";

/// Where a route begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStart {
    /// The roster's route origin, else the bus's stored position, else the
    /// first pickup.
    #[default]
    RouteOrigin,
    /// The school itself: the bus leaves school, collects everyone and returns.
    School,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    pub start: RouteStart,
    /// Run the stop-order optimizer; `false` keeps the roster order.
    pub recompute_order: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            start: RouteStart::RouteOrigin,
            recompute_order: true,
        }
    }
}

pub struct RoutePlanner {
    roster: Arc<dyn RosterGateway>,
    paths: StreetPathBuilder,
    /// Last known positions, used as origin when the roster has none.
    positions: Option<Arc<dyn TelemetrySink>>,
}

impl RoutePlanner {
    pub fn new(roster: Arc<dyn RosterGateway>, router: Arc<dyn RoadRouter>) -> Self {
        Self::with_path_builder(roster, StreetPathBuilder::new(router))
    }

    pub fn with_config(
        roster: Arc<dyn RosterGateway>,
        router: Arc<dyn RoadRouter>,
        config: PathBuilderConfig,
    ) -> Self {
        Self::with_path_builder(roster, StreetPathBuilder::with_config(router, config))
    }

    pub fn with_path_builder(roster: Arc<dyn RosterGateway>, paths: StreetPathBuilder) -> Self {
        Self {
            roster,
            paths,
            positions: None,
        }
    }

    /// Start routes without a configured origin at the bus's stored position.
    pub fn with_positions(mut self, positions: Arc<dyn TelemetrySink>) -> Self {
        self.positions = Some(positions);
        self
    }

    /// Build the route for `bus` with default options.
    pub fn plan(&self, bus: BusId) -> CoreResult<Route> {
        self.plan_with(bus, PlanOptions::default())
    }

    /// Build the route for `bus`.
    ///
    /// Fails with `NotFound` when the bus or its school is unknown and with
    /// `NoRoute` when fewer than two distinct points are left to drive.
    /// Routing-provider trouble never fails a plan; it only straightens legs.
    pub fn plan_with(&self, bus: BusId, options: PlanOptions) -> CoreResult<Route> {
        let school = self.roster.school(bus)?;
        let homes = self.roster.assigned_homes(bus)?;

        let origin = match options.start {
            RouteStart::RouteOrigin => match self.roster.route_origin(bus)? {
                Some(o) => {
                    let name = if o.name.trim().is_empty() {
                        DEFAULT_ORIGIN_NAME.to_string()
                    } else {
                        o.name
                    };
                    Some(Waypoint::origin(name, o.point))
                }
                None => self.last_position(bus),
            },
            RouteStart::School => Some(Waypoint::origin(school.name.clone(), school.point())),
        };

        let houses: Vec<Waypoint> = homes
            .into_iter()
            .map(|h| Waypoint::house(h.id, h.name.clone(), h.point()))
            .collect();
        let houses = if options.recompute_order {
            optimizer::order(&houses, origin.as_ref().map(|o| o.point), school.point())
        } else {
            houses
        };

        let mut waypoints = Vec::with_capacity(houses.len() + 2);
        waypoints.extend(origin);
        waypoints.extend(houses);
        let ends_at_school = waypoints
            .last()
            .is_some_and(|w| almost_equal(w.point, school.point(), COORD_EPSILON_DEG));
        if !ends_at_school {
            waypoints.push(Waypoint::school(school.name.clone(), school.point()));
        }

        if waypoints.len() < 2 {
            return Err(CoreError::NoRoute(format!(
                "bus {} has no stops besides its destination",
                bus
            )));
        }

        let path = self.paths.build(&waypoints);
        debug!("bus {} path source: {:?}", bus, path.source);
        let mut polyline = Polyline::from_points(path.points)?;
        polyline.tag_waypoints(&waypoints);

        let distance_m = if path.distance_m > 0.0 {
            path.distance_m
        } else {
            let stops: Vec<GeoPoint> = waypoints.iter().map(|w| w.point).collect();
            polyline_length_m(&stops)
        };

        info!(
            "route for bus {}: {} waypoints, {} polyline points, {:.0} m",
            bus,
            waypoints.len(),
            polyline.len(),
            distance_m
        );

        Ok(Route {
            waypoints,
            polyline,
            distance_m,
        })
    }

    fn last_position(&self, bus: BusId) -> Option<Waypoint> {
        let positions = self.positions.as_ref()?;
        match positions.read_current(bus) {
            Ok(record) => record.map(|r| Waypoint::origin(CURRENT_POSITION_NAME, r.point())),
            Err(err) => {
                warn!("position lookup for bus {} failed: {}", bus, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{BusRoster, InMemoryRoster, RouteOrigin, SchoolRecord, StudentRecord};
    use crate::route::WaypointKind;
    use crate::routing::OfflineRouter;
    use crate::telemetry::{InMemoryTelemetry, TelemetryRecord};

    fn student(id: u64, lat: f64, lon: f64) -> StudentRecord {
        StudentRecord {
            id,
            name: format!("home {}", id),
            active: true,
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn school() -> SchoolRecord {
        SchoolRecord {
            name: "School".to_string(),
            lat: 0.0,
            lon: 0.01,
        }
    }

    fn planner(bus: BusRoster) -> RoutePlanner {
        RoutePlanner::new(
            Arc::new(InMemoryRoster::from_buses([bus])),
            Arc::new(OfflineRouter),
        )
    }

    #[test]
    fn route_starts_at_origin_and_ends_at_school() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0, 0.008), student(2, 0.0, 0.002)],
            school: Some(school()),
            origin: Some(RouteOrigin {
                name: String::new(),
                point: GeoPoint::new(0.0, 0.0),
            }),
        });
        let route = planner.plan(1).expect("route");
        let kinds: Vec<WaypointKind> = route.waypoints.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WaypointKind::Origin,
                WaypointKind::House,
                WaypointKind::House,
                WaypointKind::School
            ]
        );
        assert_eq!(route.waypoints[0].name, DEFAULT_ORIGIN_NAME);
        let ids: Vec<Option<u64>> = route.waypoints.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![None, Some(2), Some(1), None]);
        assert!((route.distance_m - route.polyline.total_m()).abs() < 1e-6);
        assert_eq!(
            route.polyline.node_tag(route.polyline.len() - 1),
            Some(WaypointKind::School)
        );
    }

    #[test]
    fn stored_position_is_the_origin_when_none_is_configured() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        telemetry
            .upsert_current(1, TelemetryRecord::new(GeoPoint::new(-0.002, 0.0), 0.0, 1))
            .expect("write");
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0005, 0.0)],
            school: Some(school()),
            origin: None,
        })
        .with_positions(telemetry);

        let route = planner.plan(1).expect("route");
        let first = &route.waypoints[0];
        assert_eq!(first.kind, WaypointKind::Origin);
        assert_eq!(first.name, CURRENT_POSITION_NAME);
        assert_eq!(first.point, GeoPoint::new(-0.002, 0.0));
        assert_eq!(route.waypoint_count(), 3);
    }

    #[test]
    fn configured_origin_wins_over_stored_position() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        telemetry
            .upsert_current(1, TelemetryRecord::new(GeoPoint::new(-0.002, 0.0), 0.0, 1))
            .expect("write");
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0005, 0.0)],
            school: Some(school()),
            origin: Some(RouteOrigin {
                name: "Depot".to_string(),
                point: GeoPoint::new(0.0, 0.0),
            }),
        })
        .with_positions(telemetry);

        let route = planner.plan(1).expect("route");
        assert_eq!(route.waypoints[0].name, "Depot");
        assert_eq!(route.waypoints[0].point, GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn missing_position_leaves_the_route_without_origin() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0005, 0.0)],
            school: Some(school()),
            origin: None,
        })
        .with_positions(Arc::new(InMemoryTelemetry::new()));

        let route = planner.plan(1).expect("route");
        assert_eq!(route.waypoints[0].kind, WaypointKind::House);
    }

    #[test]
    fn roster_order_is_kept_when_recompute_is_off() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0, 0.008), student(2, 0.0, 0.002)],
            school: Some(school()),
            origin: None,
        });
        let route = planner
            .plan_with(
                1,
                PlanOptions {
                    recompute_order: false,
                    ..Default::default()
                },
            )
            .expect("route");
        let ids: Vec<Option<u64>> = route.waypoints.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn school_start_makes_a_loop() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.001, 0.005)],
            school: Some(school()),
            origin: None,
        });
        let route = planner
            .plan_with(
                1,
                PlanOptions {
                    start: RouteStart::School,
                    ..Default::default()
                },
            )
            .expect("route");
        assert_eq!(route.waypoint_count(), 3);
        assert_eq!(route.waypoints[0].point, school().point());
        assert_eq!(route.waypoints[2].kind, WaypointKind::School);
    }

    #[test]
    fn last_house_at_the_school_is_not_duplicated() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0, 0.0), student(2, 0.0, 0.010001)],
            school: Some(school()),
            origin: None,
        });
        let route = planner.plan(1).expect("route");
        assert_eq!(route.waypoint_count(), 2);
        assert_eq!(route.waypoints[1].kind, WaypointKind::House);
    }

    #[test]
    fn school_only_route_is_no_route() {
        let planner = planner(BusRoster {
            id: 1,
            homes: Vec::new(),
            school: Some(school()),
            origin: None,
        });
        assert!(matches!(planner.plan(1), Err(CoreError::NoRoute(_))));
    }

    #[test]
    fn unknown_bus_and_missing_school_are_not_found() {
        let planner = planner(BusRoster {
            id: 1,
            homes: vec![student(1, 0.0, 0.0)],
            school: None,
            origin: None,
        });
        assert!(matches!(planner.plan(1), Err(CoreError::NotFound(_))));
        assert!(matches!(planner.plan(9), Err(CoreError::NotFound(_))));
    }
}
