use std::cmp::Ordering;

use serde::Serialize;
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::model::location::{Coordinate, Location};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine).
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LocationDistance {
    #[schema(example = 1)]
    pub location_id: u64,
    #[schema(example = "Head office")]
    pub name: String,
    #[schema(example = 42.7)]
    pub distance_meters: f64,
    #[schema(example = 100.0)]
    pub radius_meters: f64,
}

impl LocationDistance {
    pub fn in_range(&self) -> bool {
        self.distance_meters <= self.radius_meters
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LocationCheckResult {
    /// Locations whose radius contains the point, nearest first.
    pub in_range: Vec<LocationDistance>,
    /// Nearest active location whether or not it is in range.
    pub nearest: Option<LocationDistance>,
    pub can_check_in: bool,
}

impl LocationCheckResult {
    /// The location a check-in is attributed to: nearest in range, else nearest overall.
    pub fn primary(&self) -> Option<&LocationDistance> {
        self.in_range.first().or(self.nearest.as_ref())
    }
}

fn by_distance_then_id(a: &LocationDistance, b: &LocationDistance) -> Ordering {
    a.distance_meters
        .partial_cmp(&b.distance_meters)
        .unwrap_or(Ordering::Equal)
        .then(a.location_id.cmp(&b.location_id))
}

/// Work out which active locations contain `point`.
pub fn resolve(
    point: Coordinate,
    locations: &[Location],
    allow_offsite: bool,
) -> Result<LocationCheckResult, AttendanceError> {
    point.validate()?;

    let mut measured: Vec<LocationDistance> = locations
        .iter()
        .filter(|loc| loc.is_active)
        .map(|loc| LocationDistance {
            location_id: loc.id,
            name: loc.name.clone(),
            distance_meters: distance_meters(&point, &loc.center),
            radius_meters: loc.radius_meters,
        })
        .collect();
    measured.sort_by(by_distance_then_id);

    let nearest = measured.first().cloned();
    let in_range: Vec<LocationDistance> = measured.into_iter().filter(LocationDistance::in_range).collect();
    let can_check_in = !in_range.is_empty() || allow_offsite;

    Ok(LocationCheckResult { in_range, nearest, can_check_in })
}
