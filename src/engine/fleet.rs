use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, instrument};

use crate::config::{ConfigProvider, DispatchConfig};
use crate::engine::round1;
use crate::error::SourceError;
use crate::geo::haversine_km;
use crate::models::matching::{FleetUtilization, ResourceMatch};
use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
use crate::models::GeoPoint;
use crate::sources::{ResourceFilter, ResourceSource};

const CITY_BAND_KM: f64 = 30.0;
const HIGHWAY_BAND_KM: f64 = 100.0;
const DISTANCE_NORMALIZATION_KM: f64 = 100.0;
const TIME_NORMALIZATION_MINUTES: f64 = 120.0;
const TIE_WINDOW_KM: f64 = 5.0;

const DISTANCE_WEIGHT: f64 = 0.40;
const TIME_WEIGHT: f64 = 0.20;
const AVAILABILITY_WEIGHT: f64 = 0.25;
const EFFICIENCY_WEIGHT: f64 = 0.15;

/// A vehicle together with its live capacity figure, if the source has one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCandidate {
    pub vehicle: Vehicle,
    pub live_capacity_kg: Option<f64>,
}

impl ResourceCandidate {
    /// Live figure when known, otherwise the safety margin applied to max capacity.
    pub fn effective_capacity(&self, safety_margin: f64) -> f64 {
        self.live_capacity_kg
            .unwrap_or(self.vehicle.max_capacity_kg * safety_margin)
    }
}

/// Ranks vehicles against a pickup point. Pure; works on already-fetched candidates.
pub struct ResourceMatcher {
    config: Arc<DispatchConfig>,
}

impl ResourceMatcher {
    pub fn new(config: Arc<DispatchConfig>) -> Self {
        Self { config }
    }

    pub fn is_available(&self, candidate: &ResourceCandidate) -> bool {
        candidate.vehicle.status.is_dispatchable()
            && candidate.vehicle.gps_enabled
            && candidate.effective_capacity(self.config.fleet.capacity_safety_margin)
                > self.config.fleet.min_available_capacity_kg
    }

    pub fn travel_minutes(&self, distance_km: f64) -> f64 {
        let speeds = &self.config.speeds;
        let speed = if distance_km < CITY_BAND_KM {
            speeds.city_kmh
        } else if distance_km > HIGHWAY_BAND_KM {
            speeds.highway_kmh
        } else {
            speeds.fleet_city_share * speeds.city_kmh
                + (1.0 - speeds.fleet_city_share) * speeds.highway_kmh
        };

        distance_km / speed * 60.0
    }

    pub fn efficiency_score(&self, vehicle: &Vehicle, distance_km: f64) -> f64 {
        let mut score: f64 = 100.0;

        if distance_km > 50.0 {
            score -= 20.0;
        } else if distance_km > 20.0 {
            score -= 10.0;
        } else if distance_km > 10.0 {
            score -= 5.0;
        }

        let fuel = vehicle.fuel_consumption_l_per_100km;
        if fuel < 6.0 {
            score += 15.0;
        } else if fuel < 8.0 {
            score += 10.0;
        } else if fuel > 12.0 {
            score -= 10.0;
        }

        score += match vehicle.vehicle_type {
            VehicleType::Van => 5.0,
            VehicleType::Semi => -5.0,
            VehicleType::Truck => 0.0,
        };

        score.clamp(0.0, 100.0)
    }

    /// Scores one candidate. `None` when the vehicle has no known position.
    pub fn evaluate(
        &self,
        candidate: &ResourceCandidate,
        pickup: &GeoPoint,
        required_weight_kg: f64,
    ) -> Option<ResourceMatch> {
        let vehicle = &candidate.vehicle;
        let position = vehicle.position?;

        let distance_km = haversine_km(&position, pickup);
        let travel_minutes = self.travel_minutes(distance_km);
        let available_capacity_kg =
            candidate.effective_capacity(self.config.fleet.capacity_safety_margin);
        let capacity_match = available_capacity_kg >= required_weight_kg;
        let availability_score = vehicle.status.availability_score();
        let efficiency_score = self.efficiency_score(vehicle, distance_km);

        let total_score = if capacity_match {
            let distance_score =
                (100.0 - distance_km / DISTANCE_NORMALIZATION_KM * 100.0).max(0.0);
            let time_score =
                (100.0 - travel_minutes / TIME_NORMALIZATION_MINUTES * 100.0).max(0.0);
            distance_score * DISTANCE_WEIGHT
                + time_score * TIME_WEIGHT
                + availability_score * AVAILABILITY_WEIGHT
                + efficiency_score * EFFICIENCY_WEIGHT
        } else {
            0.0
        };

        Some(ResourceMatch {
            vehicle_id: vehicle.id.clone(),
            license_plate: vehicle.license_plate.clone(),
            driver_name: vehicle.driver_name.clone(),
            vehicle_type: vehicle.vehicle_type,
            status: vehicle.status,
            distance_km,
            travel_minutes,
            available_capacity_kg,
            live_capacity: candidate.live_capacity_kg.is_some(),
            capacity_match,
            availability_score,
            efficiency_score,
            fuel_consumption_l_per_100km: vehicle.fuel_consumption_l_per_100km,
            total_score: round1(total_score),
        })
    }

    /// Vehicles with enough capacity within `max_distance_km`, closest first.
    pub fn find_nearest_resources(
        &self,
        candidates: &[ResourceCandidate],
        pickup: &GeoPoint,
        required_weight_kg: f64,
        max_distance_km: f64,
    ) -> Vec<ResourceMatch> {
        let mut matches: Vec<ResourceMatch> = candidates
            .iter()
            .filter(|candidate| !candidate.vehicle.status.is_out_of_service())
            .filter_map(|candidate| self.evaluate(candidate, pickup, required_weight_kg))
            .filter(|m| m.capacity_match && m.distance_km <= max_distance_km)
            .collect();

        sort_by_distance(&mut matches);
        matches
    }

    /// Closest vehicle that can reach the pickup within the urgent share of the deadline window.
    pub fn find_urgent_resource(
        &self,
        candidates: &[ResourceCandidate],
        pickup: &GeoPoint,
        required_weight_kg: f64,
        deadline_hours: f64,
    ) -> Option<ResourceMatch> {
        let fleet = &self.config.fleet;
        let max_minutes = deadline_hours * 60.0 * fleet.urgent_travel_fraction;

        self.find_nearest_resources(candidates, pickup, required_weight_kg, fleet.urgent_radius_km)
            .into_iter()
            .find(|m| m.travel_minutes <= max_minutes)
    }
}

/// Ascending distance; matches within 5 km of the nearest one in their run
/// are ordered by descending score instead.
///
/// Runs are anchored on their first element so the comparison stays a total order.
pub fn sort_by_distance(matches: &mut [ResourceMatch]) {
    matches.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
    });

    let mut start = 0;
    while start < matches.len() {
        let anchor = matches[start].distance_km;
        let mut end = start + 1;
        while end < matches.len() && matches[end].distance_km - anchor <= TIE_WINDOW_KM {
            end += 1;
        }

        matches[start..end].sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| a.distance_km.total_cmp(&b.distance_km))
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        start = end;
    }
}

pub fn fleet_utilization(vehicles: &[Vehicle]) -> FleetUtilization {
    let total_vehicles = vehicles.len();
    let active_vehicles = vehicles.iter().filter(|v| v.status.is_active()).count();
    let unavailable_vehicles = vehicles
        .iter()
        .filter(|v| v.status.is_out_of_service())
        .count();

    let ids_with = |status: VehicleStatus| -> Vec<String> {
        let mut ids: Vec<String> = vehicles
            .iter()
            .filter(|v| v.status == status)
            .map(|v| v.id.clone())
            .collect();
        ids.sort();
        ids
    };
    let underutilized = ids_with(VehicleStatus::Idle);

    let utilization_rate = if total_vehicles == 0 {
        0.0
    } else {
        round1(active_vehicles as f64 / total_vehicles as f64 * 100.0)
    };

    FleetUtilization {
        total_vehicles,
        active_vehicles,
        idle_vehicles: underutilized.len(),
        unavailable_vehicles,
        utilization_rate,
        top_performers: ids_with(VehicleStatus::InTransit),
        underutilized,
    }
}

/// Fetches vehicles through a [`ResourceSource`] and hands them to the matcher.
pub struct FleetManager {
    resources: Arc<dyn ResourceSource>,
    config: Arc<ConfigProvider>,
}

impl FleetManager {
    pub fn new(resources: Arc<dyn ResourceSource>, config: Arc<ConfigProvider>) -> Self {
        Self { resources, config }
    }

    fn matcher(&self) -> ResourceMatcher {
        ResourceMatcher::new(self.config.get())
    }

    /// Dispatchable, GPS-tracked vehicles with more than the minimum free capacity.
    #[instrument(skip(self))]
    pub async fn get_available_resources(&self) -> Result<Vec<ResourceCandidate>, SourceError> {
        let vehicles = self.resources.list_available().await?;
        let capacities = try_join_all(
            vehicles
                .iter()
                .map(|vehicle| self.resources.get_available_capacity(&vehicle.id)),
        )
        .await?;

        let matcher = self.matcher();
        let candidates: Vec<ResourceCandidate> = vehicles
            .into_iter()
            .zip(capacities)
            .map(|(vehicle, live_capacity_kg)| ResourceCandidate {
                vehicle,
                live_capacity_kg,
            })
            .filter(|candidate| matcher.is_available(candidate))
            .collect();

        debug!(count = candidates.len(), "available resources fetched");
        Ok(candidates)
    }

    pub async fn get_candidate(&self, id: &str) -> Result<Option<ResourceCandidate>, SourceError> {
        let Some(vehicle) = self.resources.get_resource(id).await? else {
            return Ok(None);
        };
        let live_capacity_kg = self.resources.get_available_capacity(id).await?;
        Ok(Some(ResourceCandidate {
            vehicle,
            live_capacity_kg,
        }))
    }

    pub async fn find_nearest_resources(
        &self,
        pickup: &GeoPoint,
        required_weight_kg: f64,
        max_distance_km: Option<f64>,
    ) -> Result<Vec<ResourceMatch>, SourceError> {
        let config = self.config.get();
        let candidates = self.get_available_resources().await?;
        let radius = max_distance_km.unwrap_or(config.fleet.search_radius_km);

        Ok(ResourceMatcher::new(config).find_nearest_resources(
            &candidates,
            pickup,
            required_weight_kg,
            radius,
        ))
    }

    pub async fn find_urgent_resource(
        &self,
        pickup: &GeoPoint,
        required_weight_kg: f64,
        deadline_hours: f64,
    ) -> Result<Option<ResourceMatch>, SourceError> {
        let candidates = self.get_available_resources().await?;
        Ok(self
            .matcher()
            .find_urgent_resource(&candidates, pickup, required_weight_kg, deadline_hours))
    }

    pub async fn get_fleet_utilization(&self) -> Result<FleetUtilization, SourceError> {
        let vehicles = self.resources.list_resources(&ResourceFilter::all()).await?;
        Ok(fleet_utilization(&vehicles))
    }
}
