#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_matcher::config::{ConfigProvider, DispatchConfig};
use fleet_matcher::models::job::{Job, JobStatus, PriceType, RoutePoint};
use fleet_matcher::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
use fleet_matcher::models::GeoPoint;

pub const DEPOT: GeoPoint = GeoPoint {
    lat: 44.4268,
    lng: 26.1025,
};

const KM_PER_DEGREE_LAT: f64 = 111.195;

pub fn km_north_of_depot(km: f64) -> GeoPoint {
    GeoPoint {
        lat: DEPOT.lat + km / KM_PER_DEGREE_LAT,
        lng: DEPOT.lng,
    }
}

/// Bucharest depot to Ploiesti, fixed price.
pub fn job(id: &str, weight_kg: f64, price: f64, deadline_hours: i64, now: DateTime<Utc>) -> Job {
    Job {
        id: id.to_string(),
        origin: RoutePoint {
            city: "Bucharest".to_string(),
            country: "RO".to_string(),
            location: Some(DEPOT),
            postal_code: Some("010011".to_string()),
        },
        destination: RoutePoint {
            city: "Ploiesti".to_string(),
            country: "RO".to_string(),
            location: Some(GeoPoint {
                lat: 44.9367,
                lng: 26.0129,
            }),
            postal_code: None,
        },
        weight_kg,
        volume_m3: Some(12.0),
        cargo_type: "General".to_string(),
        price,
        price_type: PriceType::Fixed,
        loading_date: now,
        delivery_date: now + Duration::hours(deadline_hours),
        deadline: None,
        special_requirements: Vec::new(),
        status: JobStatus::Active,
    }
}

pub fn vehicle(id: &str, km_north: f64, capacity_kg: f64) -> Vehicle {
    Vehicle {
        id: id.to_string(),
        license_plate: format!("B-{}-DSP", id.to_uppercase()),
        driver_name: format!("Driver {id}"),
        vehicle_type: VehicleType::Truck,
        max_capacity_kg: capacity_kg,
        fuel_consumption_l_per_100km: 9.0,
        status: VehicleStatus::Idle,
        position: Some(km_north_of_depot(km_north)),
        gps_enabled: true,
    }
}

pub fn provider(config: DispatchConfig) -> Arc<ConfigProvider> {
    Arc::new(ConfigProvider::new(config).expect("valid test config"))
}
