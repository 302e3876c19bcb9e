use serde::{Deserialize, Serialize};

use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Idle,
    InTransit,
    EnRoute,
    Loading,
    Unloading,
    Maintenance,
    Assigned,
    OutOfService,
}

impl VehicleStatus {
    /// Statuses a vehicle may be in to be offered new work.
    pub const DISPATCHABLE: [VehicleStatus; 3] = [
        VehicleStatus::Idle,
        VehicleStatus::EnRoute,
        VehicleStatus::Assigned,
    ];

    pub fn is_dispatchable(self) -> bool {
        Self::DISPATCHABLE.contains(&self)
    }

    pub fn is_out_of_service(self) -> bool {
        matches!(self, VehicleStatus::Maintenance | VehicleStatus::OutOfService)
    }

    /// Counts towards fleet utilization.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            VehicleStatus::InTransit
                | VehicleStatus::EnRoute
                | VehicleStatus::Loading
                | VehicleStatus::Unloading
                | VehicleStatus::Assigned
        )
    }

    pub fn availability_score(self) -> f64 {
        match self {
            VehicleStatus::Idle => 100.0,
            VehicleStatus::EnRoute => 80.0,
            VehicleStatus::Assigned => 60.0,
            VehicleStatus::Loading | VehicleStatus::Unloading => 40.0,
            VehicleStatus::InTransit => 20.0,
            VehicleStatus::Maintenance | VehicleStatus::OutOfService => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleType {
    Van,
    Truck,
    Semi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub license_plate: String,
    pub driver_name: String,
    pub vehicle_type: VehicleType,
    pub max_capacity_kg: f64,
    pub fuel_consumption_l_per_100km: f64,
    pub status: VehicleStatus,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    pub gps_enabled: bool,
}

impl Vehicle {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("vehicle id cannot be empty".to_string());
        }
        if !(self.max_capacity_kg > 0.0) {
            return Err(format!("vehicle {}: capacity must be > 0", self.id));
        }
        if self.fuel_consumption_l_per_100km < 0.0 {
            return Err(format!(
                "vehicle {}: fuel consumption cannot be negative",
                self.id
            ));
        }
        Ok(())
    }
}
