use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::Urgency;
use crate::models::vehicle::{VehicleStatus, VehicleType};

/// Derived per-job metrics, independent of any vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CargoAnalysis {
    pub job_id: String,
    pub urgency: Urgency,
    pub urgency_score: f64,
    pub distance_km: f64,
    /// Hours, including the loading buffer.
    pub estimated_duration: f64,
    pub difficulty_score: f64,
    pub revenue: f64,
    pub profit_estimate: f64,
    pub risk_score: f64,
    pub total_score: f64,
}

/// A vehicle ranked against one pickup point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceMatch {
    pub vehicle_id: String,
    pub license_plate: String,
    pub driver_name: String,
    pub vehicle_type: VehicleType,
    pub status: VehicleStatus,
    pub distance_km: f64,
    pub travel_minutes: f64,
    pub available_capacity_kg: f64,
    /// False when the capacity came from the safety-margin heuristic.
    pub live_capacity: bool,
    pub capacity_match: bool,
    pub availability_score: f64,
    pub efficiency_score: f64,
    pub fuel_consumption_l_per_100km: f64,
    pub total_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchBreakdown {
    pub urgency_score: f64,
    pub proximity_score: f64,
    pub profit_score: f64,
    pub efficiency_score: f64,
    pub risk_score: f64,
    /// Percent of revenue kept after route and deadhead costs.
    pub profit_margin: f64,
    pub distance_to_pickup_km: f64,
    pub estimated_duration: f64,
    /// Percent of the vehicle's available capacity the job fills.
    pub capacity_fit: f64,
}

/// A proposed (job, vehicle) pairing. Ephemeral; never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub job_id: String,
    pub vehicle_id: String,
    pub license_plate: String,
    pub origin_city: String,
    pub destination_city: String,
    pub urgency: Urgency,
    pub score: f64,
    pub estimated_profit: f64,
    pub risk_level: RiskLevel,
    pub capacity_match: bool,
    pub meets_profit_margin: bool,
    pub auto_assign_eligible: bool,
    pub breakdown: MatchBreakdown,
}

/// Result of scoring a caller-chosen pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairEvaluation {
    pub requested: Match,
    /// Whether the engine itself would propose this pair.
    pub proposable: bool,
    pub rejection_reason: Option<String>,
    /// Set when another vehicle scores strictly higher for the same job, or when
    /// the requested pair is not proposable and another vehicle is.
    pub better_match: Option<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetUtilization {
    pub total_vehicles: usize,
    pub active_vehicles: usize,
    pub idle_vehicles: usize,
    pub unavailable_vehicles: usize,
    pub utilization_rate: f64,
    pub top_performers: Vec<String>,
    pub underutilized: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReceipt {
    pub id: Uuid,
    pub job_id: String,
    pub vehicle_id: String,
    pub score: f64,
    pub assigned_at: DateTime<Utc>,
}
