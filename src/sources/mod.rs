//! Collaborator boundary: where jobs and vehicles come from.
//!
//! The matching core only reads through these traits, plus the narrow write
//! calls the assignment flow needs. Storage is someone else's problem.

pub mod cached;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::models::job::{Job, JobStatus, Urgency};
use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
use crate::models::GeoPoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    /// Empty means any status.
    pub statuses: Vec<JobStatus>,
    pub cargo_type: Option<String>,
    pub urgency: Option<Urgency>,
}

impl JobFilter {
    pub fn open() -> Self {
        Self {
            statuses: vec![JobStatus::Active],
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &Job, now: DateTime<Utc>) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if let Some(cargo_type) = &self.cargo_type {
            if !job.cargo_type.eq_ignore_ascii_case(cargo_type) {
                return false;
            }
        }
        if let Some(urgency) = self.urgency {
            if job.urgency(now) != urgency {
                return false;
            }
        }
        true
    }

    pub fn cache_key(&self) -> String {
        let mut statuses: Vec<String> = self.statuses.iter().map(|s| format!("{s:?}")).collect();
        statuses.sort();
        statuses.dedup();

        format!(
            "jobs:status={};type={};urgency={}",
            if statuses.is_empty() { "*".to_string() } else { statuses.join(",") },
            self.cargo_type
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| "*".to_string()),
            self.urgency
                .map(|u| format!("{u:?}"))
                .unwrap_or_else(|| "*".to_string()),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    /// Empty means any status.
    pub statuses: Vec<VehicleStatus>,
    pub gps_required: bool,
    pub vehicle_type: Option<VehicleType>,
}

impl ResourceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Dispatchable, GPS-tracked vehicles. Capacity is checked by the fleet manager.
    pub fn available() -> Self {
        Self {
            statuses: VehicleStatus::DISPATCHABLE.to_vec(),
            gps_required: true,
            vehicle_type: None,
        }
    }

    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&vehicle.status) {
            return false;
        }
        if self.gps_required && !vehicle.gps_enabled {
            return false;
        }
        if let Some(vehicle_type) = self.vehicle_type {
            if vehicle.vehicle_type != vehicle_type {
                return false;
            }
        }
        true
    }

    pub fn cache_key(&self) -> String {
        let mut statuses: Vec<String> = self.statuses.iter().map(|s| format!("{s:?}")).collect();
        statuses.sort();
        statuses.dedup();

        format!(
            "vehicles:status={};gps={};type={}",
            if statuses.is_empty() { "*".to_string() } else { statuses.join(",") },
            self.gps_required,
            self.vehicle_type
                .map(|t| format!("{t:?}"))
                .unwrap_or_else(|| "*".to_string()),
        )
    }
}

#[async_trait]
pub trait CargoSource: Send + Sync {
    async fn list_open_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SourceError>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>, SourceError>;

    /// Returns false when the job does not exist.
    async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<bool, SourceError>;

    /// Moves the job from `from` to `to` in one step. Returns false when the job
    /// does not exist or is not currently in `from`.
    async fn transition_job_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, SourceError>;
}

#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Vehicle>, SourceError>;

    async fn list_available(&self) -> Result<Vec<Vehicle>, SourceError> {
        self.list_resources(&ResourceFilter::available()).await
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Vehicle>, SourceError>;

    /// `None` when no live capacity figure exists for the vehicle.
    async fn get_available_capacity(&self, id: &str) -> Result<Option<f64>, SourceError>;

    async fn update_position(&self, id: &str, position: GeoPoint) -> Result<bool, SourceError>;

    /// Records `weight_kg` of `job_id` against the vehicle and marks an idle vehicle assigned.
    async fn assign_job(
        &self,
        id: &str,
        job_id: &str,
        weight_kg: f64,
    ) -> Result<bool, SourceError>;
}
