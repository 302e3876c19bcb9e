use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::models::job::{Job, JobStatus};
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::models::GeoPoint;
use crate::sources::{CargoSource, JobFilter, ResourceFilter, ResourceSource};

const CARGO_SOURCE: &str = "cargo source";
const FLEET_SOURCE: &str = "fleet source";

pub struct InMemoryCargoSource {
    jobs: DashMap<String, Job>,
}

impl InMemoryCargoSource {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Result<Self, SourceError> {
        let source = Self::new();
        for job in jobs {
            source.insert(job)?;
        }
        Ok(source)
    }

    pub fn insert(&self, job: Job) -> Result<(), SourceError> {
        job.validate().map_err(|reason| SourceError::InvalidData {
            source_name: CARGO_SOURCE,
            reason,
        })?;
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for InMemoryCargoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CargoSource for InMemoryCargoSource {
    async fn list_open_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SourceError> {
        let now = Utc::now();
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value(), now))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, SourceError> {
        Ok(self.jobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<bool, SourceError> {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                job.status = status;
                debug!(job_id = id, ?status, "job status updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition_job_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, SourceError> {
        let Some(mut job) = self.jobs.get_mut(id) else {
            return Ok(false);
        };
        if job.status != from {
            return Ok(false);
        }

        job.status = to;
        debug!(job_id = id, ?from, ?to, "job status transitioned");
        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignedLoad {
    pub job_id: String,
    pub weight_kg: f64,
}

/// Vehicles plus a per-vehicle ledger of active loads.
///
/// A vehicle without a ledger entry has no live capacity figure.
pub struct InMemoryFleet {
    vehicles: DashMap<String, Vehicle>,
    loads: DashMap<String, Vec<AssignedLoad>>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            loads: DashMap::new(),
        }
    }

    pub fn insert(&self, vehicle: Vehicle) -> Result<(), SourceError> {
        vehicle.validate().map_err(|reason| SourceError::InvalidData {
            source_name: FLEET_SOURCE,
            reason,
        })?;
        self.vehicles.insert(vehicle.id.clone(), vehicle);
        Ok(())
    }

    /// Inserts a vehicle and opens its load ledger with `loaded_kg` already on board.
    pub fn insert_tracked(&self, vehicle: Vehicle, loaded_kg: f64) -> Result<(), SourceError> {
        let id = vehicle.id.clone();
        self.insert(vehicle)?;

        let ledger = if loaded_kg > 0.0 {
            vec![AssignedLoad {
                job_id: "preloaded".to_string(),
                weight_kg: loaded_kg,
            }]
        } else {
            Vec::new()
        };
        self.loads.insert(id, ledger);
        Ok(())
    }

    pub fn loads(&self, id: &str) -> Option<Vec<AssignedLoad>> {
        self.loads.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl Default for InMemoryFleet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSource for InMemoryFleet {
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Vehicle>, SourceError> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(vehicles)
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Vehicle>, SourceError> {
        Ok(self.vehicles.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_available_capacity(&self, id: &str) -> Result<Option<f64>, SourceError> {
        let Some(vehicle) = self.vehicles.get(id) else {
            return Ok(None);
        };
        let Some(ledger) = self.loads.get(id) else {
            return Ok(None);
        };

        let assigned: f64 = ledger.iter().map(|load| load.weight_kg).sum();
        Ok(Some((vehicle.max_capacity_kg - assigned).max(0.0)))
    }

    async fn update_position(&self, id: &str, position: GeoPoint) -> Result<bool, SourceError> {
        match self.vehicles.get_mut(id) {
            Some(mut vehicle) => {
                vehicle.position = Some(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn assign_job(
        &self,
        id: &str,
        job_id: &str,
        weight_kg: f64,
    ) -> Result<bool, SourceError> {
        let Some(mut vehicle) = self.vehicles.get_mut(id) else {
            return Ok(false);
        };

        if vehicle.status == VehicleStatus::Idle {
            vehicle.status = VehicleStatus::Assigned;
        }

        self.loads.entry(id.to_string()).or_default().push(AssignedLoad {
            job_id: job_id.to_string(),
            weight_kg,
        });
        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedVehicle {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    /// Present when the telematics feed reports a load; opens the ledger.
    #[serde(default)]
    pub loaded_kg: Option<f64>,
}

/// JSON snapshot used to populate the in-memory sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub vehicles: Vec<SeedVehicle>,
}

impl FleetSnapshot {
    pub async fn load(path: &Path) -> Result<Self, SourceError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SourceError::Unavailable {
                source_name: "seed file",
                reason: format!("{}: {err}", path.display()),
            })?;

        serde_json::from_str(&raw).map_err(|err| SourceError::InvalidData {
            source_name: "seed file",
            reason: format!("{}: {err}", path.display()),
        })
    }

    pub fn into_sources(self) -> Result<(InMemoryCargoSource, InMemoryFleet), SourceError> {
        let cargo = InMemoryCargoSource::with_jobs(self.jobs)?;
        let fleet = InMemoryFleet::new();
        for seed in self.vehicles {
            match seed.loaded_kg {
                Some(loaded_kg) => fleet.insert_tracked(seed.vehicle, loaded_kg)?,
                None => fleet.insert(seed.vehicle)?,
            }
        }

        info!(jobs = cargo.len(), vehicles = fleet.len(), "fleet snapshot loaded");
        Ok((cargo, fleet))
    }
}
