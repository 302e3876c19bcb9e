mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use fleet_matcher::config::DispatchConfig;
use fleet_matcher::engine::matching::MatchingEngine;
use fleet_matcher::engine::response::ResponseGenerator;
use fleet_matcher::error::{AppError, SourceError};
use fleet_matcher::models::job::{Job, JobStatus};
use fleet_matcher::models::vehicle::{Vehicle, VehicleStatus};
use fleet_matcher::models::GeoPoint;
use fleet_matcher::observability::metrics::Metrics;
use fleet_matcher::sources::memory::{InMemoryCargoSource, InMemoryFleet};
use fleet_matcher::sources::{CargoSource, JobFilter, ResourceFilter, ResourceSource};

use common::{job, provider, vehicle};

struct Fixture {
    cargo: Arc<InMemoryCargoSource>,
    fleet: Arc<InMemoryFleet>,
    engine: MatchingEngine,
}

fn fixture(config: DispatchConfig) -> Fixture {
    let cargo = Arc::new(InMemoryCargoSource::new());
    let fleet = Arc::new(InMemoryFleet::new());
    let dyn_cargo: Arc<dyn CargoSource> = cargo.clone();
    let dyn_fleet: Arc<dyn ResourceSource> = fleet.clone();

    Fixture {
        engine: MatchingEngine::new(dyn_cargo, dyn_fleet, provider(config), Metrics::new()),
        cargo,
        fleet,
    }
}

/// Ten jobs with spread deadlines and prices against five idle trucks.
fn ten_by_five() -> Fixture {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());

    for i in 0..10_i64 {
        let id = format!("job-{i:02}");
        let weight = 1_000.0 + i as f64 * 400.0;
        let price = 700.0 + i as f64 * 150.0;
        let deadline_hours = 10 + i * 12;
        fx.cargo.insert(job(&id, weight, price, deadline_hours, now)).unwrap();
    }
    for (i, km) in [2.0, 6.0, 11.0, 25.0, 45.0].iter().enumerate() {
        fx.fleet
            .insert(vehicle(&format!("v{i}"), *km, 12_000.0))
            .unwrap();
    }
    fx
}

#[tokio::test]
async fn best_matches_returns_exactly_the_limit_in_rank_order() {
    let fx = ten_by_five();
    let now = Utc::now();

    let matches = fx.engine.find_best_matches_at(3, now).await.unwrap();

    assert_eq!(matches.len(), 3);
    for pair in matches.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.score >= b.score);
        if a.score == b.score {
            assert!(a.breakdown.distance_to_pickup_km <= b.breakdown.distance_to_pickup_km);
        }
    }
    assert!(matches.iter().all(|m| m.score >= 60.0 && m.capacity_match));
}

#[tokio::test]
async fn best_matches_are_deterministic_for_a_fixed_snapshot() {
    let fx = ten_by_five();
    let now = Utc::now();

    let first = fx.engine.find_best_matches_at(20, now).await.unwrap();
    let second = fx.engine.find_best_matches_at(20, now).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn min_score_threshold_filters_proposals() {
    let now = Utc::now();
    let mut strict = DispatchConfig::default();
    strict.min_score_threshold = 99.9;
    let fx = fixture(strict);
    fx.cargo.insert(job("slow", 1_000.0, 150.0, 200, now)).unwrap();
    fx.fleet.insert(vehicle("v1", 40.0, 10_000.0)).unwrap();

    let matches = fx.engine.find_best_matches_at(10, now).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn no_candidates_is_an_empty_success() {
    let fx = fixture(DispatchConfig::default());
    let matches = fx.engine.find_best_matches(5).await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(
        ResponseGenerator::new().summarize(&matches).headline,
        "No suitable matches found."
    );
}

#[tokio::test]
async fn undersized_vehicle_is_never_proposed() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("heavy", 5_000.0, 1_000.0, 20, now)).unwrap();
    fx.fleet.insert(vehicle("small", 1.0, 3_000.0)).unwrap();
    fx.fleet.insert(vehicle("big", 15.0, 7_000.0)).unwrap();

    let matches = fx.engine.find_best_matches_at(10, now).await.unwrap();
    let vehicles: Vec<&str> = matches.iter().map(|m| m.vehicle_id.as_str()).collect();
    assert_eq!(vehicles, vec!["big"]);
    assert_eq!(matches[0].breakdown.urgency_score, 100.0);
}

struct FailingCargo;

#[async_trait]
impl CargoSource for FailingCargo {
    async fn list_open_jobs(&self, _filter: &JobFilter) -> Result<Vec<Job>, SourceError> {
        Err(SourceError::Unavailable {
            source_name: "cargo db",
            reason: "connection refused".to_string(),
        })
    }

    async fn get_job(&self, _id: &str) -> Result<Option<Job>, SourceError> {
        Err(SourceError::Unavailable {
            source_name: "cargo db",
            reason: "connection refused".to_string(),
        })
    }

    async fn set_job_status(&self, _id: &str, _status: JobStatus) -> Result<bool, SourceError> {
        Ok(false)
    }

    async fn transition_job_status(
        &self,
        _id: &str,
        _from: JobStatus,
        _to: JobStatus,
    ) -> Result<bool, SourceError> {
        Ok(false)
    }
}

struct SlowCargo {
    delay: StdDuration,
}

#[async_trait]
impl CargoSource for SlowCargo {
    async fn list_open_jobs(&self, _filter: &JobFilter) -> Result<Vec<Job>, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn get_job(&self, _id: &str) -> Result<Option<Job>, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn set_job_status(&self, _id: &str, _status: JobStatus) -> Result<bool, SourceError> {
        Ok(false)
    }

    async fn transition_job_status(
        &self,
        _id: &str,
        _from: JobStatus,
        _to: JobStatus,
    ) -> Result<bool, SourceError> {
        Ok(false)
    }
}

#[tokio::test]
async fn upstream_failure_is_not_reported_as_empty() {
    let fleet: Arc<dyn ResourceSource> = Arc::new(InMemoryFleet::new());
    let engine = MatchingEngine::new(
        Arc::new(FailingCargo),
        fleet,
        provider(DispatchConfig::default()),
        Metrics::new(),
    );

    let err = engine.find_best_matches(5).await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn slow_sources_hit_the_calculation_timeout() {
    let mut config = DispatchConfig::default();
    config.calculation_timeout = StdDuration::from_millis(50);

    let fleet: Arc<dyn ResourceSource> = Arc::new(InMemoryFleet::new());
    let engine = MatchingEngine::new(
        Arc::new(SlowCargo {
            delay: StdDuration::from_millis(500),
        }),
        fleet,
        provider(config),
        Metrics::new(),
    );

    let err = engine.find_best_matches(5).await.unwrap_err();
    assert!(matches!(err, AppError::ComputationTimeout(_)));
}

#[tokio::test]
async fn vehicle_query_ranks_jobs_for_that_vehicle() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("urgent", 2_000.0, 1_200.0, 12, now)).unwrap();
    fx.cargo.insert(job("relaxed", 2_000.0, 1_200.0, 120, now)).unwrap();
    fx.cargo.insert(job("too-heavy", 20_000.0, 3_000.0, 12, now)).unwrap();
    fx.fleet.insert(vehicle("v1", 4.0, 8_000.0)).unwrap();

    let matches = fx
        .engine
        .find_matches_for_vehicle_at("v1", 10, now)
        .await
        .unwrap();
    let jobs: Vec<&str> = matches.iter().map(|m| m.job_id.as_str()).collect();
    assert_eq!(jobs, vec!["urgent", "relaxed"]);
    assert!(matches.iter().all(|m| m.vehicle_id == "v1"));
}

#[tokio::test]
async fn vehicle_query_for_unknown_or_unavailable_vehicle_is_empty() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 12, now)).unwrap();
    let mut broken = vehicle("broken", 1.0, 8_000.0);
    broken.status = VehicleStatus::Maintenance;
    fx.fleet.insert(broken).unwrap();

    assert!(fx.engine.find_matches_for_vehicle("ghost", 5).await.unwrap().is_empty());
    assert!(fx.engine.find_matches_for_vehicle("broken", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn job_query_ranks_vehicles_for_that_job() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    fx.fleet.insert(vehicle("far", 70.0, 8_000.0)).unwrap();
    fx.fleet.insert(vehicle("near", 3.0, 8_000.0)).unwrap();

    let matches = fx.engine.find_matches_for_job_at("j1", 5, now).await.unwrap();
    assert_eq!(matches[0].vehicle_id, "near");
    assert!(fx.engine.find_matches_for_job("ghost", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn evaluating_a_weaker_pair_suggests_the_better_vehicle() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    fx.fleet.insert(vehicle("far", 60.0, 8_000.0)).unwrap();
    fx.fleet.insert(vehicle("near", 3.0, 8_000.0)).unwrap();

    let evaluation = fx.engine.evaluate_pair_at("j1", "far", now).await.unwrap();
    let better = evaluation.better_match.expect("near vehicle should win");
    assert_eq!(better.vehicle_id, "near");
    assert!(better.score > evaluation.requested.score);

    let best = fx.engine.evaluate_pair_at("j1", "near", now).await.unwrap();
    assert!(best.better_match.is_none());
}

#[tokio::test]
async fn evaluating_an_undersized_pair_scores_zero() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 5_000.0, 1_000.0, 20, now)).unwrap();
    fx.fleet.insert(vehicle("small", 2.0, 3_000.0)).unwrap();

    let evaluation = fx.engine.evaluate_pair_at("j1", "small", now).await.unwrap();
    assert_eq!(evaluation.requested.score, 0.0);
    assert!(!evaluation.requested.capacity_match);
}

#[tokio::test]
async fn evaluating_unknown_entities_is_not_found() {
    let fx = fixture(DispatchConfig::default());
    fx.fleet.insert(vehicle("v1", 2.0, 3_000.0)).unwrap();

    let err = fx.engine.evaluate_pair("ghost", "v1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn accepting_a_match_updates_both_collaborators() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    fx.fleet
        .insert_tracked(vehicle("v1", 3.0, 8_000.0), 0.0)
        .unwrap();

    let receipt = fx.engine.accept_match("j1", "v1").await.unwrap();
    assert_eq!(receipt.job_id, "j1");
    assert!(receipt.score > 0.0);

    let job = fx.cargo.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Assigned);
    assert_eq!(
        fx.fleet.get_available_capacity("v1").await.unwrap(),
        Some(6_000.0)
    );
    let vehicle = fx.fleet.get_resource("v1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Assigned);

    assert!(fx.engine.find_best_matches(10).await.unwrap().is_empty());

    let err = fx.engine.accept_match("j1", "v1").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn urgent_vehicle_lookup_respects_the_deadline_window() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 1_000.0, 900.0, 30, now)).unwrap();
    fx.fleet.insert(vehicle("distant", 150.0, 8_000.0)).unwrap();

    let found = fx.engine.find_urgent_vehicle("j1", Some(3.0)).await.unwrap();
    assert_eq!(found.map(|m| m.vehicle_id), Some("distant".to_string()));

    let none = fx.engine.find_urgent_vehicle("j1", Some(1.0)).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn utilization_reports_active_share() {
    let fx = fixture(DispatchConfig::default());
    let mut moving = vehicle("moving", 1.0, 8_000.0);
    moving.status = VehicleStatus::InTransit;
    fx.fleet.insert(moving).unwrap();
    fx.fleet.insert(vehicle("parked", 1.0, 8_000.0)).unwrap();

    let utilization = fx.engine.fleet_utilization().await.unwrap();
    assert_eq!(utilization.total_vehicles, 2);
    assert_eq!(utilization.utilization_rate, 50.0);
    assert_eq!(utilization.top_performers, vec!["moving".to_string()]);
    assert_eq!(utilization.underutilized, vec!["parked".to_string()]);
}

#[tokio::test]
async fn out_of_service_vehicles_are_never_assigned() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();

    let mut broken = vehicle("broken", 3.0, 8_000.0);
    broken.status = VehicleStatus::Maintenance;
    fx.fleet.insert(broken).unwrap();
    let mut dark = vehicle("dark", 3.0, 8_000.0);
    dark.gps_enabled = false;
    fx.fleet.insert(dark).unwrap();
    fx.fleet.insert(vehicle("distant", 150.0, 8_000.0)).unwrap();

    for (vehicle_id, reason) in [
        ("broken", "not dispatchable"),
        ("dark", "GPS tracking disabled"),
        ("distant", "search radius"),
    ] {
        match fx.engine.accept_match("j1", vehicle_id).await {
            Err(AppError::BadRequest(message)) => {
                assert!(message.contains(reason), "{vehicle_id}: {message}")
            }
            other => panic!("{vehicle_id}: expected rejection, got {other:?}"),
        }
        assert!(fx.fleet.loads(vehicle_id).is_none());
    }

    let job = fx.cargo.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Active);
    let broken = fx.fleet.get_resource("broken").await.unwrap().unwrap();
    assert_eq!(broken.status, VehicleStatus::Maintenance);
}

#[tokio::test]
async fn evaluating_an_unavailable_vehicle_is_not_proposable() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    let mut broken = vehicle("broken", 3.0, 8_000.0);
    broken.status = VehicleStatus::Maintenance;
    fx.fleet.insert(broken).unwrap();
    fx.fleet.insert(vehicle("spare", 20.0, 8_000.0)).unwrap();

    let evaluation = fx.engine.evaluate_pair_at("j1", "broken", now).await.unwrap();
    assert!(!evaluation.proposable);
    assert!(!evaluation.requested.auto_assign_eligible);
    assert!(
        evaluation
            .rejection_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("Maintenance"))
    );
    let better = evaluation.better_match.expect("spare vehicle is proposable");
    assert_eq!(better.vehicle_id, "spare");

    let good = fx.engine.evaluate_pair_at("j1", "spare", now).await.unwrap();
    assert!(good.proposable);
    assert!(good.rejection_reason.is_none());
}

/// Fleet whose assignment write always fails.
struct ReadOnlyFleet {
    inner: InMemoryFleet,
}

#[async_trait]
impl ResourceSource for ReadOnlyFleet {
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Vehicle>, SourceError> {
        self.inner.list_resources(filter).await
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Vehicle>, SourceError> {
        self.inner.get_resource(id).await
    }

    async fn get_available_capacity(&self, id: &str) -> Result<Option<f64>, SourceError> {
        self.inner.get_available_capacity(id).await
    }

    async fn update_position(&self, id: &str, position: GeoPoint) -> Result<bool, SourceError> {
        self.inner.update_position(id, position).await
    }

    async fn assign_job(
        &self,
        _id: &str,
        _job_id: &str,
        _weight_kg: f64,
    ) -> Result<bool, SourceError> {
        Err(SourceError::Unavailable {
            source_name: "telematics",
            reason: "write rejected".to_string(),
        })
    }
}

#[tokio::test]
async fn failed_vehicle_assignment_releases_the_job() {
    let now = Utc::now();
    let cargo = Arc::new(InMemoryCargoSource::new());
    cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    let fleet = ReadOnlyFleet {
        inner: InMemoryFleet::new(),
    };
    fleet.inner.insert(vehicle("v1", 3.0, 8_000.0)).unwrap();

    let dyn_cargo: Arc<dyn CargoSource> = cargo.clone();
    let engine = MatchingEngine::new(
        dyn_cargo,
        Arc::new(fleet),
        provider(DispatchConfig::default()),
        Metrics::new(),
    );

    let err = engine.accept_match("j1", "v1").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));

    let job = cargo.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Active);
    let proposals = engine.find_best_matches(5).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].job_id, "j1");
}

#[tokio::test]
async fn concurrent_accepts_assign_the_job_once() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 2_000.0, 1_200.0, 30, now)).unwrap();
    fx.fleet
        .insert_tracked(vehicle("a", 3.0, 8_000.0), 0.0)
        .unwrap();
    fx.fleet
        .insert_tracked(vehicle("b", 4.0, 8_000.0), 0.0)
        .unwrap();

    let (first, second) = tokio::join!(
        fx.engine.accept_match("j1", "a"),
        fx.engine.accept_match("j1", "b"),
    );

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loads = [fx.fleet.loads("a").unwrap(), fx.fleet.loads("b").unwrap()];
    assert_eq!(loads.iter().map(Vec::len).sum::<usize>(), 1);
}

#[tokio::test]
async fn urgent_vehicle_lookup_uses_the_given_clock() {
    let now = Utc::now();
    let fx = fixture(DispatchConfig::default());
    fx.cargo.insert(job("j1", 1_000.0, 900.0, 30, now)).unwrap();
    fx.fleet.insert(vehicle("distant", 150.0, 8_000.0)).unwrap();

    let early = fx
        .engine
        .find_urgent_vehicle_at("j1", None, now)
        .await
        .unwrap();
    assert_eq!(early.map(|m| m.vehicle_id), Some("distant".to_string()));

    let late = fx
        .engine
        .find_urgent_vehicle_at("j1", None, now + chrono::Duration::hours(29))
        .await
        .unwrap();
    assert!(late.is_none());

    let expired = fx
        .engine
        .find_urgent_vehicle_at("j1", None, now + chrono::Duration::hours(31))
        .await
        .unwrap();
    assert!(expired.is_none());
}

#[tokio::test]
async fn single_job_lookups_honour_the_calculation_timeout() {
    let mut config = DispatchConfig::default();
    config.calculation_timeout = StdDuration::from_millis(50);

    let fleet: Arc<dyn ResourceSource> = Arc::new(InMemoryFleet::new());
    let engine = MatchingEngine::new(
        Arc::new(SlowCargo {
            delay: StdDuration::from_millis(500),
        }),
        fleet,
        provider(config),
        Metrics::new(),
    );

    let err = engine.find_urgent_vehicle("j1", Some(2.0)).await.unwrap_err();
    assert!(matches!(err, AppError::ComputationTimeout(_)));
    let err = engine.analyze_job("j1").await.unwrap_err();
    assert!(matches!(err, AppError::ComputationTimeout(_)));
}
