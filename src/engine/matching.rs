use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigProvider, DispatchConfig};
use crate::engine::cargo_analyzer::CargoAnalyzer;
use crate::engine::fleet::{FleetManager, ResourceCandidate, ResourceMatcher};
use crate::engine::scoring::{compare_matches, ScoringSystem};
use crate::error::AppError;
use crate::geo::resolve_point;
use crate::models::job::{Job, JobStatus};
use crate::models::matching::{
    AssignmentReceipt, CargoAnalysis, FleetUtilization, Match, PairEvaluation, ResourceMatch,
};
use crate::observability::metrics::Metrics;
use crate::sources::{CargoSource, JobFilter, ResourceSource};

/// One config snapshot's worth of analyzer, matcher and scorer.
struct Scan {
    config: Arc<DispatchConfig>,
    analyzer: CargoAnalyzer,
    matcher: ResourceMatcher,
    scoring: ScoringSystem,
    now: DateTime<Utc>,
    deadline: Instant,
    pairs_scored: usize,
}

impl Scan {
    fn new(config: Arc<DispatchConfig>, now: DateTime<Utc>, started: Instant) -> Self {
        Self {
            analyzer: CargoAnalyzer::new(config.clone()),
            matcher: ResourceMatcher::new(config.clone()),
            scoring: ScoringSystem::new(config.clone()),
            deadline: started + config.calculation_timeout,
            config,
            now,
            pairs_scored: 0,
        }
    }

    fn check_deadline(&self) -> Result<(), AppError> {
        if Instant::now() >= self.deadline {
            return Err(AppError::ComputationTimeout(self.config.calculation_timeout));
        }
        Ok(())
    }

    fn is_proposable(&self, m: &Match) -> bool {
        m.capacity_match && m.score >= self.config.min_score_threshold
    }

    /// First hard constraint a named pair violates, if any.
    fn blocker(&self, candidate: &ResourceCandidate, resource: &ResourceMatch) -> Option<String> {
        let vehicle = &candidate.vehicle;
        let radius = self.config.fleet.search_radius_km;

        if !vehicle.status.is_dispatchable() {
            Some(format!(
                "vehicle {} is {:?}, not dispatchable",
                vehicle.id, vehicle.status
            ))
        } else if !vehicle.gps_enabled {
            Some(format!("vehicle {} has GPS tracking disabled", vehicle.id))
        } else if !self.matcher.is_available(candidate) {
            Some(format!(
                "vehicle {} has less than the minimum free capacity",
                vehicle.id
            ))
        } else if !resource.capacity_match {
            Some(format!(
                "vehicle {} lacks capacity ({:.0} kg available)",
                vehicle.id, resource.available_capacity_kg
            ))
        } else if resource.distance_km > radius {
            Some(format!(
                "vehicle {} is {:.1} km from pickup, beyond the {radius:.0} km search radius",
                vehicle.id, resource.distance_km
            ))
        } else {
            None
        }
    }

    /// Every vehicle in range with enough capacity for `job`, scored.
    fn score_job(&mut self, job: &Job, candidates: &[ResourceCandidate]) -> Vec<Match> {
        let Some(pickup) = resolve_point(&job.origin) else {
            debug!(job_id = %job.id, "job has no resolvable pickup location");
            return Vec::new();
        };

        let analysis = self.analyzer.analyze_cargo(job, self.now);
        let nearest = self.matcher.find_nearest_resources(
            candidates,
            &pickup,
            job.weight_kg,
            self.config.fleet.search_radius_km,
        );
        self.pairs_scored += nearest.len();

        nearest
            .iter()
            .map(|resource| self.scoring.score_match(job, &analysis, resource))
            .collect()
    }

    fn best_matches(
        &mut self,
        jobs: &[Job],
        candidates: &[ResourceCandidate],
        limit: usize,
    ) -> Result<Vec<Match>, AppError> {
        let mut matches = Vec::new();
        for job in jobs {
            self.check_deadline()?;
            let scored = self.score_job(job, candidates);
            matches.extend(scored.into_iter().filter(|m| self.is_proposable(m)));
        }

        matches.sort_by(compare_matches);
        matches.truncate(limit);
        Ok(matches)
    }

    fn matches_for_vehicle(
        &mut self,
        candidate: &ResourceCandidate,
        jobs: &[Job],
        limit: usize,
    ) -> Result<Vec<Match>, AppError> {
        let mut matches = Vec::new();
        for job in jobs {
            self.check_deadline()?;
            let Some(pickup) = resolve_point(&job.origin) else {
                continue;
            };
            let Some(resource) = self.matcher.evaluate(candidate, &pickup, job.weight_kg) else {
                continue;
            };
            if !resource.capacity_match || resource.distance_km > self.config.fleet.search_radius_km
            {
                continue;
            }

            self.pairs_scored += 1;
            let analysis = self.analyzer.analyze_cargo(job, self.now);
            let scored = self.scoring.score_match(job, &analysis, &resource);
            if self.is_proposable(&scored) {
                matches.push(scored);
            }
        }

        matches.sort_by(compare_matches);
        matches.truncate(limit);
        Ok(matches)
    }
}

/// A named pair after scoring, with the job kept for the write path.
struct PairAssessment {
    job: Job,
    evaluation: PairEvaluation,
    /// Hard constraint the pair violates. Such a pair is never assigned.
    blocker: Option<String>,
}

/// Orchestrates sources, analyzer, matcher and scorer into ranked proposals.
///
/// Produces `proposed` matches only; applying one is [`MatchingEngine::accept_match`],
/// which just signals the transition to the collaborators.
pub struct MatchingEngine {
    cargo: Arc<dyn CargoSource>,
    resources: Arc<dyn ResourceSource>,
    fleet: FleetManager,
    config: Arc<ConfigProvider>,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new(
        cargo: Arc<dyn CargoSource>,
        resources: Arc<dyn ResourceSource>,
        config: Arc<ConfigProvider>,
        metrics: Metrics,
    ) -> Self {
        Self {
            fleet: FleetManager::new(resources.clone(), config.clone()),
            cargo,
            resources,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &Arc<ConfigProvider> {
        &self.config
    }

    pub fn fleet(&self) -> &FleetManager {
        &self.fleet
    }

    /// Applies the calculation timeout and records the outcome.
    async fn observe<T, F>(
        &self,
        operation: &'static str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ComputationTimeout(timeout)),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::ComputationTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        self.metrics
            .record_run(operation, outcome, start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            warn!(
                operation,
                error = %err,
                retryable = err.is_retryable(),
                "matching operation failed"
            );
        }
        result
    }

    pub async fn find_best_matches(&self, limit: usize) -> Result<Vec<Match>, AppError> {
        self.find_best_matches_at(limit, Utc::now()).await
    }

    /// Top `limit` proposals across all open jobs and available vehicles.
    #[instrument(skip(self))]
    pub async fn find_best_matches_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Match>, AppError> {
        let config = self.config.get();
        let started = Instant::now();
        let open = JobFilter::open();

        self.observe("best_matches", config.calculation_timeout, async {
            let (jobs, candidates) = tokio::try_join!(
                self.cargo.list_open_jobs(&open),
                self.fleet.get_available_resources(),
            )?;

            let mut scan = Scan::new(config.clone(), now, started);
            let matches = scan.best_matches(&jobs, &candidates, limit)?;
            self.metrics
                .match_candidates_evaluated
                .set(scan.pairs_scored as i64);

            info!(
                jobs = jobs.len(),
                vehicles = candidates.len(),
                pairs = scan.pairs_scored,
                returned = matches.len(),
                "best matches computed"
            );
            Ok(matches)
        })
        .await
    }

    pub async fn find_matches_for_vehicle(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> Result<Vec<Match>, AppError> {
        self.find_matches_for_vehicle_at(vehicle_id, limit, Utc::now())
            .await
    }

    /// Best jobs for one vehicle. Unknown or unavailable vehicles yield no matches.
    #[instrument(skip(self))]
    pub async fn find_matches_for_vehicle_at(
        &self,
        vehicle_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Match>, AppError> {
        let config = self.config.get();
        let started = Instant::now();
        let open = JobFilter::open();

        self.observe("vehicle_matches", config.calculation_timeout, async {
            let (candidate, jobs) = tokio::try_join!(
                self.fleet.get_candidate(vehicle_id),
                self.cargo.list_open_jobs(&open),
            )?;

            let mut scan = Scan::new(config.clone(), now, started);
            let Some(candidate) = candidate else {
                debug!(vehicle_id, "vehicle not found");
                return Ok(Vec::new());
            };
            if !scan.matcher.is_available(&candidate) {
                debug!(vehicle_id, status = ?candidate.vehicle.status, "vehicle not available");
                return Ok(Vec::new());
            }

            scan.matches_for_vehicle(&candidate, &jobs, limit)
        })
        .await
    }

    pub async fn find_matches_for_job(
        &self,
        job_id: &str,
        limit: usize,
    ) -> Result<Vec<Match>, AppError> {
        self.find_matches_for_job_at(job_id, limit, Utc::now()).await
    }

    /// Best vehicles for one job. Unknown jobs yield no matches.
    #[instrument(skip(self))]
    pub async fn find_matches_for_job_at(
        &self,
        job_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Match>, AppError> {
        let config = self.config.get();
        let started = Instant::now();

        self.observe("job_matches", config.calculation_timeout, async {
            let (job, candidates) = tokio::try_join!(
                self.cargo.get_job(job_id),
                self.fleet.get_available_resources(),
            )?;

            let Some(job) = job else {
                debug!(job_id, "job not found");
                return Ok(Vec::new());
            };

            let mut scan = Scan::new(config.clone(), now, started);
            scan.best_matches(std::slice::from_ref(&job), &candidates, limit)
        })
        .await
    }

    pub async fn analyze_job(&self, job_id: &str) -> Result<Option<CargoAnalysis>, AppError> {
        self.analyze_job_at(job_id, Utc::now()).await
    }

    pub async fn analyze_job_at(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CargoAnalysis>, AppError> {
        let config = self.config.get();

        self.observe("analyze_job", config.calculation_timeout, async {
            let job = self.cargo.get_job(job_id).await?;
            let analyzer = CargoAnalyzer::new(config.clone());
            Ok(job.map(|job| analyzer.analyze_cargo(&job, now)))
        })
        .await
    }

    /// Fetches and scores a named pair. Both entities must exist.
    async fn assess_pair(
        &self,
        job_id: &str,
        vehicle_id: &str,
        now: DateTime<Utc>,
        config: Arc<DispatchConfig>,
        started: Instant,
    ) -> Result<PairAssessment, AppError> {
        let (job, candidate, candidates) = tokio::try_join!(
            self.cargo.get_job(job_id),
            self.fleet.get_candidate(vehicle_id),
            self.fleet.get_available_resources(),
        )?;

        let job = job.ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
        let candidate = candidate
            .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))?;

        let pickup = resolve_point(&job.origin).ok_or_else(|| {
            AppError::BadRequest(format!("job {job_id} has no resolvable pickup location"))
        })?;

        let mut scan = Scan::new(config, now, started);
        let resource = scan
            .matcher
            .evaluate(&candidate, &pickup, job.weight_kg)
            .ok_or_else(|| {
                AppError::BadRequest(format!("vehicle {vehicle_id} has no known position"))
            })?;

        let analysis = scan.analyzer.analyze_cargo(&job, now);
        let mut requested = scan.scoring.score_match(&job, &analysis, &resource);

        let blocker = scan.blocker(&candidate, &resource);
        let rejection_reason = blocker.clone().or_else(|| {
            (!scan.is_proposable(&requested)).then(|| {
                format!(
                    "score {:.1} is below the minimum of {:.1}",
                    requested.score, scan.config.min_score_threshold
                )
            })
        });
        let proposable = rejection_reason.is_none();
        if blocker.is_some() {
            requested.auto_assign_eligible = false;
        }

        let better_match = scan
            .score_job(&job, &candidates)
            .into_iter()
            .filter(|m| m.vehicle_id != requested.vehicle_id)
            .filter(|m| {
                if proposable {
                    m.score > requested.score
                } else {
                    scan.is_proposable(m)
                }
            })
            .min_by(compare_matches);

        if let Some(better) = &better_match {
            info!(
                job_id,
                requested_vehicle = vehicle_id,
                suggested_vehicle = %better.vehicle_id,
                requested_score = requested.score,
                suggested_score = better.score,
                "better match available"
            );
        }

        Ok(PairAssessment {
            job,
            evaluation: PairEvaluation {
                requested,
                proposable,
                rejection_reason,
                better_match,
            },
            blocker,
        })
    }

    pub async fn evaluate_pair(
        &self,
        job_id: &str,
        vehicle_id: &str,
    ) -> Result<PairEvaluation, AppError> {
        self.evaluate_pair_at(job_id, vehicle_id, Utc::now()).await
    }

    /// Scores a named pair and reports a better vehicle for the job, if any.
    ///
    /// Both entities must exist. Capacity, status, GPS or distance violations
    /// make the pair non-proposable, never an error.
    #[instrument(skip(self))]
    pub async fn evaluate_pair_at(
        &self,
        job_id: &str,
        vehicle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PairEvaluation, AppError> {
        let config = self.config.get();
        let started = Instant::now();

        self.observe(
            "evaluate_pair",
            config.calculation_timeout,
            self.assess_pair(job_id, vehicle_id, now, config.clone(), started),
        )
        .await
        .map(|assessment| assessment.evaluation)
    }

    /// Signals the assignment to both collaborators.
    ///
    /// The vehicle must be dispatchable, GPS-tracked, within the search radius and
    /// able to carry the load. The job is claimed with an atomic `active -> assigned`
    /// transition and released again if the vehicle side fails.
    #[instrument(skip(self))]
    pub async fn accept_match(
        &self,
        job_id: &str,
        vehicle_id: &str,
    ) -> Result<AssignmentReceipt, AppError> {
        let config = self.config.get();
        let started = Instant::now();

        let assessment = self
            .observe(
                "accept_match",
                config.calculation_timeout,
                self.assess_pair(job_id, vehicle_id, Utc::now(), config.clone(), started),
            )
            .await?;

        if let Some(reason) = assessment.blocker {
            return Err(AppError::BadRequest(reason));
        }
        let score = assessment.evaluation.requested.score;

        if !self
            .cargo
            .transition_job_status(job_id, JobStatus::Active, JobStatus::Assigned)
            .await?
        {
            return Err(AppError::BadRequest(format!(
                "job {job_id} is {:?}, not open for assignment",
                assessment.job.status
            )));
        }

        let assigned = self
            .resources
            .assign_job(vehicle_id, job_id, assessment.job.weight_kg)
            .await;
        let failure = match assigned {
            Ok(true) => None,
            Ok(false) => Some(AppError::NotFound(format!("vehicle {vehicle_id} not found"))),
            Err(err) => Some(AppError::from(err)),
        };
        if let Some(err) = failure {
            self.release_job(job_id).await;
            return Err(err);
        }

        let receipt = AssignmentReceipt {
            id: Uuid::new_v4(),
            job_id: job_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            score,
            assigned_at: Utc::now(),
        };

        info!(job_id, vehicle_id, score, "match accepted");
        Ok(receipt)
    }

    /// Puts a claimed job back to `active` after a failed vehicle assignment.
    async fn release_job(&self, job_id: &str) {
        match self
            .cargo
            .transition_job_status(job_id, JobStatus::Assigned, JobStatus::Active)
            .await
        {
            Ok(true) => info!(job_id, "job released after failed assignment"),
            Ok(false) => warn!(job_id, "job changed before it could be released"),
            Err(err) => error!(job_id, error = %err, "failed to release job"),
        }
    }

    pub async fn find_urgent_vehicle(
        &self,
        job_id: &str,
        deadline_hours: Option<f64>,
    ) -> Result<Option<ResourceMatch>, AppError> {
        self.find_urgent_vehicle_at(job_id, deadline_hours, Utc::now())
            .await
    }

    /// Closest vehicle able to reach the job's pickup in time.
    ///
    /// `deadline_hours` defaults to the time left until the job's deadline.
    #[instrument(skip(self))]
    pub async fn find_urgent_vehicle_at(
        &self,
        job_id: &str,
        deadline_hours: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Option<ResourceMatch>, AppError> {
        let config = self.config.get();

        self.observe("urgent_vehicle", config.calculation_timeout, async {
            let Some(job) = self.cargo.get_job(job_id).await? else {
                return Ok(None);
            };
            let Some(pickup) = resolve_point(&job.origin) else {
                return Ok(None);
            };

            let hours = deadline_hours.unwrap_or_else(|| job.hours_until_deadline(now));
            if hours <= 0.0 {
                return Ok(None);
            }

            Ok(self
                .fleet
                .find_urgent_resource(&pickup, job.weight_kg, hours)
                .await?)
        })
        .await
    }

    pub async fn fleet_utilization(&self) -> Result<FleetUtilization, AppError> {
        let config = self.config.get();

        self.observe("fleet_utilization", config.calculation_timeout, async {
            Ok(self.fleet.get_fleet_utilization().await?)
        })
        .await
    }
}
