use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::config::DispatchConfig;
use crate::engine::round1;
use crate::geo::estimate_distance_km;
use crate::models::job::{Job, PriceType, Urgency};
use crate::models::matching::CargoAnalysis;

const LOADING_BUFFER_HOURS: f64 = 2.0;
const CITY_DELIVERY_KM: f64 = 50.0;
const PROFIT_NORMALIZATION: f64 = 1_000.0;

const URGENCY_WEIGHT: f64 = 0.25;
const PROFIT_WEIGHT: f64 = 0.35;
const DIFFICULTY_WEIGHT: f64 = 0.20;
const RISK_WEIGHT: f64 = 0.20;

const SPECIAL_REQUIREMENT_KEYWORDS: [&str; 4] = ["hydraulic", "crane", "temperature", "special"];
const SPECIAL_REQUIREMENT_POINTS: f64 = 7.0;

/// Step function over hours left until the deadline.
pub fn urgency_score(hours_until_deadline: f64) -> f64 {
    if hours_until_deadline < 24.0 {
        100.0
    } else if hours_until_deadline < 48.0 {
        75.0
    } else if hours_until_deadline < 72.0 {
        50.0
    } else {
        25.0
    }
}

fn cargo_type_difficulty(cargo_type: &str) -> f64 {
    match cargo_type.trim().to_lowercase().as_str() {
        "hazardous" => 25.0,
        "refrigerated" => 20.0,
        "fragile" => 15.0,
        "electronics" => 10.0,
        "food" => 8.0,
        "general" => 0.0,
        _ => 5.0,
    }
}

fn is_high_risk_cargo(cargo_type: &str) -> bool {
    matches!(
        cargo_type.trim().to_lowercase().as_str(),
        "hazardous" | "fragile" | "electronics"
    )
}

/// Turns a raw job into vehicle-independent metrics.
pub struct CargoAnalyzer {
    config: Arc<DispatchConfig>,
}

impl CargoAnalyzer {
    pub fn new(config: Arc<DispatchConfig>) -> Self {
        Self { config }
    }

    pub fn analyze_cargo(&self, job: &Job, now: DateTime<Utc>) -> CargoAnalysis {
        let hours_left = job.hours_until_deadline(now);
        let urgency = job.urgency(now);
        let cross_country = job.is_cross_country();

        let distance_km = estimate_distance_km(&job.origin, &job.destination);
        let estimated_duration = self.estimated_duration(distance_km, cross_country);
        let urgency_score = urgency_score(hours_left);
        let difficulty_score = self.difficulty_score(job);
        let revenue = revenue(job, distance_km);
        let profit_estimate = self.profit_estimate(revenue, distance_km, estimated_duration);
        let risk_score = self.risk_score(job, distance_km, urgency, hours_left);

        let normalized_profit = (profit_estimate / PROFIT_NORMALIZATION * 100.0).min(100.0);
        let total_score = urgency_score * URGENCY_WEIGHT
            + normalized_profit * PROFIT_WEIGHT
            + (100.0 - difficulty_score) * DIFFICULTY_WEIGHT
            + (100.0 - risk_score) * RISK_WEIGHT;

        CargoAnalysis {
            job_id: job.id.clone(),
            urgency,
            urgency_score,
            distance_km: round1(distance_km),
            estimated_duration: round1(estimated_duration),
            difficulty_score,
            revenue,
            profit_estimate: round1(profit_estimate),
            risk_score,
            total_score: round1(total_score),
        }
    }

    /// Highest total score first; equal scores keep job id order.
    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    pub fn analyze_multiple_cargo(&self, jobs: &[Job], now: DateTime<Utc>) -> Vec<CargoAnalysis> {
        let mut analyses: Vec<CargoAnalysis> =
            jobs.iter().map(|job| self.analyze_cargo(job, now)).collect();

        analyses.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        analyses
    }

    /// Driving hours plus the loading buffer.
    pub fn estimated_duration(&self, distance_km: f64, cross_country: bool) -> f64 {
        let speeds = &self.config.speeds;
        let average_speed = if distance_km < CITY_DELIVERY_KM {
            speeds.city_kmh
        } else if cross_country {
            speeds.highway_kmh
        } else {
            speeds.analyzer_city_share * speeds.city_kmh
                + (1.0 - speeds.analyzer_city_share) * speeds.highway_kmh
        };

        distance_km / average_speed + LOADING_BUFFER_HOURS
    }

    pub fn difficulty_score(&self, job: &Job) -> f64 {
        let mut score = if job.weight_kg > 20_000.0 {
            30.0
        } else if job.weight_kg > 10_000.0 {
            20.0
        } else if job.weight_kg > 5_000.0 {
            10.0
        } else {
            0.0
        };

        score += cargo_type_difficulty(&job.cargo_type);

        let requirements = job.special_requirements.join(" ").to_lowercase();
        let keyword_hits = SPECIAL_REQUIREMENT_KEYWORDS
            .iter()
            .filter(|keyword| requirements.contains(*keyword))
            .count();
        score += keyword_hits as f64 * SPECIAL_REQUIREMENT_POINTS;

        score += match job.volume_m3 {
            Some(v) if v > 80.0 => 15.0,
            Some(v) if v > 50.0 => 10.0,
            Some(v) if v > 20.0 => 5.0,
            _ => 0.0,
        };

        if job.is_cross_country() {
            score += 10.0;
        }

        score.min(100.0)
    }

    /// Revenue minus fuel and driver cost, never negative.
    pub fn profit_estimate(&self, revenue: f64, distance_km: f64, duration_hours: f64) -> f64 {
        let costs = &self.config.costs;
        let fuel_cost =
            distance_km / 100.0 * costs.route_fuel_l_per_100km * costs.fuel_price_per_liter;
        let driver_cost = duration_hours * costs.driver_cost_per_hour;

        (revenue - fuel_cost - driver_cost).max(0.0)
    }

    pub fn risk_score(
        &self,
        job: &Job,
        distance_km: f64,
        urgency: Urgency,
        hours_left: f64,
    ) -> f64 {
        let mut score: f64 = if distance_km > 1_000.0 {
            20.0
        } else if distance_km > 500.0 {
            10.0
        } else if distance_km > 200.0 {
            5.0
        } else {
            0.0
        };

        score += match urgency {
            Urgency::High => 15.0,
            Urgency::Medium => 5.0,
            Urgency::Low => 0.0,
        };

        if is_high_risk_cargo(&job.cargo_type) {
            score += 20.0;
        }
        if job.price_type == PriceType::Negotiable {
            score += 10.0;
        }
        if job.is_cross_country() {
            score += 15.0;
        }

        if hours_left < 12.0 {
            score += 25.0;
        } else if hours_left < 24.0 {
            score += 15.0;
        }

        score.min(100.0)
    }
}

pub fn revenue(job: &Job, distance_km: f64) -> f64 {
    match job.price_type {
        PriceType::PerKm => job.price * distance_km,
        PriceType::Fixed | PriceType::Negotiable => job.price,
    }
}
