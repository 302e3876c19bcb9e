use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::engine::round1;
use crate::models::job::{Job, Urgency};
use crate::models::matching::{CargoAnalysis, Match, MatchBreakdown, ResourceMatch, RiskLevel};

const PROFIT_NORMALIZATION: f64 = 1_000.0;
/// Share of a vehicle's unavailability that feeds into the pair's risk.
const AVAILABILITY_RISK_SHARE: f64 = 0.2;

/// Combines a cargo analysis and a resource match into one 0-100 score.
pub struct ScoringSystem {
    config: Arc<DispatchConfig>,
}

impl ScoringSystem {
    pub fn new(config: Arc<DispatchConfig>) -> Self {
        Self { config }
    }

    pub fn risk_level(&self, risk_score: f64) -> RiskLevel {
        let thresholds = &self.config.risk_thresholds;
        if risk_score < thresholds.low_max {
            RiskLevel::Low
        } else if risk_score < thresholds.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn proximity_score(&self, distance_km: f64) -> f64 {
        (100.0 - distance_km / self.config.fleet.search_radius_km * 100.0).clamp(0.0, 100.0)
    }

    /// Route profit less the deadhead fuel to reach the pickup.
    pub fn match_profit(&self, analysis: &CargoAnalysis, resource: &ResourceMatch) -> f64 {
        let deadhead_cost = resource.distance_km / 100.0
            * resource.fuel_consumption_l_per_100km
            * self.config.costs.fuel_price_per_liter;
        (analysis.profit_estimate - deadhead_cost).max(0.0)
    }

    pub fn score_match(
        &self,
        job: &Job,
        analysis: &CargoAnalysis,
        resource: &ResourceMatch,
    ) -> Match {
        let config = &self.config;
        let weights = &config.weights;

        let urgency_score = analysis.urgency_score;
        let proximity_score = self.proximity_score(resource.distance_km);
        let profit = self.match_profit(analysis, resource);
        let profit_score = (profit / PROFIT_NORMALIZATION * 100.0).min(100.0);
        let efficiency_score = resource.efficiency_score;

        let base = urgency_score * weights.urgency
            + proximity_score * weights.proximity
            + profit_score * weights.profit
            + efficiency_score * weights.efficiency;

        let risk_score = (analysis.risk_score
            + (100.0 - resource.availability_score) * AVAILABILITY_RISK_SHARE)
            .min(100.0);

        let capacity_fit = if resource.available_capacity_kg > 0.0 {
            (job.weight_kg / resource.available_capacity_kg * 100.0).min(100.0)
        } else {
            0.0
        };

        let score = if resource.capacity_match {
            let mut adjusted = base * (1.0 - config.risk_penalty_factor * risk_score / 100.0);
            if analysis.urgency == Urgency::High {
                adjusted += config.urgent_priority_boost;
            }
            adjusted += config.capacity_utilization_bonus * capacity_fit / 100.0;
            round1(adjusted.clamp(0.0, 100.0))
        } else {
            0.0
        };

        let profit_margin = if analysis.revenue > 0.0 {
            profit / analysis.revenue * 100.0
        } else {
            0.0
        };

        Match {
            job_id: job.id.clone(),
            vehicle_id: resource.vehicle_id.clone(),
            license_plate: resource.license_plate.clone(),
            origin_city: job.origin.city.clone(),
            destination_city: job.destination.city.clone(),
            urgency: analysis.urgency,
            score,
            estimated_profit: round1(profit),
            risk_level: self.risk_level(risk_score),
            capacity_match: resource.capacity_match,
            meets_profit_margin: profit_margin >= config.min_profit_margin,
            auto_assign_eligible: resource.capacity_match && score >= config.auto_assign_threshold,
            breakdown: MatchBreakdown {
                urgency_score,
                proximity_score: round1(proximity_score),
                profit_score: round1(profit_score),
                efficiency_score,
                risk_score: round1(risk_score),
                profit_margin: round1(profit_margin),
                distance_to_pickup_km: round1(resource.distance_km),
                estimated_duration: analysis.estimated_duration,
                capacity_fit: round1(capacity_fit),
            },
        }
    }
}

/// Score descending, then pickup distance, job id and vehicle id ascending.
pub fn compare_matches(a: &Match, b: &Match) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            a.breakdown
                .distance_to_pickup_km
                .total_cmp(&b.breakdown.distance_to_pickup_km)
        })
        .then_with(|| a.job_id.cmp(&b.job_id))
        .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
}
