use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::engine::round1;
use crate::models::job::Urgency;
use crate::models::matching::{Match, RiskLevel};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchDetail {
    pub rank: usize,
    pub job_id: String,
    pub vehicle_id: String,
    pub license_plate: String,
    pub route: String,
    pub score: f64,
    pub estimated_profit: f64,
    pub risk_level: RiskLevel,
    pub urgency: Urgency,
    pub distance_to_pickup_km: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub headline: String,
    pub total_matches: usize,
    pub best_score: Option<f64>,
    pub average_score: f64,
    pub average_profit: f64,
    pub total_profit: f64,
    pub urgent_matches: usize,
    pub auto_assignable: usize,
    pub below_profit_margin: usize,
    pub risk: RiskBreakdown,
    pub details: Vec<MatchDetail>,
}

/// Read-only projection of ranked matches. Never reorders or rescores.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseGenerator;

impl ResponseGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize(&self, matches: &[Match]) -> Summary {
        let total_matches = matches.len();
        let total_profit: f64 = matches.iter().map(|m| m.estimated_profit).sum();
        let total_score: f64 = matches.iter().map(|m| m.score).sum();
        let (average_score, average_profit) = if total_matches == 0 {
            (0.0, 0.0)
        } else {
            (
                round1(total_score / total_matches as f64),
                round1(total_profit / total_matches as f64),
            )
        };

        let mut risk = RiskBreakdown::default();
        for m in matches {
            match m.risk_level {
                RiskLevel::Low => risk.low += 1,
                RiskLevel::Medium => risk.medium += 1,
                RiskLevel::High => risk.high += 1,
            }
        }

        let best_score = matches.iter().map(|m| m.score).reduce(f64::max);
        let urgent_matches = matches
            .iter()
            .filter(|m| m.urgency == Urgency::High)
            .count();

        Summary {
            headline: headline(total_matches, best_score, urgent_matches),
            total_matches,
            best_score,
            average_score,
            average_profit,
            total_profit: round1(total_profit),
            urgent_matches,
            auto_assignable: matches.iter().filter(|m| m.auto_assign_eligible).count(),
            below_profit_margin: matches.iter().filter(|m| !m.meets_profit_margin).count(),
            risk,
            details: matches
                .iter()
                .enumerate()
                .map(|(index, m)| self.detail(index + 1, m))
                .collect(),
        }
    }

    pub fn detail(&self, rank: usize, m: &Match) -> MatchDetail {
        MatchDetail {
            rank,
            job_id: m.job_id.clone(),
            vehicle_id: m.vehicle_id.clone(),
            license_plate: m.license_plate.clone(),
            route: format!("{} -> {}", m.origin_city, m.destination_city),
            score: m.score,
            estimated_profit: m.estimated_profit,
            risk_level: m.risk_level,
            urgency: m.urgency,
            distance_to_pickup_km: m.breakdown.distance_to_pickup_km,
            explanation: self.explain(m),
        }
    }

    pub fn explain(&self, m: &Match) -> String {
        let b = &m.breakdown;
        let mut parts = vec![
            format!(
                "vehicle {} is {:.1} km from pickup",
                m.license_plate, b.distance_to_pickup_km
            ),
            format!("{} urgency", urgency_label(m.urgency)),
            format!(
                "estimated profit {:.1} ({:.1}% margin)",
                m.estimated_profit, b.profit_margin
            ),
            format!("capacity fit {:.0}%", b.capacity_fit),
            format!("{} risk", risk_label(m.risk_level)),
        ];
        if !m.meets_profit_margin {
            parts.push("below target margin".to_string());
        }
        if m.auto_assign_eligible {
            parts.push("eligible for auto-assignment".to_string());
        }

        format!("Score {:.1}: {}.", m.score, parts.join("; "))
    }

    /// Plain-text rendering for chat or log output.
    pub fn render_text(&self, summary: &Summary) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", summary.headline);
        if summary.total_matches == 0 {
            return out;
        }

        let _ = writeln!(
            out,
            "Average score {:.1}, average profit {:.1}, risk low/medium/high {}/{}/{}",
            summary.average_score,
            summary.average_profit,
            summary.risk.low,
            summary.risk.medium,
            summary.risk.high
        );
        for detail in &summary.details {
            let _ = writeln!(
                out,
                "{}. {} [{}] {}",
                detail.rank, detail.route, detail.job_id, detail.explanation
            );
        }
        out
    }
}

fn headline(total: usize, best_score: Option<f64>, urgent: usize) -> String {
    match best_score {
        None => "No suitable matches found.".to_string(),
        Some(best) => format!(
            "{total} match{} found, best score {best:.1}, {urgent} urgent.",
            if total == 1 { "" } else { "es" }
        ),
    }
}

fn urgency_label(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Low => "low",
        Urgency::Medium => "medium",
        Urgency::High => "high",
    }
}

fn risk_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    }
}
