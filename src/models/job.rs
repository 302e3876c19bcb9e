use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Fixed,
    Negotiable,
    PerKm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Assigned,
    Inactive,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn from_hours_remaining(hours: f64) -> Self {
        if hours < 24.0 {
            Urgency::High
        } else if hours < 72.0 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutePoint {
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// A transport request (cargo offer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    pub weight_kg: f64,
    #[serde(default)]
    pub volume_m3: Option<f64>,
    pub cargo_type: String,
    pub price: f64,
    pub price_type: PriceType,
    pub loading_date: DateTime<Utc>,
    pub delivery_date: DateTime<Utc>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub special_requirements: Vec<String>,
    pub status: JobStatus,
}

impl Job {
    /// Hard deadline when present, otherwise the delivery date.
    pub fn effective_deadline(&self) -> DateTime<Utc> {
        self.deadline.unwrap_or(self.delivery_date)
    }

    pub fn hours_until_deadline(&self, now: DateTime<Utc>) -> f64 {
        (self.effective_deadline() - now).num_seconds() as f64 / 3600.0
    }

    /// Always derived from the deadline so the tag cannot drift from the score.
    pub fn urgency(&self, now: DateTime<Utc>) -> Urgency {
        Urgency::from_hours_remaining(self.hours_until_deadline(now))
    }

    pub fn is_cross_country(&self) -> bool {
        !self
            .origin
            .country
            .trim()
            .eq_ignore_ascii_case(self.destination.country.trim())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("job id cannot be empty".to_string());
        }
        if !(self.weight_kg > 0.0) {
            return Err(format!("job {}: weight must be > 0", self.id));
        }
        if !(self.price > 0.0) {
            return Err(format!("job {}: price must be > 0", self.id));
        }
        if let Some(volume) = self.volume_m3 {
            if volume < 0.0 {
                return Err(format!("job {}: volume cannot be negative", self.id));
            }
        }
        Ok(())
    }
}
