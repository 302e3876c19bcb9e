use std::env;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

const WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("scoring weights sum to {sum:.3}, expected 1.0 ± {tolerance}")]
    WeightSum { sum: f64, tolerance: f64 },

    #[error("weight {name} must be >= 0, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("{name} must be > 0, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("risk thresholds must satisfy 0 < low_max ({low_max}) < medium_max ({medium_max}) < 100")]
    RiskThresholds { low_max: f64, medium_max: f64 },

    #[error("invalid {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Process settings plus the dispatch tuning block.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub seed_path: Option<PathBuf>,
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let lookup = |key: &str| env::var(key).ok();

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            seed_path: lookup("FLEET_SEED_PATH").map(PathBuf::from),
            dispatch: DispatchConfig::from_lookup(lookup)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub urgency: f64,
    pub proximity: f64,
    pub profit: f64,
    pub efficiency: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.urgency + self.proximity + self.profit + self.efficiency
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("urgency", self.urgency),
            ("proximity", self.proximity),
            ("profit", self.profit),
            ("efficiency", self.efficiency),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum {
                sum,
                tolerance: WEIGHT_TOLERANCE,
            });
        }

        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            urgency: 0.30,
            proximity: 0.25,
            profit: 0.35,
            efficiency: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostConfig {
    pub fuel_price_per_liter: f64,
    pub driver_cost_per_hour: f64,
    /// Consumption assumed when costing a route before a vehicle is known.
    pub route_fuel_l_per_100km: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            fuel_price_per_liter: 1.65,
            driver_cost_per_hour: 25.0,
            route_fuel_l_per_100km: 35.0,
        }
    }
}

/// Route speeds. The analyzer and the fleet matcher keep separate city shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedConfig {
    pub city_kmh: f64,
    pub highway_kmh: f64,
    pub analyzer_city_share: f64,
    pub fleet_city_share: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            city_kmh: 30.0,
            highway_kmh: 80.0,
            analyzer_city_share: 0.3,
            fleet_city_share: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_max: 33.0,
            medium_max: 66.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetConfig {
    pub search_radius_km: f64,
    pub urgent_radius_km: f64,
    pub urgent_travel_fraction: f64,
    pub capacity_safety_margin: f64,
    pub min_available_capacity_kg: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 100.0,
            urgent_radius_km: 200.0,
            urgent_travel_fraction: 0.8,
            capacity_safety_margin: 0.9,
            min_available_capacity_kg: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    pub cargo: Duration,
    pub resources: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            cargo: Duration::from_secs(60),
            resources: Duration::from_secs(30),
        }
    }
}

/// Weights, costs and thresholds for the matching core.
///
/// Built once, validated, then served read-only through [`ConfigProvider`].
/// `version` is assigned by the provider and changes only on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub version: u64,
    pub costs: CostConfig,
    pub speeds: SpeedConfig,
    pub weights: ScoringWeights,
    pub risk_penalty_factor: f64,
    pub urgent_priority_boost: f64,
    pub capacity_utilization_bonus: f64,
    pub risk_thresholds: RiskThresholds,
    pub min_score_threshold: f64,
    pub max_suggestions: usize,
    /// Percent of revenue.
    pub min_profit_margin: f64,
    pub fleet: FleetConfig,
    pub cache_ttl: CacheTtls,
    pub calculation_timeout: Duration,
    /// Documented for callers; the core only flags matches above it.
    pub auto_assign_threshold: f64,
    pub auto_accept_threshold: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            version: 0,
            costs: CostConfig::default(),
            speeds: SpeedConfig::default(),
            weights: ScoringWeights::default(),
            risk_penalty_factor: 0.15,
            urgent_priority_boost: 5.0,
            capacity_utilization_bonus: 5.0,
            risk_thresholds: RiskThresholds::default(),
            min_score_threshold: 60.0,
            max_suggestions: 10,
            min_profit_margin: 15.0,
            fleet: FleetConfig::default(),
            cache_ttl: CacheTtls::default(),
            calculation_timeout: Duration::from_secs(30),
            auto_assign_threshold: 90.0,
            auto_accept_threshold: 95.0,
        }
    }
}

impl DispatchConfig {
    /// Applies overrides from `lookup` on top of the defaults. Does not validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            costs: CostConfig {
                fuel_price_per_liter: parse_or_default(
                    &lookup,
                    "DISPATCH_FUEL_PRICE",
                    defaults.costs.fuel_price_per_liter,
                )?,
                driver_cost_per_hour: parse_or_default(
                    &lookup,
                    "DISPATCH_DRIVER_RATE",
                    defaults.costs.driver_cost_per_hour,
                )?,
                ..defaults.costs
            },
            weights: ScoringWeights {
                urgency: parse_or_default(
                    &lookup,
                    "DISPATCH_WEIGHT_URGENCY",
                    defaults.weights.urgency,
                )?,
                proximity: parse_or_default(
                    &lookup,
                    "DISPATCH_WEIGHT_PROXIMITY",
                    defaults.weights.proximity,
                )?,
                profit: parse_or_default(
                    &lookup,
                    "DISPATCH_WEIGHT_PROFIT",
                    defaults.weights.profit,
                )?,
                efficiency: parse_or_default(
                    &lookup,
                    "DISPATCH_WEIGHT_EFFICIENCY",
                    defaults.weights.efficiency,
                )?,
            },
            min_score_threshold: parse_or_default(
                &lookup,
                "DISPATCH_MIN_SCORE",
                defaults.min_score_threshold,
            )?,
            max_suggestions: parse_or_default(
                &lookup,
                "DISPATCH_MAX_SUGGESTIONS",
                defaults.max_suggestions,
            )?,
            min_profit_margin: parse_or_default(
                &lookup,
                "DISPATCH_MIN_PROFIT_MARGIN",
                defaults.min_profit_margin,
            )?,
            cache_ttl: CacheTtls {
                cargo: Duration::from_secs(parse_or_default(
                    &lookup,
                    "DISPATCH_CARGO_CACHE_TTL_SECS",
                    defaults.cache_ttl.cargo.as_secs(),
                )?),
                resources: Duration::from_secs(parse_or_default(
                    &lookup,
                    "DISPATCH_RESOURCE_CACHE_TTL_SECS",
                    defaults.cache_ttl.resources.as_secs(),
                )?),
            },
            calculation_timeout: Duration::from_secs(parse_or_default(
                &lookup,
                "DISPATCH_CALCULATION_TIMEOUT_SECS",
                defaults.calculation_timeout.as_secs(),
            )?),
            ..defaults
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;

        for (name, value) in [
            ("fuel_price_per_liter", self.costs.fuel_price_per_liter),
            ("driver_cost_per_hour", self.costs.driver_cost_per_hour),
            ("route_fuel_l_per_100km", self.costs.route_fuel_l_per_100km),
            ("city_kmh", self.speeds.city_kmh),
            ("highway_kmh", self.speeds.highway_kmh),
            ("search_radius_km", self.fleet.search_radius_km),
            ("urgent_radius_km", self.fleet.urgent_radius_km),
            ("calculation_timeout", self.calculation_timeout.as_secs_f64()),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        for (name, value) in [
            ("analyzer_city_share", self.speeds.analyzer_city_share),
            ("fleet_city_share", self.speeds.fleet_city_share),
            ("urgent_travel_fraction", self.fleet.urgent_travel_fraction),
            ("capacity_safety_margin", self.fleet.capacity_safety_margin),
            ("risk_penalty_factor", self.risk_penalty_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }

        let RiskThresholds { low_max, medium_max } = self.risk_thresholds;
        if !(low_max > 0.0 && low_max < medium_max && medium_max < 100.0) {
            return Err(ConfigError::RiskThresholds {
                low_max,
                medium_max,
            });
        }

        Ok(())
    }
}

/// Serves the validated [`DispatchConfig`]; swaps it only through [`ConfigProvider::reload`].
pub struct ConfigProvider {
    current: RwLock<Arc<DispatchConfig>>,
}

impl ConfigProvider {
    pub fn new(mut config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        config.version = 1;

        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn get(&self) -> Arc<DispatchConfig> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.get().version
    }

    /// Validates `config` and makes it current. The old config keeps serving on error.
    pub fn reload(&self, mut config: DispatchConfig) -> Result<u64, ConfigError> {
        if let Err(err) = config.validate() {
            warn!(error = %err, "rejected dispatch config reload");
            return Err(err);
        }

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        config.version = current.version + 1;
        let version = config.version;
        *current = Arc::new(config);

        info!(version, "dispatch config reloaded");
        Ok(version)
    }
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        None => Ok(default),
    }
}
