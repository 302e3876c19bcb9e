pub mod cargo_analyzer;
pub mod fleet;
pub mod matching;
pub mod response;
pub mod scoring;

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
