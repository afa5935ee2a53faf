use crate::model::Sample;
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_BASE_LATITUDE: f64 = 12.9716;
pub const DEFAULT_BASE_LONGITUDE: f64 = 77.5946;
/// Width of the box generated coordinates wander in, in degrees.
pub const COORDINATE_JITTER: f64 = 0.001;

/// Closed interval a generated field is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    min: f64,
    max: f64,
}

impl FieldRange {
    /// Bounds given in either order are accepted.
    pub fn new(a: f64, b: f64) -> Self {
        if b < a {
            Self { min: b, max: a }
        } else {
            Self { min: a, max: b }
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn draw(&self, rng: &mut impl Rng, decimals: i32) -> f64 {
        let raw = if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        round_to(raw, decimals).max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub temperature: FieldRange,
    pub pressure: FieldRange,
    pub altitude: FieldRange,
    pub latitude: FieldRange,
    pub longitude: FieldRange,
}

impl GeneratorConfig {
    /// Ranges around the given base coordinate, with stock sensor ranges.
    pub fn around(base_latitude: f64, base_longitude: f64) -> Self {
        Self {
            temperature: FieldRange::new(20.0, 25.0),
            pressure: FieldRange::new(1000.0, 1010.0),
            altitude: FieldRange::new(200.0, 250.0),
            latitude: FieldRange::new(base_latitude, base_latitude + COORDINATE_JITTER),
            longitude: FieldRange::new(base_longitude, base_longitude + COORDINATE_JITTER),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::around(DEFAULT_BASE_LATITUDE, DEFAULT_BASE_LONGITUDE)
    }
}

/// Simulated sensor package: one [`Sample`] per call to [`ReadingGenerator::next_at`].
#[derive(Debug)]
pub struct ReadingGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ReadingGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: GeneratorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn next_sample(&mut self) -> Sample {
        self.next_at(Utc::now())
    }

    /// Generates a reading stamped `now`, truncated to milliseconds.
    /// Timestamps never go backwards even if the wall clock does.
    pub fn next_at(&mut self, now: DateTime<Utc>) -> Sample {
        let mut timestamp = now.trunc_subsecs(3);
        if let Some(last) = self.last_timestamp {
            timestamp = timestamp.max(last);
        }
        self.last_timestamp = Some(timestamp);

        let cfg = &self.config;
        Sample {
            temperature: cfg.temperature.draw(&mut self.rng, 2),
            pressure: cfg.pressure.draw(&mut self.rng, 2),
            altitude: cfg.altitude.draw(&mut self.rng, 2),
            latitude: cfg.latitude.draw(&mut self.rng, 6),
            longitude: cfg.longitude.draw(&mut self.rng, 6),
            timestamp,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
