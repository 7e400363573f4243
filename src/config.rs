//! Run configuration for samplers.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::likelihood::{EditNoise, StochasticLikelihood, DEFAULT_LL_SAMPLES};

/**
Settings for a multi-chain run.

Every field has a default, so a config file only needs to name what it
changes:

```rust
use lot_mcmc::config::SamplerConfig;

let config: SamplerConfig = serde_json::from_str(r#"{"n_chains": 8, "seed": 3}"#)?;
assert_eq!(config.n_chains, 8);
assert_eq!(config.n_steps, 10_000);
assert_eq!(config.seed, Some(3));
# Ok::<(), serde_json::Error>(())
```
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_n_chains")]
    pub n_chains: usize,

    /// Steps per chain, including burn-in.
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,

    /// Burn-in steps dropped from the front of each chain.
    #[serde(default = "default_discard")]
    pub discard: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Global seed; chains draw a random one when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// How many distinct best hypotheses to keep.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Forward samples per datum when scoring stochastic hypotheses.
    #[serde(default = "default_ll_samples")]
    pub ll_samples: usize,

    #[serde(default)]
    pub noise: EditNoise,
}

fn default_n_chains() -> usize {
    4
}

fn default_n_steps() -> usize {
    10_000
}

fn default_discard() -> usize {
    1_000
}

fn default_temperature() -> f64 {
    1.0
}

fn default_top_n() -> usize {
    100
}

fn default_ll_samples() -> usize {
    DEFAULT_LL_SAMPLES
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_chains: default_n_chains(),
            n_steps: default_n_steps(),
            discard: default_discard(),
            temperature: default_temperature(),
            seed: None,
            top_n: default_top_n(),
            ll_samples: default_ll_samples(),
            noise: EditNoise::default(),
        }
    }
}

impl SamplerConfig {
    pub fn with_n_chains(mut self, n_chains: usize) -> Self {
        self.n_chains = n_chains;
        self
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    pub fn with_discard(mut self, discard: usize) -> Self {
        self.discard = discard;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_noise(mut self, noise: EditNoise) -> Self {
        self.noise = noise;
        self
    }

    /// Checks the settings are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.n_chains == 0 {
            return Err(Error::config("n_chains must be at least 1"));
        }
        if self.discard >= self.n_steps {
            return Err(Error::config(format!(
                "discard ({}) must be smaller than n_steps ({})",
                self.discard, self.n_steps
            )));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::config(format!(
                "temperature must be positive and finite, got {}",
                self.temperature
            )));
        }
        if self.ll_samples == 0 {
            return Err(Error::config("ll_samples must be at least 1"));
        }
        self.noise.validate()
    }

    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("read {}", path.display()), err))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// The stochastic likelihood these settings describe.
    pub fn likelihood(&self) -> StochasticLikelihood {
        let likelihood = StochasticLikelihood::new(self.ll_samples, self.noise);
        match self.seed {
            Some(seed) => likelihood.set_seed(seed),
            None => likelihood,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::ObservationWeight;

    #[test]
    fn defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.n_chains, 4);
        assert_eq!(config.n_steps, 10_000);
        assert_eq!(config.discard, 1_000);
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.top_n, 100);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());

        let empty: SamplerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, config);
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let base = SamplerConfig::default();
        assert!(base.clone().with_n_chains(0).validate().is_err());
        assert!(base.clone().with_temperature(0.0).validate().is_err());
        assert!(base.clone().with_temperature(f64::NAN).validate().is_err());
        assert!(base.clone().with_n_steps(10).with_discard(10).validate().is_err());
        assert!(base.with_noise(EditNoise::new(-1.0)).validate().is_err());
    }

    #[test]
    fn reads_nested_noise_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"temperature": 2.5, "noise": {"weighting": "unit"}}"#,
        )
        .unwrap();
        let config = SamplerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.temperature, 2.5);
        assert_eq!(config.noise.weighting, ObservationWeight::Unit);
        assert_eq!(config.noise.decay, 100.0);
    }

    #[test]
    fn invalid_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"n_chains": 0}"#).unwrap();
        assert!(matches!(
            SamplerConfig::from_json_file(&path),
            Err(Error::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            SamplerConfig::from_json_file(dir.path().join("missing.json")),
            Err(Error::Io { .. })
        ));
    }
}
