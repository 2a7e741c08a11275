use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Congestion-control variant used by every flow in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Tahoe,
    Reno,
    Fast,
    Cubic,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Fast
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tahoe" => Ok(Algorithm::Tahoe),
            "reno" => Ok(Algorithm::Reno),
            "fast" => Ok(Algorithm::Fast),
            "cubic" => Ok(Algorithm::Cubic),
            other => Err(format!(
                "unknown algorithm '{other}', expected tahoe, reno, fast or cubic"
            )),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Tahoe => "tahoe",
            Algorithm::Reno => "reno",
            Algorithm::Fast => "fast",
            Algorithm::Cubic => "cubic",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulation horizon in seconds.
    pub sim_time_s: f64,
    pub algorithm: Algorithm,
    /// Interval between sonar rounds injected by every host.
    pub sonar_period_s: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_time_s: 60.0,
            algorithm: Algorithm::default(),
            sonar_period_s: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_round_trip() {
        for name in ["tahoe", "reno", "fast", "cubic"] {
            let algo: Algorithm = name.parse().unwrap();
            assert_eq!(algo.to_string(), name);
        }
        assert!("vegas".parse::<Algorithm>().is_err());
    }

    #[test]
    fn default_algorithm_is_fast() {
        assert_eq!(SimConfig::default().algorithm, Algorithm::Fast);
    }
}
