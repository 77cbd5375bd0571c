//! Run configuration, loadable from JSON.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

use crate::{dispatch::Traversal, kernels::airfoil::State, MeshError};

/// Physical constants of the airfoil flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// ratio of specific heats
    #[serde(default = "default_gam")]
    pub gam: f64,
    #[serde(default = "default_cfl")]
    pub cfl: f64,
    /// artificial dissipation coefficient
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// free-stream Mach number
    #[serde(default = "default_mach")]
    pub mach: f64,
    /// Angle of attack in radians.
    ///
    /// The reference state is aligned with the x axis,
    /// so this is only reported alongside the results.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_gam() -> f64 {
    1.4
}
fn default_cfl() -> f64 {
    0.9
}
fn default_eps() -> f64 {
    0.05
}
fn default_mach() -> f64 {
    0.4
}
fn default_alpha() -> f64 {
    3.0 * 1f64.atan() / 45.0
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            gam: default_gam(),
            cfl: default_cfl(),
            eps: default_eps(),
            mach: default_mach(),
            alpha: default_alpha(),
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        let checks = [
            ("gam", self.gam, self.gam > 1.0),
            ("cfl", self.cfl, self.cfl > 0.0),
            ("eps", self.eps, self.eps >= 0.0),
            ("mach", self.mach, self.mach >= 0.0),
            ("alpha", self.alpha, true),
        ];
        for (key, value, ok) in checks {
            if !(ok && value.is_finite()) {
                return Err(MeshError::Configuration(format!(
                    "flow parameter {key} = {value} is out of range"
                )));
            }
        }
        Ok(())
    }

    /// Derive the constants kernels work with.
    pub fn constants(&self) -> FlowConstants {
        let gm1 = self.gam - 1.0;
        let (p, r) = (1.0, 1.0);
        let u = (self.gam * p / r).sqrt() * self.mach;
        let e = p / (r * gm1) + 0.5 * u * u;
        FlowConstants {
            gam: self.gam,
            gm1,
            cfl: self.cfl,
            eps: self.eps,
            qinf: [r, r * u, 0.0, r * e],
        }
    }
}

/// Immutable flow constants shared by every airfoil kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowConstants {
    pub gam: f64,
    pub gm1: f64,
    pub cfl: f64,
    pub eps: f64,
    /// free-stream reference state
    pub qinf: State,
}

/// Settings of a solver run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// print the residual every this many iterations
    #[serde(default = "default_report_interval")]
    pub report_interval: usize,
    #[serde(default)]
    pub traversal: Traversal,
    #[serde(default)]
    pub flow: FlowConfig,
}

fn default_iterations() -> usize {
    1000
}
fn default_report_interval() -> usize {
    100
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            report_interval: default_report_interval(),
            traversal: Traversal::default(),
            flow: FlowConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.report_interval == 0 {
            return Err(MeshError::Configuration(
                "report interval must be at least 1".to_string(),
            ));
        }
        self.flow.validate()
    }
}

/// Read any of the configuration types from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, MeshError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| MeshError::Configuration(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults() {
        let config = SolverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.iterations, 1000);
        assert_eq!(config.traversal, Traversal::Hybrid);

        let flow = config.flow.constants();
        assert_relative_eq!(flow.gm1, 0.4, max_relative = 1e-12);
        assert_relative_eq!(config.flow.alpha, 3f64.to_radians(), max_relative = 1e-12);
        // u = sqrt(1.4) * 0.4, e = 1 / 0.4 + u^2 / 2
        assert_relative_eq!(flow.qinf[1], 1.4f64.sqrt() * 0.4, max_relative = 1e-12);
        assert_relative_eq!(flow.qinf[3], 2.5 + 0.5 * 1.4 * 0.16, max_relative = 1e-12);
        assert_eq!(flow.qinf[2], 0.0);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: SolverConfig =
            serde_json::from_str(r#"{ "iterations": 5, "traversal": "raw", "flow": { "mach": 0.5 } }"#)
                .unwrap();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.report_interval, 100);
        assert_eq!(config.traversal, Traversal::Raw);
        assert_eq!(config.flow.mach, 0.5);
        assert_eq!(config.flow.gam, 1.4);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        assert!(serde_json::from_str::<SolverConfig>(r#"{ "traversal": "sideways" }"#).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = SolverConfig::default();
        config.flow.gam = 1.0;
        assert!(matches!(config.validate(), Err(MeshError::Configuration(_))));

        let mut config = SolverConfig::default();
        config.report_interval = 0;
        assert!(config.validate().is_err());

        let mut config = SolverConfig::default();
        config.flow.cfl = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("quadweave-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "report_interval": 10 }"#).unwrap();
        let config = SolverConfig::from_file(&path).unwrap();
        assert_eq!(config.report_interval, 10);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SolverConfig::from_file(&path),
            Err(MeshError::Configuration(_))
        ));
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(SolverConfig::from_file(&path), Err(MeshError::Io(_))));
    }
}
