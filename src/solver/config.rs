//! Solver configuration

use crate::algorithm::precond::{
    AmgOptions, CprOptions, IluOptions, IsaiOptions, PreconditionerKind, PreconditionerOptions,
};
use crate::algorithm::reorder::ReorderStrategy;
use crate::error::{Error, Result};
use serde::Deserialize;

/// Everything a [`BlockSolver`](super::BlockSolver) is configured with.
///
/// Every field has a default, so a TOML document only needs the keys it
/// changes:
///
/// ```
/// use blocksolve::solver::SolverConfig;
///
/// let config = SolverConfig::from_toml_str(r#"
///     preconditioner = "cpr_quasiimpes"
///     reorder = "graph_coloring"
///     tolerance = 1e-6
///
///     [amg]
///     coarse_size = 50
/// "#).unwrap();
/// assert_eq!(config.amg.coarse_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// 0 silent, 1 summary, 2 per-iteration norms, 3 phase timings,
    /// 4 timing breakdown of the iteration (default: 0)
    pub verbosity: u32,
    /// Iteration limit, counted in full iterations (default: 200)
    pub max_iterations: usize,
    /// Relative residual reduction that counts as converged (default: 1e-2)
    pub tolerance: f64,
    /// Platform index for the runtime (default: 0)
    pub platform_id: usize,
    /// Device index within the platform (default: 0)
    pub device_id: usize,
    /// "none", "level_scheduling" or "graph_coloring" (default: "none")
    pub reorder: String,
    /// "ilu0", "isai" or "cpr_quasiimpes" (default: "ilu0")
    pub preconditioner: String,
    /// Block ILU(0) options, also used by the ILU stages of ISAI and CPR
    pub ilu: IluOptions,
    /// Block ISAI options
    pub isai: IsaiOptions,
    /// CPR options
    pub cpr: CprOptions,
    /// AMG options of the CPR pressure stage
    pub amg: AmgOptions,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            max_iterations: 200,
            tolerance: 1e-2,
            platform_id: 0,
            device_id: 0,
            reorder: "none".to_string(),
            preconditioner: "ilu0".to_string(),
            ilu: IluOptions::default(),
            isai: IsaiOptions::default(),
            cpr: CprOptions::default(),
            amg: AmgOptions::default(),
        }
    }
}

impl SolverConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::unsupported("config", "toml", e.to_string()))
    }

    /// Parsed preconditioner selector
    pub fn preconditioner_kind(&self) -> Result<PreconditionerKind> {
        self.preconditioner.parse()
    }

    /// Parsed reorder selector
    pub fn reorder_strategy(&self) -> Result<ReorderStrategy> {
        self.reorder.parse()
    }

    /// Sub-options grouped for the preconditioner factory
    pub fn preconditioner_options(&self) -> PreconditionerOptions {
        PreconditionerOptions {
            ilu: self.ilu.clone(),
            isai: self.isai.clone(),
            cpr: self.cpr.clone(),
            amg: self.amg.clone(),
        }
    }

    /// Check the numeric settings
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::unsupported(
                "max_iterations",
                "0",
                "at least one iteration is required",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::unsupported(
                "tolerance",
                self.tolerance.to_string(),
                "must be a positive finite number",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = SolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, SolverConfig::default());
        assert_eq!(config.preconditioner_kind().unwrap(), PreconditionerKind::Ilu0);
        assert_eq!(config.reorder_strategy().unwrap(), ReorderStrategy::None);
    }

    #[test]
    fn test_nested_options() {
        let config = SolverConfig::from_toml_str(
            r#"
            verbosity = 2
            max_iterations = 50
            preconditioner = "isai"

            [ilu]
            pivot_threshold = 1e-12

            [cpr]
            pressure_index = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.ilu.pivot_threshold, 1e-12);
        assert_eq!(config.preconditioner_options().cpr.pressure_index, 1);
    }

    #[test]
    fn test_rejects_unknown_toml_type() {
        assert!(matches!(
            SolverConfig::from_toml_str("max_iterations = \"many\""),
            Err(Error::UnsupportedConfiguration { option: "config", .. })
        ));
    }

    #[test]
    fn test_validate() {
        let config = SolverConfig {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = SolverConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SolverConfig::default().validate().is_ok());
    }
}
