//! Immutable run configuration.
//!
//! The configuration is plain data, threaded by shared reference and
//! never mutated after construction. Derived quantities (step counts,
//! save schedule, sampling grid, effective quadrature order) are
//! recomputed on demand, so a round trip through the on-disk record
//! preserves everything.

use std::{ f64::consts::PI, path::Path };
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{ error::SimError, packet::ParamSet };

/// Full configuration of a propagation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Semiclassical scale ε.
    pub eps: f64,
    /// Timestep.
    pub dt: f64,
    /// End time; the step count is `round(t_end / dt)`.
    pub t_end: f64,
    /// Uniform basis size `K` per component.
    pub basis_size: usize,
    /// Quadrature order override; the default is `basis_size + 4`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadrature_order: Option<usize>,
    /// Record the state after every `write_nth`-th step (0 records only
    /// the initial snapshot).
    pub write_nth: u64,
    /// Number of sampling-grid nodes.
    pub ngn: usize,
    /// Half-width of the sampling grid in units of π.
    pub grid_factor: f64,
    /// Initial parameter set per component.
    pub parameters: Vec<ParamSet>,
    /// Dense initial coefficient vector per component; shorter vectors
    /// are zero-padded up to the basis size.
    pub coefficients: Vec<Vec<C64>>,
}

impl SimulationConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(text)?)
    }

    /// Read from a TOML file.
    pub fn from_file<P>(path: P) -> Result<Self, SimError>
    where P: AsRef<Path>
    {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Serialize to TOML text.
    pub fn to_toml(&self) -> Result<String, SimError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Number of timesteps in the run.
    pub fn nsteps(&self) -> u64 {
        (self.t_end / self.dt).round() as u64
    }

    /// Whether the state after `step` is recorded.
    pub fn must_save(&self, step: u64) -> bool {
        self.write_nth != 0 && step % self.write_nth == 0
    }

    /// Slots needed to hold every recorded snapshot, the initial one
    /// included.
    pub fn num_save_slots(&self) -> usize {
        let extra
            = if self.write_nth == 0 { 0 }
            else { self.nsteps() / self.write_nth };
        1 + extra as usize
    }

    /// Effective quadrature order.
    pub fn quadrature_order(&self) -> usize {
        self.quadrature_order.unwrap_or(self.basis_size + 4)
    }

    /// Sampling grid: `ngn` nodes `grid_factor·π·(-1 + 2k/ngn)`,
    /// half-open on the right.
    pub fn grid(&self) -> nd::Array1<f64> {
        let n = self.ngn;
        (0..n)
            .map(|k| {
                self.grid_factor * PI * (-1.0 + 2.0 * k as f64 / n as f64)
            })
            .collect()
    }

    /// Check the primary values against a potential's component count.
    ///
    /// Initial-data undersupply and ill-formed scalars are configuration
    /// errors; extra parameter or coefficient sets beyond `components`
    /// are ignored.
    pub fn validate(&self, components: usize) -> Result<(), SimError> {
        if !(self.eps > 0.0) {
            return Err(SimError::Config(format!("eps = {}", self.eps)));
        }
        if !(self.dt > 0.0) {
            return Err(SimError::Config(format!("dt = {}", self.dt)));
        }
        if self.basis_size == 0 {
            return Err(SimError::Config("basis_size = 0".into()));
        }
        if self.ngn == 0 {
            return Err(SimError::Config("ngn = 0".into()));
        }
        if self.parameters.len() < components {
            return Err(SimError::TooFewParameters {
                got: self.parameters.len(),
                need: components,
            });
        }
        if self.coefficients.len() < components {
            return Err(SimError::TooFewCoefficients {
                got: self.coefficients.len(),
                need: components,
            });
        }
        for (component, c)
            in self.coefficients.iter().take(components).enumerate()
        {
            if c.len() > self.basis_size {
                return Err(SimError::CoefficientLength {
                    component,
                    len: c.len(),
                    basis_size: self.basis_size,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> SimulationConfig {
        SimulationConfig {
            eps: 0.1,
            dt: 0.01,
            t_end: 1.0,
            basis_size: 4,
            quadrature_order: None,
            write_nth: 2,
            ngn: 8,
            grid_factor: 1.0,
            parameters: vec![ParamSet::default()],
            coefficients: vec![vec![C64::from(1.0)]],
        }
    }

    #[test]
    fn toml_roundtrip_is_exact() {
        let mut cfg = sample();
        cfg.dt = 1.0 / 3.0;
        cfg.grid_factor = PI;
        cfg.coefficients = vec![vec![C64::new(0.25, -0.6)]];
        let text = cfg.to_toml().unwrap();
        let back = SimulationConfig::from_toml(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn derived_values() {
        let cfg = sample();
        assert_eq!(cfg.nsteps(), 100);
        assert_eq!(cfg.num_save_slots(), 51);
        assert!(cfg.must_save(4));
        assert!(!cfg.must_save(3));
        assert_eq!(cfg.quadrature_order(), 8);
        let mut never = sample();
        never.write_nth = 0;
        assert!(!never.must_save(1));
        assert_eq!(never.num_save_slots(), 1);
        let mut explicit = sample();
        explicit.quadrature_order = Some(12);
        assert_eq!(explicit.quadrature_order(), 12);
    }

    #[test]
    fn grid_formula() {
        let mut cfg = sample();
        cfg.ngn = 4;
        let grid = cfg.grid();
        assert_eq!(grid.len(), 4);
        assert!((grid[0] + PI).abs() < 1e-14);
        assert!((grid[1] + 0.5 * PI).abs() < 1e-14);
        assert!((grid[2]).abs() < 1e-14);
        assert!((grid[3] - 0.5 * PI).abs() < 1e-14);
    }

    #[test]
    fn validation_errors() {
        let cfg = sample();
        assert!(cfg.validate(1).is_ok());
        assert!(matches!(
            cfg.validate(2),
            Err(SimError::TooFewParameters { got: 1, need: 2 }),
        ));
        let mut cfg = sample();
        cfg.parameters = vec![ParamSet::default(); 2];
        assert!(matches!(
            cfg.validate(2),
            Err(SimError::TooFewCoefficients { got: 1, need: 2 }),
        ));
        let mut cfg = sample();
        cfg.coefficients = vec![vec![C64::from(1.0); 5]];
        assert!(matches!(
            cfg.validate(1),
            Err(SimError::CoefficientLength { component: 0, len: 5, .. }),
        ));
        let mut cfg = sample();
        cfg.eps = -1.0;
        assert!(matches!(cfg.validate(1), Err(SimError::Config(_))));
    }
}
