//! Semiclassical time stepping for Hagedorn wavepackets.
//!
//! A single step is a symmetric splitting: half a kinetic step on the
//! packet parameters, a full potential step built from the local
//! quadratic Taylor data of each surface at its component's own center,
//! a unitary rotation of the coefficient vector under the quadratic
//! remainder of the potential, and a final kinetic half-step. Parameter
//! updates are exact classical flow; only the remainder rotation touches
//! the coefficients.

use ndarray::{ self as nd };
use ndarray_linalg::{ EighInto, InverseInto, UPLO };
use num_complex::Complex64 as C64;
use crate::{
    braket::MixingQuadrature,
    config::SimulationConfig,
    error::SimError,
    packet::{ HagedornWavepacket, Wavepacket },
    potential::Potential,
};

/// One-step time evolution of a wavepacket state.
pub trait Propagator {
    /// Advance the state by one timestep.
    fn propagate(&mut self) -> Result<(), SimError>;

    /// Current wavepacket state.
    fn wavepacket(&self) -> &HagedornWavepacket;
}

/// Splitting propagator for a [`HagedornWavepacket`] moving under a
/// (possibly coupled) potential.
#[derive(Clone, Debug)]
pub struct HagedornPropagator<'a, V>
where V: Potential
{
    potential: &'a V,
    packet: HagedornWavepacket,
    quadrature: MixingQuadrature,
    dt: f64,
}

impl<'a, V> HagedornPropagator<'a, V>
where V: Potential
{
    /// Create a new propagator holding `packet` as its evolving state.
    ///
    /// The quadrature order and timestep are taken from `config`.
    pub fn new(
        potential: &'a V,
        packet: HagedornWavepacket,
        config: &SimulationConfig,
    ) -> Result<Self, SimError>
    {
        if packet.num_components() != potential.num_components() {
            return Err(SimError::Config(format!(
                "wavepacket has {} components but the potential couples {}",
                packet.num_components(), potential.num_components(),
            )));
        }
        let quadrature
            = MixingQuadrature::with_order(config.quadrature_order())?;
        Ok(Self { potential, packet, quadrature, dt: config.dt })
    }

    /// Timestep.
    pub fn dt(&self) -> f64 { self.dt }

    fn half_kinetic(&mut self) {
        let half = C64::from(0.5 * self.dt);
        let quarter = C64::from(0.25 * self.dt);
        for c in 0..self.packet.num_components() {
            let mut pset = *self.packet.parameters(c);
            pset.q += half * pset.p;
            pset.Q += half * pset.P;
            pset.S += quarter * pset.p * pset.p;
            self.packet.set_parameters(c, pset);
        }
    }

    // Returns the expansion center and (λ, λ', λ'') for each component,
    // captured before the parameter update so the remainder closure sees
    // the same data.
    fn full_potential(&mut self) -> (Vec<f64>, Vec<(f64, f64, f64)>) {
        let n = self.packet.num_components();
        let mut centers: Vec<f64> = Vec::with_capacity(n);
        let mut taylor: Vec<(f64, f64, f64)> = Vec::with_capacity(n);
        for c in 0..n {
            let mut pset = *self.packet.parameters(c);
            let x0 = pset.q.re;
            let (v, dv, ddv) = self.potential.local_quadratic(x0, c);
            pset.p -= C64::from(self.dt * dv);
            pset.P -= C64::from(self.dt * ddv) * pset.Q;
            pset.S -= C64::from(self.dt * v);
            self.packet.set_parameters(c, pset);
            centers.push(x0);
            taylor.push((v, dv, ddv));
        }
        (centers, taylor)
    }

    fn rotate_remainder(
        &mut self,
        centers: &[f64],
        taylor: &[(f64, f64, f64)],
    ) -> Result<(), SimError>
    {
        let potential = self.potential;
        let remainder = |nodes: &nd::Array1<f64>, pair: (usize, usize)|
            -> nd::Array1<C64>
        {
            let (row, col) = pair;
            let mut values = potential.evaluate(nodes, pair);
            if row == col {
                let x0 = centers[row];
                let (v, dv, ddv) = taylor[row];
                values.iter_mut().zip(nodes)
                    .for_each(|(val, x)| {
                        let dx = *x - x0;
                        *val -= C64::from(v + dv * dx + 0.5 * ddv * dx * dx);
                    });
            }
            values
        };
        let f: nd::Array2<C64> = self.quadrature
            .build_matrix(&self.packet, &self.packet, Some(&remainder))?;
        let theta = -self.dt / self.packet.eps().powi(2);
        let u = expm(f, theta)?;
        let coeffs = self.packet.coefficient_vector();
        self.packet.set_coefficient_vector(&u.dot(&coeffs));
        Ok(())
    }
}

impl<'a, V> Propagator for HagedornPropagator<'a, V>
where V: Potential
{
    fn propagate(&mut self) -> Result<(), SimError> {
        self.half_kinetic();
        let (centers, taylor) = self.full_potential();
        self.rotate_remainder(&centers, &taylor)?;
        self.half_kinetic();
        Ok(())
    }

    fn wavepacket(&self) -> &HagedornWavepacket { &self.packet }
}

/// Compute `exp(i·θ·F)` for Hermitian `F` by diagonalization.
fn expm(f: nd::Array2<C64>, theta: f64)
    -> Result<nd::Array2<C64>, SimError>
{
    let (evals, evects): (nd::Array1<f64>, nd::Array2<C64>)
        = f.eigh_into(UPLO::Lower)
        .map_err(|err| SimError::Linalg(err.to_string()))?;
    let l = nd::Array2::from_diag(
        &evals.mapv(|lk| C64::from_polar(1.0, theta * lk)));
    let v = evects.clone();
    let u = evects.inv_into()
        .map_err(|err| SimError::Linalg(err.to_string()))?;
    Ok(v.dot(&l).dot(&u))
}

#[cfg(test)]
mod test {
    use std::f64::consts::TAU;
    use super::*;
    use crate::{ packet::ParamSet, potential::testing::Harmonic };

    fn config(dt: f64, basis_size: usize) -> SimulationConfig {
        SimulationConfig {
            eps: 0.1,
            dt,
            t_end: 1.0,
            basis_size,
            quadrature_order: None,
            write_nth: 0,
            ngn: 8,
            grid_factor: 1.0,
            parameters: Vec::new(),
            coefficients: Vec::new(),
        }
    }

    struct Quartic;

    impl Potential for Quartic {
        fn num_components(&self) -> usize { 1 }

        fn evaluate(&self, nodes: &nd::Array1<f64>, _pair: (usize, usize))
            -> nd::Array1<C64>
        {
            nodes.mapv(|x| C64::from(0.25 * x.powi(4)))
        }

        fn local_quadratic(&self, x: f64, _component: usize)
            -> (f64, f64, f64)
        {
            (0.25 * x.powi(4), x.powi(3), 3.0 * x * x)
        }
    }

    #[test]
    fn quadratic_potential_leaves_coefficients_fixed() {
        let potential = Harmonic { omega: 1.0 };
        let mut packet = HagedornWavepacket::new(1, 3, 0.1).unwrap();
        packet.set_coefficients(0, &[
            C64::new(0.5, 0.0),
            C64::new(0.0, 0.5),
            C64::new(-0.5, 0.5),
        ]).unwrap();
        let before = packet.coefficient_vector();
        let mut prop
            = HagedornPropagator::new(&potential, packet, &config(0.02, 3))
            .unwrap();
        for _ in 0..10 { prop.propagate().unwrap(); }
        let after = prop.wavepacket().coefficient_vector();
        before.iter().zip(&after)
            .for_each(|(b, a)| { assert!((*b - *a).norm() < 1e-12); });
    }

    #[test]
    fn harmonic_center_follows_classical_flow() {
        let omega = 1.0;
        let q0 = 0.75;
        let potential = Harmonic { omega };
        let mut packet = HagedornWavepacket::new(1, 2, 0.1).unwrap();
        let mut pset = ParamSet::default();
        pset.q = C64::from(q0);
        packet.set_parameters(0, pset);
        packet.set_coefficients(0, &[C64::from(1.0)]).unwrap();
        let dt = 0.005;
        let nsteps = (TAU / 4.0 / dt).round() as usize; // quarter period
        let mut prop
            = HagedornPropagator::new(&potential, packet, &config(dt, 2))
            .unwrap();
        for _ in 0..nsteps { prop.propagate().unwrap(); }
        let t = nsteps as f64 * dt;
        let pset = *prop.wavepacket().parameters(0);
        assert!((pset.q.re - q0 * (omega * t).cos()).abs() < 1e-3);
        assert!((pset.p.re + q0 * omega * (omega * t).sin()).abs() < 1e-3);
        assert!(pset.q.im.abs() < 1e-14);
        assert!(pset.p.im.abs() < 1e-14);
    }

    #[test]
    fn remainder_rotation_is_unitary() {
        let potential = Quartic;
        let mut packet = HagedornWavepacket::new(1, 4, 0.25).unwrap();
        let mut pset = ParamSet::default();
        pset.q = C64::from(0.3);
        packet.set_parameters(0, pset);
        packet.set_coefficients(0, &[
            C64::new(0.6, 0.0),
            C64::new(0.0, 0.8),
        ]).unwrap();
        let norm0 = packet.coefficient_norm();
        let mut prop
            = HagedornPropagator::new(&potential, packet, &config(0.05, 4))
            .unwrap();
        for _ in 0..10 { prop.propagate().unwrap(); }
        let norm1 = prop.wavepacket().coefficient_norm();
        assert!((norm1 - norm0).abs() < 1e-10);
    }

    #[test]
    fn component_count_mismatch_is_rejected() {
        let potential = Harmonic { omega: 1.0 };
        let packet = HagedornWavepacket::new(2, 2, 0.1).unwrap();
        let res
            = HagedornPropagator::new(&potential, packet, &config(0.01, 2));
        assert!(matches!(res, Err(SimError::Config(_))));
    }
}
