//! Semiclassical wavepacket state.
//!
//! An inhomogeneous Hagedorn wavepacket over `N` components carries one
//! parameter 5-tuple `(P, Q, S, p, q)` *per component* together with a
//! coefficient vector of uniform length `K` per component. Basis
//! functions follow the Hagedorn three-term recurrence and are evaluated
//! on real nodes.

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{
    braket::MixingQuadrature,
    error::SimError,
    potential::Potential,
};

/// One component's parameter 5-tuple `(P, Q, S, p, q)`.
///
/// `p` and `q` are physically real but stored complex; `S` accumulates
/// the classical action. `Q` must stay away from zero for the basis and
/// any parameter mix to be defined.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub P: C64,
    pub Q: C64,
    pub S: C64,
    pub p: C64,
    pub q: C64,
}

impl Default for ParamSet {
    /// The normalized ground-state configuration `(i, 1, 0, 0, 0)`.
    fn default() -> Self {
        Self {
            P: C64::i(),
            Q: C64::from(1.0),
            S: C64::from(0.0),
            p: C64::from(0.0),
            q: C64::from(0.0),
        }
    }
}

impl ParamSet {
    pub fn new(P: C64, Q: C64, S: C64, p: C64, q: C64) -> Self {
        Self { P, Q, S, p, q }
    }

    /// Flatten to the storage row `[P, Q, S, p, q]`.
    pub fn to_row(&self) -> nd::Array1<C64> {
        nd::array![self.P, self.Q, self.S, self.p, self.q]
    }

    /// Rebuild from a storage row.
    ///
    /// *Panics* if the row does not have exactly 5 entries.
    pub fn from_row(row: nd::ArrayView1<C64>) -> Self {
        if row.len() != 5 {
            panic!("ParamSet::from_row: expected 5 entries, got {}", row.len());
        }
        Self { P: row[0], Q: row[1], S: row[2], p: row[3], q: row[4] }
    }
}

/// Interface the quadrature engine sees: bra and ket may be different
/// concrete packet types as long as they expose their shape, scale,
/// per-component parameters and coefficients, and can evaluate their
/// basis on a set of real nodes.
pub trait Wavepacket {
    /// Number of components `N`.
    fn num_components(&self) -> usize;

    /// Uniform basis size `K`.
    fn basis_size(&self) -> usize;

    /// Semiclassical scale.
    fn eps(&self) -> f64;

    /// Parameter set of one component.
    fn parameters(&self, component: usize) -> &ParamSet;

    /// Coefficient vector of one component.
    fn coefficients(&self, component: usize) -> nd::ArrayView1<'_, C64>;

    /// `K × R` matrix of the component's basis functions on `nodes`,
    /// optionally scaled by the `1/sqrt(Q)` prefactor.
    fn evaluate_basis_at(
        &self,
        nodes: &nd::Array1<f64>,
        component: usize,
        prefactor: bool,
    ) -> nd::Array2<C64>;
}

/// Inhomogeneous Hagedorn wavepacket: per-component parameter sets and
/// coefficients over a uniform basis size.
#[derive(Clone, Debug, PartialEq)]
pub struct HagedornWavepacket {
    eps: f64,
    components: usize,
    basis_size: usize,
    parameters: Vec<ParamSet>,
    coefficients: Vec<nd::Array1<C64>>,
}

impl HagedornWavepacket {
    /// Create a packet with default parameter sets and zero coefficients.
    pub fn new(components: usize, basis_size: usize, eps: f64)
        -> Result<Self, SimError>
    {
        if components == 0 || basis_size == 0 || !(eps > 0.0) {
            return Err(SimError::Config(format!(
                "wavepacket with {} components, basis size {}, eps {}",
                components, basis_size, eps,
            )));
        }
        Ok(Self {
            eps,
            components,
            basis_size,
            parameters: vec![ParamSet::default(); components],
            coefficients: vec![nd::Array1::zeros(basis_size); components],
        })
    }

    /// Create a packet from explicit parts.
    ///
    /// All coefficient vectors must share one nonzero length, and there
    /// must be exactly one per parameter set.
    pub fn with_data(
        eps: f64,
        parameters: Vec<ParamSet>,
        coefficients: Vec<nd::Array1<C64>>,
    ) -> Result<Self, SimError>
    {
        if parameters.is_empty() || parameters.len() != coefficients.len() {
            return Err(SimError::Config(format!(
                "wavepacket data with {} parameter sets and {} coefficient \
                vectors",
                parameters.len(), coefficients.len(),
            )));
        }
        let basis_size = coefficients[0].len();
        if basis_size == 0 || !(eps > 0.0) {
            return Err(SimError::Config(format!(
                "wavepacket data with basis size {}, eps {}", basis_size, eps,
            )));
        }
        for (component, c) in coefficients.iter().enumerate() {
            if c.len() != basis_size {
                return Err(SimError::CoefficientLength {
                    component, len: c.len(), basis_size,
                });
            }
        }
        Ok(Self {
            eps,
            components: parameters.len(),
            basis_size,
            parameters,
            coefficients,
        })
    }

    /// Replace one component's parameter set.
    pub fn set_parameters(&mut self, component: usize, params: ParamSet) {
        self.parameters[component] = params;
    }

    /// Replace one component's coefficients; shorter vectors are
    /// zero-padded up to the basis size.
    pub fn set_coefficients(&mut self, component: usize, values: &[C64])
        -> Result<(), SimError>
    {
        if values.len() > self.basis_size {
            return Err(SimError::CoefficientLength {
                component, len: values.len(), basis_size: self.basis_size,
            });
        }
        let mut c: nd::Array1<C64> = nd::Array1::zeros(self.basis_size);
        c.slice_mut(s![..values.len()])
            .assign(&nd::ArrayView1::from(values));
        self.coefficients[component] = c;
        Ok(())
    }

    /// Set a single coefficient.
    pub fn set_coefficient(
        &mut self,
        component: usize,
        index: usize,
        value: C64,
    ) -> Result<(), SimError>
    {
        if index >= self.basis_size {
            return Err(SimError::CoefficientLength {
                component, len: index + 1, basis_size: self.basis_size,
            });
        }
        self.coefficients[component][index] = value;
        Ok(())
    }

    /// Stacked coefficient vector, component-major: entry `c·K + k` is
    /// coefficient `k` of component `c`. This matches the block layout of
    /// the engine's matrix quadrature.
    pub fn coefficient_vector(&self) -> nd::Array1<C64> {
        let k = self.basis_size;
        let mut out: nd::Array1<C64>
            = nd::Array1::zeros(self.components * k);
        for (c, coeffs) in self.coefficients.iter().enumerate() {
            out.slice_mut(s![c * k..(c + 1) * k]).assign(coeffs);
        }
        out
    }

    /// Scatter a stacked coefficient vector back into the components.
    ///
    /// *Panics* if the length is not `N·K`.
    pub fn set_coefficient_vector(&mut self, stacked: &nd::Array1<C64>) {
        let k = self.basis_size;
        if stacked.len() != self.components * k {
            panic!(
                "set_coefficient_vector: expected length {}, got {}",
                self.components * k, stacked.len(),
            );
        }
        for (c, coeffs) in self.coefficients.iter_mut().enumerate() {
            coeffs.assign(&stacked.slice(s![c * k..(c + 1) * k]));
        }
    }

    /// Euclidean norm of the stacked coefficient vector. Equals the
    /// packet norm whenever the basis is orthonormal.
    pub fn coefficient_norm(&self) -> f64 {
        self.coefficients.iter()
            .map(|c| c.iter().map(|ck| ck.norm_sqr()).sum::<f64>())
            .sum::<f64>()
            .sqrt()
    }

    /// Evaluate the full packet on `nodes`: row `c` is component `c`'s
    /// coefficient-weighted basis sum.
    pub fn evaluate_at(&self, nodes: &nd::Array1<f64>, prefactor: bool)
        -> nd::Array2<C64>
    {
        let mut values: nd::Array2<C64>
            = nd::Array2::zeros((self.components, nodes.len()));
        for c in 0..self.components {
            let basis = self.evaluate_basis_at(nodes, c, prefactor);
            values.row_mut(c).assign(&self.coefficients[c].dot(&basis));
        }
        values
    }

    /// Rotate the coefficients into the canonical basis through the
    /// potential's eigenvector matrix sampled on the quadrature nodes.
    pub fn project_to_canonical<V>(
        &mut self,
        potential: &V,
        engine: &MixingQuadrature,
    ) -> Result<(), SimError>
    where V: Potential
    {
        let op = |nodes: &nd::Array1<f64>, pair: (usize, usize)|
            -> nd::Array1<C64>
        {
            potential.eigenvector(nodes, pair)
        };
        let f = engine.build_matrix(self, self, Some(&op))?;
        let c = self.coefficient_vector();
        self.set_coefficient_vector(&f.dot(&c));
        Ok(())
    }

    /// Rotate the coefficients into the potential's eigenbasis (adjoint
    /// sampling of [`Self::project_to_canonical`]).
    pub fn project_to_eigen<V>(
        &mut self,
        potential: &V,
        engine: &MixingQuadrature,
    ) -> Result<(), SimError>
    where V: Potential
    {
        let op = |nodes: &nd::Array1<f64>, (row, col): (usize, usize)|
            -> nd::Array1<C64>
        {
            potential.eigenvector(nodes, (col, row)).mapv(|u| u.conj())
        };
        let f = engine.build_matrix(self, self, Some(&op))?;
        let c = self.coefficient_vector();
        self.set_coefficient_vector(&f.dot(&c));
        Ok(())
    }
}

impl Wavepacket for HagedornWavepacket {
    fn num_components(&self) -> usize { self.components }

    fn basis_size(&self) -> usize { self.basis_size }

    fn eps(&self) -> f64 { self.eps }

    fn parameters(&self, component: usize) -> &ParamSet {
        &self.parameters[component]
    }

    fn coefficients(&self, component: usize) -> nd::ArrayView1<'_, C64> {
        self.coefficients[component].view()
    }

    /// Hagedorn recurrence:
    /// ```text
    /// φ_0 = π^{-1/4} ε^{-1/2} exp(i/ε² (P/(2Q) (x-q)² + p (x-q)))
    /// φ_1 = Q⁻¹ √(2/ε²) (x-q) φ_0
    /// φ_k = Q⁻¹ (√(2/ε²)/√k (x-q) φ_{k-1} - Q̄ √((k-1)/k) φ_{k-2})
    /// ```
    /// The optional prefactor is `1/√Q` on the principal branch.
    fn evaluate_basis_at(
        &self,
        nodes: &nd::Array1<f64>,
        component: usize,
        prefactor: bool,
    ) -> nd::Array2<C64>
    {
        let pset = &self.parameters[component];
        let eps = self.eps;
        let q_inv: C64 = pset.Q.inv();
        let q_bar: C64 = pset.Q.conj();
        let rt2e = (2.0 / (eps * eps)).sqrt();
        let norm = std::f64::consts::PI.powf(-0.25) * eps.powf(-0.5);
        let mut h: nd::Array2<C64>
            = nd::Array2::zeros((self.basis_size, nodes.len()));
        for (j, &x) in nodes.iter().enumerate() {
            let dx = C64::from(x) - pset.q;
            h[[0, j]]
                = norm
                * (C64::i() / (eps * eps)
                    * (0.5 * pset.P * q_inv * dx * dx + pset.p * dx))
                .exp();
        }
        if self.basis_size > 1 {
            for (j, &x) in nodes.iter().enumerate() {
                let dx = C64::from(x) - pset.q;
                h[[1, j]] = q_inv * rt2e * dx * h[[0, j]];
            }
        }
        for k in 2..self.basis_size {
            let a = rt2e / (k as f64).sqrt();
            let b = ((k as f64 - 1.0) / k as f64).sqrt();
            for (j, &x) in nodes.iter().enumerate() {
                let dx = C64::from(x) - pset.q;
                h[[k, j]]
                    = q_inv
                    * (a * dx * h[[k - 1, j]] - q_bar * b * h[[k - 2, j]]);
            }
        }
        if prefactor {
            let pf = pset.Q.sqrt().inv();
            h.mapv_inplace(|v| pf * v);
        }
        h
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn close(a: C64, b: C64) -> bool { (a - b).norm() < 1e-12 }

    // two surfaces whose eigenvector matrix is a constant rotation by
    // `theta`
    struct Tilted {
        theta: f64,
    }

    impl Potential for Tilted {
        fn num_components(&self) -> usize { 2 }

        fn evaluate(&self, nodes: &nd::Array1<f64>, pair: (usize, usize))
            -> nd::Array1<C64>
        {
            let (s, c) = self.theta.sin_cos();
            nodes.mapv(|x| {
                let l0 = 0.5 * x * x;
                let l1 = x * x;
                let v = match pair {
                    (0, 0) => c * c * l0 + s * s * l1,
                    (1, 1) => s * s * l0 + c * c * l1,
                    _ => s * c * (l0 - l1),
                };
                C64::from(v)
            })
        }

        fn local_quadratic(&self, x: f64, component: usize)
            -> (f64, f64, f64)
        {
            match component {
                0 => (0.5 * x * x, x, 1.0),
                _ => (x * x, 2.0 * x, 2.0),
            }
        }

        fn eigenvector(&self, nodes: &nd::Array1<f64>, pair: (usize, usize))
            -> nd::Array1<C64>
        {
            let (s, c) = self.theta.sin_cos();
            let u = match pair {
                (0, 0) => c,
                (1, 0) => s,
                (0, 1) => -s,
                (1, 1) => c,
                _ => panic!("Tilted::eigenvector: no entry {:?}", pair),
            };
            nd::Array1::from_elem(nodes.len(), C64::from(u))
        }
    }

    #[test]
    fn ground_state_value() {
        let packet = HagedornWavepacket::new(1, 1, 0.5).unwrap();
        let nodes = nd::array![0.0];
        let basis = packet.evaluate_basis_at(&nodes, 0, true);
        let expected
            = std::f64::consts::PI.powf(-0.25) * 0.5_f64.powf(-0.5);
        assert!(close(basis[[0, 0]], C64::from(expected)));
    }

    #[test]
    fn recurrence_matches_hermite_functions() {
        // for (P, Q) = (i, 1), p = q = 0, eps = 1 the basis reduces to
        // the orthonormal Hermite functions
        let packet = HagedornWavepacket::new(1, 3, 1.0).unwrap();
        let x = 0.7;
        let nodes = nd::array![x];
        let basis = packet.evaluate_basis_at(&nodes, 0, true);
        let psi0
            = std::f64::consts::PI.powf(-0.25) * (-0.5 * x * x).exp();
        let psi1 = 2.0_f64.sqrt() * x * psi0;
        let psi2 = (2.0 * x * x - 1.0) / 2.0_f64.sqrt() * psi0;
        assert!(close(basis[[0, 0]], C64::from(psi0)));
        assert!(close(basis[[1, 0]], C64::from(psi1)));
        assert!(close(basis[[2, 0]], C64::from(psi2)));
    }

    #[test]
    fn coefficient_assignment() {
        let mut packet = HagedornWavepacket::new(2, 4, 0.1).unwrap();
        packet.set_coefficients(0, &[C64::from(1.0), C64::i()]).unwrap();
        assert!(close(packet.coefficients(0)[0], C64::from(1.0)));
        assert!(close(packet.coefficients(0)[1], C64::i()));
        assert!(close(packet.coefficients(0)[2], C64::from(0.0)));
        let too_long = vec![C64::from(1.0); 5];
        assert!(packet.set_coefficients(1, &too_long).is_err());
        assert!(packet.set_coefficient(1, 4, C64::from(1.0)).is_err());
        packet.set_coefficient(1, 3, C64::from(2.0)).unwrap();
        assert!(close(packet.coefficients(1)[3], C64::from(2.0)));
    }

    #[test]
    fn coefficient_vector_roundtrip() {
        let mut packet = HagedornWavepacket::new(2, 3, 0.1).unwrap();
        packet.set_coefficients(
            0, &[C64::from(1.0), C64::from(2.0), C64::from(3.0)]).unwrap();
        packet.set_coefficients(
            1, &[C64::i(), C64::from(5.0), C64::from(6.0)]).unwrap();
        let stacked = packet.coefficient_vector();
        assert_eq!(stacked.len(), 6);
        assert!(close(stacked[0], C64::from(1.0)));
        assert!(close(stacked[3], C64::i()));
        let mut other = HagedornWavepacket::new(2, 3, 0.1).unwrap();
        other.set_coefficient_vector(&stacked);
        assert_eq!(other.coefficient_vector(), stacked);
    }

    #[test]
    fn packet_evaluation_is_linear_in_coefficients() {
        let mut packet = HagedornWavepacket::new(1, 3, 0.2).unwrap();
        packet.set_coefficient(0, 1, C64::from(1.0)).unwrap();
        let nodes = nd::array![-0.3, 0.0, 0.4];
        let basis = packet.evaluate_basis_at(&nodes, 0, true);
        let values = packet.evaluate_at(&nodes, true);
        for j in 0..3 {
            assert!(close(values[[0, j]], basis[[1, j]]));
        }
    }

    #[test]
    fn with_data_validation() {
        let params = vec![ParamSet::default(); 2];
        let coeffs = vec![nd::Array1::zeros(3); 1];
        assert!(HagedornWavepacket::with_data(0.1, params, coeffs).is_err());
        let params = vec![ParamSet::default(); 2];
        let coeffs = vec![nd::Array1::zeros(3), nd::Array1::zeros(2)];
        assert!(HagedornWavepacket::with_data(0.1, params, coeffs).is_err());
    }

    #[test]
    fn row_roundtrip() {
        let pset = ParamSet::default();
        let row = pset.to_row();
        assert_eq!(ParamSet::from_row(row.view()), pset);
    }

    #[test]
    fn basis_projections_invert_each_other() {
        let engine = MixingQuadrature::with_order(8).unwrap();
        let potential = Tilted { theta: std::f64::consts::FRAC_PI_6 };
        let mut packet = HagedornWavepacket::new(2, 3, 0.2).unwrap();
        packet.set_coefficients(
            0, &[C64::from(0.8), C64::new(0.0, 0.3)]).unwrap();
        packet.set_coefficients(1, &[C64::from(0.5)]).unwrap();
        let stacked = packet.coefficient_vector();
        packet.project_to_canonical(&potential, &engine).unwrap();
        // the rotation actually mixes the two components
        assert!(packet.coefficients(1)[1].norm() > 1e-3);
        packet.project_to_eigen(&potential, &engine).unwrap();
        let back = packet.coefficient_vector();
        for (a, b) in back.iter().zip(stacked.iter()) {
            assert!((*a - *b).norm() < 1e-10);
        }
    }
}
