//! Inner products and operator matrix elements between wavepackets.
//!
//! Bra and ket carry their own parameter sets per component, so every
//! `(row, col)` component pair integrates in its own mixed frame: the two
//! Gaussian envelopes are combined into a common real center `q0` and
//! scale `qs`, quadrature nodes are mapped affinely into that frame, and
//! both bases are evaluated on the mapped nodes. Weights produced by
//! [`QuadratureRule::gauss_hermite`] already integrate the full decaying
//! integrand, so no extra weight function appears here.

use itertools::Itertools;
use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use crate::{
    error::{ MixError, SimError },
    packet::{ ParamSet, Wavepacket },
    quadrature::QuadratureRule,
};

/// Real center and scale of a mixed integration frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MixedParams {
    /// Mixed center.
    pub q0: f64,
    /// Node scale `1/sqrt(Q0)`.
    pub qs: f64,
}

/// Operator sampled on transformed nodes; the second argument selects the
/// `(row, col)` component pair. Passing `None` to the engine means the
/// identity, which acts as a Kronecker delta in the component pair.
pub type OperatorFn<'a>
    = &'a dyn Fn(&nd::Array1<f64>, (usize, usize)) -> nd::Array1<C64>;

/// Combine a bra and a ket parameter set into a common integration frame.
///
/// ```text
/// r  = conj(Pr/Qr) - Pc/Qc
/// s  = conj(Pr/Qr)·qr - (Pc/Qc)·qc
/// q0 = im(s)/im(r)
/// Q0 = -im(r)/2
/// qs = 1/sqrt(Q0)
/// ```
///
/// Fails when `im(r)` vanishes (the mixed center is a division by zero)
/// or when `Q0` is not positive (no real scale exists).
pub fn mix_parameters(bra: &ParamSet, ket: &ParamSet)
    -> Result<MixedParams, MixError>
{
    let rr = bra.P / bra.Q;
    let rc = ket.P / ket.Q;
    let r = rr.conj() - rc;
    let s = rr.conj() * bra.q - rc * ket.q;
    if r.im == 0.0 { return Err(MixError::ZeroDivisor); }
    let q0 = s.im / r.im;
    let spread = -0.5 * r.im;
    if spread <= 0.0 { return Err(MixError::NonPositiveSpread); }
    Ok(MixedParams { q0, qs: 1.0 / spread.sqrt() })
}

/// Quadrature engine over a node/weight rule.
#[derive(Clone, Debug)]
pub struct MixingQuadrature {
    rule: QuadratureRule,
}

impl MixingQuadrature {
    pub fn new(rule: QuadratureRule) -> Self { Self { rule } }

    /// Engine over the Gauss–Hermite rule of the given order.
    pub fn with_order(order: usize) -> Result<Self, SimError> {
        Ok(Self::new(QuadratureRule::gauss_hermite(order)?))
    }

    pub fn rule(&self) -> &QuadratureRule { &self.rule }

    pub fn set_rule(&mut self, rule: QuadratureRule) { self.rule = rule; }

    /// Map the rule's nodes into the mixed frame of a bra/ket parameter
    /// pair: `q0 + eps·qs·node`. An explicit `rule` overrides the
    /// engine's own.
    pub fn transform_nodes(
        &self,
        bra: &ParamSet,
        ket: &ParamSet,
        eps: f64,
        rule: Option<&QuadratureRule>,
    ) -> Result<nd::Array1<f64>, MixError>
    {
        let mixed = mix_parameters(bra, ket)?;
        Ok(self.mapped_nodes(&mixed, eps, rule))
    }

    fn mapped_nodes(
        &self,
        mixed: &MixedParams,
        eps: f64,
        rule: Option<&QuadratureRule>,
    ) -> nd::Array1<f64>
    {
        let rule = rule.unwrap_or(&self.rule);
        rule.nodes().mapv(|x| mixed.q0 + eps * mixed.qs * x)
    }

    /// Inner products `<bra_row | f | ket_col>` for every component pair,
    /// row-major over `(row, col)`.
    pub fn quadrature<B, K>(
        &self,
        bra: &B,
        ket: &K,
        operator: Option<OperatorFn>,
    ) -> Result<Vec<C64>, SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        let nbra = bra.num_components();
        let nket = ket.num_components();
        let mut result: Vec<C64> = Vec::with_capacity(nbra * nket);
        for (row, col) in (0..nbra).cartesian_product(0..nket) {
            result.push(self.pair_scalar(bra, ket, row, col, operator)?);
        }
        Ok(result)
    }

    /// Sum of [`Self::quadrature`] over all component pairs.
    pub fn quadrature_summed<B, K>(
        &self,
        bra: &B,
        ket: &K,
        operator: Option<OperatorFn>,
    ) -> Result<C64, SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        Ok(self.quadrature(bra, ket, operator)?.into_iter().sum())
    }

    /// Inner product for a single `(row, col)` pair; only that pair is
    /// computed.
    pub fn quadrature_component<B, K>(
        &self,
        bra: &B,
        ket: &K,
        operator: Option<OperatorFn>,
        component: (usize, usize),
    ) -> Result<C64, SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        self.pair_scalar(bra, ket, component.0, component.1, operator)
    }

    /// Full `(N_bra·K_bra) × (N_ket·K_ket)` matrix of basis matrix
    /// elements: block `(row, col)` sits at row offset `row·K_bra` and
    /// column offset `col·K_ket` and holds `phase · M` for that pair.
    pub fn build_matrix<B, K>(
        &self,
        bra: &B,
        ket: &K,
        operator: Option<OperatorFn>,
    ) -> Result<nd::Array2<C64>, SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        let nbra = bra.num_components();
        let nket = ket.num_components();
        let kbra = bra.basis_size();
        let kket = ket.basis_size();
        let mut out: nd::Array2<C64>
            = nd::Array2::zeros((nbra * kbra, nket * kket));
        for (row, col) in (0..nbra).cartesian_product(0..nket) {
            let (phase, m)
                = self.pair_block(bra, ket, row, col, operator)?;
            let mut block = out.slice_mut(s![
                row * kbra..(row + 1) * kbra,
                col * kket..(col + 1) * kket,
            ]);
            block.assign(&m);
            block.mapv_inplace(|v| phase * v);
        }
        Ok(out)
    }

    fn pair_scalar<B, K>(
        &self,
        bra: &B,
        ket: &K,
        row: usize,
        col: usize,
        operator: Option<OperatorFn>,
    ) -> Result<C64, SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        let (phase, m) = self.pair_block(bra, ket, row, col, operator)?;
        let mc = m.dot(&ket.coefficients(col));
        let scalar: C64
            = bra.coefficients(row).iter().zip(mc.iter())
            .map(|(cb, mk)| cb.conj() * *mk)
            .sum();
        Ok(phase * scalar)
    }

    /// Phase and unphased matrix `M` for one component pair:
    /// `M += factor_k · conj(bra basis col k) ⊗ ket basis col k` with
    /// `factor = eps · value · weight · qs` and
    /// `phase = exp(i/eps² (S_ket - conj(S_bra)))`. The ket's eps sets
    /// the scale throughout.
    fn pair_block<B, K>(
        &self,
        bra: &B,
        ket: &K,
        row: usize,
        col: usize,
        operator: Option<OperatorFn>,
    ) -> Result<(C64, nd::Array2<C64>), SimError>
    where
        B: Wavepacket + ?Sized,
        K: Wavepacket + ?Sized,
    {
        let eps = ket.eps();
        let pbra = bra.parameters(row);
        let pket = ket.parameters(col);
        let phase
            = (C64::i() / (eps * eps) * (pket.S - pbra.S.conj())).exp();
        let mut m: nd::Array2<C64>
            = nd::Array2::zeros((bra.basis_size(), ket.basis_size()));
        if operator.is_none() && row != col {
            // Kronecker delta in the component pair, independent of nodes
            return Ok((phase, m));
        }
        let mixed = mix_parameters(pbra, pket)
            .map_err(|source| SimError::mixing(row, col, source))?;
        let nodes = self.mapped_nodes(&mixed, eps, None);
        let values: nd::Array1<C64> = match operator {
            Some(f) => f(&nodes, (row, col)),
            None => nd::Array1::ones(nodes.len()),
        };
        if values.len() != nodes.len() {
            return Err(SimError::Config(format!(
                "operator returned {} values for {} nodes",
                values.len(), nodes.len(),
            )));
        }
        let factor: nd::Array1<C64>
            = values.iter().zip(self.rule.weights())
            .map(|(v, w)| *v * *w * eps * mixed.qs)
            .collect();
        let basis_bra = bra.evaluate_basis_at(&nodes, row, true);
        let basis_ket = ket.evaluate_basis_at(&nodes, col, true);
        for (k, fk) in factor.iter().enumerate() {
            for i in 0..m.nrows() {
                let bi = basis_bra[[i, k]].conj() * *fk;
                for j in 0..m.ncols() {
                    m[[i, j]] += bi * basis_ket[[j, k]];
                }
            }
        }
        Ok((phase, m))
    }
}

#[cfg(test)]
mod test {
    use rand::{ Rng, SeedableRng };
    use crate::packet::HagedornWavepacket;
    use super::*;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(10546)
    }

    /// Unit-spread parameter set rotated by `theta` and displaced: the
    /// harmonic-oscillator flow applied to the ground configuration.
    fn rotated(theta: f64, q: f64, p: f64) -> ParamSet {
        ParamSet::new(
            C64::new(-theta.sin(), theta.cos()),
            C64::new(theta.cos(), theta.sin()),
            C64::from(0.0),
            C64::from(p),
            C64::from(q),
        )
    }

    fn random_packet(
        r: &mut rand::rngs::StdRng,
        components: usize,
        basis_size: usize,
        eps: f64,
    ) -> HagedornWavepacket
    {
        let mut packet
            = HagedornWavepacket::new(components, basis_size, eps).unwrap();
        for c in 0..components {
            packet.set_parameters(c, rotated(
                r.gen_range(0.0..std::f64::consts::TAU),
                r.gen_range(-1.0..1.0),
                r.gen_range(-1.0..1.0),
            ));
            let coeffs: Vec<C64>
                = (0..basis_size)
                .map(|_| C64::new(
                    r.gen_range(-1.0..1.0), r.gen_range(-1.0..1.0)))
                .collect();
            packet.set_coefficients(c, &coeffs).unwrap();
        }
        packet
    }

    #[test]
    fn mixing_same_packet() {
        let pset = ParamSet {
            q: C64::from(2.0),
            ..ParamSet::default()
        };
        let mixed = mix_parameters(&pset, &pset).unwrap();
        assert!((mixed.q0 - 2.0).abs() < 1e-14);
        assert!((mixed.qs - 1.0).abs() < 1e-14);
        assert!(mixed.qs > 0.0);
    }

    #[test]
    fn mixing_degenerate_pairs() {
        let real_width = ParamSet {
            P: C64::from(1.0),
            ..ParamSet::default()
        };
        assert_eq!(
            mix_parameters(&real_width, &real_width),
            Err(MixError::ZeroDivisor),
        );
        let flipped = ParamSet {
            P: -C64::i(),
            ..ParamSet::default()
        };
        assert_eq!(
            mix_parameters(&flipped, &flipped),
            Err(MixError::NonPositiveSpread),
        );
    }

    #[test]
    fn node_transform_is_affine() {
        let rule = QuadratureRule::new(
            nd::array![-1.0, 0.0, 1.0],
            nd::array![1.0, 1.0, 1.0],
        ).unwrap();
        let engine = MixingQuadrature::new(rule);
        let pset = ParamSet {
            q: C64::from(5.0),
            ..ParamSet::default()
        };
        let nodes
            = engine.transform_nodes(&pset, &pset, 0.1, None).unwrap();
        assert!((nodes[0] - 4.9).abs() < 1e-14);
        assert!((nodes[1] - 5.0).abs() < 1e-14);
        assert!((nodes[2] - 5.1).abs() < 1e-14);
    }

    #[test]
    fn identity_gram_is_orthonormal() {
        let engine = MixingQuadrature::with_order(8).unwrap();
        let mut packet = HagedornWavepacket::new(1, 3, 0.2).unwrap();
        for pset in [ParamSet::default(), rotated(0.5, 0.3, -0.2)] {
            packet.set_parameters(0, pset);
            let gram = engine.build_matrix(&packet, &packet, None).unwrap();
            for i in 0..3 {
                for j in 0..3 {
                    let expected
                        = if i == j { C64::from(1.0) } else { C64::from(0.0) };
                    assert!(
                        (gram[[i, j]] - expected).norm() < 1e-10,
                        "({}, {}): {}", i, j, gram[[i, j]],
                    );
                }
            }
        }
    }

    #[test]
    fn identity_off_diagonal_blocks_are_exactly_zero() {
        let engine = MixingQuadrature::with_order(6).unwrap();
        let mut r = rng();
        let packet = random_packet(&mut r, 2, 2, 0.3);
        let gram = engine.build_matrix(&packet, &packet, None).unwrap();
        for (i, j) in [(0, 2), (0, 3), (1, 2), (1, 3)] {
            assert_eq!(gram[[i, j]], C64::from(0.0));
            assert_eq!(gram[[j, i]], C64::from(0.0));
        }
    }

    #[test]
    fn scalar_and_matrix_forms_agree() {
        let engine = MixingQuadrature::with_order(10).unwrap();
        let mut r = rng();
        let bra = random_packet(&mut r, 2, 2, 0.3);
        let ket = random_packet(&mut r, 2, 3, 0.3);
        let op = |nodes: &nd::Array1<f64>, (row, col): (usize, usize)|
            -> nd::Array1<C64>
        {
            nodes.mapv(|x| C64::from(x * x + (row + col) as f64))
        };
        let scalars = engine.quadrature(&bra, &ket, Some(&op)).unwrap();
        let matrix = engine.build_matrix(&bra, &ket, Some(&op)).unwrap();
        for row in 0..2 {
            for col in 0..2 {
                let block = matrix.slice(s![
                    row * 2..(row + 1) * 2,
                    col * 3..(col + 1) * 3,
                ]);
                let contracted: C64
                    = bra.coefficients(row).iter().enumerate()
                    .map(|(i, cb)| {
                        let inner: C64
                            = ket.coefficients(col).iter().enumerate()
                            .map(|(j, ck)| block[[i, j]] * *ck)
                            .sum();
                        cb.conj() * inner
                    })
                    .sum();
                let listed = scalars[row * 2 + col];
                assert!(
                    (listed - contracted).norm() < 1e-10,
                    "({}, {}): {} vs {}", row, col, listed, contracted,
                );
            }
        }
        let summed
            = engine.quadrature_summed(&bra, &ket, Some(&op)).unwrap();
        let total: C64 = scalars.iter().sum();
        assert!((summed - total).norm() < 1e-12);
        let single = engine
            .quadrature_component(&bra, &ket, Some(&op), (1, 0))
            .unwrap();
        assert!((single - scalars[2]).norm() < 1e-12);
    }

    #[test]
    fn packet_norm_from_quadrature() {
        let engine = MixingQuadrature::with_order(8).unwrap();
        let mut r = rng();
        let packet = random_packet(&mut r, 2, 3, 0.25);
        let norm2 = engine
            .quadrature_summed(&packet, &packet, None)
            .unwrap();
        let expected: f64
            = (0..2)
            .map(|c| {
                packet.coefficients(c).iter()
                    .map(|ck| ck.norm_sqr())
                    .sum::<f64>()
            })
            .sum();
        assert!(norm2.im.abs() < 1e-10);
        assert!((norm2.re - expected).abs() < 1e-10);
    }
}
