//! Quadrature rules: immutable node/weight pairs plus providers.
//!
//! The Gauss–Hermite provider produces *total-integrand* weights: the
//! `e^{x²}` factor is folded in, so a sum `Σ_k w_k f(x_k)` integrates an
//! `f` that already carries its own Gaussian decay. This is the form the
//! quadrature engine consumes, since Hagedorn basis functions decay on
//! their own.

use ndarray::{ self as nd };
use ndarray_linalg::{ EighInto, UPLO };
use num_traits::Zero;
use crate::error::SimError;

/// An immutable quadrature rule: nodes and matching weights.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadratureRule {
    nodes: nd::Array1<f64>,
    weights: nd::Array1<f64>,
}

impl QuadratureRule {
    /// Create a rule from explicit nodes and weights.
    ///
    /// The arrays must be nonempty and of equal length.
    pub fn new(nodes: nd::Array1<f64>, weights: nd::Array1<f64>)
        -> Result<Self, SimError>
    {
        if nodes.is_empty() || nodes.len() != weights.len() {
            return Err(SimError::Config(format!(
                "quadrature rule with {} nodes and {} weights",
                nodes.len(), weights.len(),
            )));
        }
        Ok(Self { nodes, weights })
    }

    /// Build the Gauss–Hermite rule of a given order.
    ///
    /// Nodes are the eigenvalues of the symmetric tridiagonal Jacobi
    /// matrix; weights are `1 / (R h_{R-1}(x_k)²)` with `h` the
    /// orthonormal Hermite functions, which equals the textbook weight
    /// times `e^{x_k²}`.
    pub fn gauss_hermite(order: usize) -> Result<Self, SimError> {
        if order == 0 { return Err(SimError::QuadratureOrder(order)); }
        let mut jacobi: nd::Array2<f64> = nd::Array2::zeros((order, order));
        for k in 1..order {
            let b = (k as f64 / 2.0).sqrt();
            jacobi[[k - 1, k]] = b;
            jacobi[[k, k - 1]] = b;
        }
        let (nodes, _) = jacobi.eigh_into(UPLO::Lower)
            .map_err(|err| SimError::Linalg(err.to_string()))?;
        let h = hermite_rows(&nodes, order);
        let weights: nd::Array1<f64>
            = (0..order)
            .map(|k| {
                let hn = h[[order - 1, k]];
                1.0 / (order as f64 * hn * hn)
            })
            .collect();
        Ok(Self { nodes, weights })
    }

    /// Build the composite trapezoidal rule with `n` nodes on `[a, b]`.
    pub fn trapezoidal(a: f64, b: f64, n: usize) -> Result<Self, SimError> {
        if n < 2 { return Err(SimError::QuadratureOrder(n)); }
        if b <= a {
            return Err(SimError::Config(format!(
                "empty quadrature interval [{}, {}]", a, b,
            )));
        }
        let dx = (b - a) / (n as f64 - 1.0);
        let nodes: nd::Array1<f64>
            = (0..n).map(|k| a + k as f64 * dx).collect();
        let mut weights: nd::Array1<f64> = nd::Array1::from_elem(n, dx);
        weights[0] = 0.5 * dx;
        weights[n - 1] = 0.5 * dx;
        Ok(Self { nodes, weights })
    }

    /// Weighted sum `Σ_k w_k y_k` of values sampled on this rule's
    /// nodes.
    ///
    /// *Panics* if `y` does not hold one value per node.
    pub fn integrate<A>(&self, y: &nd::Array1<A>) -> A
    where
        A: Clone + std::ops::Add<Output = A> + std::ops::Mul<f64, Output = A>
            + Zero,
    {
        if y.len() != self.nodes.len() {
            panic!(
                "QuadratureRule::integrate: expected {} values, got {}",
                self.nodes.len(), y.len(),
            );
        }
        y.iter().zip(self.weights.iter())
            .fold(A::zero(), |acc, (yk, wk)| acc + yk.clone() * *wk)
    }

    /// Number of nodes.
    pub fn order(&self) -> usize { self.nodes.len() }

    pub fn nodes(&self) -> &nd::Array1<f64> { &self.nodes }

    pub fn weights(&self) -> &nd::Array1<f64> { &self.weights }
}

/// Rows 0 through `count - 1` of the orthonormal Hermite functions
/// (Gaussian factor included) evaluated on `nodes`.
fn hermite_rows(nodes: &nd::Array1<f64>, count: usize) -> nd::Array2<f64> {
    let mut h: nd::Array2<f64> = nd::Array2::zeros((count, nodes.len()));
    let norm = std::f64::consts::PI.powf(-0.25);
    for (j, &x) in nodes.iter().enumerate() {
        h[[0, j]] = norm * (-0.5 * x * x).exp();
    }
    if count > 1 {
        for (j, &x) in nodes.iter().enumerate() {
            h[[1, j]] = 2.0_f64.sqrt() * x * h[[0, j]];
        }
    }
    for k in 2..count {
        let a = (2.0 / k as f64).sqrt();
        let b = ((k as f64 - 1.0) / k as f64).sqrt();
        for (j, &x) in nodes.iter().enumerate() {
            h[[k, j]] = a * x * h[[k - 1, j]] - b * h[[k - 2, j]];
        }
    }
    h
}
