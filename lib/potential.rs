//! Interface to matrix-valued potentials.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;

/// A matrix-valued potential `V(x)` over a fixed number of components.
///
/// `evaluate` samples canonical-basis matrix entries on a set of real
/// nodes; `local_quadratic` supplies the Taylor data of one eigenvalue at
/// a point; `eigenvector` samples entries of the diagonalizing matrix
/// `U(x)` whose columns are the eigenvectors. The default `eigenvector`
/// is the identity, which is exact for one-component potentials.
pub trait Potential {
    /// Number of components (rows and columns of the matrix).
    fn num_components(&self) -> usize;

    /// Entry `(row, col)` of the canonical potential matrix on `nodes`.
    fn evaluate(&self, nodes: &nd::Array1<f64>, component: (usize, usize))
        -> nd::Array1<C64>;

    /// Value and first two derivatives of the `component`-th eigenvalue
    /// at a real point.
    fn local_quadratic(&self, x: f64, component: usize) -> (f64, f64, f64);

    /// Entry `(row, col)` of the eigenvector matrix on `nodes`.
    fn eigenvector(&self, nodes: &nd::Array1<f64>, component: (usize, usize))
        -> nd::Array1<C64>
    {
        if component.0 == component.1 {
            nd::Array1::ones(nodes.len())
        } else {
            nd::Array1::zeros(nodes.len())
        }
    }
}
