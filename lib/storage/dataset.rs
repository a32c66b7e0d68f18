//! In-memory datasets of the three storable element kinds.

use ndarray::{ self as nd, Axis, Slice };
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };

/// Fill value marking unused timegrid slots; any negative entry is
/// treated as unused.
pub const TIMEGRID_FILL: i64 = -1;

/// Element kind of a stored dataset, as recorded in the store manifest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Real,
    Int,
    Complex,
}

impl DatasetKind {
    /// Manifest name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Int => "int",
            Self::Complex => "complex",
        }
    }
}

/// A dynamic-rank array of one of the storable element kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Dataset {
    Real(nd::ArrayD<f64>),
    Int(nd::ArrayD<i64>),
    Complex(nd::ArrayD<C64>),
}

impl Dataset {
    /// Allocate a dataset of `kind` and `shape` holding the kind's fill
    /// value everywhere ([`TIMEGRID_FILL`] for int, zero otherwise).
    pub fn filled(kind: DatasetKind, shape: &[usize]) -> Self {
        match kind {
            DatasetKind::Real => {
                Self::Real(nd::ArrayD::zeros(shape.to_vec()))
            },
            DatasetKind::Int => {
                Self::Int(nd::ArrayD::from_elem(shape.to_vec(), TIMEGRID_FILL))
            },
            DatasetKind::Complex => {
                Self::Complex(nd::ArrayD::zeros(shape.to_vec()))
            },
        }
    }

    /// Element kind.
    pub fn kind(&self) -> DatasetKind {
        match self {
            Self::Real(_) => DatasetKind::Real,
            Self::Int(_) => DatasetKind::Int,
            Self::Complex(_) => DatasetKind::Complex,
        }
    }

    /// Current shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Real(a) => a.shape(),
            Self::Int(a) => a.shape(),
            Self::Complex(a) => a.shape(),
        }
    }

    /// Grow along `axis` so that index `slot` is addressable, preserving
    /// existing contents and filling new entries with the kind's fill
    /// value. Never shrinks; a no-op when `slot` already fits.
    ///
    /// *Panics* if `axis` is out of bounds for the dataset's rank.
    pub fn ensure_capacity(&mut self, slot: usize, axis: usize) {
        match self {
            Self::Real(a) => {
                if let Some(g) = grown(a, slot, axis, 0.0) { *a = g; }
            },
            Self::Int(a) => {
                if let Some(g) = grown(a, slot, axis, TIMEGRID_FILL) { *a = g; }
            },
            Self::Complex(a) => {
                if let Some(g) = grown(a, slot, axis, C64::from(0.0)) { *a = g; }
            },
        }
    }
}

fn grown<A>(arr: &nd::ArrayD<A>, slot: usize, axis: usize, fill: A)
    -> Option<nd::ArrayD<A>>
where A: Copy
{
    let old = arr.shape()[axis];
    if slot < old { return None; }
    let mut shape = arr.shape().to_vec();
    shape[axis] = slot + 1;
    let mut out = nd::ArrayD::from_elem(shape, fill);
    out.slice_axis_mut(Axis(axis), Slice::from(..old)).assign(arr);
    Some(out)
}
