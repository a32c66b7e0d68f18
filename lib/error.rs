//! Error taxonomy for the whole crate.
//!
//! Every failure is fatal and carries the context needed to locate it:
//! target paths, dataset paths, timesteps, component indices, counts. No
//! operation retries internally.

use std::path::PathBuf;
use thiserror::Error;
use crate::simulation::Stage;

/// Why a parameter mix is undefined for a pair of parameter sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum MixError {
    /// The mixed width `conj(Pr/Qr) - Pc/Qc` has zero imaginary part, so
    /// the mixed center is a division by zero.
    #[error("mixed width has zero imaginary part")]
    ZeroDivisor,
    /// The mixed spread `-im(r)/2` is not positive, so its square root is
    /// not a real scaling.
    #[error("mixed spread is not positive")]
    NonPositiveSpread,
}

#[derive(Debug, Error)]
pub enum SimError {
    /// Fewer initial parameter sets than the potential has components.
    #[error("too few initial parameter sets: got {got}, need {need}")]
    TooFewParameters { got: usize, need: usize },

    /// Fewer initial coefficient vectors than the potential has components.
    #[error("too few initial coefficient vectors: got {got}, need {need}")]
    TooFewCoefficients { got: usize, need: usize },

    /// An initial coefficient vector does not fit the basis.
    #[error(
        "coefficient vector for component {component} has {len} entries, \
        basis size is {basis_size}"
    )]
    CoefficientLength { component: usize, len: usize, basis_size: usize },

    /// A quadrature rule of the requested order cannot be built.
    #[error("invalid quadrature order {0}")]
    QuadratureOrder(usize),

    /// Any other invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A loop entry point was called out of order.
    #[error("simulation loop is {found:?}, expected {expected:?}")]
    Stage { expected: Stage, found: Stage },

    /// The output target already exists; existing data is never clobbered.
    #[error("output target {0:?} already exists")]
    TargetExists(PathBuf),

    /// The output target does not exist.
    #[error("output target {0:?} does not exist")]
    TargetMissing(PathBuf),

    /// The store was closed and can no longer be used.
    #[error("store is closed")]
    StoreClosed,

    /// A dataset path contains characters outside the allowed alphabet.
    #[error("invalid dataset path {0:?}")]
    InvalidPath(String),

    /// No dataset is recorded under the path.
    #[error("no dataset at {0:?}")]
    DatasetMissing(String),

    /// A dataset already exists under the path.
    #[error("dataset {0:?} already exists")]
    DatasetExists(String),

    /// A dataset does not have the expected number of axes.
    #[error("dataset {path:?} has {found} axes, expected {expected}")]
    DatasetRank { path: String, expected: usize, found: usize },

    /// A dataset does not hold the expected element kind.
    #[error("dataset {path:?} holds {found} data, expected {expected}")]
    DatasetKind {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// No slot of the timegrid holds the requested timestep.
    #[error("no slot for timestep {timestep} in {path:?}")]
    TimestepMissing { path: String, timestep: u64 },

    /// A save would take a timegrid backwards or repeat an entry.
    #[error("timestep {timestep} does not advance {path:?} (last is {last})")]
    NonMonotonic { path: String, timestep: u64, last: i64 },

    /// No storage capability is registered under the name.
    #[error("storage capability {0:?} is not registered")]
    CapabilityMissing(String),

    /// A block recorded in the store attributes has no directory.
    #[error("block {block} is recorded but has no container")]
    BlockMissing { block: usize },

    /// The recorded block count disagrees with the containers present.
    #[error("store records {recorded} blocks but {found} containers exist")]
    BlockCount { recorded: usize, found: usize },

    /// A parameter mix is undefined for a component pair.
    #[error("degenerate parameter mix for component pair \
        ({row}, {col}): {source}")]
    Mixing { row: usize, col: usize, source: MixError },

    /// An eigendecomposition or inversion failed.
    #[error("linear algebra failure: {0}")]
    Linalg(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse failure: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("configuration write failure: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("dataset read failure: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("dataset write failure: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
}

impl SimError {
    /// Attach component-pair context to a [`MixError`].
    pub fn mixing(row: usize, col: usize, source: MixError) -> Self {
        Self::Mixing { row, col, source }
    }
}
