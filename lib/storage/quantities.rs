//! Named families of datasets a store can be taught to hold.
//!
//! Registering a quantity with a [`ResultStore`] advertises the matching
//! save/load capability; calling [`ResultStore::add_quantity`] then
//! materializes the quantity's datasets inside one block, sized for a
//! given number of snapshot slots.

use crate::{
    error::SimError,
    storage::{ block_dataset, DatasetKind, ResultStore },
};

/// A named family of datasets.
pub trait StoreQuantity {
    /// Registry name.
    fn name(&self) -> &str;

    /// Create this quantity's datasets under block `block` with room for
    /// `timeslots` snapshots.
    fn add(&self, store: &mut ResultStore, block: usize, timeslots: usize)
        -> Result<(), SimError>;
}

/// The block's fixed sampling grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridQuantity {
    /// Number of grid nodes.
    pub len: usize,
}

impl GridQuantity {
    pub const NAME: &'static str = "grid";
}

impl StoreQuantity for GridQuantity {
    fn name(&self) -> &str { Self::NAME }

    fn add(&self, store: &mut ResultStore, block: usize, _timeslots: usize)
        -> Result<(), SimError>
    {
        store.create_dataset(
            &block_dataset(block, "grid"),
            DatasetKind::Real,
            &[self.len],
        )
    }
}

/// Wavepacket snapshots: a timegrid, one parameter-row dataset per
/// component, and a coefficient slab.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WavepacketQuantity {
    /// Number of components `N`.
    pub components: usize,
    /// Uniform basis size `K`.
    pub basis_size: usize,
}

impl WavepacketQuantity {
    pub const NAME: &'static str = "wavepacket";
}

impl StoreQuantity for WavepacketQuantity {
    fn name(&self) -> &str { Self::NAME }

    fn add(&self, store: &mut ResultStore, block: usize, timeslots: usize)
        -> Result<(), SimError>
    {
        store.create_dataset(
            &block_dataset(block, "wavepacket/timegrid"),
            DatasetKind::Int,
            &[timeslots],
        )?;
        for c in 0..self.components {
            store.create_dataset(
                &block_dataset(
                    block, &format!("wavepacket/parameters_{}", c)),
                DatasetKind::Complex,
                &[timeslots, 5],
            )?;
        }
        store.create_dataset(
            &block_dataset(block, "wavepacket/coefficients"),
            DatasetKind::Complex,
            &[timeslots, self.components, self.basis_size],
        )
    }
}

/// Grid-sampled wavefunction snapshots: a timegrid and a value slab with
/// one row of grid samples per component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WavefunctionQuantity {
    /// Number of components `N`.
    pub components: usize,
    /// Number of grid nodes.
    pub grid_len: usize,
}

impl WavefunctionQuantity {
    pub const NAME: &'static str = "wavefunction";
}

impl StoreQuantity for WavefunctionQuantity {
    fn name(&self) -> &str { Self::NAME }

    fn add(&self, store: &mut ResultStore, block: usize, timeslots: usize)
        -> Result<(), SimError>
    {
        store.create_dataset(
            &block_dataset(block, "wavefunction/timegrid"),
            DatasetKind::Int,
            &[timeslots],
        )?;
        store.create_dataset(
            &block_dataset(block, "wavefunction/values"),
            DatasetKind::Complex,
            &[timeslots, self.components, self.grid_len],
        )
    }
}
