//! Post-run grid sampling of stored wavepacket histories.

use std::rc::Rc;
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use crate::{
    braket::MixingQuadrature,
    error::SimError,
    potential::Potential,
    storage::{
        GridQuantity,
        ResultStore,
        WavefunctionQuantity,
        WavepacketQuantity,
    },
};

/// Which basis sampled values are reported in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvalBasis {
    /// The basis the packets are propagated in.
    Canonical,
    /// The potential's adiabatic eigenbasis.
    Eigen,
}

/// Evaluate every stored wavepacket snapshot of `block` on the block's
/// sampling grid and record the results as wavefunction snapshots.
///
/// The wavefunction datasets are created here, sized to the recorded
/// history, so sampling the same block twice fails rather than
/// overwriting earlier samples.
pub fn sample_wavepackets<V>(
    store: &mut ResultStore,
    block: usize,
    potential: &V,
    basis: EvalBasis,
) -> Result<(), SimError>
where V: Potential
{
    let config = store.config().clone();
    store.register(Rc::new(GridQuantity { len: config.ngn }));
    store.register(Rc::new(WavepacketQuantity {
        components: potential.num_components(),
        basis_size: config.basis_size,
    }));
    let history = store.load_wavepacket(block)?;
    let grid = store.load_grid(block)?;
    store.register(Rc::new(WavefunctionQuantity {
        components: potential.num_components(),
        grid_len: grid.len(),
    }));
    store.add_quantity(WavefunctionQuantity::NAME, block, history.len())?;
    let engine = MixingQuadrature::with_order(config.quadrature_order())?;
    for slot in 0..history.len() {
        let mut packet = history.packet_at(slot, config.eps)?;
        if basis == EvalBasis::Eigen {
            packet.project_to_eigen(potential, &engine)?;
        }
        let values: nd::Array2<C64> = packet.evaluate_at(&grid, true);
        let timestep = history.timegrid[slot];
        store.save_wavefunction(block, &values, timestep as u64)?;
    }
    Ok(())
}
