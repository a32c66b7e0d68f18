//! Staged driver for one propagation run.
//!
//! A [`SimulationLoop`] walks a fixed lifecycle: `prepare` validates the
//! configuration, builds the initial wavepacket and the result store,
//! and records the initial snapshot; `run` steps the propagator through
//! every timestep, recording snapshots on the configured schedule;
//! `finalize` closes the store. Entry points called out of order fail
//! without touching any state.

use std::{
    path::{ Path, PathBuf },
    rc::Rc,
};
use crate::{
    braket::MixingQuadrature,
    config::SimulationConfig,
    error::SimError,
    packet::HagedornWavepacket,
    potential::Potential,
    propagator::{ HagedornPropagator, Propagator },
    storage::{ GridQuantity, ResultStore, WavepacketQuantity },
};

/// Lifecycle stage of a [`SimulationLoop`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    Prepared,
    Running,
    Finalized,
}

/// Staged driver tying together configuration, propagation, and storage
/// for a single run over a single data block.
pub struct SimulationLoop<'a, V>
where V: Potential
{
    config: SimulationConfig,
    potential: &'a V,
    target: PathBuf,
    stage: Stage,
    propagator: Option<HagedornPropagator<'a, V>>,
    store: Option<ResultStore>,
    block: usize,
}

impl<'a, V> SimulationLoop<'a, V>
where V: Potential
{
    /// Set up a loop writing results to `target`.
    pub fn new<P>(config: SimulationConfig, potential: &'a V, target: P)
        -> Self
    where P: AsRef<Path>
    {
        Self {
            config,
            potential,
            target: target.as_ref().to_path_buf(),
            stage: Stage::Uninitialized,
            propagator: None,
            store: None,
            block: 0,
        }
    }

    /// Current lifecycle stage.
    pub fn stage(&self) -> Stage { self.stage }

    /// Run configuration.
    pub fn config(&self) -> &SimulationConfig { &self.config }

    /// Propagated wavepacket, once prepared.
    pub fn wavepacket(&self) -> Option<&HagedornWavepacket> {
        self.propagator.as_ref().map(|prop| prop.wavepacket())
    }

    /// Result store, once prepared.
    pub fn store(&self) -> Option<&ResultStore> { self.store.as_ref() }

    fn require(&self, expected: Stage) -> Result<(), SimError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(SimError::Stage { expected, found: self.stage })
        }
    }

    /// Validate the configuration, build the initial wavepacket and the
    /// result store, and record the initial snapshot at timestep 0.
    ///
    /// Validation happens before anything is written, so a bad
    /// configuration never leaves a store behind.
    pub fn prepare(&mut self) -> Result<(), SimError> {
        self.require(Stage::Uninitialized)?;
        let n = self.potential.num_components();
        self.config.validate(n)?;
        let mut packet = HagedornWavepacket::new(
            n, self.config.basis_size, self.config.eps)?;
        for (c, pset) in self.config.parameters.iter().take(n).enumerate() {
            packet.set_parameters(c, *pset);
        }
        for (c, coeffs)
            in self.config.coefficients.iter().take(n).enumerate()
        {
            packet.set_coefficients(c, coeffs)?;
        }
        let engine
            = MixingQuadrature::with_order(self.config.quadrature_order())?;
        packet.project_to_canonical(self.potential, &engine)?;
        let propagator
            = HagedornPropagator::new(self.potential, packet, &self.config)?;
        let mut store = ResultStore::create(&self.target, &self.config)?;
        let timeslots = self.config.num_save_slots();
        store.register(Rc::new(GridQuantity { len: self.config.ngn }));
        store.register(Rc::new(WavepacketQuantity {
            components: n,
            basis_size: self.config.basis_size,
        }));
        store.add_quantity(GridQuantity::NAME, self.block, timeslots)?;
        store.add_quantity(WavepacketQuantity::NAME, self.block, timeslots)?;
        store.save_grid(self.block, &self.config.grid())?;
        store.save_wavepacket(self.block, propagator.wavepacket(), 0)?;
        self.propagator = Some(propagator);
        self.store = Some(store);
        self.stage = Stage::Prepared;
        Ok(())
    }

    /// Step the propagator through every timestep, recording a snapshot
    /// after each `write_nth`-th step.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.require(Stage::Prepared)?;
        self.stage = Stage::Running;
        let nsteps = self.config.nsteps();
        let (Some(propagator), Some(store))
            = (self.propagator.as_mut(), self.store.as_mut())
            else { panic!("SimulationLoop::run: not prepared"); };
        for step in 1..=nsteps {
            crate::println_flush!(" doing timestep {}", step);
            propagator.propagate()?;
            if self.config.must_save(step) {
                store.save_wavepacket(
                    self.block, propagator.wavepacket(), step)?;
            }
        }
        Ok(())
    }

    /// Close the result store and finish the loop.
    pub fn finalize(&mut self) -> Result<(), SimError> {
        self.require(Stage::Running)?;
        let Some(store) = self.store.as_mut() else {
            panic!("SimulationLoop::finalize: not prepared");
        };
        store.close()?;
        self.stage = Stage::Finalized;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use num_complex::Complex64 as C64;
    use tempfile::tempdir;
    use crate::{
        packet::ParamSet,
        potential::testing::Harmonic,
        storage::block_dataset,
    };
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            eps: 0.1,
            dt: 0.01,
            t_end: 0.03,
            basis_size: 2,
            quadrature_order: None,
            write_nth: 1,
            ngn: 8,
            grid_factor: 1.0,
            parameters: vec![ParamSet::default()],
            coefficients: vec![vec![C64::from(1.0)]],
        }
    }

    #[test]
    fn stages_gate_entry_points() {
        let dir = tempdir().unwrap();
        let potential = Harmonic { omega: 1.0 };
        let mut sim = SimulationLoop::new(
            config(), &potential, dir.path().join("out"));
        assert_eq!(sim.stage(), Stage::Uninitialized);
        assert!(matches!(
            sim.run(),
            Err(SimError::Stage {
                expected: Stage::Prepared,
                found: Stage::Uninitialized,
            }),
        ));
        assert!(matches!(sim.finalize(), Err(SimError::Stage { .. })));
        sim.prepare().unwrap();
        assert_eq!(sim.stage(), Stage::Prepared);
        assert!(matches!(
            sim.prepare(),
            Err(SimError::Stage {
                expected: Stage::Uninitialized,
                found: Stage::Prepared,
            }),
        ));
        assert!(matches!(sim.finalize(), Err(SimError::Stage { .. })));
        sim.run().unwrap();
        sim.finalize().unwrap();
        assert_eq!(sim.stage(), Stage::Finalized);
        assert!(matches!(sim.run(), Err(SimError::Stage { .. })));
    }

    #[test]
    fn validation_precedes_store_creation() {
        let dir = tempdir().unwrap();
        let potential = Harmonic { omega: 1.0 };
        let mut bad = config();
        bad.parameters.clear();
        let target = dir.path().join("out");
        let mut sim = SimulationLoop::new(bad, &potential, &target);
        assert!(matches!(
            sim.prepare(),
            Err(SimError::TooFewParameters { .. }),
        ));
        assert!(!target.exists());
    }

    #[test]
    fn end_to_end_records_scheduled_snapshots() {
        let dir = tempdir().unwrap();
        let potential = Harmonic { omega: 1.0 };
        let target = dir.path().join("out");
        let mut sim = SimulationLoop::new(config(), &potential, &target);
        sim.prepare().unwrap();
        sim.run().unwrap();
        sim.finalize().unwrap();

        let mut store = ResultStore::load(&target).unwrap();
        store.register(Rc::new(WavepacketQuantity {
            components: 1,
            basis_size: 2,
        }));
        store.register(Rc::new(GridQuantity { len: 8 }));
        let history = store.load_wavepacket(0).unwrap();
        assert_eq!(
            history.timegrid.iter().copied().collect::<Vec<i64>>(),
            vec![0, 1, 2, 3],
        );
        assert_eq!(history.coefficients.shape(), &[4, 1, 2]);
        assert_eq!(
            store.find_slot(
                &block_dataset(0, "wavepacket/timegrid"), 2).unwrap(),
            2,
        );
        let packet = history.packet_at(3, store.config().eps).unwrap();
        assert!((packet.coefficient_norm() - 1.0).abs() < 1e-10);
        assert_eq!(store.load_grid(0).unwrap().len(), 8);
    }

    #[test]
    fn sparse_save_schedule_sizes_series_exactly() {
        let dir = tempdir().unwrap();
        let potential = Harmonic { omega: 1.0 };
        let target = dir.path().join("out");
        let mut cfg = config();
        cfg.t_end = 0.04;
        cfg.write_nth = 2;
        let mut sim = SimulationLoop::new(cfg, &potential, &target);
        sim.prepare().unwrap();
        sim.run().unwrap();
        sim.finalize().unwrap();

        let mut store = ResultStore::load(&target).unwrap();
        store.register(Rc::new(WavepacketQuantity {
            components: 1,
            basis_size: 2,
        }));
        let tg_path = block_dataset(0, "wavepacket/timegrid");
        assert_eq!(store.dataset_shape(&tg_path).unwrap(), vec![3]);
        let history = store.load_wavepacket(0).unwrap();
        assert_eq!(
            history.timegrid.iter().copied().collect::<Vec<i64>>(),
            vec![0, 2, 4],
        );
    }

    #[test]
    fn zero_write_nth_records_initial_snapshot_only() {
        let dir = tempdir().unwrap();
        let potential = Harmonic { omega: 1.0 };
        let target = dir.path().join("out");
        let mut cfg = config();
        cfg.write_nth = 0;
        let mut sim = SimulationLoop::new(cfg, &potential, &target);
        sim.prepare().unwrap();
        sim.run().unwrap();
        sim.finalize().unwrap();

        let mut store = ResultStore::load(&target).unwrap();
        store.register(Rc::new(WavepacketQuantity {
            components: 1,
            basis_size: 2,
        }));
        let history = store.load_wavepacket(0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.timegrid[0], 0);
    }
}
