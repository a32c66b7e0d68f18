#![allow(dead_code, non_snake_case, non_upper_case_globals)]
#![allow(unused_imports, unused_variables, unused_mut)]

use std::{
    env,
    f64::consts::TAU,
    fs,
    path::PathBuf,
    rc::Rc,
};
use ndarray as nd;
use num_complex::Complex64 as C64;
use hagedorn_sim::{
    mkdir,
    config::SimulationConfig,
    packet::{ ParamSet, Wavepacket },
    potential::Potential,
    sampling::{ sample_wavepackets, EvalBasis },
    simulation::SimulationLoop,
    storage::{ block_dataset, ResultStore, WavepacketQuantity },
};

const OMEGA: f64 = 1.0;

/// `V(x) = ω²x²/2` on a single surface.
#[derive(Copy, Clone, Debug)]
struct Harmonic {
    omega: f64,
}

impl Potential for Harmonic {
    fn num_components(&self) -> usize { 1 }

    fn evaluate(&self, nodes: &nd::Array1<f64>, _pair: (usize, usize))
        -> nd::Array1<C64>
    {
        let w2 = self.omega.powi(2);
        nodes.mapv(|x| C64::from(0.5 * w2 * x * x))
    }

    fn local_quadratic(&self, x: f64, _component: usize) -> (f64, f64, f64) {
        let w2 = self.omega.powi(2);
        (0.5 * w2 * x * x, w2 * x, w2)
    }
}

fn default_config() -> SimulationConfig {
    SimulationConfig {
        eps: 0.1,
        dt: 0.01,
        t_end: TAU, // one classical period
        basis_size: 8,
        quadrature_order: None,
        write_nth: 10,
        ngn: 512,
        grid_factor: 1.5,
        parameters: vec![ParamSet::new(
            C64::i(),
            C64::from(1.0),
            C64::from(0.0),
            C64::from(0.0),
            C64::from(1.0),
        )],
        coefficients: vec![vec![C64::from(1.0)]],
    }
}

fn main() -> anyhow::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => SimulationConfig::from_file(path)?,
        None => default_config(),
    };
    let potential = Harmonic { omega: OMEGA };

    let outdir = PathBuf::from("output");
    mkdir!(outdir);
    let target = outdir.join("harmonic");
    if target.exists() { fs::remove_dir_all(&target)?; }

    let mut sim = SimulationLoop::new(config, &potential, &target);
    sim.prepare()?;
    sim.run()?;
    sim.finalize()?;

    let mut store = ResultStore::load(&target)?;
    let eps = store.config().eps;
    let basis_size = store.config().basis_size;
    store.register(Rc::new(WavepacketQuantity {
        components: potential.num_components(),
        basis_size,
    }));
    let history = store.load_wavepacket(0)?;
    println!("recorded {} snapshots", history.len());
    let packet = history.packet_at(history.len() - 1, eps)?;
    println!(
        "final |c| = {:.6}, center = {:+.6}",
        packet.coefficient_norm(),
        packet.parameters(0).q.re,
    );
    let tg_path = block_dataset(0, "wavepacket/timegrid");
    let mid = history.timegrid[history.len() / 2] as u64;
    println!(
        "timestep {} sits in slot {}",
        mid,
        store.find_slot(&tg_path, mid)?,
    );

    sample_wavepackets(&mut store, 0, &potential, EvalBasis::Canonical)?;
    store.close()?;

    println!("done");
    Ok(())
}
