#![allow(dead_code, non_snake_case, non_upper_case_globals)]
#![allow(unused_imports, unused_variables, unused_mut)]

use std::{
    fs,
    path::PathBuf,
    rc::Rc,
};
use ndarray as nd;
use num_complex::Complex64 as C64;
use hagedorn_sim::{
    mkdir,
    braket::MixingQuadrature,
    config::SimulationConfig,
    packet::{ ParamSet, Wavepacket },
    potential::Potential,
    quadrature::QuadratureRule,
    sampling::{ sample_wavepackets, EvalBasis },
    simulation::SimulationLoop,
    storage::{
        GridQuantity,
        ResultStore,
        WavefunctionQuantity,
        WavepacketQuantity,
    },
};

const DELTA: f64 = 0.05; // half the gap at the crossing
const EPS: f64 = 0.2;
const Q0: f64 = -3.0;
const P0: f64 = 0.5;

/// Two-surface avoided crossing: canonical matrix
/// `[[tanh(x)/2, δ], [δ, -tanh(x)/2]]` with adiabatic surfaces
/// `±sqrt(tanh²(x)/4 + δ²)`. Component 0 is the upper surface.
#[derive(Copy, Clone, Debug)]
struct DeltaGap {
    delta: f64,
}

impl DeltaGap {
    fn lambda(&self, x: f64) -> f64 {
        (0.25 * x.tanh().powi(2) + self.delta.powi(2)).sqrt()
    }

    // (λ, λ', λ'') of the upper surface at x
    fn taylor(&self, x: f64) -> (f64, f64, f64) {
        let th = x.tanh();
        let sech2 = 1.0 - th * th;
        let l = self.lambda(x);
        let dl = 0.25 * th * sech2 / l;
        let ddl
            = 0.25 * (sech2 * sech2 - 2.0 * th * th * sech2) / l
            - dl * dl / l;
        (l, dl, ddl)
    }
}

impl Potential for DeltaGap {
    fn num_components(&self) -> usize { 2 }

    fn evaluate(&self, nodes: &nd::Array1<f64>, pair: (usize, usize))
        -> nd::Array1<C64>
    {
        match pair {
            (0, 0) => nodes.mapv(|x| C64::from(0.5 * x.tanh())),
            (1, 1) => nodes.mapv(|x| C64::from(-0.5 * x.tanh())),
            _ => nd::Array1::from_elem(nodes.len(), C64::from(self.delta)),
        }
    }

    fn local_quadratic(&self, x: f64, component: usize) -> (f64, f64, f64) {
        let (l, dl, ddl) = self.taylor(x);
        match component {
            0 => (l, dl, ddl),
            1 => (-l, -dl, -ddl),
            _ => panic!("DeltaGap::local_quadratic: no surface {}", component),
        }
    }

    fn eigenvector(&self, nodes: &nd::Array1<f64>, pair: (usize, usize))
        -> nd::Array1<C64>
    {
        nodes.mapv(|x| {
            let a = 0.5 * x.tanh();
            let b = self.delta;
            let l = self.lambda(x);
            let norm = ((a + l).powi(2) + b * b).sqrt();
            let u = match pair {
                (0, 0) => (a + l) / norm,
                (1, 0) => b / norm,
                (0, 1) => -b / norm,
                (1, 1) => (a + l) / norm,
                _ => panic!("DeltaGap::eigenvector: no entry {:?}", pair),
            };
            C64::from(u)
        })
    }
}

fn default_config() -> SimulationConfig {
    let pset = ParamSet::new(
        C64::i(),
        C64::from(1.0),
        C64::from(0.0),
        C64::from(P0),
        C64::from(Q0),
    );
    SimulationConfig {
        eps: EPS,
        dt: 0.01,
        t_end: 10.0,
        basis_size: 16,
        quadrature_order: None,
        write_nth: 20,
        ngn: 1024,
        grid_factor: 2.0,
        parameters: vec![pset; 2],
        // all population starts on the upper surface, in the eigenbasis
        coefficients: vec![vec![C64::from(1.0)], vec![]],
    }
}

fn main() -> anyhow::Result<()> {
    let potential = DeltaGap { delta: DELTA };

    let outdir = PathBuf::from("output");
    mkdir!(outdir);
    let target = outdir.join("avoided_crossing");
    if target.exists() { fs::remove_dir_all(&target)?; }

    let mut sim = SimulationLoop::new(default_config(), &potential, &target);
    sim.prepare()?;
    sim.run()?;
    sim.finalize()?;

    let mut store = ResultStore::load(&target)?;
    let eps = store.config().eps;
    let basis_size = store.config().basis_size;
    let ngn = store.config().ngn;
    let engine
        = MixingQuadrature::with_order(store.config().quadrature_order())?;
    store.register(Rc::new(WavepacketQuantity {
        components: potential.num_components(),
        basis_size,
    }));
    store.register(Rc::new(GridQuantity { len: ngn }));
    store.register(Rc::new(WavefunctionQuantity {
        components: potential.num_components(),
        grid_len: ngn,
    }));
    let history = store.load_wavepacket(0)?;
    let mut packet = history.packet_at(history.len() - 1, eps)?;
    packet.project_to_eigen(&potential, &engine)?;
    let pop: Vec<f64> = (0..packet.num_components())
        .map(|c| {
            packet.coefficients(c).iter()
                .map(|a| a.norm_sqr())
                .sum::<f64>()
        })
        .collect();
    println!("final populations:");
    println!("  upper = {:.6}", pop[0]);
    println!("  lower = {:.6}", pop[1]);

    sample_wavepackets(&mut store, 0, &potential, EvalBasis::Eigen)?;

    // cross-check: per-surface norms of the last sampled wavefunction
    let grid = store.load_grid(0)?;
    let rule = QuadratureRule::trapezoidal(
        grid[0], grid[grid.len() - 1], grid.len())?;
    let (_, samples) = store.load_wavefunction(0)?;
    let last = samples.index_axis(nd::Axis(0), samples.shape()[0] - 1);
    println!("grid norms of the last snapshot:");
    for c in 0..2 {
        let density: nd::Array1<f64> = last.row(c).mapv(|a| a.norm_sqr());
        println!("  surface {} = {:.6}", c, rule.integrate(&density));
    }
    store.close()?;

    println!("done");
    Ok(())
}
