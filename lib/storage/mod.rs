//! Directory-backed storage for simulation results.
//!
//! A store is a directory holding a TOML attribute record
//! (`attributes.toml`), a copy of the run configuration
//! (`simulation_parameters.toml`), and numbered block containers
//! (`datablock_N/`) of `.npy` datasets. Datasets are addressed by
//! slash-separated paths relative to the store root and every mutation
//! is written through to disk, so the on-disk state is valid after each
//! operation.
//!
//! Time series datasets share a slot discipline: the leading axis counts
//! snapshot slots, a block-local timegrid records which timestep landed
//! in each slot, and unused slots hold [`TIMEGRID_FILL`]. Saving claims
//! the first unused slot, growing the series when none is free; lookup
//! by timestep is exact match only.

use std::{
    fs::{ self, File },
    path::{ Path, PathBuf },
    rc::Rc,
};
use indexmap::IndexMap;
use ndarray::{ self as nd, s };
use ndarray_npy::{ ReadNpyExt, WriteNpyExt };
use num_complex::Complex64 as C64;
use regex::Regex;
use rustc_hash::FxHashMap as HashMap;
use serde::{ Deserialize, Serialize };
use crate::{
    config::SimulationConfig,
    error::SimError,
    packet::{ HagedornWavepacket, ParamSet, Wavepacket },
};

pub mod dataset;
pub use dataset::{ Dataset, DatasetKind, TIMEGRID_FILL };

pub mod quantities;
pub use quantities::{
    GridQuantity,
    StoreQuantity,
    WavefunctionQuantity,
    WavepacketQuantity,
};

const ATTRIBUTES_FILE: &str = "attributes.toml";
const CONFIG_FILE: &str = "simulation_parameters.toml";

/// Join a block index and a block-local dataset path.
pub fn block_dataset(block: usize, tail: &str) -> String {
    format!("datablock_{}/{}", block, tail)
}

/// On-disk attribute record: the block count plus the dataset manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreAttributes {
    number_blocks: usize,
    datasets: IndexMap<String, DatasetKind>,
}

/// History of one block's wavepacket snapshots, trimmed to the filled
/// prefix of its timegrid.
#[derive(Clone, Debug)]
pub struct WavepacketHistory {
    /// Recorded timesteps.
    pub timegrid: nd::Array1<i64>,
    /// Per-component parameter rows; entry `c` has shape `[slots, 5]`.
    pub parameters: Vec<nd::Array2<C64>>,
    /// Coefficient slab of shape `[slots, N, K]`.
    pub coefficients: nd::Array3<C64>,
}

impl WavepacketHistory {
    /// Number of recorded snapshots.
    pub fn len(&self) -> usize { self.timegrid.len() }

    pub fn is_empty(&self) -> bool { self.timegrid.is_empty() }

    /// Reassemble the wavepacket recorded at `slot`.
    ///
    /// *Panics* if `slot` is out of bounds.
    pub fn packet_at(&self, slot: usize, eps: f64)
        -> Result<HagedornWavepacket, SimError>
    {
        let n = self.coefficients.shape()[1];
        let params: Vec<ParamSet> = self.parameters.iter()
            .map(|rows| ParamSet::from_row(rows.slice(s![slot, ..])))
            .collect();
        let coeffs: Vec<nd::Array1<C64>> = (0..n)
            .map(|c| self.coefficients.slice(s![slot, c, ..]).to_owned())
            .collect();
        HagedornWavepacket::with_data(eps, params, coeffs)
    }
}

/// Directory-backed store for the results of one simulation run.
pub struct ResultStore {
    root: PathBuf,
    config: SimulationConfig,
    number_blocks: usize,
    datasets: IndexMap<String, Dataset>,
    registry: HashMap<String, Rc<dyn StoreQuantity>>,
    path_pattern: Regex,
    closed: bool,
}

impl ResultStore {
    fn new_path_pattern() -> Regex {
        Regex::new(r"^[A-Za-z0-9_]+(/[A-Za-z0-9_]+)*$")
            .expect("ResultStore: bad dataset path pattern")
    }

    /// Create a new store at `root` with a single empty block.
    ///
    /// Fails if `root` already exists; existing data is never clobbered.
    pub fn create<P>(root: P, config: &SimulationConfig)
        -> Result<Self, SimError>
    where P: AsRef<Path>
    {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            return Err(SimError::TargetExists(root));
        }
        fs::create_dir_all(&root)?;
        let mut store = Self {
            root,
            config: config.clone(),
            number_blocks: 0,
            datasets: IndexMap::new(),
            registry: HashMap::default(),
            path_pattern: Self::new_path_pattern(),
            closed: false,
        };
        fs::write(store.root.join(CONFIG_FILE), config.to_toml()?)?;
        store.add_block()?;
        Ok(store)
    }

    /// Open an existing store, verifying its block containers against
    /// the attribute record and reading every dataset in the manifest.
    pub fn load<P>(root: P) -> Result<Self, SimError>
    where P: AsRef<Path>
    {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SimError::TargetMissing(root));
        }
        let attrs: StoreAttributes
            = toml::from_str(
                &fs::read_to_string(root.join(ATTRIBUTES_FILE))?)?;
        let config = SimulationConfig::from_file(root.join(CONFIG_FILE))?;
        let block_pattern = Regex::new(r"^datablock_(\d+)$")
            .expect("ResultStore::load: bad block pattern");
        let mut found: Vec<usize> = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() { continue; }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue; };
            if let Some(caps) = block_pattern.captures(name) {
                let id: usize = caps[1].parse()
                    .map_err(|_| SimError::InvalidPath(name.to_string()))?;
                found.push(id);
            }
        }
        if found.len() != attrs.number_blocks {
            return Err(SimError::BlockCount {
                recorded: attrs.number_blocks,
                found: found.len(),
            });
        }
        for block in 0..attrs.number_blocks {
            if !found.contains(&block) {
                return Err(SimError::BlockMissing { block });
            }
        }
        let mut datasets: IndexMap<String, Dataset> = IndexMap::new();
        for (path, kind) in attrs.datasets.iter() {
            let file = File::open(npy_path(&root, path))?;
            let data = match kind {
                DatasetKind::Real => {
                    Dataset::Real(ReadNpyExt::read_npy(file)?)
                },
                DatasetKind::Int => {
                    Dataset::Int(ReadNpyExt::read_npy(file)?)
                },
                DatasetKind::Complex => {
                    Dataset::Complex(ReadNpyExt::read_npy(file)?)
                },
            };
            datasets.insert(path.clone(), data);
        }
        Ok(Self {
            root,
            config,
            number_blocks: attrs.number_blocks,
            datasets,
            registry: HashMap::default(),
            path_pattern: Self::new_path_pattern(),
            closed: false,
        })
    }

    /// Store directory.
    pub fn root(&self) -> &Path { &self.root }

    /// The run configuration the store was created with.
    pub fn config(&self) -> &SimulationConfig { &self.config }

    /// Number of block containers.
    pub fn block_count(&self) -> usize { self.number_blocks }

    /// Whether a dataset exists under `path`.
    pub fn has_dataset(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    /// Shape of the dataset at `path`.
    pub fn dataset_shape(&self, path: &str) -> Result<Vec<usize>, SimError> {
        self.check_open()?;
        Ok(self.dataset(path)?.shape().to_vec())
    }

    /// Append a new empty block container and return its index.
    pub fn add_block(&mut self) -> Result<usize, SimError> {
        self.check_open()?;
        let block = self.number_blocks;
        fs::create_dir_all(self.root.join(format!("datablock_{}", block)))?;
        self.number_blocks += 1;
        self.write_attributes()?;
        Ok(block)
    }

    /// Create a dataset of `kind` and initial `shape` at `path`,
    /// recording it in the manifest and writing its initial contents.
    pub fn create_dataset(
        &mut self,
        path: &str,
        kind: DatasetKind,
        shape: &[usize],
    ) -> Result<(), SimError>
    {
        self.check_open()?;
        if !self.path_pattern.is_match(path) {
            return Err(SimError::InvalidPath(path.to_string()));
        }
        if self.datasets.contains_key(path) {
            return Err(SimError::DatasetExists(path.to_string()));
        }
        let data = Dataset::filled(kind, shape);
        self.write_dataset(path, &data)?;
        self.datasets.insert(path.to_string(), data);
        self.write_attributes()?;
        Ok(())
    }

    /// Grow the dataset at `path` along `axis` so that index `slot` is
    /// addressable, rewriting its file if it grew.
    ///
    /// *Panics* if `axis` is out of bounds for the dataset's rank.
    pub fn ensure_capacity(&mut self, path: &str, slot: usize, axis: usize)
        -> Result<(), SimError>
    {
        self.check_open()?;
        let data = self.dataset_mut(path)?;
        let old = data.shape()[axis];
        data.ensure_capacity(slot, axis);
        let grew = data.shape()[axis] != old;
        if grew { self.flush(path)?; }
        Ok(())
    }

    /// Index of the timegrid slot recording exactly `timestep`.
    pub fn find_slot(&self, path: &str, timestep: u64)
        -> Result<usize, SimError>
    {
        self.check_open()?;
        let grid = self.int(path)?;
        grid.iter()
            .position(|t| *t >= 0 && *t as u64 == timestep)
            .ok_or_else(|| SimError::TimestepMissing {
                path: path.to_string(),
                timestep,
            })
    }

    /// Advertise a storage capability.
    pub fn register(&mut self, quantity: Rc<dyn StoreQuantity>) {
        self.registry.insert(quantity.name().to_string(), quantity);
    }

    /// Look up a registered capability by name.
    pub fn capability(&self, name: &str)
        -> Result<Rc<dyn StoreQuantity>, SimError>
    {
        self.registry.get(name).cloned()
            .ok_or_else(|| SimError::CapabilityMissing(name.to_string()))
    }

    /// Materialize a registered quantity's datasets in one block, sized
    /// for `timeslots` snapshots.
    pub fn add_quantity(&mut self, name: &str, block: usize, timeslots: usize)
        -> Result<(), SimError>
    {
        self.check_open()?;
        let quantity = self.capability(name)?;
        quantity.add(self, block, timeslots)
    }

    /// Record the block's sampling grid.
    ///
    /// *Panics* if `grid` does not match the dataset length.
    pub fn save_grid(&mut self, block: usize, grid: &nd::Array1<f64>)
        -> Result<(), SimError>
    {
        self.check_open()?;
        self.capability(GridQuantity::NAME)?;
        let path = block_dataset(block, "grid");
        {
            let mut view = self.real1_mut(&path)?;
            view.assign(grid);
        }
        self.flush(&path)
    }

    /// Load the block's sampling grid.
    pub fn load_grid(&self, block: usize)
        -> Result<nd::Array1<f64>, SimError>
    {
        self.check_open()?;
        self.capability(GridQuantity::NAME)?;
        let path = block_dataset(block, "grid");
        with_rank(&path, self.real(&path)?.clone())
    }

    /// Record one wavepacket snapshot in `block` at `timestep`.
    ///
    /// The snapshot lands in the first unused timegrid slot; the series
    /// is grown when none is free. Timesteps must strictly increase.
    ///
    /// *Panics* if the packet's component count or basis size does not
    /// match the block's datasets.
    pub fn save_wavepacket(
        &mut self,
        block: usize,
        packet: &HagedornWavepacket,
        timestep: u64,
    ) -> Result<(), SimError>
    {
        self.check_open()?;
        self.capability(WavepacketQuantity::NAME)?;
        let tg_path = block_dataset(block, "wavepacket/timegrid");
        let slot = self.claim_slot(&tg_path, timestep)?;
        for c in 0..packet.num_components() {
            let pr_path = block_dataset(
                block, &format!("wavepacket/parameters_{}", c));
            self.ensure_capacity(&pr_path, slot, 0)?;
            {
                let mut rows = self.complex2_mut(&pr_path)?;
                rows.row_mut(slot).assign(&packet.parameters(c).to_row());
            }
            self.flush(&pr_path)?;
        }
        let co_path = block_dataset(block, "wavepacket/coefficients");
        self.ensure_capacity(&co_path, slot, 0)?;
        {
            let mut slab = self.complex3_mut(&co_path)?;
            for c in 0..packet.num_components() {
                slab.slice_mut(s![slot, c, ..])
                    .assign(&packet.coefficients(c));
            }
        }
        self.flush(&co_path)
    }

    /// Load every recorded wavepacket snapshot of `block`.
    pub fn load_wavepacket(&self, block: usize)
        -> Result<WavepacketHistory, SimError>
    {
        self.check_open()?;
        self.capability(WavepacketQuantity::NAME)?;
        let tg_path = block_dataset(block, "wavepacket/timegrid");
        let grid: nd::Array1<i64>
            = with_rank(&tg_path, self.int(&tg_path)?.clone())?;
        let filled = grid.iter().position(|t| *t < 0).unwrap_or(grid.len());
        let co_path = block_dataset(block, "wavepacket/coefficients");
        let coefficients: nd::Array3<C64>
            = with_rank(&co_path, self.complex(&co_path)?.clone())?;
        let n = coefficients.shape()[1];
        let mut parameters: Vec<nd::Array2<C64>> = Vec::with_capacity(n);
        for c in 0..n {
            let pr_path = block_dataset(
                block, &format!("wavepacket/parameters_{}", c));
            let rows: nd::Array2<C64>
                = with_rank(&pr_path, self.complex(&pr_path)?.clone())?;
            parameters.push(rows.slice(s![..filled, ..]).to_owned());
        }
        Ok(WavepacketHistory {
            timegrid: grid.slice(s![..filled]).to_owned(),
            parameters,
            coefficients: coefficients.slice(s![..filled, .., ..]).to_owned(),
        })
    }

    /// Record one sampled wavefunction snapshot in `block` at `timestep`.
    ///
    /// `values` holds one row of grid samples per component.
    ///
    /// *Panics* if `values` does not match the dataset's per-slot shape.
    pub fn save_wavefunction(
        &mut self,
        block: usize,
        values: &nd::Array2<C64>,
        timestep: u64,
    ) -> Result<(), SimError>
    {
        self.check_open()?;
        self.capability(WavefunctionQuantity::NAME)?;
        let tg_path = block_dataset(block, "wavefunction/timegrid");
        let slot = self.claim_slot(&tg_path, timestep)?;
        let va_path = block_dataset(block, "wavefunction/values");
        self.ensure_capacity(&va_path, slot, 0)?;
        {
            let mut slab = self.complex3_mut(&va_path)?;
            slab.slice_mut(s![slot, .., ..]).assign(values);
        }
        self.flush(&va_path)
    }

    /// Load every recorded wavefunction snapshot of `block` as a
    /// `(timegrid, values)` pair.
    pub fn load_wavefunction(&self, block: usize)
        -> Result<(nd::Array1<i64>, nd::Array3<C64>), SimError>
    {
        self.check_open()?;
        self.capability(WavefunctionQuantity::NAME)?;
        let tg_path = block_dataset(block, "wavefunction/timegrid");
        let grid: nd::Array1<i64>
            = with_rank(&tg_path, self.int(&tg_path)?.clone())?;
        let filled = grid.iter().position(|t| *t < 0).unwrap_or(grid.len());
        let va_path = block_dataset(block, "wavefunction/values");
        let values: nd::Array3<C64>
            = with_rank(&va_path, self.complex(&va_path)?.clone())?;
        Ok((
            grid.slice(s![..filled]).to_owned(),
            values.slice(s![..filled, .., ..]).to_owned(),
        ))
    }

    /// Flush the attribute record and bar further use.
    pub fn close(&mut self) -> Result<(), SimError> {
        self.check_open()?;
        self.write_attributes()?;
        self.closed = true;
        Ok(())
    }

    fn check_open(&self) -> Result<(), SimError> {
        if self.closed { Err(SimError::StoreClosed) } else { Ok(()) }
    }

    fn write_attributes(&self) -> Result<(), SimError> {
        let attrs = StoreAttributes {
            number_blocks: self.number_blocks,
            datasets: self.datasets.iter()
                .map(|(path, data)| (path.clone(), data.kind()))
                .collect(),
        };
        fs::write(
            self.root.join(ATTRIBUTES_FILE),
            toml::to_string_pretty(&attrs)?,
        )?;
        Ok(())
    }

    fn write_dataset(&self, path: &str, data: &Dataset)
        -> Result<(), SimError>
    {
        let file_path = npy_path(&self.root, path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&file_path)?;
        match data {
            Dataset::Real(a) => { a.write_npy(file)?; },
            Dataset::Int(a) => { a.write_npy(file)?; },
            Dataset::Complex(a) => { a.write_npy(file)?; },
        }
        Ok(())
    }

    fn flush(&self, path: &str) -> Result<(), SimError> {
        let data = self.dataset(path)?;
        self.write_dataset(path, data)
    }

    // Find the first unused slot of a timegrid, growing it when full,
    // and record `timestep` there.
    fn claim_slot(&mut self, tg_path: &str, timestep: u64)
        -> Result<usize, SimError>
    {
        let (slot, last) = {
            let grid = self.int(tg_path)?;
            let slot = grid.iter().position(|t| *t < 0).unwrap_or(grid.len());
            let last = grid.iter().take(slot).last().copied().unwrap_or(-1);
            (slot, last)
        };
        if timestep as i64 <= last {
            return Err(SimError::NonMonotonic {
                path: tg_path.to_string(),
                timestep,
                last,
            });
        }
        self.ensure_capacity(tg_path, slot, 0)?;
        {
            let mut grid = self.int1_mut(tg_path)?;
            grid[slot] = timestep as i64;
        }
        self.flush(tg_path)?;
        Ok(slot)
    }

    fn dataset(&self, path: &str) -> Result<&Dataset, SimError> {
        self.datasets.get(path)
            .ok_or_else(|| SimError::DatasetMissing(path.to_string()))
    }

    fn dataset_mut(&mut self, path: &str) -> Result<&mut Dataset, SimError> {
        self.datasets.get_mut(path)
            .ok_or_else(|| SimError::DatasetMissing(path.to_string()))
    }

    fn int(&self, path: &str) -> Result<&nd::ArrayD<i64>, SimError> {
        let data = self.dataset(path)?;
        let Dataset::Int(a) = data else {
            return Err(kind_error(path, DatasetKind::Int, data.kind()));
        };
        Ok(a)
    }

    fn real(&self, path: &str) -> Result<&nd::ArrayD<f64>, SimError> {
        let data = self.dataset(path)?;
        let Dataset::Real(a) = data else {
            return Err(kind_error(path, DatasetKind::Real, data.kind()));
        };
        Ok(a)
    }

    fn complex(&self, path: &str) -> Result<&nd::ArrayD<C64>, SimError> {
        let data = self.dataset(path)?;
        let Dataset::Complex(a) = data else {
            return Err(kind_error(path, DatasetKind::Complex, data.kind()));
        };
        Ok(a)
    }

    fn int1_mut(&mut self, path: &str)
        -> Result<nd::ArrayViewMut1<'_, i64>, SimError>
    {
        let data = self.dataset_mut(path)?;
        let kind = data.kind();
        let Dataset::Int(a) = data else {
            return Err(kind_error(path, DatasetKind::Int, kind));
        };
        let found = a.ndim();
        a.view_mut().into_dimensionality::<nd::Ix1>()
            .map_err(|_| rank_error(path, 1, found))
    }

    fn real1_mut(&mut self, path: &str)
        -> Result<nd::ArrayViewMut1<'_, f64>, SimError>
    {
        let data = self.dataset_mut(path)?;
        let kind = data.kind();
        let Dataset::Real(a) = data else {
            return Err(kind_error(path, DatasetKind::Real, kind));
        };
        let found = a.ndim();
        a.view_mut().into_dimensionality::<nd::Ix1>()
            .map_err(|_| rank_error(path, 1, found))
    }

    fn complex2_mut(&mut self, path: &str)
        -> Result<nd::ArrayViewMut2<'_, C64>, SimError>
    {
        let data = self.dataset_mut(path)?;
        let kind = data.kind();
        let Dataset::Complex(a) = data else {
            return Err(kind_error(path, DatasetKind::Complex, kind));
        };
        let found = a.ndim();
        a.view_mut().into_dimensionality::<nd::Ix2>()
            .map_err(|_| rank_error(path, 2, found))
    }

    fn complex3_mut(&mut self, path: &str)
        -> Result<nd::ArrayViewMut3<'_, C64>, SimError>
    {
        let data = self.dataset_mut(path)?;
        let kind = data.kind();
        let Dataset::Complex(a) = data else {
            return Err(kind_error(path, DatasetKind::Complex, kind));
        };
        let found = a.ndim();
        a.view_mut().into_dimensionality::<nd::Ix3>()
            .map_err(|_| rank_error(path, 3, found))
    }
}

fn npy_path(root: &Path, path: &str) -> PathBuf {
    root.join(format!("{}.npy", path))
}

fn kind_error(path: &str, expected: DatasetKind, found: DatasetKind)
    -> SimError
{
    SimError::DatasetKind {
        path: path.to_string(),
        expected: expected.name(),
        found: found.name(),
    }
}

fn rank_error(path: &str, expected: usize, found: usize) -> SimError {
    SimError::DatasetRank { path: path.to_string(), expected, found }
}

fn with_rank<A, D>(path: &str, data: nd::ArrayD<A>)
    -> Result<nd::Array<A, D>, SimError>
where D: nd::Dimension
{
    let found = data.ndim();
    data.into_dimensionality::<D>()
        .map_err(|_| rank_error(path, D::NDIM.unwrap_or(0), found))
}
