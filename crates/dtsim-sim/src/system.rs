//! The ring of tiles and the cycle driver that steps them all in lockstep.

use std::collections::HashMap;
use std::fmt;

use dtsim_allocator::CreateRequest;
use dtsim_config::SystemConfig;
use dtsim_core::{CycleResult, Observable, Value};
use dtsim_network::Network;
use dtsim_pipeline::{Instruction, Op};
use dtsim_tables::Fid;

use crate::statistics::Statistics;
use crate::tile::{Tile, TileError};

#[derive(Debug)]
pub enum SystemError {
    Tile(u32, TileError),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tile(id, e) => write!(f, "tile {id}: {e}"),
        }
    }
}

impl std::error::Error for SystemError {}

/// A cycle where every tile's component work was `Failed` (wanted to
/// progress, lost arbitration or hit a resource limit) and none was
/// `Success`. A single such cycle is reported as-is; it is the caller's
/// call whether one cycle or a run of them is a real deadlock.
#[derive(Debug, Clone)]
pub struct DeadlockReport {
    pub cycle: u64,
    /// Which component on which tile was last `Failed`, e.g. `"tile 0:
    /// create"`.
    pub components: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every tile went idle (no live families, no in-flight thread, no
    /// pending create or cleanup entry) before the cycle budget ran out.
    Completed { cycles: u64 },
    /// The cycle budget was exhausted while tiles still had live work.
    BudgetExhausted,
    Deadlocked(DeadlockReport),
}

/// Owns every tile plus the ring connecting them, and drives one cycle at
/// a time: each tile steps in turn (its view of the ring reflects messages
/// injected by earlier tiles this same cycle, exactly as a real ring's
/// serialized bus access would), then the network itself advances every
/// channel by one hop.
pub struct System {
    pub tiles: Vec<Tile>,
    pub network: Network,
    pub programs: HashMap<u32, Vec<Op>>,
    pub statistics: Statistics,
    cycle: u64,
    last_stalled_components: Vec<String>,
}

impl System {
    pub fn new(config: &SystemConfig) -> Result<Self, SystemError> {
        let num_tiles = config.num_processors.max(1);
        let mut tiles = Vec::with_capacity(num_tiles as usize);
        for id in 0..num_tiles {
            tiles.push(Tile::new(id, config).map_err(|e| SystemError::Tile(id, e))?);
        }
        Ok(Self {
            tiles,
            network: Network::new(num_tiles),
            programs: HashMap::new(),
            statistics: Statistics::new(),
            cycle: 0,
            last_stalled_components: Vec::new(),
        })
    }

    pub fn load_program(&mut self, program_id: u32, program: Vec<Op>) {
        self.programs.insert(program_id, program);
    }

    /// Start a family on one tile. `tile` must be a valid tile index.
    pub fn spawn(&mut self, tile: u32, gfid: Option<u32>, program_id: u32, request: CreateRequest) -> Option<Fid> {
        let fid = self.tiles.get_mut(tile as usize)?.begin_create(gfid, program_id, request)?;
        self.statistics.families_created += 1;
        Some(fid)
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.tiles.iter().all(Tile::is_idle)
    }

    /// Step every tile once, then advance the ring. Returns the set of
    /// instructions retired this cycle (for a caller that wants to trace
    /// execution) alongside the aggregated [`CycleResult`].
    pub fn tick(&mut self) -> (CycleResult, Vec<Instruction>) {
        let now = self.cycle;
        let mut any_success = false;
        let mut stalled_components = Vec::new();
        let mut retired = Vec::new();
        let mut active_depth: usize = 0;
        let mut cleanup_depth: usize = 0;

        for tile in &mut self.tiles {
            let report = tile.step(&mut self.network, &self.programs, now);
            match report.result {
                CycleResult::Success => any_success = true,
                CycleResult::Failed => {
                    let component = report.failed_component.unwrap_or("unknown");
                    stalled_components.push(format!("tile {}: {component}", tile.id));
                }
                CycleResult::Delayed => {}
            }
            if let Some(instr) = report.retired {
                retired.push(instr);
                match instr.op {
                    Op::Add { .. } => self.statistics.integer_ops_retired += 1,
                    Op::FloatOp { .. } => self.statistics.float_ops_retired += 1,
                    Op::Load { .. } => self.statistics.loads_retired += 1,
                    Op::Store { .. } => self.statistics.stores_retired += 1,
                    _ => {}
                }
            }
            active_depth += tile.allocator.active_queue.len();
            cleanup_depth += tile.allocator.cleanup_queue.len();
        }
        self.network.step();

        self.statistics.cycles += 1;
        self.statistics.sample_queues(active_depth, cleanup_depth);
        let result = if any_success {
            CycleResult::Success
        } else if !stalled_components.is_empty() {
            CycleResult::Failed
        } else {
            self.statistics.pipeline_idle_cycles += 1;
            CycleResult::Delayed
        };
        self.last_stalled_components = stalled_components;
        self.cycle += 1;
        (result, retired)
    }

    /// Run until every tile goes idle, a deadlock cycle is observed, or
    /// `max_cycles` is exhausted.
    pub fn run(&mut self, max_cycles: u64) -> RunOutcome {
        for _ in 0..max_cycles {
            if self.is_idle() {
                return RunOutcome::Completed { cycles: self.cycle };
            }
            let (result, _retired) = self.tick();
            if result == CycleResult::Failed {
                return RunOutcome::Deadlocked(DeadlockReport {
                    cycle: self.cycle - 1,
                    components: self.last_stalled_components.clone(),
                });
            }
        }
        if self.is_idle() {
            RunOutcome::Completed { cycles: self.cycle }
        } else {
            RunOutcome::BudgetExhausted
        }
    }
}

impl Observable for System {
    fn query(&self, path: &str) -> Option<Value> {
        if path == "cycle" {
            return Some(Value::U64(self.cycle));
        }
        let rest = path.strip_prefix("tile.")?;
        let (idx, rest) = rest.split_once('.')?;
        let idx: usize = idx.parse().ok()?;
        self.tiles.get(idx)?.query(rest)
    }

    fn query_paths(&self) -> Vec<String> {
        let mut paths = vec!["cycle".to_string()];
        for tile in &self.tiles {
            for p in tile.query_paths() {
                paths.push(format!("tile.{}.{p}", tile.id));
            }
        }
        paths
    }
}
