//! Typed, validated view over a [`Config`]'s closed key set.
//!
//! Every field has a sensible default, so a config file only needs to name
//! the keys it wants to change.

use crate::{Config, ConfigError};

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub associativity: u32,
    pub num_sets: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub base_request_time: u64,
    pub time_per_line: u64,
    pub size_of_line: u32,
    pub buffer_size: u32,
    pub banks: u32,
    pub parallel_requests: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FpuLatencies {
    pub add: u64,
    pub sub: u64,
    pub mul: u64,
    pub div: u64,
    pub sqrt: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSizes {
    pub local_creates: u32,
    pub remote_creates: u32,
    pub thread_cleanup: u32,
}

/// Everything `dtsim-sim::System` needs to build a tile ring.
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    pub num_processors: u32,
    pub num_int_registers: u32,
    pub num_flt_registers: u32,
    pub int_registers_block_size: u32,
    pub flt_registers_block_size: u32,
    pub num_threads: u32,
    pub num_families: u32,
    pub num_global_families: u32,
    pub icache: CacheConfig,
    pub dcache: CacheConfig,
    pub cache_line_size: u32,
    pub control_block_size: u32,
    pub fpu: FpuLatencies,
    pub memory: MemoryConfig,
    pub queues: QueueSizes,
}

impl SystemConfig {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let num_processors = cfg.get_u32("NumProcessors", 1)?;
        Ok(Self {
            num_processors,
            num_int_registers: cfg.get_u32("NumIntRegisters", 1024)?,
            num_flt_registers: cfg.get_u32("NumFltRegisters", 128)?,
            int_registers_block_size: cfg.get_u32("IntRegistersBlockSize", 32)?,
            flt_registers_block_size: cfg.get_u32("FltRegistersBlockSize", 8)?,
            num_threads: cfg.get_u32("NumThreads", 64)?,
            num_families: cfg.get_u32("NumFamilies", 8)?,
            num_global_families: cfg.get_u32("NumGlobalFamilies", 8)?,
            icache: CacheConfig {
                associativity: cfg.get_u32("ICacheAssociativity", 4)?,
                num_sets: cfg.get_u32("ICacheNumSets", 4)?,
            },
            dcache: CacheConfig {
                associativity: cfg.get_u32("DCacheAssociativity", 4)?,
                num_sets: cfg.get_u32("DCacheNumSets", 4)?,
            },
            cache_line_size: cfg.get_u32("CacheLineSize", 64)?,
            control_block_size: cfg.get_u32("ControlBlockSize", 64)?,
            fpu: FpuLatencies {
                add: cfg.get_u64("FPUAddLatency", 1)?,
                sub: cfg.get_u64("FPUSubLatency", 1)?,
                mul: cfg.get_u64("FPUMulLatency", 1)?,
                div: cfg.get_u64("FPUDivLatency", 1)?,
                sqrt: cfg.get_u64("FPUSqrtLatency", 1)?,
            },
            memory: MemoryConfig {
                base_request_time: cfg.get_u64("MemoryBaseRequestTime", 1)?,
                time_per_line: cfg.get_u64("MemoryTimePerLine", 1)?,
                size_of_line: cfg.get_u32("MemorySizeOfLine", 8)?,
                buffer_size: cfg.get_u32("MemoryBufferSize", u32::MAX)?,
                banks: cfg.get_u32("MemoryBanks", num_processors * 2)?,
                parallel_requests: cfg.get_u32("MemoryParallelRequests", 1)?,
            },
            queues: QueueSizes {
                local_creates: cfg.get_u32("LocalCreatesQueueSize", u32::MAX)?,
                remote_creates: cfg.get_u32("RemoteCreatesQueueSize", u32::MAX)?,
                thread_cleanup: cfg.get_u32("ThreadCleanupQueueSize", u32::MAX)?,
            },
        })
    }
}
