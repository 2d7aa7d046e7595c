//! Execution strategies and the per-mode engine pair.
//!
//! Both strategies share one contract: run from the current PC until a
//! control transfer, a pending EIT, a tbit change, overwritten code or the
//! instruction limit stops them. The [`EngineHost`] is the core they run on.

/// Decoded-block storage with range invalidation.
pub mod block_cache;
/// Step-wise interpreter.
pub mod interpreter;
/// Cached-block ("pbb") engine.
pub mod pbb;

use std::fmt;
use std::str::FromStr;

pub use block_cache::{BlockCache, CachedBlock, WriteRange};
pub use interpreter::Interpreter;
pub use pbb::BlockEngine;

use crate::semantics::{Completion, ExecContext, InstructionSet};
use crate::state::IsaMode;
use crate::{ConfigError, MemoryFault};

/// Execution strategy selectable per encoding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EngineType {
    /// Decode and execute one instruction at a time.
    #[default]
    Interpreter,
    /// Decode basic blocks once and replay them.
    CachedBlock,
}

impl EngineType {
    /// Attribute name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interpreter => "interpreter",
            Self::CachedBlock => "pbb",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreter" | "step" | "scache" => Ok(Self::Interpreter),
            "pbb" | "cached-block" => Ok(Self::CachedBlock),
            other => Err(ConfigError::UnknownEngineType(other.to_owned())),
        }
    }
}

/// Why a run returned to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// The instruction limit was reached.
    Limit,
    /// A control transfer handed a new PC back.
    ControlTransfer,
    /// An exception or interrupt waits for delivery.
    EitPending,
    /// The tbit changed; the other engine pair takes over.
    ModeSwitch,
    /// A store overwrote the block being replayed.
    CodeModified,
}

/// Result of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Instructions retired during the run.
    pub retired: u32,
    /// What ended the run.
    pub stop: StopReason,
}

impl RunOutcome {
    const fn new(retired: u32, stop: StopReason) -> Self {
        Self { retired, stop }
    }
}

/// Services an engine needs from the core beyond instruction semantics.
pub trait EngineHost: ExecContext {
    /// Address of the next instruction.
    fn pc(&self) -> u32;

    /// Commits the next program counter after an instruction completes.
    fn set_pc(&mut self, pc: u32);

    /// Mode selected by the current tbit.
    fn isa_mode(&self) -> IsaMode;

    /// Whether an EIT waits for delivery.
    fn eit_pending(&self) -> bool;

    /// Samples the interrupt pins at this boundary. Returns whether an EIT is
    /// pending afterwards.
    fn sample_interrupts(&mut self) -> bool;

    /// Escalates a bus fault to the matching abort.
    fn memory_trap(&mut self, fault: MemoryFault);

    /// Records the retirement of the instruction at `pc`.
    fn retire(&mut self, pc: u32, mode: IsaMode);

    /// Returns and clears the tbit-changed flag.
    fn take_mode_switch(&mut self) -> bool;

    /// Position in the store log; pass to [`Self::stores_since`].
    fn store_mark(&self) -> usize;

    /// Data stores logged after `mark`.
    fn stores_since(&self, mark: usize) -> &[WriteRange];

    /// Upper bound on instructions per cached block.
    fn max_block_insns(&self) -> usize;

    /// Records a newly decoded block.
    fn block_built(&mut self, mode: IsaMode, start: u32, len: usize);

    /// Records a block cache hit.
    fn block_hit(&mut self);

    /// Records blocks discarded after a store.
    fn blocks_invalidated(&mut self, count: usize);
}

// Checks applied after every retired instruction, in priority order. Pins are
// sampled only when the run will continue; otherwise the next step samples
// this boundary.
fn boundary_stop<H: EngineHost + ?Sized>(
    host: &mut H,
    completion: Completion,
    retired: u32,
    limit: u32,
) -> Option<StopReason> {
    if host.take_mode_switch() {
        Some(StopReason::ModeSwitch)
    } else if host.eit_pending() {
        Some(StopReason::EitPending)
    } else if retired >= limit {
        Some(StopReason::Limit)
    } else if host.sample_interrupts() {
        Some(StopReason::EitPending)
    } else if completion.is_control_transfer() {
        Some(StopReason::ControlTransfer)
    } else {
        None
    }
}

/// Interpreter and cached-block engine for one encoding mode; one of them is
/// active.
#[derive(Debug)]
pub struct EnginePair<I: InstructionSet> {
    isa: I,
    active: EngineType,
    interpreter: Interpreter,
    pbb: BlockEngine<I::Insn>,
}

impl<I: InstructionSet> EnginePair<I> {
    /// Pair over `isa` with `active` selected.
    #[must_use]
    pub fn new(isa: I, active: EngineType) -> Self {
        Self {
            isa,
            active,
            interpreter: Interpreter,
            pbb: BlockEngine::new(),
        }
    }

    /// Selected strategy.
    #[must_use]
    pub const fn active(&self) -> EngineType {
        self.active
    }

    /// Selects a strategy and discards every cached block. Returns how many
    /// were dropped.
    pub fn set_active(&mut self, engine: EngineType) -> usize {
        self.active = engine;
        self.pbb.flush()
    }

    /// Instruction set driven by this pair.
    #[must_use]
    pub const fn isa(&self) -> &I {
        &self.isa
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.pbb.cache().len()
    }

    /// Discards every cached block. Returns how many were dropped.
    pub fn flush(&mut self) -> usize {
        self.pbb.flush()
    }

    /// Discards cached blocks overlapping `range`. Returns how many were dropped.
    pub fn invalidate(&mut self, range: WriteRange) -> usize {
        self.pbb.invalidate(range)
    }

    /// Runs the active strategy for at most `limit` instructions.
    ///
    /// # Panics
    ///
    /// Panics when the host's tbit selects the other instruction set; the
    /// dispatcher never drives a pair out of mode.
    pub fn run<H: EngineHost + ?Sized>(&mut self, host: &mut H, limit: u32) -> RunOutcome {
        assert_eq!(
            host.isa_mode(),
            I::MODE,
            "engine pair driven while the tbit selects the other instruction set"
        );
        match self.active {
            EngineType::Interpreter => self.interpreter.run(&self.isa, host, limit),
            EngineType::CachedBlock => self.pbb.run(&self.isa, host, limit),
        }
    }
}
