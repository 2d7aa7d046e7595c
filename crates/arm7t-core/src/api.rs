//! Public host-facing API contracts for embedding the execution core.

use crate::eit::{Eit, ExceptionController, ExceptionEntry, InterruptSync};
use crate::engine::{EngineType, StopReason};
use crate::state::{IsaMode, ProcessorState};

/// Default number of instructions one [`crate::Cpu::step`] may retire.
pub const DEFAULT_STEP_INSN_COUNT: u32 = 1;

/// Default upper bound on instructions per cached block.
pub const DEFAULT_MAX_BLOCK_INSNS: usize = 32;

/// Top-level configuration for a core instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// Strategy used while the tbit is clear.
    pub arm_engine: EngineType,
    /// Strategy used while the tbit is set.
    pub thumb_engine: EngineType,
    /// Instruction budget of one step. Zero is treated as one.
    pub step_insn_count: u32,
    /// Interrupt pin synchronisation.
    pub interrupt_sync: InterruptSync,
    /// Upper bound on instructions per cached block.
    pub max_block_insns: usize,
    /// Address of the exception vector table.
    pub vector_base: u32,
    /// Enables deterministic trace callback dispatch.
    pub tracing_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            arm_engine: EngineType::Interpreter,
            thumb_engine: EngineType::Interpreter,
            step_insn_count: DEFAULT_STEP_INSN_COUNT,
            interrupt_sync: InterruptSync::Synchronous,
            max_block_insns: DEFAULT_MAX_BLOCK_INSNS,
            vector_base: 0,
            tracing_enabled: false,
        }
    }
}

impl CoreConfig {
    /// Strategy configured for `mode`.
    #[must_use]
    pub const fn engine(&self, mode: IsaMode) -> EngineType {
        match mode {
            IsaMode::Arm => self.arm_engine,
            IsaMode::Thumb => self.thumb_engine,
        }
    }

    /// Replaces the strategy configured for `mode`.
    pub const fn set_engine(&mut self, mode: IsaMode, engine: EngineType) {
        match mode {
            IsaMode::Arm => self.arm_engine = engine,
            IsaMode::Thumb => self.thumb_engine = engine,
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StepOutcome {
    /// Instructions retired.
    pub retired: u32,
    /// Why the last engine run ended; `None` when no engine ran.
    pub stop: Option<StopReason>,
    /// Last exception or interrupt whose handler was entered during the step.
    pub delivered: Option<Eit>,
}

/// Stable snapshot wire-version identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u16)]
pub enum SnapshotVersion {
    /// Initial schema revision.
    #[default]
    V1 = 1,
}

impl SnapshotVersion {
    /// Converts wire value to known snapshot version.
    #[must_use]
    pub const fn from_u16(version: u16) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }
}

/// Complete mutable state of a core. Cached blocks are not part of it; they
/// are rebuilt after a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuSnapshot {
    /// Snapshot schema version.
    pub version: SnapshotVersion,
    /// Registers, `CPSR`, `SPSR`s and `PC`.
    pub state: ProcessorState,
    /// Pending request, pin levels and synchroniser contents.
    pub controller: ExceptionController,
    /// Engine selection and the rest of the configuration.
    pub config: CoreConfig,
}

/// Deterministic trace events emitted when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// An instruction completed.
    InstructionRetired {
        /// Address of the retired instruction.
        pc: u32,
        /// Encoding it was executed in.
        mode: IsaMode,
    },
    /// A cached-block engine decoded a new block.
    BlockBuilt {
        /// Encoding of the block.
        mode: IsaMode,
        /// Address of its first instruction.
        start: u32,
        /// Number of instructions.
        len: usize,
    },
    /// Stores discarded cached blocks.
    BlocksInvalidated {
        /// Number of blocks dropped.
        count: usize,
    },
    /// A handler was entered.
    ExceptionDelivered(ExceptionEntry),
    /// The host selected a strategy for one encoding.
    EngineSwitched {
        /// Encoding whose strategy changed.
        mode: IsaMode,
        /// Newly selected strategy.
        engine: EngineType,
    },
}

/// Sink trait for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn on_event(&mut self, event: TraceEvent) {
        self.push(event);
    }
}
