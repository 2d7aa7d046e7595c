//! Execution core for a dual-mode (ARM/Thumb) ARM7TDMI-class instruction set
//! simulator.
//!
//! A [`Cpu`] runs target code through one of two engines per encoding: a
//! step-wise interpreter or a cached-block engine that decodes straight-line
//! code once and replays it. Exceptions, interrupts and traps are arbitrated
//! by priority and delivered only at instruction boundaries. Instruction
//! decoding and semantics plug in through [`InstructionSet`]; memory through
//! [`MemoryBus`].

/// Host-facing configuration, step results, tracing and snapshots.
pub mod api;
pub use api::{
    CoreConfig, CpuSnapshot, SnapshotVersion, StepOutcome, TraceEvent, TraceSink,
    DEFAULT_MAX_BLOCK_INSNS, DEFAULT_STEP_INSN_COUNT,
};

/// Dual-mode dispatcher.
pub mod cpu;
pub use cpu::{Cpu, DBG_REG_CPSR, DBG_REG_F0, DBG_REG_FPS};

/// Exception/interrupt/trap controller.
pub mod eit;
pub use eit::{
    enter_exception, Eit, ExceptionController, ExceptionEntry, InterruptSync, PendingEit,
    PinLevels,
};

/// Interpreter and cached-block engines.
pub mod engine;
pub use engine::{EngineHost, EnginePair, EngineType, RunOutcome, StopReason, WriteRange};

/// Condition and shifter evaluation.
pub mod eval;
pub use eval::{add_with_carry, Condition, ShiftType};

/// Error and fault types.
pub mod fault;
pub use fault::{
    AccessKind, AttributeError, BusError, ConfigError, CpsrError, CpsrUpdate, MemoryFault,
    ModeError,
};

mod host;
pub use host::BoxedTraceSink;

/// Reference ARM and Thumb instruction subsets.
pub mod isa;
pub use isa::{ArmSubset, ThumbSubset};

mod log;

/// Memory bus contract and the misaligned-load normalizer.
pub mod memory;
pub use memory::{Endianness, FlatMemory, MemoryBus};

/// Contract between the core and instruction semantics.
pub mod semantics;
pub use semantics::{Completion, ExecContext, InstructionSet, ModeControl};

/// Architectural processor state.
pub mod state;
pub use state::{Cpsr, Flags, IsaMode, ProcessorMode, ProcessorState, RegisterFile};

/// Execution counters.
pub mod stats;
pub use stats::CpuStats;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use serde_json as _;
