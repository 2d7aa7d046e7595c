//! Contract between the core and a per-instruction decode/semantic layer.
//!
//! An [`InstructionSet`] decodes and executes one encoding mode. While it runs
//! it talks to the core only through [`ExecContext`], which hands out register
//! and flag access, normalised memory access, condition evaluation and the
//! [`ModeControl`] capability.

use std::fmt::Debug;

use crate::state::{Flags, IsaMode, ProcessorMode};
use crate::{CpsrError, CpsrUpdate, MemoryFault, ModeError};

/// How an executed instruction hands control back to its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Ordinary completion; execution continues at `npc` inside the engine.
    Done {
        /// Next program counter.
        npc: u32,
    },
    /// Control transfer; `npc` goes back to the dispatcher and the current
    /// block run ends.
    DoneCti {
        /// Branch target.
        npc: u32,
    },
}

impl Completion {
    /// Next program counter.
    #[must_use]
    pub const fn npc(self) -> u32 {
        match self {
            Self::Done { npc } | Self::DoneCti { npc } => npc,
        }
    }

    /// Whether the completion ends a block run.
    #[must_use]
    pub const fn is_control_transfer(self) -> bool {
        matches!(self, Self::DoneCti { .. })
    }
}

/// Processor-mode side effects semantics may trigger.
pub trait ModeControl {
    /// Writes the tbit. A change selects the other engine pair before the next
    /// fetch.
    fn set_tbit(&mut self, tbit: bool);

    /// Writes the mode field and swaps register banks.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError`] for an unassigned mode encoding; state is left
    /// unchanged.
    fn set_mbits(&mut self, bits: u32) -> Result<ProcessorMode, ModeError>;
}

/// Everything instruction semantics may touch.
///
/// Register 15 reads as the address of the executing instruction; the
/// pipeline offset is the semantic layer's business. Semantics redirect
/// control through [`Completion`] and never write register 15.
pub trait ExecContext: ModeControl {
    /// Reads a register of the active mode.
    fn gpr(&self, index: usize) -> u32;

    /// Writes a register of the active mode.
    fn set_gpr(&mut self, index: usize, value: u32);

    /// Condition flags.
    fn flags(&self) -> Flags;

    /// Replaces the condition flags.
    fn set_flags(&mut self, flags: Flags);

    /// Raw `CPSR`.
    fn cpsr(&self) -> u32;

    /// Active processor mode.
    fn mode(&self) -> ProcessorMode;

    /// Writes the `CPSR` bits selected by `mask`, routing tbit and mode field
    /// changes through [`ModeControl`].
    ///
    /// # Errors
    ///
    /// Returns [`CpsrError`] when the new mode field is invalid. Bits written
    /// before the mode field are not undone; the caller restores
    /// [`CpsrError::old`] if it needs the write to be atomic.
    fn write_cpsr(&mut self, value: u32, mask: u32) -> Result<CpsrUpdate, CpsrError>;

    /// `SPSR` of the active mode, `None` in user and system mode.
    fn spsr(&self) -> Option<u32>;

    /// Writes the `SPSR` bits selected by `mask`. Ignored without an `SPSR`.
    fn set_spsr(&mut self, value: u32, mask: u32);

    /// Fetches a 32-bit instruction.
    ///
    /// # Errors
    ///
    /// Returns a fetch [`MemoryFault`] when the bus rejects the read.
    fn fetch_u32(&mut self, pc: u32) -> Result<u32, MemoryFault>;

    /// Fetches a 16-bit instruction.
    ///
    /// # Errors
    ///
    /// Returns a fetch [`MemoryFault`] when the bus rejects the read.
    fn fetch_u16(&mut self, pc: u32) -> Result<u16, MemoryFault>;

    /// Loads a word from any byte address, rotating misaligned data.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the read.
    fn load_word(&mut self, pc: u32, addr: u32) -> Result<u32, MemoryFault>;

    /// Loads a halfword from the halfword containing `addr`.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the read.
    fn load_half(&mut self, pc: u32, addr: u32) -> Result<u16, MemoryFault>;

    /// Loads a byte.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the read.
    fn load_byte(&mut self, pc: u32, addr: u32) -> Result<u8, MemoryFault>;

    /// Stores a word to the word containing `addr`.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the write.
    fn store_word(&mut self, pc: u32, addr: u32, value: u32) -> Result<(), MemoryFault>;

    /// Stores a halfword to the halfword containing `addr`.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the write.
    fn store_half(&mut self, pc: u32, addr: u32, value: u16) -> Result<(), MemoryFault>;

    /// Stores a byte.
    ///
    /// # Errors
    ///
    /// Returns a data [`MemoryFault`] when the bus rejects the write.
    fn store_byte(&mut self, pc: u32, addr: u32, value: u8) -> Result<(), MemoryFault>;

    /// Evaluates condition selector `cond` against the current flags. An
    /// unrecognised selector reports an invalid instruction at `pc` once and
    /// yields `false`.
    fn eval_cond(&mut self, cond: u32, pc: u32) -> bool;

    /// Reports an undefined instruction at `pc`.
    fn invalid_insn(&mut self, pc: u32);

    /// Requests a software interrupt for the instruction at `pc`. `trap` is
    /// the comment field of the instruction.
    fn swi(&mut self, pc: u32, trap: u32);
}

/// Decoder and semantics for one encoding mode.
pub trait InstructionSet {
    /// Prepared form of one instruction, stored in cached blocks.
    type Insn: Clone + Debug;

    /// Mode this set decodes.
    const MODE: IsaMode;

    /// Fetches and decodes the instruction at `pc`.
    ///
    /// # Errors
    ///
    /// Returns the fetch [`MemoryFault`]. Undecodable encodings are not errors;
    /// they decode to an instruction whose execution reports
    /// [`ExecContext::invalid_insn`].
    fn decode<C: ExecContext + ?Sized>(&self, ctx: &mut C, pc: u32)
        -> Result<Self::Insn, MemoryFault>;

    /// Whether `insn` may redirect control and therefore ends a cached block.
    fn is_control_transfer(&self, insn: &Self::Insn) -> bool;

    /// Executes a decoded instruction located at `pc`.
    ///
    /// # Errors
    ///
    /// Returns the data [`MemoryFault`] that aborted the instruction.
    fn execute<C: ExecContext + ?Sized>(
        &self,
        ctx: &mut C,
        pc: u32,
        insn: &Self::Insn,
    ) -> Result<Completion, MemoryFault>;
}

#[cfg(test)]
mod tests {
    use super::Completion;

    #[test]
    fn completion_exposes_target_and_kind() {
        let done = Completion::Done { npc: 0x104 };
        let cti = Completion::DoneCti { npc: 0x2000 };
        assert_eq!(done.npc(), 0x104);
        assert!(!done.is_control_transfer());
        assert_eq!(cti.npc(), 0x2000);
        assert!(cti.is_control_transfer());
    }
}
