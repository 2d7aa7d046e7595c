//! Architectural CPU state model primitives.

/// Current program status register.
pub mod cpsr;
/// Banked register file and processor modes.
pub mod registers;

use std::fmt;
use std::str::FromStr;

pub use cpsr::{Cpsr, Flags};
pub use registers::{ProcessorMode, RegisterFile, LR, PC, SP};

use crate::{ConfigError, ModeError};

/// Instruction-encoding mode selected by the `CPSR` tbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IsaMode {
    /// 32-bit ARM encodings.
    #[default]
    Arm,
    /// 16-bit Thumb encodings.
    Thumb,
}

impl IsaMode {
    /// Both modes, in engine-table order.
    pub const ALL: [Self; 2] = [Self::Arm, Self::Thumb];

    /// Mode selected by a tbit value.
    #[must_use]
    pub const fn from_tbit(tbit: bool) -> Self {
        if tbit {
            Self::Thumb
        } else {
            Self::Arm
        }
    }

    /// Width in bytes of one instruction.
    #[must_use]
    pub const fn insn_bytes(self) -> u32 {
        match self {
            Self::Arm => 4,
            Self::Thumb => 2,
        }
    }

    /// Offset added to the instruction address when it reads `PC`.
    #[must_use]
    pub const fn pc_read_offset(self) -> u32 {
        self.insn_bytes() * 2
    }
}

impl fmt::Display for IsaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Arm => "arm",
            Self::Thumb => "thumb",
        })
    }
}

impl FromStr for IsaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arm" => Ok(Self::Arm),
            "thumb" => Ok(Self::Thumb),
            other => Err(ConfigError::UnknownIsaMode(other.to_owned())),
        }
    }
}

/// Complete programmer-visible processor state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ProcessorState {
    registers: RegisterFile,
    cpsr: Cpsr,
    pc: u32,
}

impl ProcessorState {
    /// Address of the next instruction to execute.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Redirects execution.
    pub const fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Reads `R0..=R14` of the active mode, or the raw `PC` for register 15.
    #[must_use]
    pub const fn reg(&self, index: usize) -> u32 {
        if index == PC {
            self.pc
        } else {
            self.registers.get(index)
        }
    }

    /// Writes `R0..=R14` of the active mode, or the raw `PC` for register 15.
    pub const fn set_reg(&mut self, index: usize, value: u32) {
        if index == PC {
            self.pc = value;
        } else {
            self.registers.set(index, value);
        }
    }

    /// Banked register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable banked register file.
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Current program status register.
    #[must_use]
    pub const fn cpsr(&self) -> Cpsr {
        self.cpsr
    }

    /// Condition flags.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.cpsr.flags()
    }

    /// Replaces the condition flags.
    pub const fn set_flags(&mut self, flags: Flags) {
        self.cpsr.set_flags(flags);
    }

    /// Encoding mode selected by the tbit.
    #[must_use]
    pub const fn isa_mode(&self) -> IsaMode {
        IsaMode::from_tbit(self.cpsr.tbit())
    }

    /// Active processor mode.
    #[must_use]
    pub const fn mode(&self) -> ProcessorMode {
        self.registers.mode()
    }

    /// Raw tbit write. Returns `true` when the bit changed.
    pub const fn set_tbit(&mut self, tbit: bool) -> bool {
        let changed = self.cpsr.tbit() != tbit;
        self.cpsr.set_bit(cpsr::CPSR_T, tbit);
        changed
    }

    /// Raw mode-field write: swaps register banks and updates `CPSR[4:0]`.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError`] and leaves state untouched when `bits` names no
    /// architectural mode.
    pub fn set_mbits(&mut self, bits: u32) -> Result<ProcessorMode, ModeError> {
        let mode = ProcessorMode::from_bits(bits).ok_or(ModeError {
            bits,
            current: self.mode(),
        })?;
        self.registers.switch_mode(mode);
        self.cpsr.set_mode_bits(mode.bits());
        Ok(mode)
    }

    /// Mode switch for a mode that is already known to be valid.
    pub(crate) fn enter_mode(&mut self, mode: ProcessorMode) {
        self.registers.switch_mode(mode);
        self.cpsr.set_mode_bits(mode.bits());
    }

    /// Writes `CPSR` bits other than `T` and the mode field.
    pub(crate) const fn set_cpsr_plain_bits(&mut self, raw: u32) {
        let keep = cpsr::CPSR_T | cpsr::CPSR_MODE_MASK;
        let value = (self.cpsr.raw() & keep) | (raw & !keep);
        self.cpsr = Cpsr::from_raw(value);
    }

    /// `SPSR` of the active mode.
    #[must_use]
    pub const fn spsr(&self) -> Option<u32> {
        self.registers.spsr()
    }
}
