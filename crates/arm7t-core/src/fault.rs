use thiserror::Error;

use crate::state::ProcessorMode;

/// Failure reported by the memory subsystem for a single aligned access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusError {
    /// No memory is mapped at the address.
    #[error("no memory mapped at {addr:#010x}")]
    Unmapped {
        /// Faulting byte address.
        addr: u32,
    },
    /// The address is mapped but rejects writes.
    #[error("write to read-only memory at {addr:#010x}")]
    ReadOnly {
        /// Faulting byte address.
        addr: u32,
    },
}

impl BusError {
    /// Returns the faulting address carried by the bus error.
    #[must_use]
    pub const fn addr(self) -> u32 {
        match self {
            Self::Unmapped { addr } | Self::ReadOnly { addr } => addr,
        }
    }
}

/// Distinguishes instruction fetches from data accesses for abort selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Instruction fetch; escalates to a prefetch abort.
    Fetch,
    /// Load or store issued by an instruction; escalates to a data abort.
    Data,
}

/// A bus failure attributed to the instruction that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{kind:?} access at pc {pc:#010x} faulted")]
pub struct MemoryFault {
    /// Whether the access was a fetch or a data access.
    pub kind: AccessKind,
    /// Program counter of the instruction that issued the access.
    pub pc: u32,
    /// Underlying bus failure.
    #[source]
    pub source: BusError,
}

impl MemoryFault {
    /// Wraps a bus failure from an instruction fetch.
    #[must_use]
    pub const fn fetch(pc: u32, source: BusError) -> Self {
        Self {
            kind: AccessKind::Fetch,
            pc,
            source,
        }
    }

    /// Wraps a bus failure from a data access.
    #[must_use]
    pub const fn data(pc: u32, source: BusError) -> Self {
        Self {
            kind: AccessKind::Data,
            pc,
            source,
        }
    }

    /// Faulting byte address.
    #[must_use]
    pub const fn addr(&self) -> u32 {
        self.source.addr()
    }
}

/// Rejected configuration request. State is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Engine strategy name was not recognised.
    #[error("unknown engine type `{0}`")]
    UnknownEngineType(String),
    /// Interrupt synchronisation name was not recognised.
    #[error("unknown interrupt synchronisation `{0}`")]
    UnknownInterruptSync(String),
    /// Encoding mode name was not recognised.
    #[error("unknown instruction set `{0}`")]
    UnknownIsaMode(String),
}

/// Rejected CPSR write. Carries both values so the caller can restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("cpsr write {attempted:#010x} has invalid mode bits (previous {old:#010x})")]
pub struct CpsrError {
    /// CPSR value before the write began.
    pub old: u32,
    /// Value whose mode field was rejected.
    pub attempted: u32,
}

/// Successful CPSR write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpsrUpdate {
    /// CPSR value before the write.
    pub old: u32,
    /// CPSR value after the write.
    pub new: u32,
}

/// Mode switch request that names no architectural mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("mode bits {bits:#07b} do not name a processor mode (current {current:?})")]
pub struct ModeError {
    /// Rejected mode field.
    pub bits: u32,
    /// Mode that stays active.
    pub current: ProcessorMode,
}

/// Rejected attribute or debug-register access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum AttributeError {
    /// The value string did not parse as an integer.
    #[error("cannot parse attribute value `{0}`")]
    Parse(String),
    /// The value parsed but the target refused it.
    #[error("attribute value rejected")]
    BadValue(#[from] CpsrError),
    /// The attribute is read-only.
    #[error("attribute is read-only")]
    ReadOnly,
    /// Debug register number outside the known layout.
    #[error("no debug register {0}")]
    UnknownRegister(u32),
    /// Rejected configuration value.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::{AccessKind, BusError, MemoryFault};

    #[test]
    fn memory_fault_keeps_kind_and_address() {
        let fault = MemoryFault::data(0x100, BusError::Unmapped { addr: 0x8000_0000 });
        assert_eq!(fault.kind, AccessKind::Data);
        assert_eq!(fault.addr(), 0x8000_0000);

        let fetch = MemoryFault::fetch(0x40, BusError::ReadOnly { addr: 0x40 });
        assert_eq!(fetch.kind, AccessKind::Fetch);
        assert_eq!(fetch.pc, 0x40);
    }

    #[test]
    fn bus_error_display_names_address() {
        let err = BusError::Unmapped { addr: 0x20 };
        assert_eq!(err.to_string(), "no memory mapped at 0x00000020");
    }
}
