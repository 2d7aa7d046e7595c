//! Memory subsystem boundary, a flat backing store, and the misaligned-load
//! normalizer used by instruction semantics.

/// Word loads at any alignment.
pub mod access;
/// Flat byte-array memory with selectable endianness.
pub mod flat;

use std::fmt;

pub use access::{load_word, store_word, WORD_BYTES};
pub use flat::FlatMemory;

use crate::BusError;

/// Byte order the bus uses to assemble multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Endianness {
    /// Least significant byte at the lowest address.
    #[default]
    Little,
    /// Most significant byte at the lowest address.
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Little => "little",
            Self::Big => "big",
        })
    }
}

/// Memory subsystem consumed by the core.
///
/// Multi-byte accesses are naturally aligned; the core never issues a
/// misaligned `read_u32` (see [`load_word`]). Every access carries the PC of
/// the instruction on whose behalf it is made, for fault attribution.
pub trait MemoryBus {
    /// Byte order used for multi-byte accesses.
    fn endianness(&self) -> Endianness;

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not readable.
    fn read_u8(&mut self, pc: u32, addr: u32) -> Result<u8, BusError>;

    /// Reads a halfword at a 2-byte aligned address.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not readable.
    fn read_u16(&mut self, pc: u32, addr: u32) -> Result<u16, BusError>;

    /// Reads a word at a 4-byte aligned address.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not readable.
    fn read_u32(&mut self, pc: u32, addr: u32) -> Result<u32, BusError>;

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not writable.
    fn write_u8(&mut self, pc: u32, addr: u32, value: u8) -> Result<(), BusError>;

    /// Writes a halfword at a 2-byte aligned address.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not writable.
    fn write_u16(&mut self, pc: u32, addr: u32, value: u16) -> Result<(), BusError>;

    /// Writes a word at a 4-byte aligned address.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when `addr` is not writable.
    fn write_u32(&mut self, pc: u32, addr: u32, value: u32) -> Result<(), BusError>;
}
