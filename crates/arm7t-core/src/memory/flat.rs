use std::ops::Range;

use super::{Endianness, MemoryBus};
use crate::BusError;

/// Contiguous RAM image mapped at `base`, with an optional read-only window.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FlatMemory {
    base: u32,
    bytes: Box<[u8]>,
    endianness: Endianness,
    read_only: Option<Range<u32>>,
}

impl FlatMemory {
    /// Allocates `size` zeroed bytes mapped at `base`.
    #[must_use]
    pub fn new(base: u32, size: usize, endianness: Endianness) -> Self {
        Self {
            base,
            bytes: vec![0; size].into_boxed_slice(),
            endianness,
            read_only: None,
        }
    }

    /// Marks `range` as rejecting target writes. Host-side [`Self::load`]
    /// still succeeds.
    #[must_use]
    pub fn with_read_only(mut self, range: Range<u32>) -> Self {
        self.read_only = Some(range);
        self
    }

    /// First mapped address.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Raw backing bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Switches the byte order used for multi-byte accesses.
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Copies `data` into memory starting at `addr`, ignoring write protection.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] with the first address outside the
    /// mapping; nothing is written in that case.
    pub fn load(&mut self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let start = self.offset(addr, 1)?;
        let len = u32::try_from(data.len()).map_err(|_| BusError::Unmapped { addr })?;
        if len > 0 {
            self.offset(addr.wrapping_add(len - 1), 1)?;
        }
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Stores a word in the configured byte order, ignoring write protection.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when the word is not fully mapped.
    pub fn load_u32(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        let bytes = self.encode(value);
        self.load(addr, &bytes)
    }

    /// Stores a halfword in the configured byte order, ignoring write protection.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when the halfword is not fully mapped.
    pub fn load_u16(&mut self, addr: u32, value: u16) -> Result<(), BusError> {
        let bytes = match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        };
        self.load(addr, &bytes)
    }

    const fn encode(&self, value: u32) -> [u8; 4] {
        match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }

    fn offset(&self, addr: u32, width: usize) -> Result<usize, BusError> {
        let offset = addr
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
            .ok_or(BusError::Unmapped { addr })?;
        if offset + width > self.bytes.len() {
            return Err(BusError::Unmapped { addr });
        }
        Ok(offset)
    }

    fn writable(&self, addr: u32, width: usize) -> Result<usize, BusError> {
        let offset = self.offset(addr, width)?;
        if self
            .read_only
            .as_ref()
            .is_some_and(|range| range.contains(&addr))
        {
            return Err(BusError::ReadOnly { addr });
        }
        Ok(offset)
    }

    fn read_array<const N: usize>(&self, addr: u32) -> Result<[u8; N], BusError> {
        let offset = self.offset(addr, N)?;
        let mut out = [0; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        Ok(out)
    }
}

impl MemoryBus for FlatMemory {
    fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn read_u8(&mut self, _pc: u32, addr: u32) -> Result<u8, BusError> {
        let [byte] = self.read_array::<1>(addr)?;
        Ok(byte)
    }

    fn read_u16(&mut self, _pc: u32, addr: u32) -> Result<u16, BusError> {
        let bytes = self.read_array::<2>(addr & !1)?;
        Ok(match self.endianness {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(&mut self, _pc: u32, addr: u32) -> Result<u32, BusError> {
        let bytes = self.read_array::<4>(addr & !3)?;
        Ok(match self.endianness {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        })
    }

    fn write_u8(&mut self, _pc: u32, addr: u32, value: u8) -> Result<(), BusError> {
        let offset = self.writable(addr, 1)?;
        self.bytes[offset] = value;
        Ok(())
    }

    fn write_u16(&mut self, _pc: u32, addr: u32, value: u16) -> Result<(), BusError> {
        let addr = addr & !1;
        let offset = self.writable(addr, 2)?;
        let bytes = match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        };
        self.bytes[offset..offset + 2].copy_from_slice(&bytes);
        Ok(())
    }

    fn write_u32(&mut self, _pc: u32, addr: u32, value: u32) -> Result<(), BusError> {
        let addr = addr & !3;
        let offset = self.writable(addr, 4)?;
        let bytes = self.encode(value);
        self.bytes[offset..offset + 4].copy_from_slice(&bytes);
        Ok(())
    }
}
