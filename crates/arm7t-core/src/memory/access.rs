//! Word access at arbitrary byte addresses.
//!
//! The bus only ever sees aligned word transfers. A misaligned load reads the
//! containing word and rotates it so that the addressed byte lands in bits
//! `[7:0]`; a misaligned store writes the containing word unchanged.

use super::MemoryBus;
use crate::BusError;

/// Bytes per architectural word.
pub const WORD_BYTES: u32 = 4;

/// Loads a word from `addr`, which need not be word aligned.
///
/// | `addr % 4` | result                  |
/// |------------|-------------------------|
/// | 0          | the aligned word        |
/// | 1          | rotated right 8 bits    |
/// | 2          | halfwords swapped       |
/// | 3          | rotated left 8 bits     |
///
/// The rotation is applied to the value assembled by the bus and does not
/// depend on its byte order.
///
/// # Errors
///
/// Propagates the [`BusError`] of the aligned read.
pub fn load_word<M: MemoryBus + ?Sized>(bus: &mut M, pc: u32, addr: u32) -> Result<u32, BusError> {
    let offset = addr % WORD_BYTES;
    let word = bus.read_u32(pc, addr - offset)?;
    Ok(match offset {
        0 => word,
        1 => word.rotate_right(8),
        2 => word.rotate_right(16),
        _ => word.rotate_left(8),
    })
}

/// Stores `value` to the word containing `addr`.
///
/// # Errors
///
/// Propagates the [`BusError`] of the aligned write.
pub fn store_word<M: MemoryBus + ?Sized>(
    bus: &mut M,
    pc: u32,
    addr: u32,
    value: u32,
) -> Result<(), BusError> {
    bus.write_u32(pc, addr & !(WORD_BYTES - 1), value)
}
