//! Reference instruction sets.
//!
//! Working subsets of the ARM and Thumb encodings, enough to run real code
//! through the core. Encodings outside a subset decode to an undefined
//! instruction.

/// 32-bit ARM subset.
pub mod arm;
/// 16-bit Thumb subset.
pub mod thumb;

pub use arm::{ArmInsn, ArmOp, ArmSubset};
pub use thumb::{ThumbInsn, ThumbOp, ThumbSubset};

use crate::eval::add_with_carry;
use crate::semantics::ExecContext;
use crate::state::{Flags, PC};

// Register read with register 15 replaced by the pipeline value.
fn read_reg<C: ExecContext + ?Sized>(ctx: &C, index: usize, pc_value: u32) -> u32 {
    if index == PC {
        pc_value
    } else {
        ctx.gpr(index)
    }
}

const fn logical_flags(flags: Flags, result: u32, carry: bool) -> Flags {
    Flags {
        c: carry,
        ..flags.with_nz(result)
    }
}

const fn arith_flags(result: u32, carry: bool, overflow: bool) -> Flags {
    Flags {
        n: result >> 31 != 0,
        z: result == 0,
        c: carry,
        v: overflow,
    }
}

/// Result and flags of `a - b - !carry_in`.
const fn sub_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    add_with_carry(a, !b, carry_in)
}

// Sign-extends the low `bits` bits of `value`.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
const fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}
