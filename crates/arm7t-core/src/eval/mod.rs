//! Operand and condition evaluation shared by instruction semantics.
//!
//! Everything here is a pure function of its arguments; the reporting of
//! unrecognised condition selectors lives on [`crate::ExecContext`].

/// Condition predicates over `NZCV`.
pub mod cond;
/// Barrel shifter operand and carry-out computation.
pub mod shift;

pub use cond::Condition;
pub use shift::{
    compute_carry_out_immshift, compute_carry_out_regshift, compute_operand2_immshift,
    compute_operand2_regshift, rotated_immediate, ShiftType,
};

/// Result and flags of `a + b + carry_in`, as produced by `ADD`/`ADC`/`SUB`.
///
/// Subtraction is expressed as `a + !b + 1`.
#[must_use]
pub const fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + carry_in as u64;
    #[allow(clippy::cast_possible_truncation)]
    let result = wide as u32;
    let carry = wide > u32::MAX as u64;
    let overflow = ((a ^ result) & (b ^ result)) >> 31 != 0;
    (result, carry, overflow)
}
