//! Barrel shifter: shifted operand values and shifter carry-out.
//!
//! Immediate-form amounts come from a 5-bit field where zero encodes the
//! special forms `LSR #32`, `ASR #32` and `RRX`. Register-form amounts use the
//! bottom byte of the register and zero leaves both value and carry alone.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

/// Shift operation selected by bits `[6:5]` of a shifted operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ShiftType {
    /// Logical shift left.
    Lsl = 0,
    /// Logical shift right.
    Lsr = 1,
    /// Arithmetic shift right.
    Asr = 2,
    /// Rotate right (`RRX` for immediate zero).
    Ror = 3,
}

impl ShiftType {
    /// All shift types in encoding order.
    pub const ALL: [Self; 4] = [Self::Lsl, Self::Lsr, Self::Asr, Self::Ror];

    /// Decodes the two-bit shift field; higher bits are ignored.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }
}

const fn bit(value: u32, index: u32) -> bool {
    (value >> index) & 1 != 0
}

const fn sign_fill(rm: u32) -> u32 {
    ((rm as i32) >> 31) as u32
}

// Amount is non-zero and unbounded.
const fn shift_by(rm: u32, shift_type: ShiftType, amount: u32) -> (u32, bool) {
    match shift_type {
        ShiftType::Lsl => {
            if amount < 32 {
                (rm << amount, bit(rm, 32 - amount))
            } else if amount == 32 {
                (0, bit(rm, 0))
            } else {
                (0, false)
            }
        }
        ShiftType::Lsr => {
            if amount < 32 {
                (rm >> amount, bit(rm, amount - 1))
            } else if amount == 32 {
                (0, bit(rm, 31))
            } else {
                (0, false)
            }
        }
        ShiftType::Asr => {
            if amount < 32 {
                (((rm as i32) >> amount) as u32, bit(rm, amount - 1))
            } else {
                (sign_fill(rm), bit(rm, 31))
            }
        }
        ShiftType::Ror => {
            let rotate = amount % 32;
            if rotate == 0 {
                (rm, bit(rm, 31))
            } else {
                (rm.rotate_right(rotate), bit(rm, rotate - 1))
            }
        }
    }
}

const fn immshift(rm: u32, shift_type: ShiftType, shift: u32, cbit: bool) -> (u32, bool) {
    if shift != 0 {
        return shift_by(rm, shift_type, shift);
    }
    match shift_type {
        ShiftType::Lsl => (rm, cbit),
        ShiftType::Lsr => (0, bit(rm, 31)),
        ShiftType::Asr => (sign_fill(rm), bit(rm, 31)),
        ShiftType::Ror => (((cbit as u32) << 31) | (rm >> 1), bit(rm, 0)),
    }
}

const fn regshift(rm: u32, shift_type: ShiftType, rs: u32, cbit: bool) -> (u32, bool) {
    let amount = rs & 0xFF;
    if amount == 0 {
        (rm, cbit)
    } else {
        shift_by(rm, shift_type, amount)
    }
}

/// Operand 2 for an immediate shift amount.
#[must_use]
pub const fn compute_operand2_immshift(
    rm: u32,
    shift_type: ShiftType,
    shift: u32,
    cbit: bool,
) -> u32 {
    immshift(rm, shift_type, shift, cbit).0
}

/// Operand 2 for a shift amount taken from a register.
#[must_use]
pub const fn compute_operand2_regshift(rm: u32, shift_type: ShiftType, rs: u32, cbit: bool) -> u32 {
    regshift(rm, shift_type, rs, cbit).0
}

/// Shifter carry-out for an immediate shift amount.
#[must_use]
pub const fn compute_carry_out_immshift(
    rm: u32,
    shift_type: ShiftType,
    shift: u32,
    cbit: bool,
) -> bool {
    immshift(rm, shift_type, shift, cbit).1
}

/// Shifter carry-out for a shift amount taken from a register.
#[must_use]
pub const fn compute_carry_out_regshift(
    rm: u32,
    shift_type: ShiftType,
    rs: u32,
    cbit: bool,
) -> bool {
    regshift(rm, shift_type, rs, cbit).1
}

/// ARM data-processing immediate: `imm8` rotated right by `2 * rotate`.
/// Returns the value and the shifter carry-out.
#[must_use]
pub const fn rotated_immediate(imm8: u32, rotate: u32, cbit: bool) -> (u32, bool) {
    let amount = (rotate & 0xF) * 2;
    let value = (imm8 & 0xFF).rotate_right(amount);
    if amount == 0 {
        (value, cbit)
    } else {
        (value, bit(value, 31))
    }
}
