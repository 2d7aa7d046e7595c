use super::{arith_flags, logical_flags, read_reg, sign_extend, sub_with_carry};
use crate::eval::{
    add_with_carry, compute_carry_out_immshift, compute_carry_out_regshift,
    compute_operand2_immshift, compute_operand2_regshift, ShiftType,
};
use crate::semantics::{Completion, ExecContext, InstructionSet};
use crate::state::{Flags, IsaMode, LR, PC, SP};
use crate::MemoryFault;

const INSN_BYTES: u32 = 2;

/// Decoded Thumb operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbOp {
    /// `LSL`/`LSR`/`ASR` by immediate.
    ShiftImm {
        /// Shift operation.
        shift_type: ShiftType,
        /// 5-bit amount.
        amount: u32,
        /// Source.
        rs: usize,
        /// Destination.
        rd: usize,
    },
    /// `ADD`/`SUB` with a register or 3-bit immediate.
    AddSub {
        /// Subtract.
        sub: bool,
        /// `operand` is an immediate rather than a register number.
        immediate: bool,
        /// Register number or immediate.
        operand: u32,
        /// First operand.
        rs: usize,
        /// Destination.
        rd: usize,
    },
    /// `MOV`/`CMP`/`ADD`/`SUB` with an 8-bit immediate.
    Imm8 {
        /// 0 `MOV`, 1 `CMP`, 2 `ADD`, 3 `SUB`.
        op: u32,
        /// Destination and first operand.
        rd: usize,
        /// Immediate.
        imm: u32,
    },
    /// Register ALU operation.
    Alu {
        /// 4-bit opcode, `AND` = 0 through `MVN` = 15.
        op: u32,
        /// Second operand.
        rs: usize,
        /// Destination and first operand.
        rd: usize,
    },
    /// `ADD`/`CMP`/`MOV` on the full register set.
    HiReg {
        /// 0 `ADD`, 1 `CMP`, 2 `MOV`.
        op: u32,
        /// Source.
        rs: usize,
        /// Destination.
        rd: usize,
    },
    /// `BX`.
    Bx {
        /// Target register.
        rs: usize,
    },
    /// `LDR rd, [PC, #imm]`.
    PcLoad {
        /// Destination.
        rd: usize,
        /// Byte offset from the word-aligned `PC`.
        offset: u32,
    },
    /// Word, byte or halfword transfer with an immediate offset.
    TransferImm {
        /// Load rather than store.
        load: bool,
        /// Access width in bytes.
        width: u32,
        /// Byte offset.
        offset: u32,
        /// Base.
        rb: usize,
        /// Transfer register.
        rd: usize,
    },
    /// `LDR`/`STR` relative to `SP`.
    SpTransfer {
        /// Load rather than store.
        load: bool,
        /// Transfer register.
        rd: usize,
        /// Byte offset.
        offset: u32,
    },
    /// `ADD rd, PC|SP, #imm`.
    LoadAddress {
        /// Base is `SP` rather than `PC`.
        sp: bool,
        /// Destination.
        rd: usize,
        /// Byte offset.
        offset: u32,
    },
    /// `ADD SP, #±imm`.
    AdjustSp {
        /// Signed byte offset.
        offset: u32,
    },
    /// `B<cond>`.
    CondBranch {
        /// Condition selector.
        cond: u32,
        /// Signed byte offset from `PC + 4`.
        offset: u32,
    },
    /// `SWI`.
    Swi {
        /// 8-bit comment field.
        comment: u32,
    },
    /// `B`.
    Branch {
        /// Signed byte offset from `PC + 4`.
        offset: u32,
    },
    /// First half of `BL`.
    BlPrefix {
        /// Signed offset of the upper target bits, already shifted.
        offset: u32,
    },
    /// Second half of `BL`.
    BlSuffix {
        /// Low target bits, already shifted.
        offset: u32,
    },
    /// Anything outside the subset.
    Undefined,
}

/// One decoded Thumb instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbInsn {
    /// Raw encoding.
    pub raw: u16,
    /// Decoded operation.
    pub op: ThumbOp,
}

/// Thumb instruction subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbSubset;

const fn field(raw: u32, lsb: u32, width: u32) -> u32 {
    (raw >> lsb) & ((1 << width) - 1)
}

const fn low_reg(raw: u32, lsb: u32) -> usize {
    field(raw, lsb, 3) as usize
}

const fn flag(raw: u32, bit: u32) -> bool {
    (raw >> bit) & 1 != 0
}

/// Decodes a raw Thumb halfword.
#[must_use]
pub const fn decode_halfword(raw: u16) -> ThumbInsn {
    ThumbInsn {
        raw,
        op: decode_op(raw as u32),
    }
}

const fn decode_op(raw: u32) -> ThumbOp {
    match raw >> 13 {
        0b000 if field(raw, 11, 2) == 0b11 => ThumbOp::AddSub {
            sub: flag(raw, 9),
            immediate: flag(raw, 10),
            operand: field(raw, 6, 3),
            rs: low_reg(raw, 3),
            rd: low_reg(raw, 0),
        },
        0b000 => ThumbOp::ShiftImm {
            shift_type: ShiftType::from_bits(field(raw, 11, 2)),
            amount: field(raw, 6, 5),
            rs: low_reg(raw, 3),
            rd: low_reg(raw, 0),
        },
        0b001 => ThumbOp::Imm8 {
            op: field(raw, 11, 2),
            rd: low_reg(raw, 8),
            imm: field(raw, 0, 8),
        },
        0b010 => decode_group_010(raw),
        0b011 => {
            let byte = flag(raw, 12);
            let imm = field(raw, 6, 5);
            ThumbOp::TransferImm {
                load: flag(raw, 11),
                width: if byte { 1 } else { 4 },
                offset: if byte { imm } else { imm * 4 },
                rb: low_reg(raw, 3),
                rd: low_reg(raw, 0),
            }
        }
        0b100 if flag(raw, 12) => ThumbOp::SpTransfer {
            load: flag(raw, 11),
            rd: low_reg(raw, 8),
            offset: field(raw, 0, 8) * 4,
        },
        0b100 => ThumbOp::TransferImm {
            load: flag(raw, 11),
            width: 2,
            offset: field(raw, 6, 5) * 2,
            rb: low_reg(raw, 3),
            rd: low_reg(raw, 0),
        },
        0b101 if !flag(raw, 12) => ThumbOp::LoadAddress {
            sp: flag(raw, 11),
            rd: low_reg(raw, 8),
            offset: field(raw, 0, 8) * 4,
        },
        0b101 if field(raw, 8, 5) == 0b1_0000 => {
            let magnitude = field(raw, 0, 7) * 4;
            ThumbOp::AdjustSp {
                offset: if flag(raw, 7) {
                    magnitude.wrapping_neg()
                } else {
                    magnitude
                },
            }
        }
        0b110 if flag(raw, 12) => match field(raw, 8, 4) {
            0xF => ThumbOp::Swi {
                comment: field(raw, 0, 8),
            },
            0xE => ThumbOp::Undefined,
            cond => ThumbOp::CondBranch {
                cond,
                offset: sign_extend(field(raw, 0, 8), 8) << 1,
            },
        },
        0b111 => match field(raw, 11, 2) {
            0b00 => ThumbOp::Branch {
                offset: sign_extend(field(raw, 0, 11), 11) << 1,
            },
            0b10 => ThumbOp::BlPrefix {
                offset: sign_extend(field(raw, 0, 11), 11) << 12,
            },
            0b11 => ThumbOp::BlSuffix {
                offset: field(raw, 0, 11) << 1,
            },
            _ => ThumbOp::Undefined,
        },
        _ => ThumbOp::Undefined,
    }
}

const fn decode_group_010(raw: u32) -> ThumbOp {
    if field(raw, 10, 3) == 0b000 {
        return ThumbOp::Alu {
            op: field(raw, 6, 4),
            rs: low_reg(raw, 3),
            rd: low_reg(raw, 0),
        };
    }
    if field(raw, 10, 3) == 0b001 {
        let rs = field(raw, 3, 4) as usize;
        let rd = (field(raw, 7, 1) << 3 | field(raw, 0, 3)) as usize;
        return match field(raw, 8, 2) {
            0b11 => ThumbOp::Bx { rs },
            op => ThumbOp::HiReg { op, rs, rd },
        };
    }
    if field(raw, 11, 2) == 0b01 {
        return ThumbOp::PcLoad {
            rd: low_reg(raw, 8),
            offset: field(raw, 0, 8) * 4,
        };
    }
    // Register-offset transfers are outside the subset.
    ThumbOp::Undefined
}

impl InstructionSet for ThumbSubset {
    type Insn = ThumbInsn;

    const MODE: IsaMode = IsaMode::Thumb;

    fn decode<C: ExecContext + ?Sized>(&self, ctx: &mut C, pc: u32) -> Result<ThumbInsn, MemoryFault> {
        ctx.fetch_u16(pc).map(decode_halfword)
    }

    fn is_control_transfer(&self, insn: &ThumbInsn) -> bool {
        match insn.op {
            ThumbOp::Bx { .. }
            | ThumbOp::CondBranch { .. }
            | ThumbOp::Swi { .. }
            | ThumbOp::Branch { .. }
            | ThumbOp::BlSuffix { .. }
            | ThumbOp::Undefined => true,
            ThumbOp::HiReg { op, rd, .. } => rd == PC && op != 1,
            _ => false,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn execute<C: ExecContext + ?Sized>(
        &self,
        ctx: &mut C,
        pc: u32,
        insn: &ThumbInsn,
    ) -> Result<Completion, MemoryFault> {
        let next = Completion::Done {
            npc: pc.wrapping_add(INSN_BYTES),
        };
        let pc_value = pc.wrapping_add(4);
        let flags = ctx.flags();
        match insn.op {
            ThumbOp::ShiftImm {
                shift_type,
                amount,
                rs,
                rd,
            } => {
                let value = ctx.gpr(rs);
                let result = compute_operand2_immshift(value, shift_type, amount, flags.c);
                let carry = compute_carry_out_immshift(value, shift_type, amount, flags.c);
                ctx.set_gpr(rd, result);
                ctx.set_flags(logical_flags(flags, result, carry));
            }
            ThumbOp::AddSub {
                sub,
                immediate,
                operand,
                rs,
                rd,
            } => {
                let b = if immediate {
                    operand
                } else {
                    ctx.gpr(operand as usize)
                };
                let a = ctx.gpr(rs);
                let (result, carry, overflow) = if sub {
                    sub_with_carry(a, b, true)
                } else {
                    add_with_carry(a, b, false)
                };
                ctx.set_gpr(rd, result);
                ctx.set_flags(arith_flags(result, carry, overflow));
            }
            ThumbOp::Imm8 { op, rd, imm } => {
                let a = ctx.gpr(rd);
                match op {
                    0 => {
                        ctx.set_gpr(rd, imm);
                        ctx.set_flags(flags.with_nz(imm));
                    }
                    1 => {
                        let (result, carry, overflow) = sub_with_carry(a, imm, true);
                        ctx.set_flags(arith_flags(result, carry, overflow));
                    }
                    2 => {
                        let (result, carry, overflow) = add_with_carry(a, imm, false);
                        ctx.set_gpr(rd, result);
                        ctx.set_flags(arith_flags(result, carry, overflow));
                    }
                    _ => {
                        let (result, carry, overflow) = sub_with_carry(a, imm, true);
                        ctx.set_gpr(rd, result);
                        ctx.set_flags(arith_flags(result, carry, overflow));
                    }
                }
            }
            ThumbOp::Alu { op, rs, rd } => alu(ctx, op, rs, rd),
            ThumbOp::HiReg { op, rs, rd } => {
                let value = read_reg(ctx, rs, pc_value);
                let current = read_reg(ctx, rd, pc_value);
                let result = match op {
                    0 => current.wrapping_add(value),
                    1 => {
                        let (result, carry, overflow) = sub_with_carry(current, value, true);
                        ctx.set_flags(arith_flags(result, carry, overflow));
                        return Ok(next);
                    }
                    _ => value,
                };
                if rd == PC {
                    return Ok(Completion::DoneCti { npc: result & !1 });
                }
                ctx.set_gpr(rd, result);
            }
            ThumbOp::Bx { rs } => {
                let target = read_reg(ctx, rs, pc_value);
                let thumb = target & 1 != 0;
                ctx.set_tbit(thumb);
                let npc = if thumb { target & !1 } else { target & !3 };
                return Ok(Completion::DoneCti { npc });
            }
            ThumbOp::PcLoad { rd, offset } => {
                let addr = (pc_value & !3).wrapping_add(offset);
                let value = ctx.load_word(pc, addr)?;
                ctx.set_gpr(rd, value);
            }
            ThumbOp::TransferImm {
                load,
                width,
                offset,
                rb,
                rd,
            } => {
                let addr = ctx.gpr(rb).wrapping_add(offset);
                transfer(ctx, pc, load, width, addr, rd)?;
            }
            ThumbOp::SpTransfer { load, rd, offset } => {
                let addr = ctx.gpr(SP).wrapping_add(offset);
                transfer(ctx, pc, load, 4, addr, rd)?;
            }
            ThumbOp::LoadAddress { sp, rd, offset } => {
                let base = if sp { ctx.gpr(SP) } else { pc_value & !3 };
                ctx.set_gpr(rd, base.wrapping_add(offset));
            }
            ThumbOp::AdjustSp { offset } => {
                let sp = ctx.gpr(SP).wrapping_add(offset);
                ctx.set_gpr(SP, sp);
            }
            ThumbOp::CondBranch { cond, offset } => {
                if ctx.eval_cond(cond, pc) {
                    return Ok(Completion::DoneCti {
                        npc: pc_value.wrapping_add(offset),
                    });
                }
            }
            ThumbOp::Swi { comment } => {
                ctx.swi(pc, comment);
                return Ok(Completion::DoneCti {
                    npc: pc.wrapping_add(INSN_BYTES),
                });
            }
            ThumbOp::Branch { offset } => {
                return Ok(Completion::DoneCti {
                    npc: pc_value.wrapping_add(offset),
                });
            }
            ThumbOp::BlPrefix { offset } => {
                ctx.set_gpr(LR, pc_value.wrapping_add(offset));
            }
            ThumbOp::BlSuffix { offset } => {
                let target = ctx.gpr(LR).wrapping_add(offset);
                ctx.set_gpr(LR, pc.wrapping_add(INSN_BYTES) | 1);
                return Ok(Completion::DoneCti { npc: target });
            }
            ThumbOp::Undefined => {
                ctx.invalid_insn(pc);
                return Ok(Completion::DoneCti {
                    npc: pc.wrapping_add(INSN_BYTES),
                });
            }
        }
        Ok(next)
    }
}

fn alu<C: ExecContext + ?Sized>(ctx: &mut C, op: u32, rs: usize, rd: usize) {
    let flags = ctx.flags();
    let a = ctx.gpr(rd);
    let b = ctx.gpr(rs);
    let shift = |shift_type| {
        (
            compute_operand2_regshift(a, shift_type, b, flags.c),
            compute_carry_out_regshift(a, shift_type, b, flags.c),
        )
    };
    let (result, new_flags, write) = match op {
        0x0 | 0x8 => (a & b, flags.with_nz(a & b), op == 0x0),
        0x1 => (a ^ b, flags.with_nz(a ^ b), true),
        0x2 | 0x3 | 0x4 | 0x7 => {
            let shift_type = match op {
                0x2 => ShiftType::Lsl,
                0x3 => ShiftType::Lsr,
                0x4 => ShiftType::Asr,
                _ => ShiftType::Ror,
            };
            let (result, carry) = shift(shift_type);
            (result, logical_flags(flags, result, carry), true)
        }
        0x5 => arith(add_with_carry(a, b, flags.c), true),
        0x6 => arith(sub_with_carry(a, b, flags.c), true),
        0x9 => arith(sub_with_carry(0, b, true), true),
        0xA => arith(sub_with_carry(a, b, true), false),
        0xB => arith(add_with_carry(a, b, false), false),
        0xC => (a | b, flags.with_nz(a | b), true),
        0xD => {
            let result = a.wrapping_mul(b);
            (result, flags.with_nz(result), true)
        }
        0xE => (a & !b, flags.with_nz(a & !b), true),
        _ => (!b, flags.with_nz(!b), true),
    };
    if write {
        ctx.set_gpr(rd, result);
    }
    ctx.set_flags(new_flags);
}

const fn arith(
    (result, carry, overflow): (u32, bool, bool),
    write: bool,
) -> (u32, Flags, bool) {
    (result, arith_flags(result, carry, overflow), write)
}

fn transfer<C: ExecContext + ?Sized>(
    ctx: &mut C,
    pc: u32,
    load: bool,
    width: u32,
    addr: u32,
    rd: usize,
) -> Result<(), MemoryFault> {
    if load {
        let value = match width {
            1 => u32::from(ctx.load_byte(pc, addr)?),
            2 => u32::from(ctx.load_half(pc, addr)?),
            _ => ctx.load_word(pc, addr)?,
        };
        ctx.set_gpr(rd, value);
    } else {
        let value = ctx.gpr(rd);
        match width {
            1 => ctx.store_byte(pc, addr, value.to_le_bytes()[0])?,
            2 => {
                let [lo, hi, ..] = value.to_le_bytes();
                ctx.store_half(pc, addr, u16::from_le_bytes([lo, hi]))?;
            }
            _ => ctx.store_word(pc, addr, value)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{decode_halfword, ThumbOp, ThumbSubset};
    use crate::eval::ShiftType;
    use crate::semantics::InstructionSet;
    use rstest::rstest;

    #[rstest]
    #[case(0x0088, ThumbOp::ShiftImm { shift_type: ShiftType::Lsl, amount: 2, rs: 1, rd: 0 })]
    #[case(0x1C48, ThumbOp::AddSub { sub: false, immediate: true, operand: 1, rs: 1, rd: 0 })]
    #[case(0x1A42, ThumbOp::AddSub { sub: true, immediate: false, operand: 1, rs: 0, rd: 2 })]
    #[case(0x2105, ThumbOp::Imm8 { op: 0, rd: 1, imm: 5 })]
    #[case(0x4148, ThumbOp::Alu { op: 5, rs: 1, rd: 0 })]
    #[case(0x4770, ThumbOp::Bx { rs: 14 })]
    #[case(0x46F7, ThumbOp::HiReg { op: 2, rs: 14, rd: 15 })]
    #[case(0x4801, ThumbOp::PcLoad { rd: 0, offset: 4 })]
    #[case(0x6848, ThumbOp::TransferImm { load: true, width: 4, offset: 4, rb: 1, rd: 0 })]
    #[case(0x7008, ThumbOp::TransferImm { load: false, width: 1, offset: 0, rb: 1, rd: 0 })]
    #[case(0x8848, ThumbOp::TransferImm { load: true, width: 2, offset: 2, rb: 1, rd: 0 })]
    #[case(0x9801, ThumbOp::SpTransfer { load: true, rd: 0, offset: 4 })]
    #[case(0xB082, ThumbOp::AdjustSp { offset: 0xFFFF_FFF8 })]
    #[case(0xD0FE, ThumbOp::CondBranch { cond: 0, offset: 0xFFFF_FFFC })]
    #[case(0xDF10, ThumbOp::Swi { comment: 0x10 })]
    #[case(0xDE00, ThumbOp::Undefined)]
    #[case(0xE7FE, ThumbOp::Branch { offset: 0xFFFF_FFFC })]
    #[case(0xF000, ThumbOp::BlPrefix { offset: 0 })]
    #[case(0xF802, ThumbOp::BlSuffix { offset: 4 })]
    #[case(0x5000, ThumbOp::Undefined)]
    fn decodes_formats(#[case] raw: u16, #[case] expected: ThumbOp) {
        assert_eq!(decode_halfword(raw).op, expected);
    }

    #[test]
    fn branches_and_pc_writes_end_blocks() {
        let isa = ThumbSubset;
        assert!(isa.is_control_transfer(&decode_halfword(0xE7FE)));
        assert!(isa.is_control_transfer(&decode_halfword(0x46F7)));
        assert!(!isa.is_control_transfer(&decode_halfword(0xF000)));
        assert!(!isa.is_control_transfer(&decode_halfword(0x2105)));
    }
}
