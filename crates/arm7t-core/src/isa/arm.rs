use super::{arith_flags, logical_flags, read_reg, sign_extend, sub_with_carry};
use crate::eval::{
    add_with_carry, compute_carry_out_immshift, compute_carry_out_regshift,
    compute_operand2_immshift, compute_operand2_regshift, rotated_immediate, ShiftType,
};
use crate::semantics::{Completion, ExecContext, InstructionSet};
use crate::state::cpsr::{CPSR_FLAGS_MASK, CPSR_T};
use crate::state::{Flags, IsaMode, LR, PC};
use crate::MemoryFault;

const INSN_BYTES: u32 = 4;

/// Second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand2 {
    /// Rotated 8-bit immediate.
    Imm {
        /// Unrotated value.
        imm8: u32,
        /// Rotation in units of two bits.
        rotate: u32,
    },
    /// Register shifted by an immediate amount.
    ImmShift {
        /// Shifted register.
        rm: usize,
        /// Shift operation.
        shift_type: ShiftType,
        /// 5-bit amount field.
        amount: u32,
    },
    /// Register shifted by the bottom byte of another register.
    RegShift {
        /// Shifted register.
        rm: usize,
        /// Shift operation.
        shift_type: ShiftType,
        /// Register holding the amount.
        rs: usize,
    },
}

/// Offset of a single data transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferOffset {
    /// 12-bit immediate.
    Imm(u32),
    /// Register shifted by an immediate amount.
    Reg {
        /// Offset register.
        rm: usize,
        /// Shift operation.
        shift_type: ShiftType,
        /// 5-bit amount field.
        amount: u32,
    },
}

/// Source of an `MSR` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsrSource {
    /// Rotated immediate, already expanded.
    Imm(u32),
    /// Register.
    Reg(usize),
}

/// Decoded ARM operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmOp {
    /// The sixteen data-processing opcodes.
    DataProc {
        /// Opcode field, `AND` = 0 through `MVN` = 15.
        opcode: u32,
        /// Updates flags.
        s: bool,
        /// First operand register.
        rn: usize,
        /// Destination register.
        rd: usize,
        /// Second operand.
        operand2: Operand2,
    },
    /// `MUL` / `MLA`.
    Multiply {
        /// Adds `rn` (`MLA`).
        accumulate: bool,
        /// Updates `N` and `Z`.
        s: bool,
        /// Destination.
        rd: usize,
        /// Accumulator.
        rn: usize,
        /// Multiplier.
        rs: usize,
        /// Multiplicand.
        rm: usize,
    },
    /// `MRS`.
    Mrs {
        /// Reads `SPSR` instead of `CPSR`.
        spsr: bool,
        /// Destination.
        rd: usize,
    },
    /// `MSR`.
    Msr {
        /// Writes `SPSR` instead of `CPSR`.
        spsr: bool,
        /// Byte mask built from the field selector.
        mask: u32,
        /// Value source.
        source: MsrSource,
    },
    /// `B` / `BL`.
    Branch {
        /// Writes the return address to `LR`.
        link: bool,
        /// Byte offset relative to `PC + 8`.
        offset: u32,
    },
    /// `BX`.
    Bx {
        /// Target register; bit 0 selects Thumb.
        rm: usize,
    },
    /// `LDR` / `STR` / `LDRB` / `STRB`.
    Transfer {
        /// Load rather than store.
        load: bool,
        /// Byte rather than word.
        byte: bool,
        /// Offset applied before the access.
        pre: bool,
        /// Offset is added.
        up: bool,
        /// Base written back (always for post-indexing).
        writeback: bool,
        /// Base register.
        rn: usize,
        /// Transfer register.
        rd: usize,
        /// Offset.
        offset: TransferOffset,
    },
    /// `SWI`.
    Swi {
        /// 24-bit comment field.
        comment: u32,
    },
    /// Anything outside the subset.
    Undefined,
}

/// One decoded ARM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArmInsn {
    /// Raw encoding.
    pub raw: u32,
    /// Condition field.
    pub cond: u32,
    /// Decoded operation.
    pub op: ArmOp,
}

/// ARM instruction subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmSubset;

const fn field(raw: u32, lsb: u32, width: u32) -> u32 {
    (raw >> lsb) & ((1 << width) - 1)
}

const fn reg(raw: u32, lsb: u32) -> usize {
    field(raw, lsb, 4) as usize
}

const fn flag(raw: u32, bit: u32) -> bool {
    (raw >> bit) & 1 != 0
}

const fn is_test_opcode(opcode: u32) -> bool {
    matches!(opcode, 0x8..=0xB)
}

/// Decodes a raw ARM word.
#[must_use]
pub const fn decode_word(raw: u32) -> ArmInsn {
    ArmInsn {
        raw,
        cond: raw >> 28,
        op: decode_op(raw),
    }
}

const fn decode_op(raw: u32) -> ArmOp {
    if raw & 0x0FFF_FFF0 == 0x012F_FF10 {
        return ArmOp::Bx { rm: reg(raw, 0) };
    }
    if raw & 0x0FC0_00F0 == 0x0000_0090 {
        return ArmOp::Multiply {
            accumulate: flag(raw, 21),
            s: flag(raw, 20),
            rd: reg(raw, 16),
            rn: reg(raw, 12),
            rs: reg(raw, 8),
            rm: reg(raw, 0),
        };
    }
    if raw & 0x0FBF_0FFF == 0x010F_0000 {
        return ArmOp::Mrs {
            spsr: flag(raw, 22),
            rd: reg(raw, 12),
        };
    }
    if raw & 0x0FB0_FFF0 == 0x0120_F000 {
        return ArmOp::Msr {
            spsr: flag(raw, 22),
            mask: msr_mask(raw),
            source: MsrSource::Reg(reg(raw, 0)),
        };
    }
    if raw & 0x0FB0_F000 == 0x0320_F000 {
        let (value, _) = rotated_immediate(field(raw, 0, 8), field(raw, 8, 4), false);
        return ArmOp::Msr {
            spsr: flag(raw, 22),
            mask: msr_mask(raw),
            source: MsrSource::Imm(value),
        };
    }

    match field(raw, 25, 3) {
        0b000 | 0b001 => decode_data_proc(raw),
        0b010 | 0b011 => decode_transfer(raw),
        0b101 => ArmOp::Branch {
            link: flag(raw, 24),
            offset: sign_extend(field(raw, 0, 24), 24) << 2,
        },
        0b111 if flag(raw, 24) => ArmOp::Swi {
            comment: field(raw, 0, 24),
        },
        _ => ArmOp::Undefined,
    }
}

const fn msr_mask(raw: u32) -> u32 {
    let mut mask = 0;
    if flag(raw, 16) {
        mask |= 0x0000_00FF;
    }
    if flag(raw, 17) {
        mask |= 0x0000_FF00;
    }
    if flag(raw, 18) {
        mask |= 0x00FF_0000;
    }
    if flag(raw, 19) {
        mask |= 0xFF00_0000;
    }
    mask
}

const fn decode_data_proc(raw: u32) -> ArmOp {
    let immediate = flag(raw, 25);
    // Halfword transfers, swaps and long multiplies share this space.
    if !immediate && flag(raw, 4) && flag(raw, 7) {
        return ArmOp::Undefined;
    }
    let opcode = field(raw, 21, 4);
    let s = flag(raw, 20);
    if is_test_opcode(opcode) && !s {
        return ArmOp::Undefined;
    }
    let shift_type = ShiftType::from_bits(field(raw, 5, 2));
    let operand2 = if immediate {
        Operand2::Imm {
            imm8: field(raw, 0, 8),
            rotate: field(raw, 8, 4),
        }
    } else if flag(raw, 4) {
        Operand2::RegShift {
            rm: reg(raw, 0),
            shift_type,
            rs: reg(raw, 8),
        }
    } else {
        Operand2::ImmShift {
            rm: reg(raw, 0),
            shift_type,
            amount: field(raw, 7, 5),
        }
    };
    ArmOp::DataProc {
        opcode,
        s,
        rn: reg(raw, 16),
        rd: reg(raw, 12),
        operand2,
    }
}

const fn decode_transfer(raw: u32) -> ArmOp {
    let register_offset = flag(raw, 25);
    if register_offset && flag(raw, 4) {
        return ArmOp::Undefined;
    }
    let offset = if register_offset {
        TransferOffset::Reg {
            rm: reg(raw, 0),
            shift_type: ShiftType::from_bits(field(raw, 5, 2)),
            amount: field(raw, 7, 5),
        }
    } else {
        TransferOffset::Imm(field(raw, 0, 12))
    };
    let pre = flag(raw, 24);
    ArmOp::Transfer {
        load: flag(raw, 20),
        byte: flag(raw, 22),
        pre,
        up: flag(raw, 23),
        writeback: !pre || flag(raw, 21),
        rn: reg(raw, 16),
        rd: reg(raw, 12),
        offset,
    }
}

impl InstructionSet for ArmSubset {
    type Insn = ArmInsn;

    const MODE: IsaMode = IsaMode::Arm;

    fn decode<C: ExecContext + ?Sized>(&self, ctx: &mut C, pc: u32) -> Result<ArmInsn, MemoryFault> {
        ctx.fetch_u32(pc).map(decode_word)
    }

    fn is_control_transfer(&self, insn: &ArmInsn) -> bool {
        match insn.op {
            ArmOp::Branch { .. } | ArmOp::Bx { .. } | ArmOp::Swi { .. } | ArmOp::Undefined => true,
            ArmOp::DataProc { opcode, rd, .. } => rd == PC && !is_test_opcode(opcode),
            ArmOp::Transfer { load, rd, .. } => load && rd == PC,
            ArmOp::Multiply { .. } | ArmOp::Mrs { .. } | ArmOp::Msr { .. } => false,
        }
    }

    fn execute<C: ExecContext + ?Sized>(
        &self,
        ctx: &mut C,
        pc: u32,
        insn: &ArmInsn,
    ) -> Result<Completion, MemoryFault> {
        let next = Completion::Done {
            npc: pc.wrapping_add(INSN_BYTES),
        };
        if !ctx.eval_cond(insn.cond, pc) {
            return Ok(next);
        }
        match insn.op {
            ArmOp::DataProc {
                opcode,
                s,
                rn,
                rd,
                operand2,
            } => Ok(data_proc(ctx, pc, opcode, s, rn, rd, operand2).unwrap_or(next)),
            ArmOp::Multiply {
                accumulate,
                s,
                rd,
                rn,
                rs,
                rm,
            } => {
                let mut result = ctx.gpr(rm).wrapping_mul(ctx.gpr(rs));
                if accumulate {
                    result = result.wrapping_add(ctx.gpr(rn));
                }
                ctx.set_gpr(rd, result);
                if s {
                    let flags = ctx.flags().with_nz(result);
                    ctx.set_flags(flags);
                }
                Ok(next)
            }
            ArmOp::Mrs { spsr, rd } => {
                let value = if spsr {
                    ctx.spsr().unwrap_or_else(|| ctx.cpsr())
                } else {
                    ctx.cpsr()
                };
                ctx.set_gpr(rd, value);
                Ok(next)
            }
            ArmOp::Msr { spsr, mask, source } => {
                let value = match source {
                    MsrSource::Imm(value) => value,
                    MsrSource::Reg(rm) => ctx.gpr(rm),
                };
                if spsr {
                    ctx.set_spsr(value, mask);
                } else {
                    let mask = if ctx.mode().is_privileged() {
                        mask
                    } else {
                        mask & CPSR_FLAGS_MASK
                    };
                    if let Err(err) = ctx.write_cpsr(value, mask) {
                        // The previous value has a valid mode field.
                        let _ = ctx.write_cpsr(err.old, u32::MAX);
                    }
                }
                Ok(next)
            }
            ArmOp::Branch { link, offset } => {
                if link {
                    ctx.set_gpr(LR, pc.wrapping_add(INSN_BYTES));
                }
                Ok(Completion::DoneCti {
                    npc: pc.wrapping_add(8).wrapping_add(offset),
                })
            }
            ArmOp::Bx { rm } => {
                let target = read_reg(ctx, rm, pc.wrapping_add(8));
                let thumb = target & 1 != 0;
                ctx.set_tbit(thumb);
                let npc = if thumb { target & !1 } else { target & !3 };
                Ok(Completion::DoneCti { npc })
            }
            ArmOp::Transfer {
                load,
                byte,
                pre,
                up,
                writeback,
                rn,
                rd,
                offset,
            } => {
                let base = read_reg(ctx, rn, pc.wrapping_add(8));
                let amount = match offset {
                    TransferOffset::Imm(imm) => imm,
                    TransferOffset::Reg {
                        rm,
                        shift_type,
                        amount,
                    } => compute_operand2_immshift(
                        read_reg(ctx, rm, pc.wrapping_add(8)),
                        shift_type,
                        amount,
                        ctx.flags().c,
                    ),
                };
                let offset_addr = if up {
                    base.wrapping_add(amount)
                } else {
                    base.wrapping_sub(amount)
                };
                let addr = if pre { offset_addr } else { base };
                let write_base = writeback && rn != PC;

                if load {
                    let value = if byte {
                        u32::from(ctx.load_byte(pc, addr)?)
                    } else {
                        ctx.load_word(pc, addr)?
                    };
                    if write_base {
                        ctx.set_gpr(rn, offset_addr);
                    }
                    if rd == PC {
                        return Ok(Completion::DoneCti { npc: value & !3 });
                    }
                    ctx.set_gpr(rd, value);
                } else {
                    // A stored PC reads one word further ahead.
                    let value = read_reg(ctx, rd, pc.wrapping_add(12));
                    if byte {
                        ctx.store_byte(pc, addr, value.to_le_bytes()[0])?;
                    } else {
                        ctx.store_word(pc, addr, value)?;
                    }
                    if write_base {
                        ctx.set_gpr(rn, offset_addr);
                    }
                }
                Ok(next)
            }
            ArmOp::Swi { comment } => {
                ctx.swi(pc, comment);
                Ok(Completion::DoneCti {
                    npc: pc.wrapping_add(INSN_BYTES),
                })
            }
            ArmOp::Undefined => {
                ctx.invalid_insn(pc);
                Ok(Completion::DoneCti {
                    npc: pc.wrapping_add(INSN_BYTES),
                })
            }
        }
    }
}

// Returns the completion for writes to the PC, `None` otherwise.
fn data_proc<C: ExecContext + ?Sized>(
    ctx: &mut C,
    pc: u32,
    opcode: u32,
    s: bool,
    rn: usize,
    rd: usize,
    operand2: Operand2,
) -> Option<Completion> {
    let flags = ctx.flags();
    let cbit = flags.c;
    let (op2, shifter_carry, pc_value) = match operand2 {
        Operand2::Imm { imm8, rotate } => {
            let (value, carry) = rotated_immediate(imm8, rotate, cbit);
            (value, carry, pc.wrapping_add(8))
        }
        Operand2::ImmShift {
            rm,
            shift_type,
            amount,
        } => {
            let value = read_reg(ctx, rm, pc.wrapping_add(8));
            (
                compute_operand2_immshift(value, shift_type, amount, cbit),
                compute_carry_out_immshift(value, shift_type, amount, cbit),
                pc.wrapping_add(8),
            )
        }
        Operand2::RegShift { rm, shift_type, rs } => {
            // The extra cycle to read `rs` pushes PC reads one word further.
            let pc_value = pc.wrapping_add(12);
            let value = read_reg(ctx, rm, pc_value);
            let amount = read_reg(ctx, rs, pc_value);
            (
                compute_operand2_regshift(value, shift_type, amount, cbit),
                compute_carry_out_regshift(value, shift_type, amount, cbit),
                pc_value,
            )
        }
    };
    let a = read_reg(ctx, rn, pc_value);

    let (result, new_flags) = match opcode {
        0x0 | 0x8 => logical(flags, a & op2, shifter_carry),
        0x1 | 0x9 => logical(flags, a ^ op2, shifter_carry),
        0x2 | 0xA => arith(sub_with_carry(a, op2, true)),
        0x3 => arith(sub_with_carry(op2, a, true)),
        0x4 | 0xB => arith(add_with_carry(a, op2, false)),
        0x5 => arith(add_with_carry(a, op2, cbit)),
        0x6 => arith(sub_with_carry(a, op2, cbit)),
        0x7 => arith(sub_with_carry(op2, a, cbit)),
        0xC => logical(flags, a | op2, shifter_carry),
        0xD => logical(flags, op2, shifter_carry),
        0xE => logical(flags, a & !op2, shifter_carry),
        _ => logical(flags, !op2, shifter_carry),
    };

    if is_test_opcode(opcode) {
        ctx.set_flags(new_flags);
        return None;
    }
    if rd == PC {
        if s {
            if let Some(spsr) = ctx.spsr() {
                if let Err(err) = ctx.write_cpsr(spsr, u32::MAX) {
                    let _ = ctx.write_cpsr(err.old, u32::MAX);
                }
            }
        }
        let thumb = ctx.cpsr() & CPSR_T != 0;
        let npc = if thumb { result & !1 } else { result & !3 };
        return Some(Completion::DoneCti { npc });
    }
    ctx.set_gpr(rd, result);
    if s {
        ctx.set_flags(new_flags);
    }
    None
}

const fn logical(flags: Flags, result: u32, carry: bool) -> (u32, Flags) {
    (result, logical_flags(flags, result, carry))
}

const fn arith((result, carry, overflow): (u32, bool, bool)) -> (u32, Flags) {
    (result, arith_flags(result, carry, overflow))
}
