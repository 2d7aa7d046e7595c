//! Condition predicates, shifter special cases and misaligned loads, observed
//! through executed instructions.

use arm7t_core::state::LR;
use arm7t_core::{
    CoreConfig, Cpu, Eit, Endianness, FlatMemory, Flags, ProcessorMode,
};
use proptest::prelude::*;
use rstest::rstest;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(feature = "log")]
use tracing as _;

const CODE: u32 = 0x100;

fn cpu_running(endianness: Endianness, insn: u32) -> Cpu<FlatMemory> {
    let mut memory = FlatMemory::new(0, 0x1_0000, endianness);
    memory.load_u32(CODE, insn).expect("mapped");
    let mut cpu = Cpu::new(memory, CoreConfig::default());
    cpu.state_mut().set_pc(CODE);
    cpu
}

// Expected truth table, written out independently of the evaluator.
fn holds(cond: u32, nzcv: u8) -> bool {
    let n = nzcv & 8 != 0;
    let z = nzcv & 4 != 0;
    let c = nzcv & 2 != 0;
    let v = nzcv & 1 != 0;
    match cond {
        0x0 => z,
        0x1 => !z,
        0x2 => c,
        0x3 => !c,
        0x4 => n,
        0x5 => !n,
        0x6 => v,
        0x7 => !v,
        0x8 => c && !z,
        0x9 => !c || z,
        0xA => n == v,
        0xB => n != v,
        0xC => !z && n == v,
        0xD => z || n != v,
        _ => true,
    }
}

#[test]
fn every_predicate_gates_execution_for_every_flag_combination() {
    for cond in 0..15 {
        for nzcv in 0_u8..16 {
            // mov<cond> r0, #1
            let mut cpu = cpu_running(Endianness::Little, (cond << 28) | 0x03A0_0001);
            cpu.state_mut().set_flags(Flags::from_nzcv(nzcv));

            let outcome = cpu.step();

            assert_eq!(outcome.retired, 1);
            assert_eq!(outcome.delivered, None);
            assert_eq!(
                cpu.state().reg(0) == 1,
                holds(cond, nzcv),
                "cond {cond:#x} flags {nzcv:#06b}"
            );
        }
    }
}

#[test]
fn unrecognised_selector_is_reported_once_and_does_not_execute() {
    // mov r0, #1 with condition field 0xF
    let mut cpu = cpu_running(Endianness::Little, 0xF3A0_0001);

    let outcome = cpu.step();

    assert_eq!(cpu.state().reg(0), 0);
    assert_eq!(outcome.delivered, Some(Eit::UndefinedInsn));
    assert_eq!(cpu.stats().invalid_insns, 1);
    assert_eq!(cpu.state().mode(), ProcessorMode::Undefined);
    assert_eq!(cpu.state().reg(LR), CODE + 4);
}

// movs r0, r1, <shift> #<amount>
const fn movs_imm_shift(shift_type: u32, amount: u32) -> u32 {
    0xE1B0_0001 | (amount << 7) | (shift_type << 5)
}

// movs r0, r1, <shift> r2
const fn movs_reg_shift(shift_type: u32) -> u32 {
    0xE1B0_0211 | (shift_type << 5)
}

#[rstest]
#[case::lsl_zero_keeps_value_and_carry(movs_imm_shift(0, 0), 0x8000_0001, true, 0x8000_0001, true)]
#[case::lsr_zero_means_32(movs_imm_shift(1, 0), 0x8000_0000, false, 0, true)]
#[case::asr_zero_means_32(movs_imm_shift(2, 0), 0x8000_0000, false, 0xFFFF_FFFF, true)]
#[case::ror_zero_is_rrx(movs_imm_shift(3, 0), 0x0000_0003, true, 0x8000_0001, true)]
#[case::lsl_one(movs_imm_shift(0, 1), 0x8000_0001, false, 0x0000_0002, true)]
#[case::lsr_four(movs_imm_shift(1, 4), 0x0000_00F8, false, 0x0000_000F, true)]
fn immediate_shifts(
    #[case] insn: u32,
    #[case] rm: u32,
    #[case] carry_in: bool,
    #[case] expected: u32,
    #[case] carry_out: bool,
) {
    let mut cpu = cpu_running(Endianness::Little, insn);
    cpu.state_mut().set_reg(1, rm);
    cpu.state_mut().set_flags(Flags {
        c: carry_in,
        ..Flags::default()
    });

    cpu.step();

    assert_eq!(cpu.state().reg(0), expected);
    assert_eq!(cpu.state().flags().c, carry_out);
}

#[rstest]
#[case::zero_amount_keeps_value_and_carry(0, 0, 0x8000_0001, true, 0x8000_0001, true)]
#[case::lsl_32(0, 32, 0x0000_0001, false, 0, true)]
#[case::lsl_past_32(0, 33, 0xFFFF_FFFF, true, 0, false)]
#[case::lsr_32(1, 32, 0x8000_0000, false, 0, true)]
#[case::lsr_past_32(1, 40, 0xFFFF_FFFF, true, 0, false)]
#[case::asr_past_32(2, 200, 0x8000_0000, false, 0xFFFF_FFFF, true)]
#[case::ror_32(3, 32, 0x8000_0001, false, 0x8000_0001, true)]
#[case::ror_36(3, 36, 0x0000_00F1, false, 0x1000_000F, false)]
#[case::only_bottom_byte_counts(0, 0x100, 0x1234, true, 0x1234, true)]
fn register_shifts(
    #[case] shift_type: u32,
    #[case] amount: u32,
    #[case] rm: u32,
    #[case] carry_in: bool,
    #[case] expected: u32,
    #[case] carry_out: bool,
) {
    let mut cpu = cpu_running(Endianness::Little, movs_reg_shift(shift_type));
    cpu.state_mut().set_reg(1, rm);
    cpu.state_mut().set_reg(2, amount);
    cpu.state_mut().set_flags(Flags {
        c: carry_in,
        ..Flags::default()
    });

    cpu.step();

    assert_eq!(cpu.state().reg(0), expected);
    assert_eq!(cpu.state().flags().c, carry_out);
}

fn any_endianness() -> impl Strategy<Value = Endianness> {
    prop_oneof![Just(Endianness::Little), Just(Endianness::Big)]
}

proptest! {
    #[test]
    fn misaligned_ldr_rotates_the_aligned_word(
        word in any::<u32>(),
        addr in (0x2000_u32..0x3000).prop_map(|addr| addr & !3),
        offset in 0_u32..4,
        endianness in any_endianness(),
    ) {
        // ldr r0, [r1]
        let mut cpu = cpu_running(endianness, 0xE591_0000);
        cpu.bus_mut().load_u32(addr, word).expect("mapped");
        cpu.state_mut().set_reg(1, addr + offset);

        cpu.step();

        prop_assert_eq!(cpu.state().reg(0), word.rotate_right(8 * offset));
    }

    #[test]
    fn thumb_word_loads_rotate_like_arm(
        word in any::<u32>(),
        offset in 0_u32..4,
    ) {
        let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
        // ldr r0, [r1, #0]
        memory.load_u16(CODE, 0x6808).expect("mapped");
        memory.load_u32(0x2000, word).expect("mapped");
        let mut cpu: Cpu<FlatMemory> = Cpu::new(memory, CoreConfig::default());
        cpu.state_mut().set_pc(CODE);
        cpu.state_mut().set_tbit(true);
        cpu.state_mut().set_reg(1, 0x2000 + offset);

        cpu.step();

        prop_assert_eq!(cpu.state().reg(0), word.rotate_right(8 * offset));
    }
}
