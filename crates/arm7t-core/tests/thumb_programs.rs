//! Thumb programs run end to end on both engines.

use arm7t_core::state::{LR, SP};
use arm7t_core::{
    CoreConfig, Cpu, Eit, EngineType, Endianness, FlatMemory, IsaMode, ProcessorMode,
};
use proptest as _;
use rstest::rstest;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(feature = "log")]
use tracing as _;

const SPIN: u16 = 0xE7FE; // b .

fn thumb_cpu(engine: EngineType, start: u32, code: &[(u32, u16)]) -> Cpu<FlatMemory> {
    let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
    for &(addr, half) in code {
        memory.load_u16(addr, half).expect("mapped");
    }
    let config = CoreConfig {
        thumb_engine: engine,
        ..CoreConfig::default()
    };
    let mut cpu = Cpu::new(memory, config);
    cpu.state_mut().set_pc(start);
    cpu.state_mut().set_tbit(true);
    cpu
}

#[rstest]
fn bl_calls_and_bx_lr_returns(
    #[values(EngineType::Interpreter, EngineType::CachedBlock)] engine: EngineType,
) {
    let mut cpu = thumb_cpu(
        engine,
        0x100,
        &[
            (0x100, 0xF000), // bl 0x200 (prefix)
            (0x102, 0xF87E), // bl 0x200 (suffix)
            (0x104, SPIN),
            (0x200, 0x202A), // mov r0, #42
            (0x202, 0x4770), // bx lr
        ],
    );

    assert_eq!(cpu.run(2), 2);
    assert_eq!(cpu.state().pc(), 0x200);
    assert_eq!(cpu.state().reg(LR), 0x105);

    cpu.run(2);

    assert_eq!(cpu.state().reg(0), 42);
    assert_eq!(cpu.state().pc(), 0x104);
    assert_eq!(cpu.state().isa_mode(), IsaMode::Thumb);
}

#[test]
fn bl_reaches_backwards() {
    let mut cpu = thumb_cpu(
        EngineType::Interpreter,
        0x1000,
        &[
            (0x1000, 0xF7FF), // bl 0x100 (prefix, offset -4096)
            (0x1002, 0xF87E), // bl 0x100 (suffix)
            (0x100, SPIN),
        ],
    );

    cpu.step();
    assert_eq!(cpu.state().reg(LR), 0x4);
    cpu.step();

    assert_eq!(cpu.state().pc(), 0x100);
    assert_eq!(cpu.state().reg(LR), 0x1005);
}

#[test]
fn pc_relative_load_uses_the_word_aligned_pc() {
    let mut cpu = thumb_cpu(
        EngineType::Interpreter,
        0x102,
        &[
            (0x102, 0x4801), // ldr r0, [pc, #4]
            (0x104, 0xA501), // add r5, pc, #4
            (0x108, 0x5678),
            (0x10A, 0x1234),
        ],
    );

    cpu.run(2);

    assert_eq!(cpu.state().reg(0), 0x1234_5678);
    assert_eq!(cpu.state().reg(5), 0x10C);
}

#[test]
fn high_registers_move_and_pc_reads_four_ahead() {
    let mut cpu = thumb_cpu(
        EngineType::Interpreter,
        0x100,
        &[
            (0x100, 0x4680), // mov r8, r0
            (0x102, 0x4641), // mov r1, r8
            (0x104, 0x4678), // mov r0, pc
            (0x106, 0x4697), // mov pc, r2
            (0x300, SPIN),
        ],
    );
    cpu.state_mut().set_reg(0, 0xCAFE);
    cpu.state_mut().set_reg(2, 0x301);

    cpu.run(4);

    assert_eq!(cpu.state().reg(8), 0xCAFE);
    assert_eq!(cpu.state().reg(1), 0xCAFE);
    assert_eq!(cpu.state().reg(0), 0x108);
    assert_eq!(cpu.state().pc(), 0x300);
    assert_eq!(cpu.state().isa_mode(), IsaMode::Thumb);
}

#[rstest]
#[case::mul(0x4348, 7, 6, 42, false, false)]
#[case::neg(0x4248, 0, 1, 0xFFFF_FFFF, true, false)]
#[case::bic(0x4388, 0xFF, 0x0F, 0xF0, false, false)]
#[case::eor_to_zero(0x4048, 0x55, 0x55, 0, false, true)]
#[case::lsl_by_register(0x4088, 1, 31, 0x8000_0000, true, false)]
fn register_alu_operations(
    #[case] insn: u16,
    #[case] r0: u32,
    #[case] r1: u32,
    #[case] expected: u32,
    #[case] negative: bool,
    #[case] zero: bool,
) {
    let mut cpu = thumb_cpu(EngineType::Interpreter, 0x100, &[(0x100, insn)]);
    cpu.state_mut().set_reg(0, r0);
    cpu.state_mut().set_reg(1, r1);

    cpu.step();

    assert_eq!(cpu.state().reg(0), expected);
    assert_eq!(cpu.state().flags().n, negative);
    assert_eq!(cpu.state().flags().z, zero);
}

#[rstest]
fn counted_loop_with_conditional_branch(
    #[values(EngineType::Interpreter, EngineType::CachedBlock)] engine: EngineType,
) {
    let mut cpu = thumb_cpu(
        engine,
        0x100,
        &[
            (0x100, 0x2000), // mov r0, #0
            (0x102, 0x3001), // add r0, #1
            (0x104, 0x2805), // cmp r0, #5
            (0x106, 0xD1FC), // bne 0x102
            (0x108, SPIN),
        ],
    );

    assert_eq!(cpu.run(16), 16);

    assert_eq!(cpu.state().reg(0), 5);
    assert_eq!(cpu.state().pc(), 0x108);
    assert!(cpu.state().flags().z);
    assert!(cpu.state().flags().c);
}

#[test]
fn halfword_and_stack_relative_transfers() {
    let mut cpu = thumb_cpu(
        EngineType::Interpreter,
        0x100,
        &[
            (0x100, 0x8041), // strh r1, [r0, #2]
            (0x102, 0x8842), // ldrh r2, [r0, #2]
            (0x104, 0xB082), // sub sp, #8
            (0x106, 0x9102), // str r1, [sp, #8]
            (0x108, 0x9B02), // ldr r3, [sp, #8]
            (0x10A, 0xAC01), // add r4, sp, #4
            (0x10C, 0x7101), // strb r1, [r0, #4]
            (0x10E, 0x7905), // ldrb r5, [r0, #4]
        ],
    );
    cpu.state_mut().set_reg(0, 0x2000);
    cpu.state_mut().set_reg(1, 0x1234_5678);
    cpu.state_mut().set_reg(SP, 0x3000);

    cpu.run(8);

    assert_eq!(cpu.state().reg(2), 0x5678);
    assert_eq!(cpu.state().reg(SP), 0x2FF8);
    assert_eq!(cpu.state().reg(3), 0x1234_5678);
    assert_eq!(cpu.state().reg(4), 0x2FFC);
    assert_eq!(cpu.state().reg(5), 0x78);
    assert_eq!(&cpu.bus().bytes()[0x2002..0x2005], &[0x78, 0x56, 0x78]);
}

#[test]
fn bx_to_an_even_address_returns_to_arm() {
    let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
    memory.load_u16(0x100, 0x4700).expect("mapped"); // bx r0
    memory.load_u32(0x200, 0xE3A0_1001).expect("mapped"); // mov r1, #1
    let mut cpu: Cpu<FlatMemory> = Cpu::new(memory, CoreConfig::default());
    cpu.state_mut().set_pc(0x100);
    cpu.state_mut().set_tbit(true);
    cpu.state_mut().set_reg(0, 0x202);

    cpu.run(2);

    assert_eq!(cpu.state().isa_mode(), IsaMode::Arm);
    assert_eq!(cpu.state().reg(1), 1);
    assert_eq!(cpu.state().pc(), 0x204);
}

#[rstest]
#[case::reserved_conditional_branch(0xDE00)]
#[case::register_offset_load(0x5808)]
#[case::push(0xB500)]
#[case::load_multiple(0xC801)]
fn instructions_outside_the_subset_are_undefined(#[case] insn: u16) {
    let mut cpu = thumb_cpu(EngineType::Interpreter, 0x100, &[(0x100, insn)]);

    let outcome = cpu.step();

    assert_eq!(outcome.delivered, Some(Eit::UndefinedInsn));
    assert_eq!(cpu.state().mode(), ProcessorMode::Undefined);
    assert_eq!(cpu.state().isa_mode(), IsaMode::Arm);
    assert_eq!(cpu.state().reg(LR), 0x102);
    assert_eq!(cpu.stats().invalid_insns, 1);
}
