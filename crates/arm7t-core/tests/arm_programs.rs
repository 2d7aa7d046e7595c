//! ARM instruction behaviour observed through the dispatcher.

use arm7t_core::state::LR;
use arm7t_core::{CoreConfig, Cpu, Eit, EngineType, Endianness, FlatMemory, ProcessorMode};
use proptest as _;
use rstest::rstest;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(feature = "log")]
use tracing as _;

const CODE: u32 = 0x100;
const DATA: u32 = 0x2000;

fn arm_cpu(engine: EngineType, program: &[u32]) -> Cpu<FlatMemory> {
    let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
    for (index, word) in (0_u32..).zip(program) {
        memory.load_u32(CODE + index * 4, *word).expect("mapped");
    }
    let config = CoreConfig {
        arm_engine: engine,
        ..CoreConfig::default()
    };
    let mut cpu = Cpu::new(memory, config);
    cpu.state_mut().set_pc(CODE);
    cpu
}

fn word_at(cpu: &Cpu<FlatMemory>, addr: u32) -> u32 {
    let at = addr as usize;
    let bytes = &cpu.bus().bytes()[at..at + 4];
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[test]
fn stored_pc_reads_twelve_ahead() {
    // str pc, [r1]
    let mut cpu = arm_cpu(EngineType::Interpreter, &[0xE581_F000]);
    cpu.state_mut().set_reg(1, DATA);

    cpu.step();

    assert_eq!(word_at(&cpu, DATA), CODE + 12);
}

#[test]
fn register_shifted_operand_reads_pc_twelve_ahead() {
    let mut cpu = arm_cpu(
        EngineType::Interpreter,
        &[
            0xE28F_0000, // add r0, pc, #0
            0xE08F_1312, // add r1, pc, r2, lsl r3
        ],
    );

    cpu.run(2);

    assert_eq!(cpu.state().reg(0), CODE + 8);
    assert_eq!(cpu.state().reg(1), CODE + 4 + 12);
}

#[rstest]
fn run_stops_exactly_at_the_instruction_limit(
    #[values(EngineType::Interpreter, EngineType::CachedBlock)] engine: EngineType,
) {
    // add r0, r0, #1
    let mut cpu = arm_cpu(engine, &[0xE280_0001; 16]);
    cpu.set_step_insn_count(10);

    assert_eq!(cpu.run(3), 3);
    assert_eq!(cpu.state().reg(0), 3);
    assert_eq!(cpu.state().pc(), CODE + 12);

    assert_eq!(cpu.run(12), 12);
    assert_eq!(cpu.state().reg(0), 15);
}

#[rstest]
fn byte_transfers_zero_extend(
    #[values(EngineType::Interpreter, EngineType::CachedBlock)] engine: EngineType,
) {
    let mut cpu = arm_cpu(
        engine,
        &[
            0xE5C1_0001, // strb r0, [r1, #1]
            0xE5D1_2001, // ldrb r2, [r1, #1]
            0xE591_3000, // ldr r3, [r1]
        ],
    );
    cpu.state_mut().set_reg(0, 0xFFFF_FF9A);
    cpu.state_mut().set_reg(1, DATA);

    cpu.run(3);

    assert_eq!(cpu.state().reg(2), 0x9A);
    assert_eq!(cpu.state().reg(3), 0x0000_9A00);
}

#[test]
fn indexing_modes_update_the_base() {
    let mut cpu = arm_cpu(
        EngineType::Interpreter,
        &[
            0xE491_0004, // ldr r0, [r1], #4
            0xE5B1_2004, // ldr r2, [r1, #4]!
            0xE501_2004, // str r2, [r1, #-4]
            0xE791_3104, // ldr r3, [r1, r4, lsl #2]
        ],
    );
    for (index, value) in (0_u32..).zip([11, 22, 33, 44]) {
        cpu.bus_mut().load_u32(DATA + index * 4, value).expect("mapped");
    }
    cpu.state_mut().set_reg(1, DATA);
    cpu.state_mut().set_reg(4, 0x3FF_FFFE); // lsl #2 wraps to -8

    cpu.run(4);

    assert_eq!(cpu.state().reg(0), 11);
    assert_eq!(cpu.state().reg(2), 33);
    assert_eq!(cpu.state().reg(1), DATA + 8);
    assert_eq!(word_at(&cpu, DATA + 4), 33);
    assert_eq!(cpu.state().reg(3), 11);
}

#[test]
fn misaligned_store_writes_the_containing_word() {
    // str r0, [r1]
    let mut cpu = arm_cpu(EngineType::Interpreter, &[0xE581_0000]);
    cpu.state_mut().set_reg(0, 0xA1B2_C3D4);
    cpu.state_mut().set_reg(1, DATA + 3);

    cpu.step();

    assert_eq!(word_at(&cpu, DATA), 0xA1B2_C3D4);
}

#[test]
fn multiply_and_accumulate() {
    let mut cpu = arm_cpu(
        EngineType::Interpreter,
        &[
            0xE000_0291, // mul r0, r1, r2
            0xE023_4291, // mla r3, r1, r2, r4
            0xE015_0591, // muls r5, r1, r5
        ],
    );
    cpu.state_mut().set_reg(1, 6);
    cpu.state_mut().set_reg(2, 7);
    cpu.state_mut().set_reg(4, 100);

    cpu.run(3);

    assert_eq!(cpu.state().reg(0), 42);
    assert_eq!(cpu.state().reg(3), 142);
    assert_eq!(cpu.state().reg(5), 0);
    assert!(cpu.state().flags().z);
}

#[test]
fn branch_with_link_and_load_to_pc() {
    let mut program = vec![0; 0x41];
    program[0] = 0xEB00_003E; // bl 0x200
    program[1] = 0xEAFF_FFFE; // b .
    program[0x40] = 0xE59E_F000; // ldr pc, [lr]
    let mut cpu = arm_cpu(EngineType::CachedBlock, &program);

    cpu.step();
    assert_eq!(cpu.state().pc(), 0x200);
    assert_eq!(cpu.state().reg(LR), CODE + 4);

    // The word at LR is `b .`; its low bits are dropped.
    cpu.step();
    assert_eq!(cpu.state().pc(), 0xEAFF_FFFC);
}

#[test]
fn user_mode_msr_only_touches_the_flags() {
    let mut cpu = arm_cpu(
        EngineType::Interpreter,
        &[
            0xE129_F000, // msr cpsr_fc, r0
            0xE10F_1000, // mrs r1, cpsr
        ],
    );
    cpu.set_cpsr_attr("0x10").expect("user mode");
    cpu.state_mut().set_reg(0, 0xF000_00D1);

    cpu.run(2);

    assert_eq!(cpu.state().mode(), ProcessorMode::User);
    assert_eq!(cpu.state().reg(1), 0xF000_0010);
}

#[test]
fn privileged_msr_switches_mode_and_mrs_reads_spsr() {
    let mut cpu = arm_cpu(
        EngineType::Interpreter,
        &[
            0xE169_F000, // msr spsr_fc, r0
            0xE14F_2000, // mrs r2, spsr
            0xE129_F000, // msr cpsr_fc, r0
        ],
    );
    cpu.state_mut().set_reg(0, 0x6000_00D1);

    cpu.run(3);

    assert_eq!(cpu.state().reg(2), 0x6000_00D1);
    assert_eq!(cpu.state().mode(), ProcessorMode::Fiq);
    assert_eq!(
        cpu.state().registers().spsr_of(ProcessorMode::Supervisor),
        Some(0x6000_00D1)
    );
    assert_eq!(cpu.cpsr_attr(), "0x600000d1");
}

#[test]
fn msr_with_invalid_mode_bits_changes_nothing() {
    // msr cpsr_fc, r0
    let mut cpu = arm_cpu(EngineType::Interpreter, &[0xE129_F000]);
    cpu.state_mut().set_reg(0, 0xF000_0000);

    cpu.step();

    assert_eq!(cpu.cpsr_attr(), "0x000000d3");
}

#[rstest]
#[case::halfword_load(0xE1D1_00B0)]
#[case::swap(0xE101_0092)]
#[case::load_multiple(0xE890_0003)]
#[case::register_offset_with_bit_four(0xE791_0011)]
#[case::coprocessor(0xEE00_0000)]
fn instructions_outside_the_subset_are_undefined(#[case] insn: u32) {
    let mut cpu = arm_cpu(EngineType::Interpreter, &[insn]);

    let outcome = cpu.step();

    assert_eq!(outcome.delivered, Some(Eit::UndefinedInsn));
    assert_eq!(cpu.state().reg(LR), CODE + 4);
    assert_eq!(cpu.state().pc(), 0x04);
}
