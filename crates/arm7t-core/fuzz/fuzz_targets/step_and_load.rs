#![no_main]

use arm7t_core::isa::arm::decode_word;
use arm7t_core::isa::thumb::decode_halfword;
use arm7t_core::memory::load_word;
use arm7t_core::{CoreConfig, Cpu, EngineType, Endianness, FlatMemory};
use libfuzzer_sys::fuzz_target;

const CODE_BYTES: usize = 64;

// Layout: [flags, cpsr x4, code...]. Bit 0 of `flags` picks the engine,
// bit 1 the byte order.
fuzz_target!(|data: &[u8]| {
    if data.len() < 5 {
        return;
    }
    let flags = data[0];
    let cpsr = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    let code = &data[5..data.len().min(5 + CODE_BYTES)];

    for chunk in code.chunks_exact(4) {
        let _ = decode_word(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    for chunk in code.chunks_exact(2) {
        let _ = decode_halfword(u16::from_le_bytes([chunk[0], chunk[1]]));
    }

    let endianness = if flags & 2 == 0 {
        Endianness::Little
    } else {
        Endianness::Big
    };
    let mut memory = FlatMemory::new(0, 0x1000, endianness);
    if memory.load(0x100, code).is_err() {
        return;
    }
    for addr in 0x100..0x104 {
        let _ = load_word(&mut memory, 0x100, addr);
    }

    let engine = if flags & 1 == 0 {
        EngineType::Interpreter
    } else {
        EngineType::CachedBlock
    };
    let config = CoreConfig {
        arm_engine: engine,
        thumb_engine: engine,
        step_insn_count: 8,
        ..CoreConfig::default()
    };
    let mut cpu: Cpu<FlatMemory> = Cpu::new(memory, config);
    cpu.state_mut().set_pc(0x100);
    // Invalid mode bits are rejected and leave the reset state in place.
    let _ = cpu.set_cpsr_attr(&cpsr.to_string());
    for _ in 0..32 {
        cpu.step();
    }
});
