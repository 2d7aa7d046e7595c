//! Prints a fingerprint of the retired-instruction trace for every engine
//! combination. All lines must match; CI compares them across hosts.

use std::sync::{Arc, Mutex};

use arm7t_core::{
    CoreConfig, Cpu, EngineType, Endianness, FlatMemory, IsaMode, TraceEvent, TraceSink,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "log")]
use tracing as _;

const STEPS: usize = 400;

const ARM_CODE: [(u32, u32); 10] = [
    (0x08, 0xE1B0_F00E),   // movs pc, lr
    (0x1000, 0xE3A0_0000), // mov r0, #0
    (0x1004, 0xE3A0_100A), // mov r1, #10
    (0x1008, 0xE3A0_2A03), // mov r2, #0x3000
    (0x100C, 0xE080_0001), // add r0, r0, r1
    (0x1010, 0xE251_1001), // subs r1, r1, #1
    (0x1014, 0x1AFF_FFFC), // bne 0x100c
    (0x1018, 0xE582_0000), // str r0, [r2]
    (0x101C, 0xE28F_3001), // add r3, pc, #1
    (0x1020, 0xE12F_FF13), // bx r3
];

const THUMB_CODE: [(u32, u16); 8] = [
    (0x1024, 0x2105), // mov r1, #5
    (0x1026, 0x1840), // add r0, r0, r1
    (0x1028, 0x6050), // str r0, [r2, #4]
    (0x102A, 0x3901), // sub r1, #1
    (0x102C, 0xD1FB), // bne 0x1026
    (0x102E, 0xDF01), // swi #1
    (0x1030, 0x3001), // add r0, #1
    (0x1032, 0xE7FD), // b 0x1030
];

#[derive(Clone)]
struct Fnv(Arc<Mutex<u64>>);

impl Fnv {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(0xcbf2_9ce4_8422_2325)))
    }

    fn feed(&self, bytes: &[u8]) {
        let Ok(mut hash) = self.0.lock() else {
            return;
        };
        for byte in bytes {
            *hash ^= u64::from(*byte);
            *hash = hash.wrapping_mul(0x1000_0000_01B3);
        }
    }

    fn value(&self) -> u64 {
        self.0.lock().map_or(0, |hash| *hash)
    }
}

impl TraceSink for Fnv {
    fn on_event(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::InstructionRetired { pc, mode } => {
                self.feed(&[0x01, u8::from(mode == IsaMode::Thumb)]);
                self.feed(&pc.to_le_bytes());
            }
            TraceEvent::ExceptionDelivered(entry) => {
                self.feed(&[0x02, entry.eit.priority()]);
                self.feed(&entry.vector.to_le_bytes());
            }
            // Block shapes differ between engines by construction.
            TraceEvent::BlockBuilt { .. }
            | TraceEvent::BlocksInvalidated { .. }
            | TraceEvent::EngineSwitched { .. } => {}
        }
    }
}

fn fingerprint(arm: EngineType, thumb: EngineType) -> String {
    let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
    for (addr, word) in ARM_CODE {
        memory.load_u32(addr, word).expect("program fits");
    }
    for (addr, half) in THUMB_CODE {
        memory.load_u16(addr, half).expect("program fits");
    }
    let config = CoreConfig {
        arm_engine: arm,
        thumb_engine: thumb,
        step_insn_count: 7,
        tracing_enabled: true,
        ..CoreConfig::default()
    };
    let mut cpu: Cpu<FlatMemory> = Cpu::new(memory, config);
    let hash = Fnv::new();
    cpu.set_trace_sink(Some(Box::new(hash.clone())));
    cpu.state_mut().set_pc(0x1000);

    for _ in 0..STEPS {
        cpu.step();
    }
    for reg in 0..16 {
        hash.feed(&cpu.state().reg(reg).to_le_bytes());
    }
    hash.feed(&cpu.state().cpsr().raw().to_le_bytes());
    hash.feed(&cpu.bus().bytes()[0x3000..0x3008]);

    format!("{:016x}", hash.value())
}

fn main() {
    for arm in [EngineType::Interpreter, EngineType::CachedBlock] {
        for thumb in [EngineType::Interpreter, EngineType::CachedBlock] {
            println!("{:>11} {:>11} {}", arm.name(), thumb.name(), fingerprint(arm, thumb));
        }
    }
}
