//! Throughput harness comparing the interpreter and cached-block engines.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release -p arm7t-core --example engine_throughput
//! ```
//!
//! Each workload runs on several threads, one core per thread, for a fixed
//! wall-clock duration.

#![allow(clippy::cast_precision_loss)]

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use arm7t_core::{CoreConfig, Cpu, EngineType, Endianness, FlatMemory, IsaMode};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "log")]
use tracing as _;

const NUM_THREADS: usize = 4;
const STEP_INSN_COUNT: u32 = 256;
const RUN_FOR: Duration = Duration::from_millis(500);

struct Workload {
    name: &'static str,
    mode: IsaMode,
    code: &'static [u32],
}

static WORKLOADS: [Workload; 3] = [
    Workload {
        name: "arm_alu",
        mode: IsaMode::Arm,
        code: &[
            0xE280_0001, // add r0, r0, #1
            0xE021_1000, // eor r1, r1, r0
            0xE1A0_2161, // mov r2, r1, ror #2
            0xE052_3000, // subs r3, r2, r0
            0xEAFF_FFFA, // b 0
        ],
    },
    Workload {
        name: "arm_memory",
        mode: IsaMode::Arm,
        code: &[
            0xE3A0_1A08, // mov r1, #0x8000
            0xE481_0004, // str r0, [r1], #4
            0xE511_2004, // ldr r2, [r1, #-4]
            0xE280_0001, // add r0, r0, #1
            0xE351_0902, // cmp r1, #0x8000
            0xEAFF_FFF9, // b 0
        ],
    },
    Workload {
        name: "thumb_loop",
        mode: IsaMode::Thumb,
        code: &[
            0x1840_3001, // add r0, #1 ; add r0, r0, r1
            0x4048_2120, // mov r1, #32 ; eor r0, r1
            0x0000_E7FA, // b 0 ; (padding)
        ],
    },
];

struct Measurement {
    name: &'static str,
    engine: EngineType,
    insns_per_second: f64,
}

fn spawn_core(workload: &'static Workload, engine: EngineType) -> u64 {
    let mut memory = FlatMemory::new(0, 0x1_0000, Endianness::Little);
    for (index, word) in (0_u32..).zip(workload.code) {
        if memory.load_u32(index * 4, *word).is_err() {
            return 0;
        }
    }
    let mut config = CoreConfig {
        step_insn_count: STEP_INSN_COUNT,
        ..CoreConfig::default()
    };
    config.set_engine(workload.mode, engine);
    let mut cpu: Cpu<FlatMemory> = Cpu::new(memory, config);
    cpu.state_mut().set_tbit(workload.mode == IsaMode::Thumb);

    let mut retired = 0_u64;
    let start = Instant::now();
    while start.elapsed() < RUN_FOR {
        retired += u64::from(cpu.step().retired);
    }
    retired
}

fn measure(workload: &'static Workload, engine: EngineType) -> Measurement {
    let (tx, rx) = mpsc::channel();
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(spawn_core(workload, engine)).ok();
            })
        })
        .collect();
    for handle in handles {
        handle.join().ok();
    }
    drop(tx);

    let total: u64 = rx.iter().sum();
    Measurement {
        name: workload.name,
        engine,
        insns_per_second: total as f64 / RUN_FOR.as_secs_f64(),
    }
}

fn format_rate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2}M", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2}K", rate / 1_000.0)
    } else {
        format!("{rate:.2}")
    }
}

fn main() {
    println!("threads: {NUM_THREADS}, instructions per step: {STEP_INSN_COUNT}");
    println!("{:12} {:>12} {:>12}", "workload", "engine", "insn/s");
    for workload in &WORKLOADS {
        for engine in [EngineType::Interpreter, EngineType::CachedBlock] {
            let result = measure(workload, engine);
            println!(
                "{:12} {:>12} {:>12}",
                result.name,
                result.engine.name(),
                format_rate(result.insns_per_second)
            );
        }
    }
}
