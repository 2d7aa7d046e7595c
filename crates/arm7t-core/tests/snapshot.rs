//! Snapshot capture and restore.

use arm7t_core::{
    CoreConfig, Cpu, CpuSnapshot, Eit, EngineType, Endianness, FlatMemory, IsaMode,
    SnapshotVersion,
};
use proptest as _;
use rstest as _;
#[cfg(not(feature = "serde"))]
use serde_json as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(feature = "log")]
use tracing as _;

// Counts r0 upwards forever, storing each value to 0x800.
const COUNTER: [u32; 4] = [
    0xE3A0_1B02, // mov r1, #0x800
    0xE280_0001, // add r0, r0, #1
    0xE581_0000, // str r0, [r1]
    0xEAFF_FFFC, // b 4
];

fn counter_cpu(engine: EngineType) -> Cpu<FlatMemory> {
    let mut memory = FlatMemory::new(0, 0x1000, Endianness::Little);
    for (index, word) in (0_u32..).zip(COUNTER) {
        memory.load_u32(index * 4, word).expect("mapped");
    }
    let config = CoreConfig {
        arm_engine: engine,
        step_insn_count: 7,
        ..CoreConfig::default()
    };
    Cpu::new(memory, config)
}

#[test]
fn snapshot_captures_state_controller_and_config() {
    let mut cpu = counter_cpu(EngineType::CachedBlock);
    cpu.step();
    cpu.drive_nfiq(false);
    cpu.queue_eit(Eit::SwiInsn);

    let snapshot = cpu.snapshot();

    assert_eq!(snapshot.version, SnapshotVersion::V1);
    assert_eq!(&snapshot.state, cpu.state());
    assert_eq!(&snapshot.controller, cpu.controller());
    assert_eq!(snapshot.config.arm_engine, EngineType::CachedBlock);
    assert!(!snapshot.controller.pins().nfiq);
    assert_eq!(snapshot.controller.pending(), Eit::SwiInsn);
}

#[test]
fn restored_core_continues_identically() {
    let mut original = counter_cpu(EngineType::CachedBlock);
    for _ in 0..5 {
        original.step();
    }
    let snapshot = original.snapshot();
    let memory = original.bus().clone();

    for _ in 0..10 {
        original.step();
    }

    let mut restored: Cpu<FlatMemory> = Cpu::new(memory, CoreConfig::default());
    restored.restore(snapshot);
    assert_eq!(restored.engine_type(IsaMode::Arm), EngineType::CachedBlock);
    assert_eq!(restored.cached_blocks(IsaMode::Arm), 0);
    for _ in 0..10 {
        restored.step();
    }

    assert_eq!(restored.state(), original.state());
    assert_eq!(restored.bus().bytes(), original.bus().bytes());
}

#[test]
fn restore_rewinds_in_place() {
    let mut cpu = counter_cpu(EngineType::Interpreter);
    cpu.step();
    let snapshot = cpu.snapshot();
    let r0 = cpu.state().reg(0);

    cpu.step();
    cpu.set_engine(IsaMode::Arm, EngineType::CachedBlock);
    cpu.restore(snapshot.clone());

    assert_eq!(cpu.state().reg(0), r0);
    assert_eq!(cpu.engine_type(IsaMode::Arm), EngineType::Interpreter);
    assert_eq!(cpu.snapshot(), snapshot);
}

#[test]
fn restore_counts_the_blocks_it_discards() {
    let mut cpu = counter_cpu(EngineType::CachedBlock);
    let snapshot = cpu.snapshot();
    cpu.step();
    cpu.step();
    let cached = cpu.cached_blocks(IsaMode::Arm);
    assert!(cached > 0);
    assert_eq!(cpu.stats().blocks_invalidated, 0);

    cpu.restore(snapshot);

    assert_eq!(cpu.cached_blocks(IsaMode::Arm), 0);
    assert_eq!(cpu.stats().blocks_invalidated, cached as u64);
}

#[test]
fn snapshot_version_is_checked_on_decode() {
    assert_eq!(SnapshotVersion::from_u16(1), Some(SnapshotVersion::V1));
    assert_eq!(SnapshotVersion::from_u16(0), None);
    assert_eq!(SnapshotVersion::from_u16(2), None);
}

#[cfg(feature = "serde")]
#[test]
fn snapshot_survives_json() {
    let mut cpu = counter_cpu(EngineType::CachedBlock);
    cpu.set_cpsr_attr("0x600000d3").expect("valid cpsr");
    cpu.step();
    cpu.drive_nirq(false);
    let snapshot = cpu.snapshot();

    let json = serde_json::to_string(&snapshot).expect("serializes");
    let decoded: CpuSnapshot = serde_json::from_str(&json).expect("deserializes");

    assert_eq!(decoded, snapshot);
}

#[cfg(not(feature = "serde"))]
#[test]
fn snapshot_clones_compare_equal() {
    let cpu = counter_cpu(EngineType::Interpreter);
    let snapshot: CpuSnapshot = cpu.snapshot();

    assert_eq!(snapshot.clone(), snapshot);
}
