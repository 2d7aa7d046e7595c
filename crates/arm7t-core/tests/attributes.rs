//! Host-visible attributes: CPSR strings, debugger registers, engine names
//! and the pins derived from the state.

use arm7t_core::state::{LR, SP};
use arm7t_core::{
    AttributeError, CoreConfig, CpsrError, Cpu, EngineType, Endianness, FlatMemory, IsaMode,
    ProcessorMode, DBG_REG_CPSR, DBG_REG_F0, DBG_REG_FPS,
};
use proptest as _;
use rstest::rstest;
use serde_json as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(feature = "log")]
use tracing as _;

fn cpu() -> Cpu<FlatMemory> {
    Cpu::new(
        FlatMemory::new(0, 0x1000, Endianness::Little),
        CoreConfig::default(),
    )
}

#[rstest]
#[case("0x600000d0", 0x6000_00D0, ProcessorMode::User)]
#[case("0X1f", 0x1F, ProcessorMode::System)]
#[case(" 17 ", 0x11, ProcessorMode::Fiq)]
#[case("0xf00000b2", 0xF000_00B2, ProcessorMode::Irq)]
fn cpsr_attribute_accepts_hex_and_decimal(
    #[case] value: &str,
    #[case] raw: u32,
    #[case] mode: ProcessorMode,
) {
    let mut cpu = cpu();

    cpu.set_cpsr_attr(value).expect("valid cpsr");

    assert_eq!(cpu.state().cpsr().raw(), raw);
    assert_eq!(cpu.state().mode(), mode);
    assert_eq!(cpu.cpsr_attr(), format!("{raw:#010x}"));
}

#[test]
fn cpsr_with_bad_mode_bits_is_rolled_back() {
    let mut cpu = cpu();
    cpu.set_cpsr_attr("0x400000d3").expect("valid cpsr");

    // Flags and T change, mode 0b00000 is rejected.
    let err = cpu.set_cpsr_attr("0xf0000020").unwrap_err();

    assert_eq!(
        err,
        AttributeError::BadValue(CpsrError {
            old: 0x4000_00D3,
            attempted: 0xF000_0020,
        })
    );
    assert_eq!(cpu.cpsr_attr(), "0x400000d3");
    assert_eq!(cpu.state().mode(), ProcessorMode::Supervisor);
    assert_eq!(cpu.state().isa_mode(), IsaMode::Arm);
    assert!(!cpu.tbit_pin());
}

#[rstest]
#[case("")]
#[case("0x")]
#[case("zz")]
#[case("-1")]
#[case("4294967296")]
fn malformed_cpsr_strings_leave_state_alone(#[case] value: &str) {
    let mut cpu = cpu();

    let err = cpu.set_cpsr_attr(value).unwrap_err();

    assert_eq!(err, AttributeError::Parse(value.to_owned()));
    assert_eq!(cpu.cpsr_attr(), "0x000000d3");
}

#[rstest]
#[case("0x000000d3", "nzcv IFt svc")]
#[case("0xf0000010", "NZCV ift usr")]
#[case("0x40000031", "nZcv ifT fiq")]
#[case("0x2000005b", "nzCv iFt und")]
fn flags_attribute_renders_the_cpsr(#[case] cpsr: &str, #[case] expected: &str) {
    let mut cpu = cpu();
    cpu.set_cpsr_attr(cpsr).expect("valid cpsr");

    assert_eq!(cpu.cpsr_flags_attr(), expected);
}

#[test]
fn flags_attribute_is_read_only() {
    let mut cpu = cpu();

    assert_eq!(
        cpu.set_cpsr_flags_attr("NZCV IFT usr"),
        Err(AttributeError::ReadOnly)
    );
    assert_eq!(cpu.cpsr_flags_attr(), "nzcv IFt svc");
}

#[test]
fn debugger_registers_cover_general_fpa_and_cpsr() {
    let mut cpu = cpu();
    for reg in 0..15 {
        cpu.dbg_set_reg(reg, &format!("{}", reg * 3)).expect("general register");
    }
    cpu.dbg_set_reg(15, "0x400").expect("pc");

    for reg in 0..15 {
        assert_eq!(cpu.dbg_get_reg(reg), Ok(reg * 3));
    }
    assert_eq!(cpu.dbg_get_reg(15), Ok(0x400));
    assert_eq!(cpu.state().pc(), 0x400);
    assert_eq!(cpu.dbg_get_reg(DBG_REG_CPSR), Ok(0xD3));
}

#[test]
fn fpa_registers_read_zero_and_swallow_writes() {
    let mut cpu = cpu();

    for reg in DBG_REG_F0..=DBG_REG_FPS {
        cpu.dbg_set_reg(reg, "0x1234").expect("fpa register");
        assert_eq!(cpu.dbg_get_reg(reg), Ok(0));
    }
    assert_eq!(
        cpu.dbg_set_reg(DBG_REG_F0, "bogus"),
        Err(AttributeError::Parse("bogus".to_owned()))
    );
}

#[test]
fn cpsr_debug_register_behaves_like_the_attribute() {
    let mut cpu = cpu();

    cpu.dbg_set_reg(DBG_REG_CPSR, "0x10").expect("user mode");
    assert_eq!(cpu.state().mode(), ProcessorMode::User);

    let err = cpu.dbg_set_reg(DBG_REG_CPSR, "0x0").unwrap_err();
    assert!(matches!(err, AttributeError::BadValue(_)));
    assert_eq!(cpu.dbg_get_reg(DBG_REG_CPSR), Ok(0x10));
}

#[test]
fn unknown_debug_register_is_rejected() {
    let mut cpu = cpu();

    assert_eq!(cpu.dbg_get_reg(26), Err(AttributeError::UnknownRegister(26)));
    assert_eq!(
        cpu.dbg_set_reg(u32::MAX, "0"),
        Err(AttributeError::UnknownRegister(u32::MAX))
    );
}

#[test]
fn mode_switch_through_the_attribute_swaps_banks() {
    let mut cpu = cpu();
    cpu.state_mut().set_reg(SP, 0x5000);
    cpu.state_mut().set_reg(8, 0x88);

    cpu.set_cpsr_attr("0xd1").expect("fiq mode");
    assert_eq!(cpu.state().reg(8), 0);
    cpu.state_mut().set_reg(8, 0xF8);
    cpu.state_mut().set_reg(SP, 0x6000);
    cpu.state_mut().set_reg(LR, 0x6004);

    cpu.set_cpsr_attr("0xd3").expect("supervisor mode");
    assert_eq!(cpu.state().reg(SP), 0x5000);
    assert_eq!(cpu.state().reg(8), 0x88);

    let registers = cpu.state().registers();
    assert_eq!(registers.get_banked(ProcessorMode::Fiq, 8), 0xF8);
    assert_eq!(registers.get_banked(ProcessorMode::Fiq, SP), 0x6000);
    assert_eq!(registers.get_banked(ProcessorMode::Fiq, LR), 0x6004);
}

#[test]
fn user_and_system_share_a_bank() {
    let mut cpu = cpu();
    cpu.set_cpsr_attr("0x1f").expect("system mode");
    cpu.state_mut().set_reg(SP, 0x7000);

    cpu.set_cpsr_attr("0x10").expect("user mode");

    assert_eq!(cpu.state().reg(SP), 0x7000);
    assert_eq!(cpu.state().spsr(), None);
}

#[test]
fn pins_follow_the_cpsr() {
    let mut cpu = cpu();
    assert!(!cpu.tbit_pin());
    assert_eq!(cpu.nm_pin(), !0x13 & 0x1F);

    cpu.set_cpsr_attr("0x37").expect("abort, thumb");

    assert!(cpu.tbit_pin());
    assert_eq!(cpu.nm_pin(), !0x17 & 0x1F);
    assert_eq!(cpu.state().isa_mode(), IsaMode::Thumb);
}

#[rstest]
#[case(IsaMode::Arm, "interpreter", EngineType::Interpreter)]
#[case(IsaMode::Arm, "pbb", EngineType::CachedBlock)]
#[case(IsaMode::Thumb, "pbb", EngineType::CachedBlock)]
#[case(IsaMode::Thumb, "interpreter", EngineType::Interpreter)]
fn engine_attribute_round_trips(
    #[case] mode: IsaMode,
    #[case] name: &str,
    #[case] engine: EngineType,
) {
    let mut cpu = cpu();

    cpu.set_engine_type(mode, name).expect("known engine");

    assert_eq!(cpu.engine_type(mode), engine);
    assert_eq!(cpu.engine_type_attr(mode), name);
    assert_eq!(cpu.config().engine(mode), engine);
}
