//! Dual-mode CPU dispatcher.
//!
//! [`Cpu`] owns one core and two engine pairs, one per encoding. Each step
//! samples the interrupt pins, enters any pending handler, then hands the
//! instruction budget to the pair selected by the tbit until the budget runs
//! out or an EIT becomes pending.

use std::fmt::{self, Write as _};

use crate::api::{
    CoreConfig, CpuSnapshot, SnapshotVersion, StepOutcome, TraceEvent,
};
use crate::eit::{Eit, ExceptionController, InterruptSync, PinLevels};
use crate::engine::{EngineHost, EnginePair, EngineType, StopReason, WriteRange};
use crate::host::{BoxedTraceSink, Core};
use crate::isa::{ArmSubset, ThumbSubset};
use crate::log::debug;
use crate::memory::MemoryBus;
use crate::semantics::{ExecContext, InstructionSet};
use crate::state::{IsaMode, ProcessorState, PC};
use crate::stats::CpuStats;
use crate::{AttributeError, BusError, ConfigError};

/// Debug register number of the first FPA register.
pub const DBG_REG_F0: u32 = 16;
/// Debug register number of the FPA status register.
pub const DBG_REG_FPS: u32 = 24;
/// Debug register number of the `CPSR`.
pub const DBG_REG_CPSR: u32 = 25;

/// One core with an interpreter and a cached-block engine for each encoding.
///
/// `A` must decode [`IsaMode::Arm`] and `T` [`IsaMode::Thumb`]; the pair
/// matching the tbit is the only one ever run.
pub struct Cpu<M, A = ArmSubset, T = ThumbSubset>
where
    A: InstructionSet,
    T: InstructionSet,
{
    core: Core<M>,
    arm: EnginePair<A>,
    thumb: EnginePair<T>,
    config: CoreConfig,
}

impl<M, A, T> fmt::Debug for Cpu<M, A, T>
where
    M: fmt::Debug,
    A: InstructionSet + fmt::Debug,
    T: InstructionSet + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("core", &self.core)
            .field("arm", &self.arm)
            .field("thumb", &self.thumb)
            .field("config", &self.config)
            .finish()
    }
}

impl<M, A, T> Cpu<M, A, T>
where
    M: MemoryBus,
    A: InstructionSet + Default,
    T: InstructionSet + Default,
{
    /// Core in the reset state with `PC` at the vector base. No reset request
    /// is queued; call [`Self::reset`] for a full reset sequence.
    #[must_use]
    pub fn new(bus: M, config: CoreConfig) -> Self {
        Self::with_isa(bus, config, A::default(), T::default())
    }
}

impl<M, A, T> Cpu<M, A, T>
where
    M: MemoryBus,
    A: InstructionSet,
    T: InstructionSet,
{
    /// [`Self::new`] with explicit instruction set adapters.
    #[must_use]
    pub fn with_isa(bus: M, config: CoreConfig, arm: A, thumb: T) -> Self {
        let mut core = Core::new(bus, ExceptionController::new(config.interrupt_sync));
        core.tracing = config.tracing_enabled;
        core.max_block_insns = config.max_block_insns;
        core.vector_base = config.vector_base;
        core.state.set_pc(config.vector_base);
        Self {
            core,
            arm: EnginePair::new(arm, config.arm_engine),
            thumb: EnginePair::new(thumb, config.thumb_engine),
            config,
        }
    }

    /// Runs one step: samples the pins, enters a pending handler, then
    /// executes up to [`CoreConfig::step_insn_count`] instructions. Anything
    /// that became pending during the step is entered before returning.
    ///
    /// Target faults never surface here; they become exceptions.
    pub fn step(&mut self) -> StepOutcome {
        self.step_with_budget(self.config.step_insn_count)
    }

    /// Runs steps until `max_insns` instructions retired or two steps in a
    /// row retire nothing. The last step is cut short so the total never
    /// exceeds `max_insns`. Returns the number retired.
    pub fn run(&mut self, max_insns: u64) -> u64 {
        let mut total = 0;
        let mut idle_steps = 0;
        while total < max_insns && idle_steps < 2 {
            let left = u32::try_from(max_insns - total).unwrap_or(u32::MAX);
            let outcome = self.step_with_budget(self.config.step_insn_count.max(1).min(left));
            if outcome.retired == 0 {
                idle_steps += 1;
            } else {
                idle_steps = 0;
            }
            total += u64::from(outcome.retired);
        }
        total
    }

    fn step_with_budget(&mut self, budget: u32) -> StepOutcome {
        self.core.sample_interrupts();
        let mut delivered = self.core.deliver();

        let mut remaining = budget.max(1);
        let mut retired = 0;
        let mut stop = None;
        while remaining > 0 {
            let outcome = match self.core.state.isa_mode() {
                IsaMode::Arm => self.arm.run(&mut self.core, remaining),
                IsaMode::Thumb => self.thumb.run(&mut self.core, remaining),
            };
            self.invalidate_stores();
            retired += outcome.retired;
            remaining = remaining.saturating_sub(outcome.retired);
            stop = Some(outcome.stop);
            if matches!(outcome.stop, StopReason::Limit | StopReason::EitPending)
                || outcome.retired == 0
                || self.core.eit_pending()
            {
                break;
            }
        }

        if let Some(eit) = self.core.deliver() {
            delivered = Some(eit);
        }
        StepOutcome {
            retired,
            stop,
            delivered,
        }
    }

    /// Resets the core: architectural state returns to its reset value,
    /// pending requests are dropped, every cached block is discarded and a
    /// reset request is queued for the next step boundary. Pin levels and
    /// configuration survive.
    pub fn reset(&mut self) {
        debug!("reset requested");
        self.core.state = ProcessorState::default();
        self.core.state.set_pc(self.config.vector_base);
        self.core.eit.clear();
        self.core.clear_transients();
        self.flush_icache();
        self.core.eit.queue_eit(Eit::Reset);
    }

    /// Reports an undefined instruction at `pc`, as semantics would.
    pub fn invalid_insn(&mut self, pc: u32) {
        self.core.invalid_insn(pc);
    }

    /// Queues a request from the host. Returns `true` when it now occupies
    /// the pending slot.
    pub fn queue_eit(&mut self, eit: Eit) -> bool {
        self.core.eit.queue_eit(eit)
    }

    /// Selects the strategy for `mode` by name. The pair's cached blocks are
    /// discarded; the change takes effect at the next run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEngineType`] for an unrecognised name;
    /// nothing changes.
    pub fn set_engine_type(&mut self, mode: IsaMode, name: &str) -> Result<(), ConfigError> {
        let engine = name.parse()?;
        self.set_engine(mode, engine);
        Ok(())
    }

    /// Typed form of [`Self::set_engine_type`].
    pub fn set_engine(&mut self, mode: IsaMode, engine: EngineType) {
        let dropped = match mode {
            IsaMode::Arm => self.arm.set_active(engine),
            IsaMode::Thumb => self.thumb.set_active(engine),
        };
        self.count_dropped(dropped);
        self.config.set_engine(mode, engine);
        debug!(mode = %mode, engine = %engine, "engine selected");
        self.core.emit(TraceEvent::EngineSwitched { mode, engine });
    }

    /// Strategy selected for `mode`.
    #[must_use]
    pub const fn engine_type(&self, mode: IsaMode) -> EngineType {
        self.config.engine(mode)
    }

    /// Attribute string of the strategy selected for `mode`.
    #[must_use]
    pub const fn engine_type_attr(&self, mode: IsaMode) -> &'static str {
        self.config.engine(mode).name()
    }

    /// Selects interrupt synchronisation by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownInterruptSync`] for an unrecognised name;
    /// nothing changes.
    pub fn set_interrupt_sync_attr(&mut self, name: &str) -> Result<(), ConfigError> {
        let sync = name.parse()?;
        self.set_interrupt_sync(sync);
        Ok(())
    }

    /// Selects interrupt synchronisation.
    pub fn set_interrupt_sync(&mut self, sync: InterruptSync) {
        self.core.eit.set_interrupt_sync(sync);
        self.config.interrupt_sync = sync;
    }

    /// Active interrupt synchronisation.
    #[must_use]
    pub const fn interrupt_sync(&self) -> InterruptSync {
        self.core.eit.interrupt_sync()
    }

    /// Drives the nFIQ input (active low). Sampled at the next boundary.
    pub fn drive_nfiq(&mut self, level: bool) {
        self.core.eit.drive_nfiq(level);
    }

    /// Drives the nIRQ input (active low). Sampled at the next boundary.
    pub fn drive_nirq(&mut self, level: bool) {
        self.core.eit.drive_nirq(level);
    }

    /// Drives the ISYNC input: high selects synchronous sampling.
    pub fn drive_isync(&mut self, level: bool) {
        self.core.eit.drive_isync(level);
        self.config.interrupt_sync = self.core.eit.interrupt_sync();
    }

    /// Current interrupt pin levels.
    #[must_use]
    pub const fn pins(&self) -> PinLevels {
        self.core.eit.pins()
    }

    /// The tbit output pin.
    #[must_use]
    pub const fn tbit_pin(&self) -> bool {
        self.core.state.cpsr().tbit()
    }

    /// The nM output pins: the inverted mode field.
    #[must_use]
    pub const fn nm_pin(&self) -> u32 {
        !self.core.state.cpsr().mode_bits() & 0x1F
    }

    /// Discards every cached block of both pairs and counts them as
    /// invalidated. Returns how many were dropped.
    pub fn flush_icache(&mut self) -> usize {
        let count = self.arm.flush() + self.thumb.flush();
        self.count_dropped(count);
        count
    }

    /// Discards cached blocks overlapping `range`, for hosts that change code
    /// behind the core's back. Returns how many were dropped.
    pub fn invalidate_code(&mut self, range: WriteRange) -> usize {
        let count = self.arm.invalidate(range) + self.thumb.invalidate(range);
        self.count_dropped(count);
        count
    }

    /// Writes `data` through the bus at `addr` on behalf of the host and
    /// discards overlapping cached blocks.
    ///
    /// # Errors
    ///
    /// Returns the first [`BusError`]. Bytes before the failing one stay
    /// written and their blocks are still discarded.
    pub fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let pc = self.core.state.pc();
        let mut written = 0_u32;
        let mut result = Ok(());
        for &byte in data {
            if let Err(err) = self.core.bus.write_u8(pc, addr.wrapping_add(written), byte) {
                result = Err(err);
                break;
            }
            written += 1;
        }
        self.invalidate_code(WriteRange::new(addr, written));
        result
    }

    /// Memory bus.
    #[must_use]
    pub const fn bus(&self) -> &M {
        &self.core.bus
    }

    /// Mutable memory bus. Code changed through it stays cached until
    /// [`Self::invalidate_code`] or [`Self::flush_icache`].
    pub const fn bus_mut(&mut self) -> &mut M {
        &mut self.core.bus
    }

    /// Programmer-visible state.
    #[must_use]
    pub const fn state(&self) -> &ProcessorState {
        &self.core.state
    }

    /// Mutable programmer-visible state, for test harnesses and debuggers.
    /// A tbit written here takes effect at the next run.
    pub const fn state_mut(&mut self) -> &mut ProcessorState {
        &mut self.core.state
    }

    /// Exception controller.
    #[must_use]
    pub const fn controller(&self) -> &ExceptionController {
        &self.core.eit
    }

    /// Execution counters.
    #[must_use]
    pub const fn stats(&self) -> &CpuStats {
        &self.core.stats
    }

    /// Zeroes the execution counters.
    pub fn reset_stats(&mut self) {
        self.core.stats.reset();
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Sets the instruction budget of one step.
    pub fn set_step_insn_count(&mut self, count: u32) {
        self.config.step_insn_count = count;
    }

    /// Installs or removes the trace sink.
    pub fn set_trace_sink(&mut self, sink: Option<BoxedTraceSink>) {
        self.core.sink = sink;
    }

    /// Enables or disables trace dispatch.
    pub fn set_tracing(&mut self, enabled: bool) {
        self.core.tracing = enabled;
        self.config.tracing_enabled = enabled;
    }

    /// Number of cached blocks held for `mode`.
    #[must_use]
    pub fn cached_blocks(&self, mode: IsaMode) -> usize {
        match mode {
            IsaMode::Arm => self.arm.cached_blocks(),
            IsaMode::Thumb => self.thumb.cached_blocks(),
        }
    }

    /// `CPSR` as a hexadecimal attribute string.
    #[must_use]
    pub fn cpsr_attr(&self) -> String {
        format!("{:#010x}", self.core.state.cpsr().raw())
    }

    /// Writes the whole `CPSR` from an attribute string. A value with invalid
    /// mode bits is rolled back completely.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Parse`] for a malformed number and
    /// [`AttributeError::BadValue`] for invalid mode bits.
    pub fn set_cpsr_attr(&mut self, value: &str) -> Result<(), AttributeError> {
        let value = parse_attr(value)?;
        let result = self.core.write_cpsr(value, u32::MAX);
        if let Err(err) = result {
            // The old value holds valid mode bits, so restoring cannot fail.
            let _ = self.core.write_cpsr(err.old, u32::MAX);
        }
        self.core.clear_transients();
        result?;
        Ok(())
    }

    /// Human-readable flags: `NZCV` and `IFT` upper case when set, then the
    /// mode name.
    #[must_use]
    pub fn cpsr_flags_attr(&self) -> String {
        let cpsr = self.core.state.cpsr();
        let flags = cpsr.flags();
        let mut out = String::with_capacity(12);
        for (set, letter) in [
            (flags.n, 'n'),
            (flags.z, 'z'),
            (flags.c, 'c'),
            (flags.v, 'v'),
        ] {
            out.push(if set { letter.to_ascii_uppercase() } else { letter });
        }
        out.push(' ');
        for (set, letter) in [
            (cpsr.irq_disabled(), 'i'),
            (cpsr.fiq_disabled(), 'f'),
            (cpsr.tbit(), 't'),
        ] {
            out.push(if set { letter.to_ascii_uppercase() } else { letter });
        }
        let _ = write!(out, " {}", self.core.state.mode().name());
        out
    }

    /// The flags attribute is read-only.
    ///
    /// # Errors
    ///
    /// Always returns [`AttributeError::ReadOnly`].
    pub const fn set_cpsr_flags_attr(&mut self, _value: &str) -> Result<(), AttributeError> {
        Err(AttributeError::ReadOnly)
    }

    /// Reads a debugger register: 0-15 are the general registers, 16-23 the
    /// FPA registers, 24 the FPA status and 25 the `CPSR`. FPA registers read
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnknownRegister`] past register 25.
    pub fn dbg_get_reg(&self, reg: u32) -> Result<u32, AttributeError> {
        match reg {
            0..=15 => Ok(self.core.state.reg(reg as usize)),
            DBG_REG_F0..=DBG_REG_FPS => Ok(0),
            DBG_REG_CPSR => Ok(self.core.state.cpsr().raw()),
            other => Err(AttributeError::UnknownRegister(other)),
        }
    }

    /// Writes a debugger register from an attribute string. FPA writes are
    /// accepted and ignored; `CPSR` writes behave like
    /// [`Self::set_cpsr_attr`].
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnknownRegister`] past register 25, a parse
    /// error for a malformed value, or the `CPSR` rejection.
    pub fn dbg_set_reg(&mut self, reg: u32, value: &str) -> Result<(), AttributeError> {
        match reg {
            0..=15 => {
                let value = parse_attr(value)?;
                let index = reg as usize;
                if index == PC {
                    self.core.state.set_pc(value);
                } else {
                    self.core.state.set_reg(index, value);
                }
                Ok(())
            }
            DBG_REG_F0..=DBG_REG_FPS => parse_attr(value).map(drop),
            DBG_REG_CPSR => self.set_cpsr_attr(value),
            other => Err(AttributeError::UnknownRegister(other)),
        }
    }

    /// Captures the complete mutable state.
    #[must_use]
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            version: SnapshotVersion::V1,
            state: self.core.state.clone(),
            controller: self.core.eit.clone(),
            config: self.config.clone(),
        }
    }

    /// Replaces the complete mutable state. Cached blocks are discarded,
    /// counted as invalidated and rebuilt on demand; statistics are kept.
    pub fn restore(&mut self, snapshot: CpuSnapshot) {
        let CpuSnapshot {
            state,
            controller,
            config,
            ..
        } = snapshot;
        self.core.state = state;
        self.core.eit = controller;
        self.core.tracing = config.tracing_enabled;
        self.core.max_block_insns = config.max_block_insns;
        self.core.vector_base = config.vector_base;
        self.core.clear_transients();
        let dropped =
            self.arm.set_active(config.arm_engine) + self.thumb.set_active(config.thumb_engine);
        self.count_dropped(dropped);
        self.config = config;
    }

    fn invalidate_stores(&mut self) {
        let stores = self.core.take_stores();
        let mut dropped = 0;
        for range in stores {
            dropped += self.arm.invalidate(range) + self.thumb.invalidate(range);
        }
        self.count_dropped(dropped);
    }

    fn count_dropped(&mut self, count: usize) {
        if count > 0 {
            self.core.blocks_invalidated(count);
        }
    }
}

fn parse_attr(value: &str) -> Result<u32, AttributeError> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| AttributeError::Parse(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::{parse_attr, Cpu};
    use crate::api::CoreConfig;
    use crate::memory::{Endianness, FlatMemory};
    use crate::AttributeError;
    use rstest::rstest;

    fn cpu() -> Cpu<FlatMemory> {
        Cpu::new(
            FlatMemory::new(0, 0x1000, Endianness::Little),
            CoreConfig::default(),
        )
    }

    #[rstest]
    #[case("0x10", Ok(0x10))]
    #[case("0XfF", Ok(0xFF))]
    #[case(" 42 ", Ok(42))]
    #[case("nope", Err(AttributeError::Parse("nope".to_owned())))]
    #[case("0x1_0000_0000", Err(AttributeError::Parse("0x1_0000_0000".to_owned())))]
    fn attribute_numbers_parse(#[case] input: &str, #[case] expected: Result<u32, AttributeError>) {
        assert_eq!(parse_attr(input), expected);
    }

    #[test]
    fn flags_attribute_spells_out_every_bit() {
        let cpu = cpu();
        assert_eq!(cpu.cpsr_flags_attr(), "nzcv IFt svc");
    }

    #[test]
    fn nm_pin_inverts_the_mode_field() {
        let cpu = cpu();
        assert_eq!(cpu.nm_pin(), !0x13 & 0x1F);
        assert!(!cpu.tbit_pin());
    }

    #[test]
    fn zero_step_budget_still_runs_one_instruction() {
        let mut cpu = cpu();
        cpu.set_step_insn_count(0);
        // mov r0, #1
        cpu.bus_mut().load_u32(0, 0xE3A0_0001).unwrap();
        assert_eq!(cpu.step().retired, 1);
        assert_eq!(cpu.state().reg(0), 1);
    }
}
