//! The core the engines run on: processor state, bus, EIT controller and
//! bookkeeping behind the [`ExecContext`] and [`EngineHost`] contracts.

use std::fmt;

use crate::api::{TraceEvent, TraceSink};
use crate::eit::{enter_exception, Eit, ExceptionController};
use crate::engine::{EngineHost, WriteRange};
use crate::eval::Condition;
use crate::log::{debug, trace};
use crate::memory::{self, MemoryBus};
use crate::semantics::{ExecContext, ModeControl};
use crate::state::cpsr::{CPSR_MODE_MASK, CPSR_T};
use crate::state::{Flags, IsaMode, ProcessorMode, ProcessorState};
use crate::stats::CpuStats;
use crate::{AccessKind, CpsrError, CpsrUpdate, MemoryFault, ModeError};

/// Boxed trace sink a core reports to.
pub type BoxedTraceSink = Box<dyn TraceSink + Send>;

pub(crate) struct Core<M> {
    pub(crate) state: ProcessorState,
    pub(crate) bus: M,
    pub(crate) eit: ExceptionController,
    pub(crate) stats: CpuStats,
    pub(crate) sink: Option<BoxedTraceSink>,
    pub(crate) tracing: bool,
    pub(crate) max_block_insns: usize,
    pub(crate) vector_base: u32,
    stores: Vec<WriteRange>,
    mode_switched: bool,
}

impl<M: fmt::Debug> fmt::Debug for Core<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state)
            .field("bus", &self.bus)
            .field("eit", &self.eit)
            .field("stats", &self.stats)
            .field("tracing", &self.tracing)
            .finish_non_exhaustive()
    }
}

impl<M> Core<M> {
    pub(crate) fn new(bus: M, eit: ExceptionController) -> Self {
        Self {
            state: ProcessorState::default(),
            bus,
            eit,
            stats: CpuStats::default(),
            sink: None,
            tracing: false,
            max_block_insns: 1,
            vector_base: 0,
            stores: Vec::new(),
            mode_switched: false,
        }
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        if !self.tracing {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.on_event(event);
        }
    }

    /// Enters the handler for whatever is pending.
    pub(crate) fn deliver(&mut self) -> Option<Eit> {
        let pending = self.eit.take()?;
        let entry = enter_exception(&mut self.state, pending, self.vector_base)?;
        debug!(
            eit = %entry.eit,
            origin = pending.origin,
            vector = entry.vector,
            "entering handler"
        );
        self.stats.record_delivered(entry.eit);
        self.emit(TraceEvent::ExceptionDelivered(entry));
        Some(entry.eit)
    }

    /// Returns the stores logged since the last call and empties the log.
    pub(crate) fn take_stores(&mut self) -> Vec<WriteRange> {
        std::mem::take(&mut self.stores)
    }

    /// Drops the store log and any unconsumed tbit change.
    pub(crate) fn clear_transients(&mut self) {
        self.stores.clear();
        self.mode_switched = false;
    }

    fn log_store(&mut self, addr: u32, len: u32) {
        self.stores.push(WriteRange::new(addr, len));
    }
}

impl<M> ModeControl for Core<M> {
    fn set_tbit(&mut self, tbit: bool) {
        if self.state.set_tbit(tbit) {
            self.mode_switched = true;
        }
    }

    fn set_mbits(&mut self, bits: u32) -> Result<ProcessorMode, ModeError> {
        self.state.set_mbits(bits)
    }
}

impl<M: MemoryBus> ExecContext for Core<M> {
    fn gpr(&self, index: usize) -> u32 {
        self.state.reg(index)
    }

    fn set_gpr(&mut self, index: usize, value: u32) {
        self.state.set_reg(index, value);
    }

    fn flags(&self) -> Flags {
        self.state.flags()
    }

    fn set_flags(&mut self, flags: Flags) {
        self.state.set_flags(flags);
    }

    fn cpsr(&self) -> u32 {
        self.state.cpsr().raw()
    }

    fn mode(&self) -> ProcessorMode {
        self.state.mode()
    }

    fn write_cpsr(&mut self, value: u32, mask: u32) -> Result<CpsrUpdate, CpsrError> {
        let old = self.state.cpsr().raw();
        let new = (old & !mask) | (value & mask);
        self.state.set_cpsr_plain_bits(new);
        self.set_tbit(new & CPSR_T != 0);
        self.set_mbits(new & CPSR_MODE_MASK)
            .map_err(|_| CpsrError { old, attempted: new })?;
        Ok(CpsrUpdate { old, new })
    }

    fn spsr(&self) -> Option<u32> {
        self.state.spsr()
    }

    fn set_spsr(&mut self, value: u32, mask: u32) {
        let mode = self.state.mode();
        if let Some(old) = self.state.spsr() {
            let new = (old & !mask) | (value & mask);
            self.state.registers_mut().set_spsr_of(mode, new);
        }
    }

    fn fetch_u32(&mut self, pc: u32) -> Result<u32, MemoryFault> {
        self.bus
            .read_u32(pc, pc)
            .map_err(|source| MemoryFault::fetch(pc, source))
    }

    fn fetch_u16(&mut self, pc: u32) -> Result<u16, MemoryFault> {
        self.bus
            .read_u16(pc, pc)
            .map_err(|source| MemoryFault::fetch(pc, source))
    }

    fn load_word(&mut self, pc: u32, addr: u32) -> Result<u32, MemoryFault> {
        memory::load_word(&mut self.bus, pc, addr).map_err(|source| MemoryFault::data(pc, source))
    }

    fn load_half(&mut self, pc: u32, addr: u32) -> Result<u16, MemoryFault> {
        self.bus
            .read_u16(pc, addr & !1)
            .map_err(|source| MemoryFault::data(pc, source))
    }

    fn load_byte(&mut self, pc: u32, addr: u32) -> Result<u8, MemoryFault> {
        self.bus
            .read_u8(pc, addr)
            .map_err(|source| MemoryFault::data(pc, source))
    }

    fn store_word(&mut self, pc: u32, addr: u32, value: u32) -> Result<(), MemoryFault> {
        memory::store_word(&mut self.bus, pc, addr, value)
            .map_err(|source| MemoryFault::data(pc, source))?;
        self.log_store(addr & !3, 4);
        Ok(())
    }

    fn store_half(&mut self, pc: u32, addr: u32, value: u16) -> Result<(), MemoryFault> {
        let addr = addr & !1;
        self.bus
            .write_u16(pc, addr, value)
            .map_err(|source| MemoryFault::data(pc, source))?;
        self.log_store(addr, 2);
        Ok(())
    }

    fn store_byte(&mut self, pc: u32, addr: u32, value: u8) -> Result<(), MemoryFault> {
        self.bus
            .write_u8(pc, addr, value)
            .map_err(|source| MemoryFault::data(pc, source))?;
        self.log_store(addr, 1);
        Ok(())
    }

    fn eval_cond(&mut self, cond: u32, pc: u32) -> bool {
        if let Some(condition) = Condition::from_bits(cond) {
            condition.evaluate(self.state.flags())
        } else {
            self.invalid_insn(pc);
            false
        }
    }

    fn invalid_insn(&mut self, pc: u32) {
        debug!(pc = pc, "undefined instruction");
        self.stats.record_invalid_insn();
        self.eit.raise(Eit::UndefinedInsn, pc);
    }

    #[cfg_attr(not(feature = "log"), allow(unused_variables))]
    fn swi(&mut self, pc: u32, trap: u32) {
        trace!(pc = pc, trap = trap, "software interrupt");
        self.eit.raise(Eit::SwiInsn, pc);
    }
}

impl<M: MemoryBus> EngineHost for Core<M> {
    fn pc(&self) -> u32 {
        self.state.pc()
    }

    fn set_pc(&mut self, pc: u32) {
        self.state.set_pc(pc);
    }

    fn isa_mode(&self) -> IsaMode {
        self.state.isa_mode()
    }

    fn eit_pending(&self) -> bool {
        self.eit.is_pending()
    }

    fn sample_interrupts(&mut self) -> bool {
        self.eit.sample(self.state.cpsr())
    }

    fn memory_trap(&mut self, fault: MemoryFault) {
        debug!(pc = fault.pc, addr = fault.addr(), kind = ?fault.kind, "bus fault");
        self.stats.record_fault(fault.kind);
        let eit = match fault.kind {
            AccessKind::Fetch => Eit::PrefetchAbort,
            AccessKind::Data => Eit::DataAbort,
        };
        self.eit.raise(eit, fault.pc);
    }

    fn retire(&mut self, pc: u32, mode: IsaMode) {
        self.stats.record_retired();
        self.emit(TraceEvent::InstructionRetired { pc, mode });
    }

    fn take_mode_switch(&mut self) -> bool {
        std::mem::take(&mut self.mode_switched)
    }

    fn store_mark(&self) -> usize {
        self.stores.len()
    }

    fn stores_since(&self, mark: usize) -> &[WriteRange] {
        self.stores.get(mark..).unwrap_or_default()
    }

    fn max_block_insns(&self) -> usize {
        self.max_block_insns
    }

    fn block_built(&mut self, mode: IsaMode, start: u32, len: usize) {
        self.stats.record_block_built();
        self.emit(TraceEvent::BlockBuilt { mode, start, len });
    }

    fn block_hit(&mut self) {
        self.stats.record_block_hit();
    }

    fn blocks_invalidated(&mut self, count: usize) {
        self.stats.record_invalidated(count);
        self.emit(TraceEvent::BlocksInvalidated { count });
    }
}
