//! Exception/interrupt/trap (EIT) arbitration, interrupt pin sampling and
//! handler entry.
//!
//! The controller owns a single pending slot. Requests are arbitrated by a
//! fixed priority table, never by arrival order, and are only delivered at an
//! instruction boundary by [`enter_exception`].

use std::fmt;
use std::str::FromStr;

use crate::state::cpsr::{CPSR_F, CPSR_I};
use crate::state::{Cpsr, ProcessorMode, ProcessorState, LR};
use crate::ConfigError;

/// A pending redirection of control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Eit {
    /// Nothing pending.
    #[default]
    None,
    /// Processor reset.
    Reset,
    /// Data access aborted by the bus.
    DataAbort,
    /// Fast interrupt request.
    Fiq,
    /// Interrupt request.
    Irq,
    /// Instruction fetch aborted by the bus.
    PrefetchAbort,
    /// Undefined instruction or unrecognised condition selector.
    UndefinedInsn,
    /// Software interrupt instruction.
    SwiInsn,
}

impl Eit {
    /// Every kind, highest priority first.
    pub const BY_PRIORITY: [Self; 8] = [
        Self::Reset,
        Self::DataAbort,
        Self::Fiq,
        Self::Irq,
        Self::PrefetchAbort,
        Self::UndefinedInsn,
        Self::SwiInsn,
        Self::None,
    ];

    /// Arbitration rank; larger wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Reset => 7,
            Self::DataAbort => 6,
            Self::Fiq => 5,
            Self::Irq => 4,
            Self::PrefetchAbort => 3,
            Self::UndefinedInsn => 2,
            Self::SwiInsn => 1,
            Self::None => 0,
        }
    }

    /// Offset of the exception vector from the vector base.
    #[must_use]
    pub const fn vector(self) -> Option<u32> {
        match self {
            Self::Reset => Some(0x00),
            Self::UndefinedInsn => Some(0x04),
            Self::SwiInsn => Some(0x08),
            Self::PrefetchAbort => Some(0x0C),
            Self::DataAbort => Some(0x10),
            Self::Irq => Some(0x18),
            Self::Fiq => Some(0x1C),
            Self::None => None,
        }
    }

    /// Mode the handler runs in.
    #[must_use]
    pub const fn target_mode(self) -> Option<ProcessorMode> {
        match self {
            Self::Reset | Self::SwiInsn => Some(ProcessorMode::Supervisor),
            Self::UndefinedInsn => Some(ProcessorMode::Undefined),
            Self::PrefetchAbort | Self::DataAbort => Some(ProcessorMode::Abort),
            Self::Irq => Some(ProcessorMode::Irq),
            Self::Fiq => Some(ProcessorMode::Fiq),
            Self::None => None,
        }
    }

    /// Whether handler entry also masks FIQ.
    #[must_use]
    pub const fn masks_fiq(self) -> bool {
        matches!(self, Self::Reset | Self::Fiq)
    }

    /// Whether the request came from an interrupt pin.
    #[must_use]
    pub const fn is_interrupt(self) -> bool {
        matches!(self, Self::Irq | Self::Fiq)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reset => "reset",
            Self::DataAbort => "dabt",
            Self::Fiq => "fiq",
            Self::Irq => "irq",
            Self::PrefetchAbort => "pabt",
            Self::UndefinedInsn => "und",
            Self::SwiInsn => "swi",
        }
    }
}

impl fmt::Display for Eit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How interrupt pins reach the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptSync {
    /// Queued at the first boundary where the pin is seen asserted.
    #[default]
    Synchronous,
    /// Held for one extra boundary in the input synchroniser.
    Asynchronous,
}

impl fmt::Display for InterruptSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Synchronous => "sync",
            Self::Asynchronous => "async",
        })
    }
}

impl FromStr for InterruptSync {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" | "synchronous" => Ok(Self::Synchronous),
            "async" | "asynchronous" => Ok(Self::Asynchronous),
            other => Err(ConfigError::UnknownInterruptSync(other.to_owned())),
        }
    }
}

/// The request held in the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PendingEit {
    /// Request kind.
    pub eit: Eit,
    /// Address of the instruction that raised a synchronous request.
    pub origin: u32,
}

/// Levels of the interrupt input pins. `true` is electrically high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PinLevels {
    /// Fast interrupt request, active low.
    pub nfiq: bool,
    /// Interrupt request, active low.
    pub nirq: bool,
}

impl Default for PinLevels {
    fn default() -> Self {
        Self {
            nfiq: true,
            nirq: true,
        }
    }
}

/// Pending slot plus interrupt pin state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExceptionController {
    pending: PendingEit,
    pins: PinLevels,
    sync: InterruptSync,
    // Unmasked assertions seen at the previous boundary (async mode only).
    synchronizer: PinLevels,
}

impl ExceptionController {
    /// Controller with idle pins and the given synchronisation mode.
    #[must_use]
    pub fn new(sync: InterruptSync) -> Self {
        Self {
            sync,
            ..Self::default()
        }
    }

    /// Currently pending kind.
    #[must_use]
    pub const fn pending(&self) -> Eit {
        self.pending.eit
    }

    /// Whether a request waits for delivery.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !matches!(self.pending.eit, Eit::None)
    }

    /// Requests `eit`, keeping whichever of it and the pending request ranks
    /// higher. Returns `true` when `eit` now occupies the slot.
    pub const fn queue_eit(&mut self, eit: Eit) -> bool {
        self.raise(eit, 0)
    }

    /// [`Self::queue_eit`] for a synchronous request raised by the instruction
    /// at `origin`.
    pub const fn raise(&mut self, eit: Eit, origin: u32) -> bool {
        if eit.priority() <= self.pending.eit.priority() {
            return false;
        }
        self.pending = PendingEit { eit, origin };
        true
    }

    /// Empties the slot and returns what it held.
    pub fn take(&mut self) -> Option<PendingEit> {
        let pending = std::mem::take(&mut self.pending);
        (pending.eit != Eit::None).then_some(pending)
    }

    /// Drops any pending request and the synchroniser contents.
    pub fn clear(&mut self) {
        self.pending = PendingEit::default();
        self.synchronizer = PinLevels::default();
    }

    /// Current pin levels.
    #[must_use]
    pub const fn pins(&self) -> PinLevels {
        self.pins
    }

    /// Drives the nFIQ input.
    pub const fn drive_nfiq(&mut self, level: bool) {
        self.pins.nfiq = level;
    }

    /// Drives the nIRQ input.
    pub const fn drive_nirq(&mut self, level: bool) {
        self.pins.nirq = level;
    }

    /// Drives the ISYNC input: high selects synchronous sampling.
    pub const fn drive_isync(&mut self, level: bool) {
        self.sync = if level {
            InterruptSync::Synchronous
        } else {
            InterruptSync::Asynchronous
        };
    }

    /// Active synchronisation mode.
    #[must_use]
    pub const fn interrupt_sync(&self) -> InterruptSync {
        self.sync
    }

    /// Selects the synchronisation mode.
    pub const fn set_interrupt_sync(&mut self, sync: InterruptSync) {
        self.sync = sync;
    }

    /// Level-samples both interrupt pins against the masks in `cpsr` and queues
    /// any request that is live at this boundary. Returns whether anything is
    /// pending afterwards.
    pub fn sample(&mut self, cpsr: Cpsr) -> bool {
        let fiq = !self.pins.nfiq && !cpsr.fiq_disabled();
        let irq = !self.pins.nirq && !cpsr.irq_disabled();
        let (fiq_live, irq_live) = match self.sync {
            InterruptSync::Synchronous => (fiq, irq),
            // `synchronizer` stores the inverted level: false means asserted.
            InterruptSync::Asynchronous => {
                let delayed = (fiq && !self.synchronizer.nfiq, irq && !self.synchronizer.nirq);
                self.synchronizer = PinLevels {
                    nfiq: !fiq,
                    nirq: !irq,
                };
                delayed
            }
        };
        if fiq_live {
            self.queue_eit(Eit::Fiq);
        }
        if irq_live {
            self.queue_eit(Eit::Irq);
        }
        self.is_pending()
    }
}

/// What handler entry did, for tracing and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExceptionEntry {
    /// Delivered kind.
    pub eit: Eit,
    /// Value written to the handler's `LR`; `None` for reset.
    pub link: Option<u32>,
    /// Handler address now in `PC`.
    pub vector: u32,
}

/// Enters the handler for `pending` at an instruction boundary.
///
/// Switches to the handler mode, saves the old `CPSR` into that mode's `SPSR`,
/// writes the return link, clears the tbit, masks IRQ (and FIQ for reset and
/// FIQ) and redirects the program counter to the vector.
///
/// Return links: undefined instruction and SWI point past the raising
/// instruction; prefetch abort is `origin + 4`; data abort is `origin + 8`;
/// IRQ and FIQ are the address of the next unexecuted instruction plus 4.
///
/// Returns `None` when `pending` holds no request.
pub fn enter_exception(
    state: &mut ProcessorState,
    pending: PendingEit,
    vector_base: u32,
) -> Option<ExceptionEntry> {
    let PendingEit { eit, origin } = pending;
    let mode = eit.target_mode()?;
    let vector = vector_base.wrapping_add(eit.vector()?);

    let link = match eit {
        Eit::Reset | Eit::None => None,
        Eit::UndefinedInsn | Eit::SwiInsn => {
            Some(origin.wrapping_add(state.isa_mode().insn_bytes()))
        }
        Eit::PrefetchAbort => Some(origin.wrapping_add(4)),
        Eit::DataAbort => Some(origin.wrapping_add(8)),
        Eit::Irq | Eit::Fiq => Some(state.pc().wrapping_add(4)),
    };

    let old = state.cpsr().raw();
    state.enter_mode(mode);
    state.registers_mut().set_spsr_of(mode, old);
    if let Some(link) = link {
        state.set_reg(LR, link);
    }

    let mut cpsr = state.cpsr();
    cpsr.set_bit(CPSR_I, true);
    if eit.masks_fiq() {
        cpsr.set_bit(CPSR_F, true);
    }
    state.set_tbit(false);
    state.set_cpsr_plain_bits(cpsr.raw());
    state.set_pc(vector);

    Some(ExceptionEntry { eit, link, vector })
}
