/// Number of registers visible in any one mode, excluding the program counter.
pub const VISIBLE_REGISTER_COUNT: usize = 15;
/// Register number of the stack pointer.
pub const SP: usize = 13;
/// Register number of the link register.
pub const LR: usize = 14;
/// Register number of the program counter.
pub const PC: usize = 15;

const BANK_COUNT: usize = 6;
const SPSR_COUNT: usize = 5;
const FIQ_BANKED: std::ops::Range<usize> = 8..13;

/// Architectural processor mode selected by `CPSR[4:0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ProcessorMode {
    /// Unprivileged application mode.
    User = 0x10,
    /// Fast interrupt handler mode.
    Fiq = 0x11,
    /// Interrupt handler mode.
    Irq = 0x12,
    /// Supervisor mode, entered on reset and software interrupt.
    #[default]
    Supervisor = 0x13,
    /// Abort handler mode.
    Abort = 0x17,
    /// Undefined-instruction handler mode.
    Undefined = 0x1B,
    /// Privileged mode sharing the user register bank.
    System = 0x1F,
}

impl ProcessorMode {
    /// Decodes a mode field. Unassigned encodings return `None`.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x1F {
            0x10 => Some(Self::User),
            0x11 => Some(Self::Fiq),
            0x12 => Some(Self::Irq),
            0x13 => Some(Self::Supervisor),
            0x17 => Some(Self::Abort),
            0x1B => Some(Self::Undefined),
            0x1F => Some(Self::System),
            _ => None,
        }
    }

    /// Five-bit mode field encoding.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Whether the mode has its own `SPSR`.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }

    /// Whether the mode may write the control byte of `CPSR`.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }

    /// Short lowercase name used by attribute strings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "usr",
            Self::Fiq => "fiq",
            Self::Irq => "irq",
            Self::Supervisor => "svc",
            Self::Abort => "abt",
            Self::Undefined => "und",
            Self::System => "sys",
        }
    }

    const fn bank(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Supervisor => 3,
            Self::Abort => 4,
            Self::Undefined => 5,
        }
    }
}

/// Banked general-purpose register file.
///
/// `current` always holds the view of the active mode; the shadow copies of
/// banked registers are swapped in and out by [`RegisterFile::switch_mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    current: [u32; VISIBLE_REGISTER_COUNT],
    // [0] = user/shared copy, [1] = fiq copy
    r8_r12: [[u32; 5]; 2],
    r13_r14: [[u32; 2]; BANK_COUNT],
    spsr: [u32; SPSR_COUNT],
    mode: ProcessorMode,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            current: [0; VISIBLE_REGISTER_COUNT],
            r8_r12: [[0; 5]; 2],
            r13_r14: [[0; 2]; BANK_COUNT],
            spsr: [0; SPSR_COUNT],
            mode: ProcessorMode::Supervisor,
        }
    }
}

impl RegisterFile {
    /// Reads `R0..=R14` of the active mode.
    ///
    /// # Panics
    ///
    /// Panics when `index` is 15 or above; the program counter lives in
    /// [`crate::ProcessorState`].
    #[must_use]
    pub const fn get(&self, index: usize) -> u32 {
        self.current[index]
    }

    /// Writes `R0..=R14` of the active mode.
    ///
    /// # Panics
    ///
    /// Panics when `index` is 15 or above.
    pub const fn set(&mut self, index: usize, value: u32) {
        self.current[index] = value;
    }

    /// Mode whose bank is currently visible.
    #[must_use]
    pub const fn mode(&self) -> ProcessorMode {
        self.mode
    }

    /// `SPSR` of the active mode, `None` in user and system mode.
    #[must_use]
    pub const fn spsr(&self) -> Option<u32> {
        self.spsr_of(self.mode)
    }

    /// `SPSR` of a specific mode.
    #[must_use]
    pub const fn spsr_of(&self, mode: ProcessorMode) -> Option<u32> {
        if mode.has_spsr() {
            Some(self.spsr[mode.bank() - 1])
        } else {
            None
        }
    }

    /// Writes the `SPSR` of a specific mode. Writes for modes without one are
    /// ignored.
    pub const fn set_spsr_of(&mut self, mode: ProcessorMode, value: u32) {
        if mode.has_spsr() {
            self.spsr[mode.bank() - 1] = value;
        }
    }

    /// Reads a register as seen from another mode, without switching banks.
    #[must_use]
    pub fn get_banked(&self, mode: ProcessorMode, index: usize) -> u32 {
        if mode.bank() == self.mode.bank() {
            return self.current[index];
        }
        let mode_is_fiq = mode == ProcessorMode::Fiq;
        let active_is_fiq = self.mode == ProcessorMode::Fiq;
        match index {
            13 | 14 => self.r13_r14[mode.bank()][index - 13],
            _ if FIQ_BANKED.contains(&index) && mode_is_fiq != active_is_fiq => {
                self.r8_r12[usize::from(mode_is_fiq)][index - FIQ_BANKED.start]
            }
            _ => self.current[index],
        }
    }

    /// Swaps the visible bank over to `mode`.
    pub fn switch_mode(&mut self, mode: ProcessorMode) {
        let old = self.mode;
        if old == mode {
            return;
        }

        self.r13_r14[old.bank()] = [self.current[13], self.current[14]];

        let old_fiq = old == ProcessorMode::Fiq;
        let new_fiq = mode == ProcessorMode::Fiq;
        if old_fiq != new_fiq {
            self.r8_r12[usize::from(old_fiq)].copy_from_slice(&self.current[FIQ_BANKED]);
            self.current[FIQ_BANKED].copy_from_slice(&self.r8_r12[usize::from(new_fiq)]);
        }

        let [sp, lr] = self.r13_r14[mode.bank()];
        self.current[13] = sp;
        self.current[14] = lr;
        self.mode = mode;
    }
}
