//! Current program status register and the condition flags view.

use std::fmt;

/// `CPSR` negative flag.
pub const CPSR_N: u32 = 1 << 31;
/// `CPSR` zero flag.
pub const CPSR_Z: u32 = 1 << 30;
/// `CPSR` carry flag.
pub const CPSR_C: u32 = 1 << 29;
/// `CPSR` overflow flag.
pub const CPSR_V: u32 = 1 << 28;
/// `CPSR` IRQ disable bit.
pub const CPSR_I: u32 = 1 << 7;
/// `CPSR` FIQ disable bit.
pub const CPSR_F: u32 = 1 << 6;
/// `CPSR` Thumb state bit.
pub const CPSR_T: u32 = 1 << 5;
/// Mask of the five mode bits.
pub const CPSR_MODE_MASK: u32 = 0x1F;
/// Mask of the condition flag byte.
pub const CPSR_FLAGS_MASK: u32 = CPSR_N | CPSR_Z | CPSR_C | CPSR_V;
/// Mask of the control byte (`I`, `F`, `T`, mode).
pub const CPSR_CONTROL_MASK: u32 = 0xFF;

/// Condition flags consumed by the condition evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Flags {
    /// Negative.
    pub n: bool,
    /// Zero.
    pub z: bool,
    /// Carry / not-borrow.
    pub c: bool,
    /// Signed overflow.
    pub v: bool,
}

impl Flags {
    /// Builds flags from a 4-bit `NZCV` nibble (bit 3 = `N`).
    #[must_use]
    pub const fn from_nzcv(nzcv: u8) -> Self {
        Self {
            n: nzcv & 0b1000 != 0,
            z: nzcv & 0b0100 != 0,
            c: nzcv & 0b0010 != 0,
            v: nzcv & 0b0001 != 0,
        }
    }

    /// Sets `N` and `Z` from a result, leaving `C` and `V` alone.
    #[must_use]
    pub const fn with_nz(self, result: u32) -> Self {
        Self {
            n: result & 0x8000_0000 != 0,
            z: result == 0,
            ..self
        }
    }
}

/// Raw `CPSR` value with typed accessors.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cpsr(u32);

impl Cpsr {
    /// Architectural reset value: supervisor mode, IRQ and FIQ masked, ARM state.
    pub const RESET: Self = Self(CPSR_I | CPSR_F | 0x13);

    /// Wraps a raw value without validating the mode field.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw register value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Condition flags.
    #[must_use]
    pub const fn flags(self) -> Flags {
        Flags {
            n: self.0 & CPSR_N != 0,
            z: self.0 & CPSR_Z != 0,
            c: self.0 & CPSR_C != 0,
            v: self.0 & CPSR_V != 0,
        }
    }

    /// Replaces the condition flags.
    pub const fn set_flags(&mut self, flags: Flags) {
        let mut raw = self.0 & !CPSR_FLAGS_MASK;
        if flags.n {
            raw |= CPSR_N;
        }
        if flags.z {
            raw |= CPSR_Z;
        }
        if flags.c {
            raw |= CPSR_C;
        }
        if flags.v {
            raw |= CPSR_V;
        }
        self.0 = raw;
    }

    /// Thumb state bit.
    #[must_use]
    pub const fn tbit(self) -> bool {
        self.0 & CPSR_T != 0
    }

    /// IRQ masked.
    #[must_use]
    pub const fn irq_disabled(self) -> bool {
        self.0 & CPSR_I != 0
    }

    /// FIQ masked.
    #[must_use]
    pub const fn fiq_disabled(self) -> bool {
        self.0 & CPSR_F != 0
    }

    /// Raw five-bit mode field.
    #[must_use]
    pub const fn mode_bits(self) -> u32 {
        self.0 & CPSR_MODE_MASK
    }

    /// Sets or clears a single control bit.
    pub const fn set_bit(&mut self, bit: u32, enabled: bool) {
        if enabled {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub(crate) const fn set_mode_bits(&mut self, bits: u32) {
        self.0 = (self.0 & !CPSR_MODE_MASK) | (bits & CPSR_MODE_MASK);
    }
}

impl Default for Cpsr {
    fn default() -> Self {
        Self::RESET
    }
}

impl fmt::Debug for Cpsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpsr")
            .field("raw", &format_args!("{:#010x}", self.0))
            .field("flags", &self.flags())
            .field("i", &self.irq_disabled())
            .field("f", &self.fiq_disabled())
            .field("t", &self.tbit())
            .field("mode", &format_args!("{:#07b}", self.mode_bits()))
            .finish()
    }
}
