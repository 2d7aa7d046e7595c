use crate::state::Flags;

/// Condition field of a conditionally executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Condition {
    /// Equal (`Z`).
    Eq = 0x0,
    /// Not equal (`!Z`).
    Ne = 0x1,
    /// Carry set / unsigned higher or same (`C`).
    Cs = 0x2,
    /// Carry clear / unsigned lower (`!C`).
    Cc = 0x3,
    /// Minus (`N`).
    Mi = 0x4,
    /// Plus or zero (`!N`).
    Pl = 0x5,
    /// Overflow (`V`).
    Vs = 0x6,
    /// No overflow (`!V`).
    Vc = 0x7,
    /// Unsigned higher (`C && !Z`).
    Hi = 0x8,
    /// Unsigned lower or same (`!C || Z`).
    Ls = 0x9,
    /// Signed greater or equal (`N == V`).
    Ge = 0xA,
    /// Signed less than (`N != V`).
    Lt = 0xB,
    /// Signed greater than (`!Z && N == V`).
    Gt = 0xC,
    /// Signed less or equal (`Z || N != V`).
    Le = 0xD,
    /// Always.
    Al = 0xE,
}

impl Condition {
    /// The fifteen recognised predicates in encoding order.
    pub const ALL: [Self; 15] = [
        Self::Eq,
        Self::Ne,
        Self::Cs,
        Self::Cc,
        Self::Mi,
        Self::Pl,
        Self::Vs,
        Self::Vc,
        Self::Hi,
        Self::Ls,
        Self::Ge,
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Al,
    ];

    /// Decodes a condition selector. `0xF` and anything wider are unrecognised.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits < 15 {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }

    /// Evaluates the predicate against the status flags.
    #[must_use]
    pub const fn evaluate(self, flags: Flags) -> bool {
        let Flags { n, z, c, v } = flags;
        match self {
            Self::Eq => z,
            Self::Ne => !z,
            Self::Cs => c,
            Self::Cc => !c,
            Self::Mi => n,
            Self::Pl => !n,
            Self::Vs => v,
            Self::Vc => !v,
            Self::Hi => c && !z,
            Self::Ls => !c || z,
            Self::Ge => n == v,
            Self::Lt => n != v,
            Self::Gt => !z && n == v,
            Self::Le => z || n != v,
            Self::Al => true,
        }
    }
}
