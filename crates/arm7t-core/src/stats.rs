//! Saturating execution counters.

use crate::eit::Eit;
use crate::fault::AccessKind;

/// Per-core execution statistics. Every counter saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuStats {
    /// Instructions executed to completion.
    pub insns_retired: u64,
    /// Blocks decoded by a cached-block engine.
    pub blocks_built: u64,
    /// Block lookups served from a cache.
    pub block_hits: u64,
    /// Blocks discarded by code writes, flushes, resets and engine switches.
    pub blocks_invalidated: u64,
    /// Undefined instructions reported by semantics.
    pub invalid_insns: u64,
    /// Instruction fetches rejected by the bus.
    pub fetch_faults: u64,
    /// Data accesses rejected by the bus.
    pub data_faults: u64,
    /// Handler entries, indexed by [`Eit::priority`].
    pub eits_delivered: [u64; 8],
}

impl CpuStats {
    /// Counts one retired instruction.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_retired(&mut self) {
        self.insns_retired = self.insns_retired.saturating_add(1);
    }

    /// Counts a newly built block.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_block_built(&mut self) {
        self.blocks_built = self.blocks_built.saturating_add(1);
    }

    /// Counts a block cache hit.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_block_hit(&mut self) {
        self.block_hits = self.block_hits.saturating_add(1);
    }

    /// Counts `count` discarded blocks.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_invalidated(&mut self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.blocks_invalidated = self.blocks_invalidated.saturating_add(count);
    }

    /// Counts an undefined instruction report.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_invalid_insn(&mut self) {
        self.invalid_insns = self.invalid_insns.saturating_add(1);
    }

    /// Counts a bus fault of the given kind.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_fault(&mut self, kind: AccessKind) {
        let counter = match kind {
            AccessKind::Fetch => &mut self.fetch_faults,
            AccessKind::Data => &mut self.data_faults,
        };
        *counter = counter.saturating_add(1);
    }

    /// Counts a handler entry.
    pub fn record_delivered(&mut self, eit: Eit) {
        let slot = &mut self.eits_delivered[usize::from(eit.priority())];
        *slot = slot.saturating_add(1);
    }

    /// Handler entries of one kind.
    #[must_use]
    pub fn delivered(&self, eit: Eit) -> u64 {
        self.eits_delivered[usize::from(eit.priority())]
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
