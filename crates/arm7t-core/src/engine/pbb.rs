use std::sync::Arc;

use super::{boundary_stop, BlockCache, CachedBlock, EngineHost, RunOutcome, StopReason, WriteRange};
use crate::log::trace;
use crate::semantics::InstructionSet;
use crate::MemoryFault;

/// Cached-block engine.
///
/// A miss decodes forward from the requested PC up to and including the
/// first control transfer (or the host's length cap) and caches the result;
/// a hit replays the decoded instructions. Stores are checked after every
/// instruction, and a store into the block being replayed ends the run.
#[derive(Debug, Clone)]
pub struct BlockEngine<T> {
    cache: BlockCache<T>,
}

impl<T> Default for BlockEngine<T> {
    fn default() -> Self {
        Self {
            cache: BlockCache::new(),
        }
    }
}

impl<T> BlockEngine<T> {
    /// Engine with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached blocks.
    #[must_use]
    pub const fn cache(&self) -> &BlockCache<T> {
        &self.cache
    }

    /// Drops every cached block.
    pub fn flush(&mut self) -> usize {
        self.cache.flush()
    }

    /// Drops cached blocks overlapping `range`.
    pub fn invalidate(&mut self, range: WriteRange) -> usize {
        self.cache.invalidate(range)
    }

    /// Executes cached blocks from the host's PC until a stop condition.
    pub fn run<I, H>(&mut self, isa: &I, host: &mut H, limit: u32) -> RunOutcome
    where
        I: InstructionSet<Insn = T>,
        H: EngineHost + ?Sized,
    {
        let width = I::MODE.insn_bytes();
        let mut retired = 0;
        loop {
            if retired >= limit {
                return RunOutcome::new(retired, StopReason::Limit);
            }
            let start = host.pc();
            let block = if let Some(block) = self.cache.get(start) {
                host.block_hit();
                block
            } else {
                match self.build(isa, host, start) {
                    Ok(block) => block,
                    Err(fault) => {
                        host.memory_trap(fault);
                        return RunOutcome::new(retired, StopReason::EitPending);
                    }
                }
            };

            for (pc, insn) in block.iter() {
                let mark = host.store_mark();
                let completion = match isa.execute(host, pc, insn) {
                    Ok(completion) => completion,
                    Err(fault) => {
                        host.memory_trap(fault);
                        return RunOutcome::new(retired, StopReason::EitPending);
                    }
                };
                host.set_pc(completion.npc());
                host.retire(pc, I::MODE);
                retired += 1;

                let overwritten = self.invalidate_stores(host, mark, &block);
                if let Some(stop) = boundary_stop(host, completion, retired, limit) {
                    return RunOutcome::new(retired, stop);
                }
                if overwritten {
                    return RunOutcome::new(retired, StopReason::CodeModified);
                }
                if completion.npc() != pc.wrapping_add(width) {
                    return RunOutcome::new(retired, StopReason::ControlTransfer);
                }
            }
        }
    }

    fn build<I, H>(
        &mut self,
        isa: &I,
        host: &mut H,
        start: u32,
    ) -> Result<Arc<CachedBlock<T>>, MemoryFault>
    where
        I: InstructionSet<Insn = T>,
        H: EngineHost + ?Sized,
    {
        let width = I::MODE.insn_bytes();
        let cap = host.max_block_insns().max(1);
        let mut insns = Vec::new();
        let mut pc = start;
        while insns.len() < cap {
            match isa.decode(host, pc) {
                Ok(insn) => {
                    let ends_block = isa.is_control_transfer(&insn);
                    insns.push(insn);
                    pc = pc.wrapping_add(width);
                    if ends_block {
                        break;
                    }
                }
                Err(fault) if insns.is_empty() => return Err(fault),
                // The fault belongs to whichever run actually reaches `pc`.
                Err(_) => break,
            }
        }
        trace!(start = start, len = insns.len(), "built block");
        host.block_built(I::MODE, start, insns.len());
        Ok(self.cache.insert(start, width, insns))
    }

    // Invalidates blocks hit by stores logged since `mark`; reports whether the
    // block being replayed was one of them.
    fn invalidate_stores<H: EngineHost + ?Sized>(
        &mut self,
        host: &mut H,
        mark: usize,
        current: &CachedBlock<T>,
    ) -> bool {
        let mut overwritten = false;
        let mut dropped = 0;
        for &range in host.stores_since(mark) {
            overwritten |= current.overlaps(range);
            dropped += self.cache.invalidate(range);
        }
        if dropped > 0 {
            host.blocks_invalidated(dropped);
        }
        overwritten
    }
}
