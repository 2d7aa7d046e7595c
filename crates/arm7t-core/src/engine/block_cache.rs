use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

const PAGE_SHIFT: u32 = 10;

/// A span of memory that was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WriteRange {
    /// First written byte.
    pub addr: u32,
    /// Number of bytes written.
    pub len: u32,
}

impl WriteRange {
    /// Range of `len` bytes at `addr`.
    #[must_use]
    pub const fn new(addr: u32, len: u32) -> Self {
        Self { addr, len }
    }

    /// One past the last written byte.
    #[must_use]
    pub const fn end(self) -> u64 {
        self.addr as u64 + self.len as u64
    }
}

/// Decoded straight-line code starting at `start`. Only the last instruction
/// may be a control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlock<T> {
    start: u32,
    width: u32,
    insns: Vec<T>,
}

impl<T> CachedBlock<T> {
    /// Address of the first instruction.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// Whether the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// One past the last byte covered by the block.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.width) * self.insns.len() as u64
    }

    /// Instructions paired with their addresses.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        let (start, width) = (self.start, self.width);
        self.insns
            .iter()
            .enumerate()
            .map(move |(index, insn)| (start.wrapping_add(width * index as u32), insn))
    }

    /// Whether `range` writes any byte of the block.
    #[must_use]
    pub fn overlaps(&self, range: WriteRange) -> bool {
        u64::from(self.start) < range.end() && u64::from(range.addr) < self.end()
    }
}

/// Blocks keyed by start address, with a page index for range invalidation.
#[derive(Debug, Clone)]
pub struct BlockCache<T> {
    blocks: HashMap<u32, Arc<CachedBlock<T>>>,
    pages: HashMap<u32, Vec<u32>>,
}

impl<T> Default for BlockCache<T> {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
            pages: HashMap::new(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pages(start: u64, end: u64) -> RangeInclusive<u32> {
    let last = end.saturating_sub(1).max(start);
    ((start >> PAGE_SHIFT) as u32)..=((last >> PAGE_SHIFT) as u32)
}

impl<T> BlockCache<T> {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block starting at `start`, if cached.
    #[must_use]
    pub fn get(&self, start: u32) -> Option<Arc<CachedBlock<T>>> {
        self.blocks.get(&start).cloned()
    }

    /// Stores a block of `width`-byte instructions, replacing any block with
    /// the same start.
    pub fn insert(&mut self, start: u32, width: u32, insns: Vec<T>) -> Arc<CachedBlock<T>> {
        self.remove(start);
        let block = Arc::new(CachedBlock {
            start,
            width,
            insns,
        });
        for page in pages(u64::from(start), block.end()) {
            self.pages.entry(page).or_default().push(start);
        }
        self.blocks.insert(start, Arc::clone(&block));
        block
    }

    /// Drops every block overlapping `range`. Returns how many were dropped.
    pub fn invalidate(&mut self, range: WriteRange) -> usize {
        if range.len == 0 {
            return 0;
        }
        let mut doomed = Vec::new();
        for page in pages(u64::from(range.addr), range.end()) {
            let Some(starts) = self.pages.get(&page) else {
                continue;
            };
            doomed.extend(starts.iter().copied().filter(|start| {
                self.blocks
                    .get(start)
                    .is_some_and(|block| block.overlaps(range))
            }));
        }
        doomed.sort_unstable();
        doomed.dedup();
        for &start in &doomed {
            self.remove(start);
        }
        doomed.len()
    }

    /// Drops every block. Returns how many were dropped.
    pub fn flush(&mut self) -> usize {
        let count = self.blocks.len();
        self.blocks.clear();
        self.pages.clear();
        count
    }

    fn remove(&mut self, start: u32) {
        let Some(block) = self.blocks.remove(&start) else {
            return;
        };
        for page in pages(u64::from(start), block.end()) {
            if let Some(starts) = self.pages.get_mut(&page) {
                starts.retain(|&other| other != start);
                if starts.is_empty() {
                    self.pages.remove(&page);
                }
            }
        }
    }
}
