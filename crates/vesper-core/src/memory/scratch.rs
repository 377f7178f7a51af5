// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A per-thread pool of reusable blocks used to stage variable-length command data.
//!
//! Render commands only carry three 8-byte arguments, so arrays of handles,
//! stride tables and constant-buffer values are written into scratch blocks
//! and referenced by address. Blocks are reserved while a frame's commands are
//! being built and released in bulk with [`ScratchPool::free_all`] once the
//! commands have been flushed. Released blocks keep their memory and are
//! handed out again on later reservations; nothing is returned to the heap
//! until the pool itself is dropped.

use std::cell::RefCell;
use std::fmt;

const INITIAL_ALLOCATION_LIST_CAPACITY: usize = 4;
const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// An error raised when staged memory is accessed through an invalid block or address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScratchError {
    /// No allocation of this pool starts at the given address.
    UnknownAddress {
        /// The address that was looked up.
        address: u64,
    },
    /// The access extends past the end of the allocation.
    OutOfBounds {
        /// Start address of the allocation.
        address: u64,
        /// Number of bytes requested.
        requested: usize,
        /// Size of the allocation in bytes.
        size: usize,
    },
}

impl fmt::Display for ScratchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchError::UnknownAddress { address } => {
                write!(f, "No scratch allocation starts at address 0x{address:x}")
            }
            ScratchError::OutOfBounds {
                address,
                requested,
                size,
            } => write!(
                f,
                "Access of {requested} bytes exceeds scratch allocation 0x{address:x} of {size} bytes"
            ),
        }
    }
}

impl std::error::Error for ScratchError {}

/// A reservation made on a [`ScratchPool`].
///
/// The block stays valid (and will not be handed out again) until the next
/// [`ScratchPool::free_all`] on the owning pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchBlock {
    index: usize,
    address: u64,
    len: usize,
}

impl ScratchBlock {
    /// The stable address of the block, suitable for a command argument.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The number of bytes that were requested for this reservation.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if zero bytes were requested.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct Allocation {
    // Word storage keeps every block 8-byte aligned.
    storage: Box<[u64]>,
    size: usize,
    reserved: bool,
}

impl Allocation {
    fn new(size: usize) -> Self {
        let words = size.div_ceil(WORD_SIZE).max(1);
        Self {
            storage: vec![0u64; words].into_boxed_slice(),
            size,
            reserved: false,
        }
    }

    fn address(&self) -> u64 {
        self.storage.as_ptr() as usize as u64
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.storage)[..self.size]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.size;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.storage)[..size]
    }
}

/// A pool of reusable, never individually freed memory blocks.
#[derive(Debug)]
pub struct ScratchPool {
    allocations: Vec<Allocation>,
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            allocations: Vec::with_capacity(INITIAL_ALLOCATION_LIST_CAPACITY),
        }
    }

    /// Reserves a block of at least `num_bytes` bytes.
    ///
    /// The first unreserved allocation that is large enough is reused; if none
    /// exists a new allocation of exactly `num_bytes` is created. The contents
    /// of a reused block are whatever was last written to it.
    pub fn reserve(&mut self, num_bytes: usize) -> ScratchBlock {
        if let Some(index) = self
            .allocations
            .iter()
            .position(|alloc| !alloc.reserved && alloc.size >= num_bytes)
        {
            let alloc = &mut self.allocations[index];
            alloc.reserved = true;
            return ScratchBlock {
                index,
                address: alloc.address(),
                len: num_bytes,
            };
        }

        if self.allocations.len() == self.allocations.capacity() {
            let grow_by = self.allocations.capacity().max(INITIAL_ALLOCATION_LIST_CAPACITY);
            self.allocations.reserve_exact(grow_by);
        }

        let mut alloc = Allocation::new(num_bytes);
        alloc.reserved = true;
        let address = alloc.address();
        self.allocations.push(alloc);
        log::trace!(
            "Scratch pool grew to {} allocations ({num_bytes} new bytes).",
            self.allocations.len()
        );

        ScratchBlock {
            index: self.allocations.len() - 1,
            address,
            len: num_bytes,
        }
    }

    /// Reserves a block like [`reserve`](Self::reserve) and zero-fills the requested range.
    pub fn reserve_zeroed(&mut self, num_bytes: usize) -> ScratchBlock {
        let block = self.reserve(num_bytes);
        let alloc = &mut self.allocations[block.index];
        alloc.bytes_mut()[..num_bytes].fill(0);
        block
    }

    /// Releases every reservation. Memory is kept for reuse.
    pub fn free_all(&mut self) {
        for alloc in &mut self.allocations {
            alloc.reserved = false;
        }
    }

    /// The number of allocations owned by the pool, reserved or not.
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// The number of currently reserved allocations.
    pub fn reserved_count(&self) -> usize {
        self.allocations.iter().filter(|a| a.reserved).count()
    }

    /// Mutable byte view over a reserved block.
    pub fn bytes_mut(&mut self, block: &ScratchBlock) -> Result<&mut [u8], ScratchError> {
        let alloc = self.allocation_mut(block)?;
        Ok(&mut alloc.bytes_mut()[..block.len])
    }

    /// Mutable view over a reserved block as 64-bit words (handle arrays).
    ///
    /// Trailing bytes that do not fill a whole word are not included.
    pub fn words_mut(&mut self, block: &ScratchBlock) -> Result<&mut [u64], ScratchError> {
        let len = block.len / WORD_SIZE;
        let alloc = self.allocation_mut(block)?;
        Ok(&mut alloc.storage[..len])
    }

    /// Mutable view over a reserved block as 32-bit values (stride tables).
    pub fn u32s_mut(&mut self, block: &ScratchBlock) -> Result<&mut [u32], ScratchError> {
        let len = block.len / std::mem::size_of::<u32>();
        let alloc = self.allocation_mut(block)?;
        Ok(&mut bytemuck::cast_slice_mut::<u64, u32>(&mut alloc.storage)[..len])
    }

    /// Reads `len` bytes starting at the beginning of the allocation at `address`.
    pub fn read(&self, address: u64, len: usize) -> Result<&[u8], ScratchError> {
        let alloc = self.find(address)?;
        if len > alloc.size {
            return Err(ScratchError::OutOfBounds {
                address,
                requested: len,
                size: alloc.size,
            });
        }
        Ok(&alloc.bytes()[..len])
    }

    /// Reads `count` 64-bit words from the allocation at `address`.
    pub fn read_words(&self, address: u64, count: usize) -> Result<&[u64], ScratchError> {
        let alloc = self.find(address)?;
        let requested = count * WORD_SIZE;
        if requested > alloc.size {
            return Err(ScratchError::OutOfBounds {
                address,
                requested,
                size: alloc.size,
            });
        }
        Ok(&alloc.storage[..count])
    }

    /// Reads `count` 32-bit values from the allocation at `address`.
    pub fn read_u32s(&self, address: u64, count: usize) -> Result<&[u32], ScratchError> {
        let alloc = self.find(address)?;
        let requested = count * std::mem::size_of::<u32>();
        if requested > alloc.size {
            return Err(ScratchError::OutOfBounds {
                address,
                requested,
                size: alloc.size,
            });
        }
        Ok(&bytemuck::cast_slice::<u64, u32>(&alloc.storage)[..count])
    }

    /// Writes `words` at the start of the allocation at `address`.
    ///
    /// This is how a native collaborator fills an out-slot that a command
    /// pointed it to (for example the handle produced by `FinishCommandList`).
    pub fn write_words(&mut self, address: u64, words: &[u64]) -> Result<(), ScratchError> {
        let alloc = self
            .allocations
            .iter_mut()
            .find(|alloc| alloc.address() == address)
            .ok_or(ScratchError::UnknownAddress { address })?;
        let requested = words.len() * WORD_SIZE;
        if requested > alloc.size {
            return Err(ScratchError::OutOfBounds {
                address,
                requested,
                size: alloc.size,
            });
        }
        alloc.storage[..words.len()].copy_from_slice(words);
        Ok(())
    }

    fn find(&self, address: u64) -> Result<&Allocation, ScratchError> {
        self.allocations
            .iter()
            .find(|alloc| alloc.address() == address)
            .ok_or(ScratchError::UnknownAddress { address })
    }

    fn allocation_mut(&mut self, block: &ScratchBlock) -> Result<&mut Allocation, ScratchError> {
        match self.allocations.get_mut(block.index) {
            Some(alloc) if alloc.address() == block.address => {
                if block.len > alloc.size {
                    Err(ScratchError::OutOfBounds {
                        address: block.address,
                        requested: block.len,
                        size: alloc.size,
                    })
                } else {
                    Ok(alloc)
                }
            }
            _ => Err(ScratchError::UnknownAddress {
                address: block.address,
            }),
        }
    }
}

thread_local! {
    static LOCAL_POOL: RefCell<ScratchPool> = RefCell::new(ScratchPool::new());
}

/// Runs `f` with exclusive access to the calling thread's scratch pool.
///
/// The pool is created lazily on first use and lives until the thread exits.
/// `f` must not call back into `with_local_pool`.
pub fn with_local_pool<R>(f: impl FnOnce(&mut ScratchPool) -> R) -> R {
    LOCAL_POOL.with(|pool| f(&mut pool.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_free_reserve_reuses_address() {
        let mut pool = ScratchPool::new();
        let first = pool.reserve(64);
        pool.free_all();
        let second = pool.reserve(64);
        assert_eq!(first.address(), second.address(), "freed block should be recycled");
        assert_eq!(pool.allocation_count(), 1);
    }

    #[test]
    fn test_reserved_blocks_are_not_handed_out_twice() {
        let mut pool = ScratchPool::new();
        let small = pool.reserve(16);
        let large = pool.reserve(1024);
        assert_ne!(small.address(), large.address());
        assert_eq!(pool.allocation_count(), 2, "a larger request must allocate a new block");
        assert_eq!(pool.reserved_count(), 2);
    }

    #[test]
    fn test_first_fit_reuse_order() {
        let mut pool = ScratchPool::new();
        let ten = pool.reserve(10);
        let twenty = pool.reserve(20);
        let thirty = pool.reserve(30);
        let forty = pool.reserve(40);

        pool.free_all();

        assert_eq!(pool.reserve(9).address(), ten.address());
        assert_eq!(pool.reserve(21).address(), thirty.address());
        assert_eq!(pool.reserve(40).address(), forty.address());
        assert_eq!(pool.reserve(1).address(), twenty.address());

        let extra_a = pool.reserve(1);
        let extra_b = pool.reserve(1);
        for old in [ten, twenty, thirty, forty] {
            assert_ne!(extra_a.address(), old.address());
            assert_ne!(extra_b.address(), old.address());
        }
        assert_ne!(extra_a.address(), extra_b.address());
        assert_eq!(pool.allocation_count(), 6, "list must grow past its initial capacity");
    }

    #[test]
    fn test_reserve_zeroed_clears_previous_contents() {
        let mut pool = ScratchPool::new();
        let block = pool.reserve(32);
        pool.words_mut(&block).unwrap().fill(u64::MAX);
        pool.free_all();

        let block = pool.reserve_zeroed(32);
        assert!(pool.read_words(block.address(), 4).unwrap().iter().all(|w| *w == 0));
    }

    #[test]
    fn test_typed_views_are_bounds_checked() {
        let mut pool = ScratchPool::new();
        let block = pool.reserve_zeroed(12);
        assert_eq!(pool.words_mut(&block).unwrap().len(), 1);
        assert_eq!(pool.u32s_mut(&block).unwrap().len(), 3);
        pool.u32s_mut(&block).unwrap()[2] = 99;
        assert_eq!(pool.read_u32s(block.address(), 3).unwrap(), &[0, 0, 99]);
        assert!(matches!(
            pool.read(block.address(), 13),
            Err(ScratchError::OutOfBounds { .. })
        ));
        assert!(matches!(pool.read(1, 1), Err(ScratchError::UnknownAddress { .. })));
    }

    #[test]
    fn test_local_pool_is_per_thread() {
        let here = with_local_pool(|pool| pool.reserve(8).address());
        let there = std::thread::spawn(|| with_local_pool(|pool| pool.allocation_count()))
            .join()
            .unwrap();
        assert_eq!(there, 0, "a fresh thread must start with an empty pool");
        with_local_pool(|pool| {
            assert!(pool.read(here, 8).is_ok());
            pool.free_all();
        });
    }
}
