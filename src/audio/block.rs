// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The ring of output blocks shared between the render loop and the sink.
//!
//! A block is either sitting in its slot (writable) or owned by the sink
//! (submitted). Moving the `Block` value between the two sides is what keeps
//! either of them from touching memory the other one is using.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

/// A fixed-size chunk of interleaved 16-bit frames.
pub struct Block {
    index: usize,
    samples: Vec<i16>,
}

impl Block {
    fn new(index: usize, len: usize) -> Self {
        Self {
            index,
            samples: vec![0; len],
        }
    }

    /// The ring slot this block belongs to.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("len", &self.samples.len())
            .finish()
    }
}

struct RingState {
    /// `None` while the block is out at the sink.
    slots: Vec<Option<Block>>,
    /// Next slot to claim.
    next: usize,
    stopping: bool,
}

/// Blocks plus the free-block counter the render loop waits on.
pub(crate) struct BlockRing {
    state: Mutex<RingState>,
    block_available: Condvar,
    block_count: usize,
    /// Writable blocks, in [0, block_count]. Only changed with `state` held.
    free: AtomicUsize,
    claimed: AtomicU64,
    underruns: AtomicU64,
}

impl BlockRing {
    pub(crate) fn new(block_count: usize, block_len: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                slots: (0..block_count)
                    .map(|index| Some(Block::new(index, block_len)))
                    .collect(),
                next: 0,
                stopping: false,
            }),
            block_available: Condvar::new(),
            block_count,
            free: AtomicUsize::new(block_count),
            claimed: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    /// Waits until a block is writable and takes it, starting the search at the
    /// round-robin position. Returns `None` once a stop has been requested.
    pub(crate) fn claim(&self) -> Option<Block> {
        let mut state = self.state.lock();
        while self.free.load(Ordering::Acquire) == 0 && !state.stopping {
            self.block_available.wait(&mut state);
        }
        if state.stopping {
            return None;
        }

        let count = state.slots.len();
        let start = state.next;
        let Some(index) = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| state.slots[index].is_some())
        else {
            error!(
                free = self.free.load(Ordering::Acquire),
                "Free block count out of sync with ring"
            );
            return None;
        };

        // Every block already back from the sink means the device has nothing
        // queued. Only meaningful once the ring has been filled once.
        let free_before = self.free.fetch_sub(1, Ordering::AcqRel);
        let claimed = self.claimed.fetch_add(1, Ordering::Relaxed);
        if free_before == self.block_count && claimed >= self.block_count as u64 {
            let underruns = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(underruns, "Output underrun");
        }

        state.next = (index + 1) % count;
        state.slots[index].take()
    }

    /// Puts a block back into its slot and wakes the render loop.
    pub(crate) fn release(&self, block: Block) {
        let mut state = self.state.lock();
        let index = block.index;
        let Some(slot) = state.slots.get_mut(index) else {
            error!(index, "Completed block does not belong to this ring");
            return;
        };
        if slot.is_some() {
            error!(index, "Block completed twice");
            return;
        }

        *slot = Some(block);
        self.free.fetch_add(1, Ordering::AcqRel);
        self.block_available.notify_one();
    }

    /// Makes any current or future `claim` return `None`.
    pub(crate) fn request_stop(&self) {
        let mut state = self.state.lock();
        state.stopping = true;
        self.block_available.notify_all();
    }

    pub(crate) fn free_blocks(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    pub(crate) fn blocks_claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed)
    }

    pub(crate) fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Handed to a sink on open; returns played blocks to the ring.
#[derive(Clone)]
pub struct BlockCompletion {
    ring: Arc<BlockRing>,
}

impl BlockCompletion {
    pub(crate) fn new(ring: Arc<BlockRing>) -> Self {
        Self { ring }
    }

    /// Marks the block as played. Safe to call from any thread.
    pub fn complete(&self, block: Block) {
        self.ring.release(block);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_claims_round_robin() {
        let ring = BlockRing::new(3, 4);
        let indices: Vec<usize> = (0..3).map(|_| ring.claim().unwrap().index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(ring.free_blocks(), 0);
        assert_eq!(ring.blocks_claimed(), 3);
    }

    #[test]
    fn test_block_len() {
        let ring = BlockRing::new(1, 1024);
        assert_eq!(ring.claim().unwrap().samples().len(), 1024);
    }

    #[test]
    fn test_release_restores_free_count() {
        let ring = BlockRing::new(2, 4);
        let first = ring.claim().unwrap();
        let second = ring.claim().unwrap();
        assert_eq!(ring.free_blocks(), 0);

        ring.release(first);
        assert_eq!(ring.free_blocks(), 1);
        ring.release(second);
        assert_eq!(ring.free_blocks(), 2);

        // Round robin continues where it left off.
        assert_eq!(ring.claim().unwrap().index(), 0);
    }

    #[test]
    fn test_out_of_order_release() {
        let ring = BlockRing::new(3, 4);
        let blocks: Vec<Block> = (0..3).map(|_| ring.claim().unwrap()).collect();
        let mut blocks = blocks.into_iter();
        let first = blocks.next().unwrap();
        let second = blocks.next().unwrap();

        // Slot 0 is next in line but only slot 1 is back.
        ring.release(second);
        assert_eq!(ring.claim().unwrap().index(), 1);
        ring.release(first);
        assert_eq!(ring.claim().unwrap().index(), 0);
    }

    #[test]
    fn test_double_release_is_ignored() {
        let ring = BlockRing::new(1, 4);
        let block = ring.claim().unwrap();
        ring.release(block);
        ring.release(Block::new(0, 4));
        assert_eq!(ring.free_blocks(), 1);
    }

    #[test]
    fn test_claim_waits_for_completion() {
        let ring = Arc::new(BlockRing::new(1, 4));
        let block = ring.claim().unwrap();

        let join = {
            let ring = ring.clone();
            thread::spawn(move || ring.claim().map(|block| block.index()))
        };

        thread::sleep(Duration::from_millis(20));
        BlockCompletion::new(ring.clone()).complete(block);
        assert_eq!(join.join().unwrap(), Some(0));
    }

    #[test]
    fn test_stop_wakes_waiting_claim() {
        let ring = Arc::new(BlockRing::new(1, 4));
        let _held = ring.claim().unwrap();

        let join = {
            let ring = ring.clone();
            thread::spawn(move || ring.claim().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        ring.request_stop();
        assert!(join.join().unwrap());
    }

    #[test]
    fn test_claim_after_stop_returns_none() {
        let ring = BlockRing::new(2, 4);
        ring.request_stop();
        assert!(ring.claim().is_none());
    }

    #[test]
    fn test_underrun_counted_when_ring_drains() {
        let ring = BlockRing::new(2, 4);

        // Filling the ring the first time is not an underrun.
        let first = ring.claim().unwrap();
        let second = ring.claim().unwrap();
        assert_eq!(ring.underruns(), 0);

        // One block still queued at the device: no underrun.
        ring.release(first);
        let first = ring.claim().unwrap();
        assert_eq!(ring.underruns(), 0);

        // The device played everything before the next claim.
        ring.release(first);
        ring.release(second);
        ring.claim().unwrap();
        assert_eq!(ring.underruns(), 1);
    }
}
