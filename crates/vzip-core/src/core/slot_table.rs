use std::sync::Mutex;

use crate::buffer::PooledBuffer;
use crate::core::sync::lock_unpoisoned;
use crate::error::VzipError;
use crate::types::Result;

#[derive(Debug, Default)]
struct SlotInput {
    buffer: Option<PooledBuffer>,
    len: usize,
    filled: bool,
}

#[derive(Debug, Default)]
struct SlotOutput {
    buffer: Vec<u8>,
    len: usize,
    stored: bool,
}

/// Input and output halves of one frame, each behind its own lock.
#[derive(Debug, Default)]
struct Slot {
    input: Mutex<SlotInput>,
    output: Mutex<SlotOutput>,
}

/// One slot per frame, addressed by `order - 1`.
///
/// Producers only touch the input half and consumers only the output half,
/// so a slot never has two writers on the same lock. Lengths are reported
/// only after the owning stage has written them.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Allocates `len` empty slots.
    pub fn new(len: usize) -> Result<Self> {
        let bytes = len.saturating_mul(std::mem::size_of::<Slot>());
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| VzipError::Allocation { bytes })?;
        slots.extend((0..len).map(|_| Slot::default()));
        Ok(Self { slots })
    }

    /// Number of slots, one per frame.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` for a run with no frames.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Installs a filled input buffer and returns its length.
    pub fn fill_input(&self, index: usize, buffer: PooledBuffer) -> Result<usize> {
        let slot = self.slot(index)?;
        let mut input = lock_unpoisoned(&slot.input);
        if input.filled {
            return Err(VzipError::Slot {
                index,
                reason: "input was already filled",
            });
        }
        input.len = buffer.len();
        input.buffer = Some(buffer);
        input.filled = true;
        Ok(input.len)
    }

    /// Moves the input buffer out of the slot. Succeeds once per slot.
    pub fn take_input(&self, index: usize) -> Result<PooledBuffer> {
        let slot = self.slot(index)?;
        let mut input = lock_unpoisoned(&slot.input);
        if !input.filled {
            return Err(VzipError::Slot {
                index,
                reason: "input was never filled",
            });
        }
        let Some(buffer) = input.buffer.take() else {
            return Err(VzipError::Slot {
                index,
                reason: "input was already taken",
            });
        };
        Ok(buffer)
    }

    /// Length of the filled input, or `None` before the producer fills it.
    pub fn input_len(&self, index: usize) -> Result<Option<usize>> {
        let slot = self.slot(index)?;
        let input = lock_unpoisoned(&slot.input);
        Ok(input.filled.then_some(input.len))
    }

    /// Stores the compressed bytes for a slot and returns their length.
    pub fn store_output(&self, index: usize, buffer: Vec<u8>) -> Result<usize> {
        let slot = self.slot(index)?;
        let mut output = lock_unpoisoned(&slot.output);
        if output.stored {
            return Err(VzipError::Slot {
                index,
                reason: "output was already stored",
            });
        }
        output.len = buffer.len();
        output.buffer = buffer;
        output.stored = true;
        Ok(output.len)
    }

    /// Length of the stored output, or `None` before the consumer stores it.
    pub fn output_len(&self, index: usize) -> Result<Option<usize>> {
        let slot = self.slot(index)?;
        let output = lock_unpoisoned(&slot.output);
        Ok(output.stored.then_some(output.len))
    }

    /// Moves the compressed bytes out of the slot.
    pub fn take_output(&self, index: usize) -> Result<Vec<u8>> {
        let slot = self.slot(index)?;
        let mut output = lock_unpoisoned(&slot.output);
        if !output.stored {
            return Err(VzipError::Slot {
                index,
                reason: "output was never stored",
            });
        }
        Ok(std::mem::take(&mut output.buffer))
    }

    /// True once a slot's output has been stored.
    pub fn is_complete(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| lock_unpoisoned(&slot.output).stored)
    }

    /// Number of slots whose output has been stored.
    pub fn completed(&self) -> usize {
        (0..self.slots.len())
            .filter(|&index| self.is_complete(index))
            .count()
    }

    fn slot(&self, index: usize) -> Result<&Slot> {
        match self.slots.get(index) {
            Some(slot) => Ok(slot),
            None => Err(VzipError::Slot {
                index,
                reason: "index is outside the slot table",
            }),
        }
    }
}
