//! Command Buffer Module
//!
//! A command buffer is a byte region carved from a pool, with a write
//! cursor and a signed remaining-capacity counter. The pool hands out all of
//! its free space on acquisition and takes back whatever the submission did
//! not use.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hwcmd::HwCommand;

/// Alignment of the start of every buffer carved from a pool.
pub const COMMAND_BUFFER_ALIGNMENT: usize = 64;

/// Identifier the pool uses to track an outstanding buffer.
pub type BufferId = u32;

/// Cursor state used to undo a partially built stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub offset: usize,
    pub remaining: isize,
}

pub struct CommandBuffer {
    id: BufferId,
    gpu_address: u64,
    data: Vec<u8>,
    offset: usize,
    remaining: isize,
}

impl CommandBuffer {
    pub fn new(id: BufferId, gpu_address: u64, capacity: usize) -> Self {
        Self {
            id,
            gpu_address,
            data: vec![0; capacity],
            offset: 0,
            remaining: capacity as isize,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// GPU address of the first byte.
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left; negative once an append overran the region.
    pub fn remaining(&self) -> isize {
        self.remaining
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.offset]
    }

    /// Claims `bytes` at the cursor. On shortfall the counter is still
    /// charged so the overrun shows up at rollback; the cursor never moves
    /// past the region.
    pub fn reserve(&mut self, bytes: usize) -> Result<&mut [u8]> {
        let available = self.remaining;
        self.remaining -= bytes as isize;
        if self.remaining < 0 || available < 0 {
            return Err(Error::CommandBufferOverflow {
                requested: bytes,
                remaining: available,
            });
        }
        let start = self.offset;
        self.offset += bytes;
        Ok(&mut self.data[start..self.offset])
    }

    pub fn append<T: HwCommand>(&mut self, cmd: &T) -> Result<()> {
        let slot = self.reserve(T::BYTE_SIZE)?;
        cmd.write_to(slot);
        Ok(())
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            offset: self.offset,
            remaining: self.remaining,
        }
    }

    /// Restores the cursor and counter to `snapshot`, returning the number
    /// of bytes the stream overran the region by, if any.
    pub fn rollback(&mut self, snapshot: CursorSnapshot) -> Option<usize> {
        let overflow = (self.remaining < 0).then(|| self.remaining.unsigned_abs());
        self.data[snapshot.offset..self.offset].fill(0);
        self.offset = snapshot.offset;
        self.remaining = snapshot.remaining;
        overflow
    }

    /// Shrinks the region to the bytes written, returning how many were
    /// given up.
    pub fn trim_to_used(&mut self) -> usize {
        let unused = self.data.len() - self.offset;
        self.data.truncate(self.offset);
        self.remaining = 0;
        unused
    }

    /// Consumes the buffer, yielding its written bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.offset);
        self.data
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("id", &self.id)
            .field("gpu_address", &format_args!("{:#x}", self.gpu_address))
            .field("capacity", &self.data.len())
            .field("offset", &self.offset)
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Linear allocator over one GPU-visible region. Space is handed out from a
/// single cursor and reclaimed when every outstanding buffer is released.
pub struct CommandBufferPool {
    base_address: u64,
    capacity: usize,
    cursor: usize,
    outstanding: HashMap<BufferId, (usize, usize)>,
    next_buffer_id: BufferId,
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl CommandBufferPool {
    pub fn new(base_address: u64, capacity: usize) -> Self {
        Self {
            base_address,
            capacity,
            cursor: 0,
            outstanding: HashMap::new(),
            next_buffer_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free bytes at the cursor.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.cursor)
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Hands out every free byte, provided at least `min_bytes` are free.
    pub fn acquire(&mut self, min_bytes: usize) -> Result<CommandBuffer> {
        if self.outstanding.is_empty() {
            self.cursor = 0;
        }
        let available = self.available();
        if available < min_bytes || available == 0 {
            return Err(Error::Backend(format!(
                "command buffer pool exhausted: {} bytes free, {} needed",
                available, min_bytes
            )));
        }

        let id = self.next_buffer_id;
        self.next_buffer_id = self.next_buffer_id.wrapping_add(1).max(1);

        let start = self.cursor;
        self.outstanding.insert(id, (start, available));
        self.cursor = self.capacity;

        debug!(
            "Acquired command buffer {}: {} bytes at offset {:#x}",
            id, available, start
        );
        Ok(CommandBuffer::new(id, self.base_address + start as u64, available))
    }

    /// Gives the unwritten tail of `buf` back to the pool.
    pub fn return_unused(&mut self, buf: &mut CommandBuffer) {
        let Some(region) = self.outstanding.get_mut(&buf.id()) else {
            warn!("Returning capacity of unknown command buffer {}", buf.id());
            return;
        };
        let unused = buf.trim_to_used();
        region.1 = buf.capacity();
        let end = align_up(region.0 + region.1, COMMAND_BUFFER_ALIGNMENT).min(self.capacity);
        if self.cursor == self.capacity && end <= self.capacity {
            self.cursor = end;
        }
        debug!("Command buffer {} returned {} unused bytes", buf.id(), unused);
    }

    /// Marks a buffer as no longer referenced by the GPU.
    pub fn release(&mut self, id: BufferId) {
        if self.outstanding.remove(&id).is_none() {
            warn!("Released unknown command buffer {}", id);
        }
        if self.outstanding.is_empty() {
            self.cursor = 0;
        }
    }
}
