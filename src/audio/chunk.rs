//! Rendered audio chunks and the single-slot block buffer
//!
//! The render loop holds at most one [`AudioChunk`] at a time. Chunks share
//! their memory block through [`Bytes`], so dropping a chunk releases its
//! reference on the block.

use bytes::Bytes;

use crate::error::SinkError;

/// A window into a reference-counted memory block produced by the host
#[derive(Debug, Clone, Default)]
pub struct AudioChunk {
    block: Bytes,
    index: usize,
    length: usize,
}

impl AudioChunk {
    /// Create a chunk covering `length` bytes of `block` starting at `index`
    pub fn new(block: Bytes, index: usize, length: usize) -> Result<Self, SinkError> {
        if length > 0 && index.checked_add(length).map_or(true, |end| end > block.len()) {
            return Err(SinkError::InvalidChunk {
                index,
                length,
                capacity: block.len(),
            });
        }
        Ok(Self {
            block,
            index,
            length,
        })
    }

    /// Chunk spanning the whole block
    pub fn from_block(block: Bytes) -> Self {
        let length = block.len();
        Self {
            block,
            index: 0,
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The audible bytes of the chunk
    pub fn as_slice(&self) -> &[u8] {
        if self.length == 0 {
            return &[];
        }
        &self.block[self.index..self.index + self.length]
    }
}

/// Holds the one pending chunk of the render loop
#[derive(Debug, Default)]
pub struct ChunkSlot {
    pending: Option<AudioChunk>,
}

impl ChunkSlot {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.as_ref().map_or(true, AudioChunk::is_empty)
    }

    /// Store a freshly rendered chunk; an empty chunk leaves the slot empty
    pub fn fill(&mut self, chunk: AudioChunk) {
        debug_assert!(self.is_empty(), "chunk slot already holds a chunk");
        self.pending = if chunk.is_empty() { None } else { Some(chunk) };
    }

    /// Move the pending chunk out; it is released when the caller drops it
    pub fn take(&mut self) -> Option<AudioChunk> {
        self.pending.take()
    }

    /// Drop the pending chunk, if any
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
