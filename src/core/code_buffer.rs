//! Bounded code buffer with an explicit cursor.
//!
//! Wraps the byte slice of a task's code sub-region. Every append is checked against
//! the slice length, so the cursor can never run past the end of the region.

use crate::core::error::{EncodeError, EncodeResult};
use crate::x64::CodeSink;

pub struct CodeBuffer<'a> {
    code: &'a mut [u8],
    len: usize,
}

impl<'a> CodeBuffer<'a> {
    pub fn new(code: &'a mut [u8]) -> Self {
        Self { code, len: 0 }
    }

    /// Total bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.code.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.code.len() - self.len
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.code[..self.len]
    }
}

impl CodeSink for CodeBuffer<'_> {
    fn position(&self) -> usize {
        self.len
    }

    fn emit(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(EncodeError::BufferFull { needed: bytes.len(), remaining });
        }
        self.code[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}
