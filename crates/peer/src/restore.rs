//! In-order reassembly of restored chunks.

use std::{collections::BTreeMap, io::Write};

use bytes::Bytes;
use cairn_primitives::ChunkNo;

/// Writes chunk bodies to `W` in chunk order, whatever order they arrive in.
///
/// Bodies ahead of the next expected chunk are buffered until the gap before
/// them is filled.
#[derive(Debug)]
pub struct RestoreAssembler<W> {
    writer: W,
    total: u64,
    next: u64,
    pending: BTreeMap<u64, Bytes>,
    written: u64,
}

impl<W: Write> RestoreAssembler<W> {
    /// Assembler for a file of `total` chunks.
    pub fn new(writer: W, total: u64) -> Self {
        Self {
            writer,
            total,
            next: 0,
            pending: BTreeMap::new(),
            written: 0,
        }
    }

    /// Take one chunk body, writing out every chunk that is now in order.
    ///
    /// Returns `false` for a chunk that is out of range or already taken.
    pub fn accept(&mut self, chunk_no: ChunkNo, body: Bytes) -> std::io::Result<bool> {
        let chunk_no = u64::from(chunk_no);
        if chunk_no < self.next || chunk_no >= self.total || self.pending.contains_key(&chunk_no)
        {
            return Ok(false);
        }
        self.pending.insert(chunk_no, body);

        while let Some(body) = self.pending.remove(&self.next) {
            self.writer.write_all(&body)?;
            self.written += body.len() as u64;
            self.next += 1;
        }
        Ok(true)
    }

    /// Whether every chunk has been written.
    pub fn is_complete(&self) -> bool {
        self.next == self.total
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
