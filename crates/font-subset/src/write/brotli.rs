//! Brotli compression of the WOFF2 table data stream.
//!
//! WOFF2 compresses all tables as a single stream, in the table directory order and without
//! the padding between tables. The stream is fed to the encoder directly from the table data
//! of a [`FontWriter`], so it never needs to be assembled in memory.

use std::collections::VecDeque;

use brotli::enc::{backward_references::BrotliEncoderMode, BrotliEncoderParams};

use super::FontWriter;
use crate::WriteError;

const IO_BUFFER_LEN: usize = 4_096;

/// Concatenation of unpadded table data in the table directory order.
struct TableStream<'a> {
    pending: VecDeque<&'a [u8]>,
}

impl<'a> TableStream<'a> {
    fn new(writer: &'a FontWriter) -> Self {
        // Offsets may already include the sfnt header; the first table starts the data.
        let base = writer
            .tables
            .iter()
            .map(|record| record.offset)
            .min()
            .unwrap_or(0);
        let pending = writer
            .tables
            .iter()
            .map(|record| {
                let start = (record.offset - base) as usize;
                &writer.table_data[start..start + record.length as usize]
            })
            .filter(|data| !data.is_empty())
            .collect();
        Self { pending }
    }

    fn len(&self) -> usize {
        self.pending.iter().map(|data| data.len()).sum()
    }
}

impl brotli::CustomRead<()> for TableStream<'_> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ()> {
        let mut filled = 0;
        while filled < buffer.len() {
            let Some(table) = self.pending.front_mut() else {
                break;
            };
            let chunk_len = table.len().min(buffer.len() - filled);
            let (chunk, rest) = table.split_at(chunk_len);
            buffer[filled..filled + chunk_len].copy_from_slice(chunk);
            filled += chunk_len;
            if rest.is_empty() {
                self.pending.pop_front();
            } else {
                *table = rest;
            }
        }
        Ok(filled)
    }
}

#[derive(Default)]
struct CompressedData(Vec<u8>);

impl brotli::CustomWrite<()> for CompressedData {
    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

/// Heap-allocated encoder memory.
#[derive(Debug, Clone)]
struct HeapCells<T>(Box<[T]>);

impl<T> Default for HeapCells<T> {
    fn default() -> Self {
        Self(Box::default())
    }
}

impl<T> brotli::SliceWrapper<T> for HeapCells<T> {
    fn slice(&self) -> &[T] {
        &self.0
    }
}

impl<T> brotli::SliceWrapperMut<T> for HeapCells<T> {
    fn slice_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

#[derive(Debug)]
struct HeapAllocator;

impl<T: Clone + Default> brotli::enc::Allocator<T> for HeapAllocator {
    type AllocatedMemory = HeapCells<T>;

    fn alloc_cell(&mut self, len: usize) -> Self::AllocatedMemory {
        HeapCells(vec![T::default(); len].into_boxed_slice())
    }

    fn free_cell(&mut self, _cells: Self::AllocatedMemory) {}
}

impl brotli::enc::BrotliAlloc for HeapAllocator {}

impl FontWriter {
    pub(super) fn compress_data(&self) -> Result<Vec<u8>, WriteError> {
        let params = BrotliEncoderParams {
            mode: BrotliEncoderMode::BROTLI_MODE_FONT,
            size_hint: TableStream::new(self).len(),
            ..BrotliEncoderParams::default()
        };
        let mut output = CompressedData::default();
        brotli::BrotliCompressCustomIo(
            &mut TableStream::new(self),
            &mut output,
            &mut [0_u8; IO_BUFFER_LEN],
            &mut [0_u8; IO_BUFFER_LEN],
            &params,
            HeapAllocator,
            &mut |_, _, _, _| {},
            (),
        )
        .map_err(|()| WriteError::Compression)?;
        Ok(output.0)
    }
}
