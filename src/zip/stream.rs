use flate2::{Decompress, FlushDecompress, Status};

use crate::error::ArchiveError;
use crate::io::ReadAt;

use super::reader::ArchiveReader;
use super::structures::{CompressionMethod, RawEntry};

/// Bytes requested from the source per read.
const CHUNK_SIZE: usize = 64 * 1024;

enum Decoder {
    Stored,
    Deflate { inflater: Decompress, ended: bool },
}

/// Decompressed byte stream over one archive entry.
///
/// Holds the archive reader borrowed, so the reader cannot advance until the
/// stream is dropped. Size and CRC-32 are verified once the data ends.
pub struct EntryStream<'a, R: ReadAt> {
    archive: &'a ArchiveReader<R>,
    decoder: Decoder,
    /// Next compressed byte to fetch from the source
    offset: u64,
    /// Compressed bytes not yet fetched
    remaining: u64,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    output: Vec<u8>,
    hasher: crc32fast::Hasher,
    expected_crc: u32,
    expected_size: u64,
    produced: u64,
    finished: bool,
}

impl<'a, R: ReadAt> EntryStream<'a, R> {
    pub(crate) fn new(archive: &'a ArchiveReader<R>, entry: &RawEntry, data_offset: u64) -> Self {
        let (decoder, input) = match entry.compression_method {
            CompressionMethod::Deflate => (
                Decoder::Deflate {
                    inflater: Decompress::new(false),
                    ended: false,
                },
                vec![0u8; CHUNK_SIZE],
            ),
            _ => (Decoder::Stored, Vec::new()),
        };

        Self {
            archive,
            decoder,
            offset: data_offset,
            remaining: entry.compressed_size,
            input,
            input_start: 0,
            input_end: 0,
            output: vec![0u8; CHUNK_SIZE],
            hasher: crc32fast::Hasher::new(),
            expected_crc: entry.crc32,
            expected_size: entry.uncompressed_size,
            produced: 0,
            finished: false,
        }
    }

    /// Next chunk of decompressed data, or `None` at the verified end.
    pub async fn next_chunk(&mut self) -> Result<Option<&[u8]>, ArchiveError> {
        if self.finished {
            return Ok(None);
        }

        let n = match self.decoder {
            Decoder::Stored => self.fill_stored().await?,
            Decoder::Deflate { .. } => self.fill_deflated().await?,
        };

        if n == 0 {
            self.finish()?;
            return Ok(None);
        }

        self.produced += n as u64;
        if self.produced > self.expected_size {
            return Err(ArchiveError::SizeMismatch {
                expected: self.expected_size,
                actual: self.produced,
            });
        }
        self.hasher.update(&self.output[..n]);
        Ok(Some(&self.output[..n]))
    }

    /// Drain the rest of the stream into memory.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            data.extend_from_slice(chunk);
        }
        Ok(data)
    }

    async fn fill_stored(&mut self) -> Result<usize, ArchiveError> {
        let n = (self.remaining.min(CHUNK_SIZE as u64)) as usize;
        if n > 0 {
            self.archive
                .read_exact_at(self.offset, &mut self.output[..n])
                .await?;
            self.offset += n as u64;
            self.remaining -= n as u64;
        }
        Ok(n)
    }

    async fn fill_deflated(&mut self) -> Result<usize, ArchiveError> {
        loop {
            if self.input_start == self.input_end && self.remaining > 0 {
                let n = (self.remaining.min(CHUNK_SIZE as u64)) as usize;
                self.archive
                    .read_exact_at(self.offset, &mut self.input[..n])
                    .await?;
                self.offset += n as u64;
                self.remaining -= n as u64;
                self.input_start = 0;
                self.input_end = n;
            }

            let Decoder::Deflate { inflater, ended } = &mut self.decoder else {
                return Ok(0);
            };
            if *ended {
                return Ok(0);
            }

            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater.decompress(
                &self.input[self.input_start..self.input_end],
                &mut self.output,
                FlushDecompress::None,
            )?;
            let consumed = (inflater.total_in() - before_in) as usize;
            let written = (inflater.total_out() - before_out) as usize;
            self.input_start += consumed;

            if status == Status::StreamEnd {
                *ended = true;
                return Ok(written);
            }
            if written > 0 {
                return Ok(written);
            }
            if consumed == 0 && self.input_start == self.input_end && self.remaining == 0 {
                return Err(ArchiveError::InvalidFormat("truncated deflate stream"));
            }
            if consumed == 0 && self.input_start < self.input_end {
                return Err(ArchiveError::InvalidFormat("deflate stream stalled"));
            }
        }
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        self.finished = true;

        if self.produced != self.expected_size {
            return Err(ArchiveError::SizeMismatch {
                expected: self.expected_size,
                actual: self.produced,
            });
        }

        let actual = std::mem::take(&mut self.hasher).finalize();
        if actual != self.expected_crc {
            return Err(ArchiveError::ChecksumMismatch {
                expected: self.expected_crc,
                actual,
            });
        }
        Ok(())
    }
}
