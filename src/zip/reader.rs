//! Sequential ZIP archive reader.
//!
//! ## Reading Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory in one request
//! 4. Hand out one Central Directory record per [`ArchiveReader::next_entry`]
//!    call, and open each entry's data through its Local File Header
//!
//! Entries are pulled, never pushed. An [`EntryStream`] borrows the reader
//! mutably, so the next record cannot be pulled while a stream is alive.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ArchiveError;
use crate::io::ReadAt;

use super::stream::EntryStream;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Closes an [`ArchiveReader`] from outside the task that owns it.
#[derive(Debug, Clone)]
pub struct ArchiveCloser(Arc<AtomicBool>);

impl ArchiveCloser {
    /// Close the reader. Idempotent.
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Pull-based reader over a ZIP archive.
///
/// Produces a lazy, finite, non-restartable sequence of [`RawEntry`]
/// records in Central Directory order.
pub struct ArchiveReader<R: ReadAt> {
    /// The underlying data source
    source: Arc<R>,
    closed: Arc<AtomicBool>,
    central_directory: Vec<u8>,
    /// Offset of the next record inside `central_directory`
    position: usize,
    entry_count: u64,
    yielded: u64,
}

impl<R: ReadAt> ArchiveReader<R> {
    /// Locate and load the Central Directory of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidFormat`] if no valid EOCD exists or the
    /// directory lies outside the source, and [`ArchiveError::Io`] on read
    /// failures.
    pub async fn open(source: Arc<R>) -> Result<Self, ArchiveError> {
        let mut reader = Self {
            source,
            closed: Arc::new(AtomicBool::new(false)),
            central_directory: Vec::new(),
            position: 0,
            entry_count: 0,
            yielded: 0,
        };

        let (eocd, eocd_offset) = reader.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = reader.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let in_bounds = cd_offset
            .checked_add(cd_size)
            .is_some_and(|end| end <= eocd_offset);
        if !in_bounds || total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            return Err(ArchiveError::InvalidFormat("central directory out of bounds"));
        }

        // cd_size is bounded by eocd_offset, so never larger than the source.
        let mut central_directory = vec![0u8; cd_size as usize];
        reader.read_exact_at(cd_offset, &mut central_directory).await?;

        reader.central_directory = central_directory;
        reader.entry_count = total_entries;
        Ok(reader)
    }

    /// Find and parse the End of Central Directory record.
    async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64), ArchiveError> {
        let size = self.source.size();
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if size < eocd_size {
            return Err(ArchiveError::InvalidFormat("file too small"));
        }

        // Common case: no archive comment.
        let offset = size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        // Otherwise search backwards through the possible comment area.
        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(size);
        let search_start = size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EndOfCentralDirectory::SIZE + comment_len == buf.len() {
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(ArchiveError::InvalidFormat("end of central directory not found"))
    }

    /// Read the ZIP64 End of Central Directory record, located through the
    /// locator that sits immediately before the regular EOCD.
    async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD, ArchiveError> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(ArchiveError::InvalidFormat("missing ZIP64 locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Total number of entries recorded in the archive.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// A handle that can close this reader from another task.
    pub fn closer(&self) -> ArchiveCloser {
        ArchiveCloser(self.closed.clone())
    }

    /// Close the reader. Every later read fails with [`ArchiveError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pull the next Central Directory record, or `None` once all
    /// [`entry_count`](Self::entry_count) records have been produced.
    pub fn next_entry(&mut self) -> Result<Option<RawEntry>, ArchiveError> {
        if self.is_closed() {
            return Err(ArchiveError::Closed);
        }
        if self.yielded >= self.entry_count {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.central_directory[self.position..]);
        let entry = parse_cdfh(&mut cursor)
            .map_err(|_| ArchiveError::InvalidFormat("truncated central directory header"))??;
        let consumed = cursor.position() as usize;

        self.position += consumed;
        self.yielded += 1;
        Ok(Some(entry))
    }

    /// Open a decompressed stream over `entry`'s data.
    ///
    /// # Errors
    ///
    /// Fails for encrypted entries, compression methods other than STORED
    /// and DEFLATE, a bad Local File Header, or data outside the source.
    pub async fn open_entry(&mut self, entry: &RawEntry) -> Result<EntryStream<'_, R>, ArchiveError> {
        if entry.is_encrypted() {
            return Err(ArchiveError::Encrypted);
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(ArchiveError::UnsupportedCompression(method));
        }

        let mut lfh_buf = [0u8; LFH_SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::InvalidFormat("bad local file header"));
        }

        // Name and extra field lengths sit at fixed positions in the LFH and
        // may differ from the Central Directory copy.
        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;
        let data_offset = entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > self.source.size())
        {
            return Err(ArchiveError::InvalidFormat("entry data out of bounds"));
        }

        Ok(EntryStream::new(self, entry, data_offset))
    }

    /// Positional read that honours [`close`](Self::close).
    pub(crate) async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ArchiveError> {
        if self.is_closed() {
            return Err(ArchiveError::Closed);
        }
        self.source.read_exact_at(offset, buf).await?;
        if self.is_closed() {
            return Err(ArchiveError::Closed);
        }
        Ok(())
    }
}

/// Parse a Central Directory File Header.
///
/// The outer error means the buffer ended mid-record; the inner one reports
/// a structurally invalid record.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Result<RawEntry, ArchiveError>> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Ok(Err(ArchiveError::InvalidFormat("bad central directory header")));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attributes = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut raw_name = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut raw_name)?;

    let mut extra_bytes = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra_bytes)?;

    let mut comment = vec![0u8; file_comment_length as usize];
    cursor.read_exact(&mut comment)?;

    // ZIP64 extended information (0x0001) only carries the fields whose
    // header value is saturated, in this fixed order.
    let mut extra = Cursor::new(extra_bytes.as_slice());
    let extra_len = extra.get_ref().len() as u64;
    while extra_len.saturating_sub(extra.position()) >= 4 {
        let header_id = extra.read_u16::<LittleEndian>()?;
        let field_size = extra.read_u16::<LittleEndian>()? as u64;
        let field_end = extra.position() + field_size;
        if field_end > extra_len {
            return Ok(Err(ArchiveError::InvalidFormat("extra field overruns header")));
        }

        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                uncompressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                compressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                lfh_offset = extra.read_u64::<LittleEndian>()?;
            }
        }
        extra.set_position(field_end);
    }

    Ok(Ok(RawEntry {
        raw_name,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        external_attributes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryReader;
    use crate::zip::testutil::{ArchiveBuilder, Method};

    fn reader(data: Vec<u8>) -> Arc<MemoryReader> {
        Arc::new(MemoryReader {
            data,
            max_read: 4096,
        })
    }

    #[tokio::test]
    async fn empty_archive_has_no_entries() {
        let data = ArchiveBuilder::new().finish();
        let mut archive = ArchiveReader::open(reader(data)).await.unwrap();
        assert_eq!(archive.entry_count(), 0);
        assert!(archive.next_entry().unwrap().is_none());
    }

    #[tokio::test]
    async fn yields_entries_in_order_with_raw_names() {
        let data = ArchiveBuilder::new()
            .directory("docs/")
            .file("docs/caf\u{e9}.txt", b"hello", Method::Deflate)
            .entry(b"raw\\name".to_vec(), b"x", 0o100755 << 16, Method::Stored)
            .finish();
        let mut archive = ArchiveReader::open(reader(data)).await.unwrap();
        assert_eq!(archive.entry_count(), 3);

        let first = archive.next_entry().unwrap().unwrap();
        assert_eq!(first.raw_name, b"docs/");
        let second = archive.next_entry().unwrap().unwrap();
        assert_eq!(second.raw_name, "docs/caf\u{e9}.txt".as_bytes());
        assert_eq!(second.compression_method, CompressionMethod::Deflate);
        let third = archive.next_entry().unwrap().unwrap();
        assert_eq!(third.raw_name, b"raw\\name");
        assert_eq!(third.external_attributes >> 16, 0o100755);

        assert!(archive.next_entry().unwrap().is_none());
        assert!(archive.next_entry().unwrap().is_none());
    }

    #[tokio::test]
    async fn finds_eocd_behind_comment() {
        let data = ArchiveBuilder::new()
            .file("a.txt", b"a", Method::Stored)
            .comment(b"archive comment PK\x05\x06 with a fake signature")
            .finish();
        let mut archive = ArchiveReader::open(reader(data)).await.unwrap();
        assert_eq!(archive.entry_count(), 1);
        assert_eq!(archive.next_entry().unwrap().unwrap().raw_name, b"a.txt");
    }

    #[tokio::test]
    async fn rejects_non_zip() {
        let data = b"definitely not a zip archive, just some bytes".to_vec();
        assert!(matches!(
            ArchiveReader::open(reader(data)).await,
            Err(ArchiveError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn closed_reader_refuses_to_advance() {
        let data = ArchiveBuilder::new()
            .file("a.txt", b"a", Method::Stored)
            .finish();
        let mut archive = ArchiveReader::open(reader(data)).await.unwrap();
        let closer = archive.closer();
        closer.close();
        closer.close();
        assert!(archive.is_closed());
        assert!(matches!(archive.next_entry(), Err(ArchiveError::Closed)));
    }

    #[test]
    fn overlong_extra_field_is_invalid() {
        let mut header = Vec::new();
        header.extend_from_slice(CDFH_SIGNATURE);
        header.extend_from_slice(&[0u8; 24]);
        header.extend_from_slice(&1u16.to_le_bytes()); // name length
        header.extend_from_slice(&4u16.to_le_bytes()); // extra length
        header.extend_from_slice(&[0u8; 14]);
        header.push(b'a');
        // Declares 255 bytes of data but carries none.
        header.extend_from_slice(&[0x99, 0x99, 0xFF, 0x00]);

        let mut cursor = Cursor::new(header.as_slice());
        assert!(matches!(
            parse_cdfh(&mut cursor).unwrap(),
            Err(ArchiveError::InvalidFormat("extra field overruns header"))
        ));
    }

    #[tokio::test]
    async fn encrypted_entry_is_rejected() {
        let data = ArchiveBuilder::new()
            .file("secret.bin", b"data", Method::Stored)
            .finish();
        let mut archive = ArchiveReader::open(reader(data)).await.unwrap();
        let mut entry = archive.next_entry().unwrap().unwrap();
        entry.flags |= FLAG_ENCRYPTED;
        assert!(matches!(
            archive.open_entry(&entry).await,
            Err(ArchiveError::Encrypted)
        ));
    }
}
