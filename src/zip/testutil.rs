//! Minimal in-memory ZIP writer for building test fixtures.
//!
//! Entries are written without the UTF-8 language-encoding flag and with
//! whatever external attributes the test asks for, which lets tests model
//! archives produced on any platform.
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::DeflateEncoder;

#[derive(Debug, Clone, Copy)]
pub enum Method {
    Stored,
    Deflate,
}

pub const DIR_ATTRS: u32 = 0o040755 << 16;
pub const FILE_ATTRS: u32 = 0o100644 << 16;
pub const SYMLINK_ATTRS: u32 = 0o120777 << 16;

#[derive(Default)]
pub struct ArchiveBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    comment: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(name, b"", DIR_ATTRS, Method::Stored)
    }

    pub fn file(self, name: &str, data: &[u8], method: Method) -> Self {
        self.entry(name, data, FILE_ATTRS, method)
    }

    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.entry(name, target.as_bytes(), SYMLINK_ATTRS, Method::Stored)
    }

    pub fn entry(self, name: impl AsRef<[u8]>, data: &[u8], attrs: u32, method: Method) -> Self {
        let crc = crc32fast::hash(data);
        self.entry_with_crc(name, data, attrs, method, crc)
    }

    /// Like [`entry`](Self::entry) but records an arbitrary CRC-32.
    pub fn entry_with_crc(
        mut self,
        name: impl AsRef<[u8]>,
        data: &[u8],
        attrs: u32,
        method: Method,
        crc: u32,
    ) -> Self {
        let name = name.as_ref();
        let (method_id, payload) = match method {
            Method::Stored => (0u16, data.to_vec()),
            Method::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data).unwrap();
                (8u16, encoder.finish().unwrap())
            }
        };
        let version_made_by: u16 = if attrs == 0 { 20 } else { (3 << 8) | 20 };
        let offset = self.body.len() as u32;

        let body = &mut self.body;
        body.extend_from_slice(b"PK\x03\x04");
        body.extend_from_slice(&20u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&method_id.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0x21u16.to_le_bytes());
        body.extend_from_slice(&crc.to_le_bytes());
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&(name.len() as u16).to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(name);
        body.extend_from_slice(&payload);

        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        cd.extend_from_slice(&version_made_by.to_le_bytes());
        cd.extend_from_slice(&20u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&method_id.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0x21u16.to_le_bytes());
        cd.extend_from_slice(&crc.to_le_bytes());
        cd.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(data.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes()); // extra
        cd.extend_from_slice(&0u16.to_le_bytes()); // comment
        cd.extend_from_slice(&0u16.to_le_bytes()); // disk
        cd.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        cd.extend_from_slice(&attrs.to_le_bytes());
        cd.extend_from_slice(&offset.to_le_bytes());
        cd.extend_from_slice(name);

        self.count += 1;
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.body;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.comment);
        out
    }

    pub fn write_to(self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.finish())
    }
}
