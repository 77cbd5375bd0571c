//! A named-section binary container.
//!
//! ```text
//! +------------------+
//! | magic (8B)       |  "QWMESH\0\0"
//! | version (4B)     |  little-endian u32
//! | index offset (8B)|  little-endian u64, zero until finished
//! +------------------+
//! | section 1        |
//! | section 2        |
//! | ...              |
//! +------------------+
//! | index            |  count, then (name, offset, length) per section
//! +------------------+
//! ```
//!
//! Sections are assembled in memory and appended with a single write.
//! Inside sections, counts and ids are LEB128 varints,
//! signed values are zig-zag varints and floats are little-endian `f64`.

use std::{
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use crate::MeshError;

pub const MAGIC: &[u8; 8] = b"QWMESH\0\0";
pub const VERSION: u32 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 8 + 4 + 8;
const INDEX_OFFSET_POS: u64 = 12;

/// Where a section lives in the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionEntry {
    pub name: String,
    pub offset: u64,
    pub len: u64,
}

/// Writes sections one at a time and the index on [`finish`][Self::finish].
pub struct ContainerWriter<W: Write + Seek> {
    writer: W,
    entries: Vec<SectionEntry>,
    current_offset: u64,
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Write a header with a placeholder index offset.
    pub fn new(mut writer: W) -> Result<Self, MeshError> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;
        Ok(Self {
            writer,
            entries: Vec::new(),
            current_offset: HEADER_SIZE as u64,
        })
    }

    pub fn write_section(&mut self, name: &str, section: SectionWriter) -> Result<(), MeshError> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(MeshError::Format(format!("section {name} written twice")));
        }
        self.writer.write_all(&section.buf)?;
        let len = section.buf.len() as u64;
        self.entries.push(SectionEntry {
            name: name.to_string(),
            offset: self.current_offset,
            len,
        });
        self.current_offset += len;
        Ok(())
    }

    /// Append the index, patch its offset into the header
    /// and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, MeshError> {
        let index_offset = self.current_offset;

        let mut index = SectionWriter::new();
        index.usize(self.entries.len());
        for entry in &self.entries {
            index.string(&entry.name);
            index.uint(entry.offset);
            index.uint(entry.len);
        }
        self.writer.write_all(&index.buf)?;

        self.writer.seek(SeekFrom::Start(INDEX_OFFSET_POS))?;
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;

        tracing::debug!(sections = self.entries.len(), bytes = index_offset, "container finished");
        Ok(self.writer)
    }
}

/// In-memory payload of one section.
#[derive(Clone, Debug, Default)]
pub struct SectionWriter {
    buf: Vec<u8>,
}

impl SectionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uint(&mut self, mut value: u64) -> &mut Self {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return self;
            }
            self.buf.push(byte | 0x80);
        }
    }

    #[inline]
    pub fn usize(&mut self, value: usize) -> &mut Self {
        self.uint(value as u64)
    }

    pub fn usizes<'a>(&mut self, values: impl IntoIterator<Item = &'a usize>) -> &mut Self {
        for &v in values {
            self.usize(v);
        }
        self
    }

    /// Zig-zag encoded so that small negative values stay short.
    pub fn int(&mut self, value: i64) -> &mut Self {
        self.uint(((value << 1) ^ (value >> 63)) as u64)
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.usize(value.len());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }
}

/// A finished container held in memory.
#[derive(Clone, Debug)]
pub struct Container {
    bytes: Vec<u8>,
    entries: Vec<SectionEntry>,
}

impl Container {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, MeshError> {
        if bytes.len() < HEADER_SIZE || &bytes[..8] != MAGIC {
            return Err(MeshError::Format("not a mesh container".to_string()));
        }
        let mut header = SectionReader::new("header", &bytes[8..HEADER_SIZE]);
        let version = header.u32_le()?;
        if version != VERSION {
            return Err(MeshError::Format(format!(
                "unsupported container version {version}"
            )));
        }
        let index_offset = header.u64_le()?;
        if index_offset == 0 {
            return Err(MeshError::Format(
                "container was never finished".to_string(),
            ));
        }
        let index_bytes = usize::try_from(index_offset)
            .ok()
            .filter(|&o| (HEADER_SIZE..=bytes.len()).contains(&o))
            .map(|o| &bytes[o..])
            .ok_or_else(|| {
                MeshError::Format(format!("index offset {index_offset} out of range"))
            })?;

        let mut index = SectionReader::new("index", index_bytes);
        let count = index.usize()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let entry = SectionEntry {
                name: index.string()?,
                offset: index.uint()?,
                len: index.uint()?,
            };
            let end = entry.offset.checked_add(entry.len);
            if entry.offset < HEADER_SIZE as u64 || end.map_or(true, |end| end > index_offset) {
                return Err(MeshError::Format(format!(
                    "section {} extends past the end of the data",
                    entry.name
                )));
            }
            entries.push(entry);
        }

        Ok(Self { bytes, entries })
    }

    pub fn entries(&self) -> &[SectionEntry] {
        &self.entries
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// A reader over the named section's payload.
    pub fn section<'a>(&'a self, name: &'a str) -> Result<SectionReader<'a>, MeshError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| MeshError::Format(format!("missing section {name}")))?;
        // bounds were checked against the index offset on open
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        Ok(SectionReader::new(name, &self.bytes[start..end]))
    }
}

/// Sequential decoder of one section with truncation checks on every read.
#[derive(Clone, Debug)]
pub struct SectionReader<'a> {
    name: &'a str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(name: &'a str, buf: &'a [u8]) -> Self {
        Self { name, buf, pos: 0 }
    }

    fn truncated(&self) -> MeshError {
        MeshError::Format(format!(
            "section {} truncated at byte {}",
            self.name, self.pos
        ))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MeshError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .and_then(|b| <[u8; N]>::try_from(b).ok())
            .ok_or_else(|| self.truncated())?;
        self.pos += N;
        Ok(bytes)
    }

    fn u32_le(&mut self) -> Result<u32, MeshError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64_le(&mut self) -> Result<u64, MeshError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    pub fn uint(&mut self) -> Result<u64, MeshError> {
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let [byte] = self.take::<1>()?;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(MeshError::Format(format!(
                    "varint overflow in section {}",
                    self.name
                )));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn usize(&mut self) -> Result<usize, MeshError> {
        let value = self.uint()?;
        usize::try_from(value)
            .map_err(|_| MeshError::Format(format!("{value} does not fit in usize")))
    }

    /// A count of items that each take at least one byte,
    /// rejected early if the rest of the section can't hold them.
    pub fn count(&mut self) -> Result<usize, MeshError> {
        let count = self.usize()?;
        if count > self.remaining() {
            return Err(self.truncated());
        }
        Ok(count)
    }

    pub fn usizes(&mut self, count: usize) -> Result<Vec<usize>, MeshError> {
        (0..count).map(|_| self.usize()).collect()
    }

    pub fn int(&mut self) -> Result<i64, MeshError> {
        let raw = self.uint()?;
        Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
    }

    pub fn f64(&mut self) -> Result<f64, MeshError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    pub fn string(&mut self) -> Result<String, MeshError> {
        let len = self.count()?;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| MeshError::Format(format!("invalid utf-8 in section {}", self.name)))
    }

    /// Read a sub-record tag and check that it is the expected one.
    pub fn expect_tag(&mut self, tag: &str) -> Result<(), MeshError> {
        let found = self.string()?;
        if found != tag {
            return Err(MeshError::Format(format!(
                "expected record {tag} in section {}, found {found}",
                self.name
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check that the whole section was consumed.
    pub fn finish(self) -> Result<(), MeshError> {
        if self.remaining() != 0 {
            return Err(MeshError::Format(format!(
                "{} trailing bytes in section {}",
                self.remaining(),
                self.name
            )));
        }
        Ok(())
    }
}
