//! Schema bundle container format.
//!
//! A bundle is an LZ4 block prefixed with its decompressed length (u32 LE).
//! The decompressed payload is self-describing:
//!
//! ```text
//! u32 BE   magic = 0x58534442 ("XSDB")
//! u64 BE   header length (offset where the schema payload region begins)
//! string   bundle name               (u32-BE length prefix + UTF-8 bytes)
//! string   target namespace
//! entry[]  until position == header length:
//!     u8       entrypoint flag (0|1)
//!     u64 BE   start offset, relative to header length
//!     u64 BE   end offset, relative to header length
//!     string   logical name
//! byte[]   schema payload region, [header length, EOF)
//! ```
//!
//! Parsing stops at the first format error; no partial index is ever returned.

use std::collections::HashMap;
use std::ops::Range;

use crate::cursor::ByteCursor;
use crate::error::{BundleError, BundleResult};

/// Magic bytes identifying a decompressed schema bundle ("XSDB").
pub const MAGIC: u32 = 0x5853_4442;

/// Decompress a length-prefixed LZ4 frame into the bundle buffer.
///
/// The first four bytes are the expected decompressed length (little-endian);
/// the rest is one LZ4 block. A codec error, a short input, or a decompressed
/// length that does not match the prefix all abort with
/// [`BundleError::DecompressionFailed`] before any header parsing happens.
pub fn decode_frame(compressed: &[u8]) -> BundleResult<Vec<u8>> {
    let mut cursor = ByteCursor::new(compressed);
    let expected_len = cursor
        .read_u32_le()
        .map_err(|_| BundleError::DecompressionFailed {
            details: "frame shorter than the 4-byte length prefix".to_string(),
        })? as usize;

    let payload = &compressed[cursor.position()..];
    let buffer = lz4_flex::block::decompress(payload, expected_len).map_err(|e| {
        BundleError::DecompressionFailed {
            details: e.to_string(),
        }
    })?;

    if buffer.len() != expected_len {
        return Err(BundleError::DecompressionFailed {
            details: format!(
                "expected {expected_len} decompressed byte(s), codec produced {}",
                buffer.len()
            ),
        });
    }

    Ok(buffer)
}

/// Parsed index of a decompressed bundle: logical name → byte range.
///
/// The index borrows nothing: it holds absolute ranges into the buffer it was
/// parsed from, plus the bundle metadata. Pairing the index back with its
/// buffer is the caller's job (see `resolver::BoundBundle`).
#[derive(Debug, Default)]
pub struct BundleIndex {
    name: String,
    target_ns: String,
    schema_location: String,
    entries: HashMap<String, Range<usize>>,
    entrypoint: Range<usize>,
    schemas: Range<usize>,
}

impl BundleIndex {
    /// Parse the decompressed bundle buffer into an index.
    ///
    /// Entry ranges are stored absolute (header length already added) and
    /// checked against the payload region. Exactly one entry must carry the
    /// entrypoint flag; duplicate logical names keep the last occurrence.
    pub fn parse(buf: &[u8]) -> BundleResult<Self> {
        let mut rdr = ByteCursor::new(buf);

        let magic = rdr.read_u32_be()?;
        if magic != MAGIC {
            return Err(BundleError::BadMagic { found: magic });
        }

        let head_size = rdr.read_u64_be()? as usize;
        let name = rdr.read_string()?;
        let target_ns = rdr.read_string()?;
        let schema_location = format!("{target_ns} {name}");

        let mut entries: HashMap<String, Range<usize>> = HashMap::new();
        let mut entrypoint = None;
        let mut entrypoint_count = 0usize;
        loop {
            match rdr.position() {
                p if p == head_size => break,
                p if p > head_size => {
                    return Err(BundleError::TruncatedHeader {
                        position: p as u64,
                        header_len: head_size as u64,
                    });
                }
                _ => {
                    let is_entrypoint = rdr.read_u8()? == 1;
                    let start = rdr.read_u64_be()? as usize + head_size;
                    let end = rdr.read_u64_be()? as usize + head_size;
                    let entry_name = rdr.read_string()?;
                    if end < start || end > buf.len() {
                        return Err(BundleError::InvalidRange { name: entry_name });
                    }
                    if is_entrypoint {
                        entrypoint = Some(start..end);
                        entrypoint_count += 1;
                    }
                    entries.insert(entry_name, start..end);
                }
            }
        }

        let Some(entrypoint) = entrypoint.filter(|_| entrypoint_count == 1) else {
            return Err(BundleError::EntrypointCount {
                count: entrypoint_count,
            });
        };

        Ok(Self {
            name,
            target_ns,
            schema_location,
            entries,
            entrypoint,
            schemas: head_size..buf.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_ns(&self) -> &str {
        &self.target_ns
    }

    /// The `"<target namespace> <name>"` label used to route documents to
    /// this bundle.
    pub fn schema_location(&self) -> &str {
        &self.schema_location
    }

    /// True iff `name` is a logical name in this bundle.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Absolute byte range of the entry named `name`.
    pub fn get(&self, name: &str) -> Option<Range<usize>> {
        self.entries.get(name).cloned()
    }

    /// Absolute byte range of the entrypoint schema document.
    pub fn entrypoint(&self) -> Range<usize> {
        self.entrypoint.clone()
    }

    /// The whole schema payload region, `[header length, buffer length)`.
    pub fn schemas_region(&self) -> Range<usize> {
        self.schemas.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(logical name, absolute range)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Range<usize>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.clone()))
    }
}
