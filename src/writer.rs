//! Bundle authoring: packaging a multi-file XSD set into a `.xsdb` bundle.
//!
//! [`SchemaWriter`] emits the exact inverse of the reader's wire format, and
//! [`BundleBuilder`] drives it: starting from an entrypoint schema (local
//! path or URL), it recursively collects every `xs:import`/`xs:include`
//! target, fetches remote documents through a flat on-disk cache, and writes
//! one compressed bundle per registered entrypoint.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};
use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use reqwest::Url;
use thiserror::Error;

use crate::bundle::MAGIC;

const XSD_NAMESPACE: &[u8] = b"http://www.w3.org/2001/XMLSchema";

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error while scanning '{location}': {details}")]
    Scan { location: String, details: String },

    #[error("schema location '{0}' has no usable file name")]
    InvalidLocation(String),

    #[error("bundle must declare exactly one entrypoint, found {0}")]
    EntrypointCount(usize),
}

pub type WriterResult<T> = std::result::Result<T, WriterError>;

fn create_uuid(b: &[u8]) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, b)
        .as_simple()
        .to_string()
}

/// Default output path for a bundle: `<dir>/<uuid5(target namespace)>.xsdb`.
pub fn bundle_filepath<P: AsRef<Path>>(dir: P, target_namespace: &str) -> PathBuf {
    dir.as_ref()
        .join(format!("{}.xsdb", create_uuid(target_namespace.as_bytes())))
}

/// Where a schema document lives: a local file or an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaLocation {
    Path(PathBuf),
    Url(Url),
}

impl SchemaLocation {
    /// The logical name this document gets inside a bundle: the file name for
    /// paths, the full URL for remote documents. This is the exact string an
    /// `xs:import` must use for the virtual resolver to find it again.
    pub fn logical_name(&self) -> WriterResult<String> {
        match self {
            Self::Url(u) => Ok(u.to_string()),
            Self::Path(p) => p
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| WriterError::InvalidLocation(p.display().to_string())),
        }
    }

    /// Resolve a `schemaLocation` reference relative to this document.
    pub fn try_join(&self, other: &str) -> WriterResult<Self> {
        Ok(match self {
            Self::Url(u) => Self::Url(u.join(other)?),
            Self::Path(p) => Self::Path(
                p.parent().unwrap_or_else(|| Path::new(".")).join(other),
            ),
        })
    }
}

impl std::fmt::Display for SchemaLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(u) => u.fmt(f),
            Self::Path(p) => p.display().fmt(f),
        }
    }
}

impl std::str::FromStr for SchemaLocation {
    type Err = WriterError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.starts_with("http") {
            SchemaLocation::Url(s.parse()?)
        } else {
            SchemaLocation::Path(PathBuf::from(s))
        })
    }
}

/// One schema document queued for bundling.
#[derive(Debug)]
pub struct SchemaEntry {
    target_namespace: String,
    entrypoint: bool,
    content: String,
}

impl SchemaEntry {
    pub fn new(target_namespace: String, entrypoint: bool, content: String) -> Self {
        Self {
            target_namespace,
            entrypoint,
            content,
        }
    }
}

/// Serializer for the bundle wire format.
#[derive(Default)]
pub struct SchemaWriter {
    w: std::io::Cursor<Vec<u8>>,
}

impl SchemaWriter {
    /// Write the collected schema set as a compressed bundle.
    ///
    /// The bundle name and target namespace come from the entrypoint entry;
    /// exactly one entry must be flagged as entrypoint, matching what the
    /// reader enforces.
    pub fn write(mut self, map: BTreeMap<SchemaLocation, SchemaEntry>) -> WriterResult<Vec<u8>> {
        let m: Vec<(String, SchemaEntry)> = map
            .into_iter()
            .map(|(k, v)| Ok((k.logical_name()?, v)))
            .collect::<WriterResult<_>>()?;

        let entrypoints = m.iter().filter(|(_, v)| v.entrypoint).count();
        if entrypoints != 1 {
            return Err(WriterError::EntrypointCount(entrypoints));
        }
        let Some((entrypoint_name, entrypoint)) = m
            .iter()
            .find(|(_, v)| v.entrypoint)
            .map(|(name, v)| (name.as_str(), v))
        else {
            return Err(WriterError::EntrypointCount(0));
        };

        let initial_head_size =
            4 + 8 + 4 + entrypoint_name.len() + 4 + entrypoint.target_namespace.len();
        let head_size = m.iter().fold(initial_head_size, |state, (name, _)| {
            state + 1 + 8 + 8 + 4 + name.len()
        });

        self.w.write_u32::<BigEndian>(MAGIC)?;
        self.w.write_u64::<BigEndian>(head_size as u64)?;
        self.w
            .write_u32::<BigEndian>(entrypoint_name.len() as u32)?;
        self.w.write_all(entrypoint_name.as_bytes())?;
        self.w
            .write_u32::<BigEndian>(entrypoint.target_namespace.len() as u32)?;
        self.w
            .write_all(entrypoint.target_namespace.as_bytes())?;

        let mut pos = 0u64;
        for (name, v) in m.iter() {
            let end = pos + v.content.len() as u64;
            self.w.write_u8(u8::from(v.entrypoint))?;
            self.w.write_u64::<BigEndian>(pos)?; // start, relative to header end
            self.w.write_u64::<BigEndian>(end)?;
            self.w.write_u32::<BigEndian>(name.len() as u32)?;
            self.w.write_all(name.as_bytes())?;
            pos = end;
        }
        for (_, v) in m.iter() {
            self.w.write_all(v.content.as_bytes())?;
        }
        self.w.flush()?;
        Ok(lz4_flex::block::compress_prepend_size(&self.w.into_inner()))
    }
}

/// What a scan of one XSD document yields: its target namespace and the
/// `schemaLocation` attributes of its imports and includes.
#[derive(Debug, Default)]
pub(crate) struct XsdScan {
    pub target_namespace: String,
    pub references: Vec<String>,
}

/// Scan an XSD document for its target namespace and import/include targets.
pub(crate) fn scan_schema(location: &str, content: &str) -> WriterResult<XsdScan> {
    let mut reader = NsReader::from_str(content);
    let mut scan = XsdScan::default();
    loop {
        let event = reader
            .read_resolved_event()
            .map_err(|e| WriterError::Scan {
                location: location.to_string(),
                details: e.to_string(),
            })?;
        match event {
            (ResolveResult::Bound(ns), Event::Start(e) | Event::Empty(e))
                if ns.into_inner() == XSD_NAMESPACE =>
            {
                match e.local_name().as_ref() {
                    b"schema" => {
                        scan.target_namespace = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.local_name().as_ref() == b"targetNamespace")
                            .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
                            .unwrap_or_default();
                    }
                    b"import" | b"include" => {
                        if let Some(reference) = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.local_name().as_ref() == b"schemaLocation")
                            .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
                        {
                            scan.references.push(reference);
                        }
                    }
                    _ => {}
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }
    Ok(scan)
}

/// Network settings for remote schema fetches during packing.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub retry_attempts: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_attempts: 2,
        }
    }
}

struct PendingSchema {
    location: SchemaLocation,
    entrypoint: bool,
    filename: Option<PathBuf>,
}

/// Collects a schema closure and writes one bundle per registered entrypoint.
pub struct BundleBuilder {
    out_dir: PathBuf,
    cache_dir: PathBuf,
    fetch: FetchOptions,
    input: Vec<PendingSchema>,
}

impl BundleBuilder {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_owned(),
            cache_dir: out_dir.as_ref().join("cache"),
            fetch: FetchOptions::default(),
            input: Vec::new(),
        }
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        path.as_ref().clone_into(&mut self.cache_dir);
        self
    }

    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    /// Register an entrypoint schema; its transitive imports and includes are
    /// collected automatically when the builder saves.
    pub fn register(&mut self, url_or_path: &str) -> WriterResult<()> {
        self.input.push(PendingSchema {
            location: url_or_path.parse()?,
            entrypoint: true,
            filename: None,
        });
        Ok(())
    }

    /// Register an entrypoint schema with an explicit output file name.
    pub fn register_with_filename<P: AsRef<Path>>(
        &mut self,
        url_or_path: &str,
        filename: P,
    ) -> WriterResult<()> {
        self.input.push(PendingSchema {
            location: url_or_path.parse()?,
            entrypoint: true,
            filename: Some(filename.as_ref().to_owned()),
        });
        Ok(())
    }

    fn get_content(&self, location: &SchemaLocation) -> WriterResult<String> {
        match location {
            SchemaLocation::Path(path) => Ok(std::fs::read_to_string(path)?),
            SchemaLocation::Url(url) => {
                let cached_file = self.cache_dir.join(create_uuid(url.as_str().as_bytes()));
                if cached_file.exists() {
                    return Ok(std::fs::read_to_string(&cached_file)?);
                }
                let client = reqwest::blocking::Client::builder()
                    .timeout(self.fetch.timeout)
                    .build()?;
                let mut attempt = 0;
                let body = loop {
                    match client
                        .get(url.clone())
                        .send()
                        .and_then(|r| r.error_for_status())
                        .and_then(|r| r.text())
                    {
                        Ok(body) => break body,
                        Err(_) if attempt < self.fetch.retry_attempts => {
                            attempt += 1;
                        }
                        Err(e) => return Err(e.into()),
                    }
                };
                std::fs::write(&cached_file, &body)?;
                Ok(body)
            }
        }
    }

    /// Collect every registered schema closure and write the bundles.
    ///
    /// Returns the paths of the bundle files written, one per registered
    /// entrypoint.
    pub fn save(self) -> WriterResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.out_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;

        let mut written = Vec::new();
        for input in &self.input {
            let mut schemas: BTreeMap<SchemaLocation, SchemaEntry> = BTreeMap::new();
            let mut queue = vec![(input.location.clone(), input.entrypoint)];
            let mut filepath = input.filename.clone();

            while let Some((location, entrypoint)) = queue.pop() {
                if schemas.contains_key(&location) {
                    continue;
                }
                let content = self.get_content(&location)?;
                let scan = scan_schema(&location.to_string(), &content)?;

                if entrypoint && filepath.is_none() {
                    filepath = Some(bundle_filepath(&self.out_dir, &scan.target_namespace));
                }
                for reference in &scan.references {
                    // References resolve relative to the document that made
                    // them, absolute URLs stand alone.
                    let child = if reference.starts_with("http") {
                        reference.parse()?
                    } else {
                        location.try_join(reference)?
                    };
                    queue.push((child, false));
                }
                schemas.insert(
                    location,
                    SchemaEntry::new(scan.target_namespace, entrypoint, content),
                );
            }

            let filepath =
                filepath.ok_or_else(|| WriterError::InvalidLocation(input.location.to_string()))?;
            std::fs::write(&filepath, SchemaWriter::default().write(schemas)?)?;
            written.push(filepath);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleIndex, decode_frame};

    const ADDR_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:x">
    <xs:import schemaLocation="types.xsd"/>
    <xs:include schemaLocation="common/base.xsd"/>
</xs:schema>"#;

    #[test]
    fn test_scan_schema_collects_references() {
        let scan = scan_schema("addr.xsd", ADDR_XSD).unwrap();
        assert_eq!(scan.target_namespace, "urn:x");
        assert_eq!(scan.references, vec!["types.xsd", "common/base.xsd"]);
    }

    #[test]
    fn test_scan_schema_no_references() {
        let scan = scan_schema(
            "x.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:y"/>"#,
        )
        .unwrap();
        assert_eq!(scan.target_namespace, "urn:y");
        assert!(scan.references.is_empty());
    }

    #[test]
    fn test_scan_schema_ignores_foreign_namespaces() {
        let scan = scan_schema(
            "x.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:o="urn:other">
                <o:import schemaLocation="nope.xsd"/>
            </xs:schema>"#,
        )
        .unwrap();
        assert!(scan.references.is_empty());
    }

    #[test]
    fn test_scan_schema_malformed() {
        assert!(matches!(
            scan_schema("broken.xsd", "<xs:schema"),
            Err(WriterError::Scan { .. })
        ));
    }

    #[test]
    fn test_write_then_parse_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert(
            "addr.xsd".parse().unwrap(),
            SchemaEntry::new("urn:x".to_string(), true, "<entry/>".to_string()),
        );
        map.insert(
            "types.xsd".parse().unwrap(),
            SchemaEntry::new("urn:x".to_string(), false, "<types/>".to_string()),
        );

        let compressed = SchemaWriter::default().write(map).unwrap();
        let buffer = decode_frame(&compressed).unwrap();
        let index = BundleIndex::parse(&buffer).unwrap();

        assert_eq!(index.name(), "addr.xsd");
        assert_eq!(index.target_ns(), "urn:x");
        assert_eq!(index.schema_location(), "urn:x addr.xsd");
        assert_eq!(index.len(), 2);
        assert_eq!(&buffer[index.entrypoint()], b"<entry/>");
        assert_eq!(&buffer[index.get("types.xsd").unwrap()], b"<types/>");
    }

    #[test]
    fn test_write_requires_exactly_one_entrypoint() {
        let mut map = BTreeMap::new();
        map.insert(
            "a.xsd".parse::<SchemaLocation>().unwrap(),
            SchemaEntry::new("urn:a".to_string(), false, "<a/>".to_string()),
        );
        match SchemaWriter::default().write(map) {
            Err(WriterError::EntrypointCount(0)) => (),
            other => panic!("Expected EntrypointCount(0), got {other:?}"),
        }

        let mut map = BTreeMap::new();
        map.insert(
            "a.xsd".parse::<SchemaLocation>().unwrap(),
            SchemaEntry::new("urn:a".to_string(), true, "<a/>".to_string()),
        );
        map.insert(
            "b.xsd".parse::<SchemaLocation>().unwrap(),
            SchemaEntry::new("urn:a".to_string(), true, "<b/>".to_string()),
        );
        match SchemaWriter::default().write(map) {
            Err(WriterError::EntrypointCount(2)) => (),
            other => panic!("Expected EntrypointCount(2), got {other:?}"),
        }
    }

    #[test]
    fn test_schema_location_parsing() {
        assert!(matches!(
            "http://example.com/a.xsd".parse::<SchemaLocation>().unwrap(),
            SchemaLocation::Url(_)
        ));
        assert!(matches!(
            "schemas/a.xsd".parse::<SchemaLocation>().unwrap(),
            SchemaLocation::Path(_)
        ));
    }

    #[test]
    fn test_schema_location_logical_name() {
        let path: SchemaLocation = "schemas/addr.xsd".parse().unwrap();
        assert_eq!(path.logical_name().unwrap(), "addr.xsd");

        let url: SchemaLocation = "http://example.com/xsd/addr.xsd".parse().unwrap();
        assert_eq!(url.logical_name().unwrap(), "http://example.com/xsd/addr.xsd");
    }

    #[test]
    fn test_schema_location_try_join() {
        let base: SchemaLocation = "schemas/addr.xsd".parse().unwrap();
        let joined = base.try_join("types.xsd").unwrap();
        assert_eq!(joined.to_string(), "schemas/types.xsd");

        let base: SchemaLocation = "http://example.com/xsd/addr.xsd".parse().unwrap();
        let joined = base.try_join("types.xsd").unwrap();
        assert_eq!(joined.to_string(), "http://example.com/xsd/types.xsd");
    }

    #[test]
    fn test_bundle_filepath_is_stable() {
        let a = bundle_filepath("/tmp/out", "urn:x");
        let b = bundle_filepath("/tmp/out", "urn:x");
        let c = bundle_filepath("/tmp/out", "urn:y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.extension().is_some_and(|e| e == "xsdb"));
    }
}
