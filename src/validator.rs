//! Bundle-backed validation orchestration.
//!
//! [`SchemaBundleValidator`] walks a bundle through its lifecycle: decompress
//! at construction, then `load()` parses the index, binds it to the process
//! resolver, hands the entrypoint to libxml2 (which pulls any imported or
//! included documents back through the resolver), and keeps only the parsed
//! schema handle. The decompressed buffer and the index are both released as
//! soon as the engine has internalized the schema graph.
//!
//! [`BundleRegistry`] routes documents to the right loaded bundle by the root
//! element's `xsi:schemaLocation` label.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quick_xml::NsReader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::bundle::{BundleIndex, decode_frame};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Result, ValidationError};
use crate::libxml2::{self, XmlSchemaPtr};
use crate::resolver::ResolverBinding;

/// Result of one validate call: the engine's integer result code plus the
/// diagnostics it emitted, in document order.
///
/// A non-zero code with diagnostics is not an error at this level; the caller
/// decides what a finding means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Engine result code; 0 means the document is valid.
    pub code: i32,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.code == 0
    }
}

enum State {
    /// Decompressed but not yet indexed or parsed.
    Loaded { buffer: Vec<u8> },
    /// Schema graph internalized by libxml2; buffer and index released.
    Ready {
        name: String,
        target_ns: String,
        schema_location: String,
        schema: XmlSchemaPtr,
    },
}

/// One loaded schema bundle, driving libxml2 through the virtual resolver.
///
/// Dropping the validator releases the engine's schema handle exactly once.
pub struct SchemaBundleValidator {
    state: State,
}

impl SchemaBundleValidator {
    /// Decompress a bundle frame. No parsing happens yet; call
    /// [`SchemaBundleValidator::load`] to build the index and the schema.
    pub fn new(compressed: &[u8]) -> Result<Self> {
        let buffer = decode_frame(compressed)?;
        Ok(Self {
            state: State::Loaded { buffer },
        })
    }

    /// Parse the bundle index, bind it to the resolver, and let libxml2 parse
    /// the entrypoint schema.
    ///
    /// The resolver binding is process-wide, so concurrent `load()` calls on
    /// different validators serialize here. On any error the validator is
    /// left unusable and the binding is released.
    pub fn load(&mut self) -> Result<()> {
        let State::Loaded { buffer } = &mut self.state else {
            return Err(ValidationError::AlreadyLoaded);
        };
        let buffer = Arc::new(std::mem::take(buffer));

        let index = BundleIndex::parse(&buffer)?;
        let name = index.name().to_string();
        let target_ns = index.target_ns().to_string();
        let schema_location = index.schema_location().to_string();
        let entrypoint = index.entrypoint();

        // The binding (and with it the buffer) must stay alive for the whole
        // parse: libxml2 re-enters the resolver for imports and includes.
        let binding = ResolverBinding::bind(index, Arc::clone(&buffer))?;
        let schema = libxml2::parse_schema_from_memory(&buffer[entrypoint])?;
        drop(binding);

        self.state = State::Ready {
            name,
            target_ns,
            schema_location,
            schema,
        };
        Ok(())
    }

    /// Validate a UTF-8 XML document against the loaded schema.
    ///
    /// Takes `&mut self`: validation contexts are not assumed to be safe
    /// against concurrent use of one schema handle, so callers are serialized
    /// per instance by the borrow checker.
    pub fn validate(&mut self, xml: &[u8]) -> Result<ValidationOutcome> {
        let State::Ready { schema, .. } = &self.state else {
            return Err(ValidationError::NotReady);
        };
        let mut sink = DiagnosticSink::default();
        let code = libxml2::validate_stream(schema, xml, &mut sink)?;
        Ok(ValidationOutcome {
            code,
            diagnostics: sink.into_entries(),
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match &self.state {
            State::Ready { name, .. } => Some(name),
            State::Loaded { .. } => None,
        }
    }

    pub fn target_ns(&self) -> Option<&str> {
        match &self.state {
            State::Ready { target_ns, .. } => Some(target_ns),
            State::Loaded { .. } => None,
        }
    }

    /// The `"<target namespace> <name>"` routing label, once loaded.
    pub fn schema_location(&self) -> Option<&str> {
        match &self.state {
            State::Ready {
                schema_location, ..
            } => Some(schema_location),
            State::Loaded { .. } => None,
        }
    }
}

/// Extract the root element's `xsi:schemaLocation` (or
/// `xsi:noNamespaceSchemaLocation`) from a document.
///
/// A two-token `"namespace path"` value is normalized to
/// `"namespace filename"` so it matches the label a bundle advertises.
pub fn find_root_schema_location(xml: &[u8]) -> Result<String> {
    let mut reader = NsReader::from_reader(xml);
    let mut buf = Vec::new();
    let mut schema_location: Option<String> = None;
    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((_, Event::Start(ref e))) | Ok((_, Event::Empty(ref e))) => {
                schema_location = e.attributes().flatten().find_map(|attr| {
                    let key = attr.key.local_name();
                    if key.as_ref() == b"schemaLocation"
                        || key.as_ref() == b"noNamespaceSchemaLocation"
                    {
                        String::from_utf8(attr.value.to_vec()).ok()
                    } else {
                        None
                    }
                });
                break;
            }
            Ok((_, Event::Eof)) | Err(_) => break,
            _ => (),
        }
        buf.clear();
    }
    schema_location
        .ok_or(ValidationError::NoSchemaLocation)
        .map(|s| {
            if let Some((ns, location)) = s.split_once(' ') {
                if let Some(file_name) = Path::new(location.trim())
                    .file_name()
                    .and_then(|f| f.to_str())
                {
                    return format!("{} {}", ns.trim(), file_name);
                }
            }
            s
        })
}

/// Loaded bundles keyed by their `"<target namespace> <name>"` label.
#[derive(Default)]
pub struct BundleRegistry {
    inner: HashMap<String, SchemaBundleValidator>,
}

impl std::fmt::Debug for BundleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.keys()).finish()
    }
}

impl BundleRegistry {
    /// Load every compressed bundle and register it under its routing label.
    pub fn try_from_iter(
        sources: impl IntoIterator<Item = impl AsRef<[u8]>>,
    ) -> Result<Self> {
        let mut registry = Self::default();
        for source in sources {
            registry.load_bundle(source.as_ref())?;
        }
        Ok(registry)
    }

    /// Load one compressed bundle into the registry, returning its label.
    pub fn load_bundle(&mut self, compressed: &[u8]) -> Result<String> {
        let mut validator = SchemaBundleValidator::new(compressed)?;
        validator.load()?;
        let label = validator
            .schema_location()
            .ok_or(ValidationError::NotReady)?
            .to_string();
        self.inner.insert(label.clone(), validator);
        Ok(label)
    }

    /// Route a document to the bundle its root element names and validate it.
    pub fn validate(&mut self, xml: &[u8]) -> Result<ValidationOutcome> {
        let location = find_root_schema_location(xml)?;
        let Some(validator) = self.inner.get_mut(&location) else {
            return Err(ValidationError::SchemaNotFound(location));
        };
        validator.validate(xml)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Registered routing labels, in arbitrary order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_root_schema_location_two_token() {
        let xml = br#"<?xml version="1.0"?>
<Doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="urn:x schemas/addr.xsd">
</Doc>"#;
        assert_eq!(find_root_schema_location(xml).unwrap(), "urn:x addr.xsd");
    }

    #[test]
    fn test_find_root_schema_location_self_closing_root() {
        let xml = br#"<Doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="urn:x addr.xsd"/>"#;
        assert_eq!(find_root_schema_location(xml).unwrap(), "urn:x addr.xsd");
    }

    #[test]
    fn test_find_root_schema_location_no_namespace() {
        let xml = br#"<Doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:noNamespaceSchemaLocation="addr.xsd"/>"#;
        assert_eq!(find_root_schema_location(xml).unwrap(), "addr.xsd");
    }

    #[test]
    fn test_find_root_schema_location_missing() {
        match find_root_schema_location(b"<Doc/>") {
            Err(ValidationError::NoSchemaLocation) => (),
            other => panic!("Expected NoSchemaLocation, got {other:?}"),
        }
    }

    #[test]
    fn test_find_root_schema_location_only_root_is_scanned() {
        // A schemaLocation on a nested element must not be picked up.
        let xml = br#"<Doc><Inner xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="urn:x inner.xsd"/></Doc>"#;
        assert!(matches!(
            find_root_schema_location(xml),
            Err(ValidationError::NoSchemaLocation)
        ));
    }

    #[test]
    fn test_outcome_is_valid() {
        let ok = ValidationOutcome {
            code: 0,
            diagnostics: Vec::new(),
        };
        assert!(ok.is_valid());

        let bad = ValidationOutcome {
            code: 1845,
            diagnostics: Vec::new(),
        };
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_validate_before_load_fails() {
        let bundle = crate::writer::SchemaWriter::default();
        let mut map = std::collections::BTreeMap::new();
        map.insert(
            "a.xsd".parse().unwrap(),
            crate::writer::SchemaEntry::new("urn:a".to_string(), true, "<x/>".to_string()),
        );
        let compressed = bundle.write(map).unwrap();

        let mut validator = SchemaBundleValidator::new(&compressed).unwrap();
        assert!(!validator.is_ready());
        assert!(validator.schema_location().is_none());
        match validator.validate(b"<x/>") {
            Err(ValidationError::NotReady) => (),
            other => panic!("Expected NotReady, got {other:?}"),
        }
    }

    #[test]
    fn test_registry_unknown_location() {
        let mut registry = BundleRegistry::default();
        let xml = br#"<Doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="urn:zzz nope.xsd"/>"#;
        match registry.validate(xml) {
            Err(ValidationError::SchemaNotFound(loc)) => assert_eq!(loc, "urn:zzz nope.xsd"),
            other => panic!("Expected SchemaNotFound, got {other:?}"),
        }
    }
}
