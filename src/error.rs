use thiserror::Error;

/// Errors produced while decoding a schema bundle from its binary form
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("invalid bundle magic: expected 0x58534442, found {found:#010x}")]
    BadMagic { found: u32 },

    #[error("truncated bundle header: position {position} overshoots declared header length {header_len}")]
    TruncatedHeader { position: u64, header_len: u64 },

    #[error("read of {requested} byte(s) at offset {offset} passes the end of the buffer ({len} bytes)")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        len: usize,
    },

    #[error("string field at offset {offset} is not valid UTF-8")]
    InvalidString { offset: usize },

    #[error("decompression failed: {details}")]
    DecompressionFailed { details: String },

    #[error("bundle must declare exactly one entrypoint, found {count}")]
    EntrypointCount { count: usize },

    #[error("entry '{name}' declares a range outside the schema payload region")]
    InvalidRange { name: String },
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("validation context creation failed")]
    ValidationContextFailed,

    #[error("memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("schema validation internal error: code {code}")]
    InternalError { code: i32 },
}

/// Main error type covering bundle loading, validation and routing
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    LibXml2(#[from] LibXml2Error),

    #[error("unable to lock the schema resolver binding")]
    ResolverLock,

    #[error("bundle is not loaded; call load() first")]
    NotReady,

    #[error("bundle is already loaded")]
    AlreadyLoaded,

    #[error("document declares no xsi:schemaLocation or xsi:noNamespaceSchemaLocation")]
    NoSchemaLocation,

    #[error("no loaded bundle matches schema location '{0}'")]
    SchemaNotFound(String),
}

/// Result type alias for bundle decoding
pub type BundleResult<T> = std::result::Result<T, BundleError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_error_display() {
        let bad_magic = BundleError::BadMagic { found: 0xdeadbeef };
        assert!(bad_magic.to_string().contains("0xdeadbeef"));
        assert!(bad_magic.to_string().contains("0x58534442"));

        let truncated = BundleError::TruncatedHeader {
            position: 120,
            header_len: 100,
        };
        assert!(truncated.to_string().contains("120"));
        assert!(truncated.to_string().contains("100"));

        let oob = BundleError::OutOfBounds {
            offset: 8,
            requested: 4,
            len: 10,
        };
        assert!(oob.to_string().contains("offset 8"));

        let count = BundleError::EntrypointCount { count: 2 };
        assert!(count.to_string().contains("exactly one entrypoint"));
        assert!(count.to_string().contains('2'));
    }

    #[test]
    fn test_bundle_error_conversion() {
        let bundle_error = BundleError::BadMagic { found: 0 };
        let validation_error: ValidationError = bundle_error.into();

        match validation_error {
            ValidationError::Bundle(BundleError::BadMagic { .. }) => (),
            other => panic!("Expected ValidationError::Bundle, got {other:?}"),
        }
    }

    #[test]
    fn test_libxml2_error_conversion() {
        let libxml2_error = LibXml2Error::SchemaParseFailed;
        let validation_error: ValidationError = libxml2_error.into();

        match validation_error {
            ValidationError::LibXml2(LibXml2Error::SchemaParseFailed) => (),
            other => panic!("Expected ValidationError::LibXml2, got {other:?}"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let validation_error = ValidationError::Io(io_error);

        let source = validation_error.source().expect("source preserved");
        assert_eq!(source.to_string(), "File not found");
    }

    #[test]
    fn test_schema_not_found_display() {
        let error = ValidationError::SchemaNotFound("urn:x addr.xsd".to_string());
        assert!(error.to_string().contains("urn:x addr.xsd"));
    }
}
