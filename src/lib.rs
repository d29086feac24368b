//! # xsd-bundle Library
//!
//! Packages a multi-file XML Schema set (one entrypoint plus its imported and
//! included documents) into a single LZ4-compressed binary bundle, and
//! validates XML documents against such bundles without touching a real
//! filesystem: libxml2's cross-file `import`/`include` lookups are served
//! from in-memory byte ranges through a registered virtual resolver.

pub mod bundle;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod diagnostics;
pub mod error;
pub mod libxml2;
pub mod output;
pub mod resolver;
pub mod validator;
pub mod writer;

pub use bundle::{BundleIndex, MAGIC, decode_frame};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use cursor::ByteCursor;
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity};
pub use error::{BundleError, LibXml2Error, Result, ValidationError};
pub use libxml2::XmlSchemaPtr;
pub use output::{FileReport, Output, Summary};
pub use validator::{
    BundleRegistry, SchemaBundleValidator, ValidationOutcome, find_root_schema_location,
};
pub use writer::{
    BundleBuilder, FetchOptions, SchemaEntry, SchemaLocation, SchemaWriter, WriterError,
    bundle_filepath,
};
