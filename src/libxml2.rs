//! LibXML2 FFI wrapper.
//!
//! Direct FFI against libxml2 for XML Schema parsing and stream validation.
//! The Rust XML ecosystem has no mature XSD validator, so the schema engine
//! stays libxml2, reached through a thin, explicitly-managed binding:
//!
//! - opaque handle types with RAII wrappers (`XmlSchemaPtr` frees the parsed
//!   schema exactly once, however many clones exist);
//! - structured validation errors captured into a [`DiagnosticSink`] instead
//!   of stderr;
//! - the global input-callback registration used for virtual file resolution
//!   lives in [`crate::resolver`], which also owns the one-time init.
//!
//! Schema parsing is NOT thread-safe in libxml2 and is additionally entangled
//! with the process-wide resolver binding here, so parsing is serialized by
//! the resolver lock. Validation contexts are created per call.

use std::marker::PhantomData;
use std::sync::Arc;

use libc::{c_char, c_int, c_void};

use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity};
use crate::error::{LibXml2Error, LibXml2Result};

/// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInputBuffer {
    _private: [u8; 0],
}

/// `xmlCharEncoding.XML_CHAR_ENCODING_UTF8`
pub(crate) const XML_CHAR_ENCODING_UTF8: c_int = 1;

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

/// Callback set consulted by libxml2 whenever it opens an external entity.
pub type XmlInputMatchCallback = Option<unsafe extern "C" fn(filename: *const c_char) -> c_int>;
pub type XmlInputOpenCallback =
    Option<unsafe extern "C" fn(filename: *const c_char) -> *mut c_void>;
pub type XmlInputReadCallback =
    Option<unsafe extern "C" fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int>;
pub type XmlInputCloseCallback = Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Virtual input registration
    pub fn xmlRegisterInputCallbacks(
        match_func: XmlInputMatchCallback,
        open_func: XmlInputOpenCallback,
        read_func: XmlInputReadCallback,
        close_func: XmlInputCloseCallback,
    ) -> c_int;

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;

    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);

    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // In-memory document input
    pub fn xmlParserInputBufferCreateMem(
        mem: *const c_char,
        size: c_int,
        enc: c_int,
    ) -> *mut XmlParserInputBuffer;
    pub fn xmlFreeParserInputBuffer(input: *mut XmlParserInputBuffer);

    pub fn xmlSchemaValidateStream(
        ctxt: *mut XmlSchemaValidCtxt,
        input: *mut XmlParserInputBuffer,
        enc: c_int,
        sax: *mut c_void,
        user_data: *mut c_void,
    ) -> c_int;
}

/// Callback for libxml2 to report validation errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    let sink = unsafe { &mut *(user_data as *mut DiagnosticSink) };

    if error.is_null() {
        return;
    }
    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return;
    }
    let c_str = unsafe { std::ffi::CStr::from_ptr(msg_ptr) };
    if let Ok(s) = c_str.to_str() {
        let line = unsafe { (*error).line }.max(0) as u32;
        let severity = Severity::from_level(unsafe { (*error).level });
        sink.push(Diagnostic {
            severity,
            line,
            message: s.trim().to_string(),
        });
    }
}

/// Thread-safe wrapper for a libxml2 schema pointer with proper resource
/// management.
///
/// The schema is freed exactly once when the last clone drops, and the raw
/// pointer never escapes with ownership.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documentation states that xmlSchema structures are
// thread-safe for reading after parsing. See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// Create a new XmlSchemaPtr from a raw pointer
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - The pointer is valid and points to a properly initialized xmlSchema
    /// - The pointer was allocated by libxml2 and should be freed with xmlSchemaFree
    /// - No other code will free this pointer
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    /// Get the raw pointer for FFI calls
    ///
    /// # Safety
    ///
    /// The returned pointer is only valid as long as this XmlSchemaPtr exists.
    /// The caller must not free this pointer.
    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    /// Check if the schema pointer is valid (non-null)
    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        // The Arc ensures this Drop runs exactly once for each schema.
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Parse an XML schema from a memory buffer.
///
/// The caller must have run [`crate::resolver::ensure_initialized`] first;
/// when the buffer references other schema documents by logical name, the
/// resolver binding must also be active so libxml2's open calls land in the
/// bundle instead of the filesystem.
pub(crate) fn parse_schema_from_memory(schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
    unsafe {
        let parser_ctxt = xmlSchemaNewMemParserCtxt(
            schema_data.as_ptr() as *const c_char,
            schema_data.len() as c_int,
        );

        if parser_ctxt.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }

        let schema_ptr = xmlSchemaParse(parser_ctxt);

        // Always free the parser context
        xmlSchemaFreeParserCtxt(parser_ctxt);

        if schema_ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        XmlSchemaPtr::from_raw(schema_ptr)
    }
}

/// Validate an in-memory UTF-8 document against a parsed schema, routing
/// structured errors into `sink`.
///
/// Returns the engine's result code: `0` means valid, `> 0` means the
/// document violated the schema (the violations are in the sink). A negative
/// code is an internal engine failure and comes back as an error.
pub(crate) fn validate_stream(
    schema: &XmlSchemaPtr,
    xml: &[u8],
    sink: &mut DiagnosticSink,
) -> LibXml2Result<i32> {
    unsafe {
        let input = xmlParserInputBufferCreateMem(
            xml.as_ptr() as *const c_char,
            xml.len() as c_int,
            XML_CHAR_ENCODING_UTF8,
        );
        if input.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }

        let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
        if valid_ctxt.is_null() {
            xmlFreeParserInputBuffer(input);
            return Err(LibXml2Error::ValidationContextFailed);
        }

        xmlSchemaSetValidStructuredErrors(
            valid_ctxt,
            Some(structured_error_callback),
            sink as *mut DiagnosticSink as *mut c_void,
        );

        // The stream call takes ownership of `input` and releases it.
        let code = xmlSchemaValidateStream(
            valid_ctxt,
            input,
            XML_CHAR_ENCODING_UTF8,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );

        xmlSchemaFreeValidCtxt(valid_ctxt);

        if code < 0 {
            return Err(LibXml2Error::InternalError { code });
        }
        Ok(code)
    }
}
