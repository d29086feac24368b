//! Virtual file resolution for the schema engine.
//!
//! libxml2 resolves `xs:import`/`xs:include` references by asking its
//! registered input callbacks to match, open, read and close a "file". This
//! module registers one process-wide callback set that serves those calls
//! from the currently bound bundle instead of the filesystem.
//!
//! The registration is global to libxml2, so the binding is a single slot:
//! exactly one bundle may be bound while the engine might issue resolution
//! calls. [`ResolverBinding`] pairs an exclusion lock (serializing schema
//! parsing across orchestrator instances) with RAII clearing of the slot.
//! Read contexts created by `open` hold their own `Arc` of the decompressed
//! buffer, so an open context stays valid even after the binding is dropped.

use std::ffi::CStr;
use std::sync::{Arc, Mutex, MutexGuard, Once};

use libc::{c_char, c_int, c_void};

use crate::bundle::BundleIndex;
use crate::error::{Result, ValidationError};
use crate::libxml2;

static INIT: Once = Once::new();

/// One-time libxml2 init plus input-callback registration.
///
/// Must run before any schema parse or validation. Safe to call repeatedly
/// from any thread.
pub(crate) fn ensure_initialized() {
    INIT.call_once(|| unsafe {
        libxml2::xmlInitParser();
        libxml2::xmlInitGlobals();
        libxml2::xmlRegisterInputCallbacks(
            Some(match_fn),
            Some(open_fn),
            Some(read_fn),
            Some(close_fn),
        );
    });
}

/// The bundle currently served by the resolver callbacks.
struct BoundBundle {
    index: BundleIndex,
    buffer: Arc<Vec<u8>>,
}

/// Serializes `load()` across orchestrator instances: held for the whole
/// bind-parse-unbind window, not just the slot update.
static BINDING_LOCK: Mutex<()> = Mutex::new(());

/// The slot the callbacks consult. Locked only for the duration of a single
/// callback, never across an engine call, so callbacks issued while
/// `BINDING_LOCK` is held cannot deadlock.
static CURRENT: Mutex<Option<BoundBundle>> = Mutex::new(None);

/// Exclusive binding of one bundle to the process-wide resolver.
///
/// Dropping the binding empties the slot and releases the exclusion lock, in
/// that order.
pub(crate) struct ResolverBinding {
    _exclusive: MutexGuard<'static, ()>,
}

impl ResolverBinding {
    pub(crate) fn bind(index: BundleIndex, buffer: Arc<Vec<u8>>) -> Result<Self> {
        ensure_initialized();
        let exclusive = BINDING_LOCK
            .lock()
            .map_err(|_| ValidationError::ResolverLock)?;
        *CURRENT.lock().map_err(|_| ValidationError::ResolverLock)? =
            Some(BoundBundle { index, buffer });
        Ok(Self {
            _exclusive: exclusive,
        })
    }
}

impl Drop for ResolverBinding {
    fn drop(&mut self) {
        if let Ok(mut current) = CURRENT.lock() {
            *current = None;
        }
    }
}

/// Ephemeral cursor over one indexed byte range, created per `open`, advanced
/// by `read`, destroyed by `close`.
struct ReadCtx {
    buffer: Arc<Vec<u8>>,
    offset: usize,
    remaining: usize,
}

unsafe extern "C" fn match_fn(filename: *const c_char) -> c_int {
    if filename.is_null() {
        return 0;
    }
    let Ok(name) = (unsafe { CStr::from_ptr(filename) }).to_str() else {
        return 0;
    };
    match CURRENT.lock() {
        Ok(current) => c_int::from(current.as_ref().is_some_and(|b| b.index.contains(name))),
        Err(_) => 0,
    }
}

unsafe extern "C" fn open_fn(filename: *const c_char) -> *mut c_void {
    if filename.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(name) = (unsafe { CStr::from_ptr(filename) }).to_str() else {
        return std::ptr::null_mut();
    };
    let Ok(current) = CURRENT.lock() else {
        return std::ptr::null_mut();
    };
    // A miss here means the engine skipped its own match step; returning null
    // makes it surface an I/O failure for the load rather than proceeding.
    let Some((bound, range)) = current.as_ref().and_then(|b| Some((b, b.index.get(name)?)))
    else {
        return std::ptr::null_mut();
    };
    let ctx = Box::new(ReadCtx {
        buffer: Arc::clone(&bound.buffer),
        offset: range.start,
        remaining: range.end - range.start,
    });
    Box::into_raw(ctx) as *mut c_void
}

unsafe extern "C" fn read_fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int {
    if context.is_null() || buffer.is_null() || len < 0 {
        return -1;
    }
    let ctx = unsafe { &mut *(context as *mut ReadCtx) };
    let n = (len as usize).min(ctx.remaining);
    unsafe {
        std::ptr::copy_nonoverlapping(ctx.buffer.as_ptr().add(ctx.offset), buffer as *mut u8, n);
    }
    ctx.offset += n;
    ctx.remaining -= n;
    n as c_int
}

unsafe extern "C" fn close_fn(context: *mut c_void) -> c_int {
    if !context.is_null() {
        drop(unsafe { Box::from_raw(context as *mut ReadCtx) });
    }
    0
}
