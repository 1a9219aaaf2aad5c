//! Exported C entry points.
//!
//! Every function here returns 0 on success and -1 on any marshaling
//! failure, after printing the reason through the host. Panics are caught
//! and reported the same way; they never cross into the caller.

use crate::call::{Call, CompiledPipeline};
use crate::capabilities::{SetterHooks, CAPABILITIES};
use crate::config::BridgeConfig;
use crate::error::{MarshalError, Result};
use crate::host::{HostRuntime, MexApi};
use crate::library::ProcessSymbols;
use crate::signature::PipelineSignature;
use mexpipe_abi::{FilterMetadata, MpStatus, MxArray, PipelineArgvFn};
use mexpipe_logging::{init_logging, set_runtime_log_hook, LoggingOptions};
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;

pub use mexpipe_abi::mexpipe_abi_version;

static CONFIG: OnceCell<BridgeConfig> = OnceCell::new();

/// Configuration for the exported entry points, loaded on first use.
/// Logging is initialized at the same time.
fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(|| {
        let (config, load_error) = match BridgeConfig::load() {
            Ok(config) => (config, None),
            Err(err) => (BridgeConfig::default(), Some(err)),
        };
        init_bridge_logging(&config);
        if let Some(err) = load_error {
            log::warn!("Ignoring configuration: {err:#}");
        }
        config
    })
}

fn init_bridge_logging(config: &BridgeConfig) {
    let guard = init_logging(LoggingOptions {
        filter: Some(config.logging.level.clone()),
    });
    if config.logging.forward_to_host {
        let installed = set_runtime_log_hook(|record| {
            if let Some(api) = CAPABILITIES.get() {
                api.print(&format!(
                    "[{}] {}: {}\n",
                    record.level, record.target, record.message
                ));
            }
        });
        if !installed {
            log::debug!("log hook already installed; host forwarding unchanged");
        }
    }
    if !guard.is_global() {
        log::debug!("a global subscriber was already set; keeping it");
    }
}

/// Bind the host API from the current process image.
fn bind_process() -> Result<&'static MexApi> {
    if let Some(api) = CAPABILITIES.get() {
        return Ok(api);
    }
    let config = config();
    let symbols = ProcessSymbols::open()?;
    let hooks = SetterHooks::new(&symbols, &config.hooks.print_setter, &config.hooks.error_setter);
    // SAFETY: the process image exports the host API under these names
    // when running as an extension.
    unsafe { CAPABILITIES.bind(&symbols, &hooks, config.api) }
}

// Runtime messages usually carry their own newline; print exactly one.
fn error_line(message: &str) -> String {
    format!("Error: {}\n", message.trim_end())
}

/// Print through the host when bound, otherwise through the logger.
fn emit(text: &str, is_error: bool) {
    match CAPABILITIES.get() {
        Some(api) => api.print(text),
        None if is_error => log::error!("{}", text.trim_end()),
        None => log::info!("{}", text.trim_end()),
    }
}

fn report(err: &MarshalError) {
    emit(&error_line(&err.to_string()), true);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn guarded<F>(f: F) -> c_int
where
    F: FnOnce() -> Result<c_int>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            report(&err);
            MpStatus::Error.code()
        }
        Err(payload) => {
            report(&MarshalError::Internal(panic_message(payload.as_ref())));
            MpStatus::Error.code()
        }
    }
}

unsafe fn message_text(message: *const c_char) -> Option<String> {
    if message.is_null() {
        return None;
    }
    Some(CStr::from_ptr(message).to_string_lossy().into_owned())
}

unsafe fn host_arguments<'a>(count: usize, prhs: *const *const MxArray) -> Result<Vec<&'a MxArray>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if prhs.is_null() {
        return Err(MarshalError::NullArgument { index: 0 });
    }
    std::slice::from_raw_parts(prhs, count)
        .iter()
        .enumerate()
        .map(|(index, &array)| array.as_ref().ok_or(MarshalError::NullArgument { index }))
        .collect()
}

unsafe fn call_from_host(
    pipeline: Option<PipelineArgvFn>,
    metadata: *const FilterMetadata,
    nlhs: c_int,
    plhs: *mut *mut MxArray,
    nrhs: c_int,
    prhs: *const *const MxArray,
) -> Result<c_int> {
    let entry = pipeline.ok_or_else(|| MarshalError::InvalidMetadata("null pipeline entry point".to_string()))?;
    let signature = PipelineSignature::from_raw(metadata)?;

    let nlhs = usize::try_from(nlhs).unwrap_or(0);
    let nrhs = usize::try_from(nrhs).unwrap_or(0);
    if nlhs > 0 && plhs.is_null() {
        return Err(MarshalError::NullReturnSlots);
    }
    let args = host_arguments(nrhs, prhs)?;

    let mut returns: Vec<Option<NonNull<MxArray>>> = vec![None; nlhs];
    let mut pipeline = CompiledPipeline::new(entry);
    let result = Call::new(&signature).run::<MexApi, _, _>(bind_process, &mut pipeline, &mut returns, &args);

    // The caller owns whatever was created, success or not.
    for (index, slot) in returns.iter().enumerate() {
        if let Some(array) = slot {
            *plhs.add(index) = array.as_ptr();
        }
    }
    result
}

/// Bind the host API and install the pipeline's diagnostic sinks.
///
/// Idempotent; later calls return 0 without resolving anything.
#[no_mangle]
pub extern "C" fn mexpipe_init(_user_context: *mut c_void) -> c_int {
    guarded(|| bind_process().map(|_| MpStatus::Ok.code()))
}

/// Marshal host arrays into a call of `pipeline`.
///
/// Returns the pipeline's status, or -1 when marshaling failed. When `nlhs`
/// is 1, `plhs[0]` receives a 1x1 int32 array holding the same status.
///
/// # Safety
///
/// `metadata` must describe `pipeline`; `prhs` must hold `nrhs` host array
/// handles and `plhs` room for `nlhs` handles.
#[no_mangle]
pub unsafe extern "C" fn mexpipe_call_pipeline(
    _user_context: *mut c_void,
    pipeline: Option<PipelineArgvFn>,
    metadata: *const FilterMetadata,
    nlhs: c_int,
    plhs: *mut *mut MxArray,
    nrhs: c_int,
    prhs: *const *const MxArray,
) -> c_int {
    guarded(|| call_from_host(pipeline, metadata, nlhs, plhs, nrhs, prhs))
}

/// Print sink installed into the pipeline runtime.
///
/// # Safety
///
/// `message` must be null or a null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mexpipe_print(_user_context: *mut c_void, message: *const c_char) {
    if let Some(text) = message_text(message) {
        let _ = catch_unwind(|| emit(&text, false));
    }
}

/// Error sink installed into the pipeline runtime. Only prints; the host's
/// abort primitives are never called from here.
///
/// # Safety
///
/// `message` must be null or a null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mexpipe_error(_user_context: *mut c_void, message: *const c_char) {
    if let Some(text) = message_text(message) {
        let _ = catch_unwind(|| emit(&error_line(&text), true));
    }
}
