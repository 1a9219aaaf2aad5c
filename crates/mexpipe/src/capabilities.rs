//! One-time binding of the host API and of the pipeline's diagnostic sinks.
//!
//! Binding is all-or-nothing: a table is only cached once every host symbol
//! resolved and both sinks were installed. A failed bind caches nothing, so
//! the next call tries again.

use crate::error::{MarshalError, Result};
use crate::host::{ApiFlavour, MexApi};
use mexpipe_abi::{SinkFn, SinkSetterFn};
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Lookup-by-name service for exported symbols.
pub trait SymbolResolver {
    fn resolve(&self, name: &str) -> Option<NonNull<c_void>>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<NonNull<c_void>>,
{
    fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
        self(name)
    }
}

/// Installs print and error sinks into the pipeline runtime.
pub trait PipelineHooks {
    fn install(&self, print: SinkFn, error: SinkFn) -> Result<()>;
}

/// Hooks installed through setter functions the pipeline runtime exports.
pub struct SetterHooks<'r> {
    resolver: &'r dyn SymbolResolver,
    print_setter: &'r str,
    error_setter: &'r str,
}

impl<'r> SetterHooks<'r> {
    pub fn new(resolver: &'r dyn SymbolResolver, print_setter: &'r str, error_setter: &'r str) -> Self {
        Self {
            resolver,
            print_setter,
            error_setter,
        }
    }

    fn setter(&self, name: &str) -> Result<SinkSetterFn> {
        let ptr = self
            .resolver
            .resolve(name)
            .ok_or_else(|| MarshalError::MissingSymbol {
                symbol: name.to_string(),
            })?;
        // SAFETY: the configured setter names denote functions of type SinkSetterFn.
        Ok(unsafe { std::mem::transmute::<*mut c_void, SinkSetterFn>(ptr.as_ptr()) })
    }
}

impl PipelineHooks for SetterHooks<'_> {
    fn install(&self, print: SinkFn, error: SinkFn) -> Result<()> {
        let set_print = self.setter(self.print_setter)?;
        let set_error = self.setter(self.error_setter)?;
        unsafe {
            set_print(print);
            set_error(error);
        }
        Ok(())
    }
}

/// Process-wide table of bound host entry points.
pub struct CapabilityTable {
    api: OnceCell<MexApi>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityTable {
    pub const fn new() -> Self {
        Self {
            api: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&MexApi> {
        self.api.get()
    }

    pub fn is_bound(&self) -> bool {
        self.api.get().is_some()
    }

    /// Bind the host API and install the diagnostic sinks, once.
    ///
    /// Once bound, later calls return the cached table without touching the
    /// resolver or the hooks. Concurrent first binds are serialized by the
    /// cell; embedders still serialize calls into the pipeline itself.
    ///
    /// # Safety
    ///
    /// Same contract as [`MexApi::resolve`].
    pub unsafe fn bind(
        &self,
        resolver: &dyn SymbolResolver,
        hooks: &dyn PipelineHooks,
        flavour: ApiFlavour,
    ) -> Result<&MexApi> {
        if let Some(api) = self.api.get() {
            return Ok(api);
        }
        self.api.get_or_try_init(|| {
            let api = MexApi::resolve(resolver, flavour)?;
            hooks.install(crate::ffi::mexpipe_print, crate::ffi::mexpipe_error)?;
            log::debug!("bound {} host entry points ({flavour:?})", crate::host::REQUIRED_SYMBOLS.len());
            Ok(api)
        })
    }
}

/// The table used by the exported C entry points.
pub static CAPABILITIES: CapabilityTable = CapabilityTable::new();

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    unsafe extern "C" fn placeholder() {}

    fn placeholder_ptr() -> Option<NonNull<c_void>> {
        NonNull::new(placeholder as *const () as *mut c_void)
    }

    struct CountingResolver {
        lookups: Cell<usize>,
        missing: RefCell<Option<String>>,
    }

    impl CountingResolver {
        fn new() -> Self {
            Self {
                lookups: Cell::new(0),
                missing: RefCell::new(None),
            }
        }
    }

    impl SymbolResolver for CountingResolver {
        fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
            self.lookups.set(self.lookups.get() + 1);
            if self.missing.borrow().as_deref() == Some(name) {
                return None;
            }
            placeholder_ptr()
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        installs: Cell<usize>,
        fail: Cell<bool>,
    }

    impl PipelineHooks for RecordingHooks {
        fn install(&self, _print: SinkFn, _error: SinkFn) -> Result<()> {
            if self.fail.get() {
                return Err(MarshalError::MissingSymbol {
                    symbol: "set_error_handler".to_string(),
                });
            }
            self.installs.set(self.installs.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn second_bind_is_a_no_op() {
        let table = CapabilityTable::new();
        let resolver = CountingResolver::new();
        let hooks = RecordingHooks::default();

        unsafe { table.bind(&resolver, &hooks, ApiFlavour::Large) }.unwrap();
        let after_first = resolver.lookups.get();
        assert_eq!(after_first, crate::host::REQUIRED_SYMBOLS.len());
        assert_eq!(hooks.installs.get(), 1);

        unsafe { table.bind(&resolver, &hooks, ApiFlavour::Large) }.unwrap();
        assert_eq!(resolver.lookups.get(), after_first);
        assert_eq!(hooks.installs.get(), 1);
        assert!(table.is_bound());
    }

    #[test]
    fn failed_bind_caches_nothing() {
        let table = CapabilityTable::new();
        let resolver = CountingResolver::new();
        *resolver.missing.borrow_mut() = Some("mxGetDimensions_730".to_string());
        let hooks = RecordingHooks::default();

        let err = unsafe { table.bind(&resolver, &hooks, ApiFlavour::Large) }.unwrap_err();
        assert_eq!(
            err.to_string(),
            "host API not found: mxGetDimensions_730"
        );
        assert!(!table.is_bound());
        assert_eq!(hooks.installs.get(), 0);

        *resolver.missing.borrow_mut() = None;
        unsafe { table.bind(&resolver, &hooks, ApiFlavour::Large) }.unwrap();
        assert!(table.is_bound());
    }

    #[test]
    fn hook_failure_fails_the_bind() {
        let table = CapabilityTable::new();
        let resolver = CountingResolver::new();
        let hooks = RecordingHooks::default();
        hooks.fail.set(true);

        assert!(unsafe { table.bind(&resolver, &hooks, ApiFlavour::Compat) }.is_err());
        assert!(table.get().is_none());
    }

    static PRINT_SET: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
    static ERROR_SET: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    unsafe extern "C" fn set_print(sink: SinkFn) -> Option<SinkFn> {
        PRINT_SET.store(sink as usize, std::sync::atomic::Ordering::SeqCst);
        None
    }

    unsafe extern "C" fn set_error(sink: SinkFn) -> Option<SinkFn> {
        ERROR_SET.store(sink as usize, std::sync::atomic::Ordering::SeqCst);
        None
    }

    #[test]
    fn setter_hooks_call_exported_setters() {
        let resolver = |name: &str| match name {
            "pipeline_set_print" => NonNull::new(set_print as *const () as *mut c_void),
            "pipeline_set_error" => NonNull::new(set_error as *const () as *mut c_void),
            _ => None,
        };
        let hooks = SetterHooks::new(&resolver, "pipeline_set_print", "pipeline_set_error");
        hooks
            .install(crate::ffi::mexpipe_print, crate::ffi::mexpipe_error)
            .unwrap();
        use std::sync::atomic::Ordering;
        assert_eq!(PRINT_SET.load(Ordering::SeqCst), crate::ffi::mexpipe_print as usize);
        assert_eq!(ERROR_SET.load(Ordering::SeqCst), crate::ffi::mexpipe_error as usize);

        let missing = SetterHooks::new(&resolver, "pipeline_set_print", "absent");
        assert!(missing
            .install(crate::ffi::mexpipe_print, crate::ffi::mexpipe_error)
            .is_err());
    }
}
