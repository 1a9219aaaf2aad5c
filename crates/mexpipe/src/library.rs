//! Native library loading and symbol lookup.

use crate::call::{call_pipeline, CompiledPipeline};
use crate::capabilities::SymbolResolver;
use crate::error::{MarshalError, Result};
use crate::host::HostRuntime;
use crate::signature::PipelineSignature;
use libloading::{Library, Symbol};
use mexpipe_abi::{PipelineArgvFn, PipelineMetadataFn};
use std::ffi::{c_void, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr::NonNull;

fn lookup(library: &Library, name: &str) -> Option<NonNull<c_void>> {
    let c_name = CString::new(name).ok()?;
    let symbol: Symbol<'_, *mut c_void> = unsafe { library.get(c_name.as_bytes_with_nul()) }.ok()?;
    NonNull::new(*symbol)
}

/// A loaded native library, typically a compiled pipeline.
pub struct NativeLibrary {
    library: Library,
    /// Path to the library (for diagnostics)
    path: String,
}

impl NativeLibrary {
    /// Load a native library from a path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| {
            MarshalError::Library(format!("Failed to load library '{}': {}", path.display(), e))
        })?;
        log::debug!("loaded {}", path.display());

        Ok(Self {
            library,
            path: path.display().to_string(),
        })
    }

    /// Get a function pointer from the library.
    ///
    /// # Safety
    ///
    /// `F` must match the actual type of the symbol.
    pub unsafe fn get_function<F>(&self, name: &str) -> Result<Symbol<'_, F>> {
        let c_name = CString::new(name)
            .map_err(|_| MarshalError::Library(format!("Invalid function name: {}", name)))?;

        self.library.get(c_name.as_bytes_with_nul()).map_err(|e| {
            MarshalError::Library(format!("Function '{}' not found in '{}': {}", name, self.path, e))
        })
    }

    /// Resolve the `<name>_argv` entry point and `<name>_metadata` record
    /// of a compiled pipeline.
    ///
    /// # Safety
    ///
    /// See [`LoadedPipeline::resolve`].
    pub unsafe fn pipeline(&self, name: &str) -> Result<LoadedPipeline<'_>> {
        let pipeline = LoadedPipeline::resolve(self, name)?;
        log::debug!("{}: {}", self.path, pipeline.signature);
        Ok(pipeline)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SymbolResolver for NativeLibrary {
    fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
        lookup(&self.library, name)
    }
}

/// A compiled pipeline resolved from a library that must outlive it.
pub struct LoadedPipeline<'lib> {
    pub signature: PipelineSignature,
    entry: CompiledPipeline,
    _library: PhantomData<&'lib ()>,
}

impl<'lib> LoadedPipeline<'lib> {
    /// Look up `<name>_argv` and `<name>_metadata` through `resolver` and
    /// copy the signature the metadata accessor returns.
    ///
    /// # Safety
    ///
    /// Both symbols must have the generated pipeline signatures, and the
    /// metadata must describe the entry point's arguments.
    pub unsafe fn resolve<R>(resolver: &'lib R, name: &str) -> Result<Self>
    where
        R: SymbolResolver + ?Sized,
    {
        let symbol = |suffix: &str| {
            let symbol = format!("{name}_{suffix}");
            resolver
                .resolve(&symbol)
                .ok_or_else(|| MarshalError::Library(format!("pipeline entry point '{symbol}' not found")))
        };
        let entry: PipelineArgvFn = std::mem::transmute(symbol("argv")?.as_ptr());
        let metadata: PipelineMetadataFn = std::mem::transmute(symbol("metadata")?.as_ptr());
        let signature = PipelineSignature::from_raw(metadata())?;

        Ok(Self {
            signature,
            entry: CompiledPipeline::new(entry),
            _library: PhantomData,
        })
    }

    /// Call the pipeline against an already bound host.
    pub fn call<H: HostRuntime>(
        &mut self,
        host: &H,
        returns: &mut [Option<H::Owned>],
        args: &[&H::Array],
    ) -> Result<i32> {
        call_pipeline(host, &self.signature, &mut self.entry, returns, args)
    }
}

/// Symbols already loaded into the current process, such as the host
/// runtime's API when running as a MEX extension.
pub struct ProcessSymbols {
    library: Library,
}

impl ProcessSymbols {
    pub fn open() -> Result<Self> {
        #[cfg(unix)]
        let library: Library = libloading::os::unix::Library::this().into();
        #[cfg(windows)]
        let library: Library = libloading::os::windows::Library::this()
            .map_err(|e| MarshalError::Library(format!("Failed to open the process image: {e}")))?
            .into();
        Ok(Self { library })
    }
}

impl SymbolResolver for ProcessSymbols {
    fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
        lookup(&self.library, name)
    }
}
