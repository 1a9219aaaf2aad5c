//! C ABI types for the mexpipe marshaling layer.
//!
//! This crate defines the stable C ABI types shared between the host array
//! runtime (MEX style `mxArray` handles), compiled pipelines (the
//! `argv`/`metadata` calling convention) and the `mexpipe` crate that sits
//! between them.

use std::ffi::{c_char, c_int, c_void};

/// Status codes returned by all C ABI functions.
///
/// Only two codes exist; every marshaling failure collapses to `Error` and
/// the message is delivered through the error sink.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpStatus {
    /// Success
    Ok = 0,
    /// Any marshaling failure
    Error = -1,
}

impl MpStatus {
    pub const fn code(self) -> c_int {
        self as c_int
    }
}

/// Opaque host array handle (`mxArray`).
///
/// Only ever used behind a pointer or reference; the host owns the storage.
#[repr(C)]
pub struct MxArray {
    _private: [u8; 0],
}

/// Host class identifiers, in the order of the host's `mxClassID` enum.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MxClassId {
    Unknown = 0,
    Cell,
    Struct,
    Logical,
    Char,
    Void,
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Function,
    Opaque,
    Object,
}

impl MxClassId {
    /// Convert a raw `mxClassID` value. Out-of-range ids map to `Unknown`.
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            1 => MxClassId::Cell,
            2 => MxClassId::Struct,
            3 => MxClassId::Logical,
            4 => MxClassId::Char,
            5 => MxClassId::Void,
            6 => MxClassId::Double,
            7 => MxClassId::Single,
            8 => MxClassId::Int8,
            9 => MxClassId::UInt8,
            10 => MxClassId::Int16,
            11 => MxClassId::UInt16,
            12 => MxClassId::Int32,
            13 => MxClassId::UInt32,
            14 => MxClassId::Int64,
            15 => MxClassId::UInt64,
            16 => MxClassId::Function,
            17 => MxClassId::Opaque,
            18 => MxClassId::Object,
            _ => MxClassId::Unknown,
        }
    }

    pub const fn as_raw(self) -> c_int {
        self as c_int
    }
}

/// `mxComplexity` values accepted by the host's array constructors.
pub const MX_REAL: c_int = 0;
pub const MX_COMPLEX: c_int = 1;

/// Element type codes used in pipeline metadata.
pub const TYPE_CODE_INT: i32 = 0;
pub const TYPE_CODE_UINT: i32 = 1;
pub const TYPE_CODE_FLOAT: i32 = 2;
pub const TYPE_CODE_HANDLE: i32 = 3;

/// Argument kinds used in pipeline metadata.
pub const ARGUMENT_KIND_INPUT_SCALAR: i32 = 0;
pub const ARGUMENT_KIND_INPUT_BUFFER: i32 = 1;
pub const ARGUMENT_KIND_OUTPUT_BUFFER: i32 = 2;

/// One argument of a compiled pipeline, as emitted alongside its code.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FilterArgument {
    /// Parameter name (null-terminated)
    pub name: *const c_char,
    /// One of the `ARGUMENT_KIND_*` constants
    pub kind: i32,
    /// Number of dimensions; zero for scalars
    pub dimensions: i32,
    /// One of the `TYPE_CODE_*` constants
    pub type_code: i32,
    /// Element width in bits
    pub type_bits: i32,
    /// Optional default/min/max scalar values; unused by the marshaling layer
    pub def: *const c_void,
    pub min: *const c_void,
    pub max: *const c_void,
}

/// Signature record of a compiled pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FilterMetadata {
    pub version: i32,
    pub num_arguments: i32,
    pub arguments: *const FilterArgument,
    pub target: *const c_char,
    pub name: *const c_char,
}

/// Number of dimension slots in [`BufferT`].
pub const BUFFER_MAX_DIMS: usize = 4;

/// Dense buffer descriptor passed to pipelines in place of host arrays.
///
/// Memory layout: `extent`/`stride`/`min` are indexed by dimension;
/// dimensions beyond the buffer's rank hold zero.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct BufferT {
    /// Device handle; always 0 for host memory
    pub dev: u64,
    /// Pointer to the first element (borrowed from the host array)
    pub host: *mut u8,
    pub extent: [i32; BUFFER_MAX_DIMS],
    pub stride: [i32; BUFFER_MAX_DIMS],
    pub min: [i32; BUFFER_MAX_DIMS],
    /// Element size in bytes
    pub elem_size: i32,
    pub host_dirty: bool,
    pub dev_dirty: bool,
    pub _padding: [u8; 10 - std::mem::size_of::<*mut u8>()],
}

impl Default for BufferT {
    fn default() -> Self {
        Self {
            dev: 0,
            host: std::ptr::null_mut(),
            extent: [0; BUFFER_MAX_DIMS],
            stride: [0; BUFFER_MAX_DIMS],
            min: [0; BUFFER_MAX_DIMS],
            elem_size: 0,
            host_dirty: false,
            dev_dirty: false,
            _padding: [0; 10 - std::mem::size_of::<*mut u8>()],
        }
    }
}

/// Pipeline entry point: takes the argument pointer table, returns a status.
pub type PipelineArgvFn = unsafe extern "C" fn(args: *mut *mut c_void) -> c_int;

/// Accessor for a pipeline's signature record.
pub type PipelineMetadataFn = unsafe extern "C" fn() -> *const FilterMetadata;

/// Diagnostic sink installed into the pipeline runtime (print or error).
pub type SinkFn = unsafe extern "C" fn(user_context: *mut c_void, message: *const c_char);

/// Hook setter exported by the pipeline runtime; returns the previous sink.
pub type SinkSetterFn = unsafe extern "C" fn(sink: SinkFn) -> Option<SinkFn>;

// ABI version for compatibility checking
pub const MEXPIPE_ABI_VERSION: u32 = 1;

/// Returns the ABI version.
#[no_mangle]
pub extern "C" fn mexpipe_abi_version() -> u32 {
    MEXPIPE_ABI_VERSION
}
