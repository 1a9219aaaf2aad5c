//! Marshaling between a host numeric-array runtime and compiled pipelines.
//!
//! A compiled pipeline takes a table of untyped pointers, each either a
//! scalar or a dense buffer descriptor, and returns an integer status. This
//! crate checks host arrays against the pipeline's declared signature,
//! converts them into that table, invokes the pipeline and hands the status
//! back to the host.
//!
//! # Call sequence
//!
//! ```text
//! bind host API ─▶ validate ─▶ convert ─▶ invoke ─▶ status
//! ```
//!
//! Binding happens once per process ([`CapabilityTable`]). Everything else is
//! per call and owned by the call ([`Call`]).
//!
//! # Host arrays
//!
//! Hosts report at least two dimensions, store data column-major and drop
//! trailing singleton axes. Buffers therefore get a two-dimension floor,
//! swapped first axes and dense synthesized strides:
//!
//! ```text
//! host uint8 4x3  ─▶  extents [3, 4], strides [1, 3]
//! ```
//!
//! # C surface
//!
//! Extensions call [`ffi::mexpipe_init`] and [`ffi::mexpipe_call_pipeline`].
//! Both return 0 on success and -1 on failure, with the reason printed
//! through the host.

mod call;
mod capabilities;
mod config;
mod convert;
mod error;
mod library;
mod signature;
mod types;
mod validate;

pub mod ffi;
pub mod host;

pub use call::{call_pipeline, ArgumentSlot, ArgumentTable, Call, CallState, CompiledPipeline, Pipeline};
pub use capabilities::{CapabilityTable, PipelineHooks, SetterHooks, SymbolResolver, CAPABILITIES};
pub use config::{BridgeConfig, HooksConfig, LoggingConfig};
pub use convert::{to_buffer, to_scalar, BufferDescriptor, ScalarValue};
pub use error::{MarshalError, Result};
pub use host::{ApiFlavour, HostArray, HostRuntime, MemoryHost, MexApi};
pub use library::{LoadedPipeline, NativeLibrary, ProcessSymbols};
pub use signature::{ArgumentDescriptor, ArgumentKind, PipelineSignature};
pub use types::{class_name, classify, ElementType, TypeCode};
pub use validate::{check_argument, effective_rank, validate};
