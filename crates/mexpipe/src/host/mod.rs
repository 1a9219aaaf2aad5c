//! The host array runtime as seen by the marshaling layer.
//!
//! The marshaling algorithms only query arrays and create the single status
//! array, so the seam is a small trait. [`MexApi`] implements it over the
//! dynamically resolved MEX entry points; [`MemoryHost`] implements it over
//! arrays owned by Rust.

mod memory;
mod mex;

pub use memory::{Element, HostArray, MemoryHost};
pub use mex::{ApiFlavour, MexApi, REQUIRED_SYMBOLS};

use mexpipe_abi::MxClassId;
use std::ffi::c_void;

pub trait HostRuntime {
    /// Borrowed array handle.
    type Array: ?Sized;
    /// Array created by the runtime and handed to the caller.
    type Owned;

    fn class_id(&self, array: &Self::Array) -> MxClassId;

    /// Extents in the host's native axis order.
    fn dimensions(&self, array: &Self::Array) -> Vec<usize>;

    fn element_size(&self, array: &Self::Array) -> usize;

    /// Pointer to the first element.
    fn data(&self, array: &Self::Array) -> *mut c_void;

    fn is_complex(&self, array: &Self::Array) -> bool;

    fn is_logical(&self, array: &Self::Array) -> bool;

    fn is_numeric(&self, array: &Self::Array) -> bool;

    fn class_name(&self, array: &Self::Array) -> String;

    /// Create a real `rows x cols` matrix of `class`, zero-filled.
    fn create_numeric_matrix(&self, rows: usize, cols: usize, class: MxClassId) -> Option<Self::Owned>;

    /// Store `status` as the first element of an int32 array made by
    /// [`create_numeric_matrix`](Self::create_numeric_matrix).
    fn write_status(&self, array: &mut Self::Owned, status: i32);

    /// Print through the host's output channel.
    fn print(&self, message: &str);
}
