//! In-process host runtime over Rust-owned arrays.

use super::HostRuntime;
use crate::types::{class_element_size, class_name, is_numeric_class};
use mexpipe_abi::MxClassId;
use std::cell::{Cell, RefCell};
use std::ffi::c_void;

/// Element types a [`HostArray`] can be built from.
pub trait Element: Copy + 'static {
    const CLASS: MxClassId;
}

macro_rules! element {
    ($($ty:ty => $class:ident),* $(,)?) => {
        $(impl Element for $ty {
            const CLASS: MxClassId = MxClassId::$class;
        })*
    };
}

element! {
    bool => Logical,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
}

/// A dense column-major array with host semantics: at least two reported
/// dimensions and trailing singleton axes dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    class: MxClassId,
    dims: Vec<usize>,
    // u64 words keep every element type aligned; Cell lets pipelines write
    // output buffers through pointers handed out from a shared borrow.
    storage: Vec<Cell<u64>>,
    complex: bool,
}

fn host_dims(dims: &[usize]) -> Vec<usize> {
    let mut dims = dims.to_vec();
    while dims.len() > 2 && dims.last() == Some(&1) {
        dims.pop();
    }
    while dims.len() < 2 {
        dims.push(1);
    }
    dims
}

impl HostArray {
    pub fn new<T: Element>(dims: &[usize], values: &[T]) -> Result<Self, String> {
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            return Err(format!(
                "Array data length {} doesn't match dimensions {:?} ({} elements)",
                values.len(),
                dims,
                expected
            ));
        }
        let array = Self::zeros(T::CLASS, dims);
        let bytes = std::mem::size_of_val(values);
        // SAFETY: storage holds at least `bytes` bytes and the regions are distinct.
        unsafe {
            std::ptr::copy_nonoverlapping(
                values.as_ptr() as *const u8,
                array.storage.as_ptr() as *mut u8,
                bytes,
            );
        }
        Ok(array)
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        let array = Self::zeros(T::CLASS, &[1, 1]);
        // SAFETY: a 1x1 array of T has room for one T at offset 0.
        unsafe { (array.storage.as_ptr() as *mut T).write(value) };
        array
    }

    /// Zero-filled array. Classes without fixed-size elements get no storage.
    pub fn zeros(class: MxClassId, dims: &[usize]) -> Self {
        let dims = host_dims(dims);
        let count: usize = dims.iter().product();
        let bytes = class_element_size(class).unwrap_or(0) * count;
        Self {
            class,
            dims,
            storage: vec![Cell::new(0); bytes.div_ceil(8)],
            complex: false,
        }
    }

    /// Mark the array as carrying an imaginary part.
    pub fn complex(mut self) -> Self {
        self.complex = true;
        self
    }

    /// Override the reported dimensions without the host normalization.
    pub fn with_reported_dims(mut self, dims: &[usize]) -> Result<Self, String> {
        let count: usize = dims.iter().product();
        let current: usize = self.dims.iter().product();
        if count != current {
            return Err(format!(
                "Dimensions {:?} hold {} elements, array has {}",
                dims, count, current
            ));
        }
        self.dims = dims.to_vec();
        Ok(self)
    }

    pub fn class(&self) -> MxClassId {
        self.class
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the elements out, or `None` when `T` does not match the class.
    pub fn elements<T: Element>(&self) -> Option<Vec<T>> {
        if T::CLASS != self.class {
            return None;
        }
        let ptr = self.storage.as_ptr() as *const T;
        // SAFETY: the class matches T, so storage holds len() initialized T values.
        Some((0..self.len()).map(|i| unsafe { ptr.add(i).read() }).collect())
    }

    fn as_mut_ptr(&self) -> *mut c_void {
        self.storage.as_ptr() as *mut c_void
    }
}

/// Host runtime whose arrays are [`HostArray`] values and whose print
/// channel is an in-memory transcript.
#[derive(Debug, Default)]
pub struct MemoryHost {
    printed: RefCell<Vec<String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything printed so far.
    pub fn printed(&self) -> Vec<String> {
        self.printed.borrow().clone()
    }
}

impl HostRuntime for MemoryHost {
    type Array = HostArray;
    type Owned = HostArray;

    fn class_id(&self, array: &HostArray) -> MxClassId {
        array.class
    }

    fn dimensions(&self, array: &HostArray) -> Vec<usize> {
        array.dims.clone()
    }

    fn element_size(&self, array: &HostArray) -> usize {
        class_element_size(array.class).unwrap_or(0)
    }

    fn data(&self, array: &HostArray) -> *mut c_void {
        array.as_mut_ptr()
    }

    fn is_complex(&self, array: &HostArray) -> bool {
        array.complex
    }

    fn is_logical(&self, array: &HostArray) -> bool {
        array.class == MxClassId::Logical
    }

    fn is_numeric(&self, array: &HostArray) -> bool {
        is_numeric_class(array.class)
    }

    fn class_name(&self, array: &HostArray) -> String {
        class_name(array.class).to_string()
    }

    fn create_numeric_matrix(&self, rows: usize, cols: usize, class: MxClassId) -> Option<HostArray> {
        if !is_numeric_class(class) {
            return None;
        }
        Some(HostArray::zeros(class, &[rows, cols]))
    }

    fn write_status(&self, array: &mut HostArray, status: i32) {
        if array.class == MxClassId::Int32 && !array.is_empty() {
            // SAFETY: a non-empty int32 array has room for one i32 at offset 0.
            unsafe { (array.as_mut_ptr() as *mut i32).write(status) };
        }
    }

    fn print(&self, message: &str) {
        self.printed.borrow_mut().push(message.to_string());
    }
}
