//! The MEX host API, bound at runtime through a [`SymbolResolver`].

use super::HostRuntime;
use crate::capabilities::SymbolResolver;
use crate::error::{MarshalError, Result};
use mexpipe_abi::{MxArray, MxClassId, MX_REAL};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::NonNull;

/// Which generation of size-typed entry points to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavour {
    /// `size_t` dimensions, `*_730` symbols
    Large,
    /// `int` dimensions, `*_700` symbols
    Compat,
}

impl Default for ApiFlavour {
    fn default() -> Self {
        if cfg!(target_pointer_width = "64") {
            ApiFlavour::Large
        } else {
            ApiFlavour::Compat
        }
    }
}

impl ApiFlavour {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "large" | "730" => Some(ApiFlavour::Large),
            "compat" | "700" => Some(ApiFlavour::Compat),
            _ => None,
        }
    }

    /// Exported name of `base` for this flavour.
    pub fn symbol_name(self, base: &'static str) -> Cow<'static, str> {
        if !SIZED_SYMBOLS.contains(&base) {
            return Cow::Borrowed(base);
        }
        match self {
            ApiFlavour::Large => Cow::Owned(format!("{base}_730")),
            ApiFlavour::Compat => Cow::Owned(format!("{base}_700")),
        }
    }
}

/// Every host entry point the marshaling layer needs, by base name.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "mexPrintf",
    "mxCreateNumericMatrix",
    "mxGetClassID",
    "mxGetNumberOfDimensions",
    "mxGetDimensions",
    "mxGetElementSize",
    "mxGetData",
    "mxIsComplex",
    "mxIsLogical",
    "mxIsNumeric",
    "mxGetClassName",
];

// Entry points whose signature depends on the host's size type.
const SIZED_SYMBOLS: &[&str] = &[
    "mxCreateNumericMatrix",
    "mxGetNumberOfDimensions",
    "mxGetDimensions",
];

type MexPrintfFn = unsafe extern "C" fn(format: *const c_char, ...) -> c_int;
type ClassIdFn = unsafe extern "C" fn(*const MxArray) -> c_int;
type ElementSizeFn = unsafe extern "C" fn(*const MxArray) -> usize;
type DataFn = unsafe extern "C" fn(*const MxArray) -> *mut c_void;
type PredicateFn = unsafe extern "C" fn(*const MxArray) -> bool;
type ClassNameFn = unsafe extern "C" fn(*const MxArray) -> *const c_char;

#[derive(Clone, Copy)]
enum SizedFns {
    Large {
        create: unsafe extern "C" fn(usize, usize, c_int, c_int) -> *mut MxArray,
        ndims: unsafe extern "C" fn(*const MxArray) -> usize,
        dims: unsafe extern "C" fn(*const MxArray) -> *const usize,
    },
    Compat {
        create: unsafe extern "C" fn(c_int, c_int, c_int, c_int) -> *mut MxArray,
        ndims: unsafe extern "C" fn(*const MxArray) -> c_int,
        dims: unsafe extern "C" fn(*const MxArray) -> *const c_int,
    },
}

/// Resolved MEX entry points.
#[derive(Clone, Copy)]
pub struct MexApi {
    printf: MexPrintfFn,
    sized: SizedFns,
    class_id: ClassIdFn,
    element_size: ElementSizeFn,
    data: DataFn,
    is_complex: PredicateFn,
    is_logical: PredicateFn,
    is_numeric: PredicateFn,
    class_name: ClassNameFn,
}

impl std::fmt::Debug for MexApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flavour = match self.sized {
            SizedFns::Large { .. } => ApiFlavour::Large,
            SizedFns::Compat { .. } => ApiFlavour::Compat,
        };
        f.debug_struct("MexApi").field("flavour", &flavour).finish_non_exhaustive()
    }
}

unsafe fn cast<F: Copy>(ptr: NonNull<c_void>) -> F {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
    std::mem::transmute_copy(&ptr.as_ptr())
}

impl MexApi {
    /// Resolve every entry point in [`REQUIRED_SYMBOLS`]. The first missing
    /// symbol fails the whole resolution.
    ///
    /// # Safety
    ///
    /// Each symbol the resolver returns must be a function with the MEX
    /// signature for `flavour`.
    pub unsafe fn resolve(resolver: &dyn SymbolResolver, flavour: ApiFlavour) -> Result<Self> {
        let lookup = |base: &'static str| -> Result<NonNull<c_void>> {
            let name = flavour.symbol_name(base);
            match resolver.resolve(&name) {
                Some(ptr) => {
                    log::trace!("resolved host symbol {name}");
                    Ok(ptr)
                }
                None => Err(MarshalError::MissingSymbol {
                    symbol: name.into_owned(),
                }),
            }
        };

        let printf = cast(lookup("mexPrintf")?);
        let create = lookup("mxCreateNumericMatrix")?;
        let class_id = cast(lookup("mxGetClassID")?);
        let ndims = lookup("mxGetNumberOfDimensions")?;
        let dims = lookup("mxGetDimensions")?;
        let element_size = cast(lookup("mxGetElementSize")?);
        let data = cast(lookup("mxGetData")?);
        let is_complex = cast(lookup("mxIsComplex")?);
        let is_logical = cast(lookup("mxIsLogical")?);
        let is_numeric = cast(lookup("mxIsNumeric")?);
        let class_name = cast(lookup("mxGetClassName")?);

        let sized = match flavour {
            ApiFlavour::Large => SizedFns::Large {
                create: cast(create),
                ndims: cast(ndims),
                dims: cast(dims),
            },
            ApiFlavour::Compat => SizedFns::Compat {
                create: cast(create),
                ndims: cast(ndims),
                dims: cast(dims),
            },
        };

        Ok(Self {
            printf,
            sized,
            class_id,
            element_size,
            data,
            is_complex,
            is_logical,
            is_numeric,
            class_name,
        })
    }
}

// The calls below rely on `resolve`'s contract for the function types and on
// `&MxArray` only ever being produced from live host handles.
impl HostRuntime for MexApi {
    type Array = MxArray;
    type Owned = NonNull<MxArray>;

    fn class_id(&self, array: &MxArray) -> MxClassId {
        MxClassId::from_raw(unsafe { (self.class_id)(array) })
    }

    fn dimensions(&self, array: &MxArray) -> Vec<usize> {
        unsafe {
            match self.sized {
                SizedFns::Large { ndims, dims, .. } => {
                    let count = ndims(array);
                    let ptr = dims(array);
                    if ptr.is_null() || count == 0 {
                        return Vec::new();
                    }
                    std::slice::from_raw_parts(ptr, count).to_vec()
                }
                SizedFns::Compat { ndims, dims, .. } => {
                    let count = usize::try_from(ndims(array)).unwrap_or(0);
                    let ptr = dims(array);
                    if ptr.is_null() || count == 0 {
                        return Vec::new();
                    }
                    std::slice::from_raw_parts(ptr, count)
                        .iter()
                        .map(|&d| usize::try_from(d).unwrap_or(0))
                        .collect()
                }
            }
        }
    }

    fn element_size(&self, array: &MxArray) -> usize {
        unsafe { (self.element_size)(array) }
    }

    fn data(&self, array: &MxArray) -> *mut c_void {
        unsafe { (self.data)(array) }
    }

    fn is_complex(&self, array: &MxArray) -> bool {
        unsafe { (self.is_complex)(array) }
    }

    fn is_logical(&self, array: &MxArray) -> bool {
        unsafe { (self.is_logical)(array) }
    }

    fn is_numeric(&self, array: &MxArray) -> bool {
        unsafe { (self.is_numeric)(array) }
    }

    fn class_name(&self, array: &MxArray) -> String {
        let name = unsafe { (self.class_name)(array) };
        if name.is_null() {
            return "unknown".to_string();
        }
        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
    }

    fn create_numeric_matrix(&self, rows: usize, cols: usize, class: MxClassId) -> Option<NonNull<MxArray>> {
        let array = unsafe {
            match self.sized {
                SizedFns::Large { create, .. } => create(rows, cols, class.as_raw(), MX_REAL),
                SizedFns::Compat { create, .. } => create(
                    c_int::try_from(rows).ok()?,
                    c_int::try_from(cols).ok()?,
                    class.as_raw(),
                    MX_REAL,
                ),
            }
        };
        NonNull::new(array)
    }

    fn write_status(&self, array: &mut NonNull<MxArray>, status: i32) {
        let data = unsafe { (self.data)(array.as_ptr()) } as *mut i32;
        if !data.is_null() {
            unsafe { data.write(status) };
        }
    }

    fn print(&self, message: &str) {
        let text = match CString::new(message.replace('\0', "")) {
            Ok(text) => text,
            Err(_) => return,
        };
        unsafe {
            (self.printf)(b"%s\0".as_ptr() as *const c_char, text.as_ptr());
        }
    }
}
