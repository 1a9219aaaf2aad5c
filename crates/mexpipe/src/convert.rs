//! Conversion of validated host arrays into pipeline arguments.
//!
//! Buffers become dense descriptors over the host's own storage; scalars are
//! read once and narrowed to the declared width.

use crate::error::{MarshalError, Result};
use crate::host::HostRuntime;
use crate::types::{class_name, ElementType, TypeCode};
use mexpipe_abi::{BufferT, MxClassId, BUFFER_MAX_DIMS};
use std::ffi::c_void;
use std::fmt;

/// Dense strided view over a host array's storage.
///
/// `host` is borrowed from the array and is only valid while the array is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub host: *mut u8,
    pub elem_size: usize,
    pub extents: Vec<usize>,
    pub strides: Vec<usize>,
}

impl BufferDescriptor {
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// Lower to the fixed four-slot C record.
    pub fn to_raw(&self) -> Result<BufferT> {
        if self.rank() > BUFFER_MAX_DIMS {
            return Err(MarshalError::DescriptorRank {
                rank: self.rank(),
                max: BUFFER_MAX_DIMS,
            });
        }
        let fit = |value: usize| i32::try_from(value).map_err(|_| MarshalError::DescriptorRange { value });

        let mut raw = BufferT {
            host: self.host,
            elem_size: fit(self.elem_size)?,
            ..BufferT::default()
        };
        for (axis, (&extent, &stride)) in self.extents.iter().zip(&self.strides).enumerate() {
            raw.extent[axis] = fit(extent)?;
            raw.stride[axis] = fit(stride)?;
        }
        Ok(raw)
    }
}

/// Describe `array` as a buffer of at least `declared_rank` dimensions.
///
/// The first two host axes are swapped and strides are synthesized for a
/// dense layout; the storage itself is never inspected.
pub fn to_buffer<H: HostRuntime>(host: &H, array: &H::Array, declared_rank: usize) -> BufferDescriptor {
    let rank = declared_rank.max(2);
    let dims = host.dimensions(array);

    let mut extents: Vec<usize> = (0..rank).map(|axis| dims.get(axis).copied().unwrap_or(0)).collect();
    // Axes the host did not report are dropped trailing singletons.
    for extent in extents.iter_mut().skip(2) {
        if *extent == 0 {
            *extent = 1;
        }
    }
    extents.swap(0, 1);

    let mut strides = Vec::with_capacity(rank);
    let mut stride = 1usize;
    for &extent in &extents {
        strides.push(stride);
        stride = stride.saturating_mul(extent);
    }

    BufferDescriptor {
        host: host.data(array) as *mut u8,
        elem_size: host.element_size(array),
        extents,
        strides,
    }
}

/// A scalar argument at its declared native width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    pub fn element_type(&self) -> ElementType {
        match self {
            ScalarValue::Bool(_) => ElementType::bool(),
            ScalarValue::I8(_) => ElementType::int(8),
            ScalarValue::I16(_) => ElementType::int(16),
            ScalarValue::I32(_) => ElementType::int(32),
            ScalarValue::I64(_) => ElementType::int(64),
            ScalarValue::U8(_) => ElementType::uint(8),
            ScalarValue::U16(_) => ElementType::uint(16),
            ScalarValue::U32(_) => ElementType::uint(32),
            ScalarValue::U64(_) => ElementType::uint(64),
            ScalarValue::F32(_) => ElementType::float(32),
            ScalarValue::F64(_) => ElementType::float(64),
        }
    }

    /// Pointer to the value, as stored in the pipeline's argument table.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            ScalarValue::Bool(v) => v as *mut bool as *mut c_void,
            ScalarValue::I8(v) => v as *mut i8 as *mut c_void,
            ScalarValue::I16(v) => v as *mut i16 as *mut c_void,
            ScalarValue::I32(v) => v as *mut i32 as *mut c_void,
            ScalarValue::I64(v) => v as *mut i64 as *mut c_void,
            ScalarValue::U8(v) => v as *mut u8 as *mut c_void,
            ScalarValue::U16(v) => v as *mut u16 as *mut c_void,
            ScalarValue::U32(v) => v as *mut u32 as *mut c_void,
            ScalarValue::U64(v) => v as *mut u64 as *mut c_void,
            ScalarValue::F32(v) => v as *mut f32 as *mut c_void,
            ScalarValue::F64(v) => v as *mut f64 as *mut c_void,
        }
    }
}

// Element as read from host storage, before narrowing.
#[derive(Debug, Clone, Copy)]
enum Stored {
    Int(i128),
    Float(f64),
}

impl fmt::Display for Stored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stored::Int(v) => write!(f, "{v}"),
            Stored::Float(v) => write!(f, "{v}"),
        }
    }
}

unsafe fn read_stored(class: MxClassId, data: *const u8) -> Option<Stored> {
    let stored = match class {
        MxClassId::Logical => Stored::Int(i128::from(data.read() != 0)),
        MxClassId::Int8 => Stored::Int(i128::from((data as *const i8).read_unaligned())),
        MxClassId::UInt8 => Stored::Int(i128::from(data.read())),
        MxClassId::Int16 => Stored::Int(i128::from((data as *const i16).read_unaligned())),
        MxClassId::UInt16 => Stored::Int(i128::from((data as *const u16).read_unaligned())),
        MxClassId::Int32 => Stored::Int(i128::from((data as *const i32).read_unaligned())),
        MxClassId::UInt32 => Stored::Int(i128::from((data as *const u32).read_unaligned())),
        MxClassId::Int64 => Stored::Int(i128::from((data as *const i64).read_unaligned())),
        MxClassId::UInt64 => Stored::Int(i128::from((data as *const u64).read_unaligned())),
        MxClassId::Single => Stored::Float(f64::from((data as *const f32).read_unaligned())),
        MxClassId::Double => Stored::Float((data as *const f64).read_unaligned()),
        _ => return None,
    };
    Some(stored)
}

fn integral<T: TryFrom<i128>>(stored: Stored, ty: ElementType) -> Result<T> {
    let out_of_range = || MarshalError::ScalarRange {
        value: stored.to_string(),
        ty,
    };
    let value = match stored {
        Stored::Int(v) => v,
        Stored::Float(v) if v.is_finite() && v.fract() == 0.0 => v as i128,
        Stored::Float(_) => return Err(out_of_range()),
    };
    T::try_from(value).map_err(|_| out_of_range())
}

fn narrow(stored: Stored, ty: ElementType) -> Result<ScalarValue> {
    let value = match (ty.code, ty.bits) {
        (TypeCode::Int, 8) => ScalarValue::I8(integral(stored, ty)?),
        (TypeCode::Int, 16) => ScalarValue::I16(integral(stored, ty)?),
        (TypeCode::Int, 32) => ScalarValue::I32(integral(stored, ty)?),
        (TypeCode::Int, 64) => ScalarValue::I64(integral(stored, ty)?),
        (TypeCode::UInt, 8) => ScalarValue::U8(integral(stored, ty)?),
        (TypeCode::UInt, 16) => ScalarValue::U16(integral(stored, ty)?),
        (TypeCode::UInt, 32) => ScalarValue::U32(integral(stored, ty)?),
        (TypeCode::UInt, 64) => ScalarValue::U64(integral(stored, ty)?),
        (TypeCode::Float, 32) => ScalarValue::F32(match stored {
            Stored::Int(v) => v as f32,
            Stored::Float(v) => v as f32,
        }),
        (TypeCode::Float, 64) => ScalarValue::F64(match stored {
            Stored::Int(v) => v as f64,
            Stored::Float(v) => v,
        }),
        _ => return Err(MarshalError::UnsupportedType { ty }),
    };
    Ok(value)
}

/// Read the single element of `array` and narrow it to `ty`.
///
/// One-bit types read the stored byte and treat any nonzero value as true.
/// Other types read the element as the array's own class and convert with
/// range checks.
pub fn to_scalar<H: HostRuntime>(host: &H, array: &H::Array, ty: ElementType) -> Result<ScalarValue> {
    if !ty.is_supported() {
        return Err(MarshalError::UnsupportedType { ty });
    }

    let class = host.class_id(array);
    let data = host.data(array) as *const u8;
    let count: usize = host.dimensions(array).iter().product();
    if data.is_null() || count == 0 {
        return Err(MarshalError::ScalarSource {
            class: class_name(class),
        });
    }

    // SAFETY: the array holds at least one element of its class at `data`.
    if ty.is_bool() {
        return Ok(ScalarValue::Bool(unsafe { data.read() } != 0));
    }
    let stored = unsafe { read_stored(class, data) }.ok_or(MarshalError::ScalarSource {
        class: class_name(class),
    })?;
    narrow(stored, ty)
}
