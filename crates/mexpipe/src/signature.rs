//! Pipeline signatures: the ordered argument list a compiled pipeline expects.

use crate::error::{MarshalError, Result};
use crate::types::{ElementType, TypeCode};
use mexpipe_abi::{
    FilterArgument, FilterMetadata, ARGUMENT_KIND_INPUT_BUFFER, ARGUMENT_KIND_INPUT_SCALAR,
    ARGUMENT_KIND_OUTPUT_BUFFER,
};
use std::ffi::{c_char, CStr};
use std::fmt;

/// Role of a pipeline argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    InputScalar,
    InputBuffer,
    OutputBuffer,
}

impl ArgumentKind {
    pub fn from_raw(kind: i32) -> Option<Self> {
        match kind {
            ARGUMENT_KIND_INPUT_SCALAR => Some(ArgumentKind::InputScalar),
            ARGUMENT_KIND_INPUT_BUFFER => Some(ArgumentKind::InputBuffer),
            ARGUMENT_KIND_OUTPUT_BUFFER => Some(ArgumentKind::OutputBuffer),
            _ => None,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, ArgumentKind::InputBuffer | ArgumentKind::OutputBuffer)
    }
}

/// One declared pipeline argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub name: String,
    pub kind: ArgumentKind,
    pub ty: ElementType,
    /// Declared dimensionality; 0 for scalars
    pub rank: usize,
}

impl ArgumentDescriptor {
    pub fn scalar(name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::InputScalar,
            ty,
            rank: 0,
        }
    }

    pub fn input(name: impl Into<String>, ty: ElementType, rank: usize) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::InputBuffer,
            ty,
            rank,
        }
    }

    pub fn output(name: impl Into<String>, ty: ElementType, rank: usize) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::OutputBuffer,
            ty,
            rank,
        }
    }
}

/// A pipeline's name and ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSignature {
    pub name: String,
    pub arguments: Vec<ArgumentDescriptor>,
}

impl PipelineSignature {
    pub fn new(name: impl Into<String>, arguments: Vec<ArgumentDescriptor>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Copy a C metadata record into an owned signature.
    ///
    /// # Safety
    ///
    /// `metadata` must be null or point to a record whose `arguments` array
    /// holds `num_arguments` entries and whose strings are null-terminated.
    pub unsafe fn from_raw(metadata: *const FilterMetadata) -> Result<Self> {
        let metadata = metadata
            .as_ref()
            .ok_or_else(|| MarshalError::InvalidMetadata("null metadata".to_string()))?;
        let name = c_string(metadata.name).unwrap_or_else(|| "<unnamed>".to_string());

        let count = usize::try_from(metadata.num_arguments).map_err(|_| {
            MarshalError::InvalidMetadata(format!(
                "negative argument count {} for pipeline {}",
                metadata.num_arguments, name
            ))
        })?;
        if count > 0 && metadata.arguments.is_null() {
            return Err(MarshalError::InvalidMetadata(format!(
                "pipeline {name} declares {count} arguments but none are listed"
            )));
        }

        let raw_args: &[FilterArgument] = if count == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(metadata.arguments, count)
        };
        let arguments = raw_args
            .iter()
            .enumerate()
            .map(|(index, arg)| argument_from_raw(index, arg))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { name, arguments })
    }
}

impl fmt::Display for PipelineSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg.kind {
                ArgumentKind::InputScalar => write!(f, "{}: {}", arg.name, arg.ty)?,
                ArgumentKind::InputBuffer => write!(f, "{}: in {}[{}]", arg.name, arg.ty, arg.rank)?,
                ArgumentKind::OutputBuffer => {
                    write!(f, "{}: out {}[{}]", arg.name, arg.ty, arg.rank)?
                }
            }
        }
        write!(f, ")")
    }
}

unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe fn argument_from_raw(index: usize, arg: &FilterArgument) -> Result<ArgumentDescriptor> {
    let name = c_string(arg.name).unwrap_or_else(|| format!("arg{index}"));
    let kind = ArgumentKind::from_raw(arg.kind).ok_or_else(|| {
        MarshalError::InvalidMetadata(format!("unknown kind {} for argument {}", arg.kind, name))
    })?;
    let code = TypeCode::from_raw(arg.type_code).ok_or_else(|| {
        MarshalError::InvalidMetadata(format!(
            "unsupported type code {} for argument {}",
            arg.type_code, name
        ))
    })?;
    let bits = u8::try_from(arg.type_bits).map_err(|_| {
        MarshalError::InvalidMetadata(format!("invalid bit width {} for argument {}", arg.type_bits, name))
    })?;
    let rank = usize::try_from(arg.dimensions).map_err(|_| {
        MarshalError::InvalidMetadata(format!("negative rank {} for argument {}", arg.dimensions, name))
    })?;
    Ok(ArgumentDescriptor {
        name,
        kind,
        ty: ElementType::new(code, bits),
        rank,
    })
}
