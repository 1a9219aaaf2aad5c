//! Argument validation against a pipeline signature.
//!
//! Only as much checking as is needed so that conversion never reinterprets
//! data of the wrong class or shape.

use crate::error::{MarshalError, Result};
use crate::host::HostRuntime;
use crate::signature::{ArgumentDescriptor, ArgumentKind, PipelineSignature};
use crate::types::{class_name, classify};

/// Check counts, then every argument in order; the first failure wins.
pub fn validate<H: HostRuntime>(
    host: &H,
    signature: &PipelineSignature,
    returned: usize,
    args: &[&H::Array],
) -> Result<()> {
    if args.len() != signature.len() {
        return Err(MarshalError::ArgumentCount {
            pipeline: signature.name.clone(),
            expected: signature.len(),
            actual: args.len(),
        });
    }

    // The only value a pipeline returns is its status.
    if returned > 1 {
        return Err(MarshalError::ReturnCount {
            pipeline: signature.name.clone(),
            actual: returned,
        });
    }

    for (desc, array) in signature.arguments.iter().zip(args) {
        check_argument(host, desc, array)?;
    }
    Ok(())
}

/// Check one host array against its declared argument.
pub fn check_argument<H: HostRuntime>(
    host: &H,
    desc: &ArgumentDescriptor,
    array: &H::Array,
) -> Result<()> {
    if host.is_complex(array) {
        return Err(MarshalError::Complex {
            parameter: desc.name.clone(),
        });
    }

    let dims = host.dimensions(array);
    match desc.kind {
        ArgumentKind::InputScalar => {
            if dims.iter().any(|&extent| extent != 1) {
                return Err(MarshalError::ScalarShape {
                    parameter: desc.name.clone(),
                });
            }
            if desc.ty.is_bool() {
                if !host.is_logical(array) {
                    return Err(MarshalError::ScalarClass {
                        parameter: desc.name.clone(),
                        expected: "logical",
                        actual: host.class_name(array),
                    });
                }
            } else if !host.is_numeric(array) {
                return Err(MarshalError::ScalarClass {
                    parameter: desc.name.clone(),
                    expected: "numeric",
                    actual: host.class_name(array),
                });
            }
        }
        ArgumentKind::InputBuffer | ArgumentKind::OutputBuffer => {
            let expected = classify(desc.ty);
            if host.class_id(array) != expected {
                return Err(MarshalError::BufferClass {
                    parameter: desc.name.clone(),
                    expected: class_name(expected),
                    actual: host.class_name(array),
                });
            }
            // Hosts report at least two dimensions and may drop trailing
            // singleton axes, so only a surplus of non-unit axes is an error.
            let rank = effective_rank(&dims);
            if rank > desc.rank {
                return Err(MarshalError::Rank {
                    parameter: desc.name.clone(),
                    expected: desc.rank,
                    actual: rank,
                });
            }
        }
    }
    Ok(())
}

/// Number of dimensions left after trimming trailing extent-1 axes.
pub fn effective_rank(dims: &[usize]) -> usize {
    dims.iter().rposition(|&extent| extent != 1).map_or(0, |i| i + 1)
}
