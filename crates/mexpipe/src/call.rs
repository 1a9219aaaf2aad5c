//! Per-call orchestration: bind, validate, convert, invoke, report.

use crate::convert::{to_buffer, to_scalar, ScalarValue};
use crate::error::{MarshalError, Result};
use crate::host::HostRuntime;
use crate::signature::PipelineSignature;
use crate::validate::validate;
use mexpipe_abi::{BufferT, MpStatus, MxClassId, PipelineArgvFn};
use std::ffi::c_void;

/// Progress of one pipeline call. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unbound,
    Bound,
    Validated,
    Converted,
    Invoked,
    Done,
    Error,
}

/// A converted argument, owned for the duration of the call.
#[derive(Debug)]
pub enum ArgumentSlot {
    Buffer(BufferT),
    Scalar(ScalarValue),
}

impl ArgumentSlot {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            ArgumentSlot::Buffer(buf) => buf as *mut BufferT as *mut c_void,
            ArgumentSlot::Scalar(value) => value.as_mut_ptr(),
        }
    }
}

/// Converted arguments in signature order.
#[derive(Debug, Default)]
pub struct ArgumentTable {
    slots: Vec<ArgumentSlot>,
}

impl ArgumentTable {
    /// Convert every argument. Assumes `args` already passed validation.
    pub fn build<H: HostRuntime>(
        host: &H,
        signature: &PipelineSignature,
        args: &[&H::Array],
    ) -> Result<Self> {
        let slots = signature
            .arguments
            .iter()
            .zip(args)
            .map(|(desc, array)| {
                if desc.kind.is_buffer() {
                    to_buffer(host, array, desc.rank).to_raw().map(ArgumentSlot::Buffer)
                } else {
                    to_scalar(host, array, desc.ty).map(ArgumentSlot::Scalar)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[ArgumentSlot] {
        &self.slots
    }

    /// Pointer table for the pipeline. The pointers borrow `self`.
    pub fn pointers(&mut self) -> Vec<*mut c_void> {
        self.slots.iter_mut().map(ArgumentSlot::as_mut_ptr).collect()
    }
}

/// Something that can be invoked with an argument pointer table.
pub trait Pipeline {
    fn invoke(&mut self, args: &mut [*mut c_void]) -> i32;
}

impl<F> Pipeline for F
where
    F: FnMut(&mut [*mut c_void]) -> i32,
{
    fn invoke(&mut self, args: &mut [*mut c_void]) -> i32 {
        self(args)
    }
}

/// A compiled pipeline entry point.
#[derive(Debug, Clone, Copy)]
pub struct CompiledPipeline {
    entry: PipelineArgvFn,
}

impl CompiledPipeline {
    /// # Safety
    ///
    /// `entry` must accept a table whose pointers match the signature it is
    /// later called with.
    pub unsafe fn new(entry: PipelineArgvFn) -> Self {
        Self { entry }
    }
}

impl Pipeline for CompiledPipeline {
    fn invoke(&mut self, args: &mut [*mut c_void]) -> i32 {
        unsafe { (self.entry)(args.as_mut_ptr()) }
    }
}

/// One invocation of a pipeline.
pub struct Call<'s> {
    signature: &'s PipelineSignature,
    state: CallState,
}

impl<'s> Call<'s> {
    pub fn new(signature: &'s PipelineSignature) -> Self {
        Self {
            signature,
            state: CallState::Unbound,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    fn advance(&mut self, next: CallState) {
        log::trace!("{}: {:?} -> {:?}", self.signature.name, self.state, next);
        self.state = next;
    }

    /// Run the call to completion.
    ///
    /// `bind` yields the host runtime. When `returns` is non-empty its first
    /// slot receives a fresh 1x1 int32 array holding the final status, which
    /// is -1 for any marshaling failure after the array was created.
    /// Returns the pipeline's own status code.
    pub fn run<'h, H, B, P>(
        &mut self,
        bind: B,
        pipeline: &mut P,
        returns: &mut [Option<H::Owned>],
        args: &[&H::Array],
    ) -> Result<i32>
    where
        H: HostRuntime + 'h,
        B: FnOnce() -> Result<&'h H>,
        P: Pipeline + ?Sized,
    {
        let host = match bind() {
            Ok(host) => host,
            Err(err) => return Err(self.fail(err)),
        };
        self.advance(CallState::Bound);

        if let Some(slot) = returns.first_mut() {
            match host.create_numeric_matrix(1, 1, MxClassId::Int32) {
                Some(status) => *slot = Some(status),
                None => return Err(self.fail(MarshalError::Allocation)),
            }
        }

        let result = self.marshal_and_invoke(host, pipeline, returns.len(), args);
        let status = match &result {
            Ok(code) => *code,
            Err(_) => MpStatus::Error.code(),
        };
        if let Some(Some(array)) = returns.first_mut() {
            host.write_status(array, status);
        }
        result
    }

    fn marshal_and_invoke<H, P>(
        &mut self,
        host: &H,
        pipeline: &mut P,
        returned: usize,
        args: &[&H::Array],
    ) -> Result<i32>
    where
        H: HostRuntime,
        P: Pipeline + ?Sized,
    {
        if let Err(err) = validate(host, self.signature, returned, args) {
            return Err(self.fail(err));
        }
        self.advance(CallState::Validated);

        let mut table = match ArgumentTable::build(host, self.signature, args) {
            Ok(table) => table,
            Err(err) => return Err(self.fail(err)),
        };
        self.advance(CallState::Converted);

        let mut pointers = table.pointers();
        let code = pipeline.invoke(&mut pointers);
        self.advance(CallState::Invoked);

        log::debug!("pipeline {} returned {code}", self.signature.name);
        self.advance(CallState::Done);
        Ok(code)
    }

    fn fail(&mut self, err: MarshalError) -> MarshalError {
        log::debug!("pipeline {} failed in state {:?}: {err}", self.signature.name, self.state);
        self.advance(CallState::Error);
        err
    }
}

/// Validate, convert and invoke against an already bound host.
pub fn call_pipeline<H, P>(
    host: &H,
    signature: &PipelineSignature,
    pipeline: &mut P,
    returns: &mut [Option<H::Owned>],
    args: &[&H::Array],
) -> Result<i32>
where
    H: HostRuntime,
    P: Pipeline + ?Sized,
{
    Call::new(signature).run(|| Ok(host), pipeline, returns, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostArray, MemoryHost};
    use crate::signature::ArgumentDescriptor;
    use crate::types::ElementType;

    fn brighten() -> PipelineSignature {
        PipelineSignature::new(
            "brighten",
            vec![
                ArgumentDescriptor::input("input", ElementType::uint(8), 2),
                ArgumentDescriptor::scalar("gain", ElementType::float(32)),
                ArgumentDescriptor::output("result", ElementType::uint(8), 2),
            ],
        )
    }

    #[test]
    fn successful_call_walks_every_state() {
        let host = MemoryHost::new();
        let signature = brighten();
        let input = HostArray::zeros(MxClassId::UInt8, &[2, 2]);
        let gain = HostArray::scalar(2.0f64);
        let output = HostArray::zeros(MxClassId::UInt8, &[2, 2]);

        let mut seen = Vec::new();
        let mut pipeline = |args: &mut [*mut c_void]| {
            seen.push(args.len());
            0
        };
        let mut returns: [Option<HostArray>; 0] = [];
        let mut call = Call::new(&signature);
        assert_eq!(call.state(), CallState::Unbound);
        let code = call
            .run::<MemoryHost, _, _>(|| Ok(&host), &mut pipeline, &mut returns, &[&input, &gain, &output])
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(call.state(), CallState::Done);
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn bind_failure_never_reaches_the_pipeline() {
        let signature = brighten();
        let mut invoked = false;
        let mut pipeline = |_: &mut [*mut c_void]| {
            invoked = true;
            0
        };
        let mut returns: [Option<HostArray>; 1] = [None];
        let mut call = Call::new(&signature);
        let err = call
            .run::<MemoryHost, _, _>(
                || {
                    Err(MarshalError::MissingSymbol {
                        symbol: "mexPrintf".to_string(),
                    })
                },
                &mut pipeline,
                &mut returns,
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, MarshalError::MissingSymbol { .. }));
        assert_eq!(call.state(), CallState::Error);
        assert!(returns[0].is_none());
        assert!(!invoked);
    }

    #[test]
    fn validation_failure_writes_error_status() {
        let host = MemoryHost::new();
        let signature = brighten();
        let input = HostArray::zeros(MxClassId::Double, &[2, 2]);
        let gain = HostArray::scalar(2.0f64);
        let output = HostArray::zeros(MxClassId::UInt8, &[2, 2]);

        let mut invoked = false;
        let mut pipeline = |_: &mut [*mut c_void]| {
            invoked = true;
            0
        };
        let mut returns = [None];
        let err = call_pipeline(&host, &signature, &mut pipeline, &mut returns, &[&input, &gain, &output])
            .unwrap_err();
        assert!(matches!(err, MarshalError::BufferClass { .. }));
        assert!(!invoked);
        let status = returns[0].take().unwrap();
        assert_eq!(status.dims(), &[1, 1]);
        assert_eq!(status.elements::<i32>(), Some(vec![-1]));
    }

    #[test]
    fn conversion_failure_prevents_invocation() {
        let host = MemoryHost::new();
        let signature = PipelineSignature::new(
            "offset",
            vec![ArgumentDescriptor::scalar("delta", ElementType::int(8))],
        );
        let delta = HostArray::scalar(1000.0f64);
        let mut invoked = false;
        let mut pipeline = |_: &mut [*mut c_void]| {
            invoked = true;
            0
        };
        let mut returns: [Option<HostArray>; 0] = [];
        let mut call = Call::new(&signature);
        let err = call
            .run::<MemoryHost, _, _>(|| Ok(&host), &mut pipeline, &mut returns, &[&delta])
            .unwrap_err();
        assert!(matches!(err, MarshalError::ScalarRange { .. }));
        assert_eq!(call.state(), CallState::Error);
        assert!(!invoked);
    }

    #[test]
    fn pipeline_status_reaches_the_return_array() {
        let host = MemoryHost::new();
        let signature = PipelineSignature::new("noop", vec![]);
        let mut pipeline = |_: &mut [*mut c_void]| -7;
        let mut returns = [None];
        let code = call_pipeline(&host, &signature, &mut pipeline, &mut returns, &[]).unwrap();
        assert_eq!(code, -7);
        assert_eq!(returns[0].take().unwrap().elements::<i32>(), Some(vec![-7]));
    }

    #[test]
    fn argument_table_points_at_owned_values() {
        let host = MemoryHost::new();
        let signature = PipelineSignature::new(
            "mask",
            vec![
                ArgumentDescriptor::input("input", ElementType::uint(8), 2),
                ArgumentDescriptor::scalar("enable", ElementType::bool()),
                ArgumentDescriptor::output("result", ElementType::uint(8), 2),
            ],
        );
        let input = HostArray::new(&[2, 3], &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let enable = HostArray::scalar(true);
        let output = HostArray::zeros(MxClassId::UInt8, &[2, 3]);

        let mut table = ArgumentTable::build(&host, &signature, &[&input, &enable, &output]).unwrap();
        assert_eq!(table.slots().len(), 3);
        let pointers = table.pointers();
        let buf = unsafe { &*(pointers[0] as *const BufferT) };
        assert_eq!(buf.extent, [3, 2, 0, 0]);
        assert_eq!(buf.stride, [1, 3, 0, 0]);
        assert_eq!(buf.host as *mut c_void, host.data(&input));
        assert!(unsafe { *(pointers[1] as *const bool) });
    }
}
