//! Per-call buffer set for one parallel decode.

use super::{logged, DeviceBuffer, HostDevice, PinnedBuffer, Stream};
use crate::kernel::{DecodeKernel, KernelArgs, OutputLayout};
use crate::trace::trace_event;
use crate::util::DecodeResult;
use std::sync::Arc;

/// Stream and buffers owned by one decode call.
///
/// Acquisition creates the stream, then the device input buffer, the device
/// output buffer and the pinned output buffer, stopping at the first
/// failure; anything acquired up to that point is released on return.
/// Nothing is pooled: each call pays for its own stream and allocations.
///
/// Field order matters: the stream drains and joins before any buffer it
/// may still reference is dropped.
#[derive(Debug)]
pub struct DecodeBuffers {
    stream: Stream,
    input: DeviceBuffer,
    output: DeviceBuffer,
    host_output: PinnedBuffer,
    layout: OutputLayout,
}

impl DecodeBuffers {
    /// Acquires a stream plus input and output buffers for `layout`.
    pub fn acquire(
        device: &HostDevice,
        input_len: usize,
        layout: OutputLayout,
    ) -> DecodeResult<Self> {
        let stream = device.create_stream()?;
        let input = device.alloc(input_len)?;
        let output = device.alloc(layout.total_words())?;
        let host_output = device.alloc_pinned(layout.total_words())?;
        trace_event!(
            "buffers_acquired",
            stream = stream.id(),
            input_bytes = input.size_bytes(),
            output_bytes = output.size_bytes()
        );
        Ok(Self {
            stream,
            input,
            output,
            host_output,
            layout,
        })
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn input(&self) -> &DeviceBuffer {
        &self.input
    }

    pub fn output(&self) -> &DeviceBuffer {
        &self.output
    }

    pub fn host_output(&self) -> &PinnedBuffer {
        &self.host_output
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    /// Enqueues the host-to-device copy of the prediction tensor.
    pub fn upload(&self, predict: &[f32]) -> DecodeResult<()> {
        logged("upload", self.stream.copy_to_device(predict, &self.input))
    }

    /// Enqueues the reset of the output counter and records.
    pub fn clear_output(&self) -> DecodeResult<()> {
        logged("clear_output", self.stream.memset(&self.output, 0))
    }

    /// Enqueues `kernel` on this call's stream.
    pub fn launch<K>(&self, kernel: Arc<K>, args: KernelArgs) -> DecodeResult<()>
    where
        K: DecodeKernel + ?Sized + 'static,
    {
        logged("launch", self.stream.launch(kernel, args))
    }

    /// Enqueues the device-to-host copy of the output buffer.
    pub fn download(&self) -> DecodeResult<()> {
        logged("download", self.stream.copy_to_host(&self.output, &self.host_output))
    }

    /// Waits for every enqueued step, surfacing any stream fault.
    pub fn synchronize(&self) -> DecodeResult<()> {
        logged("synchronize", self.stream.synchronize())
    }

    /// Destroys the stream and frees all buffers.
    ///
    /// Buffers are freed even when stream teardown reports an error.
    pub fn release(self) -> DecodeResult<()> {
        let Self {
            stream,
            input,
            output,
            host_output,
            ..
        } = self;
        let id = stream.id();
        let result = logged("destroy_stream", stream.destroy());
        drop(input);
        drop(output);
        drop(host_output);
        trace_event!("buffers_released", stream = id);
        result
    }
}
