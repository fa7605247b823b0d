//! In-order execution streams.
//!
//! Each stream owns a worker thread that executes enqueued operations one at
//! a time in submission order. Enqueueing never waits for earlier work; the
//! host blocks only in `synchronize`. The first failing operation records a
//! sticky fault: later operations on the stream are skipped and every
//! subsequent `synchronize` reports that fault.

use super::{DeviceBuffer, DeviceInner, PinnedBuffer};
use crate::kernel::{DecodeKernel, KernelArgs};
use crate::trace::trace_warn;
use crate::util::{DecodeError, DecodeResult};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

type Operation = Box<dyn FnOnce() -> DecodeResult<()> + Send + 'static>;

enum Command {
    Run { name: &'static str, op: Operation },
    Fence(Sender<()>),
}

type Fault = Arc<Mutex<Option<DecodeError>>>;

fn lock(fault: &Mutex<Option<DecodeError>>) -> MutexGuard<'_, Option<DecodeError>> {
    fault.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(commands: Receiver<Command>, fault: Fault) {
    for command in commands {
        match command {
            Command::Run { name, op } => {
                if lock(&fault).is_some() {
                    continue;
                }
                if let Err(err) = op() {
                    let reason = err.to_string();
                    trace_warn!("stream_op_failed", op = name, reason = reason.as_str());
                    *lock(&fault) = Some(err);
                }
            }
            Command::Fence(ack) => {
                // The waiting side may have given up; nothing to report then.
                let _ = ack.send(());
            }
        }
    }
}

/// Ordered queue of asynchronous device operations.
pub struct Stream {
    id: u64,
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    fault: Fault,
    device: Arc<DeviceInner>,
}

impl Stream {
    pub(super) fn spawn(id: u64, device: Arc<DeviceInner>) -> DecodeResult<Self> {
        let (sender, commands) = mpsc::channel();
        let fault: Fault = Arc::new(Mutex::new(None));
        let worker_fault = Arc::clone(&fault);
        let worker = thread::Builder::new()
            .name(format!("detdecode-stream-{id}"))
            .spawn(move || run_worker(commands, worker_fault))
            .map_err(|err| DecodeError::StreamCreate {
                reason: err.to_string(),
            })?;
        device.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            id,
            sender: Some(sender),
            worker: Some(worker),
            fault,
            device,
        })
    }

    /// Identifier unique within the owning device.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn enqueue(&self, name: &'static str, op: Operation) -> DecodeResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(DecodeError::StreamClosed { op: name })?;
        sender
            .send(Command::Run { name, op })
            .map_err(|_| DecodeError::StreamClosed { op: name })
    }

    /// Enqueues a host-to-device copy into the start of `dst`.
    ///
    /// The pageable source is staged at enqueue time, so `src` may be reused
    /// as soon as this returns.
    pub fn copy_to_device(&self, src: &[f32], dst: &DeviceBuffer) -> DecodeResult<()> {
        if src.len() > dst.len() {
            return Err(DecodeError::BufferTooSmall {
                needed: src.len(),
                got: dst.len(),
            });
        }
        let staged: Vec<u32> = src.iter().map(|value| value.to_bits()).collect();
        let dst = dst.clone();
        self.enqueue(
            "copy_to_device",
            Box::new(move || {
                for (word, bits) in dst.as_words().iter().zip(staged) {
                    word.store(bits, Ordering::Relaxed);
                }
                Ok(())
            }),
        )
    }

    /// Enqueues a device-to-host copy of all of `src` into `dst`.
    pub fn copy_to_host(&self, src: &DeviceBuffer, dst: &PinnedBuffer) -> DecodeResult<()> {
        if dst.len() < src.len() {
            return Err(DecodeError::BufferTooSmall {
                needed: src.len(),
                got: dst.len(),
            });
        }
        let src = src.clone();
        let dst = dst.share();
        self.enqueue(
            "copy_to_host",
            Box::new(move || {
                for (to, from) in dst.words.iter().zip(src.as_words()) {
                    to.store(from.load(Ordering::Relaxed), Ordering::Relaxed);
                }
                Ok(())
            }),
        )
    }

    /// Enqueues a fill of every word of `dst` with `value`.
    pub fn memset(&self, dst: &DeviceBuffer, value: u32) -> DecodeResult<()> {
        let dst = dst.clone();
        self.enqueue(
            "memset",
            Box::new(move || {
                for word in dst.as_words() {
                    word.store(value, Ordering::Relaxed);
                }
                Ok(())
            }),
        )
    }

    /// Enqueues a decode-and-suppress kernel launch.
    pub fn launch<K>(&self, kernel: Arc<K>, args: KernelArgs) -> DecodeResult<()>
    where
        K: DecodeKernel + ?Sized + 'static,
    {
        self.enqueue(
            "decode_and_suppress",
            Box::new(move || kernel.decode_and_suppress(&args)),
        )
    }

    /// Blocks until all previously enqueued work has finished.
    pub fn synchronize(&self) -> DecodeResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(DecodeError::StreamClosed { op: "synchronize" })?;
        let (ack, done) = mpsc::channel();
        sender
            .send(Command::Fence(ack))
            .map_err(|_| DecodeError::StreamPanicked)?;
        done.recv().map_err(|_| DecodeError::StreamPanicked)?;
        match lock(&self.fault).as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Drains outstanding work and stops the worker.
    pub fn destroy(mut self) -> DecodeResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> DecodeResult<()> {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.device.live_streams.fetch_sub(1, Ordering::SeqCst);
        worker.join().map_err(|_| DecodeError::StreamPanicked)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            let reason = err.to_string();
            trace_warn!("stream_destroy_failed", stream = self.id, reason = reason.as_str());
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("running", &self.worker.is_some())
            .finish()
    }
}
