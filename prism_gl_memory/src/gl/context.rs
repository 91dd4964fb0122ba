/// GlContext - context thread ownership and the blocking task dispatcher
///
/// GL calls are affinity-bound: every call against a context must run on
/// the one thread that owns it. `GlContext` owns that thread. Callers
/// submit closures through `dispatch`, which blocks until the context
/// thread has run the closure to completion - a synchronous rendezvous,
/// not a queue of fire-and-forget work.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crate::gl::api::{GlApi, GlVersion};
use crate::gl::device::GlDevice;

type ContextTask = Box<dyn FnOnce(&mut dyn GlDevice) + Send>;

enum WorkerMsg {
    Task(ContextTask),
    Shutdown,
}

/// A GL context: API identification plus the thread that owns the
/// device's function table.
///
/// The context is shared infrastructure - memory objects hold an `Arc`
/// to it but never own it exclusively. Dropping the last reference shuts
/// the context thread down and drops the device on that thread.
pub struct GlContext {
    api: GlApi,
    version: GlVersion,
    sender: Mutex<mpsc::Sender<WorkerMsg>>,
    thread_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GlContext {
    /// Spawn the context thread and hand it ownership of the device.
    pub fn new(device: Box<dyn GlDevice>, api: GlApi, version: GlVersion) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<WorkerMsg>();

        let worker = thread::Builder::new()
            .name("prismgl-context".to_string())
            .spawn(move || {
                let mut device = device;
                while let Ok(msg) = receiver.recv() {
                    match msg {
                        WorkerMsg::Task(task) => task(device.as_mut()),
                        WorkerMsg::Shutdown => break,
                    }
                }
                // device dropped here, on the context thread
            })
            .expect("failed to spawn GL context thread");

        let thread_id = worker.thread().id();

        Arc::new(Self {
            api,
            version,
            sender: Mutex::new(sender),
            thread_id,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The API family this context implements
    pub fn api(&self) -> GlApi {
        self.api
    }

    /// The context's GL version
    pub fn version(&self) -> GlVersion {
        self.version
    }

    /// True if the context's API is in `api` and its version is at least
    /// `major.minor`.
    pub fn check_version(&self, api: GlApi, major: u32, minor: u32) -> bool {
        self.api.intersects(api) && self.version.at_least(major, minor)
    }

    /// Staged upload (PBO as PIXEL_UNPACK source for texture writes)
    pub fn supports_pbo_upload(&self) -> bool {
        self.check_version(GlApi::OPENGL | GlApi::OPENGL3, 2, 1)
            || self.check_version(GlApi::GLES2, 3, 0)
    }

    /// Staged download (PBO as PIXEL_PACK target for readbacks)
    pub fn supports_pbo_download(&self) -> bool {
        self.check_version(GlApi::OPENGL | GlApi::OPENGL3 | GlApi::GLES2, 3, 0)
    }

    /// Whether a staging buffer is worth allocating at all on this
    /// context. Legacy desktop GL, core profiles from 3.1, and GLES 3
    /// carry the needed entry points.
    pub fn supports_staging_allocation(&self) -> bool {
        self.check_version(GlApi::OPENGL, 1, 0)
            || self.check_version(GlApi::OPENGL3, 3, 1)
            || self.check_version(GlApi::GLES2, 3, 0)
    }

    /// GLES2 below 3.0 has no UNPACK_ROW_LENGTH; row padding is expressed
    /// through UNPACK_ALIGNMENT instead.
    pub fn uses_gles2_unpack_alignment(&self) -> bool {
        self.check_version(GlApi::GLES2, 2, 0) && !self.check_version(GlApi::GLES2, 3, 0)
    }

    /// GLES2-family context (any version). The respecify engine is
    /// format-restricted on these.
    pub fn is_gles2_family(&self) -> bool {
        self.api.contains(GlApi::GLES2)
    }

    /// Run `task` on the context thread and block until it completes.
    ///
    /// The task receives the context's device directly. There is no
    /// timeout and no cancellation: a wedged context thread stalls the
    /// caller indefinitely.
    ///
    /// # Panics
    ///
    /// Panics if called from the context thread itself (tasks already
    /// hold the device - nested dispatch is a usage error), or if the
    /// context thread has terminated.
    pub fn dispatch<R, F>(&self, task: F) -> R
    where
        F: FnOnce(&mut dyn GlDevice) -> R + Send + 'static,
        R: Send + 'static,
    {
        assert!(
            thread::current().id() != self.thread_id,
            "GlContext::dispatch called from the context thread"
        );

        let (reply_tx, reply_rx) = mpsc::channel();
        let boxed: ContextTask = Box::new(move |device| {
            // a dropped receiver just means the caller unwound; the task
            // result is discarded
            let _ = reply_tx.send(task(device));
        });

        self.sender
            .lock()
            .expect("GL context sender lock poisoned")
            .send(WorkerMsg::Task(boxed))
            .expect("GL context thread terminated");

        reply_rx.recv().expect("GL context thread terminated")
    }

    /// Like [`dispatch`](Self::dispatch), but survives a torn-down or
    /// wedged-away context: returns `None` instead of panicking when the
    /// context thread is gone or when called from the context thread.
    ///
    /// Used by resource destructors, which must not panic.
    pub fn try_dispatch<R, F>(&self, task: F) -> Option<R>
    where
        F: FnOnce(&mut dyn GlDevice) -> R + Send + 'static,
        R: Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return None;
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let boxed: ContextTask = Box::new(move |device| {
            let _ = reply_tx.send(task(device));
        });

        self.sender.lock().ok()?.send(WorkerMsg::Task(boxed)).ok()?;
        reply_rx.recv().ok()
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        if let Ok(sender) = self.sender.lock() {
            // the worker may already be gone; nothing left to do then
            let _ = sender.send(WorkerMsg::Shutdown);
        }
        // a drop that cascades from a task on the context thread itself
        // cannot join that thread; the shutdown message still ends it
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for GlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContext")
            .field("api", &self.api)
            .field("version", &self.version)
            .finish()
    }
}
