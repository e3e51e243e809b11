//! Process-wide client library handle
//!
//! Every communicator in the process shares one tokio runtime that drives
//! broker sockets and timers. The runtime is built when the first
//! [`LibraryHandle`] is acquired and shut down when the last one is dropped.
//! Acquire and release are serialized by a mutex; the live handle count is
//! kept in an atomic so it can be read without taking the lock.

use crate::error::{CommError, CommResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

const RUNTIME_WORKER_THREADS: usize = 2;

static GLOBAL: Lazy<Arc<Library>> = Lazy::new(|| Arc::new(Library::new()));

/// Reference-counted owner of the shared runtime
pub struct Library {
    runtime: Mutex<Option<Runtime>>,
    handles: AtomicUsize,
}

impl Library {
    pub fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
            handles: AtomicUsize::new(0),
        }
    }

    /// The process-wide instance used by communicators
    pub fn global() -> Arc<Library> {
        GLOBAL.clone()
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }

    /// True while the runtime is built
    pub fn is_initialized(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Take a reference, building the runtime on first use
    pub fn acquire(self: &Arc<Self>) -> CommResult<LibraryHandle> {
        let mut runtime = self.runtime.lock();
        if runtime.is_none() {
            let built = Builder::new_multi_thread()
                .worker_threads(RUNTIME_WORKER_THREADS)
                .thread_name("fast-comm-io")
                .enable_all()
                .build()
                .map_err(|e| CommError::library_init_failure(e.to_string()))?;
            info!("Client library initialized");
            *runtime = Some(built);
        }

        let handle = match runtime.as_ref() {
            Some(rt) => rt.handle().clone(),
            None => return Err(CommError::library_init_failure("runtime unavailable")),
        };
        let count = self.handles.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(handles = count, "Client library handle acquired");

        Ok(LibraryHandle {
            library: Arc::clone(self),
            runtime: handle,
        })
    }

    fn release(&self) {
        let mut runtime = self.runtime.lock();
        let remaining = self.handles.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(handles = remaining, "Client library handle released");

        if remaining == 0 {
            if let Some(rt) = runtime.take() {
                // Background shutdown is safe even when released from async code
                rt.shutdown_background();
                info!("Client library cleaned up");
            }
        }
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

/// One counted reference to the shared runtime; released on drop
pub struct LibraryHandle {
    library: Arc<Library>,
    runtime: Handle,
}

impl LibraryHandle {
    /// Acquire a handle on the process-wide library
    pub fn acquire() -> CommResult<Self> {
        Library::global().acquire()
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl Drop for LibraryHandle {
    fn drop(&mut self) {
        self.library.release();
    }
}
