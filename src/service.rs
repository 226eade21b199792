//! Asynchronous front for the record store.
//!
//! Callers never touch the store directly from the UI thread. Each operation
//! is queued to a pool of worker threads and reports completion through a
//! callback, which runs on the worker. Callers that want to block on the
//! result wrap the callback with [`Pending::pair`].
//!
//! With more than one worker, callbacks for distinct operations may fire in
//! any order.

use crate::error::{Result, StoreError};
use crate::store::RecordStore;
use crate::types::{Item, ItemFilter, ItemId};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work executed on a worker against the shared store.
type Job = Box<dyn FnOnce(&RecordStore) + Send + 'static>;

enum Message {
    Run(&'static str, Job),
    Shutdown,
}

/// Service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Number of worker threads.
    /// Default: 1
    pub workers: usize,

    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            thread_name: "stockroom-worker".to_string(),
        }
    }
}

/// Handle to the store workers. Cheap to clone; the workers stop when the
/// last clone is dropped.
#[derive(Clone)]
pub struct StoreService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    store: Arc<RecordStore>,
    sender: Sender<Message>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl StoreService {
    /// Spawn the workers.
    pub fn start(store: Arc<RecordStore>, config: ServiceConfig) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let count = config.workers.max(1);

        let mut workers = Vec::with_capacity(count);
        for n in 0..count {
            let store = Arc::clone(&store);
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, n))
                .spawn(move || worker_loop(store, receiver))?;
            workers.push(handle);
        }

        tracing::debug!(workers = count, "store service started");

        Ok(Self {
            inner: Arc::new(ServiceInner {
                store,
                sender,
                workers: Mutex::new(workers),
            }),
        })
    }

    /// The store behind this service.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.inner.store
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        quantity: u64,
        done: impl FnOnce(Result<ItemId>) + Send + 'static,
    ) {
        let name = name.into();
        self.submit(
            "create",
            Box::new(move |store: &RecordStore| done(store.create(name, quantity))),
        );
    }

    pub fn get(&self, id: ItemId, done: impl FnOnce(Result<Item>) + Send + 'static) {
        self.submit("get", Box::new(move |store: &RecordStore| done(store.get(id))));
    }

    pub fn update(
        &self,
        id: ItemId,
        quantity: u64,
        done: impl FnOnce(Result<Item>) + Send + 'static,
    ) {
        self.submit(
            "update",
            Box::new(move |store: &RecordStore| done(store.update(id, quantity))),
        );
    }

    pub fn delete(&self, id: ItemId, done: impl FnOnce(Result<()>) + Send + 'static) {
        self.submit("delete", Box::new(move |store: &RecordStore| done(store.delete(id))));
    }

    /// Run a listing on a worker and hand back the matching items in id order.
    pub fn list(&self, filter: ItemFilter, done: impl FnOnce(Result<Vec<Item>>) + Send + 'static) {
        self.submit(
            "list",
            Box::new(move |store: &RecordStore| done(store.list(filter).collect())),
        );
    }

    fn submit(&self, op: &'static str, job: Job) {
        // Workers only exit on shutdown, which needs every handle dropped
        if self.inner.sender.send(Message::Run(op, job)).is_err() {
            tracing::error!(op, "store workers are gone; operation dropped");
        }
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for _ in &workers {
            let _ = self.sender.send(Message::Shutdown);
        }
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("store worker panicked");
            }
        }
        tracing::debug!("store service stopped");
    }
}

fn worker_loop(store: Arc<RecordStore>, receiver: Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(op, job) => {
                tracing::trace!(op, "running store job");
                job(&store);
            }
            Message::Shutdown => break,
        }
    }
}

/// Waitable result of one store operation.
pub struct Pending<T> {
    receiver: Receiver<Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    /// A pending result and the callback that completes it.
    ///
    /// If the callback is dropped without being called, waiting fails with
    /// [`StoreError::Closed`].
    pub fn pair() -> (Self, impl FnOnce(Result<T>) + Send + 'static) {
        let (sender, receiver) = bounded(1);
        let complete = move |result: Result<T>| {
            let _ = sender.send(result);
        };
        (Self { receiver }, complete)
    }

    /// Block until the operation completes. Waits indefinitely.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| StoreError::Closed)?
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(StoreError::Closed),
        }
    }

    /// Take the result if the operation already completed.
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StoreError::Closed)),
        }
    }
}
