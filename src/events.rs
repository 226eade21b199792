//! Single-threaded event loop.
//!
//! UI events and store completions share one queue and are handled one at
//! a time on the thread that runs the loop. Store callbacks fire on worker
//! threads; they never touch UI state themselves but post a continuation
//! that the loop runs against the [`StockApp`].

use crate::app::StockApp;
use crate::error::{Result, StoreError};
use crate::types::ItemId;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Named UI events. Each maps to exactly one app action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    /// The add form was submitted with raw field text.
    Submit { name: String, quantity: String },

    /// The search input changed.
    Search(String),

    /// A row's remove control was clicked.
    Remove(ItemId),

    /// A row's update control was clicked.
    Update(ItemId),

    /// Redraw the list with the current search term.
    Refresh,

    /// Stop the loop.
    Quit,
}

type Continuation = Box<dyn FnOnce(&mut StockApp) + Send + 'static>;

enum LoopMessage {
    Ui(UiEvent),
    Resume(Continuation),
}

/// Sending side of the loop. Cheap to clone.
#[derive(Clone)]
pub struct LoopHandle {
    sender: Sender<LoopMessage>,
    in_flight: Arc<AtomicUsize>,
}

impl LoopHandle {
    /// Queue a UI event.
    pub fn post(&self, event: UiEvent) {
        if self.sender.send(LoopMessage::Ui(event)).is_err() {
            tracing::warn!("event loop is gone; UI event dropped");
        }
    }

    /// Store operations whose continuation has not run yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Build a store callback that resumes `f` on the loop.
    ///
    /// If the callback is dropped without being called, `f` still runs,
    /// with [`StoreError::Closed`].
    pub(crate) fn resume_with<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut StockApp, Result<T>) + Send + 'static,
    ) -> impl FnOnce(Result<T>) + Send + 'static {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let resumer = Resumer {
            handle: self.clone(),
            f: Some(Box::new(f)),
        };
        move |result: Result<T>| resumer.complete(result)
    }
}

type ResumeFn<T> = Box<dyn FnOnce(&mut StockApp, Result<T>) + Send + 'static>;

struct Resumer<T: Send + 'static> {
    handle: LoopHandle,
    f: Option<ResumeFn<T>>,
}

impl<T: Send + 'static> Resumer<T> {
    fn complete(mut self, result: Result<T>) {
        if let Some(f) = self.f.take() {
            self.post(f, result);
        }
    }

    fn post(&self, f: ResumeFn<T>, result: Result<T>) {
        let continuation: Continuation = Box::new(move |app: &mut StockApp| f(app, result));
        if self.handle.sender.send(LoopMessage::Resume(continuation)).is_err() {
            self.handle.in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("event loop is gone; completion dropped");
        }
    }
}

impl<T: Send + 'static> Drop for Resumer<T> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            self.post(f, Err(StoreError::Closed));
        }
    }
}

/// The loop itself. Owns the receiving side of the queue.
pub struct EventLoop {
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    in_flight: Arc<AtomicUsize>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            sender: self.sender.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Handle messages until a `Quit` event arrives.
    pub fn run(&self, app: &mut StockApp) {
        while let Ok(message) = self.receiver.recv() {
            if self.dispatch(app, message).is_break() {
                break;
            }
        }
    }

    /// Handle everything queued, waiting for in-flight store work (and the
    /// work its continuations start) to finish. Breaks if `Quit` was seen.
    pub fn run_until_idle(&self, app: &mut StockApp) -> ControlFlow<()> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) if self.in_flight.load(Ordering::SeqCst) == 0 => {
                    return ControlFlow::Continue(());
                }
                Err(_) => match self.receiver.recv() {
                    Ok(message) => message,
                    Err(_) => return ControlFlow::Continue(()),
                },
            };

            if self.dispatch(app, message).is_break() {
                return ControlFlow::Break(());
            }
        }
    }

    fn dispatch(&self, app: &mut StockApp, message: LoopMessage) -> ControlFlow<()> {
        match message {
            LoopMessage::Ui(event) => {
                tracing::trace!(?event, "ui event");
                app.handle(event)
            }
            LoopMessage::Resume(continuation) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                continuation(app);
                ControlFlow::Continue(())
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
