//! The stock app: controller, view and UI collaborators behind one event
//! dispatch point.

use crate::controller::{MutationController, Outcome, Prompt};
use crate::error::{ErrorClass, Result, StoreError};
use crate::events::{LoopHandle, UiEvent};
use crate::service::StoreService;
use crate::types::Item;
use crate::view::{StockSurface, StockView};
use std::ops::ControlFlow;

/// Mutations the controller issues, for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Add,
    Remove,
    Update,
}

impl Mutation {
    pub fn as_str(self) -> &'static str {
        match self {
            Mutation::Add => "add",
            Mutation::Remove => "remove",
            Mutation::Update => "update",
        }
    }
}

/// UI state living on the event loop thread.
pub struct StockApp {
    controller: MutationController,
    view: StockView,
    prompt: Box<dyn Prompt>,
    surface: Box<dyn StockSurface>,
    alert_storage_errors: bool,
    last_outcome: Option<Outcome>,
}

impl StockApp {
    pub fn new(
        service: StoreService,
        handle: LoopHandle,
        prompt: Box<dyn Prompt>,
        surface: Box<dyn StockSurface>,
    ) -> Self {
        Self {
            controller: MutationController::new(service, handle),
            view: StockView::new(),
            prompt,
            surface,
            alert_storage_errors: true,
            last_outcome: None,
        }
    }

    /// Whether storage failures are shown through [`Prompt::alert`] in
    /// addition to being logged. Default: true.
    pub fn with_storage_alerts(mut self, enabled: bool) -> Self {
        self.alert_storage_errors = enabled;
        self
    }

    pub fn view(&self) -> &StockView {
        &self.view
    }

    /// What the controller did with the most recent add/remove/update intent.
    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    /// Dispatch one UI event.
    pub fn handle(&mut self, event: UiEvent) -> ControlFlow<()> {
        let prompt = &*self.prompt;
        match event {
            UiEvent::Submit { name, quantity } => {
                self.last_outcome = Some(self.controller.add(prompt, &name, &quantity));
            }
            UiEvent::Remove(id) => {
                self.last_outcome = Some(self.controller.remove(prompt, id));
            }
            UiEvent::Update(id) => {
                self.last_outcome = Some(self.controller.update_quantity(prompt, id));
            }
            UiEvent::Search(term) => {
                self.view.set_term(&term);
                self.refresh();
            }
            UiEvent::Refresh => self.refresh(),
            UiEvent::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Re-query the store with the current term and redraw when it answers.
    pub fn refresh(&mut self) {
        let generation = self.view.begin_refresh();
        let done = self
            .controller
            .loop_handle()
            .resume_with(move |app: &mut StockApp, result: Result<Vec<Item>>| {
                app.rows_loaded(generation, result)
            });
        self.controller.service().list(self.view.filter(), done);
    }

    fn rows_loaded(&mut self, generation: u64, result: Result<Vec<Item>>) {
        match result {
            Ok(items) => {
                if self.view.apply(generation, items) {
                    self.view.render(&mut *self.surface);
                } else {
                    tracing::trace!(generation, "stale listing dropped");
                }
            }
            Err(e) => self.report_storage_error("list", &e),
        }
    }

    /// Continuation of every controller mutation.
    pub(crate) fn mutation_finished(&mut self, mutation: Mutation, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(e) if e.class() == ErrorClass::NotFound => {
                tracing::debug!(op = mutation.as_str(), error = %e, "item already gone");
            }
            Err(e) => {
                self.report_storage_error(mutation.as_str(), &e);
                return;
            }
        }
        self.refresh();
    }

    fn report_storage_error(&self, op: &str, error: &StoreError) {
        tracing::error!(op, %error, "store operation failed");
        if self.alert_storage_errors {
            self.prompt.alert(&format!("Could not {} item: {}", op, error));
        }
    }
}
