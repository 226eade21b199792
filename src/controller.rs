//! Mutation controller: turns user intents into validated store calls.

use crate::app::{Mutation, StockApp};
use crate::error::{Result, ValidationError};
use crate::events::LoopHandle;
use crate::service::StoreService;
use crate::types::{Item, ItemId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Blocking user interaction the controller needs.
pub trait Prompt {
    /// Ask a yes/no question.
    fn confirm(&self, message: &str) -> bool;

    /// Ask for a line of text. `None` when the user dismisses the prompt.
    fn ask(&self, message: &str) -> Option<String>;

    /// Show an error the user has to acknowledge.
    fn alert(&self, message: &str);
}

/// What the controller did with an intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Passed validation and was sent to the store.
    Submitted,

    /// Rejected before reaching the store.
    Rejected(ValidationError),

    /// The user declined or dismissed the prompt.
    Cancelled,
}

/// A validated add-form submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub quantity: u64,
}

/// Validate add-form input: a non-blank name and a whole quantity above zero.
pub fn validate_new_item(
    name: &str,
    quantity: &str,
) -> std::result::Result<NewItem, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let quantity = parse_integer(quantity)?;
    if quantity <= 0 {
        return Err(ValidationError::NonPositiveQuantity(quantity));
    }

    Ok(NewItem {
        name: name.to_string(),
        quantity: quantity as u64,
    })
}

/// Validate a replacement quantity: a whole number, zero allowed.
pub fn validate_quantity(text: &str) -> std::result::Result<u64, ValidationError> {
    let quantity = parse_integer(text)?;
    if quantity < 0 {
        return Err(ValidationError::NegativeQuantity(quantity));
    }
    Ok(quantity as u64)
}

fn parse_integer(text: &str) -> std::result::Result<i64, ValidationError> {
    let text = text.trim();
    text.parse::<i64>()
        .map_err(|_| ValidationError::InvalidQuantity(text.to_string()))
}

/// Validates add/remove/update intents and dispatches them to the store.
///
/// Completions come back to the app on the event loop, which refreshes
/// the stock view.
pub struct MutationController {
    service: StoreService,
    handle: LoopHandle,
}

impl MutationController {
    pub fn new(service: StoreService, handle: LoopHandle) -> Self {
        Self { service, handle }
    }

    pub fn service(&self) -> &StoreService {
        &self.service
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// Handle an add-form submission.
    pub fn add(&self, prompt: &dyn Prompt, name: &str, quantity: &str) -> Outcome {
        let item = match validate_new_item(name, quantity) {
            Ok(item) => item,
            Err(e) => return reject(prompt, e),
        };

        let done = self.handle.resume_with(|app: &mut StockApp, result: Result<ItemId>| {
            app.mutation_finished(Mutation::Add, result.map(|_| ()))
        });
        self.service.create(item.name, item.quantity, done);

        Outcome::Submitted
    }

    /// Handle a row's remove control. Nothing happens unless the user confirms.
    pub fn remove(&self, prompt: &dyn Prompt, id: ItemId) -> Outcome {
        if !prompt.confirm(&format!("Remove item {}?", id)) {
            tracing::info!(%id, "removal declined");
            return Outcome::Cancelled;
        }

        let done = self.handle.resume_with(|app: &mut StockApp, result: Result<()>| {
            app.mutation_finished(Mutation::Remove, result)
        });
        self.service.delete(id, done);

        Outcome::Submitted
    }

    /// Handle a row's update control by asking for the new quantity.
    pub fn update_quantity(&self, prompt: &dyn Prompt, id: ItemId) -> Outcome {
        let Some(text) = prompt.ask("Enter the new quantity:") else {
            tracing::debug!(%id, "quantity prompt dismissed");
            return Outcome::Cancelled;
        };

        let quantity = match validate_quantity(&text) {
            Ok(quantity) => quantity,
            Err(e) => return reject(prompt, e),
        };

        let done = self.handle.resume_with(|app: &mut StockApp, result: Result<Item>| {
            app.mutation_finished(Mutation::Update, result.map(|_| ()))
        });
        self.service.update(id, quantity, done);

        Outcome::Submitted
    }
}

fn reject(prompt: &dyn Prompt, error: ValidationError) -> Outcome {
    tracing::debug!(%error, "input rejected");
    prompt.alert(&error.to_string());
    Outcome::Rejected(error)
}

/// A [`Prompt`] that answers from queued responses and records alerts.
///
/// Clones share state, so a copy kept by the caller sees what the app
/// was asked. Confirmations fall back to `default_confirm` when the queue
/// is empty; questions are dismissed.
#[derive(Clone, Default)]
pub struct ScriptedPrompt {
    script: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    default_confirm: bool,
    confirmations: VecDeque<bool>,
    answers: VecDeque<String>,
    alerts: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted confirmation with `yes`.
    pub fn confirming(self, yes: bool) -> Self {
        self.script.lock().default_confirm = yes;
        self
    }

    pub fn push_confirm(&self, yes: bool) {
        self.script.lock().confirmations.push_back(yes);
    }

    pub fn push_answer(&self, answer: impl Into<String>) {
        self.script.lock().answers.push_back(answer.into());
    }

    /// Alerts shown so far.
    pub fn alerts(&self) -> Vec<String> {
        self.script.lock().alerts.clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, _message: &str) -> bool {
        let mut script = self.script.lock();
        let default = script.default_confirm;
        script.confirmations.pop_front().unwrap_or(default)
    }

    fn ask(&self, _message: &str) -> Option<String> {
        self.script.lock().answers.pop_front()
    }

    fn alert(&self, message: &str) {
        self.script.lock().alerts.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_new_item() {
        let item = validate_new_item("  Widget ", " 10").unwrap();
        assert_eq!(
            item,
            NewItem {
                name: "Widget".into(),
                quantity: 10
            }
        );
    }

    #[test]
    fn test_new_item_rejections() {
        assert_eq!(validate_new_item("", "3"), Err(ValidationError::EmptyName));
        assert_eq!(validate_new_item("   ", "3"), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_new_item("Bolt", "three"),
            Err(ValidationError::InvalidQuantity("three".into()))
        );
        assert_eq!(
            validate_new_item("Bolt", "2.5"),
            Err(ValidationError::InvalidQuantity("2.5".into()))
        );
        assert_eq!(
            validate_new_item("Bolt", "0"),
            Err(ValidationError::NonPositiveQuantity(0))
        );
        assert_eq!(
            validate_new_item("Bolt", "-4"),
            Err(ValidationError::NonPositiveQuantity(-4))
        );
    }

    #[test]
    fn test_replacement_quantity() {
        assert_eq!(validate_quantity("0"), Ok(0));
        assert_eq!(validate_quantity(" 12 "), Ok(12));
        assert_eq!(
            validate_quantity("-1"),
            Err(ValidationError::NegativeQuantity(-1))
        );
        assert_eq!(
            validate_quantity(""),
            Err(ValidationError::InvalidQuantity(String::new()))
        );
    }

    #[test]
    fn test_scripted_prompt() {
        let prompt = ScriptedPrompt::new().confirming(true);
        prompt.push_confirm(false);
        prompt.push_answer("5");

        assert!(!prompt.confirm("first"));
        assert!(prompt.confirm("second"));
        assert_eq!(prompt.ask("qty"), Some("5".into()));
        assert_eq!(prompt.ask("qty"), None);

        let shared = prompt.clone();
        prompt.alert("bad input");
        assert_eq!(shared.alerts(), vec!["bad input".to_string()]);
    }

    #[test]
    fn test_unscripted_confirm_declines() {
        assert!(!ScriptedPrompt::new().confirm("Remove item 1?"));
    }
}
