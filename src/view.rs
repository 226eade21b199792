//! Stock view: the filtered, ordered list of current items.

use crate::events::UiEvent;
use crate::types::{Item, ItemFilter, ItemId};
use std::fmt;
use std::io::Write;

/// A per-row control. Each carries the id of the item it acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowAction {
    Remove(ItemId),
    Update(ItemId),
}

impl RowAction {
    /// The UI event fired when this control is used.
    pub fn event(self) -> UiEvent {
        match self {
            RowAction::Remove(id) => UiEvent::Remove(id),
            RowAction::Update(id) => UiEvent::Update(id),
        }
    }
}

/// One rendered line of stock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockRow {
    pub id: ItemId,
    pub name: String,
    pub quantity: u64,
    pub actions: [RowAction; 2],
}

impl StockRow {
    pub fn from_item(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            quantity: item.quantity,
            actions: [RowAction::Remove(item.id), RowAction::Update(item.id)],
        }
    }
}

impl fmt::Display for StockRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.quantity)
    }
}

/// Where rows are drawn.
pub trait StockSurface {
    /// Remove every row currently shown.
    fn clear(&mut self);

    fn draw_row(&mut self, row: &StockRow);
}

/// Current search term and the rows last drawn for it.
///
/// Each refresh gets a generation number; only the completion of the most
/// recent refresh is applied, so listings that finish out of order cannot
/// overwrite newer results.
#[derive(Debug, Default)]
pub struct StockView {
    term: String,
    rows: Vec<StockRow>,
    generation: u64,
}

impl StockView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Replace the search term. Surrounding whitespace is ignored.
    pub fn set_term(&mut self, term: &str) {
        self.term = term.trim().to_string();
    }

    /// Filter for the current term.
    pub fn filter(&self) -> ItemFilter {
        ItemFilter::name_contains(&self.term)
    }

    pub fn rows(&self) -> &[StockRow] {
        &self.rows
    }

    /// Start a refresh and return its generation.
    pub fn begin_refresh(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Install the result of a refresh. Returns false (and changes nothing)
    /// if a newer refresh has started since.
    pub fn apply(&mut self, generation: u64, items: Vec<Item>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.rows = items.into_iter().map(StockRow::from_item).collect();
        true
    }

    /// Clear the surface and draw every row in order.
    pub fn render(&self, surface: &mut dyn StockSurface) {
        surface.clear();
        for row in &self.rows {
            surface.draw_row(row);
        }
    }
}

/// Line-oriented surface for terminals and pipes.
pub struct TextSurface<W: Write> {
    out: W,
}

impl<W: Write> TextSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StockSurface for TextSurface<W> {
    fn clear(&mut self) {
        if let Err(e) = writeln!(self.out, "--") {
            tracing::warn!(error = %e, "failed to write to surface");
        }
    }

    fn draw_row(&mut self, row: &StockRow) {
        if let Err(e) = writeln!(self.out, "[{:>4}] {}", row.id.0, row) {
            tracing::warn!(error = %e, "failed to write to surface");
        }
    }
}
