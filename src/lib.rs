#![warn(missing_docs)]
//! Core library entry points for the hilite anchoring engine.
//!
//! hilite persists text highlights for a document (keyed by normalized URL)
//! and relocates them onto the live document tree when the page is revisited,
//! even after the tree has drifted from what it looked like at creation time.

pub mod anchor;
pub mod dom;
pub mod highlight;
pub mod locate;
pub mod orchestrator;
pub mod record;
pub mod store;

pub use anchor::StructuralAnchor;
pub use dom::{Document, Element, Node};
pub use highlight::{MaterializeError, SelectionRange, HIGHLIGHT_CLASS};
pub use locate::TextMatch;
pub use orchestrator::{
    AnchorState, DeleteOutcome, Event, HighlightError, LiveHighlight, Orchestrator,
    ReconcileOutcome,
};
pub use record::HighlightRecord;
pub use store::{ChangeNotification, HighlightStore, JsonFileStore, MemoryStore, StoreError};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
