//! Debounced, race-safe autocomplete interaction.
//!
//! - `state`: pure transition function over [`InteractionState`]
//! - `timer`: cancellable delayed callbacks
//! - `controller`: runs the state machine against a [`SuggestionSource`](crate::client::SuggestionSource)

mod controller;
mod state;
mod timer;

pub use controller::*;
pub use state::*;
pub use timer::*;
