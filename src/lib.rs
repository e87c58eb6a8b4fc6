//! waypoint - Resilient places autocomplete for trip planning.
//!
//! ## Architecture
//!
//! waypoint has two layers:
//! - **Client**: validates a query, calls the autocomplete endpoint under a
//!   deadline, retries transient failures with backoff and jitter, and
//!   classifies every failure into a closed taxonomy
//! - **Autocomplete**: a debounced, race-safe interaction state machine that
//!   drives the client from keystrokes and keeps only the latest answer
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Network/API uncertainties (timeout, retry, generation tags)

pub mod autocomplete;
pub mod client;
pub mod models;

// Re-exports for convenience
pub use autocomplete::{AutocompleteController, AutocompleteSettings, InteractionState, Key};
pub use client::{HttpTransport, RetryPolicy, SuggestionService, SuggestionSource, with_retry};
pub use models::{ClassifiedError, Config, ErrorKind, Result, Suggestion, user_facing_message};
