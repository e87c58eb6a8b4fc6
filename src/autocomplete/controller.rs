//! Autocomplete controller: runs the state machine against real time and a
//! real suggestion source.
//!
//! Epistemic foundation:
//! - K_i: State is only mutated by `dispatch`, on the task that owns the controller
//! - K_i: Timer fires and lookup completions come back as messages on one channel
//! - B_i: A lookup may fail or panic → classified error on the error path
//! - I^B: Completion order is unknowable → generation check in the state machine

use super::state::{AutocompleteSettings, Effect, Event, InteractionState, Key};
use super::timer::{Scheduler, TimerHandle};
use crate::client::SuggestionSource;
use crate::models::{
    ClassifiedError, ErrorLog, Result, Suggestion, TracingErrorLog, record,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Context tag for failures caught by the controller itself.
pub const CONTROLLER_CONTEXT: &str = "autocomplete";

type SelectCallback = Box<dyn FnMut(&Suggestion) + Send>;
type TextCallback = Box<dyn FnMut(&str) + Send>;
type StateObserver = Box<dyn FnMut(&InteractionState) + Send>;

/// Posted back to the controller from timers and lookup tasks.
#[derive(Debug)]
enum Message {
    DebounceFired(u64),
    Loaded {
        generation: u64,
        result: Result<Vec<Suggestion>>,
    },
}

/// Drives one autocomplete widget.
pub struct AutocompleteController {
    state: InteractionState,
    settings: AutocompleteSettings,
    source: Arc<dyn SuggestionSource>,
    scheduler: Arc<dyn Scheduler>,
    error_log: Arc<dyn ErrorLog>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Pending debounce timer, if any
    debounce: Option<TimerHandle>,
    /// Bumped on every schedule/cancel so a fire that raced a cancel is ignored
    debounce_seq: u64,
    /// Lookups spawned and not yet delivered
    in_flight: usize,
    on_city_select: Option<SelectCallback>,
    on_search: Option<TextCallback>,
    on_change: Option<TextCallback>,
    observers: Vec<StateObserver>,
}

impl AutocompleteController {
    /// Create a controller.
    pub fn new(
        source: Arc<dyn SuggestionSource>,
        scheduler: Arc<dyn Scheduler>,
        settings: AutocompleteSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: InteractionState::new(),
            settings,
            source,
            scheduler,
            error_log: Arc::new(TracingErrorLog),
            tx,
            rx,
            debounce: None,
            debounce_seq: 0,
            in_flight: 0,
            on_city_select: None,
            on_search: None,
            on_change: None,
            observers: Vec::new(),
        }
    }

    pub fn with_error_log(mut self, error_log: Arc<dyn ErrorLog>) -> Self {
        self.error_log = error_log;
        self
    }

    /// Called with the suggestion the user picked.
    pub fn on_city_select(mut self, callback: impl FnMut(&Suggestion) + Send + 'static) -> Self {
        self.on_city_select = Some(Box::new(callback));
        self
    }

    /// Called with the raw text when the user searches without picking a suggestion.
    pub fn on_search(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_search = Some(Box::new(callback));
        self
    }

    /// Called whenever the field's text changes.
    pub fn on_change(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Register an observer that sees the state after every transition.
    pub fn observe(mut self, observer: impl FnMut(&InteractionState) + Send + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read-only view
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn settings(&self) -> &AutocompleteSettings {
        &self.settings
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        self.state.suggestions()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.selected_index()
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.state.last_error()
    }

    /// Display-safe text for the current error.
    pub fn error_message(&self) -> Option<String> {
        self.state.last_error().map(ClassifiedError::user_facing_message)
    }

    pub fn can_retry(&self) -> bool {
        self.state.can_retry(&self.settings)
    }

    /// Lookups spawned and not yet delivered, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_pending_debounce(&self) -> bool {
        self.debounce.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────

    pub fn input(&mut self, text: impl Into<String>) {
        self.dispatch(Event::Input(text.into()));
    }

    pub fn key(&mut self, key: Key) {
        self.dispatch(Event::Key(key));
    }

    pub fn select(&mut self, index: usize) {
        self.dispatch(Event::Select(index));
    }

    pub fn retry(&mut self) {
        self.dispatch(Event::Retry);
    }

    pub fn clear(&mut self) {
        self.dispatch(Event::Clear);
    }

    pub fn submit(&mut self) {
        self.dispatch(Event::Submit);
    }

    pub fn focus(&mut self) {
        self.dispatch(Event::Focus);
    }

    pub fn blur(&mut self) {
        self.dispatch(Event::Blur);
    }

    /// Apply one event and carry out its effects.
    pub fn dispatch(&mut self, event: Event) {
        let transition = std::mem::take(&mut self.state).apply(event, &self.settings);
        self.state = transition.state;

        for effect in transition.effects {
            self.run(effect);
        }

        for observer in &mut self.observers {
            observer(&self.state);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────

    /// Apply every message already waiting. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Wait for the next timer fire or lookup completion and apply it.
    ///
    /// Waits forever if nothing is pending.
    pub async fn next_event(&mut self) {
        // The controller holds a sender, so the channel never closes
        if let Some(message) = self.rx.recv().await {
            self.handle(message);
        }
    }

    /// Run until no debounce is pending and every spawned lookup has reported back.
    pub async fn settle(&mut self) {
        loop {
            self.process_pending();
            if self.in_flight == 0 && self.debounce.is_none() {
                return;
            }
            self.next_event().await;
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::DebounceFired(seq) => {
                if seq != self.debounce_seq {
                    debug!(seq = seq, current = self.debounce_seq, "Ignoring superseded debounce");
                    return;
                }
                self.debounce = None;
                self.dispatch(Event::DebounceElapsed);
            }
            Message::Loaded { generation, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if !self.state.accepts(generation) {
                    debug!(
                        generation = generation,
                        current = self.state.request_generation(),
                        "Discarding stale suggestions"
                    );
                }
                self.dispatch(Event::SuggestionsLoaded { generation, result });
            }
        }
    }

    fn run(&mut self, effect: Effect) {
        match effect {
            Effect::ScheduleDebounce(delay) => {
                self.cancel_debounce();
                let seq = self.debounce_seq;
                let tx = self.tx.clone();
                let handle = self.scheduler.schedule(
                    delay,
                    Box::new(move || {
                        let _ = tx.send(Message::DebounceFired(seq));
                    }),
                );
                self.debounce = Some(handle);
            }
            Effect::CancelDebounce => self.cancel_debounce(),
            Effect::Fetch { generation, query } => self.spawn_fetch(generation, query),
            Effect::NotifyChange(text) => {
                if let Some(callback) = &mut self.on_change {
                    callback(&text);
                }
            }
            Effect::NotifySelect(suggestion) => {
                if let Some(callback) = &mut self.on_city_select {
                    callback(&suggestion);
                }
            }
            Effect::NotifySearch(text) => {
                if let Some(callback) = &mut self.on_search {
                    callback(&text);
                }
            }
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.cancel();
        }
        self.debounce_seq += 1;
    }

    fn spawn_fetch(&mut self, generation: u64, query: String) {
        let source = Arc::clone(&self.source);
        let error_log = Arc::clone(&self.error_log);
        let tx = self.tx.clone();
        self.in_flight += 1;

        debug!(generation = generation, query = %query, "Fetching suggestions");

        tokio::spawn(async move {
            let lookup = source.get_suggestions(&query);
            let result = match AssertUnwindSafe(lookup).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    let error = ClassifiedError::unknown(
                        "Suggestion lookup panicked",
                        "Unable to fetch city suggestions. Please try again.",
                    );
                    record(error_log.as_ref(), &error, CONTROLLER_CONTEXT);
                    Err(error)
                }
            };
            let _ = tx.send(Message::Loaded { generation, result });
        });
    }
}

impl Drop for AutocompleteController {
    fn drop(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.cancel();
        }
    }
}
