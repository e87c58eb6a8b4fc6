//! Autocomplete interaction state and its transition function.
//!
//! Epistemic foundation:
//! - K_i: `apply` is pure; every side effect is returned as an [`Effect`]
//! - K_i: A result is applied only if its generation is the latest issued
//!   and the state is still waiting for it
//! - K_i: `selected_index` is `None` or a valid index into `suggestions`
//! - K_i: The dropdown is closed whenever there is nothing to show
//! - I^B: Responses may arrive in any order → generation tagging

use crate::client::MIN_QUERY_CHARS;
use crate::models::{AutocompleteConfig, ClassifiedError, Result, Suggestion};
use std::time::Duration;

/// Navigation keys the widget reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
}

/// Everything that can happen to the widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Text field changed
    Input(String),
    /// Quiet period after the last keystroke has passed
    DebounceElapsed,
    /// A lookup finished
    SuggestionsLoaded {
        generation: u64,
        result: Result<Vec<Suggestion>>,
    },
    Key(Key),
    /// Suggestion clicked
    Select(usize),
    /// "Try again" clicked
    Retry,
    /// Clear button clicked
    Clear,
    /// Search button clicked
    Submit,
    Focus,
    /// Click outside the widget
    Blur,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start (or restart) the debounce timer
    ScheduleDebounce(Duration),
    CancelDebounce,
    /// Look up suggestions, tagging the result with `generation`
    Fetch { generation: u64, query: String },
    NotifyChange(String),
    NotifySelect(Suggestion),
    NotifySearch(String),
}

/// Tunables for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocompleteSettings {
    pub debounce: Duration,
    /// Manual retries allowed before the retry affordance is hidden
    pub max_manual_retries: u32,
}

impl Default for AutocompleteSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_manual_retries: 2,
        }
    }
}

impl From<&AutocompleteConfig> for AutocompleteSettings {
    fn from(config: &AutocompleteConfig) -> Self {
        Self {
            debounce: config.debounce(),
            max_manual_retries: config.max_manual_retries,
        }
    }
}

/// Snapshot of the widget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    raw_query: String,
    debounced_query: String,
    suggestions: Vec<Suggestion>,
    is_open: bool,
    is_loading: bool,
    selected_index: Option<usize>,
    last_error: Option<ClassifiedError>,
    retry_attempts: u32,
    request_generation: u64,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: InteractionState,
    pub effects: Vec<Effect>,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text currently in the field.
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Text the last lookup decision was made on.
    pub fn debounced_query(&self) -> &str {
        &self.debounced_query
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&Suggestion> {
        self.selected_index.and_then(|i| self.suggestions.get(i))
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.last_error.as_ref()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Generation of the most recently issued lookup.
    pub fn request_generation(&self) -> u64 {
        self.request_generation
    }

    /// Whether the retry affordance should be offered.
    pub fn can_retry(&self, settings: &AutocompleteSettings) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(|error| error.is_retryable())
            && self.retry_attempts < settings.max_manual_retries
    }

    /// Whether a finished lookup tagged `generation` would be applied.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_loading && generation == self.request_generation
    }

    /// Apply one event.
    pub fn apply(self, event: Event, settings: &AutocompleteSettings) -> Transition {
        let mut state = self;
        let mut effects = Vec::new();

        match event {
            Event::Input(text) => {
                state.raw_query = text.clone();
                state.selected_index = None;
                state.last_error = None;
                effects.push(Effect::NotifyChange(text));
                effects.push(Effect::ScheduleDebounce(settings.debounce));
            }

            Event::DebounceElapsed => {
                if state.raw_query != state.debounced_query {
                    state.debounced_query = state.raw_query.clone();
                    let query = state.debounced_query.trim().to_string();

                    if query.chars().count() < MIN_QUERY_CHARS {
                        state.suggestions.clear();
                        state.is_open = false;
                        state.is_loading = false;
                        state.last_error = None;
                        state.selected_index = None;
                    } else {
                        state.request_generation += 1;
                        state.is_loading = true;
                        state.last_error = None;
                        effects.push(Effect::Fetch {
                            generation: state.request_generation,
                            query,
                        });
                    }
                }
            }

            Event::SuggestionsLoaded { generation, result } => {
                if state.accepts(generation) {
                    state.is_loading = false;
                    state.selected_index = None;
                    match result {
                        Ok(suggestions) => {
                            state.is_open = !suggestions.is_empty();
                            state.suggestions = suggestions;
                            state.last_error = None;
                            state.retry_attempts = 0;
                        }
                        Err(error) => {
                            state.suggestions.clear();
                            state.last_error = Some(error);
                            state.is_open = true;
                        }
                    }
                }
            }

            Event::Key(Key::ArrowDown) => {
                let count = state.suggestions.len();
                if state.is_open && count > 0 {
                    state.selected_index = Some(match state.selected_index {
                        Some(i) => (i + 1) % count,
                        None => 0,
                    });
                }
            }

            Event::Key(Key::ArrowUp) => {
                let count = state.suggestions.len();
                if state.is_open && count > 0 {
                    state.selected_index = Some(match state.selected_index {
                        Some(0) | None => count - 1,
                        Some(i) => i - 1,
                    });
                }
            }

            Event::Key(Key::Enter) => match state.selected_index {
                Some(index) if state.is_open && index < state.suggestions.len() => {
                    state.commit(index, &mut effects);
                }
                _ => effects.push(Effect::NotifySearch(state.raw_query.clone())),
            },

            Event::Key(Key::Escape) | Event::Blur => {
                state.is_open = false;
                state.selected_index = None;
            }

            Event::Select(index) => {
                if index < state.suggestions.len() {
                    state.commit(index, &mut effects);
                }
            }

            Event::Retry => {
                if state.can_retry(settings) {
                    state.retry_attempts += 1;
                    state.last_error = None;
                    state.request_generation += 1;
                    state.is_loading = true;
                    effects.push(Effect::Fetch {
                        generation: state.request_generation,
                        query: state.debounced_query.trim().to_string(),
                    });
                }
            }

            Event::Clear => {
                let generation = state.request_generation;
                state = InteractionState {
                    request_generation: generation,
                    ..InteractionState::default()
                };
                effects.push(Effect::CancelDebounce);
                effects.push(Effect::NotifyChange(String::new()));
            }

            Event::Submit => effects.push(Effect::NotifySearch(state.raw_query.clone())),

            Event::Focus => {
                if !state.suggestions.is_empty() {
                    state.is_open = true;
                }
            }
        }

        Transition {
            state: state.normalized(),
            effects,
        }
    }

    /// Take suggestion `index` as the field's value.
    fn commit(&mut self, index: usize, effects: &mut Vec<Effect>) {
        let suggestion = self.suggestions[index].clone();
        self.raw_query = suggestion.main_text.clone();
        self.debounced_query = suggestion.main_text.clone();
        self.is_open = false;
        self.is_loading = false;
        self.selected_index = None;

        effects.push(Effect::CancelDebounce);
        effects.push(Effect::NotifyChange(suggestion.main_text.clone()));
        effects.push(Effect::NotifySelect(suggestion));
    }

    fn normalized(mut self) -> Self {
        if self.selected_index.is_some_and(|i| i >= self.suggestions.len()) {
            self.selected_index = None;
        }
        if self.suggestions.is_empty() && self.last_error.is_none() {
            self.is_open = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn suggestion(name: &str) -> Suggestion {
        Suggestion {
            place_id: format!("id-{name}"),
            description: format!("{name}, Country"),
            main_text: name.to_string(),
            secondary_text: "Country".to_string(),
            category_tags: BTreeSet::from(["locality".to_string()]),
        }
    }

    fn three() -> Vec<Suggestion> {
        vec![suggestion("Paris"), suggestion("Parma"), suggestion("Paraty")]
    }

    fn settings() -> AutocompleteSettings {
        AutocompleteSettings::default()
    }

    fn step(state: InteractionState, event: Event) -> Transition {
        state.apply(event, &settings())
    }

    /// Type `text`, let the debounce elapse, and deliver `result` for the fetch.
    fn loaded(text: &str, result: Result<Vec<Suggestion>>) -> InteractionState {
        let state = step(InteractionState::new(), Event::Input(text.into())).state;
        let state = step(state, Event::DebounceElapsed).state;
        let generation = state.request_generation();
        step(state, Event::SuggestionsLoaded { generation, result }).state
    }

    fn provider_error(retryable: bool) -> ClassifiedError {
        ClassifiedError::new(ErrorKind::Provider, "HTTP 503", "", Some(503), retryable, None)
    }

    #[test]
    fn test_input_notifies_and_schedules() {
        let t = step(InteractionState::new(), Event::Input("Pa".into()));
        assert_eq!(t.state.raw_query(), "Pa");
        assert_eq!(t.state.debounced_query(), "");
        assert_eq!(
            t.effects,
            vec![
                Effect::NotifyChange("Pa".into()),
                Effect::ScheduleDebounce(Duration::from_millis(300)),
            ]
        );
    }

    #[test]
    fn test_short_query_never_fetches() {
        let state = step(InteractionState::new(), Event::Input("a".into())).state;
        let t = step(state, Event::DebounceElapsed);

        assert!(t.effects.is_empty());
        assert!(!t.state.is_open());
        assert!(!t.state.is_loading());
        assert_eq!(t.state.request_generation(), 0);
    }

    #[test]
    fn test_debounce_issues_tagged_fetch() {
        let state = step(InteractionState::new(), Event::Input("  Par ".into())).state;
        let t = step(state, Event::DebounceElapsed);

        assert!(t.state.is_loading());
        assert_eq!(
            t.effects,
            vec![Effect::Fetch {
                generation: 1,
                query: "Par".into()
            }]
        );

        // Unchanged text does not fetch again
        let t = step(t.state, Event::DebounceElapsed);
        assert!(t.effects.is_empty());
        assert_eq!(t.state.request_generation(), 1);
    }

    #[test]
    fn test_results_open_dropdown() {
        let state = loaded("Par", Ok(three()));
        assert!(state.is_open());
        assert!(!state.is_loading());
        assert_eq!(state.suggestions().len(), 3);
        assert_eq!(state.selected_index(), None);

        let empty = loaded("Xyz", Ok(vec![]));
        assert!(!empty.is_open());
    }

    #[test]
    fn test_arrow_down_wraps() {
        let mut state = loaded("Par", Ok(three()));
        let mut seen = Vec::new();
        for _ in 0..5 {
            state = step(state, Event::Key(Key::ArrowDown)).state;
            seen.push(state.selected_index().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_arrow_up_wraps() {
        let mut state = loaded("Par", Ok(three()));
        let mut seen = Vec::new();
        for _ in 0..4 {
            state = step(state, Event::Key(Key::ArrowUp)).state;
            seen.push(state.selected_index().unwrap());
        }
        assert_eq!(seen, vec![2, 1, 0, 2]);
    }

    #[test]
    fn test_arrows_ignored_when_closed() {
        let state = step(loaded("Par", Ok(three())), Event::Key(Key::Escape)).state;
        let state = step(state, Event::Key(Key::ArrowDown)).state;
        assert_eq!(state.selected_index(), None);
    }

    #[test]
    fn test_stale_generation_discarded() {
        let state = step(InteractionState::new(), Event::Input("Pa".into())).state;
        let state = step(state, Event::DebounceElapsed).state;
        let state = step(state, Event::Input("Par".into())).state;
        let state = step(state, Event::DebounceElapsed).state;
        assert_eq!(state.request_generation(), 2);

        let state = step(
            state,
            Event::SuggestionsLoaded {
                generation: 2,
                result: Ok(vec![suggestion("Paris")]),
            },
        )
        .state;
        let t = step(
            state.clone(),
            Event::SuggestionsLoaded {
                generation: 1,
                result: Ok(three()),
            },
        );

        assert_eq!(t.state, state);
        assert_eq!(t.state.suggestions()[0].main_text, "Paris");
        assert_eq!(t.state.suggestions().len(), 1);
    }

    #[test]
    fn test_error_shown_and_retry_capped() {
        let state = loaded("Par", Err(provider_error(true)));
        assert!(state.is_open());
        assert!(state.suggestions().is_empty());
        assert!(state.can_retry(&settings()));

        let mut state = state;
        for attempt in 1..=2 {
            let t = step(state, Event::Retry);
            assert_eq!(
                t.effects,
                vec![Effect::Fetch {
                    generation: 1 + attempt,
                    query: "Par".into()
                }]
            );
            let generation = t.state.request_generation();
            state = step(
                t.state,
                Event::SuggestionsLoaded {
                    generation,
                    result: Err(provider_error(true)),
                },
            )
            .state;
            assert_eq!(state.retry_attempts(), attempt as u32);
        }

        assert!(!state.can_retry(&settings()));
        let t = step(state, Event::Retry);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_permanent_error_not_retryable() {
        let state = loaded("Par", Err(provider_error(false)));
        assert!(!state.can_retry(&settings()));
        assert!(step(state, Event::Retry).effects.is_empty());
    }

    #[test]
    fn test_success_resets_retry_attempts() {
        let state = loaded("Par", Err(provider_error(true)));
        let t = step(state, Event::Retry);
        let generation = t.state.request_generation();
        let state = step(
            t.state,
            Event::SuggestionsLoaded {
                generation,
                result: Ok(three()),
            },
        )
        .state;
        assert_eq!(state.retry_attempts(), 0);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_input_clears_error() {
        let state = loaded("Par", Err(provider_error(true)));
        let state = step(state, Event::Input("Pari".into())).state;
        assert!(state.last_error().is_none());
        assert!(!state.is_open());
    }

    #[test]
    fn test_enter_commits_selection() {
        let state = step(loaded("Par", Ok(three())), Event::Key(Key::ArrowDown)).state;
        let state = step(state, Event::Key(Key::ArrowDown)).state;
        let t = step(state, Event::Key(Key::Enter));

        assert_eq!(t.state.raw_query(), "Parma");
        assert_eq!(t.state.debounced_query(), "Parma");
        assert!(!t.state.is_open());
        assert_eq!(t.state.selected_index(), None);
        assert_eq!(
            t.effects,
            vec![
                Effect::CancelDebounce,
                Effect::NotifyChange("Parma".into()),
                Effect::NotifySelect(suggestion("Parma")),
            ]
        );

        // Committed text does not trigger another lookup
        assert!(step(t.state, Event::DebounceElapsed).effects.is_empty());
    }

    #[test]
    fn test_enter_without_selection_searches() {
        let state = step(InteractionState::new(), Event::Input("Lisbon".into())).state;
        let t = step(state, Event::Key(Key::Enter));
        assert_eq!(t.effects, vec![Effect::NotifySearch("Lisbon".into())]);

        let open = loaded("Par", Ok(three()));
        let t = step(open, Event::Key(Key::Enter));
        assert_eq!(t.effects, vec![Effect::NotifySearch("Par".into())]);

        let t = step(InteractionState::new(), Event::Submit);
        assert_eq!(t.effects, vec![Effect::NotifySearch(String::new())]);
    }

    #[test]
    fn test_escape_keeps_text() {
        let state = step(loaded("Par", Ok(three())), Event::Key(Key::ArrowDown)).state;
        let t = step(state, Event::Key(Key::Escape));
        assert!(!t.state.is_open());
        assert_eq!(t.state.selected_index(), None);
        assert_eq!(t.state.raw_query(), "Par");
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_click_select() {
        let t = step(loaded("Par", Ok(three())), Event::Select(2));
        assert_eq!(t.state.raw_query(), "Paraty");
        assert!(t.effects.contains(&Effect::NotifySelect(suggestion("Paraty"))));

        let t = step(loaded("Par", Ok(three())), Event::Select(7));
        assert!(t.effects.is_empty());
        assert!(t.state.is_open());
    }

    #[test]
    fn test_clear_resets_but_keeps_generation() {
        let state = step(InteractionState::new(), Event::Input("Par".into())).state;
        let state = step(state, Event::DebounceElapsed).state;
        let t = step(state, Event::Clear);

        assert_eq!(t.state.raw_query(), "");
        assert!(!t.state.is_loading());
        assert_eq!(t.state.request_generation(), 1);
        assert_eq!(
            t.effects,
            vec![Effect::CancelDebounce, Effect::NotifyChange(String::new())]
        );

        // The in-flight lookup lands after the clear and is ignored
        let late = step(
            t.state.clone(),
            Event::SuggestionsLoaded {
                generation: 1,
                result: Ok(three()),
            },
        );
        assert_eq!(late.state, t.state);
    }

    #[test]
    fn test_blur_and_focus() {
        let state = step(loaded("Par", Ok(three())), Event::Blur).state;
        assert!(!state.is_open());
        let state = step(state, Event::Focus).state;
        assert!(state.is_open());

        let empty = step(InteractionState::new(), Event::Focus).state;
        assert!(!empty.is_open());
    }

    #[test]
    fn test_invariants_hold_under_random_events() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = InteractionState::new();

        for _ in 0..2_000 {
            let generation = state.request_generation().saturating_sub(rng.random_range(0..2));
            let event = match rng.random_range(0..13) {
                0 => Event::Input("a".into()),
                1 => Event::Input("Par".into()),
                2 => Event::Input("Lis".into()),
                3 => Event::DebounceElapsed,
                4 => Event::SuggestionsLoaded {
                    generation,
                    result: Ok(three()[..rng.random_range(0..3usize)].to_vec()),
                },
                5 => Event::SuggestionsLoaded {
                    generation,
                    result: Err(provider_error(rng.random())),
                },
                6 => Event::Key(Key::ArrowDown),
                7 => Event::Key(Key::ArrowUp),
                8 => Event::Key(Key::Enter),
                9 => Event::Key(Key::Escape),
                10 => Event::Select(rng.random_range(0..4usize)),
                11 => Event::Retry,
                _ => [Event::Clear, Event::Focus, Event::Blur, Event::Submit]
                    [rng.random_range(0..4usize)]
                .clone(),
            };

            let before = state.request_generation();
            state = step(state, event).state;

            assert!(state.request_generation() >= before);
            if let Some(i) = state.selected_index() {
                assert!(i < state.suggestions().len());
            }
            if state.suggestions().is_empty() && state.last_error().is_none() {
                assert!(!state.is_open());
            }
        }
    }
}
