//! Scrubbing of tool-call argument text from generation events.
//!
//! Models that call tools may leak the raw JSON arguments of a call into the
//! narrative token stream. There is no marker around that text, so the filter
//! tracks brace balance: a fragment that opens with `{` starts a suppressed
//! block, and the block ends once the braces balance and the buffered text
//! names the tool's argument key.
//!
//! The heuristic misfires on narrative that legitimately starts with `{`.
//! Structured argument fragments ([`GenerationEvent::ToolCallFragment`]) are
//! always dropped and never touch the state machine.

use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use tracing::trace;

use crate::registry::SpecialistConfig;
use crate::types::GenerationEvent;

/// Where the filter is within the text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Passthrough,
    InToolArgs,
}

/// Streaming tool-argument filter for one session.
#[derive(Debug)]
pub struct ToolArgumentFilter {
    argument_keys: Vec<&'static str>,
    state: FilterState,
    bracket_depth: i64,
    buffer: String,
    finished: bool,
}

impl ToolArgumentFilter {
    /// Filter for `config`; inactive unless the specialist exposes a tool.
    pub fn for_specialist(config: &SpecialistConfig) -> Self {
        let argument_keys = config
            .capability_tools
            .iter()
            .map(|tool| tool.argument_key())
            .collect();
        Self::with_argument_keys(argument_keys)
    }

    /// Filter that forwards all text.
    pub fn passthrough() -> Self {
        Self::with_argument_keys(Vec::new())
    }

    fn with_argument_keys(argument_keys: Vec<&'static str>) -> Self {
        Self {
            argument_keys,
            state: FilterState::Passthrough,
            bracket_depth: 0,
            buffer: String::new(),
            finished: false,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !self.argument_keys.is_empty()
    }

    /// Feed one event; returns what the caller should see, if anything.
    pub fn accept(&mut self, event: GenerationEvent) -> Option<GenerationEvent> {
        if self.finished {
            return None;
        }

        match event {
            GenerationEvent::ToolCallFragment { raw } => {
                trace!(len = raw.len(), "Dropping tool-call fragment");
                None
            }
            GenerationEvent::TextDelta {
                fragment,
                specialist,
            } => {
                if !self.is_active() || self.scrub(&fragment) {
                    Some(GenerationEvent::TextDelta {
                        fragment,
                        specialist,
                    })
                } else {
                    None
                }
            }
            terminal => {
                self.finished = true;
                Some(terminal)
            }
        }
    }

    /// Advance the state machine; true when `fragment` should be forwarded.
    fn scrub(&mut self, fragment: &str) -> bool {
        match self.state {
            FilterState::Passthrough => {
                if !fragment.trim_start().starts_with('{') {
                    return true;
                }
                trace!("Entering tool-argument block");
                self.state = FilterState::InToolArgs;
                self.consume(fragment);
                false
            }
            FilterState::InToolArgs => {
                self.consume(fragment);
                false
            }
        }
    }

    fn consume(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        for c in fragment.chars() {
            match c {
                '{' => self.bracket_depth += 1,
                '}' => self.bracket_depth -= 1,
                _ => {}
            }
        }

        if self.bracket_depth <= 0 && self.names_argument_key() {
            trace!(suppressed = self.buffer.len(), "Leaving tool-argument block");
            self.state = FilterState::Passthrough;
            self.bracket_depth = 0;
            self.buffer.clear();
        }
    }

    fn names_argument_key(&self) -> bool {
        self.argument_keys.iter().any(|key| self.buffer.contains(key))
    }
}

/// Apply `filter` to a whole event stream.
pub fn filter_events<S>(events: S, filter: ToolArgumentFilter) -> BoxStream<'static, GenerationEvent>
where
    S: Stream<Item = GenerationEvent> + Send + 'static,
{
    events
        .scan(filter, |filter, event| future::ready(Some(filter.accept(event))))
        .filter_map(future::ready)
        .boxed()
}
