//! Deciding which providers take part in a conversation turn.
//!
//! Two modes share one turn history:
//! - single-select round-robins through the available providers
//! - multi-select scores every provider against the message and lets each
//!   one whose score clears [`PARTICIPATION_THRESHOLD`] respond

use crate::utils::toml_config::ParticipationConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Score a provider must exceed to join a multi-provider turn.
pub const PARTICIPATION_THRESHOLD: f64 = 0.5;

/// How many recent turns are checked when forcing a participant.
const RECENT_TURNS: usize = 3;

const MAX_HISTORY: usize = 64;

const QUESTION_WORDS: &[&str] = &["how", "what", "why", "when", "where"];

const ENGAGEMENT_WORDS: &[&str] = &[
    "think", "opinion", "idea", "approach", "solution", "help", "thoughts",
];

struct ParticipationState {
    history: VecDeque<String>,
    rng: StdRng,
}

impl ParticipationState {
    fn record(&mut self, provider: &str) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(provider.to_string());
    }

    fn recent(&self, n: usize) -> impl Iterator<Item = &String> {
        self.history.iter().rev().take(n)
    }
}

pub struct ParticipantCoordinator {
    config: ParticipationConfig,
    state: Mutex<ParticipationState>,
}

impl ParticipantCoordinator {
    pub fn new(config: ParticipationConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Reproducible jitter for tests and simulations.
    pub fn with_seed(config: ParticipationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ParticipationConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: Mutex::new(ParticipationState {
                history: VecDeque::new(),
                rng,
            }),
        }
    }

    /// Pick the next speaker in round-robin order.
    ///
    /// Continues after the last speaker, or starts from the first available
    /// provider when there is no history or the last speaker is unavailable.
    pub fn select_participant(&self, available: &[String]) -> Option<String> {
        let first = available.first()?;
        let mut state = self.state.lock();

        let next = state
            .history
            .back()
            .and_then(|last| available.iter().position(|p| p == last))
            .map(|idx| &available[(idx + 1) % available.len()])
            .unwrap_or(first)
            .clone();

        state.record(&next);
        Some(next)
    }

    /// Decide which of `available` should respond to `message`.
    ///
    /// An `@provider` mention selects exactly that provider. Otherwise every
    /// provider is scored; if none qualifies, one is forced, preferring a
    /// provider that has not spoken in the last few turns.
    pub fn get_participating_providers(&self, message: &str, available: &[String]) -> Vec<String> {
        if available.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.lock();

        if let Some(mentioned) = find_mention(message, available) {
            state.record(&mentioned);
            return vec![mentioned];
        }

        let base = self.message_score(message);
        let window = self.config.dominance_window;
        let jitter = self.config.jitter;

        let mut participants = Vec::new();
        for provider in available {
            let mut score = base;
            if window > 0 {
                let spoke = state.recent(window).filter(|p| *p == provider).count();
                if spoke * 2 > window {
                    score /= 2.0;
                }
            }
            if jitter > 0.0 {
                score += state.rng.random_range(-jitter..=jitter);
            }
            tracing::trace!(provider = %provider, score, "participation score");
            if score > PARTICIPATION_THRESHOLD {
                participants.push(provider.clone());
            }
        }

        if participants.is_empty() {
            let forced = available
                .iter()
                .find(|p| !state.recent(RECENT_TURNS).any(|recent| recent == *p))
                .unwrap_or(&available[0])
                .clone();
            participants.push(forced);
        }

        for provider in &participants {
            state.record(provider);
        }
        participants
    }

    /// Message-dependent part of the score, before dominance and jitter.
    fn message_score(&self, message: &str) -> f64 {
        let lowered = message.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut score = self.config.base_chance;
        if message.contains('?') || words.iter().any(|w| QUESTION_WORDS.contains(w)) {
            score += self.config.question_boost;
        }
        if words.iter().any(|w| ENGAGEMENT_WORDS.contains(w)) {
            score += self.config.engagement_boost;
        }
        score
    }

}

/// First `@name` in `message` naming an available provider, case-insensitively.
fn find_mention(message: &str, available: &[String]) -> Option<String> {
    message.split('@').skip(1).find_map(|rest| {
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();
        let name = name.trim_end_matches('.');
        available
            .iter()
            .find(|p| p.eq_ignore_ascii_case(name))
            .cloned()
    })
}
