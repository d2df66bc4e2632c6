//! Per-user conversion session: one source, many targets, one amount.

use crate::core::currency::Currency;
use crate::core::engine::ConversionEngine;
use crate::core::error::{ConversionError, ConversionResult};
use crate::core::format::format_amount;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub type UserId = i64;

#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_targets: usize,
    pub max_amount: f64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_targets: 10,
            max_amount: 99_999_999_999_999.0,
        }
    }
}

/// Source currency and selected targets, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub source: Currency,
    pub targets: Vec<Currency>,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    SourceSelected(Selection),
    AmountRequested(Selection),
}

/// Externally visible lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SourceSelected,
    AmountRequested,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::SourceSelected => "selecting targets",
            Phase::AmountRequested => "waiting for an amount",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

/// Result for one target currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionLine {
    pub target: Currency,
    pub outcome: ConversionResult<ConvertedAmount>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertedAmount {
    pub value: f64,
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

/// Everything produced by one completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub source: Currency,
    pub amount: f64,
    pub lines: Vec<ConversionLine>,
}

impl ConversionReport {
    /// Most recent table timestamp among the successful lines.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.lines
            .iter()
            .filter_map(|line| line.outcome.as_ref().ok().map(|c| c.as_of))
            .max()
    }

    /// Plain-text rendering, one line per target in selection order.
    pub fn render(&self) -> String {
        let mut out = format!("{} {} =", format_amount(self.amount), self.source);
        for line in &self.lines {
            out.push('\n');
            match &line.outcome {
                Ok(c) => out.push_str(&format!(
                    "  {} {} (1 {} = {} {})",
                    format_amount(c.value),
                    line.target,
                    self.source,
                    format_amount(c.rate),
                    line.target
                )),
                Err(e) => out.push_str(&format!("  {}: {}", line.target, e)),
            }
        }
        out
    }
}

/// Parses user-typed amount text, accepting `,` as the decimal separator.
pub fn parse_amount(text: &str, max_amount: f64) -> ConversionResult<f64> {
    let normalized = text.trim().replace(',', ".");
    let out_of_range = |reason: &str| ConversionError::AmountOutOfRange {
        input: text.trim().to_string(),
        reason: reason.to_string(),
    };
    let amount: f64 = normalized
        .parse()
        .map_err(|_| out_of_range("not a number"))?;
    if !amount.is_finite() {
        return Err(out_of_range("not a number"));
    }
    if amount <= 0.0 {
        return Err(out_of_range("must be positive"));
    }
    if amount > max_amount {
        return Err(out_of_range("too large"));
    }
    Ok(amount)
}

#[derive(Debug, Clone)]
pub struct ConversionSession {
    state: State,
    limits: SessionLimits,
    last_activity: Instant,
}

impl ConversionSession {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            state: State::Idle,
            limits,
            last_activity: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::SourceSelected(_) => Phase::SourceSelected,
            State::AmountRequested(_) => Phase::AmountRequested,
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        match &self.state {
            State::Idle => None,
            State::SourceSelected(s) | State::AmountRequested(s) => Some(s),
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn unexpected(&self, operation: &'static str) -> ConversionError {
        ConversionError::UnexpectedState {
            operation,
            state: self.phase().as_str(),
        }
    }

    /// Starts a new selection. Any previous selection is discarded.
    pub fn pick(&mut self, source: &str) -> ConversionResult<Currency> {
        let source: Currency = source.parse()?;
        self.touch();
        debug!(%source, "Source currency picked");
        self.state = State::SourceSelected(Selection {
            source,
            targets: Vec::new(),
        });
        Ok(source)
    }

    /// Adds `target` to the selection, or removes it when already selected.
    pub fn toggle(&mut self, target: &str) -> ConversionResult<Toggled> {
        let max_targets = self.limits.max_targets;
        let State::SourceSelected(selection) = &mut self.state else {
            return Err(self.unexpected("toggle a target"));
        };
        let target: Currency = target.parse()?;
        if target == selection.source {
            return Err(ConversionError::SameAsSource(target));
        }
        let toggled = if let Some(pos) = selection.targets.iter().position(|t| *t == target) {
            selection.targets.remove(pos);
            Toggled::Removed
        } else {
            if selection.targets.len() >= max_targets {
                return Err(ConversionError::TargetLimitExceeded { limit: max_targets });
            }
            selection.targets.push(target);
            Toggled::Added
        };
        self.touch();
        Ok(toggled)
    }

    pub fn request_amount(&mut self) -> ConversionResult<()> {
        let State::SourceSelected(selection) = &self.state else {
            return Err(self.unexpected("request an amount"));
        };
        if selection.targets.is_empty() {
            return Err(ConversionError::NoTargetsSelected);
        }
        let selection = selection.clone();
        self.state = State::AmountRequested(selection);
        self.touch();
        Ok(())
    }

    /// Converts into every selected target and ends the session.
    ///
    /// Invalid amount text keeps the session waiting for another attempt.
    pub async fn submit_amount(
        &mut self,
        text: &str,
        engine: &ConversionEngine,
    ) -> ConversionResult<ConversionReport> {
        let State::AmountRequested(selection) = &self.state else {
            return Err(self.unexpected("submit an amount"));
        };
        self.last_activity = Instant::now();
        let amount = parse_amount(text, self.limits.max_amount)?;
        let source = selection.source;

        let quotes = engine.quote_many(source, &selection.targets).await;
        let lines = selection
            .targets
            .iter()
            .zip(quotes)
            .map(|(&target, quote)| {
                let outcome = quote.map(|quote| ConvertedAmount {
                    value: amount * quote.rate,
                    rate: quote.rate,
                    as_of: quote.as_of,
                });
                if let Err(e) = &outcome {
                    debug!(%source, %target, error = %e, "Conversion failed for target");
                }
                ConversionLine { target, outcome }
            })
            .collect();

        self.reset();
        Ok(ConversionReport {
            source,
            amount,
            lines,
        })
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.touch();
    }
}

/// Sessions keyed by user, each checked out exclusively while in use.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, ConversionSession>>,
    limits: SessionLimits,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(limits: SessionLimits, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            limits,
            idle_timeout,
        }
    }

    /// Takes the user's session out of the registry, first dropping every
    /// session idle past the timeout. An expired session comes back as a
    /// fresh idle one.
    pub async fn checkout(&self, user: UserId) -> ConversionSession {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.idle_for() < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "Expired idle sessions");
        }
        sessions
            .remove(&user)
            .unwrap_or_else(|| ConversionSession::new(self.limits.clone()))
    }

    /// Returns a session to the registry. Idle sessions are simply dropped.
    pub async fn checkin(&self, user: UserId, session: ConversionSession) {
        if session.phase() == Phase::Idle {
            return;
        }
        self.sessions.lock().await.insert(user, session);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
