//! Fixed-interval scheduling of the bot's periodic actions
//!
//! Each action cycles `Idle -> Due -> Running -> Idle`. An action becomes due
//! once its interval has elapsed since `last_run`, is claimed by the main loop,
//! and returns to idle when its attempt completes, whatever the outcome.
//! `last_run` records when the attempt *started*, so a slow attempt can never
//! make the same action run twice within one interval.
//!
//! Actions that have never run are due immediately, so a fresh deployment
//! posts on its first tick instead of waiting out a full interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ScheduleConfig;

/// The periodic actions. Declaration order is execution priority: the
/// derived `Ord` decides which action runs first within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    HourlyPost,
    TrendingReply,
    MentionsReply,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::HourlyPost,
        ActionKind::TrendingReply,
        ActionKind::MentionsReply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::HourlyPost => "hourly-post",
            ActionKind::TrendingReply => "trending-reply",
            ActionKind::MentionsReply => "mentions-reply",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    Due,
    Running { started: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct ScheduledAction {
    kind: ActionKind,
    interval: Duration,
    /// `None` until the first attempt completes
    last_run: Option<DateTime<Utc>>,
    running_since: Option<DateTime<Utc>>,
}

impl ScheduledAction {
    fn new(kind: ActionKind, interval: Duration) -> Self {
        Self {
            kind,
            interval,
            last_run: None,
            running_since: None,
        }
    }

    fn state(&self, now: DateTime<Utc>) -> ActionState {
        if let Some(started) = self.running_since {
            return ActionState::Running { started };
        }
        let due = match self.last_run {
            None => true,
            // A clock that went backwards yields a negative span: not due
            Some(last) => (now - last)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.interval),
        };
        if due {
            ActionState::Due
        } else {
            ActionState::Idle
        }
    }
}

/// Per-action timing state, owned by the main loop
#[derive(Debug, Clone)]
pub struct Scheduler {
    actions: Vec<ScheduledAction>,
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self::with_intervals(&[
            (ActionKind::HourlyPost, config.post_interval),
            (ActionKind::TrendingReply, config.trending_interval),
            (ActionKind::MentionsReply, config.mentions_interval),
        ])
    }

    /// Schedule only the given actions
    pub fn with_intervals(intervals: &[(ActionKind, Duration)]) -> Self {
        let mut actions: Vec<ScheduledAction> = intervals
            .iter()
            .map(|(kind, interval)| ScheduledAction::new(*kind, *interval))
            .collect();
        actions.sort_by_key(|a| a.kind);
        actions.dedup_by_key(|a| a.kind);
        Self { actions }
    }

    pub fn state(&self, kind: ActionKind, now: DateTime<Utc>) -> Option<ActionState> {
        self.find(kind).map(|a| a.state(now))
    }

    /// Due actions in priority order
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ActionKind> {
        self.actions
            .iter()
            .filter(|a| a.state(now) == ActionState::Due)
            .map(|a| a.kind)
            .collect()
    }

    /// Move a due action to running. Returns `false` if it is not due.
    pub fn claim(&mut self, kind: ActionKind, now: DateTime<Utc>) -> bool {
        match self.find_mut(kind) {
            Some(action) if action.state(now) == ActionState::Due => {
                action.running_since = Some(now);
                debug!(action = %kind, "Claimed");
                true
            }
            _ => false,
        }
    }

    /// Return a running action to idle, recording its start as `last_run`.
    ///
    /// Called after every attempt regardless of outcome. A no-op for an
    /// action that is not running.
    pub fn complete(&mut self, kind: ActionKind) {
        if let Some(action) = self.find_mut(kind) {
            if let Some(started) = action.running_since.take() {
                let advanced = action.last_run.map_or(started, |last| last.max(started));
                action.last_run = Some(advanced);
            }
        }
    }

    /// When the action last started an attempt; the epoch if it never has
    pub fn last_run(&self, kind: ActionKind) -> Option<DateTime<Utc>> {
        self.find(kind)
            .map(|a| a.last_run.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    pub fn interval(&self, kind: ActionKind) -> Option<Duration> {
        self.find(kind).map(|a| a.interval)
    }

    fn find(&self, kind: ActionKind) -> Option<&ScheduledAction> {
        self.actions.iter().find(|a| a.kind == kind)
    }

    fn find_mut(&mut self, kind: ActionKind) -> Option<&mut ScheduledAction> {
        self.actions.iter_mut().find(|a| a.kind == kind)
    }
}
