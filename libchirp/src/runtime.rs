//! The main loop and the workflow behind each scheduled action
//!
//! Every tick asks the [`Scheduler`] which actions are due and runs them one
//! after another in priority order. Errors stop at the action boundary: they
//! become an [`ActionOutcome::Failed`] in the tick report and a log line,
//! and the action still counts as attempted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{BehaviorConfig, ScheduleConfig};
use crate::dedupe::RecentIds;
use crate::error::PlatformError;
use crate::generation::Generator;
use crate::persona::{self, Sampling};
use crate::platforms::{truncate_for_post, Platform};
use crate::scheduler::{ActionKind, Scheduler};
use crate::types::{Post, PostId};

/// Characters of generated content shown in log lines
const LOG_PREVIEW_CHARS: usize = 60;

/// One reply sent (or attempted) during an action
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyAttempt {
    pub parent_id: PostId,
    pub text: String,
    pub result: Result<PostId, PlatformError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Posted { post_id: PostId, text: String },
    /// Replies in the order they were attempted
    Replied { attempts: Vec<ReplyAttempt> },
    /// Nothing new to reply to
    Idle,
    Failed { error: PlatformError },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            ActionOutcome::Posted { .. } | ActionOutcome::Idle => true,
            ActionOutcome::Replied { attempts } => attempts.iter().all(|a| a.result.is_ok()),
            ActionOutcome::Failed { .. } => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Posted { .. } => "posted",
            ActionOutcome::Replied { .. } if self.is_success() => "replied",
            ActionOutcome::Replied { .. } => "partial",
            ActionOutcome::Idle => "idle",
            ActionOutcome::Failed { .. } => "failed",
        }
    }
}

/// What happened to one action during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub action: ActionKind,
    pub started: DateTime<Utc>,
    pub outcome: ActionOutcome,
}

pub struct Runtime {
    platform: Box<dyn Platform>,
    generator: Box<dyn Generator>,
    scheduler: Scheduler,
    replied: RecentIds,
    behavior: BehaviorConfig,
    poll_interval: Duration,
}

impl Runtime {
    pub fn new(
        platform: Box<dyn Platform>,
        generator: Box<dyn Generator>,
        schedule: &ScheduleConfig,
        behavior: BehaviorConfig,
    ) -> Self {
        Self {
            platform,
            generator,
            scheduler: Scheduler::new(schedule),
            replied: RecentIds::new(behavior.dedupe_capacity),
            behavior,
            poll_interval: schedule.poll_interval,
        }
    }

    /// Replace the scheduler, e.g. to run a subset of actions
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn replied(&self) -> &RecentIds {
        &self.replied
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Tick, sleep, repeat. Never returns.
    pub async fn run_forever(&mut self) {
        info!(
            platform = self.platform.name(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Main loop started"
        );
        loop {
            let reports = self.tick().await;
            if !reports.is_empty() {
                debug!("Tick ran {} action(s)", reports.len());
            }
            sleep(self.poll_interval).await;
        }
    }

    pub async fn tick(&mut self) -> Vec<ActionReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run every action due at `now`, in priority order.
    ///
    /// `now` is recorded as the start of each attempt.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<ActionReport> {
        let mut reports = Vec::new();
        for action in self.scheduler.due(now) {
            if !self.scheduler.claim(action, now) {
                continue;
            }
            let outcome = self.execute(action).await;
            self.scheduler.complete(action);
            log_outcome(action, &outcome);
            reports.push(ActionReport {
                action,
                started: now,
                outcome,
            });
        }
        reports
    }

    async fn execute(&mut self, action: ActionKind) -> ActionOutcome {
        let result = match action {
            ActionKind::HourlyPost => self.hourly_post().await,
            ActionKind::TrendingReply => self.trending_reply().await,
            ActionKind::MentionsReply => self.mentions_reply().await,
        };
        result.unwrap_or_else(|error| ActionOutcome::Failed { error })
    }

    async fn hourly_post(&mut self) -> Result<ActionOutcome, PlatformError> {
        let text = compose(
            self.generator.as_ref(),
            persona::POST_PROMPT,
            persona::POST_SAMPLING,
        )
        .await;
        let post_id = self.platform.post(&text).await?;
        Ok(ActionOutcome::Posted { post_id, text })
    }

    async fn trending_reply(&mut self) -> Result<ActionOutcome, PlatformError> {
        let candidates = self
            .platform
            .search_recent(&self.behavior.trending_query, self.behavior.search_limit)
            .await?;
        let Some(target) = self.unseen(candidates).into_iter().next() else {
            debug!("No new trending posts to reply to");
            return Ok(ActionOutcome::Idle);
        };

        let attempt = self.reply_to(target).await;
        if let Err(error) = &attempt.result {
            return Err(error.clone());
        }
        Ok(ActionOutcome::Replied {
            attempts: vec![attempt],
        })
    }

    async fn mentions_reply(&mut self) -> Result<ActionOutcome, PlatformError> {
        let mentions = self
            .platform
            .fetch_mentions(self.behavior.mentions_limit)
            .await?;
        let targets: Vec<Post> = self
            .unseen(mentions)
            .into_iter()
            .take(self.behavior.replies_per_tick)
            .collect();
        if targets.is_empty() {
            debug!("No new mentions to reply to");
            return Ok(ActionOutcome::Idle);
        }

        let mut attempts = Vec::with_capacity(targets.len());
        for target in targets {
            let attempt = self.reply_to(target).await;
            let rate_limited = matches!(attempt.result, Err(PlatformError::RateLimited { .. }));
            attempts.push(attempt);
            if rate_limited {
                warn!("Rate limited, leaving remaining mentions for a later tick");
                break;
            }
        }
        Ok(ActionOutcome::Replied { attempts })
    }

    /// Posts not replied to yet, in platform order
    fn unseen(&self, posts: Vec<Post>) -> Vec<Post> {
        posts
            .into_iter()
            .filter(|post| !self.replied.contains(&post.id))
            .collect()
    }

    async fn reply_to(&mut self, target: Post) -> ReplyAttempt {
        // Marked before sending so a failed reply is not retried next cycle
        self.replied.insert(target.id.clone());
        let prompt = persona::reply_prompt(&target.text);
        let text = compose(self.generator.as_ref(), &prompt, persona::REPLY_SAMPLING).await;
        let result = self.platform.reply(&target.id, &text).await;
        ReplyAttempt {
            parent_id: target.id,
            text,
            result,
        }
    }
}

async fn compose(generator: &dyn Generator, prompt: &str, sampling: Sampling) -> String {
    generator
        .generate(
            persona::SYSTEM_PERSONA,
            prompt,
            sampling.max_tokens,
            sampling.temperature,
        )
        .await
}

fn preview(text: &str) -> String {
    truncate_for_post(text, LOG_PREVIEW_CHARS).into_owned()
}

fn log_outcome(action: ActionKind, outcome: &ActionOutcome) {
    match outcome {
        ActionOutcome::Posted { post_id, text } => info!(
            action = %action,
            outcome = outcome.label(),
            post_id = %post_id,
            content = %preview(text),
            "Action completed"
        ),
        ActionOutcome::Replied { attempts } => {
            for attempt in attempts {
                match &attempt.result {
                    Ok(post_id) => info!(
                        action = %action,
                        outcome = "replied",
                        post_id = %post_id,
                        parent_id = %attempt.parent_id,
                        content = %preview(&attempt.text),
                        "Action completed"
                    ),
                    Err(error) => warn!(
                        action = %action,
                        outcome = "failed",
                        parent_id = %attempt.parent_id,
                        content = %preview(&attempt.text),
                        error = %error,
                        "Action failed"
                    ),
                }
            }
        }
        ActionOutcome::Idle => info!(action = %action, outcome = outcome.label(), "Action completed"),
        ActionOutcome::Failed { error } => warn!(
            action = %action,
            outcome = outcome.label(),
            error = %error,
            "Action failed"
        ),
    }
}
