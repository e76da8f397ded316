//! Mock platform implementation for testing
//!
//! Results are scripted per operation and consumed in order. When a queue is
//! empty the call succeeds: writes get a sequential `mock-N` id and reads
//! return no posts. Every call is recorded so tests can assert on exactly
//! what the bot tried to do.
//!
//! Clones share state, so a test can keep one handle while the runtime owns
//! another.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::{truncate_for_post, Platform};
use crate::types::{Post, PostId};

/// A call made against the mock, with the text as it would have been sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Post { text: String },
    Reply { parent_id: PostId, text: String },
    Search { query: String, limit: usize },
    Mentions { limit: usize },
}

#[derive(Debug, Default)]
struct MockState {
    post_results: VecDeque<Result<PostId, PlatformError>>,
    reply_results: VecDeque<Result<PostId, PlatformError>>,
    search_results: VecDeque<Result<Vec<Post>, PlatformError>>,
    mention_results: VecDeque<Result<Vec<Post>, PlatformError>>,
    calls: Vec<MockCall>,
    next_id: u64,
}

impl MockState {
    fn generated_id(&mut self) -> PostId {
        self.next_id += 1;
        PostId::new(format!("mock-{}", self.next_id))
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    name: String,
    delay: Duration,
    character_limit: usize,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockPlatform {
    /// Create a mock platform where every call succeeds
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::from_millis(0),
            character_limit: super::MAX_POST_CHARS,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Simulate network latency on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_character_limit(mut self, limit: usize) -> Self {
        self.character_limit = limit;
        self
    }

    pub fn push_post_result(&self, result: Result<PostId, PlatformError>) -> &Self {
        self.state.lock().unwrap().post_results.push_back(result);
        self
    }

    pub fn push_reply_result(&self, result: Result<PostId, PlatformError>) -> &Self {
        self.state.lock().unwrap().reply_results.push_back(result);
        self
    }

    pub fn push_search_result(&self, result: Result<Vec<Post>, PlatformError>) -> &Self {
        self.state.lock().unwrap().search_results.push_back(result);
        self
    }

    pub fn push_mentions_result(&self, result: Result<Vec<Post>, PlatformError>) -> &Self {
        self.state.lock().unwrap().mention_results.push_back(result);
        self
    }

    /// All calls made so far, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Text of every post and reply attempted
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Post { text } | MockCall::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Parent ids of every reply attempted
    pub fn reply_targets(&self) -> Vec<PostId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Reply { parent_id, .. } => Some(parent_id),
                _ => None,
            })
            .collect()
    }

    pub fn post_call_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Post { .. }))
    }

    pub fn reply_call_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Reply { .. }))
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn post(&mut self, text: &str) -> Result<PostId, PlatformError> {
        self.simulate_latency().await;
        let text = truncate_for_post(text, self.character_limit).into_owned();
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Post { text });
        match state.post_results.pop_front() {
            Some(result) => result,
            None => Ok(state.generated_id()),
        }
    }

    async fn reply(&mut self, parent_id: &PostId, text: &str) -> Result<PostId, PlatformError> {
        self.simulate_latency().await;
        let text = truncate_for_post(text, self.character_limit).into_owned();
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Reply {
            parent_id: parent_id.clone(),
            text,
        });
        match state.reply_results.pop_front() {
            Some(result) => result,
            None => Ok(state.generated_id()),
        }
    }

    async fn search_recent(
        &mut self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Search {
            query: query.to_string(),
            limit,
        });
        state
            .search_results
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(|mut posts| {
                posts.truncate(limit);
                posts
            })
    }

    async fn fetch_mentions(&mut self, limit: usize) -> Result<Vec<Post>, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Mentions { limit });
        state
            .mention_results
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(|mut posts| {
                posts.truncate(limit);
                posts
            })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn character_limit(&self) -> usize {
        self.character_limit
    }
}
