//! Chirp - a persona-driven posting bot for Twitter/X
//!
//! This library provides the pieces of a long-running service that generates
//! short posts with a language model and publishes them on a fixed schedule:
//! OAuth credential handling, the platform client, the generation client,
//! the action scheduler and the main loop tying them together.

pub mod config;
pub mod credentials;
pub mod dedupe;
pub mod error;
pub mod generation;
pub mod health;
pub mod logging;
pub mod oauth;
pub mod persona;
pub mod platforms;
pub mod runtime;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialStore, OAuthClient};
pub use error::{ChirpError, Result};
pub use generation::{GenerationClient, Generator};
pub use platforms::{twitter::TwitterClient, Platform};
pub use runtime::{ActionOutcome, ActionReport, Runtime};
pub use scheduler::{ActionKind, Scheduler};
pub use types::{Post, PostId};
