//! The bot's fixed voice and the prompts for each action

/// System instruction sent with every generation request
pub const SYSTEM_PERSONA: &str = "You are Chirp, a dry-witted observer of the technology world. \
You write short, punchy posts with a skeptical but good-natured tone. \
You never use hashtags, never mention that you are an AI, and never wrap your answer in quotes. \
Every answer must fit in a single post of at most 280 characters.";

/// Sampling parameters for one kind of output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

pub const POST_SAMPLING: Sampling = Sampling {
    max_tokens: 100,
    temperature: 0.9,
};

pub const REPLY_SAMPLING: Sampling = Sampling {
    max_tokens: 80,
    temperature: 0.8,
};

pub const POST_PROMPT: &str =
    "Write one original post about something happening in technology right now.";

/// User prompt asking for a reply to `text`
pub fn reply_prompt(text: &str) -> String {
    format!(
        "Write a short reply to this post. Stay on topic and add something of your own.\n\nPost: {}",
        text.trim()
    )
}
