pub mod chat_client;

use crate::{credential::Credential, error::Result, payload::DataUri};
use async_trait::async_trait;

pub use chat_client::{BoundChatClient, ChatClient};

pub const SYSTEM_PROMPT: &str = "You are an expert science and math tutor who provides clear, thoughtful, and brief explanations. Given an image of a problem, \
your response must strictly follow this format: 'Answer: [Your final numerical or symbolic answer]\nExplanation: [A concise 1-2 sentence explanation of the solution steps or concept].' \
If the problem is unclear or cannot be solved from the image, state 'Cannot solve: [reason]' instead of an answer.";

pub const USER_INSTRUCTION: &str = "Solve this.";

/// One multimodal completion per call: image in, trimmed non-empty answer out.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn solve(&self, image: &DataUri, credential: &Credential) -> Result<String>;
}
