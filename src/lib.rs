//! Vibe Math: an HTTP gateway that forwards a photo of a math or science
//! problem to a multimodal model and returns the model's answer.

pub mod config;
pub mod credential;
pub mod error;
pub mod inference;
pub mod logger;
pub mod models;
pub mod payload;
pub mod server;
pub mod solver;

pub use config::{Config, ModelConfig, ServerConfig};
pub use credential::{Credential, CredentialResolver};
pub use error::{GatewayError, Result};
pub use inference::{ChatClient, InferenceBackend};
pub use models::*;
pub use payload::{DataUri, PayloadNormalizer};
pub use solver::Solver;
