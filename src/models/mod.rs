pub mod api;
pub mod chat;

pub use api::*;
pub use chat::*;
