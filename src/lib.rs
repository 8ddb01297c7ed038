pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod handler;
pub mod input;
pub mod logging;
pub mod session;
pub mod transcript;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use backend::{AskResponse, QueryBackend, RagClient};
pub use config::Config;
pub use error::BackendError;
pub use session::{QuerySession, SessionState};
pub use transcript::{ChatRole, Message, Transcript};
