// YouTube Shorts uploader: AI metadata, OAuth, resumable uploads and scheduling
pub mod accounts;
pub mod auth;
pub mod claude_client;
pub mod config;
pub mod error;
pub mod keychain;
pub mod llm;
pub mod logging;
pub mod metadata;
pub mod openai_client;
pub mod probe;
pub mod schedule;
pub mod shorts;
pub mod uploader;
pub mod youtube_client;

pub use error::{Result, UploaderError};
