//! `promptshield` - A filter for prompt injections hidden in untrusted files
//!
//! This library strips injected `"role": "system"` objects and base64-encoded
//! phishing payloads from file content before it is attached to a chat
//! conversation.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::{ContentFilter, FilterOptions, FilterResult};
pub use ingest::{ChatMessage, FileContext, UploadedFile};
pub use logging::init_logging;
