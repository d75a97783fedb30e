pub mod bridge;
pub mod cli;
pub mod dictionary;
pub mod managers;
pub mod matcher;
pub mod phonetic;
pub mod settings;
pub mod text;
pub mod tracing_config;
pub mod transcript;

pub use managers::monitor::{AuditOutcome, AuditState, MonitorSession};
pub use matcher::{scan, MatchOptions, MatchResult, MatchType};
pub use phonetic::PhoneticEngine;
