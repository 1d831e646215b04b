//! # trak-core
//!
//! Core library for trak - a development session tracker.
//!
//! This library provides:
//! - Domain types for sessions, file changes and quality findings
//! - The session state machine and its on-disk store
//! - A debounced filesystem watcher
//! - Quality analysis (LLM review with a heuristic fallback) and summaries
//! - Best-effort reporting to an organization endpoint
//! - Configuration management and logging infrastructure
//!
//! ## Data flow
//!
//! ```text
//! FileWatcher ──FileChange──▶ SessionManager ──(stop)──▶ QualityAnalyzer
//!                                   ▲                          │
//!                                   └── summary + analysis ◀── SummaryGenerator
//!                                                              │
//!                                                         OrgReporter
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use trak_core::{FileChange, ChangeType, SessionManager};
//!
//! let mut manager = SessionManager::new(".").expect("valid directory");
//! manager.start().expect("no session active");
//! manager
//!     .record_change(&FileChange::new(ChangeType::Added, "src/main.rs"))
//!     .expect("persisted");
//! let stopped = manager.stop(None, None).expect("archived");
//! ```

// Re-export commonly used items at the crate root
pub use analysis::QualityAnalyzer;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{HistoryQuery, SessionManager, SessionStore, StoppedSession};
pub use summary::{SessionSummary, SummaryGenerator, SummarySource};
pub use types::*;
pub use watcher::FileWatcher;

// Public modules
pub mod analysis;
pub mod config;
pub mod daemon;
pub mod error;
pub mod format;
pub mod llm;
pub mod logging;
pub mod report;
pub mod session;
pub mod summary;
pub mod types;
pub mod watcher;
