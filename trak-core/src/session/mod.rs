//! Session lifecycle and on-disk persistence.

mod manager;
mod store;

pub use manager::{SessionManager, StoppedSession};
pub use store::{ArchivedSession, HistoryQuery, SessionStore};
