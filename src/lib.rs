pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod models;
pub mod optimistic;
pub mod session;
pub mod ui;

pub use api::{ApiClient, TaskApi};
pub use config::Config;
pub use dashboard::{Dashboard, Mutation, PendingRequest};
pub use error::{Result, TodoError};
pub use models::{FilterMode, Stats, Task, TaskDraft, TaskStatus};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
