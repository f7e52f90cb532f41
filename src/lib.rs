//! altbot - Twitter accessibility bot core
//!
//! Rewards tweets whose images carry alt text and gently nudges authors who
//! skip it. The bot keeps a local `SQLite` mirror of its social graph and of
//! every tweet it has handled, so each cron invocation only pays for what
//! changed since the last one.
//!
//! # Modules
//!
//! - [`api`] - `SocialApi` capability trait and paginated graph reader
//! - [`store`] - Local `SQLite` state store
//! - [`reconcile`] - Set-difference reconciliation of the social-graph mirror
//! - [`evaluate`] - Alt-text scoring and tweet classification
//! - [`dispatch`] - Outbound actions honoring the live/dry-run switch
//! - [`mentions`] - Mention routing (alt-text queries and usage reports)
//! - [`watch`] - Timeline watch passes over followers and friends
//! - [`bot`] - Orchestrator composing the use cases

pub mod api;
pub mod bot;
pub mod caption;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod evaluate;
pub mod mentions;
pub mod messages;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod watch;

pub use bot::AltBot;
pub use cli::Cli;
pub use config::{default_config_path, default_data_dir, default_db_path, Config};
pub use error::{BotError, Result};
pub use model::*;
pub use store::Store;
