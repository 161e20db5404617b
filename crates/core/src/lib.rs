//! broke core library.
//!
//! This crate reconciles users of identity sources into downstream systems:
//! configuration, the directory model and mapping evaluation, the action
//! catalog, the planner that computes what is missing in each target, the
//! runner that applies it, and HTTP clients for Keycloak, Mailcow, Outline
//! and GitLab.

pub mod actions;
pub mod clients;
pub mod config;
pub mod errors;
pub mod identity;
pub mod options;
pub mod plan;
pub mod planner;
pub mod runner;
pub mod targets;

// Re-exports for convenience.
pub use config::BrokeConfig;
pub use identity::User;
pub use options::{NoProgress, Phase, ProgressSink, RunOptions};
pub use plan::{Actions, Plan, UserPlan};
pub use planner::Planner;
pub use runner::{RunReport, Runner};
pub use targets::ClientSet;
