//! HTTP runtime: webhook intake, per-sender serial processing, handoff
//! notification, and operator inspection endpoints.

pub mod bootstrap;
pub mod debug;
pub mod health;
pub mod notifier;
pub mod orchestrator;
pub mod queue;
pub mod webhook;
