//! Taskpilot — a task-tracking service with a natural-language interface.
//!
//! This module exports the core components for testing and integration.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod server;
pub mod tools;
pub mod types;
