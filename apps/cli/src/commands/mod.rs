//! Command implementations for the Loupe CLI.

pub mod classify;
pub mod config;
pub mod event_renderer;
pub mod run;
