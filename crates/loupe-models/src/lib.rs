//! Model implementations for Loupe.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Supported Providers
//!
//! - **OpenAI**: OpenAI's GPT models or any OpenAI-compatible server (API key required)
//! - **Azure**: Azure OpenAI deployments (API key and endpoint required)
//! - **Scripted**: Replays queued replies, for tests and offline runs

pub mod factory;
pub mod openai;
pub mod scripted;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use openai::{Endpoint, OpenAIModel};
pub use scripted::{RecordedRequest, ScriptedModel};
