//! Core domain of the parley conversation history engine.
//!
//! Holds the content model, the skill/tool reconciliation rules, message
//! grouping, and the persistence and query contracts the infrastructure
//! crate implements.

pub mod config;
pub mod content;
pub mod error;
pub mod grouping;
pub mod history;
pub mod message;
pub mod skill;

pub use error::{ParleyError, Result};
