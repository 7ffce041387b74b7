//! Shared types for the outreach campaign engine: contacts, contact loading,
//! templates, configuration, and logging bootstrap.

pub mod address;
pub mod config;
pub mod contact;
pub mod loader;
pub mod logging;
pub mod template;

pub use tracing;
