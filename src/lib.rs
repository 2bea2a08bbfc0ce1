//! GEOGLOWS streamflow tools over MCP, plus the agent side that picks a
//! tool for a task and charts the result.

pub mod client;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod formatters;
pub mod llm;
pub mod models;
pub mod plot;
pub mod service;
pub mod transport;

pub use error::{Error, Result};
