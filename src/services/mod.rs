//! Business logic services.

pub mod active;
pub mod assets;
pub mod auth;
pub mod cache;
pub mod evaluator;
pub mod executor;
pub mod formatting;
pub mod minify;
pub mod options;
pub mod resolver;
pub mod revision;
pub mod shortcode;
pub mod snippet;
pub mod store;
pub mod transfer;
