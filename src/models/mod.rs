//! Domain models and DTOs.

pub mod pagination;
pub mod scope;
pub mod settings;
pub mod snippet;
pub mod user;
