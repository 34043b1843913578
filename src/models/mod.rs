//! Data models for the institute site.
//!
//! Field names match the documents kept in the store.

mod inquiry;
mod site_config;

pub use inquiry::*;
pub use site_config::*;
