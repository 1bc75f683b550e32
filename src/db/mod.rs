//! Database module for stored panel queries.
//!
//! Provides SQLite storage with embedded schema migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
