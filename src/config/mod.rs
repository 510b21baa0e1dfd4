//! Configuration management
//!
//! Settings are read from an optional TOML file; command line flags and
//! environment variables are applied on top in `main`.

mod schema;
mod store;

pub use schema::*;
pub use store::{load_config, validate};
