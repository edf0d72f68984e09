//! Engine settings: schema types and the loader that layers the optional
//! `config.toml` under `CADENCE__*` environment overrides.

mod load;
mod schema;

pub use schema::*;
