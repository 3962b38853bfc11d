//! Configuration schema and loading for lernio.
//!
//! Config lives in `lernio.{toml,yaml,yml,json}` (project-local first, then
//! `~/.config/lernio/`). String values support `${ENV_VAR}` substitution so
//! provider tokens can stay out of the file.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::LernioConfig,
};
