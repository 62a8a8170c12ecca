//! Catalog configuration: an explicit value handed to every component.
//!
//! Config files: `skilldock.toml`, `skilldock.yaml`, or `skilldock.json`,
//! searched in `./` then `~/.config/skilldock/`. There is no process-global
//! config state; callers load a [`CatalogConfig`] once and pass it down.

pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{CatalogConfig, FetchLimits},
};
