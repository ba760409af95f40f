//! Configuration for tether.toml
//!
//! One file describes one installation root:
//! - where it lives and which config bundle it tracks
//! - which core to pair the bundle with
//! - where bundles are cached and where the catalog mirror is

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_tether_toml, parse_tether_toml_str, to_toml};
pub use paths::default_config_path;
pub use schema::TetherConfig;
pub use store::ConfigStore;
