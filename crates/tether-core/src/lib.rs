//! Tether Core Library
//!
//! Keeps an installation root in line with a versioned config bundle and
//! the core runtime it runs on: status classification, transactional
//! update with backup and restore, and the launchers the bundle ships.

pub mod cache;
pub mod compat;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod fs;
pub mod launcher;
pub mod layout;
pub mod metadata;
pub mod roots;
pub mod spec;
pub mod transaction;
pub mod types;
pub mod writer;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, TetherConfig};
    pub use crate::context::AppContext;

    // Descriptors
    pub use crate::cache::BundleCache;
    pub use crate::descriptor::{Descriptor, DescriptorResolver, Identity, Locator};
    pub use crate::spec::{ConfigSpec, CoreSource};

    // Engine
    pub use crate::engine::{ReconciliationEngine, UpdateError, UpdateOutcome, UpdateReport};
    pub use crate::types::ConfigStatus;
    pub use crate::writer::{ArtifactWriter, BackupPaths, FsArtifactWriter, PipelineMeta};

    // Launchers
    pub use crate::launcher::{
        LaunchInformation, LauncherRegistry, SoftwareLauncher, SoftwareVersion,
    };
}
