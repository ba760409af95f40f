//! Filesystem primitives shared across features.

pub mod tree;
pub mod tree_hash;

pub use tree::{copy_tree, move_dir, remove_path, unique_sibling_path};
pub use tree_hash::hash_tree;
