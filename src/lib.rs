//! Multi-value property files and flattened hierarchical configuration.
//!
//! - [`storage`] keeps a map from keys to ordered lists of values in a flat
//!   `.properties` file, joining each list with a delimiter chosen so that it
//!   never collides with the data.
//! - [`config`] flattens a nested JSON or TOML document into dotted-path
//!   variables with registered defaults and lock-on-observe semantics.

pub mod config;
pub use config::{ConfigSource, ConfigTree, Document};

pub mod storage;
pub use storage::{Channel, FileChannel, KeyedView, MemoryChannel, MultiValueStore};
