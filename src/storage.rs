//! Multi-value property storage.
//!
//! A [`MultiValueStore`] maps each key to an ordered list of values and
//! persists the whole map through a [`Channel`], joining each list into a
//! single string with a negotiated delimiter (see [`Delimiters`]).

use std::{collections::BTreeMap, fmt, hash::Hash, io, str::FromStr};

/// Byte-oriented endpoints the store persists through.
pub mod channel;
pub use channel::{Channel, FileChannel, MemoryChannel};

pub mod delimiter;
pub use delimiter::{DEFAULT_CANDIDATES, Delimiters};

pub mod properties;

mod store;
pub use store::MultiValueStore;

mod view;
pub use view::KeyedView;

/// The flat mapping exchanged with a [`Channel`].
pub type Entries = BTreeMap<String, String>;

/// A type usable as a store key.
///
/// Keys are persisted through their [`Display`](fmt::Display) form and read
/// back with [`FromStr`].
pub trait StoreKey: Eq + Hash + Clone + fmt::Display + FromStr<Err: fmt::Display> {}

impl<T> StoreKey for T where T: Eq + Hash + Clone + fmt::Display + FromStr<Err: fmt::Display> {}

/// A type usable as a store value.
///
/// Values are persisted through their [`Display`](fmt::Display) form and read
/// back with [`FromStr`]. Equality is used by the "if absent" and removal
/// operations.
pub trait StoreValue: PartialEq + Clone + fmt::Display + FromStr<Err: fmt::Display> {}

impl<T> StoreValue for T where T: PartialEq + Clone + fmt::Display + FromStr<Err: fmt::Display> {}

/// Errors raised by a [`MultiValueStore`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The channel could not be read or written.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A list position past the end of the list was addressed.
    #[error("Index {index} is out of range for key '{key}' holding {len} value(s)")]
    IndexOutOfRange {
        /// The key whose list was addressed.
        key: String,
        /// The requested position.
        index: usize,
        /// The length of the list.
        len: usize,
    },

    /// Every candidate delimiter occurs in the data.
    #[error(transparent)]
    DelimiterExhausted(#[from] delimiter::Exhausted),

    /// Persisted text could not be converted back into a key or value.
    #[error("Failed to decode '{text}' stored under '{key}': {reason}")]
    Decode {
        /// The persisted key.
        key: String,
        /// The text that failed to convert.
        text: String,
        /// Why the conversion failed.
        reason: String,
    },
}
