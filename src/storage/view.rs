use std::collections::HashMap;

use super::{Channel, Error, MultiValueStore, StoreKey, StoreValue};

/// A [`MultiValueStore`] seen through a single key.
///
/// Every operation delegates to the store with the key filled in.
#[derive(Debug)]
pub struct KeyedView<'a, K, V, C> {
    store: &'a MultiValueStore<K, V, C>,
    key: K,
}

impl<'a, K, V, C> KeyedView<'a, K, V, C>
where
    K: StoreKey,
    V: StoreValue,
    C: Channel,
{
    pub(super) const fn new(store: &'a MultiValueStore<K, V, C>, key: K) -> Self {
        Self { store, key }
    }

    /// The selected key.
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &'a MultiValueStore<K, V, C> {
        self.store
    }

    /// See [`MultiValueStore::get`].
    #[must_use]
    pub fn get(&self) -> Vec<V> {
        self.store.get(&self.key)
    }

    /// See [`MultiValueStore::get_at`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the list has no such position.
    pub fn get_at(&self, index: usize) -> Result<V, Error> {
        self.store.get_at(&self.key, index)
    }

    /// See [`MultiValueStore::get_or`].
    #[must_use]
    pub fn get_or(&self, index: usize, fallback: V) -> V {
        self.store.get_or(&self.key, index, fallback)
    }

    /// See [`MultiValueStore::add`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::add`].
    pub fn add(&self, value: V) -> Result<bool, Error> {
        self.store.add(self.key.clone(), value)
    }

    /// See [`MultiValueStore::add_if_absent`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::add_if_absent`].
    pub fn add_if_absent(&self, value: V) -> Result<bool, Error> {
        self.store.add_if_absent(self.key.clone(), value)
    }

    /// See [`MultiValueStore::set`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::set`].
    pub fn set(&self, index: usize, value: V) -> Result<V, Error> {
        self.store.set(&self.key, index, value)
    }

    /// See [`MultiValueStore::set_if_absent`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::set_if_absent`].
    pub fn set_if_absent(&self, index: usize, value: V) -> Result<bool, Error> {
        self.store.set_if_absent(&self.key, index, value)
    }

    /// See [`MultiValueStore::add_if`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::add`].
    pub fn add_if<P>(&self, value: V, predicate: P) -> Result<bool, Error>
    where
        P: FnOnce(&HashMap<K, Vec<V>>) -> bool,
    {
        self.store.add_if(self.key.clone(), value, predicate)
    }

    /// See [`MultiValueStore::set_if`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::set`].
    pub fn set_if<P>(&self, index: usize, value: V, predicate: P) -> Result<bool, Error>
    where
        P: FnOnce(&HashMap<K, Vec<V>>) -> bool,
    {
        self.store.set_if(&self.key, index, value, predicate)
    }

    /// See [`MultiValueStore::move_to`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::move_to`].
    pub fn move_to(&self, index: usize, value: &V) -> Result<bool, Error> {
        self.store.move_to(&self.key, index, value)
    }

    /// See [`MultiValueStore::remove_value`].
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::remove_value`].
    pub fn remove_value(&self, value: &V) -> Result<bool, Error> {
        self.store.remove_value(&self.key, value)
    }

    /// Whether the list contains `value`.
    #[must_use]
    pub fn contains(&self, value: &V) -> bool {
        self.store.contains_value(&self.key, value)
    }

    /// Removes the key and its whole list from the store.
    ///
    /// # Errors
    ///
    /// As for [`MultiValueStore::remove`].
    pub fn clear(&self) -> Result<Vec<V>, Error> {
        self.store.remove(&self.key)
    }
}
