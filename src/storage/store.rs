use std::{collections::HashMap, io};

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use super::{Channel, Delimiters, Entries, Error, KeyedView, StoreKey, StoreValue};

/// A persistent map from keys to ordered lists of values.
///
/// Every mutation is written back to the [`Channel`] before it returns. Each
/// list is stored as a single string, with its values joined by the active
/// delimiter. When a value would contain the active delimiter, the store
/// switches to the next candidate that occurs in none of its values.
///
/// # Delimiter epochs
///
/// The delimiter is not recorded in the persisted data. A switch rewrites
/// the whole channel with the new delimiter on the next write-back, but a
/// store opened later starts again from the first candidate and will split
/// that data on the wrong character. Open such data with
/// [`MultiValueStore::with_delimiters`], naming the delimiter that was in use
/// first.
///
/// # Concurrency
///
/// A single lock guards the map. Mutations hold it across the write-back,
/// and [`reload`](Self::reload) and [`flush`](Self::flush) hold it across the
/// channel call, so at most one read-modify-write cycle runs at a time.
/// Queries take the lock only long enough to clone what they return.
#[derive(Debug)]
pub struct MultiValueStore<K, V, C> {
    channel: C,
    state: RwLock<State<K, V>>,
}

#[derive(Debug)]
struct State<K, V> {
    entries: HashMap<K, Vec<V>>,
    delimiters: Delimiters,
}

impl<K, V, C> MultiValueStore<K, V, C>
where
    K: StoreKey,
    V: StoreValue,
    C: Channel,
{
    /// Opens a store over `channel` using the default delimiter candidates.
    ///
    /// If the channel's resource cannot be opened the store starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] with [`InvalidData`](io::ErrorKind::InvalidData)
    /// if the resource holds malformed text, and [`Error::Decode`] if the
    /// text cannot be converted into keys or values. Existing data is never
    /// discarded.
    pub fn open(channel: C) -> Result<Self, Error> {
        Self::from_parts(channel, Delimiters::default())
    }

    /// Opens a store over `channel` with an explicit, ordered list of
    /// delimiter candidates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DelimiterExhausted`] if `candidates` is empty, and
    /// fails as for [`open`](Self::open) otherwise.
    pub fn with_delimiters(
        channel: C,
        candidates: impl IntoIterator<Item = char>,
    ) -> Result<Self, Error> {
        Self::from_parts(channel, Delimiters::new(candidates)?)
    }

    #[instrument(level = "debug", skip_all)]
    fn from_parts(channel: C, delimiters: Delimiters) -> Result<Self, Error> {
        let entries = match channel.read() {
            Ok(raw) => decode(raw, delimiters.active())?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no persisted state, starting empty");
                HashMap::new()
            }
            // A malformed resource is never treated as empty.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(e.into()),
            Err(e) => {
                warn!("Failed to read store, starting empty: {e}");
                HashMap::new()
            }
        };

        Ok(Self {
            channel,
            state: RwLock::new(State {
                entries,
                delimiters,
            }),
        })
    }

    /// The channel this store persists through.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// The delimiter currently used to join values.
    #[must_use]
    pub fn delimiter(&self) -> char {
        self.state.read().delimiters.active()
    }

    /// Returns a view of the list stored under `key`.
    #[must_use]
    pub fn select(&self, key: K) -> KeyedView<'_, K, V, C> {
        KeyedView::new(self, key)
    }

    /// Returns the list stored under `key`.
    ///
    /// An empty list is created on first access to a key.
    #[must_use]
    pub fn get(&self, key: &K) -> Vec<V> {
        if let Some(values) = self.state.read().entries.get(key) {
            return values.clone();
        }
        self.state
            .write()
            .entries
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Returns the value at `index` in the list stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the list has no such position.
    pub fn get_at(&self, key: &K, index: usize) -> Result<V, Error> {
        let state = self.state.read();
        let values = state.entries.get(key).map_or(&[][..], Vec::as_slice);
        values
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(key, index, values.len()))
    }

    /// Returns the value at `index` in the list stored under `key`, or
    /// `fallback` if there is no such position.
    #[must_use]
    pub fn get_or(&self, key: &K, index: usize, fallback: V) -> V {
        self.get_at(key, index).unwrap_or(fallback)
    }

    /// Appends `value` to the list stored under `key` and writes the store
    /// back.
    ///
    /// Returns whether the list changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DelimiterExhausted`] if no delimiter candidate is
    /// clear of the value (the store is left unchanged), or [`Error::Io`] if
    /// the write-back fails.
    pub fn add(&self, key: K, value: V) -> Result<bool, Error> {
        let mut state = self.state.write();
        state.make_room_for(&value.to_string())?;
        state.entries.entry(key).or_default().push(value);
        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Appends `value` unless the list stored under `key` already contains
    /// it.
    ///
    /// Returns `false`, without writing back, if the value was present.
    ///
    /// # Errors
    ///
    /// As for [`add`](Self::add).
    pub fn add_if_absent(&self, key: K, value: V) -> Result<bool, Error> {
        let mut state = self.state.write();
        if state
            .entries
            .get(&key)
            .is_some_and(|values| values.contains(&value))
        {
            return Ok(false);
        }
        state.make_room_for(&value.to_string())?;
        state.entries.entry(key).or_default().push(value);
        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Replaces the value at `index` in the list stored under `key`, returning
    /// the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the list has no such position, in
    /// which case nothing is written. Otherwise fails as for
    /// [`add`](Self::add).
    pub fn set(&self, key: &K, index: usize, value: V) -> Result<V, Error> {
        let mut state = self.state.write();
        let previous = state.replace(key, index, value)?;
        self.write_back(&mut state)?;
        Ok(previous)
    }

    /// Replaces the value at `index` unless the list stored under `key`
    /// already contains `value`.
    ///
    /// Returns `false`, without writing back, if the value was present.
    ///
    /// # Errors
    ///
    /// As for [`set`](Self::set).
    pub fn set_if_absent(&self, key: &K, index: usize, value: V) -> Result<bool, Error> {
        let mut state = self.state.write();
        state.check_index(key, index)?;
        if state
            .entries
            .get(key)
            .is_some_and(|values| values.contains(&value))
        {
            return Ok(false);
        }
        state.replace(key, index, value)?;
        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Appends `value` to the list stored under `key` if `predicate` accepts
    /// the whole map.
    ///
    /// The list under `key` exists (possibly empty) when `predicate` runs.
    /// The predicate is evaluated under the store's lock, so it must not call
    /// back into the store. Returns `false`, without writing back, if the
    /// predicate rejects the map.
    ///
    /// # Errors
    ///
    /// As for [`add`](Self::add).
    pub fn add_if<P>(&self, key: K, value: V, predicate: P) -> Result<bool, Error>
    where
        P: FnOnce(&HashMap<K, Vec<V>>) -> bool,
    {
        let mut state = self.state.write();
        state.entries.entry(key.clone()).or_default();
        if !predicate(&state.entries) {
            return Ok(false);
        }
        state.make_room_for(&value.to_string())?;
        state.entries.entry(key).or_default().push(value);
        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Replaces the value at `index` in the list stored under `key` if
    /// `predicate` accepts the whole map.
    ///
    /// The predicate runs under the store's lock, as for
    /// [`add_if`](Self::add_if). Returns `false`, without writing back, if it
    /// rejects the map.
    ///
    /// # Errors
    ///
    /// As for [`set`](Self::set). The index is checked before the predicate
    /// runs.
    pub fn set_if<P>(
        &self,
        key: &K,
        index: usize,
        value: V,
        predicate: P,
    ) -> Result<bool, Error>
    where
        P: FnOnce(&HashMap<K, Vec<V>>) -> bool,
    {
        let mut state = self.state.write();
        state.check_index(key, index)?;
        if !predicate(&state.entries) {
            return Ok(false);
        }
        state.replace(key, index, value)?;
        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Moves `value` to position `index` within the list stored under `key`.
    ///
    /// The first occurrence of `value` is taken out of its current position
    /// and reinserted at `index`, shifting the values in between. Returns
    /// `false`, without writing back, if the list does not contain `value`
    /// or it is already at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the list has no such position,
    /// and [`Error::Io`] if the write-back fails.
    pub fn move_to(&self, key: &K, index: usize, value: &V) -> Result<bool, Error> {
        let mut state = self.state.write();
        state.check_index(key, index)?;

        let Some(values) = state.entries.get_mut(key) else {
            return Ok(false);
        };
        match values.iter().position(|v| v == value) {
            Some(current) if current != index => {
                let moved = values.remove(current);
                values.insert(index, moved);
            }
            _ => return Ok(false),
        }

        self.write_back(&mut state)?;
        Ok(true)
    }

    /// Removes `key` and its whole list, returning the list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write-back fails.
    pub fn remove(&self, key: &K) -> Result<Vec<V>, Error> {
        let mut state = self.state.write();
        let removed = state.entries.remove(key).unwrap_or_default();
        self.write_back(&mut state)?;
        Ok(removed)
    }

    /// Removes the first occurrence of `value` from the list stored under
    /// `key`.
    ///
    /// Returns whether a value was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write-back fails.
    pub fn remove_value(&self, key: &K, value: &V) -> Result<bool, Error> {
        let mut state = self.state.write();
        let removed = state.entries.get_mut(key).is_some_and(|values| {
            values
                .iter()
                .position(|v| v == value)
                .map(|i| values.remove(i))
                .is_some()
        });
        self.write_back(&mut state)?;
        Ok(removed)
    }

    /// Removes every occurrence of `value` from every list.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write-back fails.
    pub fn remove_value_everywhere(&self, value: &V) -> Result<bool, Error> {
        let mut state = self.state.write();
        let mut removed = false;
        for values in state.entries.values_mut() {
            let before = values.len();
            values.retain(|v| v != value);
            removed |= values.len() != before;
        }
        self.write_back(&mut state)?;
        Ok(removed)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Whether the list stored under `key` contains `value`.
    #[must_use]
    pub fn contains_value(&self, key: &K, value: &V) -> bool {
        self.state
            .read()
            .entries
            .get(key)
            .is_some_and(|values| values.contains(value))
    }

    /// Whether any list contains `value`.
    #[must_use]
    pub fn has_value(&self, value: &V) -> bool {
        self.state
            .read()
            .entries
            .values()
            .any(|values| values.contains(value))
    }

    /// All keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Every value of every list.
    ///
    /// Values keep their order within a list; lists come in no particular
    /// order.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.state
            .read()
            .entries
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// The number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// A copy of the whole map.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<K, Vec<V>> {
        self.state.read().entries.clone()
    }

    /// Discards the in-memory state and reads it again from the channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the channel cannot be read and
    /// [`Error::Decode`] if its contents cannot be converted. The previous
    /// state is kept in both cases.
    #[instrument(level = "debug", skip(self))]
    pub fn reload(&self) -> Result<(), Error> {
        let mut state = self.state.write();
        let raw = self.channel.read()?;
        state.entries = decode(raw, state.delimiters.active())?;
        debug!(keys = state.entries.len(), "reloaded store");
        Ok(())
    }

    /// Writes every list to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DelimiterExhausted`] if no delimiter candidate is
    /// clear of the data, or [`Error::Io`] if the channel cannot be written.
    #[instrument(level = "debug", skip(self))]
    pub fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.write();
        self.write_back(&mut state)
    }

    fn write_back(&self, state: &mut State<K, V>) -> Result<(), Error> {
        let entries = state.encode()?;
        self.channel.write(&entries)?;
        debug!(
            keys = entries.len(),
            delimiter = ?state.delimiters.active(),
            "wrote store back"
        );
        Ok(())
    }
}

impl<K, V> State<K, V>
where
    K: StoreKey,
    V: StoreValue,
{
    fn check_index(&self, key: &K, index: usize) -> Result<(), Error> {
        let len = self.entries.get(key).map_or(0, Vec::len);
        if index < len {
            Ok(())
        } else {
            Err(out_of_range(key, index, len))
        }
    }

    fn replace(&mut self, key: &K, index: usize, value: V) -> Result<V, Error> {
        self.check_index(key, index)?;
        self.make_room_for(&value.to_string())?;

        let len = self.entries.get(key).map_or(0, Vec::len);
        let slot = self
            .entries
            .get_mut(key)
            .and_then(|values| values.get_mut(index))
            .ok_or_else(|| out_of_range(key, index, len))?;
        Ok(std::mem::replace(slot, value))
    }

    /// Makes sure the active delimiter can join `text` with the existing
    /// values, switching candidates if needed.
    fn make_room_for(&mut self, text: &str) -> Result<(), Error> {
        if !text.contains(self.delimiters.active()) {
            return Ok(());
        }

        let existing: Vec<String> = self.entries.values().flatten().map(V::to_string).collect();
        self.delimiters
            .negotiate(existing.iter().map(String::as_str).chain([text]))?;
        Ok(())
    }

    fn encode(&mut self) -> Result<Entries, Error> {
        let encoded: Vec<(String, Vec<String>)> = self
            .entries
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, values)| (key.to_string(), values.iter().map(V::to_string).collect()))
            .collect();

        let delimiter = self.delimiters.negotiate(
            encoded
                .iter()
                .flat_map(|(_, values)| values.iter().map(String::as_str)),
        )?;

        let mut separator = [0u8; 4];
        let separator: &str = delimiter.encode_utf8(&mut separator);

        let mut entries = Entries::new();
        for (key, values) in encoded {
            let joined = values.join(separator);
            entries
                .entry(key)
                .and_modify(|existing: &mut String| {
                    existing.push_str(separator);
                    existing.push_str(&joined);
                })
                .or_insert(joined);
        }
        Ok(entries)
    }
}

fn decode<K, V>(raw: Entries, delimiter: char) -> Result<HashMap<K, Vec<V>>, Error>
where
    K: StoreKey,
    V: StoreValue,
{
    let mut entries: HashMap<K, Vec<V>> = HashMap::with_capacity(raw.len());

    for (raw_key, joined) in raw {
        let key = raw_key.parse::<K>().map_err(|e| Error::Decode {
            key: raw_key.clone(),
            text: raw_key.clone(),
            reason: e.to_string(),
        })?;

        let values = joined
            .split(delimiter)
            .map(|text| {
                text.parse::<V>().map_err(|e| Error::Decode {
                    key: raw_key.clone(),
                    text: text.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        entries.entry(key).or_default().extend(values);
    }

    Ok(entries)
}

fn out_of_range<K: StoreKey>(key: &K, index: usize, len: usize) -> Error {
    Error::IndexOutOfRange {
        key: key.to_string(),
        index,
        len,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryChannel;

    type Store = MultiValueStore<String, String, Arc<MemoryChannel>>;

    fn store() -> (Store, Arc<MemoryChannel>) {
        let channel = Arc::new(MemoryChannel::new());
        let store = Store::open(Arc::clone(&channel)).unwrap();
        (store, channel)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn add_appends_and_writes_back() {
        let (store, channel) = store();

        assert!(store.add(key("fruit"), "apple".into()).unwrap());
        assert!(store.add(key("fruit"), "pear".into()).unwrap());

        assert_eq!(store.get(&key("fruit")), vec!["apple", "pear"]);
        assert_eq!(channel.contents(), "fruit=apple▪pear\n");
    }

    #[test]
    fn get_creates_an_empty_list() {
        let (store, channel) = store();

        assert!(store.get(&key("nothing")).is_empty());
        assert!(store.contains_key(&key("nothing")));
        assert_eq!(channel.contents(), "");
    }

    #[test]
    fn get_at_out_of_range() {
        let (store, _) = store();
        store.add(key("k"), "v".into()).unwrap();

        let error = store.get_at(&key("k"), 1).unwrap_err();
        assert!(matches!(
            error,
            Error::IndexOutOfRange { index: 1, len: 1, .. }
        ));
        assert_eq!(store.get_or(&key("k"), 1, "fallback".into()), "fallback");
        assert_eq!(store.get_or(&key("k"), 0, "fallback".into()), "v");
    }

    #[test]
    fn add_if_absent_skips_duplicates_without_writing() {
        let (store, channel) = store();
        store.add(key("k"), "v".into()).unwrap();
        channel.write(&Entries::new()).unwrap();

        assert!(!store.add_if_absent(key("k"), "v".into()).unwrap());
        assert_eq!(channel.contents(), "");

        assert!(store.add_if_absent(key("k"), "w".into()).unwrap());
        assert_eq!(store.get(&key("k")), vec!["v", "w"]);
    }

    #[test]
    fn set_replaces_and_returns_previous() {
        let (store, channel) = store();
        store.add(key("k"), "a".into()).unwrap();
        store.add(key("k"), "b".into()).unwrap();

        let previous = store.set(&key("k"), 1, "c".into()).unwrap();

        assert_eq!(previous, "b");
        assert_eq!(channel.contents(), "k=a▪c\n");
    }

    #[test]
    fn set_out_of_range_does_not_write() {
        let (store, channel) = store();
        store.add(key("k"), "a".into()).unwrap();
        let before = channel.contents();

        let error = store.set(&key("k"), 5, "z".into()).unwrap_err();

        assert!(matches!(error, Error::IndexOutOfRange { index: 5, .. }));
        assert_eq!(channel.contents(), before);
        assert_eq!(store.get(&key("k")), vec!["a"]);
    }

    #[test]
    fn set_if_absent_refuses_existing_value() {
        let (store, _) = store();
        store.add(key("k"), "a".into()).unwrap();
        store.add(key("k"), "b".into()).unwrap();

        assert!(!store.set_if_absent(&key("k"), 0, "b".into()).unwrap());
        assert!(store.set_if_absent(&key("k"), 0, "c".into()).unwrap());
        assert_eq!(store.get(&key("k")), vec!["c", "b"]);
    }

    #[test]
    fn remove_deletes_whole_key() {
        let (store, channel) = store();
        store.add(key("a"), "1".into()).unwrap();
        store.add(key("b"), "2".into()).unwrap();

        assert_eq!(store.remove(&key("a")).unwrap(), vec!["1"]);
        assert!(!store.contains_key(&key("a")));
        assert_eq!(channel.contents(), "b=2\n");
    }

    #[test]
    fn remove_value_removes_first_occurrence() {
        let (store, _) = store();
        for v in ["x", "y", "x"] {
            store.add(key("k"), v.into()).unwrap();
        }

        assert!(store.remove_value(&key("k"), &"x".into()).unwrap());
        assert_eq!(store.get(&key("k")), vec!["y", "x"]);
        assert!(!store.remove_value(&key("k"), &"missing".into()).unwrap());
    }

    #[test]
    fn remove_value_everywhere_clears_all_lists() {
        let (store, _) = store();
        store.add(key("a"), "x".into()).unwrap();
        store.add(key("a"), "y".into()).unwrap();
        store.add(key("b"), "x".into()).unwrap();

        assert!(store.remove_value_everywhere(&"x".into()).unwrap());
        assert!(!store.has_value(&"x".into()));
        assert_eq!(store.get(&key("a")), vec!["y"]);
        assert!(store.get(&key("b")).is_empty());
    }

    #[test]
    fn colliding_value_switches_delimiter() {
        let (store, channel) = store();
        store.add(key("k"), "plain".into()).unwrap();

        store.add(key("k"), "has▪bullet".into()).unwrap();

        assert_eq!(store.delimiter(), '\u{1F}');
        assert_eq!(channel.contents(), "k=plain\\u001Fhas▪bullet\n");
    }

    #[test]
    fn exhausted_delimiters_leave_store_unchanged() {
        let channel = Arc::new(MemoryChannel::new());
        let store: Store = MultiValueStore::with_delimiters(Arc::clone(&channel), ['|', ';']).unwrap();
        store.add(key("k"), "ok".into()).unwrap();

        let error = store.add(key("k"), "|;".into()).unwrap_err();

        assert!(matches!(error, Error::DelimiterExhausted(_)));
        assert_eq!(store.get(&key("k")), vec!["ok"]);
        assert_eq!(store.delimiter(), '|');
        assert_eq!(channel.contents(), "k=ok\n");
    }

    #[test]
    fn decodes_typed_values() {
        let channel = MemoryChannel::with_contents("1=10▪20\n2=30\n");
        let store = MultiValueStore::<u32, i64, _>::open(channel).unwrap();

        assert_eq!(store.get(&1), vec![10, 20]);
        assert_eq!(store.get_at(&2, 0).unwrap(), 30);
    }

    #[test]
    fn undecodable_value_fails_open() {
        let channel = MemoryChannel::with_contents("k=1▪two\n");
        let error = MultiValueStore::<String, i32, _>::open(channel).unwrap_err();

        assert!(matches!(error, Error::Decode { ref text, .. } if text == "two"));
    }

    #[test]
    fn reload_replaces_state_from_channel() {
        let (store, channel) = store();
        store.add(key("k"), "old".into()).unwrap();

        let mut external = Entries::new();
        external.insert(key("k"), "new▪newer".to_string());
        channel.write(&external).unwrap();
        store.reload().unwrap();

        assert_eq!(store.get(&key("k")), vec!["new", "newer"]);
    }

    #[test]
    fn empty_string_value_round_trips() {
        let (store, channel) = store();
        store.add(key("k"), String::new()).unwrap();

        let reopened = Store::open(Arc::clone(&channel)).unwrap();
        assert_eq!(reopened.get(&key("k")), vec![String::new()]);
    }

    #[test]
    fn add_if_consults_the_whole_map() {
        let (store, channel) = store();
        store.add(key("a"), "1".into()).unwrap();

        let refused = store
            .add_if(key("b"), "2".into(), |map| map.values().all(Vec::is_empty))
            .unwrap();
        assert!(!refused);
        assert_eq!(channel.contents(), "a=1\n");

        let accepted = store
            .add_if(key("b"), "2".into(), |map| {
                map.get(&key("b")).is_some_and(Vec::is_empty)
            })
            .unwrap();
        assert!(accepted);
        assert_eq!(channel.contents(), "a=1\nb=2\n");
    }

    #[test]
    fn set_if_checks_index_before_predicate() {
        let (store, channel) = store();
        store.add(key("k"), "a".into()).unwrap();

        let error = store
            .set_if(&key("k"), 3, "z".into(), |_| panic!("predicate must not run"))
            .unwrap_err();
        assert!(matches!(error, Error::IndexOutOfRange { index: 3, .. }));

        assert!(!store.set_if(&key("k"), 0, "b".into(), |_| false).unwrap());
        assert_eq!(channel.contents(), "k=a\n");

        assert!(store.set_if(&key("k"), 0, "b".into(), |_| true).unwrap());
        assert_eq!(channel.contents(), "k=b\n");
    }

    #[test]
    fn move_to_relocates_existing_value() {
        let (store, channel) = store();
        for v in ["a", "b", "c"] {
            store.add(key("k"), v.into()).unwrap();
        }

        assert!(store.move_to(&key("k"), 0, &"c".into()).unwrap());
        assert_eq!(store.get(&key("k")), vec!["c", "a", "b"]);
        assert_eq!(channel.contents(), "k=c▪a▪b\n");

        assert!(!store.move_to(&key("k"), 0, &"c".into()).unwrap());
        assert!(!store.move_to(&key("k"), 1, &"missing".into()).unwrap());
        assert!(matches!(
            store.move_to(&key("k"), 3, &"a".into()).unwrap_err(),
            Error::IndexOutOfRange { index: 3, len: 3, .. }
        ));
    }

    #[test]
    fn malformed_channel_fails_open_and_keeps_data() {
        let text = "keep=important▪data\nbad=\\u12G4\n";
        let channel = Arc::new(MemoryChannel::with_contents(text));

        let error = Store::open(Arc::clone(&channel)).unwrap_err();

        assert!(matches!(
            error,
            Error::Io(ref e) if e.kind() == io::ErrorKind::InvalidData
        ));
        assert_eq!(channel.contents(), text);
    }

    #[test]
    fn latin1_channel_is_preserved_across_writes() {
        let channel = Arc::new(MemoryChannel::with_bytes(b"keep=caf\xe9\n".to_vec()));
        let store = Store::open(Arc::clone(&channel)).unwrap();

        store.add(key("new"), "x".into()).unwrap();

        assert_eq!(store.get(&key("keep")), vec!["café"]);
        assert_eq!(channel.contents(), "keep=café\nnew=x\n");
    }

    #[test]
    fn concurrent_adds_are_all_persisted() {
        const THREADS: usize = 8;
        const ADDS: usize = 50;

        let (store, channel) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..ADDS {
                        store.add(format!("thread-{t}"), format!("{i}")).unwrap();
                        store.add(key("shared"), format!("{t}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = Store::open(Arc::clone(&channel)).unwrap();
        assert_eq!(reopened.get(&key("shared")).len(), THREADS * ADDS);
        for t in 0..THREADS {
            let expected: Vec<String> = (0..ADDS).map(|i| i.to_string()).collect();
            assert_eq!(reopened.get(&format!("thread-{t}")), expected);
        }
    }
}
