use std::{any::type_name, collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    ConfigSource, Document, Error,
    node::{ConfigNode, Transform},
};

/// A set of configuration variables addressed by dotted paths.
///
/// Each variable resolves to the value observed in a loaded document if
/// there is one, and to its registered default otherwise. Observation is a
/// one-way transition: once a variable holds an observed value it keeps it
/// for the lifetime of the tree.
///
/// ```
/// use propmap::ConfigTree;
///
/// let config = ConfigTree::from_json(r#"{"server": {"port": 8080}}"#).unwrap();
/// config.register("server.port", 80);
/// config.register("server.host", "localhost");
///
/// assert_eq!(config.get_as::<u16>("server.port").unwrap(), 8080);
/// assert_eq!(config.get("server.host").unwrap(), "localhost");
/// ```
#[derive(Debug, Default)]
pub struct ConfigTree {
    nodes: Mutex<HashMap<String, ConfigNode>>,
}

impl ConfigTree {
    /// Builds a tree from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, contains an array, or
    /// defines a path twice.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Self::from_document(&Document::from_json(text)?)
    }

    /// Builds a tree from a TOML document.
    ///
    /// # Errors
    ///
    /// As for [`from_json`](Self::from_json).
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Self::from_document(&Document::from_toml(text)?)
    }

    /// Builds a tree from a parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document contains an array or defines a path
    /// twice.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let tree = Self::default();
        tree.load(document)?;
        Ok(tree)
    }

    /// Reads a document from `source` and builds a tree from it.
    ///
    /// # Errors
    ///
    /// As for [`ConfigSource::read`] and [`from_document`](Self::from_document).
    pub fn open(source: &ConfigSource) -> Result<Self, Error> {
        Self::from_document(&source.read()?)
    }

    /// Ensures a variable exists at `path` with the given default.
    ///
    /// If the variable already holds an observed value, that value is kept;
    /// the default only applies while nothing has been observed.
    pub fn register(&self, path: impl Into<String>, default: impl Into<Value>) {
        self.register_node(path.into(), default.into(), None);
    }

    /// As [`register`](Self::register), additionally applying `transform` to
    /// the value whenever it is read.
    pub fn register_with<F>(&self, path: impl Into<String>, default: impl Into<Value>, transform: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.register_node(path.into(), default.into(), Some(Arc::new(transform)));
    }

    fn register_node(&self, path: String, default: Value, transform: Option<Transform>) {
        self.nodes
            .lock()
            .entry(path)
            .and_modify(|node| node.register(default.clone(), transform.clone()))
            .or_insert_with(|| ConfigNode::with_default(default, transform));
    }

    /// Locks the variable at `path` to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeLocked`] if the variable already holds an
    /// observed value.
    pub fn observe(&self, path: impl Into<String>, value: impl Into<Value>) -> Result<(), Error> {
        let path = path.into();
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(&path) {
            Some(node) => node
                .observe(value.into())
                .map_err(|_| Error::NodeLocked(path)),
            None => {
                nodes.insert(path, ConfigNode::observed(value.into()));
                Ok(())
            }
        }
    }

    /// Observes every value defined by `document`.
    ///
    /// The document is validated in full before any variable changes, so a
    /// failed load leaves the tree untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedNodeType`] if the document contains an array
    /// - [`Error::DuplicatePath`] if two fields flatten to the same path
    /// - [`Error::NodeLocked`] if a path already holds an observed value
    #[instrument(level = "debug", skip_all)]
    pub fn load(&self, document: &Document) -> Result<(), Error> {
        let flattened = document.flatten()?;
        let mut nodes = self.nodes.lock();

        if let Some((path, _)) = flattened
            .iter()
            .find(|(path, _)| nodes.get(path).is_some_and(ConfigNode::is_locked))
        {
            return Err(Error::NodeLocked(path.clone()));
        }

        let count = flattened.len();
        for (path, value) in flattened {
            match nodes.get_mut(&path) {
                Some(node) => node.observe(value).map_err(|_| Error::NodeLocked(path))?,
                None => {
                    nodes.insert(path, ConfigNode::observed(value));
                }
            }
        }

        debug!(variables = count, "loaded configuration document");
        Ok(())
    }

    /// The resolved value of the variable at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VariableNotFound`] if no variable exists at `path`.
    pub fn value(&self, path: &str) -> Result<Value, Error> {
        let (value, transform) = self
            .nodes
            .lock()
            .get(path)
            .map(ConfigNode::parts)
            .ok_or_else(|| Error::VariableNotFound(path.to_string()))?;

        // The lock is released before calling out to user code.
        Ok(match transform {
            Some(transform) => transform(value),
            None => value,
        })
    }

    /// The resolved value of the variable at `path`, as text.
    ///
    /// Strings are returned as-is; other values use their JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VariableNotFound`] if no variable exists at `path`.
    pub fn get(&self, path: &str) -> Result<String, Error> {
        Ok(match self.value(path)? {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }

    /// The resolved value of the variable at `path`, converted to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VariableNotFound`] if no variable exists at `path`,
    /// and [`Error::TypeMismatch`] if the value is not a valid `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let value = self.value(path)?;
        serde_json::from_value(value.clone()).map_err(|_| Error::TypeMismatch {
            path: path.to_string(),
            expected: type_name::<T>(),
            found: value.to_string(),
        })
    }

    /// Whether a variable exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(path)
    }

    /// Whether the variable at `path` holds an observed value.
    #[must_use]
    pub fn is_locked(&self, path: &str) -> bool {
        self.nodes.lock().get(path).is_some_and(ConfigNode::is_locked)
    }

    /// Every variable path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Every variable with its resolved value, sorted by path.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.paths()
            .into_iter()
            .filter_map(|path| self.value(&path).ok().map(|value| (path, value)))
            .collect()
    }

    /// The number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Whether the tree holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn observed_value_wins_over_earlier_default() {
        let config = ConfigTree::default();
        config.register("a.b", 1);

        config
            .load(&Document::from_json(r#"{"a":{"b":2}}"#).unwrap())
            .unwrap();

        assert_eq!(config.get_as::<i64>("a.b").unwrap(), 2);
    }

    #[test]
    fn later_register_does_not_override_observed_value() {
        let config = ConfigTree::from_json(r#"{"a":{"b":2}}"#).unwrap();

        config.register("a.b", 1);

        assert_eq!(config.get_as::<i64>("a.b").unwrap(), 2);
        assert!(config.is_locked("a.b"));
    }

    #[test]
    fn default_applies_without_observation() {
        let config = ConfigTree::default();
        config.register("retries", 3);

        assert_eq!(config.get_as::<u8>("retries").unwrap(), 3);
        assert_eq!(config.get("retries").unwrap(), "3");
        assert!(!config.is_locked("retries"));
    }

    #[test]
    fn missing_variable() {
        let config = ConfigTree::from_json(r#"{"a":1}"#).unwrap();

        let error = config.get("missing.path").unwrap_err();

        assert!(matches!(error, Error::VariableNotFound(ref path) if path == "missing.path"));
    }

    #[test]
    fn array_fails_construction() {
        let error = ConfigTree::from_json(r#"{"hosts":["a","b"]}"#).unwrap_err();
        assert!(matches!(error, Error::UnsupportedNodeType { ref path } if path == "hosts"));
    }

    #[test]
    fn nested_example_flattens() {
        let config =
            ConfigTree::from_json(r#"{"server":{"port":8080,"tls":{"enabled":false}}}"#).unwrap();

        assert_eq!(config.paths(), vec!["server.port", "server.tls.enabled"]);
        assert_eq!(config.get("server.port").unwrap(), "8080");
        assert!(!config.get_as::<bool>("server.tls.enabled").unwrap());
    }

    #[test]
    fn type_mismatch() {
        let config = ConfigTree::from_json(r#"{"name":"pmap"}"#).unwrap();

        let error = config.get_as::<u32>("name").unwrap_err();

        assert!(matches!(
            error,
            Error::TypeMismatch { ref path, expected: "u32", ref found }
                if path == "name" && found == "\"pmap\""
        ));
    }

    #[test]
    fn observe_twice_is_refused() {
        let config = ConfigTree::default();
        config.observe("mode", "fast").unwrap();

        let error = config.observe("mode", "slow").unwrap_err();

        assert!(matches!(error, Error::NodeLocked(ref path) if path == "mode"));
        assert_eq!(config.get("mode").unwrap(), "fast");
    }

    #[test]
    fn reloading_a_path_fails_without_changes() {
        let config = ConfigTree::from_json(r#"{"a":1}"#).unwrap();

        let error = config
            .load(&Document::from_json(r#"{"b":2,"a":3}"#).unwrap())
            .unwrap_err();

        assert!(matches!(error, Error::NodeLocked(ref path) if path == "a"));
        assert!(!config.contains("b"));
        assert_eq!(config.get_as::<i32>("a").unwrap(), 1);
    }

    #[test]
    fn transform_applies_to_default_and_observed_values() {
        let double = |value: Value| json!(value.as_i64().unwrap_or_default() * 2);

        let config = ConfigTree::from_json(r#"{"observed":21}"#).unwrap();
        config.register_with("observed", 0, double);
        config.register_with("defaulted", 5, double);

        assert_eq!(config.get_as::<i64>("observed").unwrap(), 42);
        assert_eq!(config.get_as::<i64>("defaulted").unwrap(), 10);
    }

    #[test]
    fn null_values_render_as_null() {
        let config = ConfigTree::from_json(r#"{"nothing":null}"#).unwrap();

        assert_eq!(config.get("nothing").unwrap(), "null");
        assert_eq!(config.get_as::<Option<String>>("nothing").unwrap(), None);
    }

    #[test]
    fn entries_are_sorted_and_resolved() {
        let config = ConfigTree::from_json(r#"{"b":{"x":true},"a":"first"}"#).unwrap();
        config.register("c", 1.5);

        assert_eq!(
            config.entries(),
            vec![
                ("a".to_string(), json!("first")),
                ("b.x".to_string(), json!(true)),
                ("c".to_string(), json!(1.5)),
            ]
        );
        assert_eq!(config.len(), 3);
    }
}
