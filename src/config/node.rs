use std::{fmt, sync::Arc};

use serde_json::Value;

/// A function applied to a variable's value each time it is read.
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Where a variable's value comes from.
#[derive(Debug, Clone, PartialEq)]
enum State {
    /// Only a default has been registered.
    Default(Value),
    /// A value was observed and can no longer change.
    Locked(Value),
}

/// A single configuration variable.
#[derive(Clone)]
pub(super) struct ConfigNode {
    state: State,
    transform: Option<Transform>,
}

/// The value was already locked.
#[derive(Debug)]
pub(super) struct AlreadyLocked;

impl ConfigNode {
    pub(super) const fn with_default(default: Value, transform: Option<Transform>) -> Self {
        Self {
            state: State::Default(default),
            transform,
        }
    }

    pub(super) const fn observed(value: Value) -> Self {
        Self {
            state: State::Locked(value),
            transform: None,
        }
    }

    pub(super) const fn is_locked(&self) -> bool {
        matches!(self.state, State::Locked(_))
    }

    /// Replaces the default and transform. An observed value is kept.
    pub(super) fn register(&mut self, default: Value, transform: Option<Transform>) {
        if let State::Default(current) = &mut self.state {
            *current = default;
        }
        self.transform = transform;
    }

    /// Locks the node to `value`.
    pub(super) fn observe(&mut self, value: Value) -> Result<(), AlreadyLocked> {
        if self.is_locked() {
            return Err(AlreadyLocked);
        }
        self.state = State::Locked(value);
        Ok(())
    }

    /// The effective value and the transform still to be applied to it.
    pub(super) fn parts(&self) -> (Value, Option<Transform>) {
        let value = match &self.state {
            State::Default(value) | State::Locked(value) => value.clone(),
        };
        (value, self.transform.clone())
    }
}

impl fmt::Debug for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("state", &self.state)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
