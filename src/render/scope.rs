use crate::value::Value;
use indexmap::IndexMap;
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

struct Frame {
    /// Variables in the order they were first assigned.
    variables: IndexMap<String, Value>,
    parent: Option<Scope>,
}

/// A chain of variable frames.
///
/// Cloning a `Scope` clones the handle: closures keep the scope they were
/// defined in alive, and observe every later change made to it.
#[derive(Clone)]
pub struct Scope(Arc<Mutex<Frame>>);

impl Scope {
    /// Create a new, empty [`Scope`] without a parent.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    /// Create a new, empty [`Scope`] whose lookups fall back to this one.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<Scope>) -> Self {
        Self(Arc::new(Mutex::new(Frame {
            variables: IndexMap::new(),
            parent,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Frame> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value of the variable, searching the parents when this
    /// frame does not define it.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self.clone();
        loop {
            let parent = {
                let frame = scope.lock();
                if let Some(value) = frame.variables.get(name) {
                    return Some(value.clone());
                }
                frame.parent.clone()
            };
            scope = parent?;
        }
    }

    /// Assign the variable in this frame.
    pub fn set<T>(&self, name: T, value: Value)
    where
        T: Into<String>,
    {
        self.lock().variables.insert(name.into(), value);
    }

    /// Return the variables of this frame, parents excluded, in the order
    /// they were first assigned.
    pub fn locals(&self) -> Vec<(String, Value)> {
        self.lock()
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Scope({:p})", Arc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lookup_falls_back() {
        let outer = Scope::new();
        outer.set("a", Value::Int(1));
        let inner = outer.child();
        inner.set("b", Value::Int(2));

        assert_eq!(inner.get("a"), Some(Value::Int(1)));
        assert_eq!(inner.get("b"), Some(Value::Int(2)));
        assert_eq!(outer.get("b"), None);
    }

    #[test]
    fn test_scope_child_sees_later_changes() {
        let outer = Scope::new();
        outer.set("i", Value::Int(1));
        let inner = outer.child();
        outer.set("i", Value::Int(2));

        assert_eq!(inner.get("i"), Some(Value::Int(2)));
    }

    #[test]
    fn test_scope_locals_in_order() {
        let scope = Scope::new();
        scope.set("z", Value::Int(1));
        scope.set("a", Value::Int(2));
        scope.set("z", Value::Int(3));

        let names: Vec<_> = scope.locals().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
