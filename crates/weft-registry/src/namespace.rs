//! Live-binding namespace objects.
//!
//! A [`Namespace`] is the runtime binding object for a module: exported
//! names mapped to values, plus the bookkeeping the execution driver needs
//! (finalization, a binding-update counter). Declarative entries read
//! exports through [`BindingGetter`] accessors so that updates made after
//! import are still observed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// The live-binding object for a module's exports.
#[derive(Debug, Default)]
pub struct Namespace {
    /// Exported names and their current values.
    values: HashMap<String, Value>,
    /// Once finalized, no new names may be added; existing values may
    /// still be refreshed by binding updates.
    finalized: bool,
    /// Number of binding updates applied so far.
    updates: u32,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace from a module's exports object.
    ///
    /// Non-object exports (a dynamic module may export any value) seed an
    /// empty namespace; the value itself stays on the host module.
    pub fn from_exports(exports: &Value) -> Self {
        let mut ns = Self::new();
        if let Value::Object(map) = exports {
            for (name, value) in map {
                ns.values.insert(name.clone(), value.clone());
            }
        }
        ns
    }

    /// Get the current value of an exported name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Bind a name directly.
    ///
    /// Returns an error if the namespace has been finalized.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), String> {
        if self.finalized && !self.values.contains_key(name) {
            return Err(format!("cannot add '{}' to a finalized namespace", name));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// All exported names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Apply one binding update from the module's exports object.
    ///
    /// Before finalization new names are added; after finalization only
    /// existing names are refreshed. Counts as exactly one update.
    pub fn merge_exports(&mut self, exports: &Value) {
        if let Value::Object(map) = exports {
            for (name, value) in map {
                if self.finalized && !self.values.contains_key(name) {
                    continue;
                }
                self.values.insert(name.clone(), value.clone());
            }
        }
        self.updates += 1;
    }

    /// Seal the namespace: the set of exported names is now fixed.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Whether the namespace has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of binding updates applied so far.
    pub fn updates(&self) -> u32 {
        self.updates
    }
}

/// Read-through accessor for one exported name of a declarative entry.
///
/// Getters share the entry's namespace, so a read always observes the
/// latest binding update.
#[derive(Clone)]
pub struct BindingGetter {
    namespace: Rc<RefCell<Namespace>>,
    name: String,
}

impl BindingGetter {
    pub fn new(namespace: Rc<RefCell<Namespace>>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// The exported name this getter reads.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of the binding, if bound.
    pub fn get(&self) -> Option<Value> {
        self.namespace.borrow().get(&self.name).cloned()
    }
}

impl fmt::Debug for BindingGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingGetter")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_counts_one_update() {
        let mut ns = Namespace::new();
        ns.merge_exports(&json!({"a": 1, "b": 2}));
        assert_eq!(ns.updates(), 1);
        assert_eq!(ns.get("a"), Some(&json!(1)));
        assert_eq!(ns.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_finalized_rejects_new_names() {
        let mut ns = Namespace::new();
        ns.set("a", json!(1)).unwrap();
        ns.finalize();
        assert!(ns.set("b", json!(2)).is_err());
        // Existing names can still be refreshed.
        ns.set("a", json!(3)).unwrap();
        assert_eq!(ns.get("a"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_after_finalize_refreshes_only() {
        let mut ns = Namespace::new();
        ns.set("a", json!(1)).unwrap();
        ns.finalize();
        ns.merge_exports(&json!({"a": 10, "b": 20}));
        assert_eq!(ns.get("a"), Some(&json!(10)));
        assert_eq!(ns.get("b"), None);
        assert_eq!(ns.updates(), 1);
    }

    #[test]
    fn test_getter_sees_updates() {
        let ns = Rc::new(RefCell::new(Namespace::new()));
        let getter = BindingGetter::new(Rc::clone(&ns), "x");
        assert_eq!(getter.get(), None);
        ns.borrow_mut().set("x", json!("live")).unwrap();
        assert_eq!(getter.get(), Some(json!("live")));
    }

    #[test]
    fn test_seed_from_non_object_exports() {
        let ns = Namespace::from_exports(&json!("not an object"));
        assert!(ns.names().is_empty());
    }
}
