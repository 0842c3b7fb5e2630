//! Runtime bridge: produces the live-binding object for an entry.

use std::cell::RefCell;
use std::rc::Rc;

use weft_registry::{BindingGetter, Entry, Namespace};

/// Collaborator that wires up an entry's live-binding runtime object.
pub trait RuntimeBridge {
    /// Turn a seed bindings object into the entry's runtime namespace,
    /// populating binding getters on declarative entries.
    fn enable(&mut self, entry: &mut Entry, seed: Namespace) -> Rc<RefCell<Namespace>>;
}

/// Minimal bridge: shares the seed namespace and installs a read-through
/// getter per seeded export.
#[derive(Debug, Default)]
pub struct SimpleBridge;

impl RuntimeBridge for SimpleBridge {
    fn enable(&mut self, entry: &mut Entry, seed: Namespace) -> Rc<RefCell<Namespace>> {
        let namespace = Rc::new(RefCell::new(seed));
        if let Some(getters) = entry.module_type.getters_mut() {
            let names = namespace.borrow().names();
            for name in names {
                getters.insert(
                    name.clone(),
                    BindingGetter::new(Rc::clone(&namespace), name),
                );
            }
        }
        namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_registry::{ModuleType, PackageId};

    #[test]
    fn test_enable_populates_declarative_getters() {
        let mut entry = Entry::new("a", "/src/a.mod", PackageId::default());
        entry.module_type = ModuleType::declarative();
        entry.host.exports = json!({"answer": 42});

        let seed = Namespace::from_exports(&entry.host.exports);
        let namespace = SimpleBridge.enable(&mut entry, seed);

        let getters = entry.module_type.getters().unwrap();
        assert_eq!(getters.len(), 1);
        assert_eq!(getters["answer"].get(), Some(json!(42)));

        // Getters observe later binding updates through the shared namespace.
        namespace.borrow_mut().set("answer", json!(43)).unwrap();
        assert_eq!(getters["answer"].get(), Some(json!(43)));
    }

    #[test]
    fn test_enable_dynamic_entry_has_no_getters() {
        let mut entry = Entry::new("a", "/src/a.dyn", PackageId::default());
        entry.host.exports = json!({"x": 1});
        let seed = Namespace::from_exports(&entry.host.exports);
        let namespace = SimpleBridge.enable(&mut entry, seed);
        assert!(entry.module_type.getters().is_none());
        assert_eq!(namespace.borrow().get("x"), Some(&json!(1)));
    }
}
