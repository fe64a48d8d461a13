//! Object model collaborator
//!
//! The actor core never inspects payloads itself. It asks an
//! [`ObjectModel`] two questions: may this value be handed to another actor
//! by reference, and if not, what is an independent copy of it.
//!
//! [`DefaultObjectModel`] answers them for [`Value`]:
//!
//! - immediates are always shareable
//! - objects are shareable once the whole reachable graph is frozen
//! - copies walk the object graph, rebuilding every object that is not
//!   already shareable; an object reached twice (shared child or cycle)
//!   is copied once
//! - leaf bodies (text, bytes, files, errors) are rebuilt through a bincode
//!   round trip
//!
//! The intermediate bytes never leave the process, so there is no format
//! stability concern.

use crate::error::{ActorError, Result};
use crate::value::{ObjRef, Object, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// Shareability oracle and deep-copy capability consumed by baskets
pub trait ObjectModel: Send + Sync + Debug {
    /// True if `value` can be passed to another actor without copying
    fn is_shareable(&self, value: &Value) -> bool;

    /// Produce a copy of `value` that shares no mutable storage with it
    fn deep_copy(&self, value: &Value) -> Result<Value>;
}

/// Object model for the crate's own [`Value`] type
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectModel;

impl ObjectModel for DefaultObjectModel {
    fn is_shareable(&self, value: &Value) -> bool {
        value.is_deeply_frozen()
    }

    fn deep_copy(&self, value: &Value) -> Result<Value> {
        GraphCopy::default().copy(value)
    }
}

/// One deep copy in progress, keyed by the address of each source object
#[derive(Default)]
struct GraphCopy {
    copied: HashMap<usize, ObjRef>,
}

impl GraphCopy {
    fn copy(&mut self, value: &Value) -> Result<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        if let Some(copy) = self.copied.get(&obj.addr()) {
            return Ok(Value::Object(copy.clone()));
        }
        if value.is_deeply_frozen() {
            return Ok(value.clone());
        }

        let frozen = obj.is_frozen();
        let copy = match obj.snapshot() {
            Object::Moved => return Err(ActorError::NotCopyable("moved object".to_string())),
            Object::Native(name) => {
                return Err(ActorError::NotCopyable(format!("native object {}", name)))
            }
            Object::Array(items) => {
                let copy = self.placeholder(obj);
                let items = items
                    .iter()
                    .map(|item| self.copy(item))
                    .collect::<Result<Vec<_>>>()?;
                copy.write(|body| *body = Object::Array(items))?;
                copy
            }
            Object::Map(entries) => {
                let copy = self.placeholder(obj);
                let mut copied = BTreeMap::new();
                for (key, item) in &entries {
                    copied.insert(key.clone(), self.copy(item)?);
                }
                copy.write(|body| *body = Object::Map(copied))?;
                copy
            }
            leaf => {
                let bytes = bincode::serialize(&leaf).map_err(not_copyable)?;
                let body: Object = bincode::deserialize(&bytes).map_err(not_copyable)?;
                let copy = ObjRef::new(body);
                self.copied.insert(obj.addr(), copy.clone());
                copy
            }
        };
        if frozen {
            copy.freeze();
        }
        Ok(Value::Object(copy))
    }

    /// Register an empty container for `source` before its children are
    /// copied, so references back to it resolve to the copy
    fn placeholder(&mut self, source: &ObjRef) -> ObjRef {
        let copy = ObjRef::new(Object::Array(Vec::new()));
        self.copied.insert(source.addr(), copy.clone());
        copy
    }
}

fn not_copyable(err: bincode::Error) -> ActorError {
    ActorError::NotCopyable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapKey;

    fn items(v: &Value) -> Vec<Value> {
        v.as_object()
            .unwrap()
            .read(|obj| match obj {
                Object::Array(items) => items.clone(),
                _ => Vec::new(),
            })
            .unwrap()
    }

    fn first_item(v: &Value) -> Value {
        items(v).remove(0)
    }

    #[test]
    fn test_immediates_are_shareable() {
        let model = DefaultObjectModel;
        assert!(model.is_shareable(&Value::Nil));
        assert!(model.is_shareable(&Value::Int(7)));
        assert!(model.is_shareable(&Value::symbol("ok")));
        assert!(!model.is_shareable(&Value::text("mutable")));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let model = DefaultObjectModel;
        let inner = Value::text("a");
        let mut entries = BTreeMap::new();
        entries.insert(MapKey::String("k".to_string()), inner.clone());
        let original = Value::map(entries);

        let copy = model.deep_copy(&original).unwrap();
        assert_eq!(copy, original);

        inner
            .as_object()
            .unwrap()
            .write(|obj| *obj = Object::Text("changed".to_string()))
            .unwrap();

        let copied_inner = copy
            .as_object()
            .unwrap()
            .read(|obj| match obj {
                Object::Map(m) => m.values().next().cloned(),
                _ => None,
            })
            .unwrap()
            .unwrap();
        assert_eq!(copied_inner.as_text().as_deref(), Some("a"));
    }

    #[test]
    fn test_deep_copy_keeps_frozen_flag() {
        let model = DefaultObjectModel;
        let child = Value::text("mutable");
        let v = Value::array(vec![child.clone()]);
        v.as_object().unwrap().freeze();

        let copy = model.deep_copy(&v).unwrap();
        let copy_obj = copy.as_object().unwrap();
        assert!(copy_obj.is_frozen());
        assert!(!copy_obj.ptr_eq(v.as_object().unwrap()));
        let copied_child = first_item(&copy);
        assert!(!copied_child.as_object().unwrap().ptr_eq(child.as_object().unwrap()));
    }

    #[test]
    fn test_deep_copy_shares_frozen_subgraph() {
        let model = DefaultObjectModel;
        let frozen = Value::array(vec![Value::text("constant")]);
        frozen.make_shareable().unwrap();
        let outer = Value::array(vec![frozen.clone(), Value::text("mutable")]);

        let copy = model.deep_copy(&outer).unwrap();
        let items = items(&copy);
        assert!(items[0].as_object().unwrap().ptr_eq(frozen.as_object().unwrap()));
        assert_eq!(items[1].as_text().as_deref(), Some("mutable"));
    }

    #[test]
    fn test_deep_copy_keeps_shared_children_shared() {
        let model = DefaultObjectModel;
        let x = Value::text("x");
        let dag = Value::array(vec![x.clone(), x.clone()]);

        let copy = model.deep_copy(&dag).unwrap();
        let items = items(&copy);
        let (a, b) = (items[0].as_object().unwrap(), items[1].as_object().unwrap());
        assert!(a.ptr_eq(b));
        assert!(!a.ptr_eq(x.as_object().unwrap()));
    }

    #[test]
    fn test_deep_copy_of_cycle_terminates() {
        let model = DefaultObjectModel;
        let cyclic = Value::array(Vec::new());
        let handle = cyclic.clone();
        cyclic
            .as_object()
            .unwrap()
            .write(|obj| {
                if let Object::Array(items) = obj {
                    items.push(handle);
                }
            })
            .unwrap();

        let copy = model.deep_copy(&cyclic).unwrap();
        let copy_obj = copy.as_object().unwrap();
        assert!(!copy_obj.ptr_eq(cyclic.as_object().unwrap()));
        assert!(first_item(&copy).as_object().unwrap().ptr_eq(copy_obj));

        // Break both cycles so the test does not leak them
        for v in [&cyclic, &copy] {
            v.as_object().unwrap().write(|obj| *obj = Object::Array(Vec::new())).unwrap();
        }
    }

    #[test]
    fn test_cyclic_map_is_copied_once() {
        let model = DefaultObjectModel;
        let map = Value::map(BTreeMap::new());
        let handle = map.clone();
        map.as_object()
            .unwrap()
            .write(|obj| {
                if let Object::Map(entries) = obj {
                    entries.insert(MapKey::Symbol("self".to_string()), handle);
                    entries.insert(MapKey::Int(1), Value::text("one"));
                }
            })
            .unwrap();

        let copy = model.deep_copy(&map).unwrap();
        let inner = copy
            .as_object()
            .unwrap()
            .read(|obj| match obj {
                Object::Map(entries) => entries.get(&MapKey::Symbol("self".to_string())).cloned(),
                _ => None,
            })
            .unwrap()
            .unwrap();
        assert!(inner.as_object().unwrap().ptr_eq(copy.as_object().unwrap()));

        for v in [&map, &copy] {
            v.as_object().unwrap().write(|obj| *obj = Object::Map(BTreeMap::new())).unwrap();
        }
    }

    #[test]
    fn test_native_is_not_copyable() {
        let model = DefaultObjectModel;
        let v = Value::array(vec![Value::native("db-handle")]);
        let err = model.deep_copy(&v).unwrap_err();
        assert!(matches!(err, ActorError::NotCopyable(ref msg) if msg.contains("db-handle")));
    }

    #[test]
    fn test_moved_is_not_copyable() {
        let model = DefaultObjectModel;
        let v = Value::bytes(vec![1, 2, 3]);
        v.as_object().unwrap().move_out().unwrap();
        assert!(matches!(model.deep_copy(&v), Err(ActorError::NotCopyable(_))));
    }
}
