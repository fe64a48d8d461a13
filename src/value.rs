//! Runtime values carried by messages
//!
//! Immediates (`Nil`, `Bool`, `Int`, `Float`, `Symbol`) are plain data and
//! always shareable. Everything else lives behind an [`ObjRef`], a shared
//! handle to heap storage, the way object references behave in the
//! language runtime above this crate:
//!
//! - cloning a `Value` clones the handle, not the object
//! - [`ObjRef::freeze`] / [`Value::make_shareable`] make a graph immutable,
//!   after which it can be handed to other actors by reference
//! - [`ObjRef::move_out`] transfers the storage into a fresh object and
//!   poisons the original, so every remaining handle observes [`Object::Moved`]

use crate::error::{ActorError, Result};
use parking_lot::RwLock;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Map keys (hashable subset of values)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MapKey {
    Int(i64),
    Symbol(String),
    String(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::Symbol(s) => write!(f, ":{}", s),
            MapKey::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A value of the hosted language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(String),
    Object(ObjRef),
}

/// An open file as seen by the hosted language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub path: PathBuf,
    pub position: u64,
}

/// Heap object storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    /// Ordered sequence
    Array(Vec<Value>),
    /// Keyed composite
    Map(BTreeMap<MapKey, Value>),
    /// Mutable text buffer
    Text(String),
    /// Raw byte buffer
    Bytes(Vec<u8>),
    /// File handle
    File(FileHandle),
    /// Exception object
    Error { class: String, message: String },
    /// Opaque handle owned by native code
    Native(String),
    /// Storage of an object that was moved to another actor
    Moved,
}

impl Object {
    /// Kind name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Array(_) => "array",
            Object::Map(_) => "map",
            Object::Text(_) => "text",
            Object::Bytes(_) => "bytes",
            Object::File(_) => "file",
            Object::Error { .. } => "error",
            Object::Native(_) => "native",
            Object::Moved => "moved",
        }
    }

    /// Container-like kinds that support move
    pub fn is_movable(&self) -> bool {
        matches!(
            self,
            Object::Array(_) | Object::Map(_) | Object::Text(_) | Object::Bytes(_) | Object::File(_)
        )
    }

    fn children(&self) -> Vec<Value> {
        match self {
            Object::Array(items) => items.clone(),
            Object::Map(entries) => entries.values().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ObjCell {
    frozen: bool,
    body: Object,
}

/// Shared handle to a heap object
#[derive(Clone)]
pub struct ObjRef(Arc<RwLock<ObjCell>>);

impl ObjRef {
    pub fn new(body: Object) -> Self {
        ObjRef(Arc::new(RwLock::new(ObjCell {
            frozen: false,
            body,
        })))
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared storage, stable for the object's lifetime
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// True once the storage has been moved out
    pub fn is_moved(&self) -> bool {
        matches!(self.0.read().body, Object::Moved)
    }

    pub fn is_frozen(&self) -> bool {
        self.0.read().frozen
    }

    pub fn kind(&self) -> &'static str {
        self.0.read().body.kind()
    }

    /// Freeze this object (not its children)
    pub fn freeze(&self) {
        self.0.write().frozen = true;
    }

    /// Read access. Fails with `Moved` on a poisoned object.
    pub fn read<R>(&self, f: impl FnOnce(&Object) -> R) -> Result<R> {
        let cell = self.0.read();
        match cell.body {
            Object::Moved => Err(ActorError::Moved),
            ref body => Ok(f(body)),
        }
    }

    /// Write access. Fails on moved or frozen objects.
    pub fn write<R>(&self, f: impl FnOnce(&mut Object) -> R) -> Result<R> {
        let mut cell = self.0.write();
        if matches!(cell.body, Object::Moved) {
            return Err(ActorError::Moved);
        }
        if cell.frozen {
            return Err(ActorError::Frozen(cell.body.kind()));
        }
        Ok(f(&mut cell.body))
    }

    /// Snapshot of the current storage (moved objects included)
    pub fn snapshot(&self) -> Object {
        self.0.read().body.clone()
    }

    /// Transfer the storage into a new object and poison this one.
    ///
    /// The transfer is shallow: children are handed over by handle.
    pub fn move_out(&self) -> Result<ObjRef> {
        let mut cell = self.0.write();
        if matches!(cell.body, Object::Moved) {
            return Err(ActorError::Moved);
        }
        if !cell.body.is_movable() {
            return Err(ActorError::NotMovable(cell.body.kind()));
        }
        let body = std::mem::replace(&mut cell.body, Object::Moved);
        cell.frozen = true;
        Ok(ObjRef::new(body))
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let lhs = self.0.read();
        let rhs = other.0.read();
        // Poisoned storage never compares equal to live storage
        !matches!(lhs.body, Object::Moved) && lhs.body == rhs.body
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.0.read();
        if cell.frozen {
            write!(f, "frozen ")?;
        }
        write!(f, "{:?}", cell.body)
    }
}

#[derive(Serialize)]
struct CellRef<'a> {
    frozen: bool,
    body: &'a Object,
}

#[derive(Deserialize)]
struct CellOwned {
    frozen: bool,
    body: Object,
}

impl Serialize for ObjRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let cell = self.0.read();
        match &cell.body {
            Object::Moved => Err(S::Error::custom("moved object")),
            Object::Native(name) => Err(S::Error::custom(format!("native object {}", name))),
            body => CellRef {
                frozen: cell.frozen,
                body,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ObjRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let cell = CellOwned::deserialize(deserializer)?;
        Ok(ObjRef(Arc::new(RwLock::new(ObjCell {
            frozen: cell.frozen,
            body: cell.body,
        }))))
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Object(ObjRef::new(Object::Text(s.into())))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Object(ObjRef::new(Object::Array(items)))
    }

    pub fn map(entries: BTreeMap<MapKey, Value>) -> Value {
        Value::Object(ObjRef::new(Object::Map(entries)))
    }

    pub fn bytes(data: Vec<u8>) -> Value {
        Value::Object(ObjRef::new(Object::Bytes(data)))
    }

    pub fn file(path: impl Into<PathBuf>, position: u64) -> Value {
        Value::Object(ObjRef::new(Object::File(FileHandle {
            path: path.into(),
            position,
        })))
    }

    pub fn error(class: impl Into<String>, message: impl Into<String>) -> Value {
        Value::Object(ObjRef::new(Object::Error {
            class: class.into(),
            message: message.into(),
        }))
    }

    pub fn native(name: impl Into<String>) -> Value {
        Value::Object(ObjRef::new(Object::Native(name.into())))
    }

    pub fn symbol(s: impl Into<String>) -> Value {
        Value::Symbol(s.into())
    }

    pub fn is_immediate(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text contents, if this is a live text object
    pub fn as_text(&self) -> Option<String> {
        self.as_object()?
            .read(|obj| match obj {
                Object::Text(s) => Some(s.clone()),
                _ => None,
            })
            .ok()
            .flatten()
    }

    /// True if this handle points at poisoned storage
    pub fn is_moved(&self) -> bool {
        self.as_object().is_some_and(ObjRef::is_moved)
    }

    /// Immutable graph: immediates, or frozen objects whose children are
    /// all shareable.
    pub fn is_deeply_frozen(&self) -> bool {
        let mut seen = HashSet::new();
        deeply_frozen(self, &mut seen)
    }

    /// Deep-freeze the graph so it can be shared between actors.
    pub fn make_shareable(&self) -> Result<()> {
        let mut seen = HashSet::new();
        freeze_graph(self, &mut seen)
    }

    /// Human-readable representation
    pub fn to_debug_string(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Symbol(s) => format!(":{}", s),
            Value::Object(obj) => match obj.snapshot() {
                Object::Array(items) => {
                    let parts: Vec<String> = items.iter().map(Value::to_debug_string).collect();
                    format!("[{}]", parts.join(", "))
                }
                Object::Map(entries) => {
                    let parts: Vec<String> = entries
                        .iter()
                        .map(|(k, v)| format!("{} => {}", k, v.to_debug_string()))
                        .collect();
                    format!("{{{}}}", parts.join(", "))
                }
                Object::Text(s) => format!("{:?}", s),
                Object::Bytes(b) => format!("#<bytes len={}>", b.len()),
                Object::File(fh) => format!("#<file {}:{}>", fh.path.display(), fh.position),
                Object::Error { class, message } => format!("#<{}: {}>", class, message),
                Object::Native(name) => format!("#<native {}>", name),
                Object::Moved => "#<moved>".to_string(),
            },
        }
    }
}

fn deeply_frozen(value: &Value, seen: &mut HashSet<usize>) -> bool {
    let Value::Object(obj) = value else {
        return true;
    };
    if !seen.insert(obj.addr()) {
        return true;
    }
    let (frozen, children) = {
        let cell = obj.0.read();
        if matches!(cell.body, Object::Moved) {
            return false;
        }
        (cell.frozen, cell.body.children())
    };
    frozen && children.iter().all(|child| deeply_frozen(child, seen))
}

fn freeze_graph(value: &Value, seen: &mut HashSet<usize>) -> Result<()> {
    let Value::Object(obj) = value else {
        return Ok(());
    };
    if !seen.insert(obj.addr()) {
        return Ok(());
    }
    let children = {
        let cell = obj.0.read();
        match cell.body {
            Object::Native(_) => return Err(ActorError::NotShareable("native")),
            Object::Moved => return Err(ActorError::Moved),
            ref body => body.children(),
        }
    };
    for child in &children {
        freeze_graph(child, seen)?;
    }
    obj.freeze();
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_debug_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_object() {
        let a = Value::text("abc");
        let b = a.clone();
        b.as_object()
            .unwrap()
            .write(|obj| {
                if let Object::Text(s) = obj {
                    s.push('d');
                }
            })
            .unwrap();
        assert_eq!(a.as_text().as_deref(), Some("abcd"));
    }

    #[test]
    fn test_move_out_poisons_original() {
        let original = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let handle = original.as_object().unwrap().clone();

        let moved = handle.move_out().unwrap();

        assert!(original.is_moved());
        assert!(matches!(handle.read(|_| ()), Err(ActorError::Moved)));
        assert_eq!(
            moved.snapshot(),
            Object::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(original.to_debug_string(), "#<moved>");
    }

    #[test]
    fn test_move_out_rejects_unsupported_kinds() {
        let native = Value::native("socket");
        let err = native.as_object().unwrap().move_out().unwrap_err();
        assert!(matches!(err, ActorError::NotMovable("native")));
        assert!(!native.is_moved());

        let error = Value::error("RuntimeError", "x");
        assert!(matches!(
            error.as_object().unwrap().move_out(),
            Err(ActorError::NotMovable("error"))
        ));
    }

    #[test]
    fn test_move_twice_fails() {
        let text = Value::text("once");
        let obj = text.as_object().unwrap();
        obj.move_out().unwrap();
        assert!(matches!(obj.move_out(), Err(ActorError::Moved)));
    }

    #[test]
    fn test_moved_never_equals_live() {
        let a = Value::text("x");
        let b = Value::text("x");
        assert_eq!(a, b);
        a.as_object().unwrap().move_out().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_make_shareable_freezes_graph() {
        let inner = Value::text("inner");
        let outer = Value::array(vec![inner.clone(), Value::Int(3)]);
        assert!(!outer.is_deeply_frozen());

        outer.make_shareable().unwrap();

        assert!(outer.is_deeply_frozen());
        assert!(inner.as_object().unwrap().is_frozen());
        assert!(matches!(
            inner.as_object().unwrap().write(|_| ()),
            Err(ActorError::Frozen("text"))
        ));
    }

    #[test]
    fn test_make_shareable_rejects_native() {
        let v = Value::array(vec![Value::native("proc")]);
        assert!(matches!(v.make_shareable(), Err(ActorError::NotShareable("native"))));
    }

    #[test]
    fn test_frozen_parent_with_mutable_child_is_not_deeply_frozen() {
        let child = Value::text("mutable");
        let parent = Value::array(vec![child]);
        parent.as_object().unwrap().freeze();
        assert!(!parent.is_deeply_frozen());
    }

    #[test]
    fn test_moved_object_is_not_shareable() {
        let text = Value::text("gone");
        text.as_object().unwrap().move_out().unwrap();
        assert!(text.as_object().unwrap().is_frozen());
        assert!(!text.is_deeply_frozen());

        let frozen_parent = Value::array(vec![text]);
        frozen_parent.as_object().unwrap().freeze();
        assert!(!frozen_parent.is_deeply_frozen());
    }

    #[test]
    fn test_debug_string() {
        let mut entries = BTreeMap::new();
        entries.insert(MapKey::Symbol("k".to_string()), Value::Int(1));
        let v = Value::array(vec![Value::Nil, Value::text("s"), Value::map(entries)]);
        assert_eq!(v.to_debug_string(), "[nil, \"s\", {:k => 1}]");
    }
}
