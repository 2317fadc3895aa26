use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use im::{HashMap as ImHashMap, HashSet as ImHashSet, Vector as ImVector};

use crate::env::Env;
use crate::symbols::Symbol;
use crate::syntax::{Expr, SourceAccessor};

/// A forced (or partially forced) evaluation result.
///
/// Compound payloads live behind `Arc` so they have a stable address for the
/// lifetime of the value; hashing uses that address both as a cache key and
/// as the identity token for cycle detection.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Str(Arc<StrValue>),
    Path(Arc<PathValue>),
    List(Arc<ImVector<Value>>),
    Attrs(Arc<ImHashMap<Symbol, Value>>),
    Closure(Arc<ClosureValue>),
    Thunk(Arc<ThunkValue>),
    /// A function application caught mid-flight.
    App(Arc<AppValue>),
    External(Arc<dyn ExternalValue>),
    /// Slot marker for "currently being forced". Never a real value.
    BlackHole,
}

/// String plus the set of external dependency identifiers it was built from.
/// Two strings with equal text but different context sets are not
/// semantically equal.
pub struct StrValue {
    pub text: String,
    pub context: ImHashSet<String>,
}

pub struct PathValue {
    pub path: PathBuf,
    pub accessor: Option<SourceAccessor>,
}

pub struct ClosureValue {
    pub lambda: Arc<Expr>,
    pub env: Arc<Env>,
}

/// A deferred computation: an expression waiting to be evaluated in an
/// environment. The hashing engine never forces one of these implicitly;
/// once the evaluator has forced it, the result lands in `cached` and
/// hashing sees through to it.
pub struct ThunkValue {
    pub expr: Arc<Expr>,
    pub env: Arc<Env>,
    pub cached: Mutex<Option<Value>>,
}

impl ThunkValue {
    pub fn new(expr: Arc<Expr>, env: Arc<Env>) -> Self {
        Self {
            expr,
            env,
            cached: Mutex::new(None),
        }
    }

    pub fn resolve(&self, value: Value) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(value);
        }
    }

    pub fn cached(&self) -> Option<Value> {
        if let Ok(cached) = self.cached.lock() {
            return cached.clone();
        }
        None
    }
}

pub struct AppValue {
    pub func: Value,
    pub args: Vec<Value>,
}

/// Opaque host value carried through evaluation unchanged.
pub trait ExternalValue: Send + Sync {
    /// Declared type tag, folded into the value's identity hash.
    fn type_tag(&self) -> &str;
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Attrs(_) => "attrs",
            Value::Closure(_) => "closure",
            Value::Thunk(_) => "thunk",
            Value::App(_) => "application",
            Value::External(_) => "external",
            Value::BlackHole => "black hole",
        }
    }

    /// Identity token for compound values: the address of the shared payload.
    /// Scalars have no identity; they cannot participate in cycles and are
    /// cheap enough not to cache.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Str(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::Path(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::List(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::Attrs(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::Closure(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::Thunk(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::App(payload) => Some(Arc::as_ptr(payload) as usize),
            Value::External(payload) => Some(Arc::as_ptr(payload) as *const u8 as usize),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Null | Value::BlackHole => {
                None
            }
        }
    }
}
