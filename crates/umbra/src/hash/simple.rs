use std::sync::Arc;

use crate::symbols::SymbolTable;
use crate::value::{ThunkValue, Value};

use super::expr::write_path;
use super::fingerprint::{ContentHash, Fingerprint, FingerprintWriter};
use super::portability::Portability;
use super::value::{
    write_bool, write_float, write_int, write_null, write_str_value, ATTRS_TAG, LIST_TAG, PATH_TAG,
};
use super::{MAX_CHEAP_ARITY, MAX_CHEAP_DEPTH};
use crate::syntax::Expr;

/// Supplied by the evaluator when it opts into forced hashing. The
/// unconditional hashers never call this; only [`hash_value_if_cheap`]
/// does, and only for thunks it has already judged cheap.
pub trait ThunkForcer {
    fn force(&mut self, thunk: &Arc<ThunkValue>) -> Result<Value, ForceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ForceError {
    #[error("infinite recursion while forcing")]
    InfiniteRecursion,
    #[error("forcing failed: {0}")]
    Failed(String),
}

/// Bounded force-and-hash: hash a value by content, forcing nested thunks
/// along the way, but only while everything stays cheap. Gives up (`None`)
/// on functions, externals, in-flight applications, anything nested deeper
/// than [`MAX_CHEAP_DEPTH`], any list/attrs wider than [`MAX_CHEAP_ARITY`],
/// and any thunk whose unevaluated expression is not itself cheap data.
///
/// On success the digest matches what [`super::hash_value`] would produce
/// for the fully-forced structure.
pub fn hash_value_if_cheap(
    value: &Value,
    symbols: &SymbolTable,
    forcer: &mut dyn ThunkForcer,
) -> Option<ContentHash> {
    let fingerprint = cheap_fingerprint(value, symbols, forcer, 0)?;
    Some(ContentHash::from_fingerprint(fingerprint))
}

fn cheap_fingerprint(
    value: &Value,
    symbols: &SymbolTable,
    forcer: &mut dyn ThunkForcer,
    depth: usize,
) -> Option<Fingerprint> {
    if depth > MAX_CHEAP_DEPTH {
        return None;
    }
    let mut writer = FingerprintWriter::new();
    match value {
        Value::Int(v) => write_int(&mut writer, *v),
        Value::Float(v) => write_float(&mut writer, *v),
        Value::Bool(v) => write_bool(&mut writer, *v),
        Value::Null => write_null(&mut writer),
        Value::Str(payload) => write_str_value(&mut writer, payload),
        Value::Path(payload) => {
            writer.tag(PATH_TAG);
            let mut portability = Portability::Portable;
            write_path(
                &mut writer,
                &payload.path,
                payload.accessor.as_ref(),
                &mut portability,
            );
        }
        Value::List(items) => {
            if items.len() > MAX_CHEAP_ARITY {
                return None;
            }
            writer.tag(LIST_TAG);
            writer.u64(items.len() as u64);
            for item in items.iter() {
                let item = cheap_fingerprint(item, symbols, forcer, depth + 1)?;
                writer.fingerprint(&item);
            }
        }
        Value::Attrs(map) => {
            if map.len() > MAX_CHEAP_ARITY {
                return None;
            }
            writer.tag(ATTRS_TAG);
            writer.u64(map.len() as u64);
            let mut sorted: Vec<(&str, &Value)> = map
                .iter()
                .map(|(name, value)| (symbols.resolve(*name), value))
                .collect();
            sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            for (name, entry) in sorted {
                writer.str(name);
                let entry = cheap_fingerprint(entry, symbols, forcer, depth + 1)?;
                writer.fingerprint(&entry);
            }
        }
        Value::Thunk(payload) => {
            if let Some(resolved) = payload.cached() {
                return cheap_fingerprint(&resolved, symbols, forcer, depth);
            }
            if !is_cheap_expr(&payload.expr, depth) {
                return None;
            }
            let forced = forcer.force(payload).ok()?;
            return cheap_fingerprint(&forced, symbols, forcer, depth);
        }
        Value::Closure(_) | Value::App(_) | Value::External(_) | Value::BlackHole => {
            return None;
        }
    }
    Some(writer.finish())
}

/// Cheap data is literal-shaped: scalars and small, shallow lists/attrs of
/// cheap data. Anything needing real evaluation is not cheap to force.
fn is_cheap_expr(expr: &Expr, depth: usize) -> bool {
    if depth > MAX_CHEAP_DEPTH {
        return false;
    }
    match expr {
        Expr::Int { .. } | Expr::Float { .. } | Expr::Str { .. } | Expr::Path { .. } => true,
        Expr::List { items, .. } => {
            items.len() <= MAX_CHEAP_ARITY
                && items.iter().all(|item| is_cheap_expr(item, depth + 1))
        }
        Expr::Attrs {
            recursive: false,
            entries,
            ..
        } => {
            entries.len() <= MAX_CHEAP_ARITY
                && entries
                    .iter()
                    .all(|entry| is_cheap_expr(&entry.value, depth + 1))
        }
        _ => false,
    }
}
