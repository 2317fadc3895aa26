use std::sync::Arc;

use crate::symbols::SymbolTable;
use crate::value::{StrValue, Value};

use super::ancestors::{StackKind, Stacks};
use super::cache::ValueHashCache;
use super::expr::{hash_expr_inner, write_path};
use super::fingerprint::{ContentHash, Fingerprint, FingerprintWriter};
use super::portability::Portability;
use super::{trace_enabled, HashCtx, HashError};

// Value tags live in a different byte range than expression tags so a
// forced value never shares a digest preimage with the literal that
// produced it.
const TAG_INT: u8 = 0x41;
const TAG_FLOAT: u8 = 0x42;
const TAG_BOOL: u8 = 0x43;
const TAG_NULL: u8 = 0x44;
const TAG_STR: u8 = 0x45;
const TAG_PATH: u8 = 0x46;
const TAG_LIST: u8 = 0x47;
const TAG_ATTRS: u8 = 0x48;
const TAG_CLOSURE: u8 = 0x49;
const TAG_THUNK: u8 = 0x4a;
const TAG_APP: u8 = 0x4b;
const TAG_EXTERNAL: u8 = 0x4c;
const TAG_BLACK_HOLE: u8 = 0x4d;

const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// All NaNs collapse to one bit pattern and negative zero folds into
/// positive zero, so semantically equal floats hash identically whatever
/// their underlying encoding. Applies to forced values only.
pub(super) fn canonical_float_bits(value: f64) -> u64 {
    if value.is_nan() {
        CANONICAL_NAN_BITS
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Hash an already-forced value by content. Never forces nested thunks;
/// they contribute their (expression, environment) identity instead.
pub fn hash_value(
    value: &Value,
    symbols: &SymbolTable,
    cache: Option<&ValueHashCache>,
) -> ContentHash {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache: cache,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_value_inner(value, &ctx, &mut stacks, &mut portability);
    if trace_enabled() {
        eprintln!(
            "[UMBRA_TRACE_HASH] value {} -> {fingerprint}",
            value.kind_name()
        );
    }
    ContentHash::from_fingerprint(fingerprint)
}

/// Like [`hash_value`], but also classifies whether the result may leave
/// the process. No cache: cached entries do not remember their taint.
pub fn hash_value_with_portability(
    value: &Value,
    symbols: &SymbolTable,
) -> (ContentHash, Portability) {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache: None,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_value_inner(value, &ctx, &mut stacks, &mut portability);
    (ContentHash::from_fingerprint(fingerprint), portability)
}

pub(super) fn hash_value_inner(
    value: &Value,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
    portability: &mut Portability,
) -> Fingerprint {
    let Some(token) = value.identity() else {
        // Scalars: nothing to cache, nothing that can cycle.
        return hash_value_kind(value, ctx, stacks, portability);
    };
    if let Some(cache) = ctx.value_cache {
        if let Some(hit) = cache.get(token) {
            if trace_enabled() {
                eprintln!("[UMBRA_TRACE_HASH] value cache hit ({})", value.kind_name());
            }
            return hit.fingerprint();
        }
    }
    if let Some(back_ref) = stacks.lookup(StackKind::Value, token) {
        return back_ref;
    }
    let (fingerprint, cacheable) = stacks.scoped(StackKind::Value, token, |stacks| {
        hash_value_kind(value, ctx, stacks, portability)
    });
    if cacheable {
        if let Some(cache) = ctx.value_cache {
            cache.insert(token, ContentHash::from_fingerprint(fingerprint));
        }
    }
    fingerprint
}

fn hash_value_kind(
    value: &Value,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
    portability: &mut Portability,
) -> Fingerprint {
    let mut writer = FingerprintWriter::new();
    match value {
        Value::Int(v) => {
            writer.tag(TAG_INT);
            writer.i64(*v);
        }
        Value::Float(v) => {
            writer.tag(TAG_FLOAT);
            writer.f64_bits(canonical_float_bits(*v));
        }
        Value::Bool(v) => {
            writer.tag(TAG_BOOL);
            writer.u8(u8::from(*v));
        }
        Value::Null => {
            writer.tag(TAG_NULL);
        }
        Value::Str(payload) => {
            write_str_value(&mut writer, payload);
        }
        Value::Path(payload) => {
            writer.tag(TAG_PATH);
            write_path(
                &mut writer,
                &payload.path,
                payload.accessor.as_ref(),
                portability,
            );
        }
        Value::List(items) => {
            writer.tag(TAG_LIST);
            writer.u64(items.len() as u64);
            for item in items.iter() {
                let item = hash_value_inner(item, ctx, stacks, portability);
                writer.fingerprint(&item);
            }
        }
        Value::Attrs(map) => {
            writer.tag(TAG_ATTRS);
            writer.u64(map.len() as u64);
            let mut sorted: Vec<(&str, &Value)> = map
                .iter()
                .map(|(name, value)| (ctx.symbols.resolve(*name), value))
                .collect();
            sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            for (name, entry) in sorted {
                writer.str(name);
                let entry = hash_value_inner(entry, ctx, stacks, portability);
                writer.fingerprint(&entry);
            }
        }
        // The body is content, the captured environment is identity:
        // closures never hash portably, by design.
        Value::Closure(payload) => {
            writer.tag(TAG_CLOSURE);
            let lambda = hash_expr_inner(&payload.lambda, ctx, stacks, portability);
            writer.fingerprint(&lambda);
            writer.u64(Arc::as_ptr(&payload.env) as usize as u64);
            portability.absorb(Portability::NonPortablePointer);
        }
        // A thunk the evaluator already forced is transparent: it hashes as
        // its result. An unresolved one is never forced here; its
        // (expression, environment) identity stands in.
        Value::Thunk(payload) => {
            if let Some(resolved) = payload.cached() {
                return hash_value_inner(&resolved, ctx, stacks, portability);
            }
            // The identity digest goes stale the moment the evaluator
            // resolves this thunk; nothing containing it may be cached.
            stacks.mark_volatile();
            writer.tag(TAG_THUNK);
            writer.u64(Arc::as_ptr(&payload.expr) as usize as u64);
            writer.u64(Arc::as_ptr(&payload.env) as usize as u64);
            portability.absorb(Portability::NonPortablePointer);
        }
        Value::App(payload) => {
            writer.tag(TAG_APP);
            writer.u64(Arc::as_ptr(payload) as usize as u64);
            portability.absorb(Portability::NonPortablePointer);
        }
        Value::External(payload) => {
            writer.tag(TAG_EXTERNAL);
            writer.str(payload.type_tag());
            writer.u64(Arc::as_ptr(payload) as *const u8 as usize as u64);
            portability.absorb(Portability::NonPortablePointer);
        }
        // Unit marker with no payload to address: every in-flight marker
        // shares one session-local digest.
        Value::BlackHole => {
            writer.tag(TAG_BLACK_HOLE);
            portability.absorb(Portability::NonPortableSessionLocal);
        }
    }
    writer.finish()
}

/// The context set is folded in sorted order: identical text under
/// different dependency contexts must not collide.
pub(super) fn write_str_value(writer: &mut FingerprintWriter, payload: &StrValue) {
    writer.tag(TAG_STR);
    writer.str(&payload.text);
    writer.u64(payload.context.len() as u64);
    let mut context: Vec<&String> = payload.context.iter().collect();
    context.sort();
    for entry in context {
        writer.str(entry);
    }
}

pub(super) fn write_int(writer: &mut FingerprintWriter, value: i64) {
    writer.tag(TAG_INT);
    writer.i64(value);
}

pub(super) fn write_float(writer: &mut FingerprintWriter, value: f64) {
    writer.tag(TAG_FLOAT);
    writer.f64_bits(canonical_float_bits(value));
}

pub(super) fn write_bool(writer: &mut FingerprintWriter, value: bool) {
    writer.tag(TAG_BOOL);
    writer.u8(u8::from(value));
}

pub(super) fn write_null(writer: &mut FingerprintWriter) {
    writer.tag(TAG_NULL);
}

pub(super) const LIST_TAG: u8 = TAG_LIST;
pub(super) const ATTRS_TAG: u8 = TAG_ATTRS;
pub(super) const PATH_TAG: u8 = TAG_PATH;

/// Serialization-style hashing: refuses, with a distinct error, any value
/// kind whose content hash would have to approximate (closures, thunks,
/// in-flight applications, externals, black holes) instead of silently
/// falling back to identity.
pub fn try_hash_value_strict(value: &Value, symbols: &SymbolTable) -> Result<ContentHash, HashError> {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache: None,
    };
    let mut stacks = Stacks::new();
    let fingerprint = hash_value_strict_inner(value, &ctx, &mut stacks)?;
    Ok(ContentHash::from_fingerprint(fingerprint))
}

fn hash_value_strict_inner(
    value: &Value,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
) -> Result<Fingerprint, HashError> {
    let Some(token) = value.identity() else {
        return hash_value_strict_kind(value, ctx, stacks);
    };
    if let Some(back_ref) = stacks.lookup(StackKind::Value, token) {
        return Ok(back_ref);
    }
    let (result, _) = stacks.scoped(StackKind::Value, token, |stacks| {
        hash_value_strict_kind(value, ctx, stacks)
    });
    result
}

fn hash_value_strict_kind(
    value: &Value,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
) -> Result<Fingerprint, HashError> {
    let mut writer = FingerprintWriter::new();
    let mut portability = Portability::Portable;
    match value {
        Value::Int(v) => write_int(&mut writer, *v),
        Value::Float(v) => write_float(&mut writer, *v),
        Value::Bool(v) => write_bool(&mut writer, *v),
        Value::Null => write_null(&mut writer),
        Value::Str(payload) => write_str_value(&mut writer, payload),
        Value::Path(payload) => {
            writer.tag(PATH_TAG);
            write_path(
                &mut writer,
                &payload.path,
                payload.accessor.as_ref(),
                &mut portability,
            );
        }
        Value::List(items) => {
            writer.tag(LIST_TAG);
            writer.u64(items.len() as u64);
            for item in items.iter() {
                let item = hash_value_strict_inner(item, ctx, stacks)?;
                writer.fingerprint(&item);
            }
        }
        Value::Attrs(map) => {
            writer.tag(ATTRS_TAG);
            writer.u64(map.len() as u64);
            let mut sorted: Vec<(&str, &Value)> = map
                .iter()
                .map(|(name, value)| (ctx.symbols.resolve(*name), value))
                .collect();
            sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            for (name, entry) in sorted {
                writer.str(name);
                let entry = hash_value_strict_inner(entry, ctx, stacks)?;
                writer.fingerprint(&entry);
            }
        }
        Value::Thunk(payload) => {
            return match payload.cached() {
                Some(resolved) => hash_value_strict_inner(&resolved, ctx, stacks),
                None => Err(HashError::UnsupportedKind(value.kind_name())),
            };
        }
        Value::Closure(_) | Value::App(_) | Value::External(_) | Value::BlackHole => {
            return Err(HashError::UnsupportedKind(value.kind_name()));
        }
    }
    Ok(writer.finish())
}
