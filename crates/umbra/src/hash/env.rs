use std::sync::Arc;

use crate::env::Env;
use crate::symbols::SymbolTable;
use crate::value::Value;

use super::ancestors::{StackKind, Stacks};
use super::cache::ValueHashCache;
use super::fingerprint::{Fingerprint, FingerprintWriter, StructuralHash};
use super::portability::Portability;
use super::value::hash_value_inner;
use super::{trace_enabled, HashCtx, MAX_REASONABLE_ENV_SIZE};

const TAG_ENV: u8 = 0x61;

/// Hash an environment frame and its parent chain.
///
/// The chain is hashed by content from leaf to root (each parent using its
/// own recorded slot count), so a chain whose values are all portable is
/// itself reusable across runs; the result is still a [`StructuralHash`]
/// because the values inside may embed identity.
pub fn hash_env(
    env: &Arc<Env>,
    slot_count: usize,
    symbols: &SymbolTable,
    value_cache: Option<&ValueHashCache>,
) -> StructuralHash {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_env_inner(env, slot_count, &ctx, &mut stacks, &mut portability);
    if trace_enabled() {
        eprintln!("[UMBRA_TRACE_HASH] env ({slot_count} slots) -> {fingerprint}");
    }
    StructuralHash::from_fingerprint(fingerprint)
}

/// Like [`hash_env`], but classifies the whole chain: non-portable as soon
/// as any contained value is.
pub fn hash_env_with_portability(
    env: &Arc<Env>,
    slot_count: usize,
    symbols: &SymbolTable,
) -> (StructuralHash, Portability) {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache: None,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_env_inner(env, slot_count, &ctx, &mut stacks, &mut portability);
    (StructuralHash::from_fingerprint(fingerprint), portability)
}

pub(super) fn hash_env_inner(
    env: &Arc<Env>,
    slot_count: usize,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
    portability: &mut Portability,
) -> Fingerprint {
    // A size field past the ceiling is garbage; degrade instead of reading
    // out of bounds.
    if slot_count > MAX_REASONABLE_ENV_SIZE {
        if trace_enabled() {
            eprintln!("[UMBRA_TRACE_HASH] env size {slot_count} over ceiling, placeholder");
        }
        return Fingerprint::placeholder();
    }
    let token = Arc::as_ptr(env) as usize;
    if let Some(back_ref) = stacks.lookup(StackKind::Env, token) {
        return back_ref;
    }
    let (fingerprint, _) = stacks.scoped(StackKind::Env, token, |stacks| {
        let mut writer = FingerprintWriter::new();
        writer.tag(TAG_ENV);
        writer.u64(slot_count as u64);
        match env.up() {
            Some(parent) => {
                writer.u8(1);
                let parent_size = parent.size();
                let parent = hash_env_inner(parent, parent_size, ctx, stacks, portability);
                writer.fingerprint(&parent);
            }
            None => writer.u8(0),
        }
        for index in 0..slot_count {
            // Empty, never-initialized, and currently-being-forced slots
            // are all the same thing to a hash: absent.
            match env.slot(index) {
                Some(value) if !matches!(value, Value::BlackHole) => {
                    writer.u8(1);
                    let value = hash_value_inner(&value, ctx, stacks, portability);
                    writer.fingerprint(&value);
                }
                _ => writer.u8(0),
            }
        }
        writer.finish()
    });
    fingerprint
}
