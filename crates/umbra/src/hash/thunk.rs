use std::sync::Arc;

use crate::env::Env;
use crate::symbols::SymbolTable;
use crate::syntax::Expr;

use super::ancestors::Stacks;
use super::cache::{ExprHashCache, ValueHashCache};
use super::env::hash_env_inner;
use super::expr::hash_expr_inner;
use super::fingerprint::{FingerprintWriter, StructuralHash};
use super::portability::Portability;
use super::{trace_enabled, HashCtx};

const TAG_THUNK_KEY: u8 = 0x71;

/// Memoization key for a deferred computation: this expression, in this
/// environment, under this many levels of exception-catching nesting.
///
/// The try depth is part of the key because the same expression can
/// produce a recoverable value inside a catching boundary and a hard error
/// outside one.
pub fn hash_thunk(
    expr: &Arc<Expr>,
    env: Option<&Arc<Env>>,
    slot_count: usize,
    try_depth: u32,
    symbols: &SymbolTable,
    expr_cache: Option<&ExprHashCache>,
    value_cache: Option<&ValueHashCache>,
) -> StructuralHash {
    let ctx = HashCtx {
        symbols,
        expr_cache,
        value_cache,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let mut writer = FingerprintWriter::new();
    writer.tag(TAG_THUNK_KEY);
    let expr_hash = hash_expr_inner(expr, &ctx, &mut stacks, &mut portability);
    writer.fingerprint(&expr_hash);
    match env {
        Some(env) => {
            writer.u8(1);
            let env_hash = hash_env_inner(env, slot_count, &ctx, &mut stacks, &mut portability);
            writer.fingerprint(&env_hash);
        }
        // Free-standing thunk: fixed no-environment marker.
        None => writer.u8(0),
    }
    writer.u32(try_depth);
    let fingerprint = writer.finish();
    if trace_enabled() {
        eprintln!(
            "[UMBRA_TRACE_HASH] thunk #{} try_depth={try_depth} -> {fingerprint}",
            expr.id()
        );
    }
    StructuralHash::from_fingerprint(fingerprint)
}

/// [`hash_thunk`] with the slot count taken from the frame's own record.
pub fn hash_thunk_auto(
    expr: &Arc<Expr>,
    env: Option<&Arc<Env>>,
    try_depth: u32,
    symbols: &SymbolTable,
    expr_cache: Option<&ExprHashCache>,
    value_cache: Option<&ValueHashCache>,
) -> StructuralHash {
    let slot_count = env.map(|env| env.size()).unwrap_or(0);
    hash_thunk(
        expr, env, slot_count, try_depth, symbols, expr_cache, value_cache,
    )
}
