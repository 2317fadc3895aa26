//! Content-addressable hashing for expressions, values, environments, and
//! thunks.
//!
//! Every entry point here runs to completion on the calling thread, keeps
//! its cycle-detection stacks call-local, and never forces a thunk unless
//! the caller opts in through [`hash_value_if_cheap`]. Hashes come in two
//! flavors that must not be confused: [`ContentHash`] results are candidates
//! for cross-run reuse (subject to their [`Portability`] tag), while
//! [`StructuralHash`] results are only meaningful within the process that
//! produced them.

use std::cell::Cell;

mod ancestors;
mod cache;
mod env;
mod expr;
mod fingerprint;
mod portability;
mod simple;
#[cfg(test)]
mod tests;
mod thunk;
mod value;

pub use self::cache::{ExprHashCache, HashCache, ValueHashCache};
pub use self::env::{hash_env, hash_env_with_portability};
pub use self::expr::{hash_expr, hash_expr_with_portability};
pub use self::fingerprint::{ContentHash, Fingerprint, StructuralHash};
pub use self::portability::Portability;
pub use self::simple::{hash_value_if_cheap, ForceError, ThunkForcer};
pub use self::thunk::{hash_thunk, hash_thunk_auto};
pub use self::value::{hash_value, hash_value_with_portability, try_hash_value_strict};

use crate::symbols::SymbolTable;

/// Sanity ceiling for reported environment sizes. A frame claiming more
/// slots than this is a corrupted size field, not a real environment, and
/// hashes as a placeholder instead of being read out of bounds.
pub const MAX_REASONABLE_ENV_SIZE: usize = 65_536;

/// Nesting ceiling for the opt-in force-and-hash helper.
pub const MAX_CHEAP_DEPTH: usize = 8;

/// List/attr arity ceiling for the opt-in force-and-hash helper.
pub const MAX_CHEAP_ARITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// The strict, serialization-style hashing path met a value kind it
    /// refuses to approximate (closures, thunks, externals, black holes).
    #[error("unsupported value kind for content hashing: {0}")]
    UnsupportedKind(&'static str),
}

/// Read-only per-call context shared by the mutually-recursive hashers.
pub(crate) struct HashCtx<'a> {
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) expr_cache: Option<&'a ExprHashCache>,
    pub(crate) value_cache: Option<&'a ValueHashCache>,
}

thread_local! {
    static TRACE_OVERRIDE: Cell<Option<bool>> = const { Cell::new(None) };
}

pub(crate) fn trace_enabled() -> bool {
    TRACE_OVERRIDE.with(|cell| {
        cell.get()
            .unwrap_or_else(|| std::env::var("UMBRA_TRACE_HASH").is_ok_and(|v| v == "1"))
    })
}

/// Force tracing on or off for the current thread, overriding
/// `UMBRA_TRACE_HASH`. `None` restores the environment-variable behavior.
pub fn set_trace_override(enabled: Option<bool>) {
    TRACE_OVERRIDE.with(|cell| cell.set(enabled));
}
