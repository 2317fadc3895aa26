//! umbra — content-addressable hashing and cache keys for a lazy
//! functional evaluator.
//!
//! The engine computes stable fingerprints for four kinds of entities:
//! unevaluated expressions, environment frames, forced values, and thunks
//! (expression + environment pairs awaiting evaluation). Hashing never
//! forces a thunk, terminates on cyclic data via back-references, and tags
//! every result with a [`Portability`] classification so callers know
//! whether a hash may outlive the process that produced it.
//!
//! The evaluator proper (forcing, allocation, parsing) is a collaborator,
//! not part of this crate: the hashers read through shared, immutable views
//! of expressions, values, and environment frames.

mod env;
mod hash;
mod symbols;
mod syntax;
mod value;

pub use env::Env;
pub use hash::{
    hash_env, hash_env_with_portability, hash_expr, hash_expr_with_portability, hash_thunk,
    hash_thunk_auto, hash_value, hash_value_if_cheap, hash_value_with_portability,
    set_trace_override, try_hash_value_strict, ContentHash, ExprHashCache, Fingerprint, ForceError,
    HashCache, HashError, Portability, StructuralHash, ThunkForcer, ValueHashCache,
    MAX_CHEAP_ARITY, MAX_CHEAP_DEPTH, MAX_REASONABLE_ENV_SIZE,
};
pub use symbols::{Symbol, SymbolTable};
pub use syntax::{
    AttrDef, BinaryOp, Expr, Formal, Formals, IdGen, LetBinding, SourceAccessor, UnaryOp,
    VarBinding,
};
pub use value::{AppValue, ClosureValue, ExternalValue, PathValue, StrValue, ThunkValue, Value};
