use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use getrandom::getrandom;
use walkdir::WalkDir;

use crate::symbols::SymbolTable;
use crate::syntax::{AttrDef, Expr, Formal, LetBinding, SourceAccessor, VarBinding};

use super::ancestors::{StackKind, Stacks};
use super::cache::ExprHashCache;
use super::fingerprint::{ContentHash, Fingerprint, FingerprintWriter};
use super::portability::Portability;
use super::{trace_enabled, HashCtx};

const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_STR: u8 = 0x03;
const TAG_PATH: u8 = 0x04;
const TAG_VAR: u8 = 0x05;
const TAG_SELECT: u8 = 0x06;
const TAG_HAS_ATTR: u8 = 0x07;
const TAG_ATTRS: u8 = 0x08;
const TAG_LIST: u8 = 0x09;
const TAG_LAMBDA: u8 = 0x0a;
const TAG_CALL: u8 = 0x0b;
const TAG_LET: u8 = 0x0c;
const TAG_IF: u8 = 0x0d;
const TAG_ASSERT: u8 = 0x0e;
const TAG_WITH: u8 = 0x0f;
const TAG_UNARY: u8 = 0x10;
const TAG_BINARY: u8 = 0x11;
const TAG_CONCAT_STRINGS: u8 = 0x12;
const TAG_CUR_POS: u8 = 0x13;
const TAG_OPAQUE: u8 = 0x14;

const VAR_LEXICAL: u8 = 0;
const VAR_DYNAMIC: u8 = 1;

const PATH_TIER_ACCESSOR: u8 = 0;
const PATH_TIER_CONTENT: u8 = 1;
const PATH_TIER_RAW: u8 = 2;

const CONTENT_FILE: u8 = 0;
const CONTENT_DIR: u8 = 1;
const CONTENT_SYMLINK: u8 = 2;

/// Hash an expression structurally. Alpha-equivalent expressions (same
/// shape, different bound names) hash identically; two independent parses of
/// the same source hash identically.
pub fn hash_expr(
    expr: &Arc<Expr>,
    symbols: &SymbolTable,
    cache: Option<&ExprHashCache>,
) -> ContentHash {
    let ctx = HashCtx {
        symbols,
        expr_cache: cache,
        value_cache: None,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_expr_inner(expr, &ctx, &mut stacks, &mut portability);
    if trace_enabled() {
        eprintln!("[UMBRA_TRACE_HASH] expr #{} -> {fingerprint}", expr.id());
    }
    ContentHash::from_fingerprint(fingerprint)
}

/// Like [`hash_expr`], but also classifies whether the result may leave the
/// process. No cache: cached entries do not remember their taint.
pub fn hash_expr_with_portability(
    expr: &Arc<Expr>,
    symbols: &SymbolTable,
) -> (ContentHash, Portability) {
    let ctx = HashCtx {
        symbols,
        expr_cache: None,
        value_cache: None,
    };
    let mut stacks = Stacks::new();
    let mut portability = Portability::Portable;
    let fingerprint = hash_expr_inner(expr, &ctx, &mut stacks, &mut portability);
    (ContentHash::from_fingerprint(fingerprint), portability)
}

pub(super) fn hash_expr_inner(
    expr: &Arc<Expr>,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
    portability: &mut Portability,
) -> Fingerprint {
    let token = Arc::as_ptr(expr) as usize;
    if let Some(cache) = ctx.expr_cache {
        if let Some(hit) = cache.get(token) {
            if trace_enabled() {
                eprintln!("[UMBRA_TRACE_HASH] expr cache hit #{}", expr.id());
            }
            return hit.fingerprint();
        }
    }
    if let Some(back_ref) = stacks.lookup(StackKind::Expr, token) {
        return back_ref;
    }
    let (fingerprint, cacheable) = stacks.scoped(StackKind::Expr, token, |stacks| {
        hash_expr_kind(expr, ctx, stacks, portability)
    });
    if cacheable {
        if let Some(cache) = ctx.expr_cache {
            cache.insert(token, ContentHash::from_fingerprint(fingerprint));
        }
    }
    fingerprint
}

fn hash_expr_kind(
    expr: &Arc<Expr>,
    ctx: &HashCtx<'_>,
    stacks: &mut Stacks,
    portability: &mut Portability,
) -> Fingerprint {
    let mut writer = FingerprintWriter::new();
    match &**expr {
        Expr::Int { value, .. } => {
            writer.tag(TAG_INT);
            writer.i64(*value);
        }
        // Float literal *expressions* keep their exact bit pattern; only
        // forced float values get canonicalized. `0.0` and `-(0.0)` are
        // different ASTs and must stay distinguishable.
        Expr::Float { value, .. } => {
            writer.tag(TAG_FLOAT);
            writer.f64_bits(value.to_bits());
        }
        Expr::Str { text, .. } => {
            writer.tag(TAG_STR);
            writer.str(text);
        }
        Expr::Path { path, accessor, .. } => {
            writer.tag(TAG_PATH);
            write_path(&mut writer, path, accessor.as_ref(), portability);
        }
        Expr::Var { name, binding, .. } => {
            writer.tag(TAG_VAR);
            match binding {
                // Only the binding position: this is what makes
                // alpha-equivalent expressions hash equal.
                VarBinding::Lexical { level, offset } => {
                    writer.u8(VAR_LEXICAL);
                    writer.u32(*level);
                    writer.u32(*offset);
                }
                // Two different names resolved through the same dynamic
                // scope are different lookups, so the name is content here.
                VarBinding::Dynamic { with_level } => {
                    writer.u8(VAR_DYNAMIC);
                    writer.u32(*with_level);
                    writer.str(ctx.symbols.resolve(*name));
                }
            }
        }
        Expr::Select {
            base,
            path,
            default,
            ..
        } => {
            writer.tag(TAG_SELECT);
            let base = hash_expr_inner(base, ctx, stacks, portability);
            writer.fingerprint(&base);
            writer.u64(path.len() as u64);
            for name in path {
                writer.str(ctx.symbols.resolve(*name));
            }
            match default {
                Some(default) => {
                    writer.u8(1);
                    let default = hash_expr_inner(default, ctx, stacks, portability);
                    writer.fingerprint(&default);
                }
                None => writer.u8(0),
            }
        }
        Expr::HasAttr { base, path, .. } => {
            writer.tag(TAG_HAS_ATTR);
            let base = hash_expr_inner(base, ctx, stacks, portability);
            writer.fingerprint(&base);
            writer.u64(path.len() as u64);
            for name in path {
                writer.str(ctx.symbols.resolve(*name));
            }
        }
        // Attribute names are content; their order in the source is not.
        Expr::Attrs {
            recursive, entries, ..
        } => {
            writer.tag(TAG_ATTRS);
            writer.u8(u8::from(*recursive));
            writer.u64(entries.len() as u64);
            let mut sorted: Vec<&AttrDef> = entries.iter().collect();
            sorted.sort_by(|a, b| {
                ctx.symbols
                    .resolve(a.name)
                    .as_bytes()
                    .cmp(ctx.symbols.resolve(b.name).as_bytes())
            });
            for entry in sorted {
                writer.str(ctx.symbols.resolve(entry.name));
                let value = hash_expr_inner(&entry.value, ctx, stacks, portability);
                writer.fingerprint(&value);
            }
        }
        // List element order is semantically significant.
        Expr::List { items, .. } => {
            writer.tag(TAG_LIST);
            writer.u64(items.len() as u64);
            for item in items {
                let item = hash_expr_inner(item, ctx, stacks, portability);
                writer.fingerprint(&item);
            }
        }
        // Only the parameter shape is hashed, never the names; the sort by
        // name gives a canonical order without leaking the names into the
        // digest.
        Expr::Lambda {
            arg,
            formals,
            body,
            ..
        } => {
            writer.tag(TAG_LAMBDA);
            writer.u8(u8::from(arg.is_some()));
            match formals {
                Some(formals) => {
                    writer.u8(1);
                    writer.u8(u8::from(formals.ellipsis));
                    writer.u64(formals.entries.len() as u64);
                    let mut sorted: Vec<&Formal> = formals.entries.iter().collect();
                    sorted.sort_by(|a, b| {
                        ctx.symbols
                            .resolve(a.name)
                            .as_bytes()
                            .cmp(ctx.symbols.resolve(b.name).as_bytes())
                    });
                    for formal in sorted {
                        match &formal.default {
                            Some(default) => {
                                writer.u8(1);
                                let default = hash_expr_inner(default, ctx, stacks, portability);
                                writer.fingerprint(&default);
                            }
                            None => writer.u8(0),
                        }
                    }
                }
                None => writer.u8(0),
            }
            let body = hash_expr_inner(body, ctx, stacks, portability);
            writer.fingerprint(&body);
        }
        Expr::Call { func, args, .. } => {
            writer.tag(TAG_CALL);
            let func = hash_expr_inner(func, ctx, stacks, portability);
            writer.fingerprint(&func);
            writer.u64(args.len() as u64);
            for arg in args {
                let arg = hash_expr_inner(arg, ctx, stacks, portability);
                writer.fingerprint(&arg);
            }
        }
        // Binding names stay out of the digest, like lambda parameters:
        // references are position-hashed, so `let a = 1; a` and
        // `let b = 1; b` are the same computation. Sorting by name fixes a
        // canonical order for the value sub-hashes.
        Expr::Let { bindings, body, .. } => {
            writer.tag(TAG_LET);
            writer.u64(bindings.len() as u64);
            let mut sorted: Vec<&LetBinding> = bindings.iter().collect();
            sorted.sort_by(|a, b| {
                ctx.symbols
                    .resolve(a.name)
                    .as_bytes()
                    .cmp(ctx.symbols.resolve(b.name).as_bytes())
            });
            for binding in sorted {
                let value = hash_expr_inner(&binding.value, ctx, stacks, portability);
                writer.fingerprint(&value);
            }
            let body = hash_expr_inner(body, ctx, stacks, portability);
            writer.fingerprint(&body);
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            writer.tag(TAG_IF);
            let cond = hash_expr_inner(cond, ctx, stacks, portability);
            writer.fingerprint(&cond);
            let then_branch = hash_expr_inner(then_branch, ctx, stacks, portability);
            writer.fingerprint(&then_branch);
            let else_branch = hash_expr_inner(else_branch, ctx, stacks, portability);
            writer.fingerprint(&else_branch);
        }
        Expr::Assert { cond, body, .. } => {
            writer.tag(TAG_ASSERT);
            let cond = hash_expr_inner(cond, ctx, stacks, portability);
            writer.fingerprint(&cond);
            let body = hash_expr_inner(body, ctx, stacks, portability);
            writer.fingerprint(&body);
        }
        Expr::With { scope, body, .. } => {
            writer.tag(TAG_WITH);
            let scope = hash_expr_inner(scope, ctx, stacks, portability);
            writer.fingerprint(&scope);
            let body = hash_expr_inner(body, ctx, stacks, portability);
            writer.fingerprint(&body);
        }
        Expr::Unary { op, expr: inner, .. } => {
            writer.tag(TAG_UNARY);
            writer.u8(*op as u8);
            let inner = hash_expr_inner(inner, ctx, stacks, portability);
            writer.fingerprint(&inner);
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            writer.tag(TAG_BINARY);
            writer.u8(*op as u8);
            let left = hash_expr_inner(left, ctx, stacks, portability);
            writer.fingerprint(&left);
            let right = hash_expr_inner(right, ctx, stacks, portability);
            writer.fingerprint(&right);
        }
        Expr::ConcatStrings { parts, .. } => {
            writer.tag(TAG_CONCAT_STRINGS);
            writer.u64(parts.len() as u64);
            for part in parts {
                let part = hash_expr_inner(part, ctx, stacks, portability);
                writer.fingerprint(&part);
            }
        }
        // The position identifier only means anything inside this process.
        Expr::CurPos { id } => {
            writer.tag(TAG_CUR_POS);
            writer.u64(session_nonce());
            writer.u32(*id);
            portability.absorb(Portability::NonPortableSessionLocal);
        }
        // Internal-only marker: fall back to node identity.
        Expr::BlackHole { .. } => {
            writer.tag(TAG_OPAQUE);
            writer.u64(Arc::as_ptr(expr) as usize as u64);
            portability.absorb(Portability::NonPortablePointer);
        }
    }
    writer.finish()
}

/// Tiered path hashing, shared by path literal expressions and forced path
/// values:
///
/// 0. accessor fingerprint + relative path (portable, no filesystem access);
/// 1. content hash of the file or directory bytes (portable);
/// 2. the raw absolute path string (not portable).
pub(super) fn write_path(
    writer: &mut FingerprintWriter,
    path: &Path,
    accessor: Option<&SourceAccessor>,
    portability: &mut Portability,
) {
    if let Some(accessor) = accessor {
        if let Some(fingerprint) = &accessor.fingerprint {
            writer.u8(PATH_TIER_ACCESSOR);
            writer.bytes(fingerprint);
            writer.str(&path.to_string_lossy());
            return;
        }
    }
    let resolved: PathBuf = match accessor {
        Some(accessor) => accessor.root.join(path),
        None => path.to_path_buf(),
    };
    if let Some(content) = path_content_fingerprint(&resolved) {
        writer.u8(PATH_TIER_CONTENT);
        writer.fingerprint(&content);
        return;
    }
    writer.u8(PATH_TIER_RAW);
    writer.str(&resolved.to_string_lossy());
    portability.absorb(Portability::NonPortableRawPath);
}

/// Content hash of whatever `path` names: file bytes, a sorted directory
/// walk, or a symlink target. `None` if the path cannot be read.
fn path_content_fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = std::fs::symlink_metadata(path).ok()?;
    let mut writer = FingerprintWriter::new();
    if metadata.is_dir() {
        writer.u8(CONTENT_DIR);
        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = entry.ok()?;
            if entry.depth() == 0 {
                continue;
            }
            let relative = entry.path().strip_prefix(path).ok()?;
            writer.str(&relative.to_string_lossy());
            let file_type = entry.file_type();
            if file_type.is_dir() {
                writer.u8(CONTENT_DIR);
            } else if file_type.is_file() {
                writer.u8(CONTENT_FILE);
                writer.bytes(&std::fs::read(entry.path()).ok()?);
            } else {
                writer.u8(CONTENT_SYMLINK);
                let target = std::fs::read_link(entry.path()).ok()?;
                writer.str(&target.to_string_lossy());
            }
        }
    } else if metadata.is_file() {
        writer.u8(CONTENT_FILE);
        writer.bytes(&std::fs::read(path).ok()?);
    } else if metadata.file_type().is_symlink() {
        writer.u8(CONTENT_SYMLINK);
        let target = std::fs::read_link(path).ok()?;
        writer.str(&target.to_string_lossy());
    } else {
        return None;
    }
    Some(writer.finish())
}

/// Per-process nonce folded into session-local hashes so they cannot
/// accidentally collide with another run's.
pub(super) fn session_nonce() -> u64 {
    static SESSION_NONCE: OnceLock<u64> = OnceLock::new();
    *SESSION_NONCE.get_or_init(|| {
        let mut bytes = [0u8; 8];
        if getrandom(&mut bytes).is_err() {
            bytes = u64::from(std::process::id()).to_le_bytes();
        }
        u64::from_le_bytes(bytes)
    })
}
