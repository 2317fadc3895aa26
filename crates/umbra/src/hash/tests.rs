use std::path::PathBuf;
use std::sync::Arc;

use im::{HashMap as ImHashMap, HashSet as ImHashSet, Vector as ImVector};

use super::*;
use crate::env::Env;
use crate::symbols::{Symbol, SymbolTable};
use crate::syntax::{
    AttrDef, BinaryOp, Expr, Formal, Formals, IdGen, LetBinding, SourceAccessor, UnaryOp,
    VarBinding,
};
use crate::value::{ClosureValue, ExternalValue, StrValue, ThunkValue, Value};

fn int(ids: &mut IdGen, value: i64) -> Arc<Expr> {
    Arc::new(Expr::Int {
        id: ids.next(),
        value,
    })
}

fn float(ids: &mut IdGen, value: f64) -> Arc<Expr> {
    Arc::new(Expr::Float {
        id: ids.next(),
        value,
    })
}

fn var_lexical(ids: &mut IdGen, name: Symbol, level: u32, offset: u32) -> Arc<Expr> {
    Arc::new(Expr::Var {
        id: ids.next(),
        name,
        binding: VarBinding::Lexical { level, offset },
    })
}

fn var_dynamic(ids: &mut IdGen, name: Symbol, with_level: u32) -> Arc<Expr> {
    Arc::new(Expr::Var {
        id: ids.next(),
        name,
        binding: VarBinding::Dynamic { with_level },
    })
}

fn lambda(ids: &mut IdGen, arg: Symbol, body: Arc<Expr>) -> Arc<Expr> {
    Arc::new(Expr::Lambda {
        id: ids.next(),
        arg: Some(arg),
        formals: None,
        body,
    })
}

fn binary(ids: &mut IdGen, op: BinaryOp, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    Arc::new(Expr::Binary {
        id: ids.next(),
        op,
        left,
        right,
    })
}

fn one_plus_one(ids: &mut IdGen) -> Arc<Expr> {
    let left = int(ids, 1);
    let right = int(ids, 1);
    binary(ids, BinaryOp::Add, left, right)
}

fn identity_lambda(ids: &mut IdGen, arg: Symbol) -> Arc<Expr> {
    let body = var_lexical(ids, arg, 0, 0);
    lambda(ids, arg, body)
}

fn str_value(text: &str, context: &[&str]) -> Value {
    Value::Str(Arc::new(StrValue {
        text: text.to_string(),
        context: context.iter().map(|entry| entry.to_string()).collect(),
    }))
}

fn list_value(items: Vec<Value>) -> Value {
    Value::List(Arc::new(items.into_iter().collect::<ImVector<Value>>()))
}

fn attrs_value(entries: Vec<(Symbol, Value)>) -> Value {
    Value::Attrs(Arc::new(
        entries.into_iter().collect::<ImHashMap<Symbol, Value>>(),
    ))
}

fn empty_env() -> Arc<Env> {
    Arc::new(Env::new(None, 0))
}

struct LiteralForcer;

impl ThunkForcer for LiteralForcer {
    fn force(&mut self, thunk: &Arc<ThunkValue>) -> Result<Value, ForceError> {
        match &*thunk.expr {
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str { text, .. } => Ok(Value::Str(Arc::new(StrValue {
                text: text.clone(),
                context: ImHashSet::new(),
            }))),
            _ => Err(ForceError::Failed("not a literal".to_string())),
        }
    }
}

struct Opaque;

impl ExternalValue for Opaque {
    fn type_tag(&self) -> &str {
        "opaque"
    }
}

#[test]
fn expr_hashing_is_deterministic() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let one = int(&mut ids, 1);
    let two = int(&mut ids, 2);
    let sum = binary(&mut ids, BinaryOp::Add, one, two);
    let three = int(&mut ids, 3);
    let expr = binary(&mut ids, BinaryOp::Mul, sum, three);
    assert_eq!(
        hash_expr(&expr, &symbols, None),
        hash_expr(&expr, &symbols, None)
    );
}

#[test]
fn independent_parses_of_the_same_source_hash_equal() {
    // Two separate builds of `1 + 1`: different node ids, different
    // addresses, same content hash.
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let first = one_plus_one(&mut ids);

    let mut ids = IdGen::default();
    for _ in 0..17 {
        ids.next();
    }
    let second = one_plus_one(&mut ids);
    assert_eq!(
        hash_expr(&first, &symbols, None),
        hash_expr(&second, &symbols, None)
    );
}

#[test]
fn alpha_equivalent_lambdas_hash_equal() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let y = symbols.intern("y");
    let mut ids = IdGen::default();

    let id_x = identity_lambda(&mut ids, x);
    let id_y = identity_lambda(&mut ids, y);
    assert_eq!(
        hash_expr(&id_x, &symbols, None),
        hash_expr(&id_y, &symbols, None)
    );

    let one = int(&mut ids, 1);
    let const_one = lambda(&mut ids, x, one);
    assert_ne!(
        hash_expr(&id_x, &symbols, None),
        hash_expr(&const_one, &symbols, None)
    );
}

#[test]
fn alpha_equivalence_reaches_through_nested_binders() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let y = symbols.intern("y");
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let mut ids = IdGen::default();

    // x: y: x  vs  a: b: a
    let outer_ref = var_lexical(&mut ids, x, 1, 0);
    let inner = lambda(&mut ids, y, outer_ref);
    let xy = lambda(&mut ids, x, inner);
    let outer_ref = var_lexical(&mut ids, a, 1, 0);
    let inner = lambda(&mut ids, b, outer_ref);
    let ab = lambda(&mut ids, a, inner);
    assert_eq!(
        hash_expr(&xy, &symbols, None),
        hash_expr(&ab, &symbols, None)
    );

    // x: y: y resolves one level shallower and must not collide.
    let inner_ref = var_lexical(&mut ids, y, 0, 0);
    let inner = lambda(&mut ids, y, inner_ref);
    let xy_inner = lambda(&mut ids, x, inner);
    assert_ne!(
        hash_expr(&xy, &symbols, None),
        hash_expr(&xy_inner, &symbols, None)
    );
}

#[test]
fn let_bindings_are_alpha_equivalent() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let mut ids = IdGen::default();

    let with_a = Arc::new(Expr::Let {
        id: ids.next(),
        bindings: vec![LetBinding {
            name: a,
            value: int(&mut ids, 1),
        }],
        body: var_lexical(&mut ids, a, 0, 0),
    });
    let with_b = Arc::new(Expr::Let {
        id: ids.next(),
        bindings: vec![LetBinding {
            name: b,
            value: int(&mut ids, 1),
        }],
        body: var_lexical(&mut ids, b, 0, 0),
    });
    assert_eq!(
        hash_expr(&with_a, &symbols, None),
        hash_expr(&with_b, &symbols, None)
    );
}

#[test]
fn attr_expr_order_is_insignificant_but_names_are_content() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let mut ids = IdGen::default();

    let forward = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: false,
        entries: vec![
            AttrDef {
                name: a,
                value: int(&mut ids, 1),
            },
            AttrDef {
                name: b,
                value: int(&mut ids, 2),
            },
        ],
    });
    let backward = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: false,
        entries: vec![
            AttrDef {
                name: b,
                value: int(&mut ids, 2),
            },
            AttrDef {
                name: a,
                value: int(&mut ids, 1),
            },
        ],
    });
    assert_eq!(
        hash_expr(&forward, &symbols, None),
        hash_expr(&backward, &symbols, None)
    );

    let under_a = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: false,
        entries: vec![AttrDef {
            name: a,
            value: int(&mut ids, 1),
        }],
    });
    let under_b = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: false,
        entries: vec![AttrDef {
            name: b,
            value: int(&mut ids, 1),
        }],
    });
    assert_ne!(
        hash_expr(&under_a, &symbols, None),
        hash_expr(&under_b, &symbols, None)
    );
}

#[test]
fn recursive_attrs_differ_from_plain_ones() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let mut ids = IdGen::default();

    let plain = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: false,
        entries: vec![AttrDef {
            name: a,
            value: int(&mut ids, 1),
        }],
    });
    let recursive = Arc::new(Expr::Attrs {
        id: ids.next(),
        recursive: true,
        entries: vec![AttrDef {
            name: a,
            value: int(&mut ids, 1),
        }],
    });
    assert_ne!(
        hash_expr(&plain, &symbols, None),
        hash_expr(&recursive, &symbols, None)
    );
}

#[test]
fn value_attr_order_invariance_and_list_order_sensitivity() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");

    let forward = attrs_value(vec![(a, Value::Int(1)), (b, Value::Int(2))]);
    let backward = attrs_value(vec![(b, Value::Int(2)), (a, Value::Int(1))]);
    assert_eq!(
        hash_value(&forward, &symbols, None),
        hash_value(&backward, &symbols, None)
    );

    let ascending = list_value(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let descending = list_value(vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    assert_ne!(
        hash_value(&ascending, &symbols, None),
        hash_value(&descending, &symbols, None)
    );
}

#[test]
fn dynamic_scope_lookups_keep_the_name() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let y = symbols.intern("y");
    let mut ids = IdGen::default();

    let through_x = var_dynamic(&mut ids, x, 0);
    let through_y = var_dynamic(&mut ids, y, 0);
    assert_ne!(
        hash_expr(&through_x, &symbols, None),
        hash_expr(&through_y, &symbols, None)
    );

    let deeper = var_dynamic(&mut ids, x, 1);
    assert_ne!(
        hash_expr(&through_x, &symbols, None),
        hash_expr(&deeper, &symbols, None)
    );

    let again = var_dynamic(&mut ids, x, 0);
    assert_eq!(
        hash_expr(&through_x, &symbols, None),
        hash_expr(&again, &symbols, None)
    );
}

#[test]
fn float_values_canonicalize_but_float_exprs_do_not() {
    let symbols = SymbolTable::new();

    assert_eq!(
        hash_value(&Value::Float(0.0), &symbols, None),
        hash_value(&Value::Float(-0.0), &symbols, None)
    );

    let zero = 0.0_f64;
    let computed_nan = zero / zero;
    assert_eq!(
        hash_value(&Value::Float(f64::NAN), &symbols, None),
        hash_value(&Value::Float(computed_nan), &symbols, None)
    );
    assert_eq!(
        hash_value(&Value::Float(f64::NAN), &symbols, None),
        hash_value(&Value::Float(-f64::NAN), &symbols, None)
    );

    // `0.0` and `-(0.0)` are different ASTs: unary negation is a node.
    let mut ids = IdGen::default();
    let plain = float(&mut ids, 0.0);
    let negated = Arc::new(Expr::Unary {
        id: ids.next(),
        op: UnaryOp::Negate,
        expr: float(&mut ids, 0.0),
    });
    assert_ne!(
        hash_expr(&plain, &symbols, None),
        hash_expr(&negated, &symbols, None)
    );
}

#[test]
fn string_context_participates_in_the_hash() {
    let symbols = SymbolTable::new();
    let bare = str_value("out", &[]);
    let with_dep = str_value("out", &["/deps/a"]);
    let other_dep = str_value("out", &["/deps/b"]);
    let same_dep = str_value("out", &["/deps/a"]);

    assert_ne!(
        hash_value(&bare, &symbols, None),
        hash_value(&with_dep, &symbols, None)
    );
    assert_ne!(
        hash_value(&with_dep, &symbols, None),
        hash_value(&other_dep, &symbols, None)
    );
    assert_eq!(
        hash_value(&with_dep, &symbols, None),
        hash_value(&same_dep, &symbols, None)
    );
}

fn self_referential_attrs(symbols: &mut SymbolTable, name: &str) -> Value {
    // rec { <name> = <name>; } after forcing: the attribute's thunk has
    // resolved to the attribute set itself.
    let name = symbols.intern(name);
    let mut ids = IdGen::default();
    let thunk = Arc::new(ThunkValue::new(int(&mut ids, 0), empty_env()));
    let attrs = attrs_value(vec![(name, Value::Thunk(thunk.clone()))]);
    thunk.resolve(attrs.clone());
    attrs
}

#[test]
fn cyclic_values_terminate_and_hash_stably() {
    let mut symbols = SymbolTable::new();
    let cycle = self_referential_attrs(&mut symbols, "x");
    let first = hash_value(&cycle, &symbols, None);
    let second = hash_value(&cycle, &symbols, None);
    assert_eq!(first, second);
}

#[test]
fn cycles_with_different_bound_names_hash_differently() {
    let mut symbols = SymbolTable::new();
    let through_x = self_referential_attrs(&mut symbols, "x");
    let through_y = self_referential_attrs(&mut symbols, "y");
    assert_ne!(
        hash_value(&through_x, &symbols, None),
        hash_value(&through_y, &symbols, None)
    );
}

#[test]
fn mutual_cycles_terminate() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let mut ids = IdGen::default();

    // rec { a = b; b = a; } after forcing both.
    let thunk_a = Arc::new(ThunkValue::new(int(&mut ids, 0), empty_env()));
    let thunk_b = Arc::new(ThunkValue::new(int(&mut ids, 0), empty_env()));
    let attrs = attrs_value(vec![
        (a, Value::Thunk(thunk_a.clone())),
        (b, Value::Thunk(thunk_b.clone())),
    ]);
    thunk_a.resolve(attrs.clone());
    thunk_b.resolve(attrs.clone());
    assert_eq!(
        hash_value(&attrs, &symbols, None),
        hash_value(&attrs, &symbols, None)
    );
}

#[test]
fn only_self_contained_hashes_are_cached() {
    let mut symbols = SymbolTable::new();
    let cycle = self_referential_attrs(&mut symbols, "x");
    let cache = ValueHashCache::new();
    let uncached = hash_value(&cycle, &symbols, None);
    let with_cache = hash_value(&cycle, &symbols, Some(&cache));
    assert_eq!(uncached, with_cache);
    // The attribute set heads the cycle, so its back-reference stays within
    // its own subtree and its hash is cacheable. The thunk's hash depends on
    // the frame above it and must not land in the cache.
    assert_eq!(cache.len(), 1);
    assert_eq!(uncached, hash_value(&cycle, &symbols, Some(&cache)));
}

#[test]
fn caches_skip_subtrees_awaiting_forcing() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let mut ids = IdGen::default();

    let thunk = Arc::new(ThunkValue::new(int(&mut ids, 40), empty_env()));
    let container = attrs_value(vec![(a, Value::Thunk(thunk.clone()))]);

    // While the thunk is pending, its identity digest could be invalidated
    // by forcing at any moment; neither it nor its container may be cached.
    let cache = ValueHashCache::new();
    let pending = hash_value(&container, &symbols, Some(&cache));
    assert!(cache.is_empty());

    thunk.resolve(Value::Int(40));
    let forced = hash_value(&container, &symbols, Some(&cache));
    assert_ne!(pending, forced);
    assert_eq!(forced, hash_value(&container, &symbols, None));

    // After resolution the digests are stable and the cache fills in.
    assert!(!cache.is_empty());
    assert_eq!(forced, hash_value(&container, &symbols, Some(&cache)));
}

#[test]
fn black_hole_values_share_one_session_local_digest() {
    let symbols = SymbolTable::new();
    let (first, portability) = hash_value_with_portability(&Value::BlackHole, &symbols);
    assert_eq!(portability, Portability::NonPortableSessionLocal);
    let (second, _) = hash_value_with_portability(&Value::BlackHole, &symbols);
    assert_eq!(first, second);

    let in_list = list_value(vec![Value::BlackHole]);
    let (_, portability) = hash_value_with_portability(&in_list, &symbols);
    assert_eq!(portability, Portability::NonPortableSessionLocal);
}

#[test]
fn expr_cache_returns_identical_hashes() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = one_plus_one(&mut ids);
    let cache = ExprHashCache::new();
    let first = hash_expr(&expr, &symbols, Some(&cache));
    assert!(!cache.is_empty());
    let second = hash_expr(&expr, &symbols, Some(&cache));
    assert_eq!(first, second);
    assert_eq!(first, hash_expr(&expr, &symbols, None));
}

#[test]
fn value_cache_returns_identical_hashes() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let value = attrs_value(vec![(
        a,
        list_value(vec![Value::Int(1), str_value("s", &[])]),
    )]);
    let cache = ValueHashCache::new();
    let first = hash_value(&value, &symbols, Some(&cache));
    assert!(!cache.is_empty());
    assert_eq!(first, hash_value(&value, &symbols, Some(&cache)));
    assert_eq!(first, hash_value(&value, &symbols, None));
}

#[test]
fn cache_clear_resets_the_table() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = one_plus_one(&mut ids);
    let cache = ExprHashCache::new();
    hash_expr(&expr, &symbols, Some(&cache));
    assert!(!cache.is_empty());
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn try_depth_distinguishes_thunk_keys() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = int(&mut ids, 42);

    let depth0 = hash_thunk(&expr, None, 0, 0, &symbols, None, None);
    let depth1 = hash_thunk(&expr, None, 0, 1, &symbols, None, None);
    let depth2 = hash_thunk(&expr, None, 0, 2, &symbols, None, None);
    assert_ne!(depth0, depth1);
    assert_ne!(depth1, depth2);
    assert_ne!(depth0, depth2);
    assert_eq!(depth0, hash_thunk(&expr, None, 0, 0, &symbols, None, None));
}

#[test]
fn free_standing_thunks_differ_from_empty_environment_ones() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = int(&mut ids, 42);
    let env = empty_env();

    let free = hash_thunk(&expr, None, 0, 0, &symbols, None, None);
    let framed = hash_thunk(&expr, Some(&env), 0, 0, &symbols, None, None);
    assert_ne!(free, framed);
}

#[test]
fn thunk_auto_derives_the_slot_count() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = int(&mut ids, 7);
    let env = Arc::new(Env::new(None, 3));
    env.set(0, Value::Int(1));

    assert_eq!(
        hash_thunk_auto(&expr, Some(&env), 0, &symbols, None, None),
        hash_thunk(&expr, Some(&env), 3, 0, &symbols, None, None)
    );
}

#[test]
fn black_holed_slots_hash_like_empty_ones() {
    let symbols = SymbolTable::new();
    let filled = Arc::new(Env::new(None, 2));
    filled.set(0, Value::Int(1));

    let black_holed = Arc::new(Env::new(None, 2));
    black_holed.set(0, Value::Int(1));
    black_holed.set(1, Value::BlackHole);

    assert_eq!(
        hash_env(&filled, 2, &symbols, None),
        hash_env(&black_holed, 2, &symbols, None)
    );

    let occupied = Arc::new(Env::new(None, 2));
    occupied.set(0, Value::Int(1));
    occupied.set(1, Value::Int(2));
    assert_ne!(
        hash_env(&filled, 2, &symbols, None),
        hash_env(&occupied, 2, &symbols, None)
    );
}

#[test]
fn oversized_slot_counts_degrade_to_placeholder() {
    let symbols = SymbolTable::new();
    let env = empty_env();
    let hash = hash_env(&env, MAX_REASONABLE_ENV_SIZE + 1, &symbols, None);
    assert_eq!(hash, StructuralHash::placeholder());
}

#[test]
fn parent_chains_are_hashed_by_content() {
    let symbols = SymbolTable::new();
    let build = || {
        let parent = Arc::new(Env::new(None, 1));
        parent.set(0, Value::Int(10));
        let child = Arc::new(Env::new(Some(parent), 1));
        child.set(0, Value::Int(20));
        child
    };
    // Two structurally identical chains at different addresses.
    let first = build();
    let second = build();
    assert_eq!(
        hash_env(&first, 1, &symbols, None),
        hash_env(&second, 1, &symbols, None)
    );

    let orphan = Arc::new(Env::new(None, 1));
    orphan.set(0, Value::Int(20));
    assert_ne!(
        hash_env(&first, 1, &symbols, None),
        hash_env(&orphan, 1, &symbols, None)
    );
}

#[test]
fn portability_lattice_combines_first_taint_wins() {
    use Portability::*;
    assert_eq!(Portability::combine(Portable, Portable), Portable);
    assert_eq!(
        Portability::combine(Portable, NonPortablePointer),
        NonPortablePointer
    );
    assert_eq!(
        Portability::combine(NonPortableRawPath, NonPortablePointer),
        NonPortableRawPath
    );
    assert_eq!(
        Portability::combine(NonPortablePointer, NonPortableRawPath),
        NonPortablePointer
    );
    assert!(Portable.is_portable());
    assert!(!NonPortableSessionLocal.is_portable());
}

#[test]
fn scalar_values_are_portable() {
    let symbols = SymbolTable::new();
    for value in [
        Value::Int(5),
        Value::Float(2.5),
        Value::Bool(true),
        Value::Null,
        str_value("plain", &["/deps/a"]),
    ] {
        let (_, portability) = hash_value_with_portability(&value, &symbols);
        assert_eq!(portability, Portability::Portable);
    }
}

#[test]
fn closures_are_never_portable() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let mut ids = IdGen::default();
    let closure = Value::Closure(Arc::new(ClosureValue {
        lambda: identity_lambda(&mut ids, x),
        env: empty_env(),
    }));
    let (_, portability) = hash_value_with_portability(&closure, &symbols);
    assert_eq!(portability, Portability::NonPortablePointer);
}

#[test]
fn current_position_markers_are_session_local() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = Arc::new(Expr::CurPos { id: ids.next() });
    let (first, portability) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(portability, Portability::NonPortableSessionLocal);
    let (second, _) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(first, second);

    // Two distinct markers are distinct positions.
    let other = Arc::new(Expr::CurPos { id: ids.next() });
    let (third, _) = hash_expr_with_portability(&other, &symbols);
    assert_ne!(first, third);
}

#[test]
fn external_values_taint_their_containers() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let value = attrs_value(vec![(a, Value::External(Arc::new(Opaque)))]);
    let (_, portability) = hash_value_with_portability(&value, &symbols);
    assert_eq!(portability, Portability::NonPortablePointer);
}

#[test]
fn missing_paths_fall_back_to_the_raw_path_tier() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = Arc::new(Expr::Path {
        id: ids.next(),
        path: PathBuf::from("/definitely/not/here/umbra-missing"),
        accessor: None,
    });
    let (first, portability) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(portability, Portability::NonPortableRawPath);
    let (second, _) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(first, second);
}

#[test]
fn accessor_fingerprints_make_paths_portable_without_io() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let accessor = SourceAccessor {
        // The root does not exist; the accessor tier never touches the
        // filesystem.
        root: PathBuf::from("/no/such/source/root"),
        fingerprint: Some(vec![0xab; 32]),
    };
    let expr = Arc::new(Expr::Path {
        id: ids.next(),
        path: PathBuf::from("lib/default.u"),
        accessor: Some(accessor),
    });
    let (first, portability) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(portability, Portability::Portable);
    let (second, _) = hash_expr_with_portability(&expr, &symbols);
    assert_eq!(first, second);
}

#[test]
fn file_paths_hash_by_content() {
    let symbols = SymbolTable::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let first_path = dir.path().join("a.txt");
    let second_path = dir.path().join("b.txt");
    let third_path = dir.path().join("c.txt");
    std::fs::write(&first_path, b"same bytes").expect("write");
    std::fs::write(&second_path, b"same bytes").expect("write");
    std::fs::write(&third_path, b"other bytes").expect("write");

    let mut ids = IdGen::default();
    let mut path_expr = |path: &std::path::Path| {
        Arc::new(Expr::Path {
            id: ids.next(),
            path: path.to_path_buf(),
            accessor: None,
        })
    };
    let first = path_expr(&first_path);
    let second = path_expr(&second_path);
    let third = path_expr(&third_path);

    let (first_hash, portability) = hash_expr_with_portability(&first, &symbols);
    assert_eq!(portability, Portability::Portable);
    let (second_hash, _) = hash_expr_with_portability(&second, &symbols);
    let (third_hash, _) = hash_expr_with_portability(&third, &symbols);
    assert_eq!(first_hash, second_hash);
    assert_ne!(first_hash, third_hash);
}

#[test]
fn directory_paths_hash_their_sorted_contents() {
    let symbols = SymbolTable::new();
    let build_tree = |contents: &[u8]| {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub/inner.txt"), contents).expect("write");
        std::fs::write(dir.path().join("top.txt"), b"top").expect("write");
        dir
    };
    let first_dir = build_tree(b"inner");
    let second_dir = build_tree(b"inner");
    let third_dir = build_tree(b"changed");

    let mut ids = IdGen::default();
    let mut hash_dir = |dir: &tempfile::TempDir| {
        let expr = Arc::new(Expr::Path {
            id: ids.next(),
            path: dir.path().to_path_buf(),
            accessor: None,
        });
        hash_expr_with_portability(&expr, &symbols)
    };
    let (first, portability) = hash_dir(&first_dir);
    assert_eq!(portability, Portability::Portable);
    let (second, _) = hash_dir(&second_dir);
    let (third, _) = hash_dir(&third_dir);
    assert_eq!(first, second);
    assert_ne!(first, third);
}

#[test]
fn strict_hashing_rejects_unforced_kinds() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let mut ids = IdGen::default();

    let closure = Value::Closure(Arc::new(ClosureValue {
        lambda: identity_lambda(&mut ids, x),
        env: empty_env(),
    }));
    assert_eq!(
        try_hash_value_strict(&closure, &symbols),
        Err(HashError::UnsupportedKind("closure"))
    );

    let pending = Value::Thunk(Arc::new(ThunkValue::new(int(&mut ids, 1), empty_env())));
    assert_eq!(
        try_hash_value_strict(&pending, &symbols),
        Err(HashError::UnsupportedKind("thunk"))
    );

    let forced = Arc::new(ThunkValue::new(int(&mut ids, 1), empty_env()));
    forced.resolve(Value::Int(1));
    let strict = try_hash_value_strict(&Value::Thunk(forced), &symbols).expect("forced thunk");
    assert_eq!(strict, hash_value(&Value::Int(1), &symbols, None));
}

#[test]
fn forced_thunks_hash_as_their_results() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let thunk = Arc::new(ThunkValue::new(int(&mut ids, 9), empty_env()));
    thunk.resolve(Value::Int(9));
    assert_eq!(
        hash_value(&Value::Thunk(thunk), &symbols, None),
        hash_value(&Value::Int(9), &symbols, None)
    );
}

#[test]
fn unforced_thunks_hash_by_identity() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = int(&mut ids, 9);
    let env = empty_env();
    let first = Value::Thunk(Arc::new(ThunkValue::new(expr.clone(), env.clone())));
    let same_pair = Value::Thunk(Arc::new(ThunkValue::new(expr, env)));
    assert_eq!(
        hash_value(&first, &symbols, None),
        hash_value(&same_pair, &symbols, None)
    );

    let mut ids = IdGen::default();
    let other = Value::Thunk(Arc::new(ThunkValue::new(int(&mut ids, 9), empty_env())));
    assert_ne!(
        hash_value(&first, &symbols, None),
        hash_value(&other, &symbols, None)
    );

    let (_, portability) = hash_value_with_portability(&first, &symbols);
    assert_eq!(portability, Portability::NonPortablePointer);
}

#[test]
fn cheap_hashing_forces_only_literal_thunks() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let mut ids = IdGen::default();
    let mut forcer = LiteralForcer;

    let thunk = Value::Thunk(Arc::new(ThunkValue::new(int(&mut ids, 7), empty_env())));
    let cheap = hash_value_if_cheap(&thunk, &symbols, &mut forcer).expect("literal thunk");
    assert_eq!(cheap, hash_value(&Value::Int(7), &symbols, None));

    let var = var_lexical(&mut ids, x, 0, 0);
    let expensive = Value::Thunk(Arc::new(ThunkValue::new(var, empty_env())));
    assert!(hash_value_if_cheap(&expensive, &symbols, &mut forcer).is_none());
}

#[test]
fn cheap_hashing_sees_through_resolved_thunks() {
    let symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let mut forcer = LiteralForcer;

    let thunk = Arc::new(ThunkValue::new(int(&mut ids, 3), empty_env()));
    thunk.resolve(Value::Int(3));
    let wrapped = list_value(vec![Value::Thunk(thunk)]);
    let plain = list_value(vec![Value::Int(3)]);
    let cheap = hash_value_if_cheap(&wrapped, &symbols, &mut forcer).expect("resolved thunk");
    assert_eq!(cheap, hash_value(&plain, &symbols, None));
}

#[test]
fn cheap_hashing_refuses_functions_and_externals() {
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let mut ids = IdGen::default();
    let mut forcer = LiteralForcer;

    let closure = Value::Closure(Arc::new(ClosureValue {
        lambda: identity_lambda(&mut ids, x),
        env: empty_env(),
    }));
    assert!(hash_value_if_cheap(&closure, &symbols, &mut forcer).is_none());
    assert!(
        hash_value_if_cheap(&Value::External(Arc::new(Opaque)), &symbols, &mut forcer).is_none()
    );
}

#[test]
fn cheap_hashing_enforces_the_ceilings() {
    let symbols = SymbolTable::new();
    let mut forcer = LiteralForcer;

    let wide = list_value((0..=MAX_CHEAP_ARITY as i64).map(Value::Int).collect());
    assert!(hash_value_if_cheap(&wide, &symbols, &mut forcer).is_none());

    let mut nested = Value::Int(0);
    for _ in 0..=MAX_CHEAP_DEPTH {
        nested = list_value(vec![nested]);
    }
    assert!(hash_value_if_cheap(&nested, &symbols, &mut forcer).is_none());

    let shallow = list_value(vec![list_value(vec![Value::Int(1)])]);
    let cheap = hash_value_if_cheap(&shallow, &symbols, &mut forcer).expect("shallow list");
    assert_eq!(cheap, hash_value(&shallow, &symbols, None));
}

#[test]
fn back_refs_and_placeholders_are_fixed_points() {
    assert_ne!(Fingerprint::back_ref(0), Fingerprint::back_ref(1));
    assert_eq!(Fingerprint::back_ref(3), Fingerprint::back_ref(3));
    assert_eq!(Fingerprint::placeholder(), Fingerprint::placeholder());

    let a = Fingerprint::of_str("a");
    let b = Fingerprint::of_str("b");
    assert_ne!(
        Fingerprint::combine(&[a, b]),
        Fingerprint::combine(&[b, a])
    );
}

#[test]
fn lambda_formals_hash_by_shape_not_name() {
    let mut symbols = SymbolTable::new();
    let a = symbols.intern("a");
    let b = symbols.intern("b");
    let x = symbols.intern("x");
    let y = symbols.intern("y");
    let mut ids = IdGen::default();

    let mut make = |first: Symbol, second: Symbol, default_on_second: bool, ellipsis: bool| {
        let default = if default_on_second {
            Some(int(&mut ids, 1))
        } else {
            None
        };
        Arc::new(Expr::Lambda {
            id: ids.next(),
            arg: None,
            formals: Some(Formals {
                ellipsis,
                entries: vec![
                    Formal {
                        name: first,
                        default: None,
                    },
                    Formal {
                        name: second,
                        default,
                    },
                ],
            }),
            body: int(&mut ids, 0),
        })
    };

    // Same shape under different names: equal.
    let ab = make(a, b, true, false);
    let xy = make(x, y, true, false);
    assert_eq!(
        hash_expr(&ab, &symbols, None),
        hash_expr(&xy, &symbols, None)
    );

    // Dropping the default changes the shape.
    let no_default = make(a, b, false, false);
    assert_ne!(
        hash_expr(&ab, &symbols, None),
        hash_expr(&no_default, &symbols, None)
    );

    // So does an ellipsis.
    let open = make(a, b, true, true);
    assert_ne!(
        hash_expr(&ab, &symbols, None),
        hash_expr(&open, &symbols, None)
    );
}
