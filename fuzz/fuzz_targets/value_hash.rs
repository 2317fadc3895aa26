#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use umbra::{
    hash_value, hash_value_with_portability, Env, Expr, IdGen, SymbolTable, ThunkValue, Value,
    ValueHashCache,
};

const MAX_DEPTH: usize = 10;

struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    fn next(&mut self) -> u8 {
        let byte = self.data.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }
}

/// Decode an arbitrary forced-value graph from fuzzer bytes, including
/// resolved thunks that tie knots back to their containers.
fn decode(
    bytes: &mut Bytes<'_>,
    ids: &mut IdGen,
    symbols: &mut SymbolTable,
    depth: usize,
) -> Value {
    if depth > MAX_DEPTH {
        return Value::Int(0);
    }
    match bytes.next() % 8 {
        0 => Value::Int(i64::from(bytes.next())),
        1 => Value::Float(f64::from(bytes.next()) / 7.0),
        2 => Value::Bool(bytes.next() % 2 == 0),
        3 => Value::Null,
        4 => Value::Str(Arc::new(umbra::StrValue {
            text: format!("s{}", bytes.next()),
            context: (0..usize::from(bytes.next() % 3))
                .map(|index| format!("/dep/{index}"))
                .collect(),
        })),
        5 => {
            let count = usize::from(bytes.next() % 4);
            let items: im::Vector<Value> = (0..count)
                .map(|_| decode(bytes, ids, symbols, depth + 1))
                .collect();
            Value::List(Arc::new(items))
        }
        6 => {
            let count = usize::from(bytes.next() % 4);
            let entries: im::HashMap<umbra::Symbol, Value> = (0..count)
                .map(|index| {
                    let name = symbols.intern(&format!("k{}", (bytes.next() as usize + index) % 8));
                    (name, decode(bytes, ids, symbols, depth + 1))
                })
                .collect();
            Value::Attrs(Arc::new(entries))
        }
        _ => {
            // A resolved thunk, optionally made self-referential through an
            // enclosing attribute set.
            let expr = Arc::new(Expr::Int {
                id: ids.next(),
                value: 0,
            });
            let thunk = Arc::new(ThunkValue::new(expr, Arc::new(Env::new(None, 0))));
            if bytes.next() % 2 == 0 {
                let name = symbols.intern("knot");
                let attrs = Value::Attrs(Arc::new(
                    im::HashMap::new().update(name, Value::Thunk(thunk.clone())),
                ));
                thunk.resolve(attrs.clone());
                attrs
            } else {
                let inner = decode(bytes, ids, symbols, depth + 1);
                thunk.resolve(inner);
                Value::Thunk(thunk)
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 16 * 1024 {
        return;
    }
    let mut symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let value = decode(
        &mut Bytes { data, pos: 0 },
        &mut ids,
        &mut symbols,
        0,
    );

    // Must terminate on every graph, including knots, and agree with and
    // without a cache, twice over.
    let first = hash_value(&value, &symbols, None);
    let cache = ValueHashCache::new();
    assert_eq!(first, hash_value(&value, &symbols, Some(&cache)));
    assert_eq!(first, hash_value(&value, &symbols, Some(&cache)));

    // The portability variant hashes identically; it only adds the tag.
    let (tagged, _) = hash_value_with_portability(&value, &symbols);
    assert_eq!(first, tagged);
});
