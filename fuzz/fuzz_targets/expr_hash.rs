#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use umbra::{
    hash_expr, hash_expr_with_portability, AttrDef, BinaryOp, Expr, ExprHashCache, IdGen,
    LetBinding, SymbolTable, VarBinding,
};

const MAX_DEPTH: usize = 12;

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

/// Decode an arbitrary expression tree from fuzzer bytes. Exhausted input
/// degrades to integer literals, so every byte string decodes to something.
fn decode(
    bytes: &mut Bytes<'_>,
    ids: &mut IdGen,
    symbols: &mut SymbolTable,
    depth: usize,
) -> Arc<Expr> {
    if depth > MAX_DEPTH {
        return Arc::new(Expr::Int {
            id: ids.next(),
            value: 0,
        });
    }
    match bytes.next() % 9 {
        0 => Arc::new(Expr::Int {
            id: ids.next(),
            value: i64::from(bytes.next()),
        }),
        1 => Arc::new(Expr::Float {
            id: ids.next(),
            value: f64::from(bytes.next()) / 3.0,
        }),
        2 => Arc::new(Expr::Str {
            id: ids.next(),
            text: format!("s{}", bytes.next()),
        }),
        3 => {
            let name = symbols.intern(&format!("v{}", bytes.next() % 8));
            Arc::new(Expr::Var {
                id: ids.next(),
                name,
                binding: VarBinding::Lexical {
                    level: u32::from(bytes.next() % 4),
                    offset: u32::from(bytes.next() % 4),
                },
            })
        }
        4 => {
            let name = symbols.intern(&format!("w{}", bytes.next() % 8));
            Arc::new(Expr::Var {
                id: ids.next(),
                name,
                binding: VarBinding::Dynamic {
                    with_level: u32::from(bytes.next() % 4),
                },
            })
        }
        5 => {
            let left = decode(bytes, ids, symbols, depth + 1);
            let right = decode(bytes, ids, symbols, depth + 1);
            Arc::new(Expr::Binary {
                id: ids.next(),
                op: if bytes.next() % 2 == 0 {
                    BinaryOp::Add
                } else {
                    BinaryOp::Mul
                },
                left,
                right,
            })
        }
        6 => {
            let count = usize::from(bytes.next() % 4);
            let entries = (0..count)
                .map(|index| {
                    let name = symbols.intern(&format!("a{}", (bytes.next() as usize + index) % 8));
                    AttrDef {
                        name,
                        value: decode(bytes, ids, symbols, depth + 1),
                    }
                })
                .collect();
            Arc::new(Expr::Attrs {
                id: ids.next(),
                recursive: bytes.next() % 2 == 0,
                entries,
            })
        }
        7 => {
            let name = symbols.intern(&format!("l{}", bytes.next() % 8));
            let value = decode(bytes, ids, symbols, depth + 1);
            let body = decode(bytes, ids, symbols, depth + 1);
            Arc::new(Expr::Let {
                id: ids.next(),
                bindings: vec![LetBinding { name, value }],
                body,
            })
        }
        _ => {
            let arg = symbols.intern(&format!("p{}", bytes.next() % 8));
            let body = decode(bytes, ids, symbols, depth + 1);
            Arc::new(Expr::Lambda {
                id: ids.next(),
                arg: Some(arg),
                formals: None,
                body,
            })
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 16 * 1024 {
        return;
    }
    let mut symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    let expr = decode(
        &mut Bytes { data, pos: 0 },
        &mut ids,
        &mut symbols,
        0,
    );

    // Hashing must be deterministic and cache-transparent.
    let first = hash_expr(&expr, &symbols, None);
    let cache = ExprHashCache::new();
    assert_eq!(first, hash_expr(&expr, &symbols, Some(&cache)));
    assert_eq!(first, hash_expr(&expr, &symbols, Some(&cache)));

    // A second decode of the same bytes is an independent parse and must
    // agree, whatever ids the nodes got.
    let mut symbols = SymbolTable::new();
    let mut ids = IdGen::default();
    ids.next();
    let again = decode(
        &mut Bytes { data, pos: 0 },
        &mut ids,
        &mut symbols,
        0,
    );
    let (second, _) = hash_expr_with_portability(&again, &symbols);
    assert_eq!(first, second);
});
