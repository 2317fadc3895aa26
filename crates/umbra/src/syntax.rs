use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::symbols::Symbol;

/// Provenance of a path literal. When the accessor carries a content
/// fingerprint for its root, paths under it can be hashed portably without
/// touching the filesystem.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceAccessor {
    pub root: PathBuf,
    /// Content fingerprint of the whole accessor root, if one is known.
    pub fingerprint: Option<Vec<u8>>,
}

/// How a variable reference was resolved.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub enum VarBinding {
    /// Ordinary let/lambda scoping: the binding is identified purely by its
    /// position in the static scope chain.
    Lexical { level: u32, offset: u32 },
    /// Resolution through a dynamic-scope construct. The spelled-out name
    /// stays semantically significant here.
    Dynamic { with_level: u32 },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Implies,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    Concat,
    Update,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttrDef {
    pub name: Symbol,
    pub value: Arc<Expr>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LetBinding {
    pub name: Symbol,
    pub value: Arc<Expr>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Formal {
    pub name: Symbol,
    pub default: Option<Arc<Expr>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Formals {
    pub ellipsis: bool,
    pub entries: Vec<Formal>,
}

/// An immutable AST node. Once constructed a node and its children are never
/// mutated, which is what licenses keying hash caches on node identity.
///
/// `id` is a per-process counter allocated by [`IdGen`]; it never participates
/// in content hashing except through the `CurPos` rule, where being
/// process-local is the point.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind")]
pub enum Expr {
    Int {
        id: u32,
        value: i64,
    },
    Float {
        id: u32,
        value: f64,
    },
    Str {
        id: u32,
        text: String,
    },
    Path {
        id: u32,
        path: PathBuf,
        accessor: Option<SourceAccessor>,
    },
    Var {
        id: u32,
        name: Symbol,
        binding: VarBinding,
    },
    Select {
        id: u32,
        base: Arc<Expr>,
        path: Vec<Symbol>,
        default: Option<Arc<Expr>>,
    },
    HasAttr {
        id: u32,
        base: Arc<Expr>,
        path: Vec<Symbol>,
    },
    Attrs {
        id: u32,
        recursive: bool,
        entries: Vec<AttrDef>,
    },
    List {
        id: u32,
        items: Vec<Arc<Expr>>,
    },
    Lambda {
        id: u32,
        /// Positional argument name, if any. Never hashed.
        arg: Option<Symbol>,
        formals: Option<Formals>,
        body: Arc<Expr>,
    },
    Call {
        id: u32,
        func: Arc<Expr>,
        args: Vec<Arc<Expr>>,
    },
    Let {
        id: u32,
        bindings: Vec<LetBinding>,
        body: Arc<Expr>,
    },
    If {
        id: u32,
        cond: Arc<Expr>,
        then_branch: Arc<Expr>,
        else_branch: Arc<Expr>,
    },
    Assert {
        id: u32,
        cond: Arc<Expr>,
        body: Arc<Expr>,
    },
    With {
        id: u32,
        scope: Arc<Expr>,
        body: Arc<Expr>,
    },
    Unary {
        id: u32,
        op: UnaryOp,
        expr: Arc<Expr>,
    },
    Binary {
        id: u32,
        op: BinaryOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    ConcatStrings {
        id: u32,
        parts: Vec<Arc<Expr>>,
    },
    /// "Current source position" marker.
    CurPos {
        id: u32,
    },
    /// Marker for already-detected infinite recursion.
    BlackHole {
        id: u32,
    },
}

impl Expr {
    pub fn id(&self) -> u32 {
        match self {
            Expr::Int { id, .. }
            | Expr::Float { id, .. }
            | Expr::Str { id, .. }
            | Expr::Path { id, .. }
            | Expr::Var { id, .. }
            | Expr::Select { id, .. }
            | Expr::HasAttr { id, .. }
            | Expr::Attrs { id, .. }
            | Expr::List { id, .. }
            | Expr::Lambda { id, .. }
            | Expr::Call { id, .. }
            | Expr::Let { id, .. }
            | Expr::If { id, .. }
            | Expr::Assert { id, .. }
            | Expr::With { id, .. }
            | Expr::Unary { id, .. }
            | Expr::Binary { id, .. }
            | Expr::ConcatStrings { id, .. }
            | Expr::CurPos { id }
            | Expr::BlackHole { id } => *id,
        }
    }
}

#[derive(Debug, Default)]
pub struct IdGen {
    next: u32,
}

impl IdGen {
    pub fn next(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}
