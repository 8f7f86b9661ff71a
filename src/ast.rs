//! The narrow slice of a fully type-checked C AST this crate consumes.
//!
//! The lexer, preprocessor, parser, and semantic analysis front-end are out
//! of scope (see the crate-level docs); this module is the read-only
//! boundary their output crosses. It is not a parser and never constructs
//! these values from source text itself — a real front-end would hand them
//! in already type-checked.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A C type, reduced to what layout and code generation need to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    /// Integer type: byte width (1, 2, 4, 8) and signedness.
    Int { width: u32, signed: bool },
    Float,
    Double,
    Pointer(Rc<Type>),
    Array { elem: Rc<Type>, len: Option<usize> },
    Struct(Rc<StructType>),
    Union(Rc<StructType>),
    Function(Rc<FunctionType>),
}

impl Type {
    pub fn size(&self) -> usize {
        match self {
            Type::Void => 0,
            Type::Bool => 1,
            Type::Int { width, .. } => *width as usize,
            Type::Float => 4,
            Type::Double => 8,
            Type::Pointer(_) => 8,
            Type::Array { elem, len } => elem.size() * len.unwrap_or(0),
            Type::Struct(s) | Type::Union(s) => s.size,
            Type::Function(_) => 0,
        }
    }

    pub fn align(&self) -> usize {
        match self {
            Type::Struct(s) | Type::Union(s) => s.align,
            Type::Array { elem, .. } => elem.align(),
            other => other.size().max(1),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Int { signed: false, .. } | Type::Bool | Type::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(t) => Some(t),
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }
}

/// A bitfield occupies `width` bits starting at bit `offset` within the
/// storage unit that begins at `unit_offset` bytes into the struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitfieldInfo {
    pub unit_offset: usize,
    pub unit_size: usize,
    pub bit_offset: u32,
    pub width: u32,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
    pub bitfield: Option<BitfieldInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub name: Option<String>,
    pub members: Vec<Member>,
    pub size: usize,
    pub align: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// Storage class of a top-level or local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Global,
    Static,
    Extern,
    Local,
    Param,
}

/// A compile-time-constant initializer tree, as produced by semantic
/// analysis. Recursive to mirror array/struct initializers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    Int(i64),
    Float(f64),
    /// Address of `symbol` plus a byte offset (e.g. `&global.field`).
    SymbolOffset { symbol: String, offset: i64 },
    Str(String),
    List(Vec<(usize, Initializer)>),
    /// An initializer the front-end could not fold to a constant; this is
    /// reported and treated as zero by the data emitter.
    NonConstant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
    pub storage: StorageClass,
    /// `const`-qualified at file scope: a defined, non-zero initializer
    /// is placed in `.rodata` instead of `.data` (spec.md §8 scenario 2).
    #[serde(default)]
    pub is_const: bool,
    pub initializer: Option<Initializer>,
    /// Frame offset once assigned locals get one during lowering (negative
    /// = below FP). `None` for anything not yet placed on a frame.
    pub frame_offset: Option<i32>,
    /// For a static local, the unique mangled global symbol it is renamed
    /// to before emission.
    pub mangled_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod,
    BitAnd, BitOr, BitXor, Shl, Shr,
    Eq, Ne, Lt, Le, Gt, Ge,
    LogAnd, LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg, BitNot, LogNot, AddrOf, Deref,
    PreInc, PreDec, PostInc, PostDec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i64, Type),
    FloatLit(f64, Type),
    StrLit(String),
    Variable(Rc<VarInfo>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    CompoundAssign(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Cast(Type, Box<Expr>),
    Member { base: Box<Expr>, member: usize, arrow: bool },
    Index(Box<Expr>, Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr>, ty: Rc<FunctionType> },
    Comma(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntLit(_, t) | Expr::FloatLit(_, t) => t.clone(),
            Expr::StrLit(_) => Type::Pointer(Rc::new(Type::Int { width: 1, signed: true })),
            Expr::Variable(v) => v.ty.clone(),
            Expr::Unary(UnOp::AddrOf, e) => Type::Pointer(Rc::new(e.ty())),
            Expr::Unary(UnOp::Deref, e) => e.ty().pointee().cloned().unwrap_or(Type::Void),
            Expr::Unary(_, e) => e.ty(),
            Expr::Binary(op, l, _) if matches!(op, BinOp::Eq|BinOp::Ne|BinOp::Lt|BinOp::Le|BinOp::Gt|BinOp::Ge|BinOp::LogAnd|BinOp::LogOr) => {
                let _ = l;
                Type::Int { width: 4, signed: true }
            }
            Expr::Binary(_, l, _) => l.ty(),
            Expr::Assign(l, _) | Expr::CompoundAssign(_, l, _) => l.ty(),
            Expr::Ternary(_, a, _) => a.ty(),
            Expr::Cast(t, _) => t.clone(),
            Expr::Member { .. } => Type::Void, // resolved against struct layout at lowering time
            Expr::Index(b, _) => b.ty().pointee().cloned().unwrap_or(Type::Void),
            Expr::Call { ty, .. } => ty.ret.clone(),
            Expr::Comma(_, r) => r.ty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
    Switch { cond: Expr, cases: Vec<(Option<i64>, usize)>, body: Box<Stmt> },
    Return(Option<Expr>),
    Break,
    Continue,
    Goto(String),
    Label(String, Box<Stmt>),
    /// An opaque inline-assembly string, passed through verbatim.
    Asm(String),
    VarDecl(Rc<VarInfo>, Option<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ty: Rc<FunctionType>,
    pub params: Vec<Rc<VarInfo>>,
    pub body: Stmt,
    pub is_static: bool,
}

/// A top-level declaration, as produced by the front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TopLevel {
    Function(Rc<Function>),
    Variable(Rc<VarInfo>),
    /// A file-scope inline-assembly string.
    Asm(String),
}

/// The global scope: an insertion-ordered name -> variable-info mapping, as
/// described in the external interfaces section. Insertion order is
/// preserved (not a `HashMap`) so symbol traversal stays deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalScope {
    order: Vec<String>,
    vars: std::collections::HashMap<String, Rc<VarInfo>>,
}

impl GlobalScope {
    pub fn insert(&mut self, var: Rc<VarInfo>) {
        if !self.vars.contains_key(&var.name) {
            self.order.push(var.name.clone());
        }
        self.vars.insert(var.name.clone(), var);
    }

    pub fn get(&self, name: &str) -> Option<&Rc<VarInfo>> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<VarInfo>> {
        self.order.iter().map(move |n| &self.vars[n])
    }
}
