// AST node types for Arc .arc source files.
//
// Every construct is a sum type dispatched by exhaustive `match`. Every node
// carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete Arc program: an ordered list of top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Function(FunctionDecl),
    Sequence(SequenceDecl),
    Constant(GlobalConst),
    Flow(FlowStmt),
}

// ── Identifiers ──

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Types ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    TimeStamp,
    TimeSpan,
}

impl PrimType {
    pub fn name(self) -> &'static str {
        match self {
            PrimType::I8 => "i8",
            PrimType::I16 => "i16",
            PrimType::I32 => "i32",
            PrimType::I64 => "i64",
            PrimType::U8 => "u8",
            PrimType::U16 => "u16",
            PrimType::U32 => "u32",
            PrimType::U64 => "u64",
            PrimType::F32 => "f32",
            PrimType::F64 => "f64",
            PrimType::Str => "str",
            PrimType::TimeStamp => "timestamp",
            PrimType::TimeSpan => "timespan",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimType::Str | PrimType::TimeStamp | PrimType::TimeSpan)
    }
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction marker on a channel type (`<-chan T`, `->chan T`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// Primitive type with an optional unit (`f64 m`).
    Prim(PrimType, Option<Ident>),
    Chan(Box<TypeExpr>, ChanDir),
    Series(Box<TypeExpr>),
}

// ── Functions ──

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub config: Vec<Param>,
    pub inputs: Vec<InputParam>,
    pub outputs: Outputs,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputParam {
    pub name: Ident,
    pub ty: TypeExpr,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outputs {
    None,
    Single(TypeExpr),
    Named(Vec<Param>),
}

// ── Sequences ──

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDecl {
    pub name: Ident,
    pub stages: Vec<StageDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageDecl {
    pub name: Ident,
    pub items: Vec<StageItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageItem {
    Flow(FlowStmt),
    /// A bare invocation with no edges.
    Single(FlowNode),
}

// ── Global constants ──

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConst {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
}

// ── Flow statements ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOp {
    /// `->`
    Continuous,
    /// `=>`
    OneShot,
}

impl fmt::Display for FlowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowOp::Continuous => f.write_str("->"),
            FlowOp::OneShot => f.write_str("=>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowStmt {
    pub first: FlowElem,
    pub chain: Vec<FlowLink>,
    pub span: Span,
}

impl FlowStmt {
    /// Elements in source order, each paired with the operator before it.
    pub fn elements(&self) -> impl Iterator<Item = (Option<FlowOp>, &FlowElem)> {
        std::iter::once((None, &self.first))
            .chain(self.chain.iter().map(|l| (Some(l.op), &l.elem)))
    }

    pub fn len(&self) -> usize {
        self.chain.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowLink {
    pub op: FlowOp,
    pub elem: FlowElem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowElem {
    Node(FlowNode),
    Table(RoutingTable),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    pub entries: Vec<RoutingEntry>,
    pub span: Span,
}

/// `label: node -> node ... : param`
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingEntry {
    pub label: Ident,
    pub nodes: Vec<FlowNode>,
    pub param: Option<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowNode {
    Next(Span),
    Call(FuncCall),
    /// Any expression; a bare identifier is `ExprKind::Ident`.
    Expr(Expr),
}

impl FlowNode {
    pub fn span(&self) -> Span {
        match self {
            FlowNode::Next(span) => *span,
            FlowNode::Call(call) => call.span,
            FlowNode::Expr(expr) => expr.span,
        }
    }

    /// The identifier, if this node is a bare name.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            FlowNode::Expr(Expr {
                kind: ExprKind::Ident(name),
                ..
            }) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: Ident,
    pub config: ConfigValues,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValues {
    Named(Vec<(Ident, Expr)>),
    Anonymous(Vec<Expr>),
}

impl ConfigValues {
    pub fn is_empty(&self) -> bool {
        match self {
            ConfigValues::Named(v) => v.is_empty(),
            ConfigValues::Anonymous(v) => v.is_empty(),
        }
    }
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `x := e`, `x T := e`, `x $= e`, `x T $= e`
    VarDecl {
        name: Ident,
        ty: Option<TypeExpr>,
        value: Expr,
        stateful: bool,
    },
    /// `x := <-ch`
    ChannelRead { name: Ident, channel: Ident },
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
    },
    /// `e -> ch`
    ChannelWrite { value: Expr, channel: Ident },
    If {
        cond: Expr,
        then: Block,
        else_ifs: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    Return(Option<Expr>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub name: Ident,
    pub index: Option<Index>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Expr),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// The arithmetic operator of a compound assignment.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Set => f.write_str("="),
            AssignOp::Add => f.write_str("+="),
            AssignOp::Sub => f.write_str("-="),
            AssignOp::Mul => f.write_str("*="),
            AssignOp::Div => f.write_str("/="),
            AssignOp::Mod => f.write_str("%="),
        }
    }
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call { callee: Ident, args: Vec<Expr> },
    /// `T(e)`
    Cast { ty: TypeExpr, value: Box<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `[a, b, c]`
    Series(Vec<Expr>),
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    /// True if the tree contains only literals and operators.
    pub fn is_pure_literal(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) => true,
            ExprKind::Unary(_, e) => e.is_pure_literal(),
            ExprKind::Binary(_, l, r) => l.is_pure_literal() && r.is_pure_literal(),
            _ => false,
        }
    }

    /// An integer literal, optionally negated.
    pub fn as_integer_literal(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(Literal::Int(v)) => i64::try_from(*v).ok(),
            ExprKind::Unary(UnaryOp::Neg, inner) => inner.as_integer_literal().map(|v| -v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(u64),
    Float(f64),
    Unit { value: f64, integral: bool, unit: String },
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Unit { value, unit, .. } => write!(f, "{value}{unit}"),
            Literal::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::Or | BinOp::And)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
