//! The node model of the compiler's intermediate AST.
//!
//! A [Node] is one vertex of the tree: a stable [NodeId], [Meta] carrying the
//! source location and documentation, a closed [NodeKind] sum holding the
//! scalar payload, and the owned children. Structural children always live in
//! [Node::children] and are addressed by well-known per-variant indices, so
//! visitors, structural equality, and the resolver's replace-in-place
//! rewrites work uniformly across all variants.
//!
//! Variant child layouts:
//!
//! | Variant | Children |
//! |---------|----------|
//! | `Decl::Module` | declarations |
//! | `Decl::Unit` | unit items |
//! | `Decl::Function` | `[body]` |
//! | `Decl::Global` / `Decl::Local` | `[init?]` |
//! | `Item::Field` (literal) | ctor, then attribute nodes |
//! | `Item::Field` (alternatives) | ctors, then attribute nodes |
//! | `Item::Field` (typed) | attribute nodes |
//! | `Item::Variable` | `[default?]` |
//! | `Item::Switch` | `[discriminant?]`, then `SwitchCase` nodes |
//! | `Item::SwitchCase` | label expressions, then items |
//! | `Item::Hook` | `[body]` |
//! | `Item::Property` / `Item::Attr` | `[value?]` |
//! | `Expr::Ctor` | `[ctor]` |
//! | `Expr::Member` | `[base]` |
//! | `Expr::*Operator` | operands |
//! | `Expr::Coerced` / `Expr::PendingCoerced` | `[inner]` |
//! | `Stmt::Block` | statements |
//! | `Stmt::If` | `[cond, then, else?]` |
//! | ctor containers | element ctors |
mod node;
mod visitor;

pub use node::ctor_value_type;
pub(crate) use node::escape_bytes;
pub use visitor::{dispatch_post, dispatch_pre, walk_post, walk_post_mut, walk_pre, walk_pre_mut, Dispatcher};

use crate::operators::Operator;
use crate::types::QualifiedType;
use crate::{Meta, NodeId};

#[derive(Debug, Clone, PartialEq)]
/// One vertex of the AST.
pub struct Node {
    pub(crate) id: NodeId,
    pub meta: Meta,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
/// Closed sum over the orthogonal node categories.
pub enum NodeKind {
    Decl(Declaration),
    Expr(Expression),
    Stmt(Statement),
    Ctor(Ctor),
    Item(Item),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Module {
        id: String,
    },
    Import {
        module: String,
        alias: Option<String>,
    },
    TypeAlias {
        id: String,
        ty: QualifiedType,
    },
    Enum {
        id: String,
        labels: Vec<(String, i64)>,
    },
    Unit {
        id: String,
        params: Vec<(String, QualifiedType)>,
    },
    Function {
        id: String,
        params: Vec<(String, QualifiedType)>,
        result: QualifiedType,
    },
    Global {
        id: String,
        ty: QualifiedType,
    },
    Local {
        id: String,
        ty: QualifiedType,
    },
}

impl Declaration {
    /// The declared identifier, unqualified.
    pub fn id(&self) -> &str {
        match self {
            Declaration::Module { id }
            | Declaration::TypeAlias { id, .. }
            | Declaration::Enum { id, .. }
            | Declaration::Unit { id, .. }
            | Declaration::Function { id, .. }
            | Declaration::Global { id, .. }
            | Declaration::Local { id, .. } => id,
            Declaration::Import { module, alias } => alias.as_deref().unwrap_or(module),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// An expression node payload: the variant plus the expression's computed
/// type. The type starts as `auto` and is narrowed by the resolver.
pub struct Expression {
    pub kind: ExprKind,
    pub ty: QualifiedType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// An identifier; `resolved` holds the fully qualified target once the
    /// resolver has bound it.
    Name {
        id: String,
        resolved: Option<String>,
    },
    /// `self` inside a unit hook or attribute expression.
    SelfRef,
    /// `$$`, the current value inside hooks and per-element attributes.
    Dollar,
    /// A literal; child 0 is the ctor node.
    Ctor,
    /// Member access; child 0 is the base expression.
    Member { id: String },
    /// An operator use not yet matched against the registry.
    UnresolvedOperator { op: Operator },
    /// An operator bound to a registry signature.
    Operator { op: Operator, signature: usize },
    /// Child 0 coerced to `ty`.
    Coerced,
    /// Like `Coerced`, but the target type is still being inferred.
    PendingCoerced,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block,
    Expr,
    /// Children: `[target, value]`.
    Assign,
    If {
        has_else: bool,
    },
    Return {
        has_value: bool,
    },
    Print,
    Stop,
    Reject,
    Confirm,
}

#[derive(Debug, Clone, PartialEq)]
/// A literal constructor.
pub enum Ctor {
    Bool(bool),
    UInt { width: u8, value: u64 },
    SInt { width: u8, value: i64 },
    Real(f64),
    Bytes(Vec<u8>),
    Str(String),
    Regexp(String),
    Null,
    Bitfield { width: u8, bits: Vec<BitRange> },
    /// Children: element ctors.
    Vector,
    List,
    Tuple,
    Optional { has_value: bool },
}

#[derive(Debug, Clone, PartialEq)]
/// One named range of a bitfield, with an optional expected value that makes
/// the range participate in literal matching.
pub struct BitRange {
    pub id: String,
    pub low: u8,
    pub high: u8,
    pub value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
/// One sequential element of a unit declaration.
pub enum Item {
    Field {
        id: Option<String>,
        form: FieldForm,
        skip: bool,
    },
    Variable {
        id: String,
        ty: QualifiedType,
    },
    Sink {
        id: String,
        policy: SinkPolicy,
        auto_trim: bool,
    },
    Switch {
        has_discriminant: bool,
    },
    SwitchCase {
        is_default: bool,
        labels: usize,
    },
    Hook {
        kind: HookKind,
        priority: i64,
    },
    Property {
        id: String,
    },
    Attr {
        kind: AttrKind,
    },
    /// Placeholder replaced by `Field`/`Switch`/`Sink` during resolution,
    /// once the declared type (if any) has been bound.
    UnresolvedField {
        id: Option<String>,
        ty: Option<QualifiedType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
/// What a field is matched against.
pub enum FieldForm {
    /// A declared type; the byte shape comes from the type's built-in parser.
    Typed(QualifiedType),
    /// A single literal ctor (child 0).
    Literal,
    /// Two or more literal alternatives selected by look-ahead (leading
    /// ctor children).
    Alternatives,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Size,
    Eod,
    Until,
    Chunked,
    Convert,
    Count,
    ParseFrom,
    Requires,
    Default,
}

impl AttrKind {
    pub fn name(&self) -> &'static str {
        match self {
            AttrKind::Size => "&size",
            AttrKind::Eod => "&eod",
            AttrKind::Until => "&until",
            AttrKind::Chunked => "&chunked",
            AttrKind::Convert => "&convert",
            AttrKind::Count => "&count",
            AttrKind::ParseFrom => "&parse-from",
            AttrKind::Requires => "&requires",
            AttrKind::Default => "&default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Delivery policy of a sink when overlapping chunks arrive.
pub enum SinkPolicy {
    First,
    Last,
    Sequential,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The lifecycle event a hook is attached to.
pub enum HookKind {
    Init,
    Done,
    Error,
    Field(String),
    ForEach(String),
}

impl HookKind {
    pub fn label(&self) -> String {
        match self {
            HookKind::Init => "%init".into(),
            HookKind::Done => "%done".into(),
            HookKind::Error => "%error".into(),
            HookKind::Field(id) => format!("field({})", id),
            HookKind::ForEach(id) => format!("foreach({})", id),
        }
    }
}

/// Unit property identifiers the kernel interprets.
pub mod property {
    pub const BYTE_ORDER: &str = "%byte-order";
    pub const RANDOM_ACCESS: &str = "%random-access";
    pub const SYNCHRONIZE_AT: &str = "%synchronize-at";
    pub const MIME_TYPE: &str = "%mime-type";
    pub const DESCRIPTION: &str = "%description";
    pub const CONTEXT: &str = "%context";
}
