//! Grammars of productions, built from resolved unit declarations.
//!
//! A [Grammar] is a root symbol plus a symbol table in which every
//! production is one entry; composite productions hold the [Symbol]s of
//! their children and [Reference](ProductionKind::Reference) aliases an
//! existing entry, so recursion and sharing never create owning cycles.
//! Construction ([builder]) lowers unit items to productions, analysis
//! ([analysis]) computes the nullable/FIRST/FOLLOW fixpoint, assigns token
//! IDs to literals, fills in look-ahead sets, and rejects ambiguous
//! alternatives.
mod analysis;
mod builder;
mod production;

#[cfg(test)]
mod __tests__;

pub use analysis::analyze;
pub use builder::build_grammar;
pub use production::literal_repr;

use crate::ast::{ctor_value_type, AttrKind, Ctor, FieldForm, HookKind, Item, Node};
use crate::types::{QualifiedType, Type};
use crate::Location;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Key of one production in a grammar's symbol table.
pub struct Symbol(pub(crate) String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identity of one look-ahead token. Assigned by hashing the literal's
/// unified representation; [EOD] is reserved.
pub struct TokenId(pub u64);

/// The synthetic end-of-data marker.
pub const EOD: TokenId = TokenId(0);

#[derive(Debug, Clone)]
/// A literal known to the grammar, usable as a look-ahead token.
pub struct TokenLit {
    pub id: TokenId,
    pub repr: String,
    pub ctor: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone)]
/// Field information a value-binding production carries into code
/// generation and evaluation.
pub struct FieldRef {
    pub id: Option<String>,
    pub value_ty: QualifiedType,
    pub convert: Option<Node>,
    pub requires: Option<Node>,
}

#[derive(Debug, Clone)]
/// How a `Variable` production reads bytes.
pub enum VarShape {
    Numeric { width: u8, signed: bool },
    Bitfield { width: u8 },
    Bytes {
        size: Option<Node>,
        until: Option<Node>,
        eod: bool,
        chunked: bool,
    },
    /// No built-in parser exists; the validator rejects this before the
    /// grammar is accepted.
    Opaque,
}

#[derive(Debug, Clone)]
pub enum WhileKind {
    Until(Node),
    Eod,
    Size(Node),
}

#[derive(Debug, Clone)]
pub struct Production {
    pub symbol: Symbol,
    pub location: Option<Location>,
    pub kind: ProductionKind,
}

#[derive(Debug, Clone)]
pub enum ProductionKind {
    /// Matches the empty string.
    Epsilon,
    /// Matches a literal ctor.
    Ctor {
        ctor: Node,
        field: Option<FieldRef>,
    },
    /// Matches a whole sub-unit recognizable by type.
    TypeLiteral {
        unit: String,
        field: Option<FieldRef>,
    },
    /// Consumes bytes whose shape the type's built-in parser determines.
    Variable {
        ty: QualifiedType,
        shape: VarShape,
        field: Option<FieldRef>,
    },
    /// Alias of another table entry; supports recursion and sharing.
    Reference { to: Symbol },
    Sequence {
        elements: Vec<Symbol>,
    },
    /// Two alternatives selected by disjoint look-ahead sets.
    LookAhead {
        alt_a: Symbol,
        alt_b: Symbol,
        lahs_a: BTreeSet<TokenId>,
        lahs_b: BTreeSet<TokenId>,
    },
    /// Discriminated choice by runtime expression.
    Switch {
        expr: Node,
        cases: Vec<(Vec<Node>, Symbol)>,
        default: Option<Symbol>,
    },
    /// Repeat `body` exactly `expr` times.
    Counter {
        expr: Node,
        body: Symbol,
        field: Option<FieldRef>,
    },
    While {
        kind: WhileKind,
        body: Symbol,
        field: Option<FieldRef>,
    },
    ForEach {
        body: Symbol,
        eod_ok: bool,
        field: Option<FieldRef>,
    },
    /// Advance the stream without binding.
    Skip { bytes: Node },
    /// Root production of one unit.
    Unit { unit: String, body: Symbol },
    /// Grouping of items, e.g. one switch case.
    Block { items: Vec<Symbol> },
    /// Forward reference patched at the end of grammar construction.
    Deferred { resolved: Option<Symbol> },
}

#[derive(Debug, Clone)]
pub struct HookRef {
    pub kind: HookKind,
    pub priority: i64,
    pub body: Node,
}

#[derive(Debug, Clone, Default)]
/// Unit-level directives that survive into the grammar.
pub struct UnitProps {
    pub mime_types: Vec<String>,
    pub description: Option<String>,
    pub random_access: bool,
    pub synchronize_at: Option<Node>,
    /// Name of the per-connection context type declared with `%context`.
    pub context: Option<String>,
}

#[derive(Debug)]
pub struct Grammar {
    name: String,
    root: Symbol,
    table: BTreeMap<Symbol, Production>,
    tokens: BTreeMap<TokenId, TokenLit>,
    token_by_symbol: HashMap<Symbol, TokenId>,
    nullable: HashMap<Symbol, bool>,
    first: HashMap<Symbol, BTreeSet<TokenId>>,
    follow: HashMap<Symbol, BTreeSet<TokenId>>,
    byte_order: ByteOrder,
    props: UnitProps,
    hooks: Vec<HookRef>,
    sinks: Vec<(String, crate::ast::SinkPolicy, bool)>,
    location: Option<Location>,
}

impl Grammar {
    /// Qualified name of the unit the grammar was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Symbol {
        &self.root
    }

    /// Look up a production. A missing symbol is a programmer bug: the
    /// builder inserts every symbol it hands out.
    pub fn get(&self, symbol: &Symbol) -> &Production {
        match self.table.get(symbol) {
            Some(p) => p,
            None => crate::diagnostics::internal_error!(
                "symbol '{}' missing from grammar '{}'",
                symbol,
                self.name
            ),
        }
    }

    pub fn productions(&self) -> impl Iterator<Item = &Production> {
        self.table.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.table.keys()
    }

    pub fn is_nullable(&self, symbol: &Symbol) -> bool {
        self.nullable.get(symbol).copied().unwrap_or(false)
    }

    pub fn first(&self, symbol: &Symbol) -> BTreeSet<TokenId> {
        self.first.get(symbol).cloned().unwrap_or_default()
    }

    pub fn follow(&self, symbol: &Symbol) -> BTreeSet<TokenId> {
        self.follow.get(symbol).cloned().unwrap_or_default()
    }

    pub fn token(&self, id: TokenId) -> Option<&TokenLit> {
        self.tokens.get(&id)
    }

    pub fn token_of(&self, symbol: &Symbol) -> Option<TokenId> {
        self.token_by_symbol.get(symbol).copied()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenLit> {
        self.tokens.values()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn props(&self) -> &UnitProps {
        &self.props
    }

    pub fn hooks(&self) -> &[HookRef] {
        &self.hooks
    }

    /// Hooks for one event, ordered by descending priority.
    pub fn hooks_for(&self, kind: &HookKind) -> Vec<&HookRef> {
        let mut hooks: Vec<&HookRef> = self.hooks.iter().filter(|h| &h.kind == kind).collect();
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority));
        hooks
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn uses_look_ahead(&self) -> bool {
        self.table
            .values()
            .any(|p| matches!(p.kind, ProductionKind::LookAhead { .. }))
    }

    pub fn declares_sink(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Declared sinks as (id, policy, auto-trim).
    pub fn sinks(&self) -> &[(String, crate::ast::SinkPolicy, bool)] {
        &self.sinks
    }
}

#[derive(Debug, Default)]
/// All accepted grammars of one compilation, keyed by qualified unit name.
/// Nested-unit fields resolve their target grammar here at parse time.
pub struct GrammarSet {
    grammars: HashMap<String, Grammar>,
}

impl GrammarSet {
    pub fn insert(&mut self, grammar: Grammar) {
        self.grammars.insert(grammar.name().to_string(), grammar);
    }

    pub fn get(&self, unit: &str) -> Option<&Grammar> {
        self.grammars.get(unit)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grammar> {
        self.grammars.values()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

/// The value type a field stores after parsing, taking its attributes into
/// account: `&convert` substitutes the conversion result, `&count` and the
/// terminator attributes turn a scalar element type into a vector, and
/// literal fields store the matched bytes.
pub fn field_value_type(field_node: &Node) -> QualifiedType {
    if let Some(expr) = field_node.attr_value(AttrKind::Convert) {
        if let Some(e) = expr.as_expr() {
            return e.ty.clone();
        }
    }
    let (id_form, _skip) = match field_node.as_item() {
        Some(Item::Field { form, skip, .. }) => (form.clone(), *skip),
        _ => return QualifiedType::auto(),
    };
    match id_form {
        FieldForm::Literal | FieldForm::Alternatives => {
            match field_node.field_ctors().next() {
                Some(first) => match first.ctor() {
                    Ctor::Regexp(_) | Ctor::Bytes(_) | Ctor::Str(_) => {
                        QualifiedType::rvalue(Type::Bytes)
                    }
                    _ => QualifiedType::rvalue(ctor_value_type(first)),
                },
                None => QualifiedType::auto(),
            }
        }
        FieldForm::Typed(qt) => {
            let ty = qt.ty.clone();
            if matches!(ty, Type::Bytes) {
                return QualifiedType::rvalue(Type::Bytes);
            }
            let is_container = matches!(ty, Type::Vector(_) | Type::List(_));
            let repeated = field_node.has_attr(AttrKind::Count)
                || field_node.has_attr(AttrKind::Until)
                || field_node.has_attr(AttrKind::Eod);
            if repeated && !is_container {
                QualifiedType::rvalue(Type::Vector(Box::new(ty)))
            } else {
                QualifiedType::rvalue(ty)
            }
        }
    }
}

