//! The parser IR generator.
//!
//! Walks an accepted grammar and emits a tree of abstract statements and
//! expressions describing the resumable parser: field parsing, look-ahead
//! dispatch, loop control, hook invocation, error propagation, and
//! suspension points. The backend that materializes the IR into executable
//! form is an external collaborator; the contract here is that every
//! statement carries its source location and explicit sequence points.
mod generate;
mod ir;

#[cfg(test)]
mod __tests__;

pub use generate::generate;

use crate::ast::SinkPolicy;
use crate::grammar::TokenId;
use crate::runtime::RuntimeErrorKind;
use crate::Location;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
/// One generated parser: the functions for a unit plus its registration
/// record.
pub struct ParserModule {
    pub unit: String,
    pub functions: Vec<IrFunction>,
    pub registration: Registration,
}

#[derive(Debug, Clone, PartialEq)]
/// What a generated parser announces to the runtime registry at library
/// init time.
pub struct Registration {
    pub name: String,
    pub description: Option<String>,
    pub mime_types: Vec<String>,
    pub parse1: String,
    pub parse2: String,
    pub parse3: String,
    pub context_factory: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Exported functions are the registered entry shapes; their signature
    /// is frozen and the optimizer must not touch their parameters.
    pub exported: bool,
    pub body: IrStmt,
}

#[derive(Debug, Clone, PartialEq)]
/// A statement with its source location. Statements are the sequence
/// points the backend must preserve.
pub struct IrStmt {
    pub location: Option<Location>,
    pub op: IrOp,
}

impl IrStmt {
    pub fn new(op: IrOp) -> Self {
        Self { location: None, op }
    }

    pub fn at(location: Option<Location>, op: IrOp) -> Self {
        Self { location, op }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A runtime capability a generated parser may need. The generator emits
/// the capability's setup code gated on its feature; blocks gated on a
/// feature the grammar does not use are dropped by the optimizer.
pub enum Feature {
    Sinks,
    RandomAccess,
    Context,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrOp {
    Block(Vec<IrStmt>),
    Nop,
    Let {
        id: String,
        init: Option<IrExpr>,
    },
    Assign {
        target: IrExpr,
        value: IrExpr,
    },
    /// Store into a field of the unit instance, then run its field hooks.
    SetField {
        field: String,
        value: IrExpr,
    },
    If {
        cond: IrExpr,
        then_branch: Box<IrStmt>,
        else_branch: Option<Box<IrStmt>>,
    },
    Loop {
        body: Box<IrStmt>,
    },
    Break,
    /// Match a literal token at the cursor; suspends on insufficient
    /// unfrozen data, raises a parse error on final mismatch.
    MatchLiteral {
        token: String,
        dest: Option<String>,
    },
    /// Invoke the runtime's built-in reader for a primitive type.
    ReadBuiltin {
        spec: ReadSpec,
        dest: Option<String>,
    },
    /// Peek the minimum prefix needed and dispatch on the matching
    /// look-ahead set.
    PeekDispatch {
        arms: Vec<(BTreeSet<TokenId>, IrStmt)>,
        otherwise: Box<IrStmt>,
    },
    SwitchDispatch {
        discriminant: IrExpr,
        arms: Vec<(Vec<IrExpr>, IrStmt)>,
        default: Option<Box<IrStmt>>,
    },
    /// Run `body` against a sub-view restricted to the next `bytes` bytes.
    LimitView {
        bytes: IrExpr,
        body: Box<IrStmt>,
    },
    Advance {
        bytes: IrExpr,
    },
    /// Suspension primitive: park until `bytes` more bytes are available
    /// or the stream freezes.
    WaitFor {
        bytes: IrExpr,
    },
    /// Opaque synchronization marker; not part of look-ahead analysis.
    Synchronize,
    /// Keep already-consumed input addressable so generated code may seek
    /// backwards; emitted for `%random-access` units.
    RetainInput,
    /// Call into the generated parser of a nested unit.
    CallParser {
        unit: String,
        dest: Option<String>,
    },
    /// Tail call into another production's emitted function.
    TailCall {
        function: String,
    },
    /// Run one hook of an event's dispatch block. Blocks are emitted in
    /// descending priority order. `context` names the local holding the
    /// unit's `%context` value, forwarded to the hook when present.
    HookRun {
        function: String,
        event: String,
        priority: i64,
        context: Option<String>,
    },
    /// Append a value to a local vector accumulator.
    Append {
        target: String,
        value: IrExpr,
    },
    SinkSetup {
        sink: String,
        policy: SinkPolicy,
        auto_trim: bool,
    },
    /// Run `body`; on a raised error run `handler` (which ends by
    /// rethrowing unless it diverts).
    Attempt {
        body: Box<IrStmt>,
        handler: Box<IrStmt>,
    },
    Rethrow,
    Raise {
        error: RuntimeErrorKind,
        message: String,
    },
    Confirm,
    Stop,
    Return {
        value: Option<IrExpr>,
    },
    FeatureGated {
        feature: Feature,
        body: Box<IrStmt>,
    },
    Print(Vec<IrExpr>),
    /// Evaluate for effect.
    Eval(IrExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadSpec {
    UInt { width: u8, little_endian: bool },
    SInt { width: u8, little_endian: bool },
    Bitfield { width: u8, little_endian: bool },
    BytesFixed(IrExpr),
    BytesUntil(IrExpr),
    BytesEod { chunked: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    ConstBool(bool),
    ConstUInt(u64),
    ConstSInt(i64),
    ConstReal(f64),
    ConstBytes(Vec<u8>),
    ConstString(String),
    Local(String),
    Param(String),
    /// `self.<field>` of the unit instance under construction.
    SelfField(String),
    /// The current value `$$`.
    Dollar,
    Field {
        base: Box<IrExpr>,
        id: String,
    },
    Binary {
        op: crate::operators::Operator,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    Size(Box<IrExpr>),
    Convert {
        to: String,
        inner: Box<IrExpr>,
    },
    EnumLabel {
        name: String,
        value: i64,
    },
    /// Default-construct the unit's `%context` type.
    NewContext {
        ty: String,
    },
    AtEod,
    StreamRemaining,
}

impl IrExpr {
    pub fn is_const(&self) -> bool {
        matches!(
            self,
            IrExpr::ConstBool(_)
                | IrExpr::ConstUInt(_)
                | IrExpr::ConstSInt(_)
                | IrExpr::ConstReal(_)
                | IrExpr::ConstBytes(_)
                | IrExpr::ConstString(_)
                | IrExpr::EnumLabel { .. }
        )
    }

    /// Whether evaluation is free of side effects and runtime errors, so
    /// the statement around it may be dropped when its value is unused.
    pub fn is_pure(&self) -> bool {
        match self {
            IrExpr::Binary { op, lhs, rhs } => {
                !matches!(
                    op,
                    crate::operators::Operator::Div | crate::operators::Operator::Index
                ) && lhs.is_pure()
                    && rhs.is_pure()
            }
            IrExpr::Size(inner) | IrExpr::Convert { inner, .. } => inner.is_pure(),
            // Reading an unset field raises; the error path is observable.
            IrExpr::SelfField(_) | IrExpr::Field { .. } => false,
            _ => true,
        }
    }
}
