//! The runtime contract generated parsers rely on, plus the reference
//! evaluator.
//!
//! [ByteStream] and [View] are the minimum stream surface: an append-only
//! byte container with a freeze flag and cursor pairs into it. [Matcher]
//! evaluates an accepted grammar directly against a stream under the same
//! per-production contract the emitted IR encodes: insufficient unfrozen
//! data suspends, final mismatches raise a parse error naming the
//! production, look-ahead dispatch peeks without consuming, and hooks fire
//! in grammar order. Resuming after a suspension re-runs from the head of
//! the stream; a completed parse is therefore independent of how the bytes
//! were chunked.

use crate::ast::{Ctor, ExprKind, HookKind, Node, NodeKind, SinkPolicy};
use crate::grammar::{
    ByteOrder, FieldRef, Grammar, GrammarSet, ProductionKind, Symbol, TokenId, VarShape,
    WhileKind, EOD,
};
use crate::operators::Operator;
use crate::scope::{DeclInfoKind, DeclTable};
use regex::bytes::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

/// Nesting depth at which the evaluator refuses further descent.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Named, catchable error categories of the runtime contract. Generated
/// code must preserve the category when propagating.
pub enum RuntimeErrorKind {
    ParseError,
    InsufficientData,
    MissingAttribute,
    AttributeNotSet,
    Overflow,
    DivisionByZero,
    NullReference,
    StackSizeExceeded,
    UnsetTupleElement,
    InvalidValue,
    BarrierAborted,
}

impl Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeErrorKind::ParseError => "parse error",
            RuntimeErrorKind::InsufficientData => "insufficient data",
            RuntimeErrorKind::MissingAttribute => "missing attribute",
            RuntimeErrorKind::AttributeNotSet => "attribute not set",
            RuntimeErrorKind::Overflow => "overflow",
            RuntimeErrorKind::DivisionByZero => "division by zero",
            RuntimeErrorKind::NullReference => "null reference",
            RuntimeErrorKind::StackSizeExceeded => "stack size exceeded",
            RuntimeErrorKind::UnsetTupleElement => "unset tuple element",
            RuntimeErrorKind::InvalidValue => "invalid value",
            RuntimeErrorKind::BarrierAborted => "barrier aborted",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub offset: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, offset: usize, message: String) -> Self {
        Self {
            kind,
            offset,
            message,
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}: {}", self.kind, self.offset, self.message)
    }
}

#[derive(Debug, Default)]
/// Append-only byte container with a freeze flag. Freezing signals EOD:
/// no further bytes will arrive.
pub struct ByteStream {
    data: Vec<u8>,
    frozen: bool,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frozen_from(data: &[u8]) -> Self {
        let mut stream = Self::new();
        stream.append(data).unwrap();
        stream.freeze();
        stream
    }

    pub fn append(&mut self, data: &[u8]) -> Result<(), RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidValue,
                self.data.len(),
                "cannot append to a frozen stream".into(),
            ));
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size_remaining(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    pub fn at_eod(&self, offset: usize) -> bool {
        self.frozen && offset >= self.data.len()
    }

    pub fn view(&self) -> View {
        View {
            begin: 0,
            end: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
/// A pair of cursors into a stream. `end` of [None] means "wherever the
/// stream currently ends".
pub struct View {
    pub begin: usize,
    pub end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt(u64),
    SInt(i64),
    Real(f64),
    Bytes(Vec<u8>),
    Str(String),
    Vector(Vec<Value>),
    Unit(UnitValue),
    Enum { name: String, value: i64 },
    Null,
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::SInt(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// A unit instance under construction or completed.
pub struct UnitValue {
    pub unit: String,
    pub fields: BTreeMap<String, Value>,
}

impl UnitValue {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Hook { unit: String, event: String },
    Confirmed,
}

#[derive(Debug)]
pub struct ParseResult {
    pub value: UnitValue,
    pub consumed: usize,
    pub trace: Vec<TraceEvent>,
}

#[derive(Debug)]
/// Outcome of feeding the currently available bytes to a parser.
pub enum Parsed {
    Complete(ParseResult),
    /// More data is needed; feed the stream and run again.
    Suspended,
}

enum Interrupt {
    Suspend,
    Fail(RuntimeError),
}

type Ev<T> = Result<T, Interrupt>;

enum Peek {
    Match,
    NoMatch,
    Insufficient,
}

/// Evaluates one unit's accepted grammar against a byte stream.
pub struct Matcher<'a> {
    set: &'a GrammarSet,
    decls: &'a DeclTable,
    grammar: &'a Grammar,
    regexes: RefCell<HashMap<String, Regex>>,
}

impl<'a> Matcher<'a> {
    pub fn new(set: &'a GrammarSet, decls: &'a DeclTable, unit: &str) -> Option<Self> {
        Some(Self {
            set,
            decls,
            grammar: set.get(unit)?,
            regexes: RefCell::new(HashMap::new()),
        })
    }

    /// Run the parser over the stream from the beginning. Returns
    /// [Parsed::Suspended] when the unfrozen stream ran out of bytes
    /// mid-match.
    pub fn run(&self, stream: &ByteStream) -> Result<Parsed, RuntimeError> {
        let mut run = Run {
            matcher: self,
            stream,
            cursor: 0,
            limit: None,
            depth: 0,
            trace: Vec::new(),
        };
        match run.unit(self.grammar) {
            Ok(value) => Ok(Parsed::Complete(ParseResult {
                value,
                consumed: run.cursor,
                trace: run.trace,
            })),
            Err(Interrupt::Suspend) => Ok(Parsed::Suspended),
            Err(Interrupt::Fail(e)) => Err(e),
        }
    }

    fn regex(&self, pattern: &str, offset: usize) -> Ev<Regex> {
        if let Some(r) = self.regexes.borrow().get(pattern) {
            return Ok(r.clone());
        }
        let compiled = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            Interrupt::Fail(RuntimeError::new(
                RuntimeErrorKind::InvalidValue,
                offset,
                format!("invalid regular expression /{}/: {}", pattern, e),
            ))
        })?;
        self.regexes
            .borrow_mut()
            .insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }
}

struct Run<'a, 'm> {
    matcher: &'m Matcher<'a>,
    stream: &'a ByteStream,
    cursor: usize,
    /// Absolute offset a `&size` bound caps reading at.
    limit: Option<usize>,
    depth: usize,
    trace: Vec<TraceEvent>,
}

impl<'a, 'm> Run<'a, 'm> {
    fn fail<T>(&self, kind: RuntimeErrorKind, message: String) -> Ev<T> {
        Err(Interrupt::Fail(RuntimeError::new(kind, self.cursor, message)))
    }

    fn available_end(&self) -> usize {
        match self.limit {
            Some(limit) => limit.min(self.stream.len()),
            None => self.stream.len(),
        }
    }

    fn at_input_end(&self) -> bool {
        match self.limit {
            Some(limit) if self.cursor >= limit => true,
            _ => self.stream.at_eod(self.cursor),
        }
    }

    /// Ensure `n` bytes are readable, suspending when the stream may still
    /// grow.
    fn need(&self, n: usize) -> Ev<()> {
        if self.cursor + n <= self.available_end() {
            return Ok(());
        }
        if let Some(limit) = self.limit {
            if limit <= self.stream.len() {
                return self.fail(
                    RuntimeErrorKind::ParseError,
                    format!("&size bound exhausted while needing {} bytes", n),
                );
            }
        }
        if self.stream.is_frozen() {
            return self.fail(
                RuntimeErrorKind::ParseError,
                format!(
                    "premature end of data: need {} bytes, {} remaining",
                    n,
                    self.stream.size_remaining(self.cursor)
                ),
            );
        }
        Err(Interrupt::Suspend)
    }

    fn unit(&mut self, grammar: &'a Grammar) -> Ev<UnitValue> {
        if self.depth >= MAX_DEPTH {
            return self.fail(
                RuntimeErrorKind::StackSizeExceeded,
                format!("unit nesting deeper than {}", MAX_DEPTH),
            );
        }
        self.depth += 1;

        let mut value = UnitValue::new(grammar.name());
        self.hooks(grammar, &HookKind::Init);

        let body = match &grammar.get(grammar.root()).kind {
            ProductionKind::Unit { body, .. } => body.clone(),
            _ => {
                self.depth -= 1;
                return self.fail(
                    RuntimeErrorKind::InvalidValue,
                    format!("grammar {} has no unit root", grammar.name()),
                );
            }
        };

        let outcome = self.production(grammar, &body, &mut value);
        self.depth -= 1;
        match outcome {
            Ok(()) => {
                self.hooks(grammar, &HookKind::Done);
                Ok(value)
            }
            Err(Interrupt::Fail(e)) if e.kind == RuntimeErrorKind::ParseError => {
                self.hooks(grammar, &HookKind::Error);
                Err(Interrupt::Fail(e))
            }
            Err(other) => Err(other),
        }
    }

    fn hooks(&mut self, grammar: &Grammar, kind: &HookKind) {
        for hook in grammar.hooks_for(kind) {
            self.trace.push(TraceEvent::Hook {
                unit: grammar.name().to_string(),
                event: hook.kind.label(),
            });
        }
    }

    fn production(
        &mut self,
        grammar: &'a Grammar,
        symbol: &Symbol,
        unit: &mut UnitValue,
    ) -> Ev<()> {
        let production = grammar.get(symbol);
        match &production.kind {
            ProductionKind::Epsilon => Ok(()),
            ProductionKind::Ctor { ctor, field } => {
                let value = self.match_literal(grammar, ctor, symbol)?;
                self.bind(grammar, field.as_ref(), value, unit)
            }
            ProductionKind::Variable { shape, field, .. } => {
                let value = self.read_variable(grammar, shape, symbol, unit)?;
                self.bind(grammar, field.as_ref(), value, unit)
            }
            ProductionKind::TypeLiteral { unit: nested, field } => {
                let nested_grammar = match self.matcher.set.get(nested) {
                    Some(g) => g,
                    None => {
                        return self.fail(
                            RuntimeErrorKind::InvalidValue,
                            format!("no grammar for unit {}", nested),
                        )
                    }
                };
                let value = self.unit(nested_grammar)?;
                self.bind(grammar, field.as_ref(), Value::Unit(value), unit)
            }
            ProductionKind::Reference { to } => self.production(grammar, to, unit),
            ProductionKind::Sequence { elements } | ProductionKind::Block { items: elements } => {
                for element in elements {
                    self.production(grammar, element, unit)?;
                }
                Ok(())
            }
            ProductionKind::LookAhead {
                alt_a,
                alt_b,
                lahs_a,
                lahs_b,
            } => {
                let chosen = self.dispatch(grammar, symbol, lahs_a, lahs_b)?;
                let alternative = if chosen { alt_a } else { alt_b };
                self.production(grammar, alternative, unit)
            }
            ProductionKind::Switch {
                expr,
                cases,
                default,
            } => {
                let discriminant = self.expr(grammar, expr, unit, None)?;
                for (labels, case) in cases {
                    for label in labels {
                        let label_value = self.expr(grammar, label, unit, None)?;
                        if values_equal(&discriminant, &label_value) {
                            return self.production(grammar, case, unit);
                        }
                    }
                }
                match default {
                    Some(case) => self.production(grammar, case, unit),
                    None => self.fail(
                        RuntimeErrorKind::ParseError,
                        format!("no switch case matches in '{}'", symbol),
                    ),
                }
            }
            ProductionKind::Counter { expr, body, field } => {
                let count = self.expr_u64(grammar, expr, unit)?;
                let mut elements = Vec::new();
                for _ in 0..count {
                    let element = self.element(grammar, body, unit)?;
                    self.element_hooks(grammar, field.as_ref(), &element);
                    elements.push(element);
                }
                self.bind(grammar, field.as_ref(), Value::Vector(elements), unit)
            }
            ProductionKind::While { kind, body, field } => {
                let elements = self.repeat(grammar, kind, body, field.as_ref(), unit)?;
                self.bind(grammar, field.as_ref(), Value::Vector(elements), unit)
            }
            ProductionKind::ForEach {
                body,
                eod_ok,
                field,
            } => {
                let mut elements = Vec::new();
                loop {
                    if self.at_input_end() {
                        if *eod_ok {
                            break;
                        }
                        return self.fail(
                            RuntimeErrorKind::ParseError,
                            format!("premature end of data in '{}'", symbol),
                        );
                    }
                    if !self.stream.is_frozen() && self.cursor >= self.available_end() {
                        return Err(Interrupt::Suspend);
                    }
                    let element = self.element(grammar, body, unit)?;
                    self.element_hooks(grammar, field.as_ref(), &element);
                    elements.push(element);
                }
                self.bind(grammar, field.as_ref(), Value::Vector(elements), unit)
            }
            ProductionKind::Skip { bytes } => {
                let n = self.expr_u64(grammar, bytes, unit)? as usize;
                self.need(n)?;
                self.cursor += n;
                Ok(())
            }
            ProductionKind::Unit { body, .. } => self.production(grammar, body, unit),
            ProductionKind::Deferred { resolved } => match resolved {
                Some(target) => self.production(grammar, target, unit),
                None => crate::diagnostics::internal_error!(
                    "unpatched deferred '{}' reached at parse time",
                    symbol
                ),
            },
        }
    }

    /// Parse one repeated element into a scratch value.
    fn element(&mut self, grammar: &'a Grammar, body: &Symbol, unit: &mut UnitValue) -> Ev<Value> {
        let production = grammar.get(body);
        match &production.kind {
            ProductionKind::Ctor { ctor, .. } => self.match_literal(grammar, ctor, body),
            ProductionKind::Variable { shape, .. } => {
                self.read_variable(grammar, shape, body, unit)
            }
            ProductionKind::TypeLiteral { unit: nested, .. } => {
                let nested_grammar = match self.matcher.set.get(nested) {
                    Some(g) => g,
                    None => {
                        return self.fail(
                            RuntimeErrorKind::InvalidValue,
                            format!("no grammar for unit {}", nested),
                        )
                    }
                };
                Ok(Value::Unit(self.unit(nested_grammar)?))
            }
            _ => {
                self.production(grammar, body, unit)?;
                Ok(Value::Null)
            }
        }
    }

    fn element_hooks(&mut self, grammar: &Grammar, field: Option<&FieldRef>, _element: &Value) {
        if let Some(FieldRef { id: Some(id), .. }) = field {
            self.hooks(grammar, &HookKind::ForEach(id.clone()));
        }
    }

    fn repeat(
        &mut self,
        grammar: &'a Grammar,
        kind: &WhileKind,
        body: &Symbol,
        field: Option<&FieldRef>,
        unit: &mut UnitValue,
    ) -> Ev<Vec<Value>> {
        let mut elements = Vec::new();
        match kind {
            WhileKind::Until(cond) => loop {
                let element = self.element(grammar, body, unit)?;
                self.element_hooks(grammar, field, &element);
                let done = self.expr_bool(grammar, cond, unit, Some(&element))?;
                elements.push(element);
                if done {
                    return Ok(elements);
                }
            },
            WhileKind::Eod => loop {
                if self.at_input_end() {
                    return Ok(elements);
                }
                if !self.stream.is_frozen() && self.cursor >= self.available_end() {
                    return Err(Interrupt::Suspend);
                }
                let element = self.element(grammar, body, unit)?;
                self.element_hooks(grammar, field, &element);
                elements.push(element);
            },
            WhileKind::Size(size) => {
                let n = self.expr_u64(grammar, size, unit)? as usize;
                self.need(n)?;
                let bound = self.cursor + n;
                let saved = self.limit;
                self.limit = Some(match saved {
                    Some(existing) => existing.min(bound),
                    None => bound,
                });
                let outcome = (|| -> Ev<()> {
                    while self.cursor < self.available_end() {
                        let element = self.element(grammar, body, unit)?;
                        self.element_hooks(grammar, field, &element);
                        elements.push(element);
                    }
                    Ok(())
                })();
                self.limit = saved;
                outcome?;
                if self.cursor != bound {
                    return self.fail(
                        RuntimeErrorKind::ParseError,
                        "&size bound not consumed exactly".into(),
                    );
                }
                Ok(elements)
            }
        }
    }

    fn bind(
        &mut self,
        grammar: &Grammar,
        field: Option<&FieldRef>,
        raw: Value,
        unit: &mut UnitValue,
    ) -> Ev<()> {
        let field = match field {
            Some(f) => f,
            None => return Ok(()),
        };
        if let Some(requires) = &field.requires {
            if !self.expr_bool(grammar, requires, unit, Some(&raw))? {
                return self.fail(
                    RuntimeErrorKind::ParseError,
                    format!(
                        "&requires failed for field '{}'",
                        field.id.as_deref().unwrap_or("<anon>")
                    ),
                );
            }
        }
        let value = match &field.convert {
            Some(convert) => self.expr(grammar, convert, unit, Some(&raw))?,
            None => raw,
        };
        if let Some(id) = &field.id {
            unit.fields.insert(id.clone(), value);
            self.hooks(grammar, &HookKind::Field(id.clone()));
        }
        Ok(())
    }

    fn match_literal(&mut self, grammar: &Grammar, ctor_node: &Node, symbol: &Symbol) -> Ev<Value> {
        match ctor_node.ctor() {
            Ctor::Bytes(expected) => {
                let data = self.stream.data();
                let end = self.available_end();
                let have = &data[self.cursor..end];
                let common = have.len().min(expected.len());
                if have[..common] != expected[..common] {
                    return self.fail(
                        RuntimeErrorKind::ParseError,
                        format!("literal '{}' does not match", symbol),
                    );
                }
                self.need(expected.len())?;
                self.cursor += expected.len();
                Ok(Value::Bytes(expected.clone()))
            }
            Ctor::Regexp(pattern) => {
                let regex = self.matcher.regex(pattern, self.cursor)?;
                let data = self.stream.data();
                let end = self.available_end();
                match regex.find(&data[self.cursor..end]) {
                    Some(found) => {
                        let stop = self.cursor + found.end();
                        // A match ending at the growing edge of an unfrozen
                        // stream may still extend.
                        if stop == end && !self.at_boundary(end) {
                            return Err(Interrupt::Suspend);
                        }
                        let value = data[self.cursor..stop].to_vec();
                        self.cursor = stop;
                        Ok(Value::Bytes(value))
                    }
                    None => {
                        if !self.at_boundary(end) {
                            return Err(Interrupt::Suspend);
                        }
                        self.fail(
                            RuntimeErrorKind::ParseError,
                            format!("regular expression '{}' does not match", symbol),
                        )
                    }
                }
            }
            Ctor::UInt { width, value } => {
                let read = self.read_uint(*width, grammar.byte_order())?;
                if read != *value {
                    return self.fail(
                        RuntimeErrorKind::ParseError,
                        format!("literal '{}' does not match (read {})", symbol, read),
                    );
                }
                Ok(Value::UInt(read))
            }
            Ctor::SInt { width, value } => {
                let read = self.read_uint(*width, grammar.byte_order())? as i64;
                if read != *value {
                    return self.fail(
                        RuntimeErrorKind::ParseError,
                        format!("literal '{}' does not match (read {})", symbol, read),
                    );
                }
                Ok(Value::SInt(read))
            }
            Ctor::Bitfield { width, bits } => {
                let read = self.read_uint(*width, grammar.byte_order())?;
                for bit in bits {
                    if let Some(expected) = bit.value {
                        let mask_width = bit.high - bit.low + 1;
                        let mask = if mask_width >= 64 {
                            u64::MAX
                        } else {
                            (1u64 << mask_width) - 1
                        };
                        let actual = (read >> bit.low) & mask;
                        if actual != expected {
                            return self.fail(
                                RuntimeErrorKind::ParseError,
                                format!(
                                    "bitfield range '{}' is {} (expected {})",
                                    bit.id, actual, expected
                                ),
                            );
                        }
                    }
                }
                Ok(Value::UInt(read))
            }
            other => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("ctor {} cannot be matched against the stream", other.brief()),
            ),
        }
    }

    /// Whether `end` is a hard boundary (frozen stream or a `&size` limit)
    /// rather than the growing edge.
    fn at_boundary(&self, end: usize) -> bool {
        match self.limit {
            Some(limit) if end == limit && limit <= self.stream.len() => true,
            _ => self.stream.is_frozen(),
        }
    }

    fn read_uint(&mut self, width: u8, order: ByteOrder) -> Ev<u64> {
        let n = (width / 8) as usize;
        self.need(n)?;
        let bytes = &self.stream.data()[self.cursor..self.cursor + n];
        let mut value: u64 = 0;
        match order {
            ByteOrder::Big => {
                for b in bytes {
                    value = (value << 8) | u64::from(*b);
                }
            }
            ByteOrder::Little => {
                for b in bytes.iter().rev() {
                    value = (value << 8) | u64::from(*b);
                }
            }
        }
        self.cursor += n;
        Ok(value)
    }

    fn read_variable(
        &mut self,
        grammar: &'a Grammar,
        shape: &VarShape,
        symbol: &Symbol,
        unit: &mut UnitValue,
    ) -> Ev<Value> {
        let order = grammar.byte_order();
        match shape {
            VarShape::Numeric { width, signed } => {
                let raw = self.read_uint(*width, order)?;
                if *signed {
                    let shift = 64 - u32::from(*width);
                    Ok(Value::SInt(((raw << shift) as i64) >> shift))
                } else {
                    Ok(Value::UInt(raw))
                }
            }
            VarShape::Bitfield { width } => Ok(Value::UInt(self.read_uint(*width, order)?)),
            VarShape::Bytes {
                size,
                until,
                eod,
                chunked: _,
            } => {
                if let Some(size) = size {
                    let n = self.expr_u64(grammar, size, unit)? as usize;
                    self.need(n)?;
                    let value = self.stream.data()[self.cursor..self.cursor + n].to_vec();
                    self.cursor += n;
                    return Ok(Value::Bytes(value));
                }
                if let Some(until) = until {
                    let terminator = match self.expr(grammar, until, unit, None)? {
                        Value::Bytes(b) if !b.is_empty() => b,
                        other => {
                            return self.fail(
                                RuntimeErrorKind::InvalidValue,
                                format!("&until terminator must be bytes, got {:?}", other),
                            )
                        }
                    };
                    let end = self.available_end();
                    let haystack = &self.stream.data()[self.cursor..end];
                    match find_subsequence(haystack, &terminator) {
                        Some(at) => {
                            let value = haystack[..at].to_vec();
                            self.cursor += at + terminator.len();
                            Ok(Value::Bytes(value))
                        }
                        None if self.at_boundary(end) => self.fail(
                            RuntimeErrorKind::ParseError,
                            format!("terminator not found for '{}'", symbol),
                        ),
                        None => Err(Interrupt::Suspend),
                    }
                } else if *eod {
                    // Everything up to end of data; only complete once the
                    // boundary is hard.
                    let end = self.available_end();
                    if !self.at_boundary(end) {
                        return Err(Interrupt::Suspend);
                    }
                    let value = self.stream.data()[self.cursor..end].to_vec();
                    self.cursor = end;
                    Ok(Value::Bytes(value))
                } else {
                    self.fail(
                        RuntimeErrorKind::AttributeNotSet,
                        format!("bytes field '{}' has no &size, &until, or &eod bound", symbol),
                    )
                }
            }
            VarShape::Opaque => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("'{}' has no built-in parser", symbol),
            ),
        }
    }

    /// Decide a look-ahead dispatch: true selects the first alternative.
    fn dispatch(
        &mut self,
        grammar: &Grammar,
        symbol: &Symbol,
        lahs_a: &std::collections::BTreeSet<TokenId>,
        lahs_b: &std::collections::BTreeSet<TokenId>,
    ) -> Ev<bool> {
        let mut insufficient = false;
        let mut chosen: Option<bool> = None;
        for (tokens, chooses_a) in [(lahs_a, true), (lahs_b, false)] {
            for token in tokens {
                match self.peek_token(grammar, *token)? {
                    Peek::Match => chosen = chosen.or(Some(chooses_a)),
                    Peek::NoMatch => {}
                    Peek::Insufficient => insufficient = true,
                }
            }
        }
        // Committing while another candidate still awaits bytes could pick
        // a different alternative than the complete input would.
        if insufficient {
            return Err(Interrupt::Suspend);
        }
        match chosen {
            Some(chooses_a) => Ok(chooses_a),
            None => self.fail(
                RuntimeErrorKind::ParseError,
                format!("no look-ahead alternative of '{}' matches", symbol),
            ),
        }
    }

    fn peek_token(&mut self, grammar: &Grammar, token: TokenId) -> Ev<Peek> {
        if token == EOD {
            return Ok(if self.at_input_end() {
                Peek::Match
            } else if self.cursor >= self.available_end() && !self.stream.is_frozen() {
                Peek::Insufficient
            } else {
                Peek::NoMatch
            });
        }
        let lit = match grammar.token(token) {
            Some(l) => l.clone(),
            None => return Ok(Peek::NoMatch),
        };
        let saved_cursor = self.cursor;
        let saved_trace = self.trace.len();
        let result = self.match_literal(grammar, &lit.ctor, &Symbol(lit.repr.clone()));
        self.cursor = saved_cursor;
        self.trace.truncate(saved_trace);
        match result {
            Ok(_) => Ok(Peek::Match),
            Err(Interrupt::Suspend) => Ok(Peek::Insufficient),
            Err(Interrupt::Fail(e)) if e.kind == RuntimeErrorKind::ParseError => Ok(Peek::NoMatch),
            Err(other) => Err(other),
        }
    }

    fn expr_u64(&mut self, grammar: &Grammar, node: &Node, unit: &UnitValue) -> Ev<u64> {
        let value = self.expr(grammar, node, unit, None)?;
        match value.as_u64() {
            Some(v) => Ok(v),
            None => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("expected an unsigned count, got {:?}", value),
            ),
        }
    }

    fn expr_bool(
        &mut self,
        grammar: &Grammar,
        node: &Node,
        unit: &UnitValue,
        dollar: Option<&Value>,
    ) -> Ev<bool> {
        match self.expr(grammar, node, unit, dollar)? {
            Value::Bool(b) => Ok(b),
            other => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("expected a boolean condition, got {:?}", other),
            ),
        }
    }

    /// Evaluate an attribute or discriminant expression against the
    /// unit-in-progress.
    fn expr(
        &mut self,
        grammar: &Grammar,
        node: &Node,
        unit: &UnitValue,
        dollar: Option<&Value>,
    ) -> Ev<Value> {
        let expr = match node.as_expr() {
            Some(e) => e,
            None => {
                // Bare ctor nodes appear as switch labels and terminators.
                if matches!(node.kind, NodeKind::Ctor(_)) {
                    return self.ctor_value(node);
                }
                return self.fail(
                    RuntimeErrorKind::InvalidValue,
                    format!("{} is not evaluable", node.label()),
                );
            }
        };
        match &expr.kind {
            ExprKind::Ctor => self.ctor_value(node.child(0)),
            ExprKind::Dollar => match dollar {
                Some(v) => Ok(v.clone()),
                None => self.fail(
                    RuntimeErrorKind::AttributeNotSet,
                    "'$$' has no value here".into(),
                ),
            },
            ExprKind::SelfRef => Ok(Value::Unit(unit.clone())),
            ExprKind::Name { id, resolved } => {
                let qualified = match resolved {
                    Some(q) => q,
                    None => {
                        return self.fail(
                            RuntimeErrorKind::InvalidValue,
                            format!("unresolved name '{}' at parse time", id),
                        )
                    }
                };
                if let Some(DeclInfoKind::EnumLabel { enum_name, value }) =
                    self.matcher.decls.get(qualified).map(|i| &i.kind)
                {
                    return Ok(Value::Enum {
                        name: enum_name.clone(),
                        value: *value,
                    });
                }
                // Unit-scoped names refer to fields of the instance.
                if let Some(field) = qualified.strip_prefix(&format!("{}::", grammar.name())) {
                    if let Some(value) = unit.get(field) {
                        return Ok(value.clone());
                    }
                    return self.fail(
                        RuntimeErrorKind::MissingAttribute,
                        format!("field '{}' is not set yet", field),
                    );
                }
                self.fail(
                    RuntimeErrorKind::InvalidValue,
                    format!("'{}' cannot be evaluated at parse time", qualified),
                )
            }
            ExprKind::Member { id } => {
                let base = self.expr(grammar, node.child(0), unit, dollar)?;
                match base {
                    Value::Unit(u) => match u.get(id) {
                        Some(v) => Ok(v.clone()),
                        None => self.fail(
                            RuntimeErrorKind::MissingAttribute,
                            format!("field '{}' is not set yet", id),
                        ),
                    },
                    Value::Null => self.fail(
                        RuntimeErrorKind::NullReference,
                        format!("member '{}' of null", id),
                    ),
                    other => self.fail(
                        RuntimeErrorKind::InvalidValue,
                        format!("member '{}' of non-unit value {:?}", id, other),
                    ),
                }
            }
            ExprKind::Operator { op, .. } => {
                let lhs = self.expr(grammar, node.child(0), unit, dollar)?;
                match op {
                    Operator::Size => {
                        return match &lhs {
                            Value::Bytes(b) => Ok(Value::UInt(b.len() as u64)),
                            Value::Vector(v) => Ok(Value::UInt(v.len() as u64)),
                            other => self.fail(
                                RuntimeErrorKind::InvalidValue,
                                format!("size of {:?}", other),
                            ),
                        };
                    }
                    _ => {}
                }
                let rhs = self.expr(grammar, node.child(1), unit, dollar)?;
                self.binary(*op, lhs, rhs)
            }
            ExprKind::Coerced | ExprKind::PendingCoerced => {
                let inner = self.expr(grammar, node.child(0), unit, dollar)?;
                self.convert(inner, &expr.ty.ty)
            }
            ExprKind::UnresolvedOperator { op } => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("operator '{}' was never resolved", op.symbol()),
            ),
        }
    }

    fn ctor_value(&mut self, ctor_node: &Node) -> Ev<Value> {
        match ctor_node.ctor() {
            Ctor::Bool(b) => Ok(Value::Bool(*b)),
            Ctor::UInt { value, .. } => Ok(Value::UInt(*value)),
            Ctor::SInt { value, .. } => Ok(Value::SInt(*value)),
            Ctor::Real(r) => Ok(Value::Real(*r)),
            Ctor::Bytes(b) => Ok(Value::Bytes(b.clone())),
            Ctor::Str(s) => Ok(Value::Str(s.clone())),
            Ctor::Null => Ok(Value::Null),
            other => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!("ctor {} is not a runtime value", other.brief()),
            ),
        }
    }

    fn binary(&mut self, op: Operator, lhs: Value, rhs: Value) -> Ev<Value> {
        use Operator::*;
        match op {
            Eq => return Ok(Value::Bool(values_equal(&lhs, &rhs))),
            Neq => return Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            And | Or => {
                return match (lhs, rhs) {
                    (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == And {
                        a && b
                    } else {
                        a || b
                    })),
                    _ => self.fail(
                        RuntimeErrorKind::InvalidValue,
                        "logical operator over non-booleans".into(),
                    ),
                };
            }
            Index => {
                return match (lhs, rhs) {
                    (Value::Vector(v), index) => {
                        let i = index.as_u64().unwrap_or(u64::MAX) as usize;
                        match v.into_iter().nth(i) {
                            Some(value) => Ok(value),
                            None => self.fail(
                                RuntimeErrorKind::InvalidValue,
                                format!("index {} out of range", i),
                            ),
                        }
                    }
                    _ => self.fail(
                        RuntimeErrorKind::InvalidValue,
                        "index into non-vector".into(),
                    ),
                };
            }
            _ => {}
        }

        match (&lhs, &rhs) {
            (Value::UInt(a), Value::UInt(b)) => {
                let (a, b) = (*a, *b);
                match op {
                    Add => a
                        .checked_add(b)
                        .map(Value::UInt)
                        .ok_or(())
                        .or_else(|_| self.overflow()),
                    Sub => a
                        .checked_sub(b)
                        .map(Value::UInt)
                        .ok_or(())
                        .or_else(|_| self.overflow()),
                    Mul => a
                        .checked_mul(b)
                        .map(Value::UInt)
                        .ok_or(())
                        .or_else(|_| self.overflow()),
                    Div => {
                        if b == 0 {
                            self.fail(RuntimeErrorKind::DivisionByZero, "division by zero".into())
                        } else {
                            Ok(Value::UInt(a / b))
                        }
                    }
                    Lt => Ok(Value::Bool(a < b)),
                    Gt => Ok(Value::Bool(a > b)),
                    Leq => Ok(Value::Bool(a <= b)),
                    Geq => Ok(Value::Bool(a >= b)),
                    _ => self.fail(
                        RuntimeErrorKind::InvalidValue,
                        format!("operator '{}' over integers", op.symbol()),
                    ),
                }
            }
            (Value::Bytes(a), Value::Bytes(b)) => match op {
                Lt => Ok(Value::Bool(a < b)),
                Gt => Ok(Value::Bool(a > b)),
                Leq => Ok(Value::Bool(a <= b)),
                Geq => Ok(Value::Bool(a >= b)),
                _ => self.fail(
                    RuntimeErrorKind::InvalidValue,
                    format!("operator '{}' over bytes", op.symbol()),
                ),
            },
            _ => self.fail(
                RuntimeErrorKind::InvalidValue,
                format!(
                    "operator '{}' over mismatched values {:?} and {:?}",
                    op.symbol(),
                    lhs,
                    rhs
                ),
            ),
        }
    }

    fn overflow(&self) -> Ev<Value> {
        self.fail(RuntimeErrorKind::Overflow, "integer overflow".into())
    }

    /// Apply a resolved coercion to a runtime value.
    fn convert(&mut self, value: Value, to: &crate::types::Type) -> Ev<Value> {
        use crate::types::Type;
        match (value, to) {
            (Value::UInt(v), Type::UInt(_)) => Ok(Value::UInt(v)),
            (Value::UInt(v), Type::SInt(_)) => Ok(Value::SInt(v as i64)),
            (Value::SInt(v), Type::SInt(_)) => Ok(Value::SInt(v)),
            (Value::SInt(v), Type::UInt(_)) if v >= 0 => Ok(Value::UInt(v as u64)),
            (Value::UInt(v), Type::Real) => Ok(Value::Real(v as f64)),
            (Value::SInt(v), Type::Real) => Ok(Value::Real(v as f64)),
            (Value::Str(s), Type::Bytes) => Ok(Value::Bytes(s.into_bytes())),
            (v, Type::Optional(_)) | (v, Type::Result(_)) => Ok(v),
            (Value::UInt(v), Type::Name(name)) => Ok(Value::Enum {
                name: name.clone(),
                value: v as i64,
            }),
            (Value::SInt(v), Type::Name(name)) => Ok(Value::Enum {
                name: name.clone(),
                value: v,
            }),
            (v, Type::Vector(_)) | (v, Type::List(_)) => Ok(v),
            (v, _) => Ok(v),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::UInt(x), Value::SInt(y)) | (Value::SInt(y), Value::UInt(x)) => {
            i64::try_from(*x).map_or(false, |x| x == *y)
        }
        (Value::Enum { value: x, .. }, Value::UInt(y)) | (Value::UInt(y), Value::Enum { value: x, .. }) => {
            i64::try_from(*y).map_or(false, |y| y == *x)
        }
        (Value::Enum { value: x, .. }, Value::SInt(y)) | (Value::SInt(y), Value::Enum { value: x, .. }) => {
            x == y
        }
        _ => a == b,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A reassembly buffer accepting out-of-order writes and delivering ordered
/// bytes, configured with an overlap [SinkPolicy].
#[derive(Debug)]
pub struct Sink {
    policy: SinkPolicy,
    auto_trim: bool,
    next_seq: u64,
    chunks: BTreeMap<u64, Vec<u8>>,
    delivered: Vec<u8>,
    closed: bool,
}

impl Sink {
    pub fn new(policy: SinkPolicy, auto_trim: bool) -> Self {
        Self {
            policy,
            auto_trim,
            next_seq: 0,
            chunks: BTreeMap::new(),
            delivered: Vec::new(),
            closed: false,
        }
    }

    pub fn set_initial_sequence(&mut self, seq: u64) {
        self.next_seq = seq;
    }

    /// Write a chunk at an explicit sequence number; [None] appends at the
    /// current reassembly point.
    pub fn write(&mut self, data: &[u8], seq: Option<u64>) -> Result<(), RuntimeError> {
        if self.closed {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidValue,
                self.delivered.len(),
                "write to a closed sink".into(),
            ));
        }
        let seq = seq.unwrap_or(self.next_seq + self.pending_len());
        match self.chunks.get(&seq) {
            Some(_) if self.policy == SinkPolicy::First => {}
            Some(_) if self.policy == SinkPolicy::Sequential => {}
            _ => {
                self.chunks.insert(seq, data.to_vec());
            }
        }
        self.deliver();
        Ok(())
    }

    /// Record a gap: `len` bytes at `seq` will never arrive.
    pub fn gap(&mut self, seq: u64, len: u64) {
        if seq == self.next_seq {
            self.next_seq += len;
            self.deliver();
        }
    }

    pub fn skip(&mut self, seq: u64) {
        if seq > self.next_seq {
            self.next_seq = seq;
            self.chunks.retain(|s, _| *s >= seq);
            self.deliver();
        }
    }

    pub fn trim(&mut self, seq: u64) {
        self.chunks.retain(|s, _| *s >= seq);
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Bytes delivered in order so far.
    pub fn assembled(&self) -> &[u8] {
        &self.delivered
    }

    pub fn size(&self) -> u64 {
        self.delivered.len() as u64
    }

    fn pending_len(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }

    fn deliver(&mut self) {
        loop {
            let (seq, chunk) = match self.chunks.range(..=self.next_seq).next_back() {
                Some((s, c)) if *s <= self.next_seq => (*s, c.clone()),
                _ => break,
            };
            let end = seq + chunk.len() as u64;
            if end <= self.next_seq {
                self.chunks.remove(&seq);
                continue;
            }
            let offset = (self.next_seq - seq) as usize;
            self.delivered.extend_from_slice(&chunk[offset..]);
            self.next_seq = end;
            self.chunks.remove(&seq);
            if self.auto_trim {
                let cutoff = self.next_seq;
                self.chunks.retain(|s, _| *s >= cutoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_freeze_and_eod() {
        let mut stream = ByteStream::new();
        stream.append(b"ab").unwrap();
        assert!(!stream.at_eod(2));
        stream.freeze();
        assert!(stream.at_eod(2));
        assert!(!stream.at_eod(1));
        assert!(stream.append(b"c").is_err());
    }

    #[test]
    fn sink_reassembles_out_of_order() {
        let mut sink = Sink::new(SinkPolicy::Sequential, true);
        sink.write(b"world", Some(5)).unwrap();
        assert_eq!(sink.assembled(), b"");
        sink.write(b"hello", Some(0)).unwrap();
        assert_eq!(sink.assembled(), b"helloworld");
        assert_eq!(sink.size(), 10);
    }

    #[test]
    fn sink_gap_unblocks_delivery() {
        let mut sink = Sink::new(SinkPolicy::Sequential, true);
        sink.write(b"later", Some(3)).unwrap();
        sink.gap(0, 3);
        assert_eq!(sink.assembled(), b"later");
    }
}
