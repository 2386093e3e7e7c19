//! Spicy parser generator (spicy_pg) is a compiler kernel that lowers declarative descriptions of
//! binary and textual protocol messages (*units*) into grammars of productions and then into an
//! abstract IR of resumable recursive descent parsers.
//!
//! # Overview
//! Hand-written parsers for network protocols and file formats are error-prone in exactly the
//! places that matter: bounds handling, partial input, and error reporting. This library takes a
//! typed description of a message layout and derives the parser mechanically. The surface syntax
//! and the backend that renders the IR into executable form are external collaborators; hosts
//! construct the intermediate AST through the [builder](crate::builder::Builder) factory, run the
//! [pipeline](crate::pipeline::compile), and either hand the resulting IR to a backend or execute
//! grammars directly with the reference [Matcher](crate::runtime::Matcher).
//!
//! # Design
//!
//! Compilation is a fixed sequence of passes over a tree of [Node]s: scope building binds every
//! declaration, a bounded-fixpoint resolver narrows types and instantiates operators, validators
//! check well-formedness before and after, and the grammar builder lowers each unit into a symbol
//! table of productions. Look-ahead analysis computes nullable/FIRST/FOLLOW sets to a fixpoint and
//! rejects alternatives whose look-ahead sets collide, so accepted grammars parse without
//! backtracking. Code generation emits one resumable parse function per unit; generated parsers
//! suspend when an unfrozen stream runs out of bytes and resume when the host supplies more.
//!
//! # Example
//!
//! An HTTP request line, parsed from a frozen stream:
//!
//! ```
//! use spicy_pg::builder::Builder;
//! use spicy_pg::pipeline::compile;
//! use spicy_pg::runtime::{ByteStream, Matcher, Parsed, Value};
//! use spicy_pg::Context;
//!
//! let mut ctx = Context::new();
//! let mut b = Builder::new(&mut ctx);
//!
//! let method = {
//!     let re = b.regexp("[^ \\t\\r\\n]+");
//!     b.literal_field(Some("method"), re, vec![])
//! };
//! let sp1 = {
//!     let re = b.regexp("[ \\t]+");
//!     b.literal_field(None, re, vec![])
//! };
//! let uri = {
//!     let re = b.regexp("[^ \\t\\r\\n]+");
//!     b.literal_field(Some("uri"), re, vec![])
//! };
//! let sp2 = {
//!     let re = b.regexp("[ \\t]+");
//!     b.literal_field(None, re, vec![])
//! };
//! let version = {
//!     let re = b.regexp("HTTP/[0-9]+\\.[0-9]+");
//!     b.literal_field(Some("version"), re, vec![])
//! };
//! let eol = {
//!     let re = b.regexp("\\r?\\n");
//!     b.literal_field(None, re, vec![])
//! };
//!
//! let unit = b.unit("RequestLine", vec![method, sp1, uri, sp2, version, eol]);
//! let module = b.module("HTTP", vec![unit]);
//! ctx.add_module(module);
//!
//! let compiled = compile(&mut ctx).expect("request line compiles");
//! let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "HTTP::RequestLine").unwrap();
//!
//! let stream = ByteStream::frozen_from(b"GET /index.html HTTP/1.0\n");
//! match matcher.run(&stream).unwrap() {
//!     Parsed::Complete(result) => {
//!         assert_eq!(result.value.get("method"), Some(&Value::Bytes(b"GET".to_vec())));
//!         assert_eq!(result.value.get("uri"), Some(&Value::Bytes(b"/index.html".to_vec())));
//!         assert_eq!(result.consumed, stream.len());
//!     }
//!     Parsed::Suspended => unreachable!("stream was frozen"),
//! }
//! ```
#[cfg(test)]
mod __tests__;

pub mod ast;
pub mod builder;
pub mod codegen;
mod diagnostics;
pub mod grammar;
mod meta;
pub mod operators;
pub mod optimizer;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod scope;
pub mod types;
pub mod util;
pub mod validator;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};

use ast::{Node, NodeKind};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
/// Stable identity of one AST node for the duration of a compilation.
pub struct NodeId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A source range, rendered as `path:from_line[:from_col][-to_line[:to_col]]`.
pub struct Location {
    pub path: String,
    pub from_line: u32,
    pub from_col: u32,
    pub to_line: u32,
    pub to_col: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// Per-node metadata: source location and documentation. Never part of
/// structural equality.
pub struct Meta {
    pub(crate) location: Option<Location>,
    pub(crate) doc: Option<String>,
}

#[derive(Debug, Clone)]
/// Host-selectable compilation switches.
pub struct Options {
    /// In strict mode an integer literal coerces to an enum only when it
    /// exactly matches a declared label.
    pub strict_enums: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { strict_enums: true }
    }
}

/// One compilation's state: the module trees, the identity counter, the
/// diagnostic sink, and the options. All nodes are owned (transitively) by
/// the context and freed together when it drops.
pub struct Context {
    next_id: u64,
    pub modules: Vec<Node>,
    pub sink: DiagnosticSink,
    pub options: Options,
}

impl Context {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            modules: Vec::new(),
            sink: DiagnosticSink::new(),
            options: Options::default(),
        }
    }

    pub fn next_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Construct a node with a fresh identity and no metadata.
    pub fn make(&mut self, kind: NodeKind, children: Vec<Node>) -> Node {
        self.make_with(kind, Meta::none(), children)
    }

    pub fn make_with(&mut self, kind: NodeKind, meta: Meta, children: Vec<Node>) -> Node {
        Node {
            id: self.next_id(),
            meta,
            kind,
            children,
        }
    }

    pub fn add_module(&mut self, module: Node) {
        self.modules.push(module);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
