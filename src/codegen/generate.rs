use crate::ast::{Ctor, Declaration, ExprKind, HookKind, Node, NodeKind, Statement};
use crate::codegen::{
    Feature, IrExpr, IrFunction, IrOp, IrStmt, ParserModule, ReadSpec, Registration,
};
use crate::grammar::{
    literal_repr, ByteOrder, FieldRef, Grammar, ProductionKind, Symbol, VarShape, WhileKind,
};
use crate::operators::Operator;
use crate::runtime::RuntimeErrorKind;
use crate::scope::{DeclInfoKind, DeclTable};
use crate::util::debug_log;
use std::collections::HashSet;

/// Emit the parser IR for one accepted grammar.
///
/// The generated function set contains one body per production that is the
/// target of a `Reference` (so recursion becomes a tail call), one function
/// per hook, the unit's parse function, and the three exported entry
/// shapes. Statements that produce a value into a destination local also
/// set the `$$` register, which is what hook bodies and per-element
/// attribute expressions read.
pub fn generate(grammar: &Grammar, decls: &DeclTable) -> ParserModule {
    let mut gen = Gen {
        grammar,
        decls,
        fn_backed: grammar
            .productions()
            .filter_map(|p| match &p.kind {
                ProductionKind::Reference { to } => Some(to.clone()),
                _ => None,
            })
            .collect(),
        functions: Vec::new(),
        tmp: 0,
    };

    // Hook bodies compile to their own functions; dispatch blocks invoke
    // them in descending priority order.
    for (index, hook) in grammar.hooks().iter().enumerate() {
        let body = gen.lower_stmt(&hook.body);
        gen.functions.push(IrFunction {
            name: hook_fn_name(grammar, index),
            params: vec!["self".into(), "dd".into()],
            exported: false,
            body,
        });
    }

    let fn_backed: Vec<Symbol> = gen.fn_backed.iter().cloned().collect();
    for symbol in fn_backed {
        let body = gen.emit_kind(&symbol);
        gen.functions.push(IrFunction {
            name: production_fn_name(grammar, &symbol),
            params: parser_params(),
            exported: false,
            body,
        });
    }

    let parse_fn = format!("__parse_{}", mangle(grammar.name()));
    let root_body = gen.emit_kind(grammar.root());
    gen.functions.push(IrFunction {
        name: parse_fn.clone(),
        params: parser_params(),
        exported: false,
        body: root_body,
    });

    let registration = gen.entry_shapes(&parse_fn);
    debug_log(
        "parser-ir",
        &format!(
            "generated {} functions for {}",
            gen.functions.len(),
            grammar.name()
        ),
    );
    ParserModule {
        unit: grammar.name().to_string(),
        functions: gen.functions,
        registration,
    }
}

fn parser_params() -> Vec<String> {
    vec![
        "stream".into(),
        "view".into(),
        "self".into(),
        "ctx".into(),
    ]
}

fn mangle(unit: &str) -> String {
    unit.to_lowercase().replace("::", "_")
}

fn hook_fn_name(grammar: &Grammar, index: usize) -> String {
    format!("__hook_{}_{}", mangle(grammar.name()), index)
}

fn production_fn_name(grammar: &Grammar, symbol: &Symbol) -> String {
    format!("__prod_{}_{}", mangle(grammar.name()), symbol.as_str())
}

struct Gen<'a> {
    grammar: &'a Grammar,
    decls: &'a DeclTable,
    fn_backed: HashSet<Symbol>,
    functions: Vec<IrFunction>,
    tmp: usize,
}

impl<'a> Gen<'a> {
    fn tmp(&mut self, hint: &str) -> String {
        self.tmp += 1;
        format!("__{}{}", hint, self.tmp)
    }

    /// Emission for a child position: function-backed productions become
    /// tail calls, everything else is inlined.
    fn emit_child(&mut self, symbol: &Symbol) -> IrStmt {
        if self.fn_backed.contains(symbol) {
            let location = self.grammar.get(symbol).location.clone();
            IrStmt::at(
                location,
                IrOp::TailCall {
                    function: production_fn_name(self.grammar, symbol),
                },
            )
        } else {
            self.emit_kind(symbol)
        }
    }

    fn emit_kind(&mut self, symbol: &Symbol) -> IrStmt {
        let production = self.grammar.get(symbol).clone();
        let location = production.location.clone();
        let op = match &production.kind {
            ProductionKind::Epsilon => IrOp::Nop,
            ProductionKind::Ctor { ctor, field } => {
                let dest = field.as_ref().map(|_| self.tmp("lit"));
                let mut stmts = vec![IrStmt::at(
                    location.clone(),
                    IrOp::MatchLiteral {
                        token: literal_repr(ctor.ctor()),
                        dest: dest.clone(),
                    },
                )];
                stmts.extend(self.bind_field(field.as_ref(), dest));
                IrOp::Block(stmts)
            }
            ProductionKind::Variable { shape, field, .. } => {
                let dest = field.as_ref().map(|_| self.tmp("val"));
                let mut stmts = vec![IrStmt::at(
                    location.clone(),
                    IrOp::ReadBuiltin {
                        spec: self.read_spec(shape),
                        dest: dest.clone(),
                    },
                )];
                stmts.extend(self.bind_field(field.as_ref(), dest));
                IrOp::Block(stmts)
            }
            ProductionKind::TypeLiteral { unit, field } => {
                let dest = field.as_ref().map(|_| self.tmp("unit"));
                let mut stmts = vec![IrStmt::at(
                    location.clone(),
                    IrOp::CallParser {
                        unit: unit.clone(),
                        dest: dest.clone(),
                    },
                )];
                stmts.extend(self.bind_field(field.as_ref(), dest));
                IrOp::Block(stmts)
            }
            ProductionKind::Reference { to } => IrOp::TailCall {
                function: production_fn_name(self.grammar, to),
            },
            ProductionKind::Sequence { elements } | ProductionKind::Block { items: elements } => {
                IrOp::Block(elements.iter().map(|e| self.emit_child(e)).collect())
            }
            ProductionKind::LookAhead {
                alt_a,
                alt_b,
                lahs_a,
                lahs_b,
            } => {
                let arms = vec![
                    (lahs_a.clone(), self.emit_child(alt_a)),
                    (lahs_b.clone(), self.emit_child(alt_b)),
                ];
                IrOp::PeekDispatch {
                    arms,
                    otherwise: Box::new(IrStmt::new(IrOp::Raise {
                        error: RuntimeErrorKind::ParseError,
                        message: format!("no look-ahead alternative of '{}' matches", symbol),
                    })),
                }
            }
            ProductionKind::Switch {
                expr,
                cases,
                default,
            } => {
                let discriminant = self.lower_expr(expr);
                let arms = cases
                    .iter()
                    .map(|(labels, case)| {
                        (
                            labels.iter().map(|l| self.lower_expr(l)).collect(),
                            self.emit_child(case),
                        )
                    })
                    .collect();
                let default = match default {
                    Some(case) => Box::new(self.emit_child(case)),
                    None => Box::new(IrStmt::new(IrOp::Raise {
                        error: RuntimeErrorKind::ParseError,
                        message: format!("no switch case matches in '{}'", symbol),
                    })),
                };
                IrOp::SwitchDispatch {
                    discriminant,
                    arms,
                    default: Some(default),
                }
            }
            ProductionKind::Counter { expr, body, field } => {
                let n = self.tmp("n");
                let i = self.tmp("i");
                let acc = self.tmp("acc");
                let element = self.element_stmts(body, field.as_ref(), &acc);
                let loop_body = IrStmt::new(IrOp::Block(vec![
                    IrStmt::new(IrOp::If {
                        cond: IrExpr::Binary {
                            op: Operator::Geq,
                            lhs: Box::new(IrExpr::Local(i.clone())),
                            rhs: Box::new(IrExpr::Local(n.clone())),
                        },
                        then_branch: Box::new(IrStmt::new(IrOp::Break)),
                        else_branch: None,
                    }),
                    element,
                    IrStmt::new(IrOp::Assign {
                        target: IrExpr::Local(i.clone()),
                        value: IrExpr::Binary {
                            op: Operator::Add,
                            lhs: Box::new(IrExpr::Local(i.clone())),
                            rhs: Box::new(IrExpr::ConstUInt(1)),
                        },
                    }),
                ]));
                let mut stmts = vec![
                    IrStmt::at(
                        location.clone(),
                        IrOp::Let {
                            id: n.clone(),
                            init: Some(self.lower_expr(expr)),
                        },
                    ),
                    IrStmt::new(IrOp::Let {
                        id: i,
                        init: Some(IrExpr::ConstUInt(0)),
                    }),
                    IrStmt::new(IrOp::Let {
                        id: acc.clone(),
                        init: None,
                    }),
                    IrStmt::new(IrOp::Loop {
                        body: Box::new(loop_body),
                    }),
                ];
                stmts.extend(self.bind_field(field.as_ref(), Some(acc)));
                IrOp::Block(stmts)
            }
            ProductionKind::While { kind, body, field } => {
                self.emit_while(kind, body, field.as_ref(), location.clone())
            }
            ProductionKind::ForEach {
                body,
                eod_ok,
                field,
            } => {
                let acc = self.tmp("acc");
                let on_eod = if *eod_ok {
                    IrStmt::new(IrOp::Break)
                } else {
                    IrStmt::new(IrOp::Raise {
                        error: RuntimeErrorKind::ParseError,
                        message: "premature end of data".into(),
                    })
                };
                let element = self.element_stmts(body, field.as_ref(), &acc);
                let loop_body = IrStmt::new(IrOp::Block(vec![
                    IrStmt::new(IrOp::If {
                        cond: IrExpr::AtEod,
                        then_branch: Box::new(on_eod),
                        else_branch: None,
                    }),
                    element,
                ]));
                let mut stmts = vec![
                    IrStmt::new(IrOp::Let {
                        id: acc.clone(),
                        init: None,
                    }),
                    IrStmt::at(
                        location.clone(),
                        IrOp::Loop {
                            body: Box::new(loop_body),
                        },
                    ),
                ];
                stmts.extend(self.bind_field(field.as_ref(), Some(acc)));
                IrOp::Block(stmts)
            }
            ProductionKind::Skip { bytes } => {
                let bytes = self.lower_expr(bytes);
                IrOp::Block(vec![
                    IrStmt::at(location.clone(), IrOp::WaitFor {
                        bytes: bytes.clone(),
                    }),
                    IrStmt::new(IrOp::Advance { bytes }),
                ])
            }
            ProductionKind::Unit { body, .. } => self.emit_unit(body, location.clone()).op,
            ProductionKind::Deferred { resolved } => match resolved {
                Some(target) => return self.emit_child(target),
                None => crate::diagnostics::internal_error!(
                    "unpatched deferred '{}' reached code generation",
                    symbol
                ),
            },
        };
        IrStmt::at(location, op)
    }

    fn emit_while(
        &mut self,
        kind: &WhileKind,
        body: &Symbol,
        field: Option<&FieldRef>,
        location: Option<crate::Location>,
    ) -> IrOp {
        let acc = self.tmp("acc");
        let element = self.element_stmts(body, field, &acc);
        let loop_body = match kind {
            WhileKind::Until(cond) => IrStmt::new(IrOp::Block(vec![
                element,
                IrStmt::new(IrOp::If {
                    cond: self.lower_expr(cond),
                    then_branch: Box::new(IrStmt::new(IrOp::Break)),
                    else_branch: None,
                }),
            ])),
            WhileKind::Eod | WhileKind::Size(_) => IrStmt::new(IrOp::Block(vec![
                IrStmt::new(IrOp::If {
                    cond: IrExpr::AtEod,
                    then_branch: Box::new(IrStmt::new(IrOp::Break)),
                    else_branch: None,
                }),
                element,
            ])),
        };
        let mut repeat = IrStmt::new(IrOp::Loop {
            body: Box::new(loop_body),
        });
        if let WhileKind::Size(size) = kind {
            repeat = IrStmt::new(IrOp::LimitView {
                bytes: self.lower_expr(size),
                body: Box::new(repeat),
            });
        }
        let mut stmts = vec![
            IrStmt::at(
                location,
                IrOp::Let {
                    id: acc.clone(),
                    init: None,
                },
            ),
            repeat,
        ];
        stmts.extend(self.bind_field(field, Some(acc)));
        IrOp::Block(stmts)
    }

    /// Parse one repeated element into `acc`, firing foreach hooks.
    fn element_stmts(&mut self, body: &Symbol, field: Option<&FieldRef>, acc: &str) -> IrStmt {
        let dest = self.tmp("elem");
        let parse = match &self.grammar.get(body).kind.clone() {
            ProductionKind::Ctor { ctor, .. } => IrStmt::new(IrOp::MatchLiteral {
                token: literal_repr(ctor.ctor()),
                dest: Some(dest.clone()),
            }),
            ProductionKind::Variable { shape, .. } => IrStmt::new(IrOp::ReadBuiltin {
                spec: self.read_spec(shape),
                dest: Some(dest.clone()),
            }),
            ProductionKind::TypeLiteral { unit, .. } => IrStmt::new(IrOp::CallParser {
                unit: unit.clone(),
                dest: Some(dest.clone()),
            }),
            _ => self.emit_child(body),
        };
        let mut stmts = vec![
            parse,
            IrStmt::new(IrOp::Append {
                target: acc.to_string(),
                value: IrExpr::Local(dest),
            }),
        ];
        if let Some(FieldRef { id: Some(id), .. }) = field {
            stmts.extend(self.hook_calls(&HookKind::ForEach(id.clone())));
        }
        IrStmt::new(IrOp::Block(stmts))
    }

    fn emit_unit(&mut self, body: &Symbol, location: Option<crate::Location>) -> IrStmt {
        let mut stmts = Vec::new();
        // Capability setup is always emitted gated; FeatureRequirements
        // strips whatever the grammar does not declare.
        stmts.push(IrStmt::new(IrOp::FeatureGated {
            feature: Feature::Context,
            body: Box::new(IrStmt::new(IrOp::Let {
                id: "__ctx".into(),
                init: Some(IrExpr::Param("ctx".into())),
            })),
        }));
        stmts.push(IrStmt::new(IrOp::FeatureGated {
            feature: Feature::RandomAccess,
            body: Box::new(IrStmt::new(IrOp::RetainInput)),
        }));
        for (sink, policy, auto_trim) in self.grammar.sinks() {
            stmts.push(IrStmt::new(IrOp::FeatureGated {
                feature: Feature::Sinks,
                body: Box::new(IrStmt::new(IrOp::SinkSetup {
                    sink: sink.clone(),
                    policy: *policy,
                    auto_trim: *auto_trim,
                })),
            }));
        }
        if self.grammar.props().synchronize_at.is_some() {
            stmts.push(IrStmt::new(IrOp::Synchronize));
        }
        stmts.extend(self.hook_calls(&HookKind::Init));

        let mut attempt_body = vec![self.emit_child(body)];
        attempt_body.extend(self.hook_calls(&HookKind::Done));
        let mut handler = self.hook_calls(&HookKind::Error);
        handler.push(IrStmt::new(IrOp::Rethrow));

        stmts.push(IrStmt::new(IrOp::Attempt {
            body: Box::new(IrStmt::new(IrOp::Block(attempt_body))),
            handler: Box::new(IrStmt::new(IrOp::Block(handler))),
        }));
        IrStmt::at(location, IrOp::Block(stmts))
    }

    fn bind_field(&mut self, field: Option<&FieldRef>, dest: Option<String>) -> Vec<IrStmt> {
        let (field, dest) = match (field, dest) {
            (Some(f), Some(d)) => (f, d),
            _ => return Vec::new(),
        };
        let mut stmts = Vec::new();
        if let Some(requires) = &field.requires {
            stmts.push(IrStmt::new(IrOp::If {
                cond: IrExpr::Binary {
                    op: Operator::Eq,
                    lhs: Box::new(self.lower_expr(requires)),
                    rhs: Box::new(IrExpr::ConstBool(false)),
                },
                then_branch: Box::new(IrStmt::new(IrOp::Raise {
                    error: RuntimeErrorKind::ParseError,
                    message: format!(
                        "&requires failed for field '{}'",
                        field.id.as_deref().unwrap_or("<anon>")
                    ),
                })),
                else_branch: None,
            }));
        }
        let value = match &field.convert {
            Some(convert) => self.lower_expr(convert),
            None => IrExpr::Local(dest),
        };
        if let Some(id) = &field.id {
            stmts.push(IrStmt::new(IrOp::SetField {
                field: id.clone(),
                value,
            }));
            stmts.extend(self.hook_calls(&HookKind::Field(id.clone())));
        }
        stmts
    }

    /// The ordered dispatch block for one hook event. Hooks of a unit with
    /// `%context` receive the context bound at unit entry.
    fn hook_calls(&self, kind: &HookKind) -> Vec<IrStmt> {
        let context = self
            .grammar
            .props()
            .context
            .as_ref()
            .map(|_| "__ctx".to_string());
        let mut indexed: Vec<(usize, i64)> = self
            .grammar
            .hooks()
            .iter()
            .enumerate()
            .filter(|(_, h)| &h.kind == kind)
            .map(|(i, h)| (i, h.priority))
            .collect();
        indexed.sort_by_key(|(_, priority)| std::cmp::Reverse(*priority));
        indexed
            .into_iter()
            .map(|(index, priority)| {
                IrStmt::new(IrOp::HookRun {
                    function: hook_fn_name(self.grammar, index),
                    event: kind.label(),
                    priority,
                    context: context.clone(),
                })
            })
            .collect()
    }

    fn read_spec(&self, shape: &VarShape) -> ReadSpec {
        let little_endian = self.grammar.byte_order() == ByteOrder::Little;
        match shape {
            VarShape::Numeric { width, signed } => {
                if *signed {
                    ReadSpec::SInt {
                        width: *width,
                        little_endian,
                    }
                } else {
                    ReadSpec::UInt {
                        width: *width,
                        little_endian,
                    }
                }
            }
            VarShape::Bitfield { width } => ReadSpec::Bitfield {
                width: *width,
                little_endian,
            },
            VarShape::Bytes {
                size: Some(size), ..
            } => ReadSpec::BytesFixed(self.lower_expr(size)),
            VarShape::Bytes {
                until: Some(until), ..
            } => ReadSpec::BytesUntil(self.lower_expr(until)),
            VarShape::Bytes { chunked, .. } => ReadSpec::BytesEod { chunked: *chunked },
            VarShape::Opaque => ReadSpec::BytesEod { chunked: false },
        }
    }

    fn lower_expr(&self, node: &Node) -> IrExpr {
        lower_expr_inner(self.grammar, self.decls, node)
    }

    fn lower_stmt(&mut self, node: &Node) -> IrStmt {
        let location = node.meta.location().cloned();
        let op = match &node.kind {
            NodeKind::Stmt(stmt) => match stmt {
                Statement::Block => IrOp::Block(
                    node.children.iter().map(|c| self.lower_stmt(c)).collect(),
                ),
                Statement::Expr => IrOp::Eval(self.lower_expr(node.child(0))),
                Statement::Assign => IrOp::Assign {
                    target: self.lower_expr(node.child(0)),
                    value: self.lower_expr(node.child(1)),
                },
                Statement::If { has_else } => IrOp::If {
                    cond: self.lower_expr(node.child(0)),
                    then_branch: Box::new(self.lower_stmt(node.child(1))),
                    else_branch: if *has_else {
                        Some(Box::new(self.lower_stmt(node.child(2))))
                    } else {
                        None
                    },
                },
                Statement::Return { has_value } => IrOp::Return {
                    value: if *has_value {
                        Some(self.lower_expr(node.child(0)))
                    } else {
                        None
                    },
                },
                Statement::Print => IrOp::Print(
                    node.children.iter().map(|c| self.lower_expr(c)).collect(),
                ),
                Statement::Stop => IrOp::Stop,
                Statement::Reject => IrOp::Raise {
                    error: RuntimeErrorKind::ParseError,
                    message: "rejected by hook".into(),
                },
                Statement::Confirm => IrOp::Confirm,
            },
            NodeKind::Decl(Declaration::Local { id, .. }) => IrOp::Let {
                id: id.clone(),
                init: node.children.first().map(|c| self.lower_expr(c)),
            },
            _ => IrOp::Nop,
        };
        IrStmt::at(location, op)
    }

    fn entry_shapes(&mut self, parse_fn: &str) -> Registration {
        let base = mangle(self.grammar.name());
        let parse1 = format!("{}_parse1", base);
        let parse2 = format!("{}_parse2", base);
        let parse3 = format!("{}_parse3", base);

        // Units with %context register a factory the host calls to create
        // the context it then passes into the parse entries.
        let context_factory = self.grammar.props().context.clone().map(|ty| {
            let name = format!("{}_context_new", base);
            self.functions.push(IrFunction {
                name: name.clone(),
                params: vec![],
                exported: true,
                body: IrStmt::new(IrOp::Return {
                    value: Some(IrExpr::NewContext { ty }),
                }),
            });
            name
        });

        self.functions.push(IrFunction {
            name: parse1.clone(),
            params: vec!["stream".into(), "view".into(), "ctx".into()],
            exported: true,
            body: IrStmt::new(IrOp::Block(vec![
                IrStmt::new(IrOp::Let {
                    id: "self".into(),
                    init: None,
                }),
                IrStmt::new(IrOp::TailCall {
                    function: parse_fn.to_string(),
                }),
            ])),
        });
        self.functions.push(IrFunction {
            name: parse2.clone(),
            params: vec![
                "self".into(),
                "stream".into(),
                "view".into(),
                "ctx".into(),
            ],
            exported: true,
            body: IrStmt::new(IrOp::TailCall {
                function: parse_fn.to_string(),
            }),
        });
        self.functions.push(IrFunction {
            name: parse3.clone(),
            params: vec![
                "erased_self".into(),
                "stream".into(),
                "view".into(),
                "ctx".into(),
            ],
            exported: true,
            body: IrStmt::new(IrOp::TailCall {
                function: parse_fn.to_string(),
            }),
        });

        Registration {
            name: self.grammar.name().to_string(),
            description: self.grammar.props().description.clone(),
            mime_types: self.grammar.props().mime_types.clone(),
            parse1,
            parse2,
            parse3,
            context_factory,
        }
    }
}

fn lower_expr_inner(grammar: &Grammar, decls: &DeclTable, node: &Node) -> IrExpr {
    let expr = match node.as_expr() {
        Some(e) => e,
        None => {
            if let NodeKind::Ctor(_) = node.kind {
                return lower_ctor(node);
            }
            return IrExpr::Local(format!("<unsupported {}>", node.label()));
        }
    };
    match &expr.kind {
        ExprKind::Ctor => lower_ctor(node.child(0)),
        ExprKind::Name { id, resolved } => match resolved {
            Some(qualified) => {
                if let Some(DeclInfoKind::EnumLabel { enum_name, value }) =
                    decls.get(qualified).map(|i| &i.kind)
                {
                    return IrExpr::EnumLabel {
                        name: enum_name.clone(),
                        value: *value,
                    };
                }
                match qualified.strip_prefix(&format!("{}::", grammar.name())) {
                    Some(field) => IrExpr::SelfField(field.to_string()),
                    None => IrExpr::Local(qualified.clone()),
                }
            }
            None => IrExpr::Local(id.clone()),
        },
        ExprKind::SelfRef => IrExpr::Local("self".into()),
        ExprKind::Dollar => IrExpr::Dollar,
        ExprKind::Member { id } => {
            let base = lower_expr_inner(grammar, decls, node.child(0));
            match base {
                IrExpr::Local(ref name) if name == "self" => IrExpr::SelfField(id.clone()),
                other => IrExpr::Field {
                    base: Box::new(other),
                    id: id.clone(),
                },
            }
        }
        ExprKind::Operator { op, .. } => match op {
            Operator::Size => IrExpr::Size(Box::new(lower_expr_inner(
                grammar,
                decls,
                node.child(0),
            ))),
            _ => IrExpr::Binary {
                op: *op,
                lhs: Box::new(lower_expr_inner(grammar, decls, node.child(0))),
                rhs: Box::new(lower_expr_inner(grammar, decls, node.child(1))),
            },
        },
        ExprKind::Coerced | ExprKind::PendingCoerced => IrExpr::Convert {
            to: expr.ty.ty.to_string(),
            inner: Box::new(lower_expr_inner(grammar, decls, node.child(0))),
        },
        ExprKind::UnresolvedOperator { op } => {
            IrExpr::Local(format!("<unresolved {}>", op.symbol()))
        }
    }
}

fn lower_ctor(node: &Node) -> IrExpr {
    match node.ctor() {
        Ctor::Bool(b) => IrExpr::ConstBool(*b),
        Ctor::UInt { value, .. } => IrExpr::ConstUInt(*value),
        Ctor::SInt { value, .. } => IrExpr::ConstSInt(*value),
        Ctor::Real(r) => IrExpr::ConstReal(*r),
        Ctor::Bytes(b) => IrExpr::ConstBytes(b.clone()),
        Ctor::Str(s) => IrExpr::ConstString(s.clone()),
        other => IrExpr::ConstString(other.brief()),
    }
}
