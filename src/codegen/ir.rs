use crate::codegen::{IrExpr, IrFunction, IrOp, IrStmt, ParserModule, ReadSpec};
use std::fmt::{Display, Formatter, Write};

impl Display for IrExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IrExpr::ConstBool(b) => write!(f, "{}", b),
            IrExpr::ConstUInt(v) => write!(f, "{}", v),
            IrExpr::ConstSInt(v) => write!(f, "{}", v),
            IrExpr::ConstReal(v) => write!(f, "{}", v),
            IrExpr::ConstBytes(b) => write!(f, "b\"{}\"", crate::ast::escape_bytes(b)),
            IrExpr::ConstString(s) => write!(f, "\"{}\"", s),
            IrExpr::Local(id) => write!(f, "{}", id),
            IrExpr::Param(id) => write!(f, "%{}", id),
            IrExpr::SelfField(id) => write!(f, "self.{}", id),
            IrExpr::Dollar => write!(f, "$$"),
            IrExpr::Field { base, id } => write!(f, "{}.{}", base, id),
            IrExpr::Binary { op, lhs, rhs } => {
                write!(f, "({} {} {})", lhs, op.symbol(), rhs)
            }
            IrExpr::Size(inner) => write!(f, "|{}|", inner),
            IrExpr::Convert { to, inner } => write!(f, "({} as {})", inner, to),
            IrExpr::EnumLabel { name, value } => write!(f, "{}({})", name, value),
            IrExpr::NewContext { ty } => write!(f, "new-context<{}>", ty),
            IrExpr::AtEod => write!(f, "at_eod()"),
            IrExpr::StreamRemaining => write!(f, "size_remaining()"),
        }
    }
}

impl Display for ReadSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let order = |little: &bool| if *little { "le" } else { "be" };
        match self {
            ReadSpec::UInt {
                width,
                little_endian,
            } => write!(f, "uint{}/{}", width, order(little_endian)),
            ReadSpec::SInt {
                width,
                little_endian,
            } => write!(f, "int{}/{}", width, order(little_endian)),
            ReadSpec::Bitfield {
                width,
                little_endian,
            } => write!(f, "bitfield{}/{}", width, order(little_endian)),
            ReadSpec::BytesFixed(n) => write!(f, "bytes[{}]", n),
            ReadSpec::BytesUntil(t) => write!(f, "bytes until {}", t),
            ReadSpec::BytesEod { chunked } => {
                write!(f, "bytes to eod{}", if *chunked { " chunked" } else { "" })
            }
        }
    }
}

impl IrStmt {
    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match &self.op {
            IrOp::Block(stmts) => {
                for stmt in stmts {
                    stmt.render_into(out, indent);
                }
            }
            IrOp::Nop => {}
            IrOp::Let { id, init } => {
                match init {
                    Some(e) => writeln!(out, "{}let {} = {}", pad, id, e),
                    None => writeln!(out, "{}let {}", pad, id),
                }
                .unwrap();
            }
            IrOp::Assign { target, value } => {
                writeln!(out, "{}{} = {}", pad, target, value).unwrap()
            }
            IrOp::SetField { field, value } => {
                writeln!(out, "{}self.{} = {}", pad, field, value).unwrap()
            }
            IrOp::If {
                cond,
                then_branch,
                else_branch,
            } => {
                writeln!(out, "{}if {} {{", pad, cond).unwrap();
                then_branch.render_into(out, indent + 1);
                if let Some(e) = else_branch {
                    writeln!(out, "{}}} else {{", pad).unwrap();
                    e.render_into(out, indent + 1);
                }
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::Loop { body } => {
                writeln!(out, "{}loop {{", pad).unwrap();
                body.render_into(out, indent + 1);
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::Break => writeln!(out, "{}break", pad).unwrap(),
            IrOp::MatchLiteral { token, dest } => match dest {
                Some(d) => writeln!(out, "{}{} = match-literal {}", pad, d, token).unwrap(),
                None => writeln!(out, "{}match-literal {}", pad, token).unwrap(),
            },
            IrOp::ReadBuiltin { spec, dest } => match dest {
                Some(d) => writeln!(out, "{}{} = read {}", pad, d, spec).unwrap(),
                None => writeln!(out, "{}read {}", pad, spec).unwrap(),
            },
            IrOp::PeekDispatch { arms, otherwise } => {
                writeln!(out, "{}peek-dispatch {{", pad).unwrap();
                for (tokens, stmt) in arms {
                    let set: Vec<String> = tokens.iter().map(|t| t.0.to_string()).collect();
                    writeln!(out, "{}  on {{{}}}:", pad, set.join(", ")).unwrap();
                    stmt.render_into(out, indent + 2);
                }
                writeln!(out, "{}  otherwise:", pad).unwrap();
                otherwise.render_into(out, indent + 2);
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::SwitchDispatch {
                discriminant,
                arms,
                default,
            } => {
                writeln!(out, "{}switch {} {{", pad, discriminant).unwrap();
                for (labels, stmt) in arms {
                    let rendered: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
                    writeln!(out, "{}  case {}:", pad, rendered.join(", ")).unwrap();
                    stmt.render_into(out, indent + 2);
                }
                if let Some(d) = default {
                    writeln!(out, "{}  default:", pad).unwrap();
                    d.render_into(out, indent + 2);
                }
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::LimitView { bytes, body } => {
                writeln!(out, "{}limit-view {} {{", pad, bytes).unwrap();
                body.render_into(out, indent + 1);
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::Advance { bytes } => writeln!(out, "{}advance {}", pad, bytes).unwrap(),
            IrOp::WaitFor { bytes } => writeln!(out, "{}wait-for {}", pad, bytes).unwrap(),
            IrOp::Synchronize => writeln!(out, "{}synchronize", pad).unwrap(),
            IrOp::RetainInput => writeln!(out, "{}retain-input", pad).unwrap(),
            IrOp::CallParser { unit, dest } => match dest {
                Some(d) => writeln!(out, "{}{} = parse {}", pad, d, unit).unwrap(),
                None => writeln!(out, "{}parse {}", pad, unit).unwrap(),
            },
            IrOp::TailCall { function } => writeln!(out, "{}tail-call {}", pad, function).unwrap(),
            IrOp::HookRun {
                function,
                event,
                priority,
                context,
            } => {
                let with = match context {
                    Some(c) => format!(" with {}", c),
                    None => String::new(),
                };
                writeln!(
                    out,
                    "{}hook {} -> {} (priority {}){}",
                    pad, event, function, priority, with
                )
                .unwrap()
            }
            IrOp::Append { target, value } => {
                writeln!(out, "{}{}.push({})", pad, target, value).unwrap()
            }
            IrOp::SinkSetup {
                sink,
                policy,
                auto_trim,
            } => writeln!(
                out,
                "{}sink-setup {} policy={:?} auto_trim={}",
                pad, sink, policy, auto_trim
            )
            .unwrap(),
            IrOp::Attempt { body, handler } => {
                writeln!(out, "{}attempt {{", pad).unwrap();
                body.render_into(out, indent + 1);
                writeln!(out, "{}}} on-error {{", pad).unwrap();
                handler.render_into(out, indent + 1);
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::Rethrow => writeln!(out, "{}rethrow", pad).unwrap(),
            IrOp::Raise { error, message } => {
                writeln!(out, "{}raise {} \"{}\"", pad, error, message).unwrap()
            }
            IrOp::Confirm => writeln!(out, "{}confirm", pad).unwrap(),
            IrOp::Stop => writeln!(out, "{}stop", pad).unwrap(),
            IrOp::Return { value } => match value {
                Some(v) => writeln!(out, "{}return {}", pad, v).unwrap(),
                None => writeln!(out, "{}return", pad).unwrap(),
            },
            IrOp::FeatureGated { feature, body } => {
                writeln!(out, "{}feature {:?} {{", pad, feature).unwrap();
                body.render_into(out, indent + 1);
                writeln!(out, "{}}}", pad).unwrap();
            }
            IrOp::Print(exprs) => {
                let rendered: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                writeln!(out, "{}print {}", pad, rendered.join(", ")).unwrap();
            }
            IrOp::Eval(e) => writeln!(out, "{}eval {}", pad, e).unwrap(),
        }
    }
}

impl IrFunction {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let exported = if self.exported { "export " } else { "" };
        writeln!(
            out,
            "{}fn {}({}) {{",
            exported,
            self.name,
            self.params.join(", ")
        )
        .unwrap();
        self.body.render_into(&mut out, 1);
        out.push_str("}\n");
        out
    }
}

impl ParserModule {
    /// Human-readable dump of the whole module for debugging.
    pub fn render(&self) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "parser {} (mime: [{}])",
            self.unit,
            self.registration.mime_types.join(", ")
        )
        .unwrap();
        for function in &self.functions {
            out.push('\n');
            out.push_str(&function.render());
        }
        out
    }
}
