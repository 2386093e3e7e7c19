use crate::ast::escape_bytes;
use crate::grammar::{Grammar, Production, ProductionKind, Symbol, TokenId, VarShape, WhileKind};
use std::collections::HashSet;
use std::fmt::{Display, Formatter, Write};

impl Production {
    /// Whether the production is a literal and therefore contributes a
    /// token to look-ahead sets.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ProductionKind::Ctor { .. })
    }

    /// Symbols of the direct children, in left-to-right order.
    pub fn children(&self) -> Vec<&Symbol> {
        match &self.kind {
            ProductionKind::Epsilon
            | ProductionKind::Ctor { .. }
            | ProductionKind::TypeLiteral { .. }
            | ProductionKind::Variable { .. }
            | ProductionKind::Skip { .. } => Vec::new(),
            ProductionKind::Reference { to } => vec![to],
            ProductionKind::Sequence { elements } | ProductionKind::Block { items: elements } => {
                elements.iter().collect()
            }
            ProductionKind::LookAhead { alt_a, alt_b, .. } => vec![alt_a, alt_b],
            ProductionKind::Switch { cases, default, .. } => {
                let mut children: Vec<&Symbol> = cases.iter().map(|(_, s)| s).collect();
                if let Some(d) = default {
                    children.push(d);
                }
                children
            }
            ProductionKind::Counter { body, .. }
            | ProductionKind::While { body, .. }
            | ProductionKind::ForEach { body, .. }
            | ProductionKind::Unit { body, .. } => vec![body],
            ProductionKind::Deferred { resolved } => resolved.iter().collect(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ProductionKind::Epsilon => "epsilon",
            ProductionKind::Ctor { .. } => "ctor",
            ProductionKind::TypeLiteral { .. } => "type-literal",
            ProductionKind::Variable { .. } => "variable",
            ProductionKind::Reference { .. } => "reference",
            ProductionKind::Sequence { .. } => "sequence",
            ProductionKind::LookAhead { .. } => "look-ahead",
            ProductionKind::Switch { .. } => "switch",
            ProductionKind::Counter { .. } => "counter",
            ProductionKind::While { .. } => "while",
            ProductionKind::ForEach { .. } => "for-each",
            ProductionKind::Skip { .. } => "skip",
            ProductionKind::Unit { .. } => "unit",
            ProductionKind::Block { .. } => "block",
            ProductionKind::Deferred { .. } => "deferred",
        }
    }
}

impl Display for Production {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ProductionKind::Epsilon => write!(f, "()"),
            ProductionKind::Ctor { ctor, .. } => write!(f, "{}", ctor.ctor().brief()),
            ProductionKind::TypeLiteral { unit, .. } => write!(f, "<{}>", unit),
            ProductionKind::Variable { ty, shape, .. } => match shape {
                VarShape::Bytes { .. } => write!(f, "bytes"),
                _ => write!(f, "{}", ty.ty),
            },
            ProductionKind::Reference { to } => write!(f, "&{}", to),
            ProductionKind::Sequence { elements } => {
                for (i, e) in elements.iter().enumerate() {
                    if i != 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
            ProductionKind::LookAhead {
                alt_a,
                alt_b,
                lahs_a,
                lahs_b,
            } => {
                write!(
                    f,
                    "{{{}}}: {} | {{{}}}: {}",
                    render_set(lahs_a),
                    alt_a,
                    render_set(lahs_b),
                    alt_b
                )
            }
            ProductionKind::Switch { cases, default, .. } => {
                for (i, (labels, symbol)) in cases.iter().enumerate() {
                    if i != 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "[{}] -> {}", labels.len(), symbol)?;
                }
                if let Some(d) = default {
                    write!(f, " | * -> {}", d)?;
                }
                Ok(())
            }
            ProductionKind::Counter { body, .. } => write!(f, "{}^n", body),
            ProductionKind::While { body, kind, .. } => match kind {
                WhileKind::Eod => write!(f, "{}* &eod", body),
                WhileKind::Until(_) => write!(f, "{}* &until", body),
                WhileKind::Size(_) => write!(f, "{}* &size", body),
            },
            ProductionKind::ForEach { body, eod_ok, .. } => {
                write!(f, "{}* foreach{}", body, if *eod_ok { " &eod-ok" } else { "" })
            }
            ProductionKind::Skip { .. } => write!(f, "skip"),
            ProductionKind::Unit { unit, body } => write!(f, "unit {} -> {}", unit, body),
            ProductionKind::Block { items } => {
                write!(f, "{{ ")?;
                for item in items {
                    write!(f, "{} ", item)?;
                }
                write!(f, "}}")
            }
            ProductionKind::Deferred { resolved } => match resolved {
                Some(s) => write!(f, "deferred -> {}", s),
                None => write!(f, "deferred <unpatched>"),
            },
        }
    }
}

fn render_set(set: &std::collections::BTreeSet<TokenId>) -> String {
    set.iter()
        .map(|t| t.0.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Grammar {
    /// Write the grammar as a rule listing, one production per symbol,
    /// reachable symbols first.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut writer = String::new();
        let mut visited = HashSet::new();
        writeln!(writer, "grammar {} (root {})", self.name(), self.root())?;
        self.render_symbol(self.root(), &mut writer, &mut visited)?;
        for symbol in self.symbols() {
            self.render_symbol(symbol, &mut writer, &mut visited)?;
        }
        Ok(writer)
    }

    fn render_symbol(
        &self,
        symbol: &Symbol,
        writer: &mut String,
        visited: &mut HashSet<Symbol>,
    ) -> std::fmt::Result {
        if !visited.insert(symbol.clone()) {
            return Ok(());
        }
        let production = self.get(symbol);
        let mut flags = String::new();
        if self.is_nullable(symbol) {
            flags.push_str(" <nullable>");
        }
        if let Some(token) = self.token_of(symbol) {
            write!(flags, " <token {}>", token.0)?;
        }
        writeln!(writer, "{:>24} : {}{}", symbol.to_string(), production, flags)?;
        for child in production.children() {
            self.render_symbol(child, writer, visited)?;
        }
        Ok(())
    }

    /// Render the token table, mirroring the order of assignment.
    pub fn render_tokens(&self) -> String {
        let mut out = String::new();
        for token in self.tokens() {
            out.push_str(&format!("{:>6} {}\n", token.id.0, token.repr));
        }
        out
    }
}

/// Canonical representation of a literal ctor, the input to token-ID
/// hashing. Distinct literals must render distinctly; identical literals
/// must render identically so they share one token.
pub fn literal_repr(ctor: &crate::ast::Ctor) -> String {
    use crate::ast::Ctor;
    match ctor {
        Ctor::Bytes(b) => format!("bytes(\"{}\")", escape_bytes(b)),
        Ctor::Str(s) => format!("string(\"{}\")", s),
        Ctor::Regexp(p) => format!("regexp(/{}/)", p),
        Ctor::UInt { width, value } => format!("uint({}, {})", width, value),
        Ctor::SInt { width, value } => format!("int({}, {})", width, value),
        Ctor::Bool(b) => format!("bool({})", b),
        Ctor::Bitfield { width, bits } => {
            let mut out = format!("bitfield({}", width);
            for bit in bits {
                out.push_str(&format!(", {}:{}..{}", bit.id, bit.low, bit.high));
                if let Some(v) = bit.value {
                    out.push_str(&format!("={}", v));
                }
            }
            out.push(')');
            out
        }
        other => format!("{}", other.brief()),
    }
}
