use crate::scope::{DeclInfoKind, DeclTable};
use crate::types::{Constness, QualifiedType, RefFlavor, Side, Type};
use std::fmt::Write;

/// Produces the *unification string* of a type: a canonical textual encoding
/// in which structural types expand fully and nominal types collapse to
/// their qualified name. Two unqualified types are equal iff their strings
/// are identical.
///
/// Serialization runs post-order; a per-visit seen list breaks cycles
/// through nominal references by emitting a `@<n>` back-reference token for
/// a name that is already on the expansion stack.
pub struct Unifier<'d> {
    decls: &'d DeclTable,
}

impl<'d> Unifier<'d> {
    pub fn new(decls: &'d DeclTable) -> Self {
        Self { decls }
    }

    pub fn unify(&self, ty: &Type) -> String {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.serialize(ty, &mut out, &mut seen);
        out
    }

    pub fn unify_qualified(&self, ty: &QualifiedType) -> String {
        let mut out = String::new();
        match ty.constness {
            Constness::Const => out.push_str("const "),
            Constness::Mutable => out.push_str("mut "),
        }
        match ty.side {
            Side::LValue => out.push_str("lhs "),
            Side::RValue => out.push_str("rhs "),
        }
        let mut seen = Vec::new();
        self.serialize(&ty.ty, &mut out, &mut seen);
        out
    }

    /// Whether two unqualified types accept the same values.
    pub fn equal(&self, a: &Type, b: &Type) -> bool {
        self.unify(a) == self.unify(b)
    }

    fn serialize(&self, ty: &Type, out: &mut String, seen: &mut Vec<String>) {
        match ty {
            Type::Bool => out.push_str("bool"),
            Type::Void => out.push_str("void"),
            Type::Null => out.push_str("null"),
            Type::Str => out.push_str("string"),
            Type::Bytes => out.push_str("bytes"),
            Type::Address => out.push_str("address"),
            Type::Network => out.push_str("network"),
            Type::Port => out.push_str("port"),
            Type::Interval => out.push_str("interval"),
            Type::Time => out.push_str("time"),
            Type::Real => out.push_str("real"),
            Type::Regexp => out.push_str("regexp"),
            Type::Stream => out.push_str("stream"),
            Type::Sink => out.push_str("sink"),
            Type::Error => out.push_str("error"),
            Type::Exception => out.push_str("exception"),
            Type::UInt(w) => write!(out, "uint({})", w).unwrap(),
            Type::SInt(w) => write!(out, "int({})", w).unwrap(),
            Type::Optional(t) => self.wrap("optional", t, out, seen),
            Type::Result(t) => self.wrap("result", t, out, seen),
            Type::Set(t) => self.wrap("set", t, out, seen),
            Type::List(t) => self.wrap("list", t, out, seen),
            Type::Vector(t) => self.wrap("vector", t, out, seen),
            Type::TypeOf(t) => self.wrap("type-of", t, out, seen),
            Type::Map(k, v) => {
                out.push_str("map(");
                self.serialize(k, out, seen);
                out.push_str(", ");
                self.serialize(v, out, seen);
                out.push(')');
            }
            Type::Tuple(ts) => {
                out.push_str("tuple(");
                for (i, t) in ts.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    self.serialize(t, out, seen);
                }
                out.push(')');
            }
            Type::Reference { flavor, inner } => {
                let tag = match flavor {
                    RefFlavor::Strong => "strong-ref",
                    RefFlavor::Weak => "weak-ref",
                    RefFlavor::Value => "value-ref",
                };
                self.wrap(tag, inner, out, seen);
            }
            Type::Struct(fields) => self.fields("struct", fields, out, seen),
            Type::Union(fields) => self.fields("union", fields, out, seen),
            Type::Bitfield { width, bits } => {
                write!(out, "bitfield({}", width).unwrap();
                for (id, low, high) in bits {
                    write!(out, ", {}:{}..{}", id, low, high).unwrap();
                }
                out.push(')');
            }
            Type::Auto => out.push_str("auto"),
            Type::Unknown => out.push_str("unknown"),
            Type::Any => out.push_str("any"),
            Type::Library(name) => write!(out, "library({})", name).unwrap(),
            Type::UnresolvedId(id) => write!(out, "unresolved-id({})", id).unwrap(),
            Type::Member(id) => write!(out, "member({})", id).unwrap(),
            Type::Name(qualified) => {
                if let Some(position) = seen.iter().position(|s| s == qualified) {
                    write!(out, "@{}", position).unwrap();
                    return;
                }
                match self.decls.get(qualified).map(|i| &i.kind) {
                    // Nominal types collapse to their qualified name.
                    Some(DeclInfoKind::Unit { .. }) => {
                        write!(out, "unit({})", qualified).unwrap()
                    }
                    Some(DeclInfoKind::Enum { .. }) => {
                        write!(out, "enum({})", qualified).unwrap()
                    }
                    // Aliases are transparent and expand to their target.
                    Some(DeclInfoKind::Alias { ty }) => {
                        seen.push(qualified.clone());
                        self.serialize(&ty.ty.clone(), out, seen);
                        seen.pop();
                    }
                    _ => write!(out, "name({})", qualified).unwrap(),
                }
            }
        }
    }

    fn wrap(&self, tag: &str, inner: &Type, out: &mut String, seen: &mut Vec<String>) {
        out.push_str(tag);
        out.push('(');
        self.serialize(inner, out, seen);
        out.push(')');
    }

    fn fields(
        &self,
        tag: &str,
        fields: &[(String, Type)],
        out: &mut String,
        seen: &mut Vec<String>,
    ) {
        out.push_str(tag);
        out.push('(');
        for (i, (id, t)) in fields.iter().enumerate() {
            if i != 0 {
                out.push_str(", ");
            }
            write!(out, "{}: ", id).unwrap();
            self.serialize(t, out, seen);
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{DeclInfo, DeclInfoKind, DeclTable};
    use crate::NodeId;

    fn table_with_alias(name: &str, ty: Type) -> DeclTable {
        let mut table = DeclTable::default();
        table.insert(DeclInfo {
            node: NodeId(0),
            qualified: name.to_string(),
            kind: DeclInfoKind::Alias {
                ty: QualifiedType::rvalue(ty),
            },
        });
        table
    }

    #[test]
    fn structural_types_expand() {
        let table = DeclTable::default();
        let unifier = Unifier::new(&table);
        let a = Type::Struct(vec![
            ("a".into(), Type::UInt(8)),
            ("b".into(), Type::Bytes),
        ]);
        let b = Type::Struct(vec![
            ("a".into(), Type::UInt(8)),
            ("b".into(), Type::Bytes),
        ]);
        assert_eq!(unifier.unify(&a), unifier.unify(&b));
        assert!(unifier.equal(&a, &b));

        let c = Type::Struct(vec![
            ("a".into(), Type::UInt(8)),
            ("b".into(), Type::Bytes),
            ("c".into(), Type::Bool),
        ]);
        assert_ne!(unifier.unify(&a), unifier.unify(&c));
    }

    #[test]
    fn alias_is_transparent() {
        let table = table_with_alias("M::Small", Type::UInt(8));
        let unifier = Unifier::new(&table);
        assert!(unifier.equal(&Type::Name("M::Small".into()), &Type::UInt(8)));
    }

    #[test]
    fn cyclic_alias_emits_back_reference() {
        // An alias whose expansion mentions itself must terminate.
        let table = table_with_alias(
            "M::Chain",
            Type::Optional(Box::new(Type::Name("M::Chain".into()))),
        );
        let unifier = Unifier::new(&table);
        let s = unifier.unify(&Type::Name("M::Chain".into()));
        assert!(s.contains("@0"), "expected back-reference in {}", s);
    }
}
