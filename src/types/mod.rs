//! The type system: the [Type] sum, qualified wrappers, the unifier that
//! produces canonical unification strings, and the coercion lattice.
mod coercion;
mod unifier;

pub use coercion::{CoercionFailure, CoercionKind, CoercionStyle, Coercer, MatchClass};
pub use unifier::Unifier;

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constness {
    Const,
    Mutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    LValue,
    RValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefFlavor {
    Strong,
    Weak,
    Value,
}

#[derive(Debug, Clone, PartialEq)]
/// An unqualified type.
///
/// Nominal types (units, enums, aliases) are referenced through
/// [Name](Type::Name) carrying the fully qualified declaration path; the
/// referenced declaration is never owned, so cyclic types (units referring to
/// themselves) stay acyclic in memory.
pub enum Type {
    Bool,
    Void,
    Null,
    Str,
    Bytes,
    Address,
    Network,
    Port,
    Interval,
    Time,
    Real,
    Regexp,
    Stream,
    Sink,
    Error,
    UInt(u8),
    SInt(u8),
    Optional(Box<Type>),
    Result(Box<Type>),
    Set(Box<Type>),
    List(Box<Type>),
    Vector(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Tuple(Vec<Type>),
    Reference {
        flavor: RefFlavor,
        inner: Box<Type>,
    },
    Struct(Vec<(String, Type)>),
    Union(Vec<(String, Type)>),
    Bitfield {
        width: u8,
        bits: Vec<(String, u8, u8)>,
    },
    Exception,
    /// Inference placeholder.
    Auto,
    Unknown,
    Any,
    TypeOf(Box<Type>),
    /// An externally defined type known only by name.
    Library(String),
    /// An identifier not yet bound by the resolver.
    UnresolvedId(String),
    /// A bound nominal reference (unit, enum, or alias), fully qualified.
    Name(String),
    /// A member of a not-yet-known type, e.g. an enum label used before its
    /// enum resolves.
    Member(String),
}

impl Type {
    pub fn uint(width: u8) -> Type {
        Type::UInt(width)
    }

    pub fn sint(width: u8) -> Type {
        Type::SInt(width)
    }

    pub fn vector(element: Type) -> Type {
        Type::Vector(Box::new(element))
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    pub fn strong_ref(inner: Type) -> Type {
        Type::Reference {
            flavor: RefFlavor::Strong,
            inner: Box::new(inner),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::UInt(_) | Type::SInt(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Type::Real)
    }

    /// Whether every transitive reference of the type has been bound.
    pub fn is_resolved(&self) -> bool {
        match self {
            Type::UnresolvedId(_) | Type::Member(_) | Type::Auto => false,
            Type::Optional(t)
            | Type::Result(t)
            | Type::Set(t)
            | Type::List(t)
            | Type::Vector(t)
            | Type::TypeOf(t)
            | Type::Reference { inner: t, .. } => t.is_resolved(),
            Type::Map(k, v) => k.is_resolved() && v.is_resolved(),
            Type::Tuple(ts) => ts.iter().all(Type::is_resolved),
            Type::Struct(fs) | Type::Union(fs) => fs.iter().all(|(_, t)| t.is_resolved()),
            _ => true,
        }
    }

    // Capability flags. These stand in for the trait sets of the original
    // deep class hierarchy.

    /// Whether values of the type can be default-constructed by generated
    /// code.
    pub fn is_allocable(&self) -> bool {
        !matches!(
            self,
            Type::Void | Type::Auto | Type::Unknown | Type::Any | Type::TypeOf(_)
        )
    }

    pub fn is_sortable(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Str
                | Type::Bytes
                | Type::Address
                | Type::Port
                | Type::Interval
                | Type::Time
                | Type::UInt(_)
                | Type::SInt(_)
                | Type::Real
        )
    }

    /// Whether the type is a nominal reference.
    pub fn is_name_type(&self) -> bool {
        matches!(self, Type::Name(_) | Type::UnresolvedId(_))
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(
            self,
            Type::Optional(_)
                | Type::Result(_)
                | Type::Set(_)
                | Type::List(_)
                | Type::Vector(_)
                | Type::Map(_, _)
                | Type::Tuple(_)
                | Type::Reference { .. }
        )
    }

    /// Strip reference wrappers, counting how many were removed.
    pub fn deref_chain(&self) -> (&Type, u8) {
        let mut ty = self;
        let mut count = 0;
        while let Type::Reference { inner, .. } = ty {
            ty = inner;
            count += 1;
        }
        (ty, count)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Str => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::Address => write!(f, "address"),
            Type::Network => write!(f, "network"),
            Type::Port => write!(f, "port"),
            Type::Interval => write!(f, "interval"),
            Type::Time => write!(f, "time"),
            Type::Real => write!(f, "real"),
            Type::Regexp => write!(f, "regexp"),
            Type::Stream => write!(f, "stream"),
            Type::Sink => write!(f, "sink"),
            Type::Error => write!(f, "error"),
            Type::UInt(w) => write!(f, "uint{}", w),
            Type::SInt(w) => write!(f, "int{}", w),
            Type::Optional(t) => write!(f, "optional<{}>", t),
            Type::Result(t) => write!(f, "result<{}>", t),
            Type::Set(t) => write!(f, "set<{}>", t),
            Type::List(t) => write!(f, "list<{}>", t),
            Type::Vector(t) => write!(f, "vector<{}>", t),
            Type::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Type::Tuple(ts) => {
                write!(f, "tuple<")?;
                for (i, t) in ts.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ">")
            }
            Type::Reference { flavor, inner } => {
                let prefix = match flavor {
                    RefFlavor::Strong => "strong_ref",
                    RefFlavor::Weak => "weak_ref",
                    RefFlavor::Value => "value_ref",
                };
                write!(f, "{}<{}>", prefix, inner)
            }
            Type::Struct(fields) => {
                write!(f, "struct {{ ")?;
                for (id, t) in fields {
                    write!(f, "{}: {}; ", id, t)?;
                }
                write!(f, "}}")
            }
            Type::Union(fields) => {
                write!(f, "union {{ ")?;
                for (id, t) in fields {
                    write!(f, "{}: {}; ", id, t)?;
                }
                write!(f, "}}")
            }
            Type::Bitfield { width, .. } => write!(f, "bitfield({})", width),
            Type::Exception => write!(f, "exception"),
            Type::Auto => write!(f, "auto"),
            Type::Unknown => write!(f, "unknown"),
            Type::Any => write!(f, "any"),
            Type::TypeOf(t) => write!(f, "type-of {}", t),
            Type::Library(name) => write!(f, "library(\"{}\")", name),
            Type::UnresolvedId(id) => write!(f, "unresolved-id({})", id),
            Type::Name(id) => write!(f, "{}", id),
            Type::Member(id) => write!(f, "member({})", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A type together with its constness and value-category side.
pub struct QualifiedType {
    pub ty: Type,
    pub constness: Constness,
    pub side: Side,
}

impl QualifiedType {
    /// A const R-value of the given type, the default qualification for
    /// computed expressions.
    pub fn rvalue(ty: Type) -> Self {
        Self {
            ty,
            constness: Constness::Const,
            side: Side::RValue,
        }
    }

    /// A mutable L-value, used for storage slots.
    pub fn lvalue(ty: Type) -> Self {
        Self {
            ty,
            constness: Constness::Mutable,
            side: Side::LValue,
        }
    }

    pub fn auto() -> Self {
        Self::rvalue(Type::Auto)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.ty, Type::Auto)
    }

    pub fn is_resolved(&self) -> bool {
        self.ty.is_resolved()
    }
}

impl Display for QualifiedType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.constness == Constness::Const && self.side == Side::RValue {
            write!(f, "{}", self.ty)
        } else {
            let c = match self.constness {
                Constness::Const => "const",
                Constness::Mutable => "mut",
            };
            let s = match self.side {
                Side::LValue => "lhs",
                Side::RValue => "rhs",
            };
            write!(f, "{} {} {}", c, s, self.ty)
        }
    }
}
