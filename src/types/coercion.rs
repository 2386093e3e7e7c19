use crate::ast::{Ctor, ExprKind, Expression, Node, NodeKind};
use crate::scope::{DeclInfoKind, DeclTable};
use crate::types::{QualifiedType, Side, Type, Unifier};
use crate::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a coercion request is allowed to bend the type: implicitly at any use
/// site, through an explicit cast, through a constructor-style function
/// call, or as a try-coercion whose target may still be under inference.
pub struct CoercionStyle {
    pub implicit: bool,
    pub explicit_cast: bool,
    pub function_call: bool,
    pub try_coercion: bool,
}

impl CoercionStyle {
    pub const IMPLICIT: CoercionStyle = CoercionStyle {
        implicit: true,
        explicit_cast: false,
        function_call: false,
        try_coercion: false,
    };

    pub const EXPLICIT: CoercionStyle = CoercionStyle {
        implicit: true,
        explicit_cast: true,
        function_call: true,
        try_coercion: false,
    };

    pub const TRY: CoercionStyle = CoercionStyle {
        implicit: true,
        explicit_cast: false,
        function_call: false,
        try_coercion: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Ranking of a successful coercion, used when scoring operator candidates.
pub enum MatchClass {
    Exact,
    Implicit,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercionKind {
    Identity,
    ConstRelaxation,
    Dereference(u8),
    NumericWidening,
    NumericLiteralNarrowing,
    OptionalPromotion,
    NullToOptional,
    ResultPromotion,
    ErrorToResult,
    ContainerWidening,
    TupleToStruct,
    BytesLiteral,
    EnumFromLiteral,
}

impl CoercionKind {
    pub fn class(&self) -> MatchClass {
        match self {
            CoercionKind::Identity | CoercionKind::ConstRelaxation => MatchClass::Exact,
            _ => MatchClass::Implicit,
        }
    }

    pub fn dereferences(&self) -> u8 {
        match self {
            CoercionKind::Dereference(n) => *n,
            _ => 0,
        }
    }

    /// Whether the coercion needs a wrapper expression in the tree, as
    /// opposed to being a pure qualification change.
    pub fn needs_wrapper(&self) -> bool {
        !matches!(self, CoercionKind::Identity | CoercionKind::ConstRelaxation)
    }
}

#[derive(Debug, Clone)]
pub struct CoercionFailure {
    pub reason: String,
}

impl CoercionFailure {
    fn new(reason: String) -> Self {
        Self { reason }
    }
}

/// The directed coercion lattice.
pub struct Coercer<'d> {
    decls: &'d DeclTable,
    strict_enums: bool,
}

impl<'d> Coercer<'d> {
    pub fn new(decls: &'d DeclTable) -> Self {
        Self {
            decls,
            strict_enums: true,
        }
    }

    pub fn with_lenient_enums(mut self) -> Self {
        self.strict_enums = false;
        self
    }

    /// Decide whether `from` coerces to `to` under `style`, without looking
    /// at the expression being coerced. Literal-dependent rules (numeric
    /// narrowing, enum labels) are only reachable through
    /// [coerce_expr](Coercer::coerce_expr).
    pub fn coerce_type(
        &self,
        from: &QualifiedType,
        to: &QualifiedType,
        style: CoercionStyle,
    ) -> Result<CoercionKind, CoercionFailure> {
        self.decide(from, to, None, style)
    }

    /// Coerce an expression node to `to`, returning either the (possibly
    /// wrapped) expression or the original together with the failure reason.
    pub fn coerce_expr(
        &self,
        ctx: &mut Context,
        expr: Node,
        to: &QualifiedType,
        style: CoercionStyle,
    ) -> Result<Node, (Node, CoercionFailure)> {
        let from = expr.expr().ty.clone();
        let literal = leaf_literal(&expr).cloned();
        match self.decide(&from, to, literal.as_ref(), style) {
            Ok(kind) if !kind.needs_wrapper() => Ok(expr),
            Ok(_) => {
                let wrapper = if to.is_resolved() {
                    ExprKind::Coerced
                } else {
                    ExprKind::PendingCoerced
                };
                Ok(ctx.make(
                    NodeKind::Expr(Expression {
                        kind: wrapper,
                        ty: to.clone(),
                    }),
                    vec![expr],
                ))
            }
            Err(failure) => Err((expr, failure)),
        }
    }

    fn decide(
        &self,
        from: &QualifiedType,
        to: &QualifiedType,
        literal: Option<&Ctor>,
        style: CoercionStyle,
    ) -> Result<CoercionKind, CoercionFailure> {
        let unifier = Unifier::new(self.decls);

        if unifier.equal(&from.ty, &to.ty) {
            // Dropping mutability from an L-value use to an R-value use is
            // always sound; the reverse is not a coercion at all.
            if from.side == Side::LValue && to.side == Side::RValue {
                return Ok(CoercionKind::ConstRelaxation);
            }
            if to.side == Side::LValue && from.side == Side::RValue {
                return Err(CoercionFailure::new(format!(
                    "cannot use value of type {} as an assignable location",
                    from.ty
                )));
            }
            return Ok(CoercionKind::Identity);
        }

        if matches!(to.ty, Type::Any) {
            return Ok(CoercionKind::Identity);
        }

        let implicit = |kind: CoercionKind| -> Result<CoercionKind, CoercionFailure> {
            if style.implicit || style.explicit_cast || style.function_call || style.try_coercion {
                Ok(kind)
            } else {
                Err(CoercionFailure::new(format!(
                    "coercion from {} to {} requires an implicit-coercion context",
                    from.ty, to.ty
                )))
            }
        };

        // Automatic dereference of reference<T> in R-value positions.
        if to.side == Side::RValue {
            let (stripped, count) = from.ty.deref_chain();
            if count > 0 && unifier.equal(stripped, &to.ty) {
                return implicit(CoercionKind::Dereference(count));
            }
        }

        match (&from.ty, &to.ty) {
            (Type::UInt(a), Type::UInt(b)) | (Type::SInt(a), Type::SInt(b)) if b >= a => {
                implicit(CoercionKind::NumericWidening)
            }
            (Type::UInt(a), Type::SInt(b)) if b > a => implicit(CoercionKind::NumericWidening),
            (Type::UInt(_), Type::Real) | (Type::SInt(_), Type::Real) => {
                implicit(CoercionKind::NumericWidening)
            }
            (Type::UInt(_) | Type::SInt(_), Type::UInt(b) | Type::SInt(b)) => {
                // Narrowing or a sign flip: fine for literal constants that
                // are verified in range, an explicit cast otherwise.
                if let Some(value) = literal.and_then(integer_value) {
                    if integer_fits(value, &to.ty, *b) {
                        return implicit(CoercionKind::NumericLiteralNarrowing);
                    }
                    return Err(CoercionFailure::new(format!(
                        "literal {} does not fit into {}",
                        value, to.ty
                    )));
                }
                if style.explicit_cast || style.function_call {
                    Ok(CoercionKind::NumericLiteralNarrowing)
                } else {
                    Err(CoercionFailure::new(format!(
                        "narrowing from {} to {} needs an explicit cast",
                        from.ty, to.ty
                    )))
                }
            }
            (Type::Null, Type::Optional(_)) => implicit(CoercionKind::NullToOptional),
            (_, Type::Optional(inner)) => {
                let inner_q = QualifiedType::rvalue((**inner).clone());
                self.decide(from, &inner_q, literal, style)?;
                implicit(CoercionKind::OptionalPromotion)
            }
            (Type::Error, Type::Result(_)) => implicit(CoercionKind::ErrorToResult),
            (_, Type::Result(inner)) => {
                let inner_q = QualifiedType::rvalue((**inner).clone());
                self.decide(from, &inner_q, literal, style)?;
                implicit(CoercionKind::ResultPromotion)
            }
            (Type::List(a), Type::Vector(b)) | (Type::Vector(a), Type::List(b)) => {
                let from_el = QualifiedType::rvalue((**a).clone());
                let to_el = QualifiedType::rvalue((**b).clone());
                self.decide(&from_el, &to_el, None, style)?;
                implicit(CoercionKind::ContainerWidening)
            }
            (Type::Tuple(elements), Type::Struct(fields)) => {
                if elements.len() != fields.len() {
                    return Err(CoercionFailure::new(format!(
                        "tuple arity {} does not match struct arity {}",
                        elements.len(),
                        fields.len()
                    )));
                }
                for (element, (id, field_ty)) in elements.iter().zip(fields) {
                    let from_el = QualifiedType::rvalue(element.clone());
                    let to_el = QualifiedType::rvalue(field_ty.clone());
                    self.decide(&from_el, &to_el, None, style).map_err(|e| {
                        CoercionFailure::new(format!("at struct field '{}': {}", id, e.reason))
                    })?;
                }
                implicit(CoercionKind::TupleToStruct)
            }
            (Type::Str, Type::Bytes) if matches!(literal, Some(Ctor::Str(_))) => {
                implicit(CoercionKind::BytesLiteral)
            }
            (_, Type::Name(qualified)) => {
                if let Some(DeclInfoKind::Enum { labels }) = self.decls.get(qualified).map(|i| &i.kind)
                {
                    if let Some(value) = literal.and_then(integer_value) {
                        let matches_label = labels.iter().any(|(_, v)| *v == value);
                        if matches_label || !self.strict_enums {
                            return implicit(CoercionKind::EnumFromLiteral);
                        }
                        return Err(CoercionFailure::new(format!(
                            "integer {} is not a label of enum {}",
                            value, qualified
                        )));
                    }
                }
                Err(self.no_rule(from, to))
            }
            _ => Err(self.no_rule(from, to)),
        }
    }

    fn no_rule(&self, from: &QualifiedType, to: &QualifiedType) -> CoercionFailure {
        CoercionFailure::new(format!("no coercion from {} to {}", from.ty, to.ty))
    }
}

/// The literal at the bottom of an expression, looking through ctor
/// expression wrappers.
fn leaf_literal(node: &Node) -> Option<&Ctor> {
    match &node.kind {
        NodeKind::Ctor(c) => Some(c),
        NodeKind::Expr(e) => match e.kind {
            ExprKind::Ctor => leaf_literal(node.children.first()?),
            _ => None,
        },
        _ => None,
    }
}

fn integer_value(ctor: &Ctor) -> Option<i64> {
    match ctor {
        Ctor::UInt { value, .. } => i64::try_from(*value).ok(),
        Ctor::SInt { value, .. } => Some(*value),
        _ => None,
    }
}

fn integer_fits(value: i64, ty: &Type, width: u8) -> bool {
    match ty {
        Type::UInt(_) => {
            if value < 0 {
                return false;
            }
            match width {
                64 => true,
                w => (value as u64) < (1u64 << w),
            }
        }
        Type::SInt(_) => match width {
            64 => true,
            w => {
                let bound = 1i64 << (w - 1);
                value >= -bound && value < bound
            }
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::DeclTable;

    fn rv(ty: Type) -> QualifiedType {
        QualifiedType::rvalue(ty)
    }

    #[test]
    fn widening_is_implicit_and_directional() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        assert!(coercer
            .coerce_type(&rv(Type::UInt(8)), &rv(Type::UInt(32)), CoercionStyle::IMPLICIT)
            .is_ok());
        assert!(coercer
            .coerce_type(&rv(Type::UInt(32)), &rv(Type::UInt(8)), CoercionStyle::IMPLICIT)
            .is_err());
        assert!(coercer
            .coerce_type(&rv(Type::UInt(32)), &rv(Type::UInt(8)), CoercionStyle::EXPLICIT)
            .is_ok());
    }

    #[test]
    fn optional_promotion() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        let kind = coercer
            .coerce_type(
                &rv(Type::UInt(8)),
                &rv(Type::optional(Type::UInt(8))),
                CoercionStyle::IMPLICIT,
            )
            .unwrap();
        assert_eq!(kind, CoercionKind::OptionalPromotion);
        assert_eq!(
            coercer
                .coerce_type(
                    &rv(Type::Null),
                    &rv(Type::optional(Type::Bytes)),
                    CoercionStyle::IMPLICIT,
                )
                .unwrap(),
            CoercionKind::NullToOptional
        );
    }

    #[test]
    fn reference_unwraps_in_rvalue_position() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        let kind = coercer
            .coerce_type(
                &rv(Type::strong_ref(Type::Bytes)),
                &rv(Type::Bytes),
                CoercionStyle::IMPLICIT,
            )
            .unwrap();
        assert_eq!(kind, CoercionKind::Dereference(1));
    }

    #[test]
    fn list_vector_widening_checks_elements() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        assert!(coercer
            .coerce_type(
                &rv(Type::List(Box::new(Type::UInt(8)))),
                &rv(Type::vector(Type::UInt(16))),
                CoercionStyle::IMPLICIT,
            )
            .is_ok());
        assert!(coercer
            .coerce_type(
                &rv(Type::List(Box::new(Type::Bytes))),
                &rv(Type::vector(Type::UInt(16))),
                CoercionStyle::IMPLICIT,
            )
            .is_err());
    }
}
