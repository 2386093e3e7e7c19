//! The operator registry the resolver instantiates unresolved operator
//! expressions against.
//!
//! Each [Signature] describes one overload through operand [Pattern]s that
//! may be generic (wildcards over integers, sortables, containers).
//! Candidate selection scores every signature by the worst coercion class
//! any operand needs, breaking ties by the total number of reference
//! dereferences; a non-unique best candidate is an ambiguous overload.

use crate::types::{
    Coercer, CoercionStyle, MatchClass, QualifiedType, Type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    And,
    Or,
    Index,
    Size,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Leq => "<=",
            Operator::Geq => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Index => "[]",
            Operator::Size => "|..|",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(Type),
    Integer,
    Numeric,
    Sortable,
    AnyVector,
    Any,
    /// The operand must coerce to the matched type of an earlier operand.
    SameAs(usize),
}

#[derive(Debug, Clone)]
pub enum ResultRule {
    Fixed(Type),
    /// The matched type of the given operand.
    Operand(usize),
    /// The element type of the given container operand.
    ElementOf(usize),
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub op: Operator,
    pub operands: Vec<Pattern>,
    pub result: ResultRule,
}

#[derive(Debug)]
pub struct Registry {
    signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// Score of one candidate: worst operand class first, then total
/// dereferences. Lower is better.
pub struct Score(pub MatchClass, pub u8);

#[derive(Debug)]
pub struct Match {
    pub signature: usize,
    pub score: Score,
    /// The concrete type each operand must be coerced to.
    pub operand_types: Vec<QualifiedType>,
    pub result: QualifiedType,
}

impl Registry {
    /// The built-in overload set.
    pub fn standard() -> Self {
        use Operator::*;
        let mut signatures = Vec::new();
        for op in [Add, Sub, Mul, Div] {
            signatures.push(Signature {
                op,
                operands: vec![Pattern::Numeric, Pattern::SameAs(0)],
                result: ResultRule::Operand(0),
            });
        }
        for op in [Eq, Neq] {
            signatures.push(Signature {
                op,
                operands: vec![Pattern::Any, Pattern::SameAs(0)],
                result: ResultRule::Fixed(Type::Bool),
            });
        }
        for op in [Lt, Gt, Leq, Geq] {
            signatures.push(Signature {
                op,
                operands: vec![Pattern::Sortable, Pattern::SameAs(0)],
                result: ResultRule::Fixed(Type::Bool),
            });
        }
        for op in [And, Or] {
            signatures.push(Signature {
                op,
                operands: vec![Pattern::Exact(Type::Bool), Pattern::Exact(Type::Bool)],
                result: ResultRule::Fixed(Type::Bool),
            });
        }
        signatures.push(Signature {
            op: Index,
            operands: vec![Pattern::AnyVector, Pattern::Integer],
            result: ResultRule::ElementOf(0),
        });
        signatures.push(Signature {
            op: Size,
            operands: vec![Pattern::Exact(Type::Bytes)],
            result: ResultRule::Fixed(Type::UInt(64)),
        });
        signatures.push(Signature {
            op: Size,
            operands: vec![Pattern::AnyVector],
            result: ResultRule::Fixed(Type::UInt(64)),
        });
        Self { signatures }
    }

    pub fn signature(&self, index: usize) -> &Signature {
        &self.signatures[index]
    }

    /// Match the operand types against every candidate for `op` and return
    /// all candidates achieving the best score. One element means a unique
    /// best match; several mean the overload is ambiguous.
    pub fn select(
        &self,
        op: Operator,
        operands: &[QualifiedType],
        coercer: &Coercer,
    ) -> Vec<Match> {
        let mut best: Vec<Match> = Vec::new();
        for (index, signature) in self.signatures.iter().enumerate() {
            if signature.op != op || signature.operands.len() != operands.len() {
                continue;
            }
            if let Some(m) = self.try_match(index, signature, operands, coercer) {
                let standing = best.first().map(|current| current.score.cmp(&m.score));
                match standing {
                    Some(std::cmp::Ordering::Less) => {}
                    Some(std::cmp::Ordering::Equal) => best.push(m),
                    _ => best = vec![m],
                }
            }
        }
        best
    }

    fn try_match(
        &self,
        index: usize,
        signature: &Signature,
        operands: &[QualifiedType],
        coercer: &Coercer,
    ) -> Option<Match> {
        let mut worst = MatchClass::Exact;
        let mut dereferences = 0u8;
        let mut operand_types: Vec<QualifiedType> = Vec::with_capacity(operands.len());

        for (pattern, operand) in signature.operands.iter().zip(operands) {
            let (stripped, derefs) = operand.ty.deref_chain();
            let target: Type = match pattern {
                Pattern::Exact(t) => t.clone(),
                Pattern::Integer => {
                    if !stripped.is_integer() {
                        return None;
                    }
                    stripped.clone()
                }
                Pattern::Numeric => {
                    if !stripped.is_numeric() {
                        return None;
                    }
                    stripped.clone()
                }
                Pattern::Sortable => {
                    if !stripped.is_sortable() {
                        return None;
                    }
                    stripped.clone()
                }
                Pattern::AnyVector => match stripped {
                    Type::Vector(_) | Type::List(_) => stripped.clone(),
                    _ => return None,
                },
                Pattern::Any => stripped.clone(),
                Pattern::SameAs(i) => operand_types.get(*i)?.ty.clone(),
            };
            let target_q = QualifiedType::rvalue(target);
            let kind = coercer
                .coerce_type(operand, &target_q, CoercionStyle::EXPLICIT)
                .ok()?;
            let class = if derefs > 0 && kind.class() == MatchClass::Exact {
                // Auto-deref counts as an implicit conversion even when the
                // stripped types agree.
                MatchClass::Implicit
            } else {
                kind.class()
            };
            worst = worst.max(class);
            dereferences = dereferences.saturating_add(kind.dereferences().max(derefs));
            operand_types.push(target_q);
        }

        let result = match &signature.result {
            ResultRule::Fixed(t) => QualifiedType::rvalue(t.clone()),
            ResultRule::Operand(i) => operand_types[*i].clone(),
            ResultRule::ElementOf(i) => match &operand_types[*i].ty {
                Type::Vector(element) | Type::List(element) => {
                    QualifiedType::rvalue((**element).clone())
                }
                _ => return None,
            },
        };

        Some(Match {
            signature: index,
            score: Score(worst, dereferences),
            operand_types,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::DeclTable;

    #[test]
    fn unique_best_candidate_wins() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        let registry = Registry::standard();
        let operands = [
            QualifiedType::rvalue(Type::UInt(16)),
            QualifiedType::rvalue(Type::UInt(16)),
        ];
        let matches = registry.select(Operator::Add, &operands, &coercer);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].result.ty, Type::UInt(16));
    }

    #[test]
    fn deref_scores_below_exact() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        let registry = Registry::standard();
        let operands = [
            QualifiedType::rvalue(Type::strong_ref(Type::UInt(8))),
            QualifiedType::rvalue(Type::UInt(8)),
        ];
        let matches = registry.select(Operator::Add, &operands, &coercer);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score.0, MatchClass::Implicit);
        assert!(matches[0].score.1 >= 1);
    }

    #[test]
    fn index_yields_element_type() {
        let table = DeclTable::default();
        let coercer = Coercer::new(&table);
        let registry = Registry::standard();
        let operands = [
            QualifiedType::rvalue(Type::vector(Type::Bytes)),
            QualifiedType::rvalue(Type::UInt(64)),
        ];
        let matches = registry.select(Operator::Index, &operands, &coercer);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].result.ty, Type::Bytes);
    }
}
