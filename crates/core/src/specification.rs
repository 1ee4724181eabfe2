//! Composable specifications for the query side.
//!
//! A specification is an immutable, pure predicate over an entity type,
//! combinable with and/or/not. Every specification also exposes a
//! [`Criteria`] expression tree so a backing query translator can compile the
//! whole composite into a single query instead of chaining in-memory filters.
//!
//! Combinators never mutate their operands; specifications are shared via
//! `Arc` and are safe to evaluate from concurrent callers.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared handle to an immutable specification.
pub type SpecRef<T> = Arc<dyn Specification<T>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecificationError {
    /// Negation was requested over an absent operand. This is a wiring bug in
    /// the caller, never a data condition.
    #[error("negation requires an operand")]
    MissingOperand,
}

/// Query-translatable predicate expression.
///
/// `Leaf` describes one concrete test (`field` is a member of `one_of`);
/// the remaining variants mirror the boolean combinators. The tree is what a
/// storage adapter walks to build its native query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Criteria {
    /// Matches every candidate (composition identity).
    All,
    Leaf {
        field: String,
        one_of: Vec<String>,
    },
    And {
        left: Box<Criteria>,
        right: Box<Criteria>,
    },
    Or {
        left: Box<Criteria>,
        right: Box<Criteria>,
    },
    Not {
        operand: Box<Criteria>,
    },
}

impl Criteria {
    pub fn leaf(field: impl Into<String>, one_of: impl IntoIterator<Item = String>) -> Self {
        Criteria::Leaf {
            field: field.into(),
            one_of: one_of.into_iter().collect(),
        }
    }

    /// Merge two criteria conjunctively into one expression.
    ///
    /// `All` is the identity and duplicate subtrees collapse, so folding
    /// optional filters never produces a degenerate query.
    pub fn and(self, other: Criteria) -> Criteria {
        match (self, other) {
            (Criteria::All, c) | (c, Criteria::All) => c,
            (l, r) if l == r => l,
            (l, r) => Criteria::And {
                left: Box::new(l),
                right: Box::new(r),
            },
        }
    }

    /// Merge two criteria disjunctively. `All` absorbs the other operand.
    pub fn or(self, other: Criteria) -> Criteria {
        match (self, other) {
            (Criteria::All, _) | (_, Criteria::All) => Criteria::All,
            (l, r) if l == r => l,
            (l, r) => Criteria::Or {
                left: Box::new(l),
                right: Box::new(r),
            },
        }
    }

    /// Negate this criteria. Double negation collapses.
    pub fn negated(self) -> Criteria {
        match self {
            Criteria::Not { operand } => *operand,
            c => Criteria::Not {
                operand: Box::new(c),
            },
        }
    }
}

/// An immutable predicate over `T`.
///
/// Evaluation must be pure and deterministic for a given candidate.
pub trait Specification<T>: Send + Sync {
    fn is_satisfied_by(&self, candidate: &T) -> bool;

    /// The query-translatable expression equivalent to this predicate.
    fn criteria(&self) -> Criteria;
}

impl<T, S> Specification<T> for Arc<S>
where
    S: Specification<T> + ?Sized,
{
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }

    fn criteria(&self) -> Criteria {
        (**self).criteria()
    }
}

/// Identity specification: satisfied by every candidate.
///
/// Used as the seed when folding a variable number of optional filters.
pub struct MatchAll<T>(PhantomData<fn(&T)>);

impl<T> MatchAll<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for MatchAll<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Specification<T> for MatchAll<T> {
    fn is_satisfied_by(&self, _candidate: &T) -> bool {
        true
    }

    fn criteria(&self) -> Criteria {
        Criteria::All
    }
}

/// Conjunction of two specifications.
pub struct AndSpecification<T> {
    left: SpecRef<T>,
    right: SpecRef<T>,
}

impl<T> AndSpecification<T> {
    pub fn new(left: SpecRef<T>, right: SpecRef<T>) -> Self {
        Self { left, right }
    }
}

impl<T> Specification<T> for AndSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }

    fn criteria(&self) -> Criteria {
        self.left.criteria().and(self.right.criteria())
    }
}

/// Disjunction of two specifications.
pub struct OrSpecification<T> {
    left: SpecRef<T>,
    right: SpecRef<T>,
}

impl<T> OrSpecification<T> {
    pub fn new(left: SpecRef<T>, right: SpecRef<T>) -> Self {
        Self { left, right }
    }
}

impl<T> Specification<T> for OrSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) || self.right.is_satisfied_by(candidate)
    }

    fn criteria(&self) -> Criteria {
        self.left.criteria().or(self.right.criteria())
    }
}

/// Negation of a single specification.
pub struct NotSpecification<T> {
    operand: SpecRef<T>,
}

impl<T> NotSpecification<T> {
    pub fn new(operand: SpecRef<T>) -> Self {
        Self { operand }
    }
}

impl<T> Specification<T> for NotSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.operand.is_satisfied_by(candidate)
    }

    fn criteria(&self) -> Criteria {
        self.operand.criteria().negated()
    }
}

/// Chaining combinators for owned specifications.
pub trait SpecificationExt<T: 'static>: Specification<T> + Sized + 'static {
    fn and(self, other: impl Specification<T> + 'static) -> AndSpecification<T> {
        AndSpecification::new(Arc::new(self), Arc::new(other))
    }

    fn or(self, other: impl Specification<T> + 'static) -> OrSpecification<T> {
        OrSpecification::new(Arc::new(self), Arc::new(other))
    }

    fn negate(self) -> NotSpecification<T> {
        NotSpecification::new(Arc::new(self))
    }

    fn into_ref(self) -> SpecRef<T> {
        Arc::new(self)
    }
}

impl<T: 'static, S: Specification<T> + Sized + 'static> SpecificationExt<T> for S {}

/// Builders for composing specifications held behind `SpecRef` handles,
/// e.g. when assembling a composite from optional request filters.
pub mod compose {
    use super::*;

    pub fn match_all<T: 'static>() -> SpecRef<T> {
        Arc::new(MatchAll::new())
    }

    pub fn and<T: 'static>(left: SpecRef<T>, right: SpecRef<T>) -> SpecRef<T> {
        Arc::new(AndSpecification::new(left, right))
    }

    pub fn or<T: 'static>(left: SpecRef<T>, right: SpecRef<T>) -> SpecRef<T> {
        Arc::new(OrSpecification::new(left, right))
    }

    /// Negate an operand that may come from an optional filter.
    ///
    /// An absent operand is a contract violation: it must surface as an
    /// error, never as a silently always-true/false specification.
    pub fn negate<T: 'static>(
        operand: Option<SpecRef<T>>,
    ) -> Result<SpecRef<T>, SpecificationError> {
        match operand {
            Some(spec) => Ok(Arc::new(NotSpecification::new(spec))),
            None => Err(SpecificationError::MissingOperand),
        }
    }

    /// Conjunction over any number of filters; zero filters yields the
    /// match-everything identity.
    pub fn all<T: 'static>(filters: impl IntoIterator<Item = SpecRef<T>>) -> SpecRef<T> {
        let mut iter = filters.into_iter();
        match iter.next() {
            None => match_all(),
            Some(first) => iter.fold(first, |acc, f| and(acc, f)),
        }
    }
}
