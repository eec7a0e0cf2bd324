//! Static cost estimation over a checked AST.
//!
//! Produces `[min, max]` bounds for the runtime cost counter before any
//! evaluation happens. Sizes of variables are unknown unless the host
//! supplies hints, so size-dependent operations and comprehensions widen
//! the upper bound, up to "unbounded" (`u64::MAX`).

use crate::ast::{Ast, Expr, ExprKind};

/// Cost units charged per construct, shared with the runtime tracker.
pub const COST_QUALIFIER: u64 = 1;
pub const COST_LIST_CREATE: u64 = 10;
pub const COST_MAP_CREATE: u64 = 30;
pub const COST_STRUCT_CREATE: u64 = 40;
pub const COST_CALL: u64 = 1;
/// Per-element scaling for linear-time calls, in tenths of a unit.
pub const COST_LINEAR_TENTHS: u64 = 1;
/// Per-pattern-character scaling for regex compilation, in hundredths.
pub const COST_REGEX_HUNDREDTHS: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    pub min: u64,
    pub max: u64,
}

impl CostEstimate {
    pub const ZERO: CostEstimate = CostEstimate { min: 0, max: 0 };
    /// An evaluation whose upper bound cannot be determined statically.
    pub const UNBOUNDED: CostEstimate = CostEstimate {
        min: 0,
        max: u64::MAX,
    };

    pub fn fixed(cost: u64) -> CostEstimate {
        CostEstimate {
            min: cost,
            max: cost,
        }
    }

    pub fn add(self, other: CostEstimate) -> CostEstimate {
        CostEstimate {
            min: self.min.saturating_add(other.min),
            max: self.max.saturating_add(other.max),
        }
    }

    /// One branch of several that may run: min of mins, max of maxes.
    pub fn alternative(self, other: CostEstimate) -> CostEstimate {
        CostEstimate {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn multiply(self, times: CostEstimate) -> CostEstimate {
        CostEstimate {
            min: self.min.saturating_mul(times.min),
            max: self.max.saturating_mul(times.max),
        }
    }
}

/// Host-provided size knowledge for declared variables.
pub trait CostHints {
    /// Upper bound on the size (elements, code points) of a variable.
    fn variable_size(&self, name: &str) -> Option<u64>;
}

/// No knowledge: every variable is unbounded.
pub struct NoHints;

impl CostHints for NoHints {
    fn variable_size(&self, _name: &str) -> Option<u64> {
        None
    }
}

pub fn estimate_cost(ast: &Ast, hints: &dyn CostHints) -> CostEstimate {
    let estimator = Estimator { ast, hints };
    estimator.cost_of(&ast.expr)
}

struct Estimator<'a> {
    ast: &'a Ast,
    hints: &'a dyn CostHints,
}

impl Estimator<'_> {
    /// Size bounds for the value an expression produces, when knowable.
    fn size_of(&self, expr: &Expr) -> CostEstimate {
        match &expr.kind {
            ExprKind::Literal(c) => match c {
                crate::ast::Constant::String(s) => CostEstimate::fixed(s.chars().count() as u64),
                crate::ast::Constant::Bytes(b) => CostEstimate::fixed(b.len() as u64),
                _ => CostEstimate::fixed(1),
            },
            ExprKind::List { elements, .. } => CostEstimate::fixed(elements.len() as u64),
            ExprKind::Map { entries } => CostEstimate::fixed(entries.len() as u64),
            ExprKind::Ident(name) => match self.hints.variable_size(name) {
                Some(bound) => CostEstimate { min: 0, max: bound },
                None => CostEstimate::UNBOUNDED,
            },
            ExprKind::Select { .. } => match expr
                .qualified_name()
                .and_then(|name| self.hints.variable_size(&name))
            {
                Some(bound) => CostEstimate { min: 0, max: bound },
                None => CostEstimate::UNBOUNDED,
            },
            _ => CostEstimate::UNBOUNDED,
        }
    }

    fn cost_of(&self, expr: &Expr) -> CostEstimate {
        match &expr.kind {
            ExprKind::Literal(_) => CostEstimate::ZERO,
            ExprKind::Ident(_) => CostEstimate::fixed(COST_QUALIFIER),
            ExprKind::Select { operand, .. } => self
                .cost_of(operand)
                .add(CostEstimate::fixed(COST_QUALIFIER)),
            ExprKind::List { elements, .. } => elements
                .iter()
                .fold(CostEstimate::fixed(COST_LIST_CREATE), |acc, e| {
                    acc.add(self.cost_of(e))
                }),
            ExprKind::Map { entries } => entries
                .iter()
                .fold(CostEstimate::fixed(COST_MAP_CREATE), |acc, e| {
                    acc.add(self.cost_of(&e.key)).add(self.cost_of(&e.value))
                }),
            ExprKind::Struct { fields, .. } => fields
                .iter()
                .fold(CostEstimate::fixed(COST_STRUCT_CREATE), |acc, f| {
                    acc.add(self.cost_of(&f.value))
                }),
            ExprKind::Call {
                target,
                function,
                args,
            } => self.call_cost(expr, target.as_deref(), function, args),
            ExprKind::Comprehension(fold) => {
                let range = self.cost_of(&fold.iter_range);
                let init = self.cost_of(&fold.accu_init);
                let per_iteration = self
                    .cost_of(&fold.loop_cond)
                    .add(self.cost_of(&fold.loop_step));
                let iterations = self.size_of(&fold.iter_range);
                let result = self.cost_of(&fold.result);
                range
                    .add(init)
                    .add(per_iteration.multiply(iterations))
                    .add(result)
            }
        }
    }

    fn call_cost(
        &self,
        expr: &Expr,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> CostEstimate {
        let mut cost = CostEstimate::ZERO;
        if let Some(t) = target {
            cost = cost.add(self.cost_of(t));
        }
        for arg in args {
            cost = cost.add(self.cost_of(arg));
        }
        match function {
            // Short-circuit operators may skip the right side entirely; the
            // bound above already includes both, so only narrow the min.
            "_&&_" | "_||_" => {
                let left = self.cost_of(&args[0]);
                CostEstimate {
                    min: left.min.saturating_add(COST_CALL),
                    max: cost.max.saturating_add(COST_CALL),
                }
            }
            "_?_:_" => {
                let cond = self.cost_of(&args[0]);
                let branches = self.cost_of(&args[1]).alternative(self.cost_of(&args[2]));
                cond.add(branches).add(CostEstimate::fixed(COST_CALL))
            }
            // Linear in the argument size, scaled by a tenth.
            "contains" | "startsWith" | "endsWith" => {
                let subject = target.map(|t| self.size_of(t)).unwrap_or(CostEstimate::UNBOUNDED);
                cost.add(CostEstimate::fixed(COST_CALL)).add(
                    subject.multiply(CostEstimate::fixed(COST_LINEAR_TENTHS)),
                )
            }
            "matches" => {
                let subject = match target {
                    Some(t) => self.size_of(t),
                    None => self.size_of(&args[0]),
                };
                let pattern = args
                    .last()
                    .map(|p| self.size_of(p))
                    .unwrap_or(CostEstimate::UNBOUNDED);
                // O(n·m) worst case; the per-character scaling rounds up to
                // one unit at this granularity.
                cost.add(CostEstimate::fixed(COST_CALL))
                    .add(subject.multiply(pattern))
            }
            _ => cost.add(CostEstimate::fixed(COST_CALL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn estimate(source: &str) -> CostEstimate {
        let ast = parse(source).unwrap();
        estimate_cost(&ast, &NoHints)
    }

    #[test]
    fn test_constants_are_free() {
        assert_eq!(estimate("42"), CostEstimate::ZERO);
        assert_eq!(estimate("'hello'"), CostEstimate::ZERO);
    }

    #[test]
    fn test_attribute_qualifiers_cost_one_each() {
        let a = estimate("a");
        let abc = estimate("a.b.c");
        assert_eq!(a.min, 1);
        assert_eq!(abc.min, 3);
    }

    #[test]
    fn test_aggregate_creation_costs() {
        assert_eq!(estimate("[1, 2]").min, COST_LIST_CREATE);
        assert_eq!(estimate("{'k': 1}").min, COST_MAP_CREATE);
    }

    #[test]
    fn test_longer_input_costs_at_least_as_much() {
        let short = estimate("'ab'.contains('a')");
        let long = estimate("'abcdefghijklmnop'.contains('a')");
        assert!(long.max >= short.max);
        assert!(long.min >= short.min);
    }

    #[test]
    fn test_comprehension_over_literal_is_bounded() {
        let est = estimate("[1,2,3].all(x, x < 10)");
        assert!(est.max < u64::MAX);
    }

    #[test]
    fn test_comprehension_over_variable_is_unbounded() {
        let est = estimate("xs.all(x, x < 10)");
        assert_eq!(est.max, u64::MAX);
    }

    #[test]
    fn test_short_circuit_narrows_min_only() {
        let est = estimate("a && expensive.call(b)");
        let left_only = estimate("a");
        assert!(est.min <= left_only.min + COST_CALL + 1);
        assert!(est.max > est.min);
    }
}
