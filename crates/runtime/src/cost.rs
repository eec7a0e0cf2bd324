//! Runtime cost accounting.
//!
//! Each evaluation step charges an operation-specific amount against an
//! optional budget. Charges accumulate in tenths of a unit so the linear
//! scaling factors stay integral. Exceeding the budget turns the current
//! step into a terminal `cost_limit_exceeded` error.

use std::sync::Arc;

use verdict_core::error::{ErrorKind, ErrorValue};
use verdict_core::value::Value;

use verdict_compiler::cost::{
    COST_LIST_CREATE, COST_MAP_CREATE, COST_QUALIFIER, COST_STRUCT_CREATE,
};

/// Host hook to override the built-in per-call costs. Returning `None`
/// falls back to the defaults.
pub trait CostEstimator: Send + Sync {
    fn call_cost(&self, function: &str, overload_id: &str, args: &[Value]) -> Option<u64>;
}

/// Structural charge categories used by the evaluation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    Constant,
    /// An attribute resolution with this many qualification steps.
    Attribute(u64),
    ListCreate,
    MapCreate,
    StructCreate,
}

#[derive(Clone, Default)]
pub struct CostTracker {
    /// Accumulated cost in tenths of a unit.
    tenths: u64,
    /// Budget in whole units; `None` disables enforcement.
    limit: Option<u64>,
    estimator: Option<Arc<dyn CostEstimator>>,
    exhausted: bool,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("cost", &self.cost())
            .field("limit", &self.limit)
            .finish()
    }
}

impl CostTracker {
    pub fn new(limit: Option<u64>, estimator: Option<Arc<dyn CostEstimator>>) -> CostTracker {
        CostTracker {
            tenths: 0,
            limit,
            estimator,
            exhausted: false,
        }
    }

    /// Total cost so far, in whole units (rounded up).
    pub fn cost(&self) -> u64 {
        self.tenths.div_ceil(10)
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    fn charge_tenths(&mut self, tenths: u64) -> Result<(), ErrorValue> {
        self.tenths = self.tenths.saturating_add(tenths);
        if let Some(limit) = self.limit {
            if self.cost() > limit {
                self.exhausted = true;
                return Err(ErrorValue::new(
                    ErrorKind::CostLimitExceeded,
                    format!("cost limit exceeded: limit {limit}"),
                ));
            }
        }
        Ok(())
    }

    pub fn charge(&mut self, kind: CostKind) -> Result<(), ErrorValue> {
        let units = match kind {
            CostKind::Constant => 0,
            CostKind::Attribute(qualifiers) => COST_QUALIFIER.saturating_mul(qualifiers.max(1)),
            CostKind::ListCreate => COST_LIST_CREATE,
            CostKind::MapCreate => COST_MAP_CREATE,
            CostKind::StructCreate => COST_STRUCT_CREATE,
        };
        self.charge_tenths(units.saturating_mul(10))
    }

    /// Charges a call according to the default table, unless the host
    /// estimator knows better.
    pub fn charge_call(
        &mut self,
        function: &str,
        overload_id: &str,
        args: &[Value],
    ) -> Result<(), ErrorValue> {
        if let Some(estimator) = &self.estimator {
            if let Some(units) = estimator.call_cost(function, overload_id, args) {
                return self.charge_tenths(units.saturating_mul(10));
            }
        }
        self.charge_tenths(default_call_cost_tenths(function, args))
    }
}

fn value_size(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.chars().count() as u64,
        Value::Bytes(b) => b.len() as u64,
        Value::List(l) => l.len() as u64,
        Value::Map(m) => m.len() as u64,
        _ => 1,
    }
}

/// The default call cost table, in tenths of a unit.
fn default_call_cost_tenths(function: &str, args: &[Value]) -> u64 {
    match function {
        // Linear in input size, scaled by a tenth.
        "contains" | "startsWith" | "endsWith" => {
            let n = args.first().map(value_size).unwrap_or(1);
            let m = args.get(1).map(value_size).unwrap_or(1);
            match function {
                // Substring search is O(n·m) in the worst case.
                "contains" => 10 + n.saturating_mul(m),
                _ => 10 + n.max(1),
            }
        }
        "matches" => {
            let n = args.first().map(value_size).unwrap_or(1);
            // Pattern length scaled at a quarter unit per character.
            let m = args.get(1).map(value_size).unwrap_or(1);
            10 + n.saturating_mul(m).saturating_mul(10) / 4
        }
        "_+_" => match args.first() {
            Some(Value::String(_)) | Some(Value::Bytes(_)) | Some(Value::List(_)) => {
                let n = args.iter().map(value_size).sum::<u64>();
                10 + n
            }
            _ => 10,
        },
        "_==_" | "_!=_" | "_<_" | "_<=_" | "_>_" | "_>=_" => {
            // Cross-value comparison bounded by the smaller operand.
            let n = args.first().map(value_size).unwrap_or(1);
            let m = args.get(1).map(value_size).unwrap_or(1);
            10 + n.min(m)
        }
        "@in" => {
            let haystack = args.get(1).map(value_size).unwrap_or(1);
            10 + haystack
        }
        "bytes" | "string" => {
            let n = args.first().map(value_size).unwrap_or(1);
            10 + n
        }
        // Scalar arithmetic, size, conversions, logic.
        _ => 10,
    }
}
