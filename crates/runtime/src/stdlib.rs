//! Runtime implementations of the standard library.
//!
//! Overload ids declared in the compiler's standard declarations map to
//! implementations here. Families of ids share one generic implementation:
//! the value layer's trait dispatch picks the concrete behavior, so `dyn`
//! operands resolve at runtime exactly as typed operands do.

use std::cmp::Ordering;

use verdict_core::error::ErrorKind;
use verdict_core::ordering::{compare_values, CompareOutcome};
use verdict_core::traits::Traits;
use verdict_core::types::Type;
use verdict_core::value::Value;

use crate::functions::{FunctionOverload, FunctionRegistry};

fn register_family(
    registry: &mut FunctionRegistry,
    function: &str,
    ids: &[&str],
    arity: usize,
    operand_trait: Traits,
    implementation: impl Fn(&[Value]) -> Value + Send + Sync + Clone + 'static,
) {
    for id in ids {
        let mut overload =
            FunctionOverload::new(function, id, arity, implementation.clone());
        overload = overload.with_operand_trait(operand_trait);
        registry.register(overload);
    }
}

fn gate(value: &Value, required: Traits, op: &str, operands: &[&Value]) -> Option<Value> {
    if value.traits().contains(required) {
        None
    } else {
        Some(Value::no_such_overload(op, operands))
    }
}

fn compare_to_bool(op: &'static str, decide: fn(Ordering) -> bool) -> impl Fn(&[Value]) -> Value + Clone {
    move |args: &[Value]| {
        let (lhs, rhs) = (&args[0], &args[1]);
        if let Some(err) = gate(lhs, Traits::COMPARER, op, &[lhs, rhs]) {
            return err;
        }
        match compare_values(lhs, rhs) {
            CompareOutcome::Ordered(ord) => Value::Bool(decide(ord)),
            CompareOutcome::Unordered => Value::error(
                ErrorKind::NoSuchOverload,
                "NaN values cannot be ordered",
            ),
            CompareOutcome::Incomparable => Value::no_such_overload(op, &[lhs, rhs]),
        }
    }
}

const LESS_IDS: &[&str] = &[
    "less_int64",
    "less_int64_double",
    "less_int64_uint64",
    "less_uint64",
    "less_uint64_double",
    "less_uint64_int64",
    "less_double",
    "less_double_int64",
    "less_double_uint64",
    "less_bool",
    "less_string",
    "less_bytes",
    "less_duration",
    "less_timestamp",
];

fn comparison_ids(op: &str) -> Vec<String> {
    LESS_IDS
        .iter()
        .map(|id| id.replacen("less", op, 1))
        .collect()
}

fn calendar_accessor(method: &'static str) -> impl Fn(&[Value]) -> Value + Clone {
    move |args: &[Value]| {
        let tz = match args.get(1) {
            None => None,
            Some(Value::String(s)) => Some(s.to_string()),
            Some(other) => return Value::no_such_overload(method, &[&args[0], other]),
        };
        match &args[0] {
            Value::Timestamp(ts) => {
                verdict_core::datetime::timestamp_accessor(ts, method, tz.as_deref())
            }
            Value::Duration(d) if tz.is_none() => {
                verdict_core::datetime::duration_accessor(d, method)
            }
            other => Value::no_such_overload(method, &[other]),
        }
    }
}

fn conversion(target: Type) -> impl Fn(&[Value]) -> Value + Clone {
    move |args: &[Value]| args[0].convert_to_type(&target)
}

/// Builds the registry of standard implementations.
pub fn standard_functions() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    registry.register(FunctionOverload::new("!_", "logical_not", 1, |args| {
        match &args[0] {
            Value::Bool(b) => Value::Bool(!b),
            other => Value::no_such_overload("!_", &[other]),
        }
    }));

    // The comprehension guard: errors and unknowns keep the loop running.
    registry.register(
        FunctionOverload::new(
            "@not_strictly_false",
            "not_strictly_false",
            1,
            |args| match &args[0] {
                Value::Bool(b) => Value::Bool(*b),
                _ => Value::Bool(true),
            },
        )
        .non_strict(),
    );

    register_family(
        &mut registry,
        "-_",
        &["negate_int64", "negate_double"],
        1,
        Traits::NEGATER,
        |args| args[0].negate(),
    );

    register_family(
        &mut registry,
        "_+_",
        &[
            "add_int64",
            "add_uint64",
            "add_double",
            "add_string",
            "add_bytes",
            "add_list",
            "add_duration_duration",
            "add_timestamp_duration",
            "add_duration_timestamp",
        ],
        2,
        Traits::ADDER,
        |args| args[0].add(&args[1]),
    );

    register_family(
        &mut registry,
        "_-_",
        &[
            "subtract_int64",
            "subtract_uint64",
            "subtract_double",
            "subtract_duration_duration",
            "subtract_timestamp_duration",
            "subtract_timestamp_timestamp",
        ],
        2,
        Traits::SUBTRACTOR,
        |args| args[0].subtract(&args[1]),
    );

    register_family(
        &mut registry,
        "_*_",
        &["multiply_int64", "multiply_uint64", "multiply_double"],
        2,
        Traits::MULTIPLIER,
        |args| args[0].multiply(&args[1]),
    );

    register_family(
        &mut registry,
        "_/_",
        &["divide_int64", "divide_uint64", "divide_double"],
        2,
        Traits::DIVIDER,
        |args| args[0].divide(&args[1]),
    );

    register_family(
        &mut registry,
        "_%_",
        &["modulo_int64", "modulo_uint64"],
        2,
        Traits::MODDER,
        |args| args[0].modulo(&args[1]),
    );

    for (op, symbol, decide) in [
        ("less", "_<_", (|o| o == Ordering::Less) as fn(Ordering) -> bool),
        ("less_equals", "_<=_", |o| o != Ordering::Greater),
        ("greater", "_>_", |o| o == Ordering::Greater),
        ("greater_equals", "_>=_", |o| o != Ordering::Less),
    ] {
        let ids = comparison_ids(op);
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let symbol: &'static str = symbol;
        register_family(
            &mut registry,
            symbol,
            &id_refs,
            2,
            Traits::COMPARER,
            compare_to_bool(symbol, decide),
        );
    }

    registry.register(FunctionOverload::new("_==_", "equals", 2, |args| {
        args[0].equal(&args[1])
    }));
    registry.register(FunctionOverload::new("_!=_", "not_equals", 2, |args| {
        match args[0].equal(&args[1]) {
            Value::Bool(b) => Value::Bool(!b),
            other => other,
        }
    }));

    register_family(
        &mut registry,
        "_[_]",
        &["index_list", "index_map"],
        2,
        Traits::INDEXER,
        |args| match &args[0] {
            Value::List(list) => list.index(&args[1]),
            Value::Map(map) => map.index(&args[1]),
            Value::Object(obj) => match &args[1] {
                Value::String(field) => obj.get_field(field),
                other => Value::no_such_overload("_[_]", &[&args[0], other]),
            },
            other => Value::no_such_overload("_[_]", &[other, &args[1]]),
        },
    );

    register_family(
        &mut registry,
        "_[?_]",
        &["optindex_list", "optindex_map"],
        2,
        Traits::INDEXER,
        |args| match &args[0] {
            Value::List(list) => {
                let index = match &args[1] {
                    Value::Int(i) if *i >= 0 => Some(*i as usize),
                    Value::Uint(u) => Some(*u as usize),
                    _ => None,
                };
                match index.and_then(|i| list.get(i)) {
                    Some(v) => Value::optional_of(v),
                    None => Value::optional_none(),
                }
            }
            Value::Map(map) => match map.get(&args[1]) {
                Some(v) => Value::optional_of(v),
                None => Value::optional_none(),
            },
            other => Value::no_such_overload("_[?_]", &[other, &args[1]]),
        },
    );

    register_family(
        &mut registry,
        "@in",
        &["in_list", "in_map"],
        2,
        Traits::empty(),
        |args| match &args[1] {
            Value::List(list) => list.contains(&args[0]),
            Value::Map(map) => map.contains(&args[0]),
            other => Value::no_such_overload("@in", &[&args[0], other]),
        },
    );

    register_family(
        &mut registry,
        "size",
        &[
            "size_string",
            "size_bytes",
            "size_list",
            "size_map",
            "string_size",
            "bytes_size",
            "list_size",
            "map_size",
        ],
        1,
        Traits::SIZER,
        |args| args[0].size(),
    );

    registry.register(FunctionOverload::new(
        "contains",
        "contains_string",
        2,
        |args| match (&args[0], &args[1]) {
            (Value::String(s), Value::String(sub)) => Value::Bool(s.contains(sub.as_ref())),
            (a, b) => Value::no_such_overload("contains", &[a, b]),
        },
    ));
    registry.register(FunctionOverload::new(
        "startsWith",
        "starts_with_string",
        2,
        |args| match (&args[0], &args[1]) {
            (Value::String(s), Value::String(prefix)) => {
                Value::Bool(s.starts_with(prefix.as_ref()))
            }
            (a, b) => Value::no_such_overload("startsWith", &[a, b]),
        },
    ));
    registry.register(FunctionOverload::new(
        "endsWith",
        "ends_with_string",
        2,
        |args| match (&args[0], &args[1]) {
            (Value::String(s), Value::String(suffix)) => {
                Value::Bool(s.ends_with(suffix.as_ref()))
            }
            (a, b) => Value::no_such_overload("endsWith", &[a, b]),
        },
    ));
    register_family(
        &mut registry,
        "matches",
        &["matches_string", "string_matches"],
        2,
        Traits::MATCHER,
        |args| match (&args[0], &args[1]) {
            (Value::String(subject), Value::String(pattern)) => {
                match regex::Regex::new(pattern) {
                    Ok(re) => Value::Bool(re.is_match(subject)),
                    Err(e) => Value::error(
                        ErrorKind::Regex,
                        format!("invalid regex pattern: {e}"),
                    ),
                }
            }
            (a, b) => Value::no_such_overload("matches", &[a, b]),
        },
    );

    // Conversions.
    register_family(
        &mut registry,
        "int",
        &[
            "int64_to_int64",
            "uint64_to_int64",
            "double_to_int64",
            "string_to_int64",
            "timestamp_to_int64",
        ],
        1,
        Traits::empty(),
        conversion(Type::Int),
    );
    register_family(
        &mut registry,
        "uint",
        &[
            "uint64_to_uint64",
            "int64_to_uint64",
            "double_to_uint64",
            "string_to_uint64",
        ],
        1,
        Traits::empty(),
        conversion(Type::Uint),
    );
    register_family(
        &mut registry,
        "double",
        &[
            "double_to_double",
            "int64_to_double",
            "uint64_to_double",
            "string_to_double",
        ],
        1,
        Traits::empty(),
        conversion(Type::Double),
    );
    register_family(
        &mut registry,
        "string",
        &[
            "string_to_string",
            "int64_to_string",
            "uint64_to_string",
            "double_to_string",
            "bool_to_string",
            "bytes_to_string",
            "duration_to_string",
            "timestamp_to_string",
        ],
        1,
        Traits::empty(),
        conversion(Type::String),
    );
    register_family(
        &mut registry,
        "bool",
        &["bool_to_bool", "string_to_bool"],
        1,
        Traits::empty(),
        conversion(Type::Bool),
    );
    register_family(
        &mut registry,
        "bytes",
        &["bytes_to_bytes", "string_to_bytes"],
        1,
        Traits::empty(),
        conversion(Type::Bytes),
    );
    register_family(
        &mut registry,
        "duration",
        &["duration_to_duration", "string_to_duration"],
        1,
        Traits::empty(),
        conversion(Type::Duration),
    );
    register_family(
        &mut registry,
        "timestamp",
        &[
            "timestamp_to_timestamp",
            "string_to_timestamp",
            "int64_to_timestamp",
        ],
        1,
        Traits::empty(),
        conversion(Type::Timestamp),
    );
    registry.register(FunctionOverload::new("dyn", "to_dyn", 1, |args| {
        args[0].clone()
    }));
    registry.register(FunctionOverload::new("type", "type", 1, |args| {
        Value::Type(args[0].type_of())
    }));

    // Calendar accessors; one implementation covers both receivers and the
    // optional tz argument.
    for (function, stems) in [
        ("getFullYear", "year"),
        ("getMonth", "month"),
        ("getDayOfYear", "day_of_year"),
        ("getDate", "day_of_month_1_based"),
        ("getDayOfMonth", "day_of_month_0_based"),
        ("getDayOfWeek", "day_of_week"),
    ] {
        let ts_id = format!("timestamp_to_{stems}");
        let tz_id = format!("timestamp_to_{stems}_with_tz");
        registry.register(FunctionOverload::new(
            function,
            &ts_id,
            1,
            calendar_accessor(function),
        ));
        registry.register(FunctionOverload::new(
            function,
            &tz_id,
            2,
            calendar_accessor(function),
        ));
    }
    for (function, stem) in [
        ("getHours", "hours"),
        ("getMinutes", "minutes"),
        ("getSeconds", "seconds"),
        ("getMilliseconds", "milliseconds"),
    ] {
        let ts_id = format!("timestamp_to_{stem}");
        let tz_id = format!("timestamp_to_{stem}_with_tz");
        let dur_id = format!("duration_to_{stem}");
        registry.register(FunctionOverload::new(
            function,
            &ts_id,
            1,
            calendar_accessor(function),
        ));
        registry.register(FunctionOverload::new(
            function,
            &tz_id,
            2,
            calendar_accessor(function),
        ));
        registry.register(FunctionOverload::new(
            function,
            &dur_id,
            1,
            calendar_accessor(function),
        ));
    }

    // Optionals.
    registry.register(FunctionOverload::new(
        "optional.of",
        "optional_of",
        1,
        |args| Value::optional_of(args[0].clone()),
    ));
    registry.register(FunctionOverload::new(
        "optional.ofNonZeroValue",
        "optional_of_non_zero_value",
        1,
        |args| {
            let zero = Value::zero_of(&args[0].type_of());
            if args[0] == zero || matches!(args[0], Value::Null) {
                Value::optional_none()
            } else {
                Value::optional_of(args[0].clone())
            }
        },
    ));
    registry.register(FunctionOverload::new(
        "optional.none",
        "optional_none",
        0,
        |_| Value::optional_none(),
    ));
    registry.register(FunctionOverload::new(
        "hasValue",
        "optional_has_value",
        1,
        |args| match &args[0] {
            Value::Optional(opt) => Value::Bool(opt.has_value()),
            other => Value::no_such_overload("hasValue", &[other]),
        },
    ));
    registry.register(FunctionOverload::new(
        "value",
        "optional_value",
        1,
        |args| match &args[0] {
            Value::Optional(opt) => opt.value(),
            other => Value::no_such_overload("value", &[other]),
        },
    ));
    registry.register(
        FunctionOverload::new("or", "optional_or", 2, |args| match &args[0] {
            Value::Error(_) => args[0].clone(),
            Value::Optional(opt) if opt.has_value() => args[0].clone(),
            Value::Optional(_) => args[1].clone(),
            other => Value::no_such_overload("or", &[other, &args[1]]),
        })
        .non_strict(),
    );
    registry.register(
        FunctionOverload::new("orValue", "optional_or_value", 2, |args| match &args[0] {
            Value::Error(_) => args[0].clone(),
            Value::Optional(opt) => match opt.as_option() {
                Some(v) => v.clone(),
                None => args[1].clone(),
            },
            other => Value::no_such_overload("orValue", &[other, &args[1]]),
        })
        .non_strict(),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(registry: &FunctionRegistry, id: &str, args: &[Value]) -> Value {
        registry.find(id).expect(id).call(args)
    }

    #[test]
    fn test_arithmetic_family_shares_dispatch() {
        let registry = standard_functions();
        assert_eq!(
            call(&registry, "add_int64", &[Value::Int(2), Value::Int(3)]),
            Value::Int(5)
        );
        assert_eq!(
            call(
                &registry,
                "add_string",
                &[Value::string("a"), Value::string("b")]
            ),
            Value::string("ab")
        );
        // The generic implementation rejects mismatches uniformly.
        assert!(call(&registry, "add_int64", &[Value::Int(1), Value::string("x")]).is_error());
    }

    #[test]
    fn test_comparisons_cross_type() {
        let registry = standard_functions();
        assert_eq!(
            call(
                &registry,
                "less_int64_uint64",
                &[Value::Int(-1), Value::Uint(0)]
            ),
            Value::Bool(true)
        );
        assert_eq!(
            call(
                &registry,
                "greater_equals_double_int64",
                &[Value::Double(2.5), Value::Int(2)]
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_nan_ordering_is_error() {
        let registry = standard_functions();
        assert!(call(
            &registry,
            "less_double",
            &[Value::Double(f64::NAN), Value::Double(1.0)]
        )
        .is_error());
    }

    #[test]
    fn test_matches_and_regex_error() {
        let registry = standard_functions();
        assert_eq!(
            call(
                &registry,
                "matches_string",
                &[Value::string("hello"), Value::string("^h.*o$")]
            ),
            Value::Bool(true)
        );
        match call(
            &registry,
            "matches_string",
            &[Value::string("x"), Value::string("(unclosed")],
        ) {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::Regex),
            other => panic!("expected regex error, got {other}"),
        }
    }

    #[test]
    fn test_not_strictly_false_guards() {
        let registry = standard_functions();
        let guard = registry.find("not_strictly_false").unwrap();
        assert_eq!(guard.call(&[Value::Bool(false)]), Value::Bool(false));
        assert_eq!(
            guard.call(&[Value::error(ErrorKind::DivideByZero, "x")]),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_optional_helpers() {
        let registry = standard_functions();
        assert_eq!(
            call(&registry, "optional_of_non_zero_value", &[Value::Int(0)]),
            Value::optional_none()
        );
        assert_eq!(
            call(
                &registry,
                "optional_or_value",
                &[Value::optional_none(), Value::string("fallback")]
            ),
            Value::string("fallback")
        );
        assert_eq!(
            call(
                &registry,
                "optional_or_value",
                &[
                    Value::optional_of(Value::string("present")),
                    Value::string("fallback")
                ]
            ),
            Value::string("present")
        );
    }

    #[test]
    fn test_calendar_dispatch_timestamp_and_duration() {
        let registry = standard_functions();
        let ts = verdict_core::datetime::parse_timestamp("2023-01-02T03:04:05Z").unwrap();
        assert_eq!(
            call(&registry, "timestamp_to_year", &[Value::Timestamp(ts)]),
            Value::Int(2023)
        );
        assert_eq!(
            call(
                &registry,
                "duration_to_minutes",
                &[Value::Duration(chrono::Duration::minutes(90))]
            ),
            Value::Int(90)
        );
    }
}
