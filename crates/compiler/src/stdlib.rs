//! Standard library declarations.
//!
//! Every operator and built-in function the checker knows out of the box:
//! logic, comparisons (including the cross-type numeric forms), arithmetic,
//! indexing and membership, size, string predicates, conversions, calendar
//! accessors, and the optional-value helpers. Runtime bindings for these
//! overload ids live in the runtime crate.

use verdict_core::types::Type;

use crate::decls::{Declaration, OverloadDecl};

fn param(name: &str) -> Type {
    Type::type_param(name)
}

fn global(id: &str, params: Vec<Type>, result: Type) -> OverloadDecl {
    OverloadDecl::global(id, params, result)
}

fn member(id: &str, params: Vec<Type>, result: Type) -> OverloadDecl {
    OverloadDecl::instance(id, params, result)
}

/// Comparison overloads for one operator, e.g. `less` for `_<_`.
fn comparison_overloads(op: &str) -> Vec<OverloadDecl> {
    let b = Type::Bool;
    vec![
        global(&format!("{op}_int64"), vec![Type::Int, Type::Int], b.clone()),
        global(
            &format!("{op}_int64_double"),
            vec![Type::Int, Type::Double],
            b.clone(),
        ),
        global(
            &format!("{op}_int64_uint64"),
            vec![Type::Int, Type::Uint],
            b.clone(),
        ),
        global(&format!("{op}_uint64"), vec![Type::Uint, Type::Uint], b.clone()),
        global(
            &format!("{op}_uint64_double"),
            vec![Type::Uint, Type::Double],
            b.clone(),
        ),
        global(
            &format!("{op}_uint64_int64"),
            vec![Type::Uint, Type::Int],
            b.clone(),
        ),
        global(
            &format!("{op}_double"),
            vec![Type::Double, Type::Double],
            b.clone(),
        ),
        global(
            &format!("{op}_double_int64"),
            vec![Type::Double, Type::Int],
            b.clone(),
        ),
        global(
            &format!("{op}_double_uint64"),
            vec![Type::Double, Type::Uint],
            b.clone(),
        ),
        global(&format!("{op}_bool"), vec![Type::Bool, Type::Bool], b.clone()),
        global(
            &format!("{op}_string"),
            vec![Type::String, Type::String],
            b.clone(),
        ),
        global(
            &format!("{op}_bytes"),
            vec![Type::Bytes, Type::Bytes],
            b.clone(),
        ),
        global(
            &format!("{op}_duration"),
            vec![Type::Duration, Type::Duration],
            b.clone(),
        ),
        global(
            &format!("{op}_timestamp"),
            vec![Type::Timestamp, Type::Timestamp],
            b,
        ),
    ]
}

/// Zero- and one-argument (tz name) calendar accessor declarations.
fn timestamp_accessor(function: &str, id_stem: &str) -> Declaration {
    Declaration::function(
        function,
        vec![
            member(
                &format!("timestamp_to_{id_stem}"),
                vec![Type::Timestamp],
                Type::Int,
            ),
            member(
                &format!("timestamp_to_{id_stem}_with_tz"),
                vec![Type::Timestamp, Type::String],
                Type::Int,
            ),
        ],
    )
}

fn duration_accessor(id_stem: &str) -> OverloadDecl {
    member(
        &format!("duration_to_{id_stem}"),
        vec![Type::Duration],
        Type::Int,
    )
}

/// The full standard declaration set.
pub fn standard_declarations() -> Vec<Declaration> {
    let a = || param("A");
    let b_param = || param("B");
    let mut decls = vec![
        // Logic. The ternary threads a type parameter through its branches.
        Declaration::function(
            "_&&_",
            vec![global(
                "logical_and",
                vec![Type::Bool, Type::Bool],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "_||_",
            vec![global(
                "logical_or",
                vec![Type::Bool, Type::Bool],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "!_",
            vec![global("logical_not", vec![Type::Bool], Type::Bool)],
        ),
        Declaration::function(
            "_?_:_",
            vec![global(
                "conditional",
                vec![Type::Bool, a(), a()],
                a(),
            )],
        ),
        Declaration::function(
            "@not_strictly_false",
            vec![global(
                "not_strictly_false",
                vec![Type::Bool],
                Type::Bool,
            )],
        ),
        // Equality. The checker also admits cross-type numeric operands.
        Declaration::function(
            "_==_",
            vec![global("equals", vec![a(), a()], Type::Bool)],
        ),
        Declaration::function(
            "_!=_",
            vec![global("not_equals", vec![a(), a()], Type::Bool)],
        ),
        // Arithmetic.
        Declaration::function(
            "_+_",
            vec![
                global("add_int64", vec![Type::Int, Type::Int], Type::Int),
                global("add_uint64", vec![Type::Uint, Type::Uint], Type::Uint),
                global("add_double", vec![Type::Double, Type::Double], Type::Double),
                global("add_string", vec![Type::String, Type::String], Type::String),
                global("add_bytes", vec![Type::Bytes, Type::Bytes], Type::Bytes),
                global(
                    "add_list",
                    vec![Type::list(a()), Type::list(a())],
                    Type::list(a()),
                ),
                global(
                    "add_duration_duration",
                    vec![Type::Duration, Type::Duration],
                    Type::Duration,
                ),
                global(
                    "add_timestamp_duration",
                    vec![Type::Timestamp, Type::Duration],
                    Type::Timestamp,
                ),
                global(
                    "add_duration_timestamp",
                    vec![Type::Duration, Type::Timestamp],
                    Type::Timestamp,
                ),
            ],
        ),
        Declaration::function(
            "_-_",
            vec![
                global("subtract_int64", vec![Type::Int, Type::Int], Type::Int),
                global("subtract_uint64", vec![Type::Uint, Type::Uint], Type::Uint),
                global(
                    "subtract_double",
                    vec![Type::Double, Type::Double],
                    Type::Double,
                ),
                global(
                    "subtract_duration_duration",
                    vec![Type::Duration, Type::Duration],
                    Type::Duration,
                ),
                global(
                    "subtract_timestamp_duration",
                    vec![Type::Timestamp, Type::Duration],
                    Type::Timestamp,
                ),
                global(
                    "subtract_timestamp_timestamp",
                    vec![Type::Timestamp, Type::Timestamp],
                    Type::Duration,
                ),
            ],
        ),
        Declaration::function(
            "_*_",
            vec![
                global("multiply_int64", vec![Type::Int, Type::Int], Type::Int),
                global("multiply_uint64", vec![Type::Uint, Type::Uint], Type::Uint),
                global(
                    "multiply_double",
                    vec![Type::Double, Type::Double],
                    Type::Double,
                ),
            ],
        ),
        Declaration::function(
            "_/_",
            vec![
                global("divide_int64", vec![Type::Int, Type::Int], Type::Int),
                global("divide_uint64", vec![Type::Uint, Type::Uint], Type::Uint),
                global(
                    "divide_double",
                    vec![Type::Double, Type::Double],
                    Type::Double,
                ),
            ],
        ),
        Declaration::function(
            "_%_",
            vec![
                global("modulo_int64", vec![Type::Int, Type::Int], Type::Int),
                global("modulo_uint64", vec![Type::Uint, Type::Uint], Type::Uint),
            ],
        ),
        Declaration::function(
            "-_",
            vec![
                global("negate_int64", vec![Type::Int], Type::Int),
                global("negate_double", vec![Type::Double], Type::Double),
            ],
        ),
        // Indexing and membership.
        Declaration::function(
            "_[_]",
            vec![
                global("index_list", vec![Type::list(a()), Type::Int], a()),
                global(
                    "index_map",
                    vec![Type::map(a(), b_param()), a()],
                    b_param(),
                ),
            ],
        ),
        Declaration::function(
            "_[?_]",
            vec![
                global(
                    "optindex_list",
                    vec![Type::list(a()), Type::Int],
                    Type::optional(a()),
                ),
                global(
                    "optindex_map",
                    vec![Type::map(a(), b_param()), a()],
                    Type::optional(b_param()),
                ),
            ],
        ),
        Declaration::function(
            "@in",
            vec![
                global("in_list", vec![a(), Type::list(a())], Type::Bool),
                global("in_map", vec![a(), Type::map(a(), b_param())], Type::Bool),
            ],
        ),
        // Size, global and receiver style.
        Declaration::function(
            "size",
            vec![
                global("size_string", vec![Type::String], Type::Int),
                global("size_bytes", vec![Type::Bytes], Type::Int),
                global("size_list", vec![Type::list(a())], Type::Int),
                global("size_map", vec![Type::map(a(), b_param())], Type::Int),
                member("string_size", vec![Type::String], Type::Int),
                member("bytes_size", vec![Type::Bytes], Type::Int),
                member("list_size", vec![Type::list(a())], Type::Int),
                member("map_size", vec![Type::map(a(), b_param())], Type::Int),
            ],
        ),
        // String predicates.
        Declaration::function(
            "contains",
            vec![member(
                "contains_string",
                vec![Type::String, Type::String],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "startsWith",
            vec![member(
                "starts_with_string",
                vec![Type::String, Type::String],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "endsWith",
            vec![member(
                "ends_with_string",
                vec![Type::String, Type::String],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "matches",
            vec![
                global(
                    "matches_string",
                    vec![Type::String, Type::String],
                    Type::Bool,
                ),
                member(
                    "string_matches",
                    vec![Type::String, Type::String],
                    Type::Bool,
                ),
            ],
        ),
        // Conversions.
        Declaration::function(
            "int",
            vec![
                global("int64_to_int64", vec![Type::Int], Type::Int),
                global("uint64_to_int64", vec![Type::Uint], Type::Int),
                global("double_to_int64", vec![Type::Double], Type::Int),
                global("string_to_int64", vec![Type::String], Type::Int),
                global("timestamp_to_int64", vec![Type::Timestamp], Type::Int),
            ],
        ),
        Declaration::function(
            "uint",
            vec![
                global("uint64_to_uint64", vec![Type::Uint], Type::Uint),
                global("int64_to_uint64", vec![Type::Int], Type::Uint),
                global("double_to_uint64", vec![Type::Double], Type::Uint),
                global("string_to_uint64", vec![Type::String], Type::Uint),
            ],
        ),
        Declaration::function(
            "double",
            vec![
                global("double_to_double", vec![Type::Double], Type::Double),
                global("int64_to_double", vec![Type::Int], Type::Double),
                global("uint64_to_double", vec![Type::Uint], Type::Double),
                global("string_to_double", vec![Type::String], Type::Double),
            ],
        ),
        Declaration::function(
            "string",
            vec![
                global("string_to_string", vec![Type::String], Type::String),
                global("int64_to_string", vec![Type::Int], Type::String),
                global("uint64_to_string", vec![Type::Uint], Type::String),
                global("double_to_string", vec![Type::Double], Type::String),
                global("bool_to_string", vec![Type::Bool], Type::String),
                global("bytes_to_string", vec![Type::Bytes], Type::String),
                global("duration_to_string", vec![Type::Duration], Type::String),
                global("timestamp_to_string", vec![Type::Timestamp], Type::String),
            ],
        ),
        Declaration::function(
            "bool",
            vec![
                global("bool_to_bool", vec![Type::Bool], Type::Bool),
                global("string_to_bool", vec![Type::String], Type::Bool),
            ],
        ),
        Declaration::function(
            "bytes",
            vec![
                global("bytes_to_bytes", vec![Type::Bytes], Type::Bytes),
                global("string_to_bytes", vec![Type::String], Type::Bytes),
            ],
        ),
        Declaration::function(
            "duration",
            vec![
                global("duration_to_duration", vec![Type::Duration], Type::Duration),
                global("string_to_duration", vec![Type::String], Type::Duration),
            ],
        ),
        Declaration::function(
            "timestamp",
            vec![
                global(
                    "timestamp_to_timestamp",
                    vec![Type::Timestamp],
                    Type::Timestamp,
                ),
                global("string_to_timestamp", vec![Type::String], Type::Timestamp),
                global("int64_to_timestamp", vec![Type::Int], Type::Timestamp),
            ],
        ),
        Declaration::function("dyn", vec![global("to_dyn", vec![a()], Type::Dyn)]),
        Declaration::function(
            "type",
            vec![global("type", vec![a()], Type::type_of(a()))],
        ),
        // Optional values.
        Declaration::function(
            "optional.of",
            vec![global("optional_of", vec![a()], Type::optional(a()))],
        ),
        Declaration::function(
            "optional.ofNonZeroValue",
            vec![global(
                "optional_of_non_zero_value",
                vec![a()],
                Type::optional(a()),
            )],
        ),
        Declaration::function(
            "optional.none",
            vec![global("optional_none", vec![], Type::optional(Type::Dyn))],
        ),
        Declaration::function(
            "hasValue",
            vec![member(
                "optional_has_value",
                vec![Type::optional(a())],
                Type::Bool,
            )],
        ),
        Declaration::function(
            "value",
            vec![member("optional_value", vec![Type::optional(a())], a())],
        ),
        Declaration::function(
            "or",
            vec![member(
                "optional_or",
                vec![Type::optional(a()), Type::optional(a())],
                Type::optional(a()),
            )],
        ),
        Declaration::function(
            "orValue",
            vec![member(
                "optional_or_value",
                vec![Type::optional(a()), a()],
                a(),
            )],
        ),
        // Comparisons.
        Declaration::function("_<_", comparison_overloads("less")),
        Declaration::function("_<=_", comparison_overloads("less_equals")),
        Declaration::function("_>_", comparison_overloads("greater")),
        Declaration::function("_>=_", comparison_overloads("greater_equals")),
        // Calendar accessors.
        timestamp_accessor("getFullYear", "year"),
        timestamp_accessor("getMonth", "month"),
        timestamp_accessor("getDayOfYear", "day_of_year"),
        timestamp_accessor("getDate", "day_of_month_1_based"),
        timestamp_accessor("getDayOfMonth", "day_of_month_0_based"),
        timestamp_accessor("getDayOfWeek", "day_of_week"),
        timestamp_accessor("getHours", "hours"),
        timestamp_accessor("getMinutes", "minutes"),
        timestamp_accessor("getSeconds", "seconds"),
        timestamp_accessor("getMilliseconds", "milliseconds"),
    ];
    // Duration shares the time-grain accessor names.
    for (function, stem) in [
        ("getHours", "hours"),
        ("getMinutes", "minutes"),
        ("getSeconds", "seconds"),
        ("getMilliseconds", "milliseconds"),
    ] {
        decls.push(Declaration::function(
            function,
            vec![duration_accessor(stem)],
        ));
    }
    // Type names usable as identifiers, e.g. `type(x) == int`.
    for (name, ty) in [
        ("bool", Type::Bool),
        ("bytes", Type::Bytes),
        ("double", Type::Double),
        ("int", Type::Int),
        ("string", Type::String),
        ("uint", Type::Uint),
        ("list", Type::list(Type::Dyn)),
        ("map", Type::map(Type::Dyn, Type::Dyn)),
        ("null_type", Type::Null),
        ("type", Type::TypeOf(None)),
        ("dyn", Type::Dyn),
    ] {
        decls.push(Declaration::variable(name, Type::type_of(ty)));
    }
    decls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decls::DeclScope;

    fn scope() -> DeclScope {
        let mut scope = DeclScope::new();
        for decl in standard_declarations() {
            scope.add(decl);
        }
        scope
    }

    #[test]
    fn test_operators_present() {
        let scope = scope();
        for op in ["_&&_", "_||_", "_+_", "_==_", "_[_]", "@in", "_?_:_"] {
            assert!(scope.find_function(op).is_some(), "missing {op}");
        }
    }

    #[test]
    fn test_cross_type_comparisons_declared() {
        let scope = scope();
        let less = scope.find_function("_<_").unwrap();
        assert!(less.overloads.iter().any(|o| o.id == "less_int64_uint64"));
        assert!(less.overloads.iter().any(|o| o.id == "less_double_uint64"));
    }

    #[test]
    fn test_type_idents_declared() {
        let scope = scope();
        let int_ident = scope.find_ident("int").unwrap();
        assert_eq!(int_ident.ty, Type::type_of(Type::Int));
    }

    #[test]
    fn test_duration_accessor_overloads_merge_with_timestamp() {
        let scope = scope();
        let hours = scope.find_function("getHours").unwrap();
        assert!(hours.overloads.iter().any(|o| o.id == "timestamp_to_hours"));
        assert!(hours.overloads.iter().any(|o| o.id == "duration_to_hours"));
    }
}
