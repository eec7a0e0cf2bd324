//! End-to-end evaluation tests: compile, plan, eval.

use verdict_core::error::ErrorKind;
use verdict_core::types::Type;
use verdict_core::value::Value;
use verdict_runtime::{Env, MapActivation, ProgramOptions};

fn eval(source: &str) -> Value {
    eval_with(source, Env::new(), &MapActivation::new())
}

fn eval_with(source: &str, env: Env, vars: &MapActivation) -> Value {
    let ast = match env.compile(source) {
        Ok(ast) => ast,
        Err(issues) => panic!("compile failed for {source:?}:\n{issues}"),
    };
    let program = env.program(&ast);
    program.eval(vars).0
}

fn assert_error_kind(value: Value, kind: ErrorKind) {
    match value {
        Value::Error(e) => assert_eq!(e.kind, kind, "unexpected error: {e}"),
        other => panic!("expected {kind:?} error, got {other}"),
    }
}

#[test]
fn test_arithmetic_and_precedence() {
    assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
    assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(eval("7 % 3 + 10 / 2"), Value::Int(6));
    assert_eq!(eval("-(3 - 5)"), Value::Int(2));
    assert_eq!(eval("2.5 * 4.0"), Value::Double(10.0));
}

#[test]
fn test_integer_overflow_boundaries() {
    assert_error_kind(eval("9223372036854775807 + 1"), ErrorKind::Overflow);
    assert_error_kind(eval("0u - 1u"), ErrorKind::Overflow);
    assert_error_kind(eval("-9223372036854775808 / -1"), ErrorKind::Overflow);
}

#[test]
fn test_division_and_modulus_by_zero() {
    assert_error_kind(eval("1 / 0"), ErrorKind::DivideByZero);
    assert_error_kind(eval("1 % 0"), ErrorKind::ModulusByZero);
    // Doubles follow IEEE-754 instead.
    assert_eq!(eval("1.0 / 0.0"), Value::Double(f64::INFINITY));
}

#[test]
fn test_double_to_int_overflow() {
    assert_error_kind(eval("int(1.0 / 0.0)"), ErrorKind::Overflow);
    assert_error_kind(eval("int(0.0 / 0.0)"), ErrorKind::Overflow);
    assert_eq!(eval("int(-2.9)"), Value::Int(-2));
    assert_eq!(eval("uint(42.9)"), Value::Uint(42));
}

#[test]
fn test_string_size_in_code_points() {
    assert_eq!(eval("size('日本語')"), Value::Int(3));
    assert_eq!(eval("'日本語'.size()"), Value::Int(3));
    assert_eq!(eval("size(b'abc')"), Value::Int(3));
}

#[test]
fn test_string_operations() {
    assert_eq!(eval("'hello'.contains('ell')"), Value::Bool(true));
    assert_eq!(eval("'hello'.startsWith('he')"), Value::Bool(true));
    assert_eq!(eval("'hello'.endsWith('lo')"), Value::Bool(true));
    assert_eq!(eval("'hello'.matches('^h.*o$')"), Value::Bool(true));
    assert_eq!(eval("matches('hello', 'e.l')"), Value::Bool(true));
    assert_error_kind(eval("'x'.matches('(unclosed')"), ErrorKind::Regex);
}

#[test]
fn test_cross_type_numeric_comparison() {
    assert_eq!(eval("1 < 2u"), Value::Bool(true));
    assert_eq!(eval("1 == 1u"), Value::Bool(true));
    assert_eq!(eval("1 == 1.0"), Value::Bool(true));
    assert_eq!(
        eval("9223372036854775807 < 9223372036854775808u"),
        Value::Bool(true)
    );
    assert_eq!(eval("-1 < 0u"), Value::Bool(true));
    assert_eq!(eval("2.5 >= 2"), Value::Bool(true));
}

#[test]
fn test_nan_semantics() {
    // NaN equality is false; NaN ordering is an error.
    assert_eq!(eval("0.0 / 0.0 == 0.0 / 0.0"), Value::Bool(false));
    assert!(eval("0.0 / 0.0 < 1.0").is_error());
}

#[test]
fn test_list_operations() {
    assert_eq!(eval("[1, 2] + [3]"), eval("[1, 2, 3]"));
    assert_eq!(eval("size([1, 2] + [3])"), Value::Int(3));
    assert_eq!(eval("([1] + [2, 3])[1]"), Value::Int(2));
    assert_eq!(eval("2 in [1, 2, 3]"), Value::Bool(true));
    assert_eq!(eval("5 in [1, 2, 3]"), Value::Bool(false));
    assert_error_kind(eval("[1, 2][5]"), ErrorKind::NoSuchKey);
}

#[test]
fn test_map_operations() {
    assert_eq!(eval("{'a': 1, 'b': 2}['b']"), Value::Int(2));
    assert_eq!(eval("'a' in {'a': 1}"), Value::Bool(true));
    assert_eq!(eval("size({'a': 1, 'b': 2})"), Value::Int(2));
    assert_error_kind(eval("{'a': 1}['zzz']"), ErrorKind::NoSuchKey);
    assert_eq!(eval("has({'a': 1}.a)"), Value::Bool(true));
    assert_eq!(eval("has({'a': 1}.b)"), Value::Bool(false));
}

#[test]
fn test_cross_type_map_keys_stay_distinct() {
    assert_eq!(eval("{1: 'int', 1u: 'uint'}[1u]"), Value::string("uint"));
    assert_eq!(eval("{1: 'int', 1u: 'uint'}[1]"), Value::string("int"));
    assert_eq!(eval("dyn(1) in {1u: 'uint'}"), Value::Bool(false));
}

#[test]
fn test_duplicate_map_key_is_error() {
    assert!(eval("{'k': 1, 'k': 2}").is_error());
}

#[test]
fn test_short_circuit_logic() {
    assert_eq!(eval("false && (1 / 0 == 0)"), Value::Bool(false));
    assert_eq!(eval("(1 / 0 == 0) && false"), Value::Bool(false));
    assert_eq!(eval("true || (1 / 0 == 0)"), Value::Bool(true));
    assert_eq!(eval("(1 / 0 == 0) || true"), Value::Bool(true));
    assert_error_kind(eval("true && (1 / 0 == 0)"), ErrorKind::DivideByZero);
    assert_error_kind(eval("false || (1 / 0 == 0)"), ErrorKind::DivideByZero);
}

#[test]
fn test_conditional_evaluates_selected_branch_only() {
    assert_eq!(eval("true ? 1 : 1 / 0"), Value::Int(1));
    assert_eq!(eval("false ? 1 / 0 : 2"), Value::Int(2));
}

#[test]
fn test_comprehension_macros() {
    assert_eq!(eval("[1, 2, 3].all(x, x < 10)"), Value::Bool(true));
    assert_eq!(eval("[1, 2, 30].all(x, x < 10)"), Value::Bool(false));
    assert_eq!(eval("[1, 2, 3].exists(x, x == 2)"), Value::Bool(true));
    assert_eq!(eval("[1, 2, 3].exists_one(x, x > 2)"), Value::Bool(true));
    assert_eq!(eval("[1, 2, 3].exists_one(x, x > 1)"), Value::Bool(false));
    assert_eq!(eval("[1, 2, 3].filter(x, x % 2 == 1)"), eval("[1, 3]"));
    assert_eq!(eval("[1, 2, 3].map(x, x * 2)"), eval("[2, 4, 6]"));
    assert_eq!(eval("[1, 2, 3].map(x, x > 1, x * 2)"), eval("[4, 6]"));
}

#[test]
fn test_empty_comprehension_identities() {
    assert_eq!(eval("[].all(x, false)"), Value::Bool(true));
    assert_eq!(eval("[].exists(x, true)"), Value::Bool(false));
    assert_eq!(eval("[].exists_one(x, true)"), Value::Bool(false));
}

#[test]
fn test_nested_comprehensions() {
    assert_eq!(
        eval("[[1, 2], [3]].map(xs, xs.map(x, x * 10))"),
        eval("[[10, 20], [30]]")
    );
    assert_eq!(
        eval("[1, 2].all(x, [3, 4].exists(y, y == x + 2))"),
        Value::Bool(true)
    );
}

#[test]
fn test_map_iteration_yields_keys() {
    assert_eq!(
        eval("{'a': 1, 'b': 2}.all(k, k in ['a', 'b'])"),
        Value::Bool(true)
    );
}

#[test]
fn test_comprehension_error_propagates() {
    assert_error_kind(
        eval("[1, 0, 2].map(x, 10 / x)"),
        ErrorKind::DivideByZero,
    );
    // But all() can absorb an error when another element decides.
    assert_eq!(eval("[1, 0].all(x, 10 / x > 100)"), Value::Bool(false));
}

#[test]
fn test_conversions() {
    assert_eq!(eval("int('42')"), Value::Int(42));
    assert_eq!(eval("uint(42)"), Value::Uint(42));
    assert_eq!(eval("double('2.5')"), Value::Double(2.5));
    assert_eq!(eval("string(42)"), Value::string("42"));
    assert_eq!(eval("string(2.5)"), Value::string("2.5"));
    assert_eq!(eval("bool('true')"), Value::Bool(true));
    assert_eq!(eval("string(b'abc')"), Value::string("abc"));
    assert_eq!(eval("bytes('abc')"), Value::bytes("abc".as_bytes().to_vec()));
    assert_error_kind(eval("int('forty-two')"), ErrorKind::TypeConversion);
}

#[test]
fn test_type_reflection() {
    assert_eq!(eval("type(1) == int"), Value::Bool(true));
    assert_eq!(eval("type('a') == string"), Value::Bool(true));
    assert_eq!(eval("type(type(1)) == type"), Value::Bool(true));
    assert_eq!(eval("type(1) == type(2)"), Value::Bool(true));
    assert_eq!(eval("type(1) == uint"), Value::Bool(false));
}

#[test]
fn test_dyn_conversion_defers_typing() {
    assert_eq!(eval("dyn(1) + 2"), Value::Int(3));
    assert_eq!(eval("dyn('a') + 'b'"), Value::string("ab"));
}

#[test]
fn test_timestamp_and_duration() {
    assert_eq!(
        eval("timestamp('2023-06-15T12:00:00Z').getFullYear()"),
        Value::Int(2023)
    );
    assert_eq!(
        eval("timestamp('2023-01-01T00:30:00Z').getFullYear('America/New_York')"),
        Value::Int(2022)
    );
    assert_eq!(eval("duration('90s').getMinutes()"), Value::Int(1));
    assert_eq!(
        eval("timestamp('2023-06-15T12:00:00Z') + duration('1h') == timestamp('2023-06-15T13:00:00Z')"),
        Value::Bool(true)
    );
    assert_eq!(
        eval("timestamp('2023-06-15T12:00:00Z') - timestamp('2023-06-15T11:00:00Z') == duration('1h')"),
        Value::Bool(true)
    );
    assert_eq!(eval("string(duration('90s'))"), Value::string("90s"));
    assert_error_kind(
        eval("timestamp('2023-01-01T00:00:00Z').getHours('Mars/Olympus')"),
        ErrorKind::TypeConversion,
    );
}

#[test]
fn test_optional_values() {
    assert_eq!(eval("optional.of(3).hasValue()"), Value::Bool(true));
    assert_eq!(eval("optional.none().hasValue()"), Value::Bool(false));
    assert_eq!(eval("optional.of(3).value()"), Value::Int(3));
    assert_eq!(eval("{'a': 1}[?'a'].orValue(0)"), Value::Int(1));
    assert_eq!(eval("{'a': 1}[?'zzz'].orValue(0)"), Value::Int(0));
    assert_eq!(eval("{'a': 1}.?a.orValue(0)"), Value::Int(1));
    assert_eq!(eval("{'a': 1}.?zzz.orValue(7)"), Value::Int(7));
    assert_eq!(eval("[1, ?optional.none(), 2]"), eval("[1, 2]"));
    assert_eq!(eval("[1, ?optional.of(9), 2]"), eval("[1, 9, 2]"));
    assert_eq!(eval("optional.ofNonZeroValue(0).hasValue()"), Value::Bool(false));
}

#[test]
fn test_variable_bindings() {
    let env = Env::new()
        .declare(verdict_compiler::Declaration::variable("x", Type::Int))
        .declare(verdict_compiler::Declaration::variable("name", Type::String));
    let vars = MapActivation::new().bind("x", 41i64).bind("name", "verdict");
    assert_eq!(eval_with("x + 1", env.clone(), &vars), Value::Int(42));
    assert_eq!(
        eval_with("name + '!'", env.clone(), &vars),
        Value::string("verdict!")
    );
    // Declared but unbound is an attribute failure, not a crash.
    assert_error_kind(
        eval_with("x + 1", env, &MapActivation::new()),
        ErrorKind::NoSuchAttribute,
    );
}

#[test]
fn test_compile_errors_are_collected_and_rendered() {
    let env = Env::new();
    let issues = env.compile("1 + 'one' && undeclared").unwrap_err();
    assert!(issues.len() >= 2, "expected multiple issues:\n{issues}");
    let rendered = issues.to_string();
    assert!(rendered.contains("ERROR: <input>:1:"));
    assert!(rendered.contains("^"));
}

#[test]
fn test_deterministic_repeated_evaluation() {
    let env = Env::new();
    let ast = env
        .compile("{'b': 2, 'a': 1, 'c': 3}.map(k, k).size() + size([1, 2])")
        .unwrap();
    let program = env.program(&ast);
    let first = program.eval(&MapActivation::new()).0;
    for _ in 0..10 {
        assert_eq!(program.eval(&MapActivation::new()).0, first);
    }
    assert_eq!(first, Value::Int(5));
}

#[test]
fn test_parallel_evaluations_share_one_program() {
    let env = Env::new().declare(verdict_compiler::Declaration::variable("n", Type::Int));
    let ast = env.compile("[1, 2, 3].map(x, x * n).size()").unwrap();
    let program = std::sync::Arc::new(env.program(&ast));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let program = std::sync::Arc::clone(&program);
            std::thread::spawn(move || {
                let vars = MapActivation::new().bind("n", i as i64);
                program.eval(&vars).0
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::Int(3));
    }
}

#[test]
fn test_cost_limit_enforced() {
    let env = Env::new();
    let ast = env.compile("[1, 2, 3, 4].map(x, [x, x]).size()").unwrap();
    let unlimited = env.program(&ast);
    let (value, details) = unlimited.eval(&MapActivation::new());
    assert_eq!(value, Value::Int(4));
    assert!(details.cost > 0);

    let limited = env.program_with_options(
        &ast,
        ProgramOptions {
            cost_limit: Some(details.cost / 2),
            ..ProgramOptions::default()
        },
    );
    assert_error_kind(
        limited.eval(&MapActivation::new()).0,
        ErrorKind::CostLimitExceeded,
    );
}

#[test]
fn test_cost_monotonic_in_input_size() {
    let env = Env::new();
    let short = env.compile("'ab'.contains('a')").unwrap();
    let long = env.compile("'abcdefghijklmnopqrstuvwxyz'.contains('a')").unwrap();
    let (_, short_details) = env.program(&short).eval(&MapActivation::new());
    let (_, long_details) = env.program(&long).eval(&MapActivation::new());
    assert!(long_details.cost >= short_details.cost);
}

#[test]
fn test_constant_folding_preserves_semantics() {
    let env = Env::new().declare(verdict_compiler::Declaration::variable("x", Type::Int));
    let ast = env.compile("x + (2 * 3 + 4)").unwrap();
    let folded = env.program_with_options(
        &ast,
        ProgramOptions {
            constant_folding: true,
            ..ProgramOptions::default()
        },
    );
    let plain = env.program(&ast);
    let vars = MapActivation::new().bind("x", 1i64);
    assert_eq!(folded.eval(&vars).0, plain.eval(&vars).0);
    assert_eq!(folded.eval(&vars).0, Value::Int(11));
}

#[test]
fn test_tracked_state_matches_default_result() {
    let env = Env::new().declare(verdict_compiler::Declaration::variable("x", Type::Int));
    let vars = MapActivation::new().bind("x", 7i64);
    for source in [
        "x * 2 + 1",
        "[x, 2, 3].all(v, v > 0)",
        "x > 5 ? 'big' : 'small'",
    ] {
        let ast = env.compile(source).unwrap();
        let plain = env.program(&ast).eval(&vars).0;
        let tracked_program = env.program_with_options(
            &ast,
            ProgramOptions {
                track_state: true,
                ..ProgramOptions::default()
            },
        );
        let (tracked, details) = tracked_program.eval(&vars);
        assert_eq!(plain, tracked, "mismatch for {source}");
        let state = details.state.expect("tracked state");
        assert_eq!(state.value(ast.expr.id), Some(&tracked));
    }
}

#[test]
fn test_exhaustive_mode_covers_both_branches() {
    let env = Env::new();
    let ast = env.compile("true ? 10 : 20").unwrap();
    let program = env.program_with_options(
        &ast,
        ProgramOptions {
            exhaustive: true,
            ..ProgramOptions::default()
        },
    );
    let (value, details) = program.eval(&MapActivation::new());
    assert_eq!(value, Value::Int(10));
    let state = details.state.expect("exhaustive state");
    // Both branch values were evaluated and recorded.
    let recorded: Vec<Value> = state
        .ids()
        .filter_map(|id| state.value(id).cloned())
        .collect();
    assert!(recorded.contains(&Value::Int(10)));
    assert!(recorded.contains(&Value::Int(20)));
}

#[test]
fn test_env_extend_isolation() {
    let parent = Env::new();
    let child = parent
        .extend()
        .declare(verdict_compiler::Declaration::variable("only_child", Type::Int));
    assert!(child.compile("only_child + 1").is_ok());
    assert!(parent.compile("only_child + 1").is_err());
}

#[test]
fn test_json_bindings_interchange() {
    // Dynamic JSON adapts with well-known-type semantics: objects are
    // maps, numbers are doubles.
    let env = Env::new().declare(verdict_compiler::Declaration::variable(
        "payload",
        Type::map(Type::String, Type::Dyn),
    ));
    let payload = Value::from_json(&serde_json::json!({
        "user": {"name": "ada", "admin": true},
        "count": 3,
    }));
    let vars = MapActivation::new().bind("payload", payload);
    assert_eq!(
        eval_with("payload.user.name", env.clone(), &vars),
        Value::string("ada")
    );
    assert_eq!(
        eval_with("payload.user.admin && payload.count == 3.0", env.clone(), &vars),
        Value::Bool(true)
    );
    // And back out to JSON.
    let ast = env.compile("payload.user").unwrap();
    let (value, _) = env.program(&ast).eval(&vars);
    let json = value.to_json().unwrap();
    assert_eq!(json["name"], serde_json::json!("ada"));
}

#[test]
#[serial_test::serial]
fn test_default_env_uses_process_wide_registry() {
    // Installing after first use is a no-op; environments still observe
    // one shared registry and extend it copy-on-write.
    let first = verdict_core::registry::TypeRegistry::global();
    verdict_core::registry::TypeRegistry::install(verdict_core::registry::TypeRegistry::new());
    let env = Env::new();
    assert!(std::sync::Arc::ptr_eq(&first, env.registry()));

    let extended = env.register_struct(verdict_core::registry::StructDescriptor::new("x.Y"));
    assert!(!std::sync::Arc::ptr_eq(&first, extended.registry()));
    assert!(first.find_struct("x.Y").is_none());
}

#[test]
fn test_tracing_does_not_disturb_evaluation() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    assert_eq!(eval("1 + 1"), Value::Int(2));
}

#[test]
fn test_error_reaching_top_level_is_returned_not_raised() {
    let value = eval("1 / 0");
    assert!(value.is_error());
    // And printing it shows kind and message.
    assert!(value.to_string().contains("divide_by_zero"));
}
