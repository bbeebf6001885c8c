use pretty_assertions::assert_eq;
use ship::error::RuntimeError;
use ship::{run_captured, ErrorClass, ErrorKind, ShipError, VmConfig};

fn runtime_error(source: &str) -> RuntimeError {
    match run_captured(source, VmConfig::default().with_file_name("test.ship")) {
        Err(ShipError::Runtime(err)) => err,
        other => panic!("expected runtime error, got {:?}", other),
    }
}

fn compile_errors(source: &str) -> Vec<ErrorKind> {
    match run_captured(source, VmConfig::default()) {
        Err(ShipError::Compile(diagnostics)) => diagnostics.into_iter().map(|d| d.kind).collect(),
        other => panic!("expected compile error, got {:?}", other),
    }
}

#[test]
fn test_string_divided_by_number() {
    let err = runtime_error("print(\"a\" / 2);");
    assert_eq!(err.class(), ErrorClass::Type);
    assert_eq!(err.kind, ErrorKind::UnsupportedOperands("/", "string", "number"));
}

#[test]
fn test_number_plus_string_suggests_conversion() {
    let err = runtime_error("var n = 1;\nprint(n + \"a\");");
    assert_eq!(err.class(), ErrorClass::Type);
    assert_eq!(
        err.to_string(),
        "TypeError: unsupported operand types for +: 'number' and 'string' (use str() to convert)\n  [test.ship:2]"
    );
}

#[test]
fn test_string_concatenation() {
    let out = run_captured("print(\"ship\" + \"yard\");", VmConfig::default()).unwrap();
    assert_eq!(out, vec!["shipyard"]);
}

#[test]
fn test_division_by_zero() {
    assert_eq!(runtime_error("print(1 / 0);").kind, ErrorKind::DivisionByZero);
    assert_eq!(runtime_error("print(1 % 0);").kind, ErrorKind::DivisionByZero);
}

#[test]
fn test_undefined_name() {
    let err = runtime_error("print(missing);");
    assert_eq!(err.class(), ErrorClass::Name);
    assert_eq!(err.message(), "NameError: name 'missing' is not defined");

    let err = runtime_error("missing = 1;");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable("missing".into()));
}

#[test]
fn test_not_callable() {
    let err = runtime_error("var x = 1; x();");
    assert_eq!(err.kind, ErrorKind::NotCallable("number"));
}

#[test]
fn test_builtin_errors() {
    let err = runtime_error("print(true.len());");
    assert_eq!(err.class(), ErrorClass::Name);

    let err = runtime_error("var n = 4; print(n.to_str(14));");
    assert_eq!(err.class(), ErrorClass::Syntax);
    assert_eq!(err.message(), "SyntaxError: too many arguments");
}

#[test]
fn test_output_before_error_is_kept() {
    let mut vm = ship::VM::new();
    vm.capture_output();
    let function = ship::compile("print(1);\nprint(nope);\nprint(2);", &mut vm.heap).unwrap();
    let err = vm.interpret(function).unwrap_err();
    assert_eq!(vm.take_output(), vec!["1"]);
    assert_eq!(err.classes(), vec![ErrorClass::Name]);
}

#[test]
fn test_multiple_compile_errors_are_reported() {
    let kinds = compile_errors("var = 1;\nvar a = 1;\nvar a = 2;\nprint(;\n");
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[1], ErrorKind::Redeclared("a".into()));
}

#[test]
fn test_return_outside_function() {
    assert_eq!(compile_errors("return 1;"), vec![ErrorKind::ReturnOutsideFunction]);
}

#[test]
fn test_classes_are_reserved() {
    assert_eq!(compile_errors("class A { }"), vec![ErrorKind::ClassesUnsupported]);
}

#[test]
fn test_diagnostic_points_at_token() {
    let err = run_captured("var x = 1;\nvar x = @;", VmConfig::default()).unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("[line 2:9] SyntaxError: unexpected character '@'"), "{}", text);
    assert!(text.contains("  | var x = @;"), "{}", text);
    assert!(text.contains("  |         ^"), "{}", text);
}
