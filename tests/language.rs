use pretty_assertions::assert_eq;
use ship::{run_captured, ErrorClass, ShipError, VmConfig};

fn output(source: &str) -> Vec<String> {
    run_captured(source, VmConfig::default()).expect("Execution failed")
}

#[test]
fn test_arithmetic_round_trip() {
    assert_eq!(output("var x = 5; var y = 15 / 3 + x; print(y);"), vec!["10"]);
}

#[test]
fn test_ieee_arithmetic() {
    assert_eq!(
        output("print(0.1 + 0.2); print(2.5 * 4); print(1 - 3);"),
        vec!["0.30000000000000004", "10", "-2"]
    );
}

#[test]
fn test_false_branch_is_skipped() {
    assert!(output("var x = 5; if x == 3 { print(15); }").is_empty());
}

#[test]
fn test_if_else_follows_truthiness() {
    let source = r#"
        var values = [nil, false, 0, "", [], true, 1, "s", [0]];
        foreach values |v| {
            if v { print("then"); } else { print("else"); }
        }
        print("after");
    "#;
    assert_eq!(
        output(source),
        vec!["else", "else", "else", "else", "else", "then", "then", "then", "then", "after"]
    );
}

#[test]
fn test_else_if_chain() {
    let source = r#"
        fn grade(n) {
            if n > 90 { return "a"; }
            else if n > 50 { return "b"; }
            else { return "c"; }
        }
        print(grade(95)); print(grade(60)); print(grade(10));
    "#;
    assert_eq!(output(source), vec!["a", "b", "c"]);
}

#[test]
fn test_foreach_visits_each_element_once() {
    let source = r#"
        var xs = [3, 1, 2];
        var count = 0;
        foreach xs |v| {
            print(v);
            count = count + 1;
        }
        print(count);
        print(xs);
    "#;
    assert_eq!(output(source), vec!["3", "1", "2", "3", "[3, 1, 2]"]);
}

#[test]
fn test_foreach_over_empty_array() {
    assert_eq!(output("foreach [] |v| { print(v); } print(\"done\");"), vec!["done"]);
}

#[test]
fn test_while_loop() {
    let source = r#"
        var i = 0;
        while i < 3 {
            print(i);
            i = i + 1;
        }
    "#;
    assert_eq!(output(source), vec!["0", "1", "2"]);
}

#[test]
fn test_functions_and_recursion() {
    let source = r#"
        fn fact(n) {
            if n <= 1 { return 1; }
            return n * fact(n - 1);
        }
        fn nothing() { }
        print(fact(6));
        print(nothing());
    "#;
    assert_eq!(output(source), vec!["720", "nil"]);
}

#[test]
fn test_wrong_arity_does_not_crash() {
    let source = r#"
        fn pair(a, b) {
            print(a);
            print(b);
        }
        pair(1);
        pair(1, 2, 3);
    "#;
    // Missing parameters read as nil, extra arguments are dropped
    assert_eq!(output(source), vec!["1", "nil", "1", "2"]);
}

#[test]
fn test_shadowing_in_nested_function() {
    let source = r#"
        var x = 1;
        fn show(x) {
            print(x);
        }
        show(2);
        print(x);
    "#;
    assert_eq!(output(source), vec!["2", "1"]);
}

#[test]
fn test_redeclaration_is_rejected() {
    let err = run_captured("var x = 1;\nvar x = 2;", VmConfig::default()).unwrap_err();
    assert_eq!(err.classes(), vec![ErrorClass::Name]);
    assert!(matches!(err, ShipError::Compile(_)));
}

#[test]
fn test_attributes() {
    let source = r#"
        var n = 2.6;
        print(n.floor());
        print(n.is_int());
        print("Ship".upper());
        print("abc".len());
        print("a,b".contains(","));
        var xs = [1];
        xs.push(2);
        print(xs.len());
        print(xs.pop());
        print(xs.get(0));
    "#;
    assert_eq!(output(source), vec!["2", "false", "SHIP", "3", "true", "2", "2", "1"]);
}

#[test]
fn test_global_natives() {
    let source = r#"
        print(str(12) + "!");
        print(type([1]));
        print(type("s"));
        print(len([1, 2, 3]));
    "#;
    assert_eq!(output(source), vec!["12!", "array", "string", "3"]);
}

#[test]
fn test_string_escapes_and_comments() {
    let source = "// a comment\nprint(\"tab\\there\"); // trailing\nprint(\"q\\\"q\");";
    assert_eq!(output(source), vec!["tab\there", "q\"q"]);
}

#[test]
fn test_nested_arrays_display() {
    assert_eq!(output("print([1, \"hi\", [true, nil]]);"), vec!["[1, \"hi\", [true, nil]]"]);
}
