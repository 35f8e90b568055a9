//! Language integration tests
//!
//! Runs whole programs through the public `Engine` API.

use elo_engine::{Engine, Error, RuntimeErrorKind, Value};

fn eval(src: &str) -> String {
    let mut engine = Engine::new();
    match engine.eval(src) {
        Ok(value) => value.to_string(),
        Err(e) => panic!("{} failed: {}", src, e),
    }
}

fn runtime_error(src: &str) -> RuntimeErrorKind {
    let mut engine = Engine::new();
    match engine.eval(src) {
        Err(Error::Runtime(err)) => err.kind,
        other => panic!("expected a runtime error from {}, got {:?}", src, other),
    }
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval("5 + 3"), "8");
    assert_eq!(eval("10 - 4"), "6");
    assert_eq!(eval("6 * 7"), "42");
    assert_eq!(eval("15 / 3"), "5");
    assert_eq!(eval("17 % 5"), "2");
    assert_eq!(eval("2 ** 10"), "1024");
    assert_eq!(eval("1 << 4 | 1"), "17");
    assert_eq!(eval("~0"), "-1");

    // same operators at runtime
    assert_eq!(eval("x := 7; x / 2"), "3.5");
    assert_eq!(eval("x := 0xff; x & 15"), "15");
    assert_eq!(eval("x := 3; -x * 2"), "-6");
}

#[test]
fn test_strings() {
    assert_eq!(eval("'foo' + 'bar'"), "foobar");
    assert_eq!(eval("s := 'héllo'; s[1]"), "é");
    assert_eq!(eval("s := 'abc'; len(s) + 1"), "4");
    assert_eq!(eval(r#"s := "tab\there"; len(s)"#), "8");
}

#[test]
fn test_comparison_and_equality() {
    assert_eq!(eval("a := 1; a < 2"), "true");
    assert_eq!(eval("a := 'a'; a < 'b'"), "true");
    assert_eq!(eval("a := 1; a == '1'"), "false");
    assert_eq!(eval("a := nil; a == nil"), "true");
    assert_eq!(eval("x := [1]; y := x; x == y"), "true");
    assert_eq!(eval("x := [1]; y := [1]; x == y"), "false");
    assert!(matches!(
        runtime_error("a := 1; a < 'x'"),
        RuntimeErrorKind::InvalidComparison { .. }
    ));
}

#[test]
fn test_logical_operators_yield_operands() {
    assert_eq!(eval("x := nil; x || 'default'"), "default");
    assert_eq!(eval("x := 0; x && 'yes'"), "yes");
    assert_eq!(eval("x := false; !x"), "true");
    assert_eq!(eval("x := 3; x > 2 ? 'big' : 'small'"), "big");
}

#[test]
fn test_const_folding_is_transparent() {
    assert_eq!(eval("const limit = 3 * 4; limit"), "12");
    assert_eq!(eval("const greeting = 'hi ' + 'there'; greeting"), "hi there");
}

#[test]
fn test_loops() {
    let src = "
        sum := 0
        for i := 0; i < 10; i++ {
            if i % 2 == 0 { continue }
            if i > 7 { break }
            sum += i
        }
        sum
    ";
    assert_eq!(eval(src), "16");

    assert_eq!(eval("n := 0; for { n++; if n == 5 { break } }; n"), "5");
}

#[test]
fn test_for_in() {
    let src = "total := 0; for i, v in [10, 20, 30] { total += i * v }; total";
    assert_eq!(eval(src), "80");

    let src = "o := {b: 2, a: 1}; s := ''; for k, v in o { s += k + string(v) }; s";
    assert_eq!(eval(src), "a1b2");

    let src = "out := ''; for c in 'abc' { out = c + out }; out";
    assert_eq!(eval(src), "cba");
}

#[test]
fn test_recursion() {
    let src = "
        func fib(n) {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        fib(20)
    ";
    assert_eq!(eval(src), "6765");
}

#[test]
fn test_arguments_and_results() {
    assert_eq!(eval("func f(a, b) { return b }; f(1)"), "nil");
    assert_eq!(eval("func f(a, b) { return b }; f(1, 2, 3)"), "2");
    assert_eq!(
        eval("func swap(a, b) { return b, a }; x, y := swap(1, 2); x * 10 + y"),
        "21"
    );
    assert_eq!(eval("xs := [1, 2, 3]; a, b, c := xs...; a + b + c"), "6");
}

#[test]
fn test_closures() {
    let src = "
        func counter() {
            n := 0
            return func() { n++; return n }
        }
        c := counter()
        c(); c()
        c()
    ";
    assert_eq!(eval(src), "3");

    let src = "
        func pair() {
            n := 0
            inc := func() { n++ }
            get := func() => n
            return inc, get
        }
        inc, get := pair()
        inc(); inc()
        get()
    ";
    assert_eq!(eval(src), "2");
}

#[test]
fn test_left_operand_read_before_right_side_effects() {
    assert_eq!(eval("x := 1; x + x++"), "2");
    assert_eq!(eval("x := 1; y := x++ + x; y"), "3");
    assert_eq!(eval("x := 5; x - --x"), "1");
    assert_eq!(eval("x := 3; x < x++"), "false");

    let src = "
        x := 1
        bump := func() { x = 10; return 0 }
        y := x + bump()
        y * 100 + x
    ";
    assert_eq!(eval(src), "110");
}

#[test]
fn test_closures_keep_block_locals() {
    let src = "f := nil; { x := 1; f = func() { return x } }; y := 99; f()";
    assert_eq!(eval(src), "1");
    let src = "f := nil; if true { x := 1; f = func() { return x } }; y := 'oops'; f()";
    assert_eq!(eval(src), "1");

    let src = "
        get := nil
        {
            n := 0
            inc := func() { n++ }
            get = func() => n
            inc(); inc()
        }
        w := 5
        get()
    ";
    assert_eq!(eval(src), "2");
}

#[test]
fn test_closures_capture_each_iteration() {
    let src = "
        fs := []
        for i := 0; i < 3; i++ { append(fs, func() { return i }) }
        g := fs[1]
        h := fs[2]
        g() * 10 + h()
    ";
    assert_eq!(eval(src), "12");

    let src = "
        fs := []
        for v in [4, 5] { append(fs, func() => v) }
        a := fs[0]
        b := fs[1]
        a() * 10 + b()
    ";
    assert_eq!(eval(src), "45");

    let src = "
        f := nil
        for i := 0; i < 10; i++ {
            x := i * 2
            f = func() => x
            if i == 3 { break }
        }
        z := 'reuse'
        f()
    ";
    assert_eq!(eval(src), "6");
}

#[test]
fn test_objects_and_methods() {
    let src = "
        account := {balance: 10}
        account.deposit = func(n) {
            this.balance += n
            return this.balance
        }
        account.deposit(5)
    ";
    assert_eq!(eval(src), "15");

    let src = "
        base := {greet: func() => 'hi ' + this.name}
        o := setparent({name: 'bo'}, base)
        o.greet()
    ";
    assert_eq!(eval(src), "hi bo");
}

#[test]
fn test_arrays() {
    assert_eq!(eval("xs := [1, 2]; append(xs, 3); xs[2] = 30; len(xs) + xs[2]"), "33");
    assert_eq!(eval("xs := [1, 'two', nil]; xs"), "[1, \"two\", nil]");

    // self-containing collections print without recursing forever
    assert_eq!(eval("a := [1]; append(a, a); string(a)"), "[1, [...]]");
    assert_eq!(
        eval("a := []; append(a, a); println(a); o := {}; o[a] = 1; o['[[...]]']"),
        "1"
    );
    assert!(matches!(
        runtime_error("xs := [1]; xs[5]"),
        RuntimeErrorKind::IndexOutOfRange { .. }
    ));
}

#[test]
fn test_channels() {
    let src = "
        ch := chan()
        for i := 0; i < 3; i++ { send(ch, i + 1) }
        a := recv(ch); b := recv(ch); c := recv(ch); d := recv(ch)
        [a + b + c, d]
    ";
    assert_eq!(eval(src), "[6, nil]");
}

#[test]
fn test_undeclared_names_are_globals() {
    let mut engine = Engine::new();
    engine.eval("func setg() { counter = 1 }; setg()").unwrap();
    assert_eq!(engine.get_global("counter"), Some(Value::Number(1.0)));
    assert_eq!(engine.eval("counter + 1").unwrap(), Value::Number(2.0));
    assert!(matches!(
        runtime_error("missing + 1"),
        RuntimeErrorKind::UndefinedGlobal(_)
    ));
}

#[test]
fn test_error_messages_carry_lines() {
    let mut engine = Engine::new();
    let err = engine.eval("x := 1\ny := x()").unwrap_err();
    assert_eq!(err.to_string(), "<input>:2: cannot call number");
}

#[test]
fn test_engine_survives_stack_overflow() {
    let mut engine = Engine::new();
    let err = engine.eval("func f() { return f() }; f()").unwrap_err();
    assert!(matches!(
        err,
        Error::Runtime(ref e) if e.kind == RuntimeErrorKind::StackOverflow
    ));
    assert_eq!(engine.eval("1 + 1").unwrap(), Value::Number(2.0));
}

#[test]
fn test_reserved_keywords_rejected() {
    let mut engine = Engine::new();
    let err = engine.eval("try { }").unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}
