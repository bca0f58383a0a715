use xwrap::{ExceptionKind, Holder, Runtime, Session, Value};
use xwrap_conformance::{runtime, NODDY_VALUE, SIMPLE_CONTENT};

fn logger_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn new_runtime() -> Runtime {
    logger_init();
    runtime().unwrap_or_else(|err| panic!("conformance bindings: {}", err))
}

fn prepared(rt: &Runtime) -> Session<'_> {
    let mut session = Session::new(rt);
    session
        .run("from m1 import *\nfrom m2 import *\nn = new_noddy()\ns = new_simple()\n")
        .unwrap();
    session
}

fn eval_repr(session: &Session, code: &str) -> String {
    let value = session
        .eval(code)
        .unwrap_or_else(|err| panic!("{}: {}", code, err));
    session.runtime().repr(&value).unwrap()
}

fn eval_err(session: &Session, code: &str) -> ExceptionKind {
    match session.eval(code) {
        Ok(v) => panic!("{} should fail, got {}", code, v.type_name()),
        Err(err) => err.kind,
    }
}

#[test]
fn test_int_round_trip() {
    let rt = new_runtime();
    let session = prepared(&rt);
    for i in [0_i64, 1, -1, 42, i64::from(i32::MAX), i64::from(i32::MIN)] {
        assert_eq!(i.to_string(), eval_repr(&session, &format!("unwrap_int(wrap_int({}))", i)));
        assert_eq!(
            i.to_string(),
            eval_repr(&session, &format!("unwrap_int_const_ref(wrap_int_const_ref({}))", i))
        );
    }
    assert_eq!(
        ExceptionKind::OverflowError,
        eval_err(&session, "unwrap_int(2147483648)")
    );
}

#[test]
fn test_mutable_reference_needs_live_binding() {
    let rt = new_runtime();
    let session = prepared(&rt);
    assert_eq!(
        ExceptionKind::InvalidReferenceError,
        eval_err(&session, "unwrap_int_ref(7)")
    );
    assert!(ExceptionKind::InvalidReferenceError.is_caught_by(ExceptionKind::TypeError));
    assert_eq!(NODDY_VALUE.to_string(), eval_repr(&session, "unwrap_int_ref(n)"));
    let err = session.eval("unwrap_int_ref(7)").unwrap_err();
    assert_eq!(
        "InvalidReferenceError: Can't get a non-const reference to a built-in int object",
        err.to_string()
    );
}

#[test]
fn test_simple_round_trip_all_disciplines() {
    let rt = new_runtime();
    let session = prepared(&rt);
    let expected = format!("'{}'", SIMPLE_CONTENT);
    for unwrap in ["unwrap_simple", "unwrap_simple_ref", "unwrap_simple_const_ref"] {
        for wrap in ["wrap_simple", "wrap_simple_ref", "wrap_simple_const_ref"] {
            let code = format!("{}({}(s))", unwrap, wrap);
            assert_eq!(expected, eval_repr(&session, &code), "{}", code);
        }
    }
}

#[test]
fn test_composition() {
    let rt = new_runtime();
    let session = prepared(&rt);
    assert_eq!("12", eval_repr(&session, "f(s)"));
    assert_eq!("12", eval_repr(&session, "f(g(s))"));
    assert_eq!("False", eval_repr(&session, "g(s) is s"));
    assert_eq!(
        format!("'{}'", SIMPLE_CONTENT),
        eval_repr(&session, "unwrap_simple(g(s))")
    );
}

#[test]
fn test_extension_class() {
    let rt = new_runtime();
    let mut session = prepared(&rt);
    session
        .run("C = xclass('C', (xinst,), {'__init__': init1, 'get_n': get_n})\nc1 = C(s, 99)\nc2 = C(s)\n")
        .unwrap();
    assert_eq!("99", eval_repr(&session, "c1.get_n()"));
    assert_eq!("0", eval_repr(&session, "c2.get_n()"));
    assert_eq!("True", eval_repr(&session, "isinstance(c1, xinst)"));
    assert_eq!("<class '__main__.C'>", eval_repr(&session, "C"));
    assert_eq!("99", eval_repr(&session, "call_get_n(c1)"));

    session
        .run("D = xclass('D', (C,), {'get_n': lambda self: 7})\nd = D(s, 1)\n")
        .unwrap();
    assert_eq!("7", eval_repr(&session, "call_get_n(d)"));
    assert_eq!("1", eval_repr(&session, "xinst.get_n(d)"));

    assert_eq!(ExceptionKind::TypeError, eval_err(&session, "C()"));
    assert_eq!(ExceptionKind::TypeError, eval_err(&session, "xinst(s)"));
    assert_eq!(
        ExceptionKind::TypeError,
        eval_err(&session, "xclass('E', (xinst, Simple), {})")
    );
}

#[test]
fn test_concrete_scenario() {
    let rt = new_runtime();
    let session = prepared(&rt);
    assert_eq!("42", eval_repr(&session, "unwrap_int(n)"));
    assert_eq!("'hello, world'", eval_repr(&session, "unwrap_simple(s)"));
    assert_eq!("42", eval_repr(&session, "wrap_int_const_ref(n)"));
    assert_eq!("<m1.Noddy object>", eval_repr(&session, "n"));
}

#[test]
fn test_wrap_mutable_reference_aliases() {
    let rt = new_runtime();
    let mut session = prepared(&rt);
    assert_eq!(
        ExceptionKind::InvalidReferenceError,
        eval_err(&session, "wrap_int_ref(7)")
    );
    assert_eq!("True", eval_repr(&session, "wrap_int_ref(n) is n"));

    session.run("r = wrap_simple_ref(s)\nr.set_content('changed')\n").unwrap();
    assert_eq!("'changed'", eval_repr(&session, "unwrap_simple(s)"));
    // copies are independent
    session.run("v = wrap_simple(s)\nv.set_content('copy')\n").unwrap();
    assert_eq!("'changed'", eval_repr(&session, "s.content()"));
    session.run("c = wrap_simple_const_ref(s)\nc.set_content('const')\n").unwrap();
    assert_eq!("'changed'", eval_repr(&session, "s.content()"));

    match session.get("v") {
        Some(Value::Instance(inst)) => assert_eq!(Holder::Value, inst.holder()),
        _ => panic!("v should be instance"),
    }
}

#[test]
fn test_modules_metadata() {
    let rt = new_runtime();
    let names = rt.module_names();
    assert_eq!(
        vec!["m1", "m2"],
        names.iter().map(|x| x.as_str()).collect::<Vec<_>>()
    );
    let m1 = rt.import("m1").unwrap();
    assert_eq!(
        Some("Unwrap native values passed by value, `&mut` and `&`"),
        m1.doc()
    );
    let session = prepared(&rt);
    assert_eq!("'Length of content'", eval_repr(&session, "f.__doc__"));
    assert_eq!("'m2'", eval_repr(&session, "xinst.__module__"));
    assert_eq!(
        "'Record with one string field'",
        eval_repr(&session, "Simple.__doc__")
    );
    assert_eq!(
        "'Base for extension classes created with `xclass`'",
        eval_repr(&session, "xinst.__doc__")
    );
    assert_eq!(
        ExceptionKind::ImportError,
        Session::new(&rt).run("import m3").unwrap_err().kind
    );
}
