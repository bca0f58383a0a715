use xwrap::{
    Bindings, DocTestRunner, DoctestConfig, ExceptionKind, NativeReturn, Runtime, Session, Value,
};

#[path = "../src/test_helper.rs"]
mod test_helper;

#[derive(Clone, Debug, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

fn runtime() -> Runtime {
    test_helper::logger_init();
    Bindings::new()
        .bind_type::<Point>("Point")
        .declare(
            "geom.rs.in",
            r#"
foreign_class!(
/// 2D point
#[derive(camelCaseAliases)]
class Point {
    self_type Point;
    constructor Point::new(x: i64, y: i64) -> Point;
    constructor Point::origin() -> Point;
    fn Point::x(&self) -> i64;
    fn Point::move_by(&mut self, dx: i64, dy: i64);
    fn Point::swapped(&self) -> Point;
});

foreign_module!(module geom {
    fn norm1(p: &Point) -> i64;
    fn same(p: &mut Point) -> &mut Point;
    fn identity(o: Object) -> Object;
    fn apply(f: Object, x: i64) -> Object;
});
"#,
        )
        .bind_fn("Point::new", |frame| {
            let x: i64 = frame.value(0)?;
            let y: i64 = frame.value(1)?;
            Ok(NativeReturn::value(Point { x, y }))
        })
        .bind_fn("Point::origin", |_| {
            Ok(NativeReturn::value(Point { x: 0, y: 0 }))
        })
        .bind_fn("Point::x", |frame| {
            let x = frame.borrow::<Point>(0)?.x;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("Point::move_by", |frame| {
            let dx: i64 = frame.value(1)?;
            let dy: i64 = frame.value(2)?;
            let mut p = frame.borrow_mut::<Point>(0)?;
            p.x += dx;
            p.y += dy;
            Ok(NativeReturn::Unit)
        })
        .bind_fn("Point::swapped", |frame| {
            let p = frame.borrow::<Point>(0)?;
            Ok(NativeReturn::value(Point { x: p.y, y: p.x }))
        })
        .bind_fn("norm1", |frame| {
            let p = frame.borrow::<Point>(0)?;
            Ok(NativeReturn::value(p.x.abs() + p.y.abs()))
        })
        .bind_fn("same", |frame| frame.alias(0))
        .bind_fn("identity", |frame| Ok(NativeReturn::Object(frame.object(0)?)))
        .bind_fn("apply", |frame| {
            let f = frame.object(0)?;
            let x = frame.object(1)?;
            let ret = frame.runtime().call(&f, &[x])?;
            Ok(NativeReturn::Object(ret))
        })
        .build()
        .unwrap_or_else(|err| panic!("{}", err))
}

fn run(session: &mut Session, code: &str) -> String {
    session
        .run(code)
        .unwrap_or_else(|err| panic!("{}: {}", code, err));
    session.take_output()
}

fn err_kind(session: &mut Session, code: &str) -> ExceptionKind {
    match session.run(code) {
        Ok(()) => panic!("{} should fail", code),
        Err(err) => err.kind,
    }
}

#[test]
fn test_native_class() {
    let rt = runtime();
    let mut s = Session::new(&rt);
    run(&mut s, "from geom import *");
    assert_eq!("3\n", run(&mut s, "p = Point(3, -4)\np.x()"));
    assert_eq!("0\n", run(&mut s, "Point().x()"));
    assert_eq!("7\n", run(&mut s, "norm1(p)"));
    run(&mut s, "p.moveBy(1, 1)");
    assert_eq!("4\n", run(&mut s, "p.x()"));
    assert_eq!("-3\n", run(&mut s, "p.swapped().x()"));
    assert_eq!("True\n", run(&mut s, "same(p) is p"));
    assert_eq!("'2D point'\n", run(&mut s, "Point.__doc__"));
    assert_eq!("<class 'geom.Point'>\n", run(&mut s, "Point"));
    assert_eq!(ExceptionKind::AttributeError, err_kind(&mut s, "p.move_by(1, 1)"));
    assert_eq!(ExceptionKind::TypeError, err_kind(&mut s, "Point(1)"));
    assert_eq!(ExceptionKind::TypeError, err_kind(&mut s, "norm1(5)"));
}

#[test]
fn test_object_passthrough_and_callbacks() {
    let rt = runtime();
    let mut s = Session::new(&rt);
    run(&mut s, "import geom");
    assert_eq!(
        "(1, 'a', None, {'k': True})\n",
        run(&mut s, "geom.identity((1, 'a', None, {'k': True}))")
    );
    assert_eq!("(3, 3)\n", run(&mut s, "geom.apply(lambda v: (v, v), 3)"));
    assert_eq!("True\n", run(&mut s, "geom.apply(lambda v: v == 3, 3)"));
}

#[test]
fn test_dynamic_classes_mro() {
    let rt = runtime();
    let mut s = Session::new(&rt);
    run(
        &mut s,
        "A = xclass('A', (), {'who': lambda self: 'A', 'a': lambda self: 1})\n\
         B = xclass('B', (A,), {'who': lambda self: 'B'})\n\
         C = xclass('C', (A,), {'who': lambda self: 'C', 'c': lambda self: 3})\n\
         D = xclass('D', (B, C), {})\n\
         d = D()",
    );
    assert_eq!("'B'\n", run(&mut s, "d.who()"));
    assert_eq!("3\n", run(&mut s, "d.c()"));
    assert_eq!("1\n", run(&mut s, "d.a()"));
    assert_eq!("True\n", run(&mut s, "isinstance(d, A)"));
    assert_eq!("(<class '__main__.B'>, <class '__main__.C'>)\n", run(&mut s, "D.__bases__"));
    assert_eq!(ExceptionKind::TypeError, err_kind(&mut s, "D(1)"));
    match s.run("xclass('E', (A, B, A), {})") {
        Err(err) => {
            assert_eq!(ExceptionKind::TypeError, err.kind);
            assert_eq!("duplicate base class A", err.message);
        }
        Ok(()) => panic!("repeated base should be rejected"),
    }

    run(&mut s, "from geom import Point\nP = xclass('P', (Point,), {'__repr__': lambda self: 'P!'})");
    assert_eq!("P!\n", run(&mut s, "P(1, 2)"));
    assert_eq!("1\n", run(&mut s, "P(1, 2).x()"));
    let p = s.get("P").unwrap();
    match p {
        Value::Class(ref class) => {
            assert_eq!(Some("Point"), class.native_type());
            assert_eq!(vec!["P", "Point"], class.mro_names().iter().map(|x| x.as_str()).collect::<Vec<_>>());
        }
        _ => panic!("class expected"),
    }
}

#[test]
fn test_exceptions_in_script() {
    let rt = runtime();
    let mut s = Session::new(&rt);
    assert_eq!(
        "caught\n",
        run(&mut s, "try:\n    undefined_name\nexcept NameError:\n    print 'caught'\n")
    );
    assert_eq!(
        "ok\n",
        run(&mut s, "try: len(1)\nexcept (ValueError, TypeError): print('ok')\n")
    );
    assert_eq!(
        "else\n",
        run(&mut s, "try: pass\nexcept: print 'no'\nelse: print 'else'\n")
    );
    assert_eq!(ExceptionKind::ImportError, err_kind(&mut s, "import nosuch"));
    assert_eq!(ExceptionKind::SyntaxError, err_kind(&mut s, "x = = 1"));
    assert_eq!(
        ExceptionKind::TypeError,
        err_kind(&mut s, "try: len(1)\nexcept AttributeError: pass\n")
    );
}

#[test]
fn test_unbounded_recursion() {
    let rt = runtime();
    let mut s = Session::new(&rt);
    assert_eq!(
        ExceptionKind::RecursionError,
        err_kind(&mut s, "f = lambda x: f(x)\nf(1)\n")
    );
    assert_eq!(
        "caught\n",
        run(&mut s, "try: f(1)\nexcept RuntimeError: print 'caught'\n")
    );
    run(
        &mut s,
        "R = xclass('R', (), {'__repr__': lambda self: repr(self)})\nr = R()",
    );
    assert_eq!(ExceptionKind::RecursionError, err_kind(&mut s, "r"));
    // depth is restored after the error
    run(&mut s, "import geom");
    assert_eq!("(3, 3)\n", run(&mut s, "geom.apply(lambda v: (v, v), 3)"));

    let mut runner = DocTestRunner::new(&rt, DoctestConfig::default());
    let results = runner
        .run(
            "recursion",
            ">>> g = lambda: g()\n>>> g()\n>>> 1\n1\n",
        )
        .unwrap();
    assert_eq!(1, results.failed);
    assert_eq!(3, results.attempted);
    assert!(
        runner.report().contains("RecursionError: maximum recursion depth exceeded"),
        "{}",
        runner.report()
    );
}
