use std::{io::Write, path::Path};

use xwrap::{DocTestRunner, DoctestConfig, DoctestError, DoctestFlags, TestResults};
use xwrap_conformance::runtime;

fn logger_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_newtest_script_passes() {
    logger_init();
    let rt = runtime().unwrap();
    let mut runner = DocTestRunner::new(&rt, DoctestConfig::default());
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/newtest.txt");
    let results = runner.run_file(&path).unwrap();
    assert_eq!(
        TestResults {
            failed: 0,
            attempted: 26
        },
        results,
        "{}",
        runner.report()
    );
    assert_eq!("", runner.report());
}

#[test]
fn test_failures_are_reported() {
    logger_init();
    let rt = runtime().unwrap();
    let mut tmp = tempfile::Builder::new()
        .prefix("broken")
        .suffix(".txt")
        .tempfile()
        .unwrap();
    write!(
        tmp,
        r#"
>>> from m1 import *
>>> f(new_simple())
13
>>> unwrap_int_ref(7)
>>> unwrap_int_ref(7)
Traceback (most recent call last):
  ...
InvalidReferenceError: Can't get a non-const reference to a built-in int object
"#
    )
    .unwrap();
    tmp.flush().unwrap();

    let mut runner = DocTestRunner::new(&rt, DoctestConfig::default());
    let results = runner.run_file(tmp.path()).unwrap();
    assert_eq!(
        TestResults {
            failed: 2,
            attempted: 4
        },
        results
    );
    let report = runner.report();
    assert!(report.contains("Failed example:\n    f(new_simple())\n"), "{}", report);
    assert!(report.contains("Expected:\n    13\nGot:\n    12\n"), "{}", report);
    assert!(report.contains("Exception raised:\n"), "{}", report);
    assert!(
        report.contains("    InvalidReferenceError: Can't get a non-const reference"),
        "{}",
        report
    );
    assert!(report.contains("***Test Failed*** 2 failures."), "{}", report);

    let mut runner = DocTestRunner::new(
        &rt,
        DoctestConfig {
            flags: DoctestFlags::REPORT_ONLY_FIRST_FAILURE,
            ..DoctestConfig::default()
        },
    );
    let results = runner.run_file(tmp.path()).unwrap();
    assert_eq!(2, results.failed);
    assert!(!runner.report().contains("Exception raised:"), "{}", runner.report());
}

#[test]
fn test_option_flags() {
    logger_init();
    let rt = runtime().unwrap();
    let text = r#"
>>> from m1 import *
>>> from m2 import *
>>> (unwrap_int(1), unwrap_int(2))  # doctest: +NORMALIZE_WHITESPACE
(1,   2)
>>> new_simple()  # doctest: +ELLIPSIS
<m1.Simple ...>
>>> unwrap_int_ref(7)  # doctest: +IGNORE_EXCEPTION_DETAIL
Traceback (most recent call last):
InvalidReferenceError: something else
>>> try: unwrap_int_ref(7)
... except TypeError: print 'caught'
caught
"#;
    let mut runner = DocTestRunner::new(
        &rt,
        DoctestConfig {
            verbose: true,
            ..DoctestConfig::default()
        },
    );
    let results = runner.run("flags", text).unwrap();
    assert_eq!(0, results.failed, "{}", runner.report());
    assert_eq!(6, results.attempted);
    assert!(runner.report().contains("Test passed."), "{}", runner.report());
}

#[test]
fn test_missing_file() {
    logger_init();
    let rt = runtime().unwrap();
    let mut runner = DocTestRunner::new(&rt, DoctestConfig::default());
    let dir = tempfile::tempdir().unwrap();
    match runner.run_file(&dir.path().join("nope.txt")) {
        Err(DoctestError::Io { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
}
