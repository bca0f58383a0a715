use std::{
    fs,
    path::{Path, PathBuf},
};

use xwrap::Bindings;

#[path = "../src/test_helper.rs"]
mod test_helper;

/// Every `expectations/X.rs.in` should be rejected with message from `X.err`
#[test]
fn test_expectations() {
    test_helper::logger_init();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("expectations");
    let mut inputs: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("Can not read expectations directory")
        .map(|x| x.expect("Can not read directory entry").path())
        .filter(|x| x.to_string_lossy().ends_with(".rs.in"))
        .collect();
    inputs.sort();
    assert!(!inputs.is_empty());
    for input in &inputs {
        let file_name = input
            .file_name()
            .expect("no file name")
            .to_string_lossy()
            .into_owned();
        let stem = file_name.trim_end_matches(".rs.in");
        let code = fs::read_to_string(input).expect("Can not read input");
        let expected = fs::read_to_string(dir.join(format!("{}.err", stem)))
            .unwrap_or_else(|err| panic!("no .err for {}: {}", file_name, err));
        println!("check {}", file_name);
        match Bindings::new().declare(file_name.as_str(), code).build() {
            Ok(_) => panic!("{}: build should fail", file_name),
            Err(err) => assert_eq!(expected, err.message(), "{}", file_name),
        }
    }
}
