//! Run `>>>` examples embedded in text and compare printed output with expected one.

use std::{fmt::Write, fs, io, path::Path};

use bitflags::bitflags;
use log::{debug, trace};

use crate::{exception::ForeignError, runtime::Runtime, script::Session, WRITE_TO_MEM_FAILED_MSG};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DoctestFlags: u32 {
        /// all sequences of whitespace are treated as equal
        const NORMALIZE_WHITESPACE = 1;
        /// `...` in expected output matches any substring
        const ELLIPSIS = 1 << 1;
        /// only exception type is compared, not its message
        const IGNORE_EXCEPTION_DETAIL = 1 << 2;
        const REPORT_ONLY_FIRST_FAILURE = 1 << 3;
    }
}

impl DoctestFlags {
    /// `ELLIPSIS`, `+ELLIPSIS` or `-ELLIPSIS`
    pub fn parse_option(option: &str) -> Option<(bool, DoctestFlags)> {
        let (enable, name) = match option.as_bytes().first() {
            Some(b'+') => (true, &option[1..]),
            Some(b'-') => (false, &option[1..]),
            _ => (true, option),
        };
        DoctestFlags::from_name(name).map(|x| (enable, x))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DoctestError {
    #[error("can not read {path}: {err}")]
    Io {
        path: String,
        #[source]
        err: io::Error,
    },
    #[error("line {lineno} of {name} has inconsistent leading whitespace: {line:?}")]
    InconsistentIndent {
        name: String,
        lineno: usize,
        line: String,
    },
    #[error("line {lineno} of {name} lacks blank after {prompt}: {line:?}")]
    MissingBlank {
        name: String,
        lineno: usize,
        prompt: &'static str,
        line: String,
    },
    #[error("line {lineno} of {name} has invalid option: {option:?}")]
    UnknownOption {
        name: String,
        lineno: usize,
        option: String,
    },
}

const PS1: &str = ">>>";
const PS2: &str = "...";
const BLANKLINE_MARKER: &str = "<BLANKLINE>";
const TRACEBACK_HEADER: &str = "Traceback (most recent call last):";
const TRACEBACK_HEADER_OLD: &str = "Traceback (innermost last):";
const DIVIDER: &str =
    "**********************************************************************";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub source: String,
    /// expected output, ends with newline if not empty
    pub want: String,
    /// expected `Kind: message` if `want` is traceback
    pub exc_msg: Option<String>,
    /// zero based line of `>>>` in text
    pub lineno: usize,
    pub indent: usize,
    pub options: Vec<(bool, DoctestFlags)>,
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_prompt(rest: &str, prompt: &str) -> bool {
    rest.starts_with(prompt)
}

/// Extract examples, text between them is ignored
pub fn parse_examples(name: &str, text: &str) -> Result<Vec<Example>, DoctestError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut ret = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let indent = leading_spaces(line);
        if !is_prompt(&line[indent..], PS1) {
            i += 1;
            continue;
        }
        let lineno = i;
        let mut source_lines = vec![strip_prompt(name, i, line, indent, PS1)?];
        i += 1;
        while i < lines.len() {
            let line = lines[i];
            if leading_spaces(line) >= indent && is_prompt(&line[indent..], PS2) {
                source_lines.push(strip_prompt(name, i, line, indent, PS2)?);
                i += 1;
            } else {
                break;
            }
        }
        let mut want_lines = Vec::new();
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                break;
            }
            if leading_spaces(line) < indent {
                return Err(DoctestError::InconsistentIndent {
                    name: name.into(),
                    lineno: i + 1,
                    line: line.into(),
                });
            }
            if is_prompt(&line[indent..], PS1) {
                break;
            }
            want_lines.push(&line[indent..]);
            i += 1;
        }
        let mut source = source_lines.join("\n");
        source.push('\n');
        let mut want = want_lines.join("\n");
        if !want.is_empty() {
            want.push('\n');
        }
        let options = parse_options(name, lineno, &source)?;
        let exc_msg = exception_message(&want_lines);
        trace!("example at line {}: {:?}", lineno + 1, source);
        ret.push(Example {
            source,
            want,
            exc_msg,
            lineno,
            indent,
            options,
        });
    }
    Ok(ret)
}

fn strip_prompt(
    name: &str,
    idx: usize,
    line: &str,
    indent: usize,
    prompt: &'static str,
) -> Result<String, DoctestError> {
    let rest = &line[indent + prompt.len()..];
    if rest.is_empty() {
        return Ok(String::new());
    }
    match rest.strip_prefix(' ') {
        Some(code) => Ok(code.to_string()),
        None => Err(DoctestError::MissingBlank {
            name: name.into(),
            lineno: idx + 1,
            prompt,
            line: line.into(),
        }),
    }
}

/// `# doctest: +ELLIPSIS, -NORMALIZE_WHITESPACE`
fn parse_options(
    name: &str,
    lineno: usize,
    source: &str,
) -> Result<Vec<(bool, DoctestFlags)>, DoctestError> {
    const DIRECTIVE: &str = "doctest:";
    let mut ret = Vec::new();
    for line in source.lines() {
        let comment = match line.find('#') {
            Some(pos) => line[pos + 1..].trim_start(),
            None => continue,
        };
        let options = match comment.strip_prefix(DIRECTIVE) {
            Some(options) => options,
            None => continue,
        };
        for option in options.split(|c: char| c == ',' || c.is_whitespace()) {
            if option.is_empty() {
                continue;
            }
            let parsed = DoctestFlags::parse_option(option)
                .filter(|_| option.starts_with('+') || option.starts_with('-'))
                .ok_or_else(|| DoctestError::UnknownOption {
                    name: name.into(),
                    lineno: lineno + 1,
                    option: option.into(),
                })?;
            ret.push(parsed);
        }
    }
    Ok(ret)
}

fn exception_message(want_lines: &[&str]) -> Option<String> {
    let first = want_lines.first()?;
    if !first.starts_with(TRACEBACK_HEADER) && !first.starts_with(TRACEBACK_HEADER_OLD) {
        return None;
    }
    let pos = want_lines[1..]
        .iter()
        .position(|x| !x.starts_with(' ') && !x.starts_with('\t') && *x != PS2)?;
    let mut msg = want_lines[1 + pos..].join("\n");
    msg.push('\n');
    Some(msg)
}

/// Does `got` match `want` under `flags`
pub fn check_output(want: &str, got: &str, flags: DoctestFlags) -> bool {
    if want == got {
        return true;
    }
    let want: String = if want.contains(BLANKLINE_MARKER) {
        want.lines()
            .map(|x| if x == BLANKLINE_MARKER { "" } else { x })
            .map(|x| format!("{}\n", x))
            .collect()
    } else {
        want.to_string()
    };
    if want == got {
        return true;
    }
    let (want, got) = if flags.contains(DoctestFlags::NORMALIZE_WHITESPACE) {
        (
            want.split_whitespace().collect::<Vec<_>>().join(" "),
            got.split_whitespace().collect::<Vec<_>>().join(" "),
        )
    } else {
        (want, got.to_string())
    };
    if want == got {
        return true;
    }
    flags.contains(DoctestFlags::ELLIPSIS) && ellipsis_match(&want, &got)
}

fn ellipsis_match(want: &str, got: &str) -> bool {
    if !want.contains(PS2) {
        return want == got;
    }
    let pieces: Vec<&str> = want.split(PS2).collect();
    let (first, last) = (pieces[0], pieces[pieces.len() - 1]);
    if !got.starts_with(first) {
        return false;
    }
    let mut start = first.len();
    let mut end = got.len();
    if !got[start..].ends_with(last) {
        return false;
    }
    end -= last.len();
    for piece in &pieces[1..pieces.len() - 1] {
        match got[start..end].find(piece) {
            Some(pos) => start += pos + piece.len(),
            None => return false,
        }
    }
    start <= end
}

/// Text printed for uncaught exception
pub fn format_exception(name: &str, idx: usize, err: &ForeignError) -> String {
    format!(
        "{}\n  File \"<doctest {}[{}]>\", line 1, in <module>\n{}\n",
        TRACEBACK_HEADER, name, idx, err
    )
}

fn indent_text(text: &str) -> String {
    let mut ret = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        ret.push_str("    ");
        ret.push_str(line);
        ret.push('\n');
    }
    ret
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TestResults {
    pub failed: usize,
    pub attempted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DoctestConfig {
    pub flags: DoctestFlags,
    pub verbose: bool,
    /// file name used in failure report
    pub filename: Option<String>,
}

enum Outcome {
    Success,
    Failure(String),
    Exception(String),
}

pub struct DocTestRunner<'rt> {
    rt: &'rt Runtime,
    config: DoctestConfig,
    report: String,
}

impl<'rt> DocTestRunner<'rt> {
    pub fn new(rt: &'rt Runtime, config: DoctestConfig) -> Self {
        DocTestRunner {
            rt,
            config,
            report: String::new(),
        }
    }

    /// What would be printed to console by the run
    pub fn report(&self) -> &str {
        &self.report
    }

    /// Run examples from file, file stem is used as name of test
    pub fn run_file(&mut self, path: &Path) -> Result<TestResults, DoctestError> {
        let text = fs::read_to_string(path).map_err(|err| DoctestError::Io {
            path: path.display().to_string(),
            err,
        })?;
        if self.config.filename.is_none() {
            self.config.filename = Some(path.display().to_string());
        }
        let name = path
            .file_stem()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<doctest>".to_string());
        self.run(&name, &text)
    }

    /// Run all examples of `text` in one fresh session
    pub fn run(&mut self, name: &str, text: &str) -> Result<TestResults, DoctestError> {
        let examples = parse_examples(name, text)?;
        debug!("DocTestRunner::run: {} examples in {}", examples.len(), name);
        let mut session = Session::new(self.rt);
        let mut results = TestResults::default();
        for (idx, example) in examples.iter().enumerate() {
            let mut flags = self.config.flags;
            for (enable, flag) in &example.options {
                flags.set(*flag, *enable);
            }
            let quiet =
                flags.contains(DoctestFlags::REPORT_ONLY_FIRST_FAILURE) && results.failed > 0;
            if self.config.verbose {
                self.report_start(example);
            }
            results.attempted += 1;
            let ret = session.run(&example.source);
            let got = session.take_output();
            let outcome = match ret {
                Ok(()) => {
                    if example.exc_msg.is_none() && check_output(&example.want, &got, flags) {
                        Outcome::Success
                    } else {
                        Outcome::Failure(got)
                    }
                }
                Err(err) => {
                    let exc_msg = format!("{}\n", err);
                    let matched = match example.exc_msg {
                        None => None,
                        Some(ref want_msg) => Some(
                            check_output(want_msg, &exc_msg, flags)
                                || (flags.contains(DoctestFlags::IGNORE_EXCEPTION_DETAIL)
                                    && exception_kind(want_msg) == exception_kind(&exc_msg)),
                        ),
                    };
                    match matched {
                        Some(true) => Outcome::Success,
                        Some(false) => Outcome::Failure(format_exception(name, idx, &err)),
                        None => Outcome::Exception(format_exception(name, idx, &err)),
                    }
                }
            };
            match outcome {
                Outcome::Success => {
                    if self.config.verbose {
                        self.report.push_str("ok\n");
                    }
                }
                Outcome::Failure(got) => {
                    results.failed += 1;
                    if !quiet {
                        self.report_failure(name, example, &got);
                    }
                }
                Outcome::Exception(traceback) => {
                    results.failed += 1;
                    if !quiet {
                        self.report_exception(name, example, &traceback);
                    }
                }
            }
        }
        self.summarize(name, results);
        Ok(results)
    }

    fn report_start(&mut self, example: &Example) {
        let out = &mut self.report;
        out.push_str("Trying:\n");
        out.push_str(&indent_text(&example.source));
        if example.want.is_empty() {
            out.push_str("Expecting nothing\n");
        } else {
            out.push_str("Expecting:\n");
            out.push_str(&indent_text(&example.want));
        }
    }

    fn report_header(&mut self, name: &str, example: &Example) {
        let out = &mut self.report;
        writeln!(out, "{}", DIVIDER).expect(WRITE_TO_MEM_FAILED_MSG);
        match self.config.filename {
            Some(ref filename) => writeln!(
                out,
                "File \"{}\", line {}, in {}",
                filename,
                example.lineno + 1,
                name
            ),
            None => writeln!(out, "Line {}, in {}", example.lineno + 1, name),
        }
        .expect(WRITE_TO_MEM_FAILED_MSG);
        out.push_str("Failed example:\n");
        out.push_str(&indent_text(&example.source));
    }

    fn report_failure(&mut self, name: &str, example: &Example, got: &str) {
        self.report_header(name, example);
        let out = &mut self.report;
        if example.want.is_empty() {
            out.push_str("Expected nothing\n");
        } else {
            out.push_str("Expected:\n");
            out.push_str(&indent_text(&example.want));
        }
        if got.is_empty() {
            out.push_str("Got nothing\n");
        } else {
            out.push_str("Got:\n");
            out.push_str(&indent_text(got));
        }
    }

    fn report_exception(&mut self, name: &str, example: &Example, traceback: &str) {
        self.report_header(name, example);
        self.report.push_str("Exception raised:\n");
        self.report.push_str(&indent_text(traceback));
    }

    fn summarize(&mut self, name: &str, results: TestResults) {
        let out = &mut self.report;
        if results.failed > 0 {
            writeln!(out, "{}", DIVIDER).expect(WRITE_TO_MEM_FAILED_MSG);
            writeln!(
                out,
                "1 items had failures:\n{:>4} of {:>3} in {}",
                results.failed, results.attempted, name
            )
            .expect(WRITE_TO_MEM_FAILED_MSG);
            writeln!(out, "***Test Failed*** {} failures.", results.failed)
                .expect(WRITE_TO_MEM_FAILED_MSG);
        } else if self.config.verbose {
            writeln!(
                out,
                "{} tests in 1 items.\n{} passed and 0 failed.\nTest passed.",
                results.attempted, results.attempted
            )
            .expect(WRITE_TO_MEM_FAILED_MSG);
        }
    }
}

/// `TypeError` from `TypeError: message`
fn exception_kind(msg: &str) -> &str {
    let head = msg.split(':').next().unwrap_or(msg).trim();
    head.rsplit('.').next().unwrap_or(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_examples() {
        let text = r#"
Prose is ignored.
>>> from m1 import *

  >>> try:
  ...     unwrap_int_ref(7)
  ... except: pass
  >>> f(s)
  12
  >>> unwrap_int_ref(7)
  Traceback (most recent call last):
    ...
  InvalidReferenceError: Can't get a non-const reference to a built-in int object
"#;
        let examples = parse_examples("test", text).unwrap();
        assert_eq!(4, examples.len());
        assert_eq!("from m1 import *\n", examples[0].source);
        assert_eq!("", examples[0].want);
        assert_eq!(2, examples[0].lineno);
        assert_eq!(
            "try:\n    unwrap_int_ref(7)\nexcept: pass\n",
            examples[1].source
        );
        assert_eq!(2, examples[1].indent);
        assert_eq!("12\n", examples[2].want);
        assert_eq!(
            Some(
                "InvalidReferenceError: Can't get a non-const reference to a built-in int object\n"
                    .to_string()
            ),
            examples[3].exc_msg
        );
    }

    #[test]
    fn test_parse_examples_errors() {
        assert!(matches!(
            parse_examples("t", ">>>x = 1"),
            Err(DoctestError::MissingBlank { lineno: 1, .. })
        ));
        assert!(matches!(
            parse_examples("t", "  >>> f()\n 1\n"),
            Err(DoctestError::InconsistentIndent { lineno: 2, .. })
        ));
        assert!(matches!(
            parse_examples("t", ">>> f() # doctest: +NO_SUCH_FLAG\n"),
            Err(DoctestError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_options() {
        let examples = parse_examples(
            "t",
            ">>> f() # doctest: +ELLIPSIS, -NORMALIZE_WHITESPACE\n",
        )
        .unwrap();
        assert_eq!(
            vec![
                (true, DoctestFlags::ELLIPSIS),
                (false, DoctestFlags::NORMALIZE_WHITESPACE)
            ],
            examples[0].options
        );
        assert_eq!(
            Some((true, DoctestFlags::IGNORE_EXCEPTION_DETAIL)),
            DoctestFlags::parse_option("IGNORE_EXCEPTION_DETAIL")
        );
        assert_eq!(None, DoctestFlags::parse_option("+FOO"));
    }

    #[test]
    fn test_check_output() {
        let none = DoctestFlags::empty();
        assert!(check_output("42\n", "42\n", none));
        assert!(!check_output("42\n", "43\n", none));
        assert!(check_output("a\n<BLANKLINE>\nb\n", "a\n\nb\n", none));
        assert!(!check_output("(1, 2)\n", "(1,  2)\n", none));
        assert!(check_output(
            "(1, 2)\n",
            "(1,\n  2)\n",
            DoctestFlags::NORMALIZE_WHITESPACE
        ));
        assert!(check_output(
            "<m1.Simple ...>\n",
            "<m1.Simple object>\n",
            DoctestFlags::ELLIPSIS
        ));
        assert!(check_output("a...b...c\n", "a1b2c\n", DoctestFlags::ELLIPSIS));
        assert!(!check_output("a...b...c\n", "a1c2b\n", DoctestFlags::ELLIPSIS));
        assert!(!check_output("aa...aa\n", "aaa\n", DoctestFlags::ELLIPSIS));
    }

    #[test]
    fn test_exception_kind() {
        assert_eq!("TypeError", exception_kind("TypeError: bad\n"));
        assert_eq!(
            "InvalidReferenceError",
            exception_kind("xwrap.InvalidReferenceError: x")
        );
    }
}
