use std::{path::PathBuf, process};

use clap::Parser;
use log::debug;
use xwrap::{DocTestRunner, DoctestConfig, DoctestFlags};

/// Run doctest script against runtime with m1 and m2 modules
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// file with `>>>` examples
    script: PathBuf,
    /// report every example, not only failures
    #[arg(short, long)]
    verbose: bool,
    /// enable option flag, for example ELLIPSIS or -NORMALIZE_WHITESPACE
    #[arg(short = 'o', long = "option", value_name = "FLAG")]
    options: Vec<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    debug!("args: {:?}", args);

    let mut flags = DoctestFlags::empty();
    for option in &args.options {
        match DoctestFlags::parse_option(option) {
            Some((enable, flag)) => flags.set(flag, enable),
            None => {
                eprintln!("unknown option flag {}", option);
                process::exit(2);
            }
        }
    }

    let rt = xwrap_conformance::runtime().unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(2);
    });
    let mut runner = DocTestRunner::new(
        &rt,
        DoctestConfig {
            flags,
            verbose: args.verbose,
            filename: None,
        },
    );
    let results = runner.run_file(&args.script).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(2);
    });
    print!("{}", runner.report());
    debug!("{:?}", results);
    process::exit(i32::try_from(results.failed).unwrap_or(i32::MAX));
}
