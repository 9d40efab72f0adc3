use std::{env, fs, process::ExitCode};

use reflex::run_source;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(file_path) = args.next() else {
        eprintln!("usage: reflex <path-to-source-file>");
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(&file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: could not read {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run_source(&source) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
