use std::env;
use std::fs;
use std::process::ExitCode;

use lantern_core::error::{format_error, LanternError};
use lantern_core::eval::Interp;
use lantern_core::options::EvalOptions;
use lantern_core::reader;

mod repl;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn help() -> ! {
    println!("Usage: lantern [--repl] [-e CODE] [--version] [file]");
    println!();
    println!("Options:");
    println!("  --repl        Start the REPL, or enter it after running a file in the same context");
    println!("  -e CODE       Evaluate CODE and exit");
    println!("  --version     Show version");
    println!("  -h, --help    Show this help");
    std::process::exit(0);
}

fn unknown_option(opt: &str) -> ! {
    eprintln!("unknown option: {}", opt);
    help();
}

struct CliArgs {
    file: Option<String>,
    eval: Option<String>,
    repl: bool,
}

fn parse_args() -> CliArgs {
    let mut args = env::args().skip(1);
    let mut parsed = CliArgs {
        file: None,
        eval: None,
        repl: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => help(),
            "--version" => {
                println!("lantern {}", VERSION);
                std::process::exit(0);
            }
            "--repl" => parsed.repl = true,
            "-e" => match args.next() {
                Some(code) => parsed.eval = Some(code),
                None => {
                    eprintln!("-e expects an argument");
                    std::process::exit(2);
                }
            },
            opt if opt.starts_with('-') => unknown_option(opt),
            file => {
                if parsed.file.is_some() {
                    unknown_option(file);
                }
                parsed.file = Some(file.to_string());
            }
        }
    }
    parsed
}

fn print_error(err: &LanternError) {
    for line in format_error(err) {
        eprintln!("{}", line);
    }
}

/// Per-form recovery: a failing top-level form is reported and yields
/// nil, its siblings still run.
fn run_source(interp: &mut Interp, source: &str) -> Result<(), LanternError> {
    let forms = reader::read_all(source)?;
    interp.eval_forms_recovering(&forms);
    Ok(())
}

fn main() -> ExitCode {
    let args = parse_args();
    let options = EvalOptions {
        print_diagnostics: true,
        source_name: args.file.clone(),
        ..EvalOptions::default()
    };
    let mut interp = Interp::with_options(options);

    if let Some(code) = &args.eval {
        let forms = match reader::read_all(code) {
            Ok(forms) => forms,
            Err(err) => {
                print_error(&err);
                return ExitCode::from(1);
            }
        };
        let last = interp.eval_forms_recovering(&forms);
        println!("{}", last);
        return ExitCode::SUCCESS;
    }

    if let Some(file) = &args.file {
        let source = match fs::read_to_string(file) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("could not open {}: {}", file, err);
                return ExitCode::from(1);
            }
        };
        if let Err(err) = run_source(&mut interp, &source) {
            print_error(&err);
            return ExitCode::from(1);
        }
        if !args.repl {
            return ExitCode::SUCCESS;
        }
    }

    match repl::run(&mut interp) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error opening console: {}", err);
            ExitCode::from(1)
        }
    }
}
