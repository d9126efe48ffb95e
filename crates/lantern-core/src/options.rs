use std::env;
use std::path::PathBuf;

fn env_path(name: &str) -> Option<PathBuf> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

pub fn compile_dump_dir_from_env() -> Option<PathBuf> {
    env_path("LANTERN_COMPILE_DUMP")
}

#[derive(Clone, Debug)]
pub struct EvalOptions {
    /// Print diagnostics for failing top-level forms (the REPL and the
    /// file driver turn this on; embedded use keeps it off).
    pub print_diagnostics: bool,
    /// Where `(COMPILE name DEBUG)` writes its disassembly listing.
    pub compile_dump_dir: Option<PathBuf>,
    pub source_name: Option<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            print_diagnostics: false,
            compile_dump_dir: compile_dump_dir_from_env(),
            source_name: None,
        }
    }
}
