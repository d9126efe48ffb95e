use rustyline::{error::ReadlineError, DefaultEditor};

use lantern_core::eval::Interp;
use lantern_core::reader;

const BANNER: &str = "\
============================================================
                         LANTERN
============================================================";

pub fn run(interp: &mut Interp) -> rustyline::Result<()> {
    println!("{}", BANNER);
    println!();
    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("lantern> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err),
        };
        if line.trim().is_empty() {
            continue;
        }
        editor.add_history_entry(&line)?;
        let forms = match reader::read_all(&line) {
            Ok(forms) => forms,
            Err(err) => {
                for message in lantern_core::error::format_error(&err) {
                    eprintln!("{}", message);
                }
                continue;
            }
        };
        for form in &forms {
            let value = interp.eval_top_level(form);
            println!("{}", value);
            if interp.should_quit() {
                return Ok(());
            }
        }
    }
    Ok(())
}
