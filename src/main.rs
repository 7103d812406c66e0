//! crudgen - generates Go CRUD modules for protobuf message types
//!
//! This binary reads a JSON document `{crud, types, options}` from stdin
//! (or from a file given as the sole argument) and writes the generated
//! Go source to stdout.

use std::io::{self, Read, Write};

fn main() {
    if let Err(e) = run() {
        eprintln!("crudgen: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut arguments = std::env::args().skip(1);
    let text = match arguments.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let input: crudgen::input::Input = serde_json::from_str(&text)?;

    if std::env::var("CRUDGEN_DEBUG").is_ok() {
        eprintln!(
            "[crudgen] {} message type(s), {} type descriptor(s), {} file option entr(ies)",
            input.crud.len(),
            input.types.len(),
            input.options.len()
        );
    }

    let generated = crudgen::generate(&input)?;
    io::stdout().write_all(generated.as_bytes())?;

    Ok(())
}
