use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use krait::interpreter::Interpreter;
use krait::{lexer, parser};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut dump_tokens = false;
    let mut dump_ast = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tokens" | "-t" => dump_tokens = true,
            "--ast" | "-a" => dump_ast = true,
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let tokens = lexer::tokenize(&source)?;
    if dump_tokens {
        for token in &tokens {
            println!("{:?} {:?} at {}", token.kind, token.lexeme, token.position);
        }
        return Ok(());
    }

    let program = parser::parse_tokens(tokens)?;
    if dump_ast {
        print!("{program}");
        return Ok(());
    }

    let mut interpreter = Interpreter::new();
    interpreter.run(&program)?;
    let output = interpreter.take_output();
    if !output.is_empty() {
        println!("{}", output.join("\n"));
    }
    Ok(())
}
