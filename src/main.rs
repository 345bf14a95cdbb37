use minischeme::ast::{Procedure, Value};
use minischeme::builtinops::Arity;
use minischeme::evaluator::{self, Environment, EvalConfig};
use minischeme::scheme::{ParseConfig, parse_scheme_with_config};
use minischeme::{Error, ParseError, ParseErrorKind};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Non-tail nesting allowed at the prompt
const REPL_MAX_DEPTH: usize = 10_000;

/// Stack for the REPL thread, large enough for `REPL_MAX_DEPTH` nested evaluations
const REPL_STACK_SIZE: usize = 512 * 1024 * 1024;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let repl = thread::Builder::new()
        .name("repl".into())
        .stack_size(REPL_STACK_SIZE)
        .spawn(run_repl);
    let result = match repl {
        Ok(handle) => handle.join(),
        Err(err) => {
            eprintln!("Could not start the REPL thread: {err}");
            process::exit(1);
        }
    };

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("minischeme - a small Scheme evaluator");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let mut env = evaluator::create_global_env_with_config(EvalConfig {
        max_depth: REPL_MAX_DEPTH,
    });

    // Callable from user code as (help)
    env.register_builtin_function("help", Arity::Exact(0), print_help);

    let config = ParseConfig::default();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            "minischeme> "
        } else {
            "       ...> "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(command);

                    match command {
                        ":help" => {
                            _ = print_help(&[]).is_ok();
                            continue;
                        }
                        ":env" => {
                            print_environment(&env);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                pending.push_str(&line);
                pending.push('\n');

                let expr = match parse_scheme_with_config(&pending, config) {
                    Ok(expr) => expr,
                    // Keep reading until the expression is closed
                    Err(Error::ParseError(ParseError {
                        kind: ParseErrorKind::Incomplete,
                        ..
                    })) => continue,
                    Err(err) => {
                        println!("Error: {err}");
                        pending.clear();
                        continue;
                    }
                };
                pending.clear();

                match evaluator::eval(&expr, &mut env) {
                    Value::Error(err) => println!("Error: {err}"),
                    // define and set! produce nothing worth echoing
                    Value::Unspecified => {}
                    result => println!("{result}"),
                }
                // Nothing outside the global frame outlives a prompt line
                env.collect_garbage();
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                pending.clear();
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help(_args: &[Value]) -> Result<Value, Error> {
    println!("minischeme commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Discard a partial expression, or exit");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Syntax:");
    println!("  Numbers: 42, -5, #xff, 1.5, 1e3");
    println!("  Booleans: #t, #f");
    println!("  Strings: \"hello\\n\"");
    println!("  Quote: 'sym, '(1 2 3)");
    println!("  Comments: ; to end of line");
    println!();
    println!("Special forms:");
    println!("  quote, if, define, set!, lambda, begin, let, cond, and, or");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (eqv? \"abc\" \"abc\")");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (fact 10)");
    println!();

    Ok(Value::Unspecified)
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match &value {
            Value::Procedure(procedure) if matches!(procedure.as_ref(), Procedure::Native(_)) => {
                builtins.push(name);
            }
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in procedures ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
