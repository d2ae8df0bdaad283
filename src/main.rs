use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hdlvm::ast::{Function, Param};
use hdlvm::cache::ImportData;
use hdlvm::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use hdlvm::parser::{self, AssembleError, Assembly};
use hdlvm::types::ConcreteType;
use hdlvm::value::Value;
use hdlvm::{verify, vm};

#[derive(Parser, Debug)]
#[command(name = "hdlvm", version, about = "Assemble, check and run hdlvm bytecode")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print diagnostics as JSON, one object per line
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colour (also honoured via NO_COLOR)
    #[arg(long, global = true)]
    no_color: bool,

    /// Raise log verbosity; repeat for more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one function and print its result
    Run {
        file: PathBuf,
        /// Function to call; defaults to `main`, else the first function
        #[arg(long)]
        entry: Option<String>,
        /// Arguments as typed literals (`u8:3`) or bare integers for bits parameters
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run every test in the file
    Test {
        file: PathBuf,
        /// Only run tests whose name contains this string
        #[arg(long)]
        filter: Option<String>,
    },
    /// Assemble and verify without running
    Check { file: PathBuf },
    /// Print the assembled module (JSON with --json)
    Dis { file: PathBuf },
    /// Explain a diagnostic code such as HVM-V002
    Explain { code: String },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("HDLVM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Output settings plus the file being worked on, for source snippets.
struct Session {
    json: bool,
    use_color: bool,
    path: String,
    source: String,
}

impl Session {
    fn open(cli: &Cli, file: &Path) -> Result<Session, ExitCode> {
        let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
        let path = file.display().to_string();
        match std::fs::read_to_string(file) {
            Ok(source) => Ok(Session { json: cli.json, use_color, path, source }),
            Err(e) => {
                let session = Session { json: cli.json, use_color, path: path.clone(), source: String::new() };
                session.report(Diagnostic::error(format!("cannot read {path}: {e}")));
                Err(ExitCode::FAILURE)
            }
        }
    }

    fn report(&self, d: Diagnostic) {
        let d = if self.source.is_empty() { d } else { d.with_source(self.source.clone()) };
        if self.json {
            eprintln!("{}", json::render(&d));
        } else {
            eprint!("{}", AnsiRenderer { use_color: self.use_color }.render(&d, Some(&self.path)));
        }
    }

    fn assemble(&self) -> Result<Assembly, ExitCode> {
        let assembly = parser::assemble(&self.source).map_err(|e| {
            self.report(Diagnostic::from(&e));
            ExitCode::FAILURE
        })?;
        if let Err(errors) = verify::verify(&assembly) {
            for e in &errors {
                self.report(Diagnostic::from(e));
            }
            return Err(ExitCode::FAILURE);
        }
        info!(module = %assembly.module().name, functions = assembly.module().functions.len(), "assembled");
        Ok(assembly)
    }
}

fn pick_entry<'a>(assembly: &'a Assembly, entry: Option<&str>) -> Option<&'a Rc<Function>> {
    let module = assembly.module();
    match entry {
        Some(name) => module.get_function(name),
        None => module
            .get_function("main")
            .or_else(|| module.functions.iter().find(|f| !f.is_test)),
    }
}

/// Bare integers take the parameter's bits type; everything else is a
/// literal in assembly syntax.
fn parse_arg(text: &str, param: &Param, assembly: &Assembly) -> Result<Value, AssembleError> {
    let bare = text
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit());
    let literal = match &param.ty {
        ConcreteType::Bits { .. } if bare => format!("{}:{text}", param.ty),
        _ => text.to_string(),
    };
    parser::parse_value_text(&literal, assembly.module())
}

fn cmd_run(session: &Session, entry: Option<&str>, args: &[String]) -> ExitCode {
    let assembly = match session.assemble() {
        Ok(a) => a,
        Err(code) => return code,
    };
    let Some(function) = pick_entry(&assembly, entry) else {
        let name = entry.unwrap_or("main");
        session.report(Diagnostic::error(format!("no function `{name}` to run")).with_code("HVM-R002"));
        return ExitCode::FAILURE;
    };
    if args.len() != function.param_count() {
        session.report(
            Diagnostic::error(format!(
                "`{}` takes {} argument(s), {} given",
                function.name,
                function.param_count(),
                args.len()
            ))
            .with_code("HVM-R002"),
        );
        return ExitCode::FAILURE;
    }

    let mut values = Vec::with_capacity(args.len());
    for (text, param) in args.iter().zip(&function.params) {
        match parse_arg(text, param, &assembly) {
            Ok(v) => values.push(v),
            Err(e) => {
                let d = Diagnostic::from(&e).with_note(format!("while reading argument `{}` = {text}", param.name));
                // Spans point into the argument, not the file.
                let d = Diagnostic { labels: Vec::new(), ..d };
                session.report(d);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut import_data = ImportData::new();
    assembly.install(&mut import_data);
    let result = assembly
        .entry(&import_data, &function.name)
        .and_then(|bf| vm::interpret(&import_data, bf, values));
    match result {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            session.report(Diagnostic::from(&e));
            ExitCode::FAILURE
        }
    }
}

fn cmd_test(session: &Session, filter: Option<&str>) -> ExitCode {
    let assembly = match session.assemble() {
        Ok(a) => a,
        Err(code) => return code,
    };
    let mut import_data = ImportData::new();
    assembly.install(&mut import_data);

    let (mut passed, mut failed) = (0usize, 0usize);
    let tests = assembly
        .module()
        .tests()
        .filter(|t| filter.is_none_or(|f| t.name.contains(f)));
    for test in tests {
        let outcome = assembly
            .entry(&import_data, &test.name)
            .and_then(|bf| vm::interpret(&import_data, bf, Vec::new()));
        match outcome {
            Ok(_) => {
                passed += 1;
                println!("test {} ... ok", test.identifier());
            }
            Err(e) => {
                failed += 1;
                println!("test {} ... FAILED", test.identifier());
                session.report(Diagnostic::from(&e));
            }
        }
    }

    if passed + failed == 0 {
        let message = match filter {
            Some(f) => format!("no tests match filter `{f}`"),
            None => format!("module `{}` has no tests", assembly.module().name),
        };
        session.report(Diagnostic::warning(message));
    }

    let status = if failed == 0 { "ok" } else { "FAILED" };
    println!("\ntest result: {status}. {passed} passed; {failed} failed");
    if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn cmd_check(session: &Session) -> ExitCode {
    match session.assemble() {
        Ok(assembly) => {
            let module = assembly.module();
            let tests = module.tests().count();
            println!(
                "{}: ok ({} function(s), {tests} test(s))",
                session.path,
                module.functions.len() - tests
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn cmd_dis(session: &Session) -> ExitCode {
    let assembly = match session.assemble() {
        Ok(a) => a,
        Err(code) => return code,
    };
    if session.json {
        match serde_json::to_string_pretty(&assembly.listing()) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                session.report(Diagnostic::error(format!("cannot serialize listing: {e}")));
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{assembly}");
    }
    ExitCode::SUCCESS
}

fn cmd_explain(code: &str) -> ExitCode {
    match registry::lookup(code) {
        Some(entry) => {
            println!("{}", entry.long.trim_end());
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("unknown diagnostic code `{code}`");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = match &cli.command {
        Command::Explain { code } => return cmd_explain(code),
        Command::Run { file, .. } | Command::Test { file, .. } | Command::Check { file } | Command::Dis { file } => file,
    };
    let session = match Session::open(&cli, file) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match &cli.command {
        Command::Run { entry, args, .. } => cmd_run(&session, entry.as_deref(), args),
        Command::Test { filter, .. } => cmd_test(&session, filter.as_deref()),
        Command::Check { .. } => cmd_check(&session),
        Command::Dis { .. } => cmd_dis(&session),
        Command::Explain { .. } => ExitCode::SUCCESS,
    }
}
