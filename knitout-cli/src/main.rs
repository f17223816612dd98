//! Thin command-line front end over `knitout-parse` and `knitout`: parse a knitout
//! source file, execute it, and write the reorganized, validated program back out.
//!
//! Modeled on the teacher's `vasm`/`vex` binary crates: a `clap` builder-style argument
//! list, a hand-rolled aggregate `Error` enum implementing `Display`, and a `main` that
//! prints the error and exits non-zero rather than panicking.

#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use clap::Arg;
use thiserror::Error;

use knitout::debug::{ChannelDebugger, DebugEvent, StepMode};
use knitout::header::Header;
use knitout::machine::{PolicyAction, ViolationKind, ViolationPolicy};
use knitout::program::Program;
use knitout::Executer;
use knitout_parse::ParseError;

#[derive(Error, Debug)]
enum CliError {
    #[error("reading input \"{path}\" failed: {cause}")]
    ReadInput {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
    #[error("writing output \"{path}\" failed: {cause}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
    #[error("parsing input failed: {0}")]
    Parse(#[from] ParseError),
    #[error("executing program failed: {0}")]
    Execution(#[from] knitout::ExecutionError),
    #[error("unrecognized violation kind {0:?}")]
    UnknownViolationKind(String),
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Knitout source file to interpret (\"-\" reads from stdin)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("File to write the reorganized program to (defaults to stdout)"),
        )
        .arg(
            Arg::with_name("warn")
                .long("warn")
                .takes_value(true)
                .value_name("KIND")
                .multiple(true)
                .number_of_values(1)
                .help("Downgrade a machine-state violation kind to a warning"),
        )
        .arg(
            Arg::with_name("ignore")
                .long("ignore")
                .takes_value(true)
                .value_name("KIND")
                .multiple(true)
                .number_of_values(1)
                .help("Silently ignore a machine-state violation kind"),
        )
        .arg(
            Arg::with_name("step")
                .long("step")
                .conflicts_with("step_pass")
                .help("Pause before every instruction, waiting for Enter on stdin to continue"),
        )
        .arg(
            Arg::with_name("step_pass")
                .long("step-pass")
                .help("Pause after every closed carriage pass, waiting for Enter on stdin to continue"),
        )
        .arg(
            Arg::with_name("drop_comments")
                .long("drop-comments")
                .help("Omit comment lines from the reorganized output"),
        )
        .arg(
            Arg::with_name("drop_no_ops")
                .long("drop-no-ops")
                .help("Omit No-Op lines from the reorganized output"),
        )
        .arg(
            Arg::with_name("drop_pauses")
                .long("drop-pauses")
                .help("Omit pause lines from the reorganized output"),
        )
        .arg(
            Arg::with_name("drop_breakpoints")
                .long("drop-breakpoints")
                .help("Omit breakpoint lines from the reorganized output"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let warn = matches.values_of("warn").into_iter().flatten();
    let ignore = matches.values_of("ignore").into_iter().flatten();
    let step_mode = if matches.is_present("step") {
        Some(StepMode::Step)
    } else if matches.is_present("step_pass") {
        Some(StepMode::StepCarriagePass)
    } else {
        None
    };
    let drop_comments = matches.is_present("drop_comments");
    let drop_no_ops = matches.is_present("drop_no_ops");
    let drop_pauses = matches.is_present("drop_pauses");
    let drop_breakpoints = matches.is_present("drop_breakpoints");

    let result = run(
        input,
        output,
        warn,
        ignore,
        step_mode,
        drop_comments,
        drop_no_ops,
        drop_pauses,
        drop_breakpoints,
    );

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn build_policy<'a>(
    warn: impl Iterator<Item = &'a str>,
    ignore: impl Iterator<Item = &'a str>,
) -> Result<ViolationPolicy, CliError> {
    let mut policy = ViolationPolicy::strict();
    for kind in warn {
        let kind: ViolationKind = kind
            .parse()
            .map_err(|_| CliError::UnknownViolationKind(kind.to_string()))?;
        policy = policy.relax(kind, PolicyAction::Warn);
    }
    for kind in ignore {
        let kind: ViolationKind = kind
            .parse()
            .map_err(|_| CliError::UnknownViolationKind(kind.to_string()))?;
        policy = policy.relax(kind, PolicyAction::Ignore);
    }
    Ok(policy)
}

#[allow(clippy::too_many_arguments)]
fn run<'a>(
    input: &str,
    output: Option<&str>,
    warn: impl Iterator<Item = &'a str>,
    ignore: impl Iterator<Item = &'a str>,
    step_mode: Option<StepMode>,
    drop_comments: bool,
    drop_no_ops: bool,
    drop_pauses: bool,
    drop_breakpoints: bool,
) -> Result<(), CliError> {
    let source = if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|cause| CliError::ReadInput { path: PathBuf::from("<stdin>"), cause })?;
        buf
    } else {
        let input_path = Path::new(input);
        std::fs::read_to_string(input_path).map_err(|cause| CliError::ReadInput {
            path: input_path.to_owned(),
            cause,
        })?
    };

    log::info!("parsing {}", input);
    let program = knitout_parse::parse(&source)?;

    let policy = build_policy(warn, ignore)?;

    let (executed, loops_made) = match step_mode {
        Some(mode) => run_stepped(program, policy, mode)?,
        None => {
            let mut executer = Executer::new(Header::new()).with_policy(policy);
            executer.run(&program)?;
            let loops_made = executer.machine().loops().len();
            (executer.executed_program().clone(), loops_made)
        }
    };
    log::info!("executed {} lines, {} loops made", executed.len(), loops_made);

    let organized = executed.organize(drop_comments, drop_no_ops, drop_pauses, drop_breakpoints);

    match output {
        Some(path) => {
            let output_path = PathBuf::from(path);
            let mut file = File::create(&output_path).map_err(|cause| CliError::WriteOutput {
                path: output_path.clone(),
                cause,
            })?;
            write_program(&mut file, &organized).map_err(|cause| CliError::WriteOutput {
                path: output_path,
                cause,
            })?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_program(&mut handle, &organized).map_err(|cause| CliError::WriteOutput {
                path: PathBuf::from("<stdout>"),
                cause,
            })?;
        }
    }

    Ok(())
}

/// Drives an interactive step session: the executer runs on a worker thread, pausing
/// on a `ChannelDebugger` before each instruction (or after each pass); this thread
/// prints the pause event and blocks on a line of stdin before sending the resume
/// signal back. There is no bundled TUI, just the minimal loop the library's
/// `DebugHook` contract requires a driver to implement.
fn run_stepped(
    program: Program,
    policy: ViolationPolicy,
    mode: StepMode,
) -> Result<(Program, usize), CliError> {
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    let (event_tx, event_rx) = mpsc::channel::<DebugEvent>();
    let debugger = ChannelDebugger::new(mode, resume_rx, event_tx);

    let worker = thread::spawn(move || {
        let mut executer = Executer::new(Header::new())
            .with_policy(policy)
            .with_debugger(Box::new(debugger));
        let result = executer.run(&program);
        let loops_made = executer.machine().loops().len();
        let executed = executer.executed_program().clone();
        // `executer` (and the debugger holding `event_tx`) is dropped here, at the end
        // of the worker closure, so the main thread's event loop below sees the
        // channel close once the run truly finishes.
        (result, executed, loops_made)
    });

    let stdin = io::stdin();
    for event in event_rx {
        match event {
            DebugEvent::PausedBeforeInstruction(id) => {
                eprintln!("paused before instruction #{}, press Enter to continue", id);
            }
            DebugEvent::PausedAfterPass(id) => {
                eprintln!("paused after carriage pass #{}, press Enter to continue", id);
            }
            DebugEvent::Error(id) => {
                eprintln!("error raised at instruction #{}", id);
            }
        }
        let mut line = String::new();
        let _ = stdin.lock().read_line(&mut line);
        let _ = resume_tx.send(());
    }

    let (result, executed, loops_made) = worker.join().expect("debugger worker thread panicked");
    result?;
    Ok((executed, loops_made))
}

fn write_program<W: Write>(writer: &mut W, program: &knitout::Program) -> io::Result<()> {
    for line in program.lines() {
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}
