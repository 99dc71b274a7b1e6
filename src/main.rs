use std::{env, fs, path::Path};

use log::{LevelFilter, Log, Metadata, Record};

use quadra::bytecode::compile::parse_events;
use quadra::bytecode::disasm::print_program;
use quadra::bytecode::{AddressNames, CodeGenerator, Program};
use quadra::runtime::VirtualMachine;

/// Minimal `log` backend writing to stderr.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = env::var("QUADRA_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn);

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let show_quads = args.contains(&"--quads".to_string());
    let dump_json = args.contains(&"--json".to_string());
    let output = flag_value(&args, "-o");

    // first non-flag argument after the command is the input file
    let input = args
        .iter()
        .skip(2)
        .filter(|a| !a.starts_with('-'))
        .find(|a| Some(a.as_str()) != output.as_deref());

    let Some(input) = input else {
        print_usage();
        std::process::exit(1);
    };

    match args[1].as_str() {
        "compile" => {
            let (program, names) = compile_file(input);
            if show_quads {
                print_program(&program, &names);
            }
            if dump_json {
                match program.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => fail("Serialize error", e),
                }
            }
            let path = output.unwrap_or_else(|| default_output(input));
            write_program(&program, &path);
        }
        "run" => {
            let program = read_program(input);
            run_program(&program);
        }
        "exec" => {
            let (program, names) = compile_file(input);
            if show_quads {
                print_program(&program, &names);
            }
            run_program(&program);
        }
        "dis" => {
            let program = read_program(input);
            print_program(&program, &AddressNames::new());
        }
        other => {
            eprintln!("Unknown command '{}'", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("QUADRA - Quadruple code generator and virtual machine");
    println!();
    println!("Usage:");
    println!("  quadra compile <events.json> [-o out.qbc]   Compile an event script");
    println!("         [--quads] [--json]                   ...and list quads / dump JSON");
    println!("  quadra run <program.qbc>                    Run a compiled program");
    println!("  quadra exec <events.json> [--quads]         Compile and run");
    println!("  quadra dis <program.qbc>                    Disassemble a program");
    println!("  quadra --help, -h                           Show this help");
    println!();
    println!("Set QUADRA_LOG=debug (or trace) for diagnostics on stderr.");
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn default_output(input: &str) -> String {
    Path::new(input)
        .with_extension("qbc")
        .to_string_lossy()
        .into_owned()
}

fn compile_file(filename: &str) -> (Program, AddressNames) {
    let source = match fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => fail(&format!("Failed to read '{}'", filename), e),
    };
    let events = match parse_events(&source) {
        Ok(events) => events,
        Err(e) => fail("Event script error", e),
    };

    let mut generator = CodeGenerator::new();
    for event in &events {
        if let Err(e) = generator.apply(event) {
            fail("Compile error", e);
        }
    }
    match generator.finish() {
        Ok(result) => result,
        Err(e) => fail("Compile error", e),
    }
}

fn write_program(program: &Program, path: &str) {
    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => fail("Serialize error", e),
    };
    if let Err(e) = fs::write(path, bytes) {
        fail(&format!("Failed to write '{}'", path), e);
    }
}

fn read_program(filename: &str) -> Program {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => fail(&format!("Failed to read '{}'", filename), e),
    };
    match Program::from_bytes(&bytes) {
        Ok(program) => program,
        Err(e) => fail("Invalid program file", e),
    }
}

fn run_program(program: &Program) {
    let mut vm = VirtualMachine::new();
    if let Err(e) = vm.run(program) {
        fail("Runtime error", e);
    }
}
