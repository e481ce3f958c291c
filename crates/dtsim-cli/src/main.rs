//! `dtsim` — loads a program and config, seeds initial registers, then
//! either runs to completion/deadlock or drops into the interactive loop.
//!
//! Follows `emu-spectrum`'s hand-rolled `parse_args` shape: no CLI-parsing
//! dependency, a plain struct populated by a `while i < args.len()` loop.

mod program;
mod repl;

use std::path::PathBuf;
use std::process;

use dtsim_config::{Config, SystemConfig};
use dtsim_regfile::{RegAddr, RegData, RegType, WriteValue};
use dtsim_sim::{RunOutcome, System};

struct CliArgs {
    program_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    interactive: bool,
    legacy: bool,
    print_prefix: String,
    overrides: Vec<String>,
    integer_seeds: Vec<(u32, i64)>,
    float_seeds: Vec<(u32, f64)>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        program_path: None,
        config_path: None,
        interactive: false,
        legacy: false,
        print_prefix: "dtsim".to_string(),
        overrides: Vec::new(),
        integer_seeds: Vec::new(),
        float_seeds: Vec::new(),
    };

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-c" => {
                i += 1;
                cli.config_path = args.get(i).map(PathBuf::from);
            }
            "-i" => cli.interactive = true,
            "-l" => cli.legacy = true,
            "-p" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.print_prefix = s.clone();
                }
            }
            "-o" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.overrides.push(s.clone());
                }
            }
            "--help" | "-h" => {
                eprintln!("Usage: dtsim [OPTIONS] <program>");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  -c <file>       config file");
                eprintln!("  -i              interactive command loop");
                eprintln!("  -l              legacy binary image (unsupported, no ELF/ISA decode)");
                eprintln!("  -p <str>        print prefix for the interactive loop");
                eprintln!("  -o <NAME=VAL>   config override, repeatable");
                eprintln!("  -R<n> <val>     seed integer register n before the root family starts");
                eprintln!("  -F<n> <val>     seed float register n before the root family starts");
                process::exit(0);
            }
            other if other.starts_with("-R") && other.len() > 2 => {
                if let Ok(n) = other[2..].parse::<u32>() {
                    i += 1;
                    if let Some(val) = args.get(i).and_then(|s| s.parse().ok()) {
                        cli.integer_seeds.push((n, val));
                    }
                }
            }
            other if other.starts_with("-F") && other.len() > 2 => {
                if let Ok(n) = other[2..].parse::<u32>() {
                    i += 1;
                    if let Some(val) = args.get(i).and_then(|s| s.parse().ok()) {
                        cli.float_seeds.push((n, val));
                    }
                }
            }
            other if !other.starts_with('-') => {
                cli.program_path = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> Config {
    let mut config = match &cli.config_path {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => Config::from_str(""),
    };
    for spec in &cli.overrides {
        if let Err(e) = config.apply_override(spec) {
            eprintln!("Bad override `{spec}`: {e}");
            process::exit(1);
        }
    }
    config
}

fn seed_registers(system: &mut System, cli: &CliArgs) {
    let tile = &mut system.tiles[0];
    for &(index, value) in &cli.integer_seeds {
        let addr = RegAddr::new(RegType::Integer, index);
        if let Err(e) = tile.regfile.write(addr, WriteValue::Full(RegData::Integer(value as u64)), dtsim_regfile::Producer::Allocator) {
            eprintln!("Failed to seed integer register {index}: {e}");
        }
    }
    for &(index, value) in &cli.float_seeds {
        let addr = RegAddr::new(RegType::Float, index);
        if let Err(e) = tile.regfile.write(addr, WriteValue::Full(RegData::Float(value)), dtsim_regfile::Producer::Allocator) {
            eprintln!("Failed to seed float register {index}: {e}");
        }
    }
}

fn main() {
    let cli = parse_args();

    if cli.legacy {
        eprintln!("legacy binary images are not supported (no ELF loader or ISA decode)");
        process::exit(1);
    }

    let Some(program_path) = &cli.program_path else {
        eprintln!("no program file given; see --help");
        process::exit(1);
    };
    let text = match std::fs::read_to_string(program_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to read program {}: {e}", program_path.display());
            process::exit(1);
        }
    };
    let parsed = match program::parse(&text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Program error: {e}");
            process::exit(1);
        }
    };

    let raw_config = load_config(&cli);
    let sys_config = match SystemConfig::from_config(&raw_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            process::exit(1);
        }
    };

    let mut system = match System::new(&sys_config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to build system: {e}");
            process::exit(1);
        }
    };

    seed_registers(&mut system, &cli);
    system.load_program(0, parsed.ops);
    if system.spawn(0, None, 0, parsed.request).is_none() {
        eprintln!("Failed to start the root family (table full?)");
        process::exit(1);
    }

    if cli.interactive {
        repl::run(&mut system, &cli.print_prefix);
        return;
    }

    match system.run(1_000_000) {
        RunOutcome::Completed { cycles } => {
            println!("{}: completed after {cycles} cycles", cli.print_prefix);
        }
        RunOutcome::BudgetExhausted => {
            eprintln!("{}: cycle budget exhausted without completion", cli.print_prefix);
            process::exit(1);
        }
        RunOutcome::Deadlocked(report) => {
            eprintln!("{}: deadlock at cycle {}: {}", cli.print_prefix, report.cycle, report.components.join(", "));
            process::exit(1);
        }
    }
}
