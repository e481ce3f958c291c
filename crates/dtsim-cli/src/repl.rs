//! The `-i` interactive command loop.

use std::io::{self, BufRead, Write};

use dtsim_core::Observable;
use dtsim_sim::{RunOutcome, System};

const HELP: &str = "\
Commands:
  help                 show this message
  step [N]             advance N cycles (default 1)
  run                   advance until completion or deadlock
  print [PATH]          print a query path, or every recognised path
  state                 print live family/thread summary for every tile
  debug [SIM|PROG|ALL]  placeholder for future debug-level selection
  profiles               print accumulated statistics
  quit                   exit
";

pub fn run(system: &mut System, prefix: &str) {
    let stdin = io::stdin();
    print!("{prefix}> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if !line.is_empty() {
            dispatch(system, line);
        }
        print!("{prefix}> ");
        let _ = io::stdout().flush();
    }
}

fn dispatch(system: &mut System, line: &str) {
    let mut tokens = line.split_whitespace();
    match tokens.next().unwrap_or("") {
        "help" => print!("{HELP}"),
        "step" => {
            let n: u64 = tokens.next().and_then(|s| s.parse().ok()).unwrap_or(1);
            for _ in 0..n {
                system.tick();
            }
            println!("cycle {}", system.cycle());
        }
        "run" => match system.run(u64::MAX) {
            RunOutcome::Completed { cycles } => println!("completed after {cycles} cycles"),
            RunOutcome::BudgetExhausted => println!("cycle budget exhausted"),
            RunOutcome::Deadlocked(report) => {
                println!("deadlock at cycle {}: {}", report.cycle, report.components.join(", "));
            }
        },
        "print" => match tokens.next() {
            Some(path) => match system.query(path) {
                Some(value) => println!("{path} = {value}"),
                None => println!("no such path: {path}"),
            },
            None => {
                for path in system.query_paths() {
                    println!("{path}");
                }
            }
        },
        "state" => print_state(system),
        "debug" => println!("debug level selection is not implemented; query paths via `print`"),
        "profiles" => print_profiles(system),
        "quit" | "exit" => std::process::exit(0),
        other => println!("unknown command `{other}`, try `help`"),
    }
}

fn print_state(system: &System) {
    for tile in &system.tiles {
        println!("tile {}:", tile.id);
        for (fid, fam) in tile.families.iter_live() {
            println!("  family {fid}: state={:?} pc={} exit_code={}", fam.state, fam.pc, fam.exit_code);
        }
    }
}

fn print_profiles(system: &System) {
    let s = &system.statistics;
    println!("cycles: {}", s.cycles);
    println!("integer ops retired: {}", s.integer_ops_retired);
    println!("float ops retired: {}", s.float_ops_retired);
    println!("loads retired: {}", s.loads_retired);
    println!("stores retired: {}", s.stores_retired);
    println!("families created: {}", s.families_created);
    println!("pipeline idle cycles: {}", s.pipeline_idle_cycles);
    println!(
        "active queue depth: min={} avg={:.2} max={}",
        s.active_queue_depth.min(),
        s.active_queue_depth.avg(),
        s.active_queue_depth.max()
    );
    println!(
        "cleanup queue depth: min={} avg={:.2} max={}",
        s.cleanup_queue_depth.min(),
        s.cleanup_queue_depth.avg(),
        s.cleanup_queue_depth.max()
    );
}
