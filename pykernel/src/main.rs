use clap::Parser as ClapParser;
use std::{
    process,
    sync::{Arc, Barrier},
    thread,
    time::Instant,
};

use pykernel::{TypeSystem, Value, abstract_api};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Threads racing to first-touch the global type system
    #[arg(long, default_value_t = 20, help = "Threads racing to bootstrap")]
    threads: usize,

    /// Names of classes to define, each deriving from the one before
    #[arg(long = "define", help = "Define a class and print its MRO")]
    define: Vec<String>,

    #[arg(long, help = "Log bootstrap and factory activity")]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let answers = race(cli.threads.max(1));
    let sys = match TypeSystem::global() {
        Ok(sys) => sys,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };

    println!(
        "bootstrap committed after {:?}, {} bootstrap(s)",
        sys.ready_at() - sys.bootstrap_at(),
        TypeSystem::global_bootstraps()
    );
    for (i, at) in answers.iter().enumerate() {
        match at.checked_duration_since(sys.ready_at()) {
            Some(after) => println!("thread {i:>3}: answered {after:?} after commit"),
            None => println!("thread {i:>3}: answered BEFORE commit"),
        }
    }

    let mut base = sys.object().clone();
    for name in &cli.define {
        let ty = match sys.define_class(name, &[base.clone()], Vec::<(&str, Value)>::new(), None) {
            Ok(ty) => ty,
            Err(err) => {
                eprintln!("Error defining {name}: {err}");
                process::exit(1);
            }
        };
        let mro = ty.mro();
        let names: Vec<&str> = mro.iter().map(|t| &**t.name()).collect();
        println!("{ty} backed by {}: mro [{}]", ty.canonical_class(), names.join(", "));
        match abstract_api::call(sys, &ty.as_value(), &[], &[]).and_then(|v| abstract_api::repr(sys, &v)) {
            Ok(text) => println!("  instance: {text}"),
            Err(err) => println!("  instance: {err}"),
        }
        base = ty;
    }
}

/// Release `threads` threads at once onto the global type system and
/// collect when each got its answer.
fn race(threads: usize) -> Vec<Instant> {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let answer = TypeSystem::global().and_then(|sys| {
                    sys.representation(Value::int(0).class()).map(drop)
                });
                (Instant::now(), answer)
            })
        })
        .collect();

    let mut answers = Vec::with_capacity(threads);
    for handle in handles {
        match handle.join() {
            Ok((at, Ok(()))) => answers.push(at),
            Ok((_, Err(err))) => {
                eprintln!("Error: {err}");
                process::exit(1);
            }
            Err(_) => {
                eprintln!("Error: a racing thread panicked");
                process::exit(1);
            }
        }
    }
    answers
}
