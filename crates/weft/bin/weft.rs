//! Weft command-line host.
//!
//! Usage:
//!   weft <image>                    Run a compiled function image
//!   weft --resume <snapshot>        Restore a context snapshot and run it
//!   weft --save <snapshot> <image>  Run a bounded number of rounds, then
//!                                   snapshot the whole context to disk
//!
//! Exit codes: 0 on success, 1 on usage errors, 2 on load or runtime
//! failures.

use std::process::ExitCode;
use std::{env, fs};

use weft::{run_bounded, run_function_image, run_rounds, standard_context, HostError, Value};

const USAGE: &str = "\
Usage: weft [OPTIONS] <IMAGE>

Arguments:
  <IMAGE>  Compiled function image to run

Options:
  --resume <SNAPSHOT>          Restore a context snapshot and run it
  --save <SNAPSHOT> [ROUNDS]   With <IMAGE>: run up to ROUNDS rounds
                               (default 1000), then snapshot the context
  -h, --help                   Print this help message";

/// Default round budget for `--save`, after which the context is dumped.
const DEFAULT_SAVE_ROUNDS: usize = 1000;

enum Action {
    Run(String),
    Resume(String),
    Save {
        snapshot: String,
        image: String,
        rounds: usize,
    },
    Help,
}

fn parse_args() -> Result<Action, String> {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.as_slice() {
        [] => Err("missing image argument".to_string()),
        [arg] if arg == "-h" || arg == "--help" => Ok(Action::Help),
        [flag] if flag == "--resume" || flag == "--save" => {
            Err(format!("{} requires an argument", flag))
        }
        [flag, snapshot] if flag == "--resume" => Ok(Action::Resume(snapshot.clone())),
        [flag, snapshot, image] if flag == "--save" => Ok(Action::Save {
            snapshot: snapshot.clone(),
            image: image.clone(),
            rounds: DEFAULT_SAVE_ROUNDS,
        }),
        [flag, snapshot, image, rounds] if flag == "--save" => {
            let rounds = rounds
                .parse()
                .map_err(|_| format!("invalid round count '{}'", rounds))?;
            Ok(Action::Save {
                snapshot: snapshot.clone(),
                image: image.clone(),
                rounds,
            })
        }
        [image] => Ok(Action::Run(image.clone())),
        _ => Err(USAGE.to_string()),
    }
}

fn run(path: &str) -> Result<(), HostError> {
    let image = fs::read(path)?;
    let mut ctx = standard_context();
    run_function_image(&mut ctx, &image)?;
    ctx.clear();
    Ok(())
}

fn resume(path: &str) -> Result<(), HostError> {
    let snapshot = fs::read(path)?;
    let mut ctx = standard_context();
    ctx.load_snapshot(&snapshot)?;
    run_rounds(&mut ctx, -1)?;
    ctx.clear();
    Ok(())
}

fn save(snapshot_path: &str, image_path: &str, rounds: usize) -> Result<(), HostError> {
    let image = fs::read(image_path)?;
    let mut ctx = standard_context();

    let main = ctx.load_value_bytes(&image)?;
    if !matches!(main, Value::Function(_)) {
        return Err(HostError::NotAFunction);
    }
    let tid = ctx.new_thread();
    ctx.init_thread(tid, main, &[], Value::Null)?;
    run_bounded(&mut ctx, rounds, -1)?;

    let bytes = ctx.save_snapshot()?;
    fs::write(snapshot_path, bytes)?;
    ctx.clear();
    Ok(())
}

fn main() -> ExitCode {
    let action = match parse_args() {
        Ok(action) => action,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            return ExitCode::from(1);
        }
    };

    let outcome = match action {
        Action::Help => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Action::Run(image) => run(&image),
        Action::Resume(snapshot) => resume(&snapshot),
        Action::Save {
            snapshot,
            image,
            rounds,
        } => save(&snapshot, &image, rounds),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
    }
}
