//! `parexsh`: a line-oriented shell over [parex::Shell]. Reads commands from
//! stdin, prints a `# ` prompt before each, and reports one status line per
//! command: `ok`, `timeout`, `unknown`, or `error`. `exit` prints none of
//! these - it just ends the loop.

use std::io::{self, BufRead, Write};

use clap::Parser;
use parex::{Error, InterleavedPrinter, Shell};

#[derive(Parser, Debug)]
#[command(name = "parexsh", about = "A parallel expect shell")]
struct Args {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable ANSI colour in the interleaved transcript
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let printer = Box::new(InterleavedPrinter::new(io::stderr(), !args.no_color));
    let mut shell = Shell::new(printer);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("# ");
    let _ = stdout.flush();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("failed to read stdin: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            print!("# ");
            let _ = stdout.flush();
            continue;
        }
        if trimmed == "exit" {
            break;
        }

        match shell.execute(trimmed) {
            Ok(parex::cli::Output::None) => println!("ok"),
            Ok(parex::cli::Output::Line(text)) => {
                println!("{}", text);
                println!("ok");
            }
            Err(Error::Timeout) => println!("timeout"),
            Err(Error::UnknownCommand) => println!("unknown"),
            Err(e) => {
                log::error!("{}", e);
                println!("error");
            }
        }

        print!("# ");
        let _ = stdout.flush();
    }

    std::process::exit(0);
}
