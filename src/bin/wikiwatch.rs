//! wikiwatch command-line client
//!
//! Prints a line for every Wikipedia edit matching the given filters.

use std::process;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wikiwatch::{Event, EventFormat, Predicate, Watcher, WatcherConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line options
struct Options {
    /// Filters, OR-combined
    filters: Vec<Predicate>,
    /// Output line template
    format: EventFormat,
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn value(args: &[String], i: usize, flag: &str) -> String {
    args.get(i + 1)
        .cloned()
        .unwrap_or_else(|| fail(&format!("{flag} requires a value")))
}

fn print_help() {
    println!("wikiwatch - watch Wikipedia edits matching filters");
    println!();
    println!("USAGE:");
    println!("    wikiwatch [OPTIONS]");
    println!();
    println!("With no filters, every anonymous edit is printed.");
    println!("Multiple filters are combined: an edit matching any of them is printed.");
    println!();
    println!("OPTIONS:");
    println!("    -a, --address <PATTERN>         IPv4 or IPv6 address pattern, e.g. 10.*.*.* or 2001:*:*:*:*:*:*:0-ff");
    println!("    -u, --username-regex <REGEX>    Regex searched in the username");
    println!("    -f, --field <NAME> <REGEX>      Regex searched in any named event field");
    println!("    -s, --format-string <FORMAT>    Output line [default: {{user}} edited {{title_url}}]");
    println!("        --version                   Print version information");
    println!("    -h, --help                      Print help information");
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        filters: Vec::new(),
        format: EventFormat::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--address" | "-a" => {
                let pattern = value(&args, i, "--address");
                let filter =
                    Predicate::address(&pattern).unwrap_or_else(|e| fail(&e.to_string()));
                options.filters.push(filter);
                i += 2;
            }
            "--username-regex" | "-u" => {
                let regex = value(&args, i, "--username-regex");
                let filter =
                    Predicate::username_regex(&regex).unwrap_or_else(|e| fail(&e.to_string()));
                options.filters.push(filter);
                i += 2;
            }
            "--field" | "-f" => {
                let name = value(&args, i, "--field");
                let regex = value(&args, i + 1, "--field");
                let filter =
                    Predicate::field_regex(name, &regex).unwrap_or_else(|e| fail(&e.to_string()));
                options.filters.push(filter);
                i += 3;
            }
            "--format-string" | "-s" => {
                let format = value(&args, i, "--format-string");
                options.format =
                    EventFormat::parse(&format).unwrap_or_else(|e| fail(&e.to_string()));
                i += 2;
            }
            "--version" => {
                println!("wikiwatch {}", env!("CARGO_PKG_VERSION"));
                process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            arg => fail(&format!("unknown argument: {arg}")),
        }
    }

    options
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let options = parse_args();

    let filter = if options.filters.is_empty() {
        Predicate::any_address()
    } else {
        Predicate::any(options.filters)
    };
    info!(%filter, "watching");

    let format = options.format;
    let watcher = Watcher::builder()
        .config(WatcherConfig::default())
        .filter(filter, move |edit: &Event| {
            match format.render(edit) {
                Some(line) => println!("{line}"),
                None => debug!(%format, "edit lacks a field used by the format string"),
            }
            Ok(())
        })
        .connect_wikimedia()?;

    watcher.run()?;
    while watcher.is_running() {
        thread::sleep(POLL_INTERVAL);
    }
    watcher.stop()?;

    info!(stats = ?watcher.stats(), "stream ended");
    Ok(())
}
