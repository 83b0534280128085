use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::AsFd;

use anyhow::Context;
use jobsh::error::report;
use jobsh::input::{InputError, LineReader};
use jobsh::{Config, Shell};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    init_logging();

    let mut shell = Shell::new(Config::from_env()).context("failed to initialize the shell")?;

    // Unbuffered, and bound to the input the shell started with even while
    // descriptor 0 is redirected. A terminal hands over one line per read;
    // any other input is taken a byte at a time so the rest of it stays for
    // the commands that read it.
    let input = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("cannot duplicate standard input")?;
    let chunk = if shell.is_interactive() { 1024 } else { 1 };
    let mut lines = LineReader::new(File::from(input), shell.config().max_line, chunk);

    loop {
        shell.notify();
        if shell.is_interactive() {
            print!("{}", shell.config().prompt);
            let _ = io::stdout().flush();
        }

        match lines.read_line() {
            Ok(Some(line)) => {
                if let Err(e) = shell.execute_line(&line) {
                    report(&e);
                }
            }
            Ok(None) => break,
            Err(e @ InputError::TooLong { .. }) => eprintln!("jobsh: {e}"),
            Err(e) => return Err(e).context("cannot read commands"),
        }
    }

    if shell.is_interactive() {
        println!();
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("JOBSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
