use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use tracing::debug;

pub mod builtins;
pub mod config;
pub mod detect;
pub mod error;
pub mod input;
pub mod job;
pub mod launcher;
pub mod reaper;
pub mod redirect;
pub mod sys;
pub mod tokenizer;

pub use builtins::Builtin;
pub use config::Config;
pub use error::ShellError;
pub use tokenizer::tokenize;

use detect::{RedirectionIntent, detect_redirection, is_background};
use job::{JobTable, Mode, ShellContext, WaitOutcome};
use launcher::Launch;
use redirect::Redirection;

/// Result of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStatus {
    /// The shell should continue running.
    Continue,
    /// The shell should exit with the provided code.
    Exit(i32),
}

/// The interpreter: configuration, terminal context and background jobs.
pub struct Shell {
    config: Config,
    context: ShellContext,
    jobs: JobTable,
}

impl Shell {
    /// Sets up terminal control and the background reaper.
    pub fn new(config: Config) -> Result<Self, ShellError> {
        let context = ShellContext::init()?;
        Shell::with_context(config, context)
    }

    fn with_context(config: Config, context: ShellContext) -> Result<Self, ShellError> {
        reaper::install().map_err(ShellError::system("sigaction"))?;
        Ok(Shell {
            config,
            context,
            jobs: JobTable::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_interactive(&self) -> bool {
        self.context.is_interactive()
    }

    /// Reports background jobs that finished since the last call.
    pub fn notify(&mut self) {
        for notice in self.jobs.collect() {
            if self.is_interactive() {
                println!("{notice}");
            }
        }
    }

    /// Orchestrates one input line.
    ///
    /// A trailing `&` and a final `< file` / `> file` are stripped off first.
    /// Builtins then run inside the shell; anything else is launched as a
    /// job. A redirection is undone before this returns, whatever happened.
    pub fn execute_line(&mut self, line: &str) -> Result<(), ShellError> {
        let mut tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(());
        }

        let mode = if is_background(&tokens) {
            tokens.truncate(1)?;
            Mode::Background
        } else {
            Mode::Foreground
        };

        let target = match detect_redirection(&tokens) {
            RedirectionIntent::Malformed => return Err(ShellError::RedirectionMalformed),
            intent => match intent.direction() {
                Some((direction, index)) => {
                    let path = PathBuf::from(tokens.token_at(index)?);
                    tokens.truncate(2)?;
                    Some((direction, path))
                }
                None => None,
            },
        };

        if let Some(index) = (0..tokens.len()).find(|&i| tokens.is_any_operator(i)) {
            return Err(ShellError::UnexpectedOperator(
                tokens.token_at(index)?.to_string(),
            ));
        }

        let command = tokens.words().collect::<Vec<_>>().join(" ");
        let argv = tokens.into_words();
        let redirection = target
            .map(|(direction, path)| Redirection::apply(direction, &path))
            .transpose()?;

        let Some(name) = argv.first() else {
            return Ok(());
        };

        if let Some(builtin) = builtins::lookup(name) {
            debug!(builtin = builtin.name(), "running builtin");
            let status = builtin.execute(&argv[1..], io::stdout().lock(), io::stderr());
            if let ShellStatus::Exit(code) = status {
                // `exit` does not come back; the redirection goes with the
                // process.
                let _ = io::stdout().flush();
                process::exit(code);
            }
            let _ = io::stdout().flush();
            drop(redirection);
            return Ok(());
        }

        let launch = Launch::new(&argv, &self.config.search_path)?;
        let (pid, outcome) = self
            .context
            .run(&mut self.jobs, &launch, mode, redirection, &command)?;
        if self.is_interactive() {
            match (mode, outcome) {
                (Mode::Background, _) => eprintln!("[{pid}]"),
                (_, Some(outcome @ WaitOutcome::Stopped(_))) => {
                    eprintln!("\n[{pid}] {outcome}\t{command}")
                }
                _ => {}
            }
        }
        Ok(())
    }
}
