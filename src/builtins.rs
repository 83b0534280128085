use crate::ShellStatus;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

/// Enumeration of all supported builtin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Exit,
    Pwd,
    Cd,
}

/// Builtins in the order `?` lists them.
pub static REGISTRY: [(&str, Builtin, &str); 4] = [
    ("?", Builtin::Help, "show this help menu"),
    ("exit", Builtin::Exit, "exit the command shell"),
    ("pwd", Builtin::Pwd, "print working directory"),
    ("cd", Builtin::Cd, "change directory"),
];

impl FromStr for Builtin {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        REGISTRY
            .iter()
            .find(|(name, _, _)| *name == s)
            .map(|&(_, builtin, _)| builtin)
            .ok_or(())
    }
}

/// Finds the builtin named exactly `name`.
pub fn lookup(name: &str) -> Option<Builtin> {
    name.parse().ok()
}

impl Builtin {
    pub fn name(self) -> &'static str {
        self.entry().0
    }

    fn entry(self) -> &'static (&'static str, Builtin, &'static str) {
        match self {
            Builtin::Help => &REGISTRY[0],
            Builtin::Exit => &REGISTRY[1],
            Builtin::Pwd => &REGISTRY[2],
            Builtin::Cd => &REGISTRY[3],
        }
    }

    /// Executes the builtin command.
    ///
    /// Returns a `ShellStatus` indicating whether the shell should continue
    /// or exit with a specific code. Failures are reported on `stderr` and
    /// never end the shell.
    pub fn execute<W: Write, E: Write>(
        &self,
        args: &[String],
        mut stdout: W,
        mut stderr: E,
    ) -> ShellStatus {
        match self {
            Builtin::Help => {
                for (name, _, description) in REGISTRY.iter() {
                    let _ = writeln!(stdout, "{} - {}", name, description);
                }
                ShellStatus::Continue
            }
            Builtin::Exit => ShellStatus::Exit(0),
            Builtin::Pwd => {
                match std::env::current_dir() {
                    Ok(path) => {
                        let _ = writeln!(stdout, "{}", path.display());
                    }
                    Err(e) => {
                        let _ = writeln!(stderr, "pwd: error retrieving current directory: {}", e);
                    }
                }
                ShellStatus::Continue
            }
            Builtin::Cd => {
                let new_dir = match args.first().map(String::as_str) {
                    None | Some("~") => match std::env::var_os("HOME") {
                        Some(home) => PathBuf::from(home),
                        None => {
                            let _ = writeln!(stderr, "cd: HOME not set");
                            return ShellStatus::Continue;
                        }
                    },
                    Some(path) => PathBuf::from(path),
                };

                if let Err(e) = std::env::set_current_dir(&new_dir) {
                    let _ = writeln!(stderr, "cd: {}: {}", new_dir.display(), e);
                }
                ShellStatus::Continue
            }
        }
    }
}
