//! Shell completion generation for the webpub CLI.
//!
//! # Examples
//!
//! ```bash
//! # Bash (add to ~/.bashrc)
//! eval "$(webpub completions bash)"
//!
//! # Fish (save to completions directory)
//! webpub completions fish > ~/.config/fish/completions/webpub.fish
//! ```

use std::io;

use anyhow::Result;
use clap::{Args as ClapArgs, CommandFactory, ValueEnum};
use clap_complete::{Shell, generate};

use crate::Cli;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ShellType {
    /// Bourne Again SHell
    Bash,
    /// Z shell
    Zsh,
    /// Friendly Interactive SHell
    Fish,
    /// Elvish
    Elvish,
}

impl From<ShellType> for Shell {
    fn from(shell: ShellType) -> Self {
        match shell {
            ShellType::Bash => Shell::Bash,
            ShellType::Zsh => Shell::Zsh,
            ShellType::Fish => Shell::Fish,
            ShellType::Elvish => Shell::Elvish,
        }
    }
}

pub fn execute(args: &Args) -> Result<()> {
    let mut cmd = Cli::command();
    generate(Shell::from(args.shell), &mut cmd, "webpub", &mut io::stdout());
    Ok(())
}
