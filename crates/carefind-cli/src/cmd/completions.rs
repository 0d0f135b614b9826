use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `carefind completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write a completion script for `shell` to stdout.
///
/// # Errors
///
/// Never fails today; kept fallible to match the other handlers.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let name = command.get_name().to_owned();
    generate(shell, command, name, &mut std::io::stdout());
    Ok(())
}
