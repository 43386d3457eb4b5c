pub mod narc;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle NARC files
    Narc {
        #[command(subcommand)]
        command: narc::NarcCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Narc { command } => command.handle(),
        }
    }
}
