pub mod create;
pub mod diff;
pub mod extract;
pub mod list;

#[derive(clap::Subcommand)]
pub enum NarcCommands {
    /// Build a NARC file from a directory
    Create(create::CreateArgs),
    /// Compare two NARC files
    Diff(diff::DiffArgs),
    /// Extract a NARC file into a directory
    Extract(extract::ExtractArgs),
    /// Describe the content of a NARC file
    List(list::ListArgs),
}

impl NarcCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            NarcCommands::Create(create) => create.handle(),
            NarcCommands::Diff(diff) => diff.handle(),
            NarcCommands::Extract(extract) => extract.handle(),
            NarcCommands::List(list) => list.handle(),
        }
    }
}
