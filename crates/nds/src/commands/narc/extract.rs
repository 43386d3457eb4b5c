use clap::Args;
use miette::{miette, Context, Result};
use nds_narc::{
    archive::{extract_archive, extraction_directory},
    Outcome,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input NARC file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory, defaults to the file path without its extension
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Allow replacing the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let directory = match &self.directory {
            Some(directory) => directory.clone(),
            None => extraction_directory(&self.file)?,
        };
        info!("extracting {}", directory.display());

        let outcome = extract_archive(&self.file, &directory, |_| self.overwrite)
            .context(format!("extracting {}", self.file.display()))?;

        if let Outcome::Declined { path } = &outcome {
            return Err(miette!(
                "{} already exists, pass --overwrite to replace it",
                path.display()
            ));
        }

        for notification in outcome.notifications() {
            info!(?notification);
        }

        Ok(())
    }
}
