use clap::Args;
use miette::{miette, Context, Result};
use nds_narc::{
    archive::{archive_path_for, create_archive},
    ByteOrder, NarcWriterOptions, Outcome,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct CreateArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target NARC file, defaults to the directory path with `.narc` appended
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Store file and directory names
    #[arg(long, default_value_t = false)]
    sub_tables: bool,

    /// Write every field as big endian
    #[arg(long, default_value_t = false)]
    big_endian: bool,

    /// Order entries by name instead of the order the filesystem lists them in
    #[arg(long, default_value_t = false)]
    sorted: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl CreateArgs {
    pub fn handle(&self) -> Result<()> {
        if !self.directory.is_dir() {
            return Err(miette!("{} is not a directory", self.directory.display()));
        }

        let file = self
            .file
            .clone()
            .unwrap_or_else(|| archive_path_for(&self.directory));
        info!("creating {}", file.display());

        let options = NarcWriterOptions::builder()
            .sub_tables(self.sub_tables)
            .sort_entries(self.sorted)
            .byte_order(if self.big_endian {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            })
            .build();

        let outcome = create_archive(&self.directory, &file, options, |_| self.overwrite)
            .context(format!("packing {}", self.directory.display()))?;

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
