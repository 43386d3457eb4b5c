use clap::Args;
use itertools::Itertools;
use miette::{Context, IntoDiagnostic, Result};
use nds_narc::NarcArchive;
use owo_colors::OwoColorize;
use std::{fs::File, io::BufReader, path::PathBuf};

#[derive(Args)]
pub struct ListArgs {
    /// An input NARC file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;

        let base_name = self
            .file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(nds_narc::read::DEFAULT_BASE_NAME);
        let mut narc = NarcArchive::with_base_name(BufReader::new(f), base_name)?;

        let header = *narc.header();
        println!("{}", self.file.display().bold());
        println!("  magic: {}", String::from_utf8_lossy(&header.magic));
        println!("  byte order: {}", header.byte_order);
        println!("  version: {:#06x}", header.version);
        println!("  file size: {}", header.file_size);
        println!("  names stored: {}", narc.has_sub_tables());
        println!(
            "  files: {} ({} bytes of {} in the data section)",
            narc.len(),
            narc.files_size(),
            narc.data_size()
        );

        println!("{}", "directories".bold());
        for directory in narc.directories() {
            let parent = directory
                .parent_id
                .map(|id| format!("{:#06x}", id))
                .unwrap_or_else(|| "-".into());
            println!(
                "  {} {} {} ({} files from {})",
                format!("{:#06x}", directory.id).cyan(),
                parent.dimmed(),
                if directory.path.is_empty() {
                    "/"
                } else {
                    directory.path.as_str()
                },
                directory.file_count,
                directory.first_file,
            );
        }

        println!("{}", "files".bold());
        let entries = narc.allocation_table().entries().to_vec();
        let names = narc.file_names().map(str::to_owned).collect_vec();
        for (index, (entry, name)) in entries.iter().zip(names).enumerate() {
            let format = narc.format_of(index)?;
            println!(
                "  {:>5} {:#010x}..{:#010x} {:>8} {} {}",
                index,
                entry.start,
                entry.end,
                entry.len(),
                format.extension().yellow(),
                name
            );
        }

        Ok(())
    }
}
