use clap::{Args, ValueEnum};
use itertools::Itertools;
use miette::{miette, Context, IntoDiagnostic, Result};
use nds_narc::{FileFormat, NarcArchive};
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::{
    cmp::Ordering,
    collections::HashSet,
    fmt::Display,
    fs::File,
    io::{BufReader, Cursor, Read, Seek},
    path::PathBuf,
};

/// Bytes shown per line when comparing file contents
const HEX_LINE_WIDTH: usize = 16;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    #[default]
    Symantic,
    Full,
}

#[derive(Debug, Eq, PartialEq)]
enum Change {
    Added(String, String),
    Removed(String, String),
    Comparison(String, String, String),
    Context(Vec<String>),
    Modified(String, String, Vec<Change>, Vec<Change>),
}

impl Change {
    fn modified(key: &str, name: &str) -> Change {
        Change::Modified(key.into(), name.into(), Vec::new(), Vec::new())
    }

    pub fn with_children(&mut self, children: Vec<Change>) -> Result<()> {
        match self {
            Change::Modified(_, _, vec, _) => {
                children.into_iter().for_each(|c| vec.push(c));
                vec.sort();
                Ok(())
            }
            _ => Err(miette!("tried to add children to an addition or removal")),
        }
    }

    pub fn with_related(&mut self, related: Vec<Change>) -> Result<()> {
        match self {
            Change::Modified(_, _, _, vec) => {
                related.into_iter().for_each(|c| vec.push(c));
                vec.sort();
                Ok(())
            }
            _ => Err(miette!("tried to add related to an addition or removal")),
        }
    }
}

impl Ord for Change {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Change {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Change::Added(key, value), Change::Added(other_key, other_value))
            | (Change::Removed(key, value), Change::Removed(other_key, other_value)) => {
                Some(key.cmp(other_key).then_with(|| value.cmp(other_value)))
            }
            (Change::Comparison(key, _, _), Change::Comparison(other_key, _, _)) => {
                Some(key.cmp(other_key))
            }
            (
                Change::Modified(key, value, children, _),
                Change::Modified(other_key, other_value, other_children, _),
            ) => key.partial_cmp(other_key).and_then(|ord| {
                value
                    .partial_cmp(other_value)
                    .map(|ord_val| ord.then(ord_val))
                    .and_then(|ord| {
                        children
                            .partial_cmp(other_children)
                            .map(|ord_children| ord.then(ord_children))
                    })
            }),
            _ => None,
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Added(_, v) => {
                writeln!(f, "✅ {}", v.green())
            }
            Change::Removed(_, v) => {
                writeln!(f, "❌ {}", v.red())
            }
            Change::Comparison(key, old, new) => {
                writeln!(f, "* {}: {} vs {}", key, old.red(), new.green())
            }
            Change::Context(values) => {
                writeln!(f, "{}", values.iter().map(|l| format!(" {}", l)).join("\n"))
            }
            Change::Modified(_, v, children, related) => {
                let mut txt_final = related.iter().map(|c| format!("{}", c)).join("");

                let mut section = String::new();
                let mut current_key = String::new();
                for c in children {
                    let key = match c {
                        Change::Added(key, _) => format!("* {} added:\n", key),
                        Change::Removed(key, _) => format!("* {} removed:\n", key),
                        Change::Modified(key, _, _, _) => format!("* {} modified:\n", key),
                        _ => current_key.clone(),
                    };

                    if current_key != key {
                        if !section.is_empty() {
                            txt_final.push_str(
                                &section.split('\n').map(|l| "  ".to_string() + l).join("\n"),
                            );
                            txt_final.push('\n');
                        }
                        section.clear();

                        txt_final.push_str(&key);
                        current_key = key
                    }

                    section.push_str(&format!("{}\n", c));
                }

                txt_final.push_str(&section.split('\n').map(|l| "  ".to_string() + l).join("\n"));

                writeln!(f, "🔃 {}", v.blue())?;
                writeln!(
                    f,
                    "{}",
                    txt_final
                        .split('\n')
                        .filter(|l| l.trim().len() > 1)
                        .map(|l| "  ".to_string() + l)
                        .join("\n")
                )
            }
        }
    }
}

/// One line per [`HEX_LINE_WIDTH`] bytes: offset then bytes
fn hex_lines(data: &[u8]) -> String {
    data.chunks(HEX_LINE_WIDTH)
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "{:08x}: {}\n",
                i * HEX_LINE_WIDTH,
                chunk.iter().map(|b| format!("{:02x}", b)).join(" ")
            )
        })
        .collect()
}

fn sniff(data: &[u8]) -> FileFormat {
    data.get(..4).map_or(FileFormat::Unknown, FileFormat::from_magic)
}

#[derive(Args)]
pub struct DiffArgs {
    /// An input NARC file
    #[arg(short, long, value_name = "FILE")]
    left: PathBuf,

    /// An input NARC file
    #[arg(short, long, value_name = "FILE")]
    right: PathBuf,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t=Mode::Symantic)]
    mode: Mode,
}

impl DiffArgs {
    fn handle_content(&self, left: &[u8], right: &[u8]) -> Vec<String> {
        let old = hex_lines(left);
        let new = hex_lines(right);

        let diff = TextDiff::from_lines(&old, &new);
        let mut comparison = Vec::new();
        for op in diff.ops() {
            for change in diff.iter_inline_changes(op) {
                if change.tag() == ChangeTag::Equal {
                    continue;
                }

                let mut context = String::new();
                for (emphasized, value) in change.iter_strings_lossy() {
                    let value = value.trim_end_matches('\n');
                    if emphasized {
                        if change.tag() == ChangeTag::Insert {
                            context.push_str(&format!("{}", value.green().underline()));
                        } else {
                            context.push_str(&format!("{}", value.red().underline()));
                        }
                    } else {
                        context.push_str(&format!("{}", value.dimmed()));
                    }
                }
                comparison.push(context);
            }
        }
        comparison
    }

    fn handle_file(&self, name: &str, left: &[u8], right: &[u8]) -> Result<Option<Change>> {
        if left == right {
            return Ok(None);
        }

        let mut result = Change::modified("files", name);

        if left.len() != right.len() {
            result.with_related(vec![Change::Comparison(
                "size".into(),
                left.len().to_string(),
                right.len().to_string(),
            )])?;
        }

        let format = (sniff(left), sniff(right));
        if format.0 != format.1 {
            result.with_related(vec![Change::Comparison(
                "format".into(),
                format.0.extension().into(),
                format.1.extension().into(),
            )])?;
        }

        if format == (FileFormat::Archive, FileFormat::Archive) {
            let mut nested_left = NarcArchive::new(Cursor::new(left))
                .context(format!("reading nested archive {} on the left", name))?;
            let mut nested_right = NarcArchive::new(Cursor::new(right))
                .context(format!("reading nested archive {} on the right", name))?;
            if let Some(nested) = self.handle_narc(name, &mut nested_left, &mut nested_right)? {
                result.with_children(vec![nested])?;
            }
        } else if self.mode == Mode::Full {
            result.with_related(vec![Change::Context(self.handle_content(left, right))])?;
        }

        Ok(Some(result))
    }

    fn handle_narc<L: Read + Seek, R: Read + Seek>(
        &self,
        name: &str,
        left: &mut NarcArchive<L>,
        right: &mut NarcArchive<R>,
    ) -> Result<Option<Change>> {
        let mut result: Option<Change> = None;

        if left.len() != right.len() {
            result
                .get_or_insert_with(|| Change::modified("narc", name))
                .with_related(vec![Change::Comparison(
                    "entries".into(),
                    left.len().to_string(),
                    right.len().to_string(),
                )])?;
        }

        if self.mode == Mode::Full {
            let comparisons = [
                (
                    "byte order",
                    left.byte_order().to_string(),
                    right.byte_order().to_string(),
                ),
                (
                    "names stored",
                    left.has_sub_tables().to_string(),
                    right.has_sub_tables().to_string(),
                ),
                (
                    "directories",
                    left.directories().len().to_string(),
                    right.directories().len().to_string(),
                ),
                (
                    "file size",
                    left.header().file_size.to_string(),
                    right.header().file_size.to_string(),
                ),
                (
                    "data size",
                    left.data_size().to_string(),
                    right.data_size().to_string(),
                ),
            ];

            for (key, old, new) in comparisons {
                if old != new {
                    result
                        .get_or_insert_with(|| Change::modified("narc", name))
                        .with_related(vec![Change::Comparison(key.into(), old, new)])?;
                }
            }
        }

        let left_names = left
            .file_names()
            .map(|s| s.to_owned())
            .collect::<HashSet<_>>();
        let right_names = right
            .file_names()
            .map(|s| s.to_owned())
            .collect::<HashSet<_>>();

        let mut all_names = left_names.union(&right_names).collect::<Vec<_>>();
        all_names.sort();

        let files_added: Vec<Change> = all_names
            .iter()
            .copied()
            .filter(|f| right_names.contains(f.as_str()) && !left_names.contains(f.as_str()))
            .map(|k| Change::Added("files".into(), k.to_string()))
            .collect();

        if !files_added.is_empty() {
            result
                .get_or_insert_with(|| Change::modified("narc", name))
                .with_children(files_added)?;
        }

        let files_removed: Vec<Change> = all_names
            .iter()
            .copied()
            .filter(|f| !right_names.contains(f.as_str()) && left_names.contains(f.as_str()))
            .map(|k| Change::Removed("files".into(), k.to_string()))
            .collect();

        if !files_removed.is_empty() {
            result
                .get_or_insert_with(|| Change::modified("narc", name))
                .with_children(files_removed)?;
        }

        let files_shared = all_names
            .iter()
            .copied()
            .filter(|f| right_names.contains(f.as_str()) && left_names.contains(f.as_str()));

        for file in files_shared {
            let mut data_left = Vec::new();
            left.by_name(file)?
                .read_to_end(&mut data_left)
                .into_diagnostic()?;

            let mut data_right = Vec::new();
            right
                .by_name(file)?
                .read_to_end(&mut data_right)
                .into_diagnostic()?;

            if let Some(c) = self.handle_file(file, &data_left, &data_right)? {
                result
                    .get_or_insert_with(|| Change::modified("narc", name))
                    .with_children(vec![c])?;
            }
        }

        Ok(result)
    }

    pub fn handle(&self) -> Result<()> {
        let l = File::open(&self.left)
            .into_diagnostic()
            .context(format!("path: {}", &self.left.display()))?;

        let mut left = NarcArchive::new(BufReader::new(l))?;

        let r = File::open(&self.right)
            .into_diagnostic()
            .context(format!("path: {}", &self.right.display()))?;

        let mut right = NarcArchive::new(BufReader::new(r))?;

        let difference = self.handle_narc(&self.left.to_string_lossy(), &mut left, &mut right)?;

        if let Some(d) = difference {
            println!("{}", d);
        }

        Ok(())
    }
}
