//! In-memory directory tree fed to the archive encoder
//!
//! Directories live in an arena and are addressed by their index, the root always being
//! [`ArchiveTree::ROOT`]. The encoder never looks at insertion order directly: it walks the tree
//! breadth-first through [`ArchiveTree::discovery_order`], which is what every offset and identifier
//! in the archive is derived from.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::{Error, FileNotFoundError, Result};

/// Where the content of an archived file comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file on disk, with the length it had when it was discovered
    Path { path: PathBuf, len: u64 },

    /// An in-memory buffer
    Memory(Vec<u8>),
}

impl FileSource {
    /// Reference a file on disk, recording its current length
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let len = std::fs::metadata(&path)?.len();
        Ok(FileSource::Path { path, len })
    }

    pub fn len(&self) -> u64 {
        match self {
            FileSource::Path { len, .. } => *len,
            FileSource::Memory(data) => data.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open the content for reading
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(match self {
            FileSource::Path { path, .. } => Box::new(BufReader::new(File::open(path)?)),
            FileSource::Memory(data) => Box::new(Cursor::new(data.as_slice())),
        })
    }

    /// Path used when reporting errors about this source
    pub fn display_path(&self) -> PathBuf {
        match self {
            FileSource::Path { path, .. } => path.clone(),
            FileSource::Memory(_) => PathBuf::from("<memory>"),
        }
    }
}

/// A file stored in a directory of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name of the file inside its directory
    pub name: String,

    /// Content of the file
    pub source: FileSource,
}

impl FileEntry {
    pub fn len(&self) -> u64 {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// A directory of the tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Name of the directory, `None` for the root
    pub name: Option<String>,

    /// Index of the parent directory, `None` for the root
    pub parent: Option<usize>,

    /// Files stored directly in this directory
    pub files: Vec<FileEntry>,

    /// Indices of the child directories, in insertion order
    pub children: Vec<usize>,
}

/// Directory tree to be written into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTree {
    nodes: Vec<DirectoryNode>,
}

impl Default for ArchiveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveTree {
    /// Index of the root directory
    pub const ROOT: usize = 0;

    /// Create a tree holding only an empty root directory
    pub fn new() -> Self {
        Self {
            nodes: vec![DirectoryNode::default()],
        }
    }

    /// Build a tree from a directory on disk
    ///
    /// Directories are visited breadth-first. Each directory's entries are recorded in the order the
    /// filesystem lists them unless `sorted` is set, in which case they are sorted by name.
    ///
    /// Symbolic links are followed. A directory linking back to one of its ancestors is an error.
    #[instrument(skip(root), fields(root = %root.as_ref().display()), err)]
    pub fn discover(root: impl AsRef<Path>, sorted: bool) -> Result<Self> {
        let root = root.as_ref();
        let mut tree = ArchiveTree::new();
        let mut queue = VecDeque::from([(root.to_path_buf(), Self::ROOT)]);
        // resolved location of every directory, indexed like the tree
        let mut resolved = vec![root.canonicalize().unwrap_or_else(|_| root.to_path_buf())];

        while let Some((path, index)) = queue.pop_front() {
            let mut walker = WalkDir::new(&path)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true);
            if sorted {
                walker = walker.sort_by_file_name();
            }

            for entry in walker {
                let entry = entry?;
                let name = entry
                    .file_name()
                    .to_str()
                    .ok_or_else(|| Error::NonUtf8Name(entry.path().to_path_buf()))?
                    .to_owned();

                if entry.file_type().is_dir() {
                    let target = entry.path().canonicalize()?;
                    if let Some(ancestor) = tree.find_ancestor(index, |a| resolved[a] == target) {
                        return Err(Error::FilesystemLoop {
                            path: entry.into_path(),
                            ancestor: resolved[ancestor].clone(),
                        });
                    }

                    let child = tree.add_directory(index, name)?;
                    resolved.push(target);
                    queue.push_back((entry.into_path(), child));
                } else {
                    let len = entry.metadata()?.len();
                    tree.add_file(
                        index,
                        name,
                        FileSource::Path {
                            path: entry.into_path(),
                            len,
                        },
                    )?;
                }
            }
        }

        debug!(
            directories = tree.directory_count(),
            files = tree.file_count(),
            "discovered tree"
        );

        Ok(tree)
    }

    /// Add an empty directory under `parent`, returning its index
    pub fn add_directory(&mut self, parent: usize, name: impl Into<String>) -> Result<usize> {
        let index = self.nodes.len();
        self.node_mut(parent)?.children.push(index);
        self.nodes.push(DirectoryNode {
            name: Some(name.into()),
            parent: Some(parent),
            ..Default::default()
        });
        Ok(index)
    }

    /// Add a file to the directory at `directory`
    pub fn add_file(
        &mut self,
        directory: usize,
        name: impl Into<String>,
        source: FileSource,
    ) -> Result<()> {
        self.node_mut(directory)?.files.push(FileEntry {
            name: name.into(),
            source,
        });
        Ok(())
    }

    /// Get a directory by its index
    pub fn directory(&self, index: usize) -> Option<&DirectoryNode> {
        self.nodes.get(index)
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn file_count(&self) -> usize {
        self.nodes.iter().map(|node| node.files.len()).sum()
    }

    /// Indices of every directory in breadth-first order, children in insertion order
    pub fn discovery_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([Self::ROOT]);
        while let Some(index) = queue.pop_front() {
            order.push(index);
            queue.extend(self.nodes[index].children.iter().copied());
        }
        order
    }

    /// Every directory in discovery order
    pub fn directories(&self) -> Vec<&DirectoryNode> {
        self.discovery_order()
            .into_iter()
            .map(|index| &self.nodes[index])
            .collect()
    }

    /// Every file, directory by directory in discovery order
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.directories()
            .into_iter()
            .flat_map(|directory| directory.files.iter())
    }

    /// First of `index` and its ancestors, walking towards the root, that satisfies `predicate`
    fn find_ancestor(&self, index: usize, predicate: impl Fn(usize) -> bool) -> Option<usize> {
        let mut current = Some(index);
        while let Some(candidate) = current {
            if predicate(candidate) {
                return Some(candidate);
            }
            current = self.nodes.get(candidate).and_then(|node| node.parent);
        }
        None
    }

    fn node_mut(&mut self, index: usize) -> Result<&mut DirectoryNode> {
        self.nodes
            .get_mut(index)
            .ok_or(Error::FileNotFound(FileNotFoundError::Directory(index)))
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::error::{Error, Result};
    use crate::tree::{ArchiveTree, FileSource};

    #[test]
    fn discovery_order_is_breadth_first() -> Result<()> {
        let mut tree = ArchiveTree::new();
        let a = tree.add_directory(ArchiveTree::ROOT, "a")?;
        let a1 = tree.add_directory(a, "a1")?;
        let b = tree.add_directory(ArchiveTree::ROOT, "b")?;
        let b1 = tree.add_directory(b, "b1")?;

        assert_eq!(tree.discovery_order(), vec![ArchiveTree::ROOT, a, b, a1, b1]);

        let names = tree
            .directories()
            .iter()
            .map(|d| d.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                None,
                Some("a".to_string()),
                Some("b".to_string()),
                Some("a1".to_string()),
                Some("b1".to_string())
            ]
        );

        Ok(())
    }

    #[test]
    fn files_follow_discovery_order() -> Result<()> {
        let mut tree = ArchiveTree::new();
        let sub = tree.add_directory(ArchiveTree::ROOT, "sub")?;
        tree.add_file(sub, "b.bin", FileSource::Memory(vec![1, 2, 3]))?;
        tree.add_file(ArchiveTree::ROOT, "a.bin", FileSource::Memory(vec![0; 10]))?;

        let files = tree.files().map(|f| (f.name.as_str(), f.len())).collect::<Vec<_>>();
        assert_eq!(files, vec![("a.bin", 10), ("b.bin", 3)]);
        assert_eq!(tree.file_count(), 2);

        Ok(())
    }

    #[test]
    fn unknown_directory_is_rejected() {
        let mut tree = ArchiveTree::new();
        assert!(tree.add_directory(4, "nope").is_err());
        assert!(tree.add_file(1, "nope", FileSource::Memory(Vec::new())).is_err());
    }

    #[traced_test]
    #[test]
    fn discover_directory() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join("a.bin"), [0u8; 10])?;
        fs::create_dir_all(root.path().join("sub").join("deep"))?;
        fs::write(root.path().join("sub").join("b.bin"), [1u8; 3])?;
        fs::write(root.path().join("sub").join("deep").join("c.bin"), b"")?;

        let tree = ArchiveTree::discover(root.path(), true)?;
        assert_eq!(tree.directory_count(), 3);
        assert_eq!(tree.file_count(), 3);

        let directories = tree.directories();
        assert_eq!(directories[0].files[0].name, "a.bin");
        assert_eq!(directories[0].files[0].len(), 10);
        assert_eq!(directories[1].name.as_deref(), Some("sub"));
        assert_eq!(directories[1].files[0].name, "b.bin");
        assert_eq!(directories[2].name.as_deref(), Some("deep"));
        assert_eq!(directories[2].parent, Some(1));
        assert!(directories[2].files[0].is_empty());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn discover_link_to_ancestor() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("sub"))?;
        fs::write(root.path().join("sub").join("b.bin"), [1u8; 3])?;
        std::os::unix::fs::symlink(root.path(), root.path().join("sub").join("loop"))?;

        match ArchiveTree::discover(root.path(), true) {
            Err(Error::FilesystemLoop { path, .. }) => {
                assert_eq!(path, root.path().join("sub").join("loop"));
            }
            other => panic!("expected a loop, got {other:?}"),
        }

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn discover_link_to_sibling() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("a"))?;
        fs::write(root.path().join("a").join("x.bin"), [1u8; 3])?;
        std::os::unix::fs::symlink(root.path().join("a"), root.path().join("b"))?;

        let tree = ArchiveTree::discover(root.path(), true)?;
        assert_eq!(tree.directory_count(), 3);
        assert_eq!(tree.file_count(), 2);

        Ok(())
    }

    #[test]
    fn discover_sorted_entries() -> Result<()> {
        let root = tempfile::tempdir()?;
        for name in ["c.bin", "a.bin", "b.bin"] {
            fs::write(root.path().join(name), name)?;
        }

        let tree = ArchiveTree::discover(root.path(), true)?;
        let names = tree.files().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a.bin", "b.bin", "c.bin"]);

        Ok(())
    }
}
