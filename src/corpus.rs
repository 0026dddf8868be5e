use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::vec;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_GROUP_PREFIX: &str = "cits_";

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus directory {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("corpus path {} is not a directory", .0.display())]
    NotDirectory(PathBuf),

    #[error("corpus directory {} is not readable: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corpus directory {} is not traversable: {source}", .path.display())]
    NotTraversable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list corpus directory {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CorpusFile {
    path: PathBuf,
}

impl CorpusFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The level-3 entries found under one level-2 directory; the unit the
/// pipeline fans out and waits on.
#[derive(Debug, Clone)]
pub struct CorpusGroup {
    pub dir: PathBuf,
    pub files: Vec<CorpusFile>,
}

/// A validated corpus root laid out as `root/<any dir>/<prefix>*/<entries>`.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    group_prefix: String,
}

impl Corpus {
    /// Checks that `root` exists, is a directory, and can be listed and
    /// traversed. Nothing is walked yet.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|source| CorpusError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let metadata = match fs::metadata(&root) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CorpusError::Missing(root));
            }
            Err(source) => return Err(CorpusError::Unreadable { path: root, source }),
        };
        if !metadata.is_dir() {
            return Err(CorpusError::NotDirectory(root));
        }

        if let Err(source) = fs::read_dir(&root) {
            return Err(CorpusError::Unreadable { path: root, source });
        }
        // Resolving a path through the root needs search permission on it.
        if let Err(source) = fs::metadata(root.join(".")) {
            return Err(CorpusError::NotTraversable { path: root, source });
        }

        Ok(Self {
            root,
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
        })
    }

    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn group_prefix(&self) -> &str {
        &self.group_prefix
    }

    /// Lists the level-1 directories now and yields level-2 groups lazily,
    /// in lexicographic path order.
    pub fn groups(&self) -> Result<CorpusGroups<'_>, CorpusError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CorpusError::Listing {
            path: self.root.clone(),
            source,
        })?;

        let mut level1 = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CorpusError::Listing {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                level1.push(path);
            }
        }
        level1.sort();

        Ok(CorpusGroups {
            corpus: self,
            level1: level1.into_iter(),
            level2: Vec::new().into_iter(),
        })
    }

    pub fn files(&self) -> Result<impl Iterator<Item = CorpusFile> + '_, CorpusError> {
        Ok(self.groups()?.flat_map(|group| group.files))
    }
}

pub struct CorpusGroups<'a> {
    corpus: &'a Corpus,
    level1: vec::IntoIter<PathBuf>,
    level2: vec::IntoIter<PathBuf>,
}

impl Iterator for CorpusGroups<'_> {
    type Item = CorpusGroup;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(dir) = self.level2.next() {
                let files = list_sorted(&dir, |_| true)
                    .into_iter()
                    .map(|path| CorpusFile { path })
                    .collect();
                return Some(CorpusGroup { dir, files });
            }

            let parent = self.level1.next()?;
            let prefix = self.corpus.group_prefix.as_str();
            self.level2 = list_sorted(&parent, |path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with(prefix))
            })
            .into_iter();
        }
    }
}

/// Sorted entries of `dir` accepted by `keep`. Listing failures are logged
/// and the branch is treated as empty.
fn list_sorted(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to list directory; skipping branch");
            return Vec::new();
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if keep(&path) {
                    paths.push(path);
                }
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read directory entry");
            }
        }
    }

    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, "PMID- 1\n").expect("write file");
    }

    fn relative(corpus: &Corpus, file: &CorpusFile) -> String {
        file.path()
            .strip_prefix(corpus.root())
            .expect("file under root")
            .display()
            .to_string()
    }

    #[test]
    fn walks_three_levels_in_lexicographic_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("b/cits_2/z.txt"));
        touch(&root.join("b/cits_2/a.txt"));
        touch(&root.join("a/cits_9/m.txt"));
        touch(&root.join("a/cits_1/x.txt"));
        touch(&root.join("a/other/ignored.txt"));
        touch(&root.join("loose.txt"));
        fs::create_dir_all(root.join("c/plain")).expect("mkdir");

        let corpus = Corpus::open(root).expect("corpus opens");
        let files: Vec<String> = corpus
            .files()
            .expect("walk")
            .map(|file| relative(&corpus, &file))
            .collect();

        assert_eq!(
            files,
            vec![
                "a/cits_1/x.txt",
                "a/cits_9/m.txt",
                "b/cits_2/a.txt",
                "b/cits_2/z.txt"
            ]
        );
    }

    #[test]
    fn level_three_entries_are_not_filtered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("x/cits_a/file.txt"));
        fs::create_dir_all(root.join("x/cits_a/nested")).expect("mkdir");

        let corpus = Corpus::open(root).expect("corpus opens");
        let groups: Vec<CorpusGroup> = corpus.groups().expect("walk").collect();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn groups_follow_level_two_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("2001/cits_a/1.txt"));
        touch(&root.join("2001/cits_a/2.txt"));
        touch(&root.join("2001/cits_b/3.txt"));
        fs::create_dir_all(root.join("2002/cits_empty")).expect("mkdir");

        let corpus = Corpus::open(root).expect("corpus opens");
        let sizes: Vec<usize> = corpus
            .groups()
            .expect("walk")
            .map(|group| group.files.len())
            .collect();

        assert_eq!(sizes, vec![2, 1, 0]);
    }

    #[test]
    fn custom_group_prefix_is_honoured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("set/batch_1/a.txt"));
        touch(&root.join("set/cits_1/b.txt"));

        let corpus = Corpus::open(root)
            .expect("corpus opens")
            .with_group_prefix("batch_");
        let files: Vec<String> = corpus
            .files()
            .expect("walk")
            .map(|file| relative(&corpus, &file))
            .collect();

        assert_eq!(files, vec!["set/batch_1/a.txt"]);
    }

    #[test]
    fn missing_root_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Corpus::open(dir.path().join("absent")).expect_err("missing root");
        assert!(matches!(err, CorpusError::Missing(_)));
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("file.txt");
        touch(&file);

        let err = Corpus::open(&file).expect_err("file root");
        assert!(matches!(err, CorpusError::NotDirectory(_)));
    }

    #[test]
    fn vanished_group_directory_is_walked_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("a/cits_1/x.txt"));
        touch(&root.join("a/cits_2/y.txt"));

        let corpus = Corpus::open(root).expect("corpus opens");
        let mut groups = corpus.groups().expect("walk");
        let first = groups.next().expect("first group");
        assert_eq!(first.files.len(), 1);

        fs::remove_dir_all(root.join("a/cits_2")).expect("remove second group");

        let second = groups.next().expect("listed group is still yielded");
        assert!(second.dir.ends_with("a/cits_2"));
        assert!(second.files.is_empty());
        assert!(groups.next().is_none());
    }

    #[cfg(unix)]
    fn with_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_root_is_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("corpus");
        fs::create_dir(&root).expect("mkdir");
        with_mode(&root, 0o300);

        // Privileged users bypass directory permissions.
        if fs::read_dir(&root).is_ok() {
            with_mode(&root, 0o755);
            return;
        }

        let result = Corpus::open(&root);
        with_mode(&root, 0o755);
        assert!(matches!(result, Err(CorpusError::Unreadable { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn unsearchable_root_is_not_traversable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("corpus");
        fs::create_dir(&root).expect("mkdir");
        with_mode(&root, 0o600);

        if fs::metadata(root.join(".")).is_ok() {
            with_mode(&root, 0o755);
            return;
        }

        let result = Corpus::open(&root);
        with_mode(&root, 0o755);
        assert!(matches!(result, Err(CorpusError::NotTraversable { .. })));
    }

    #[test]
    fn corpus_root_is_absolute() {
        let dir = tempfile::tempdir().expect("tempdir");
        let corpus = Corpus::open(dir.path()).expect("corpus opens");
        assert!(corpus.root().is_absolute());
        assert_eq!(corpus.files().expect("walk").count(), 0);
    }
}
