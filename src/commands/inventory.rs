use std::fs;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::config::{INVENTORY_MANIFEST_NAME, MANIFEST_DIR_NAME};
use crate::corpus::Corpus;
use crate::model::{InventoryFile, InventoryGroup, InventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let corpus = Corpus::open(&args.corpus_dir)
        .context("corpus directory failed validation")?
        .with_group_prefix(args.group_prefix.clone());
    let manifest = build_manifest(&corpus, args.hash)?;

    if args.dry_run {
        info!(
            groups = manifest.group_count,
            files = manifest.file_count,
            bytes = manifest.total_bytes,
            corpus = %manifest.corpus_dir,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.cache_root
            .join(MANIFEST_DIR_NAME)
            .join(INVENTORY_MANIFEST_NAME)
    });

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(
        groups = manifest.group_count,
        files = manifest.file_count,
        "inventory completed"
    );

    Ok(())
}

/// Walks the corpus in the same order ingestion would.
pub fn build_manifest(corpus: &Corpus, hash: bool) -> Result<InventoryManifest> {
    let mut groups = Vec::new();
    let mut file_count = 0;
    let mut total_bytes = 0;

    for group in corpus.groups()? {
        let mut files = Vec::with_capacity(group.files.len());
        for file in &group.files {
            let path = file.path();
            let metadata = match fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to stat corpus file");
                    continue;
                }
            };
            if !metadata.is_file() {
                warn!(path = %path.display(), "corpus entry is not a regular file");
            }

            let sha256 = if hash && metadata.is_file() {
                Some(sha256_file(path)?)
            } else {
                None
            };

            total_bytes += metadata.len();
            files.push(InventoryFile {
                path: relative_display(corpus, path),
                size_bytes: metadata.len(),
                sha256,
            });
        }

        file_count += files.len();
        groups.push(InventoryGroup {
            dir: relative_display(corpus, &group.dir),
            file_count: files.len(),
            files,
        });
    }

    if file_count == 0 {
        bail!(
            "no corpus files found under {} with group prefix {:?}",
            corpus.root().display(),
            corpus.group_prefix()
        );
    }

    Ok(InventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        corpus_dir: corpus.root().display().to_string(),
        group_prefix: corpus.group_prefix().to_string(),
        group_count: groups.len(),
        file_count,
        total_bytes,
        groups,
    })
}

fn relative_display(corpus: &Corpus, path: &std::path::Path) -> String {
    path.strip_prefix(corpus.root())
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &std::path::Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn manifest_lists_groups_in_walk_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "2002/cits_b/1.txt", "PMID- 2\n");
        write(dir.path(), "2001/cits_a/2.txt", "PMID- 1\nTI  - x\n");
        write(dir.path(), "2001/cits_a/1.txt", "abc");
        write(dir.path(), "2001/misc/3.txt", "ignored");

        let corpus = Corpus::open(dir.path()).expect("corpus");
        let manifest = build_manifest(&corpus, true).expect("manifest");

        assert_eq!(manifest.group_count, 2);
        assert_eq!(manifest.file_count, 3);
        assert_eq!(manifest.groups[0].dir, "2001/cits_a");
        assert_eq!(manifest.groups[0].files[0].path, "2001/cits_a/1.txt");
        assert_eq!(manifest.groups[0].files[0].size_bytes, 3);
        assert_eq!(
            manifest.groups[0].files[0].sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(manifest.total_bytes, 3 + 16 + 8);
    }

    #[test]
    fn hashing_is_optional() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "a/cits_1/1.txt", "PMID- 1\n");

        let corpus = Corpus::open(dir.path()).expect("corpus");
        let manifest = build_manifest(&corpus, false).expect("manifest");
        assert!(manifest.groups[0].files[0].sha256.is_none());
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("a/cits_1")).expect("mkdir");

        let corpus = Corpus::open(dir.path()).expect("corpus");
        assert!(build_manifest(&corpus, false).is_err());
    }
}
