use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ParseArgs;
use crate::corpus::Corpus;
use crate::medline::{Record, RecordParser, RecordPool};

pub fn run(args: ParseArgs) -> Result<()> {
    let mut parser = RecordParser::new(Arc::new(RecordPool::new(16)))?;
    if args.keep_ignored {
        parser = parser.with_ignored_tags(Vec::<String>::new());
    }

    let files = input_files(&args.path, &args.group_prefix)?;
    let mut output = io::BufWriter::new(io::stdout().lock());

    let mut count = 0;
    for file in &files {
        count += write_records(&parser, file, args.json, &mut output)?;
    }
    output.flush()?;

    info!(
        path = %args.path.display(),
        files = files.len(),
        records = count,
        "parse completed"
    );
    Ok(())
}

/// A single file as given, or every file of a corpus root in walk order.
fn input_files(path: &Path, group_prefix: &str) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let corpus = Corpus::open(path)
        .with_context(|| format!("{} is not a usable corpus root", path.display()))?
        .with_group_prefix(group_prefix);
    Ok(corpus
        .files()?
        .map(|file| file.path().to_path_buf())
        .collect())
}

/// Streams every record of `path` to `output`. Records printed before a
/// parse failure stay printed.
fn write_records<W: Write>(
    parser: &RecordParser,
    path: &Path,
    json: bool,
    output: &mut W,
) -> Result<usize> {
    let file = parser.open(path)?;
    let mut count = 0;

    for record in file {
        let record =
            record.with_context(|| format!("failed to parse {}", path.display()))?;
        if json {
            serde_json::to_writer(&mut *output, &record)
                .context("failed to serialize record json")?;
            writeln!(output)?;
        } else {
            write_text_record(output, &record)?;
        }
        count += 1;
    }

    Ok(count)
}

fn write_text_record<W: Write>(output: &mut W, record: &Record) -> Result<()> {
    for field in record.fields() {
        writeln!(output, "{:<4}- {}", field.tag, field.value)?;
    }
    writeln!(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn parser() -> RecordParser {
        RecordParser::new(Arc::new(RecordPool::new(4))).expect("parser")
    }

    #[test]
    fn text_output_uses_medline_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("one.txt");
        fs::write(&path, "PMID- 1\nTI  - Short\n      title\n\nPMID- 2\n").expect("write");

        let mut out = Vec::new();
        let count = write_records(&parser(), &path, false, &mut out).expect("parse");

        assert_eq!(count, 2);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "PMID- 1\nTI  - Short title\n\nPMID- 2\n\n"
        );
    }

    #[test]
    fn json_output_is_one_line_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("one.txt");
        fs::write(&path, "PMID- 9\nMH  - Humans\n").expect("write");

        let mut out = Vec::new();
        write_records(&parser(), &path, true, &mut out).expect("parse");

        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "[[\"PMID\",\"9\"],[\"MH\",\"Humans\"]]\n"
        );
    }

    #[test]
    fn ignored_tags_can_be_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("one.txt");
        fs::write(&path, "PMID- 4\nOWN - NLM\n").expect("write");

        let mut out = Vec::new();
        write_records(&parser(), &path, false, &mut out).expect("parse");
        assert_eq!(String::from_utf8(out).expect("utf8"), "PMID- 4\n\n");

        let keeping = parser().with_ignored_tags(Vec::<String>::new());
        let mut out = Vec::new();
        write_records(&keeping, &path, false, &mut out).expect("parse");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "PMID- 4\nOWN - NLM\n\n"
        );
    }

    #[test]
    fn directory_input_is_walked_as_a_corpus() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        for relative in ["b/cits_1/z.txt", "a/cits_2/y.txt", "a/cits_1/x.txt", "a/misc/w.txt"] {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, "PMID- 1\n").expect("write");
        }

        let names: Vec<String> = input_files(root, "cits_")
            .expect("walk")
            .iter()
            .map(|path| {
                path.strip_prefix(root)
                    .expect("under root")
                    .display()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a/cits_1/x.txt", "a/cits_2/y.txt", "b/cits_1/z.txt"]);

        let single = root.join("a/misc/w.txt");
        assert_eq!(input_files(&single, "cits_").expect("file"), vec![single]);
    }

    #[test]
    fn malformed_file_keeps_earlier_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.txt");
        fs::write(&path, "PMID- 1\n\n  stray\n").expect("write");

        let mut out = Vec::new();
        let err = write_records(&parser(), &path, false, &mut out).expect_err("malformed");

        assert!(format!("{err:#}").contains("line 3"));
        assert_eq!(String::from_utf8(out).expect("utf8"), "PMID- 1\n\n");
    }
}
