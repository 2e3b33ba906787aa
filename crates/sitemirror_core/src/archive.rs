use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub files: usize,
    pub directories: usize,
}

/// Zips `source` into `archive_path`. Entry names are relative to the parent
/// of `source`, so the archive unpacks into a single top-level directory.
pub fn create_archive(source: &Path, archive_path: &Path) -> Result<ArchiveReport> {
    if let Some(parent) = archive_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let base = source.parent().unwrap_or(Path::new(""));
    let file = File::create(archive_path)
        .with_context(|| format!("failed to create zip file {}", archive_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut report = ArchiveReport::default();

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to zip directory {}", source.display()))?;
        let path = entry.path();
        if path == archive_path {
            continue;
        }
        let relative = path.strip_prefix(base).with_context(|| {
            format!(
                "failed to derive archive name from {} for {}",
                base.display(),
                path.display()
            )
        })?;
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .with_context(|| format!("failed to add directory {name}"))?;
            report.directories += 1;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        writer
            .start_file(name.as_str(), options)
            .with_context(|| format!("failed to add {name}"))?;
        let mut input =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("failed to compress {}", path.display()))?;
        report.files += 1;
    }

    writer
        .finish()
        .with_context(|| format!("failed to finalize {}", archive_path.display()))?;
    tracing::info!(
        path = %archive_path.display(),
        files = report.files,
        directories = report.directories,
        "wrote archive"
    );
    Ok(report)
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn archive_contains_files_and_directory_entries() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("example.com");
        fs::create_dir_all(source.join("assets")).expect("mkdir");
        fs::write(source.join("index.html"), "<html></html>").expect("write index");
        fs::write(source.join("assets/app.js"), "console.log(1)").expect("write js");
        let archive_path = temp.path().join("dist/example.com.zip");

        let report = create_archive(&source, &archive_path).expect("archive");
        assert_eq!(report.files, 2);
        assert_eq!(report.directories, 2);

        let file = File::open(&archive_path).expect("open zip");
        let mut archive = zip::ZipArchive::new(file).expect("read zip");
        let mut names = archive.file_names().map(ToString::to_string).collect::<Vec<_>>();
        names.sort();
        assert_eq!(
            names,
            vec![
                "example.com/",
                "example.com/assets/",
                "example.com/assets/app.js",
                "example.com/index.html",
            ]
        );

        let mut content = String::new();
        archive
            .by_name("example.com/assets/app.js")
            .expect("entry")
            .read_to_string(&mut content)
            .expect("read entry");
        assert_eq!(content, "console.log(1)");
    }

    #[test]
    fn missing_source_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let error = create_archive(&temp.path().join("missing"), &temp.path().join("out.zip"))
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to zip directory"));
    }
}
