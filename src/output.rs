//! Turning finished jobs into Markdown files.

use crate::error::Pdf2MdError;
use crate::queue::{Job, JobStatus};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MARKDOWN_MIME: &str = "text/markdown";
pub const COMBINED_FILE_NAME: &str = "combined.md";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// A Markdown document ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownFile {
    pub name: String,
    pub content: String,
    pub mime: &'static str,
}

/// `report.pdf` → `report.md`; a name without extension gains `.md`.
pub fn markdown_file_name(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(dot) if dot > 0 => &filename[..dot],
        _ => filename,
    };
    format!("{stem}.md")
}

/// The download for one completed job.
pub fn job_download(job: &Job) -> Option<MarkdownFile> {
    if job.status() != JobStatus::Completed {
        return None;
    }
    Some(MarkdownFile {
        name: markdown_file_name(&job.filename),
        content: job.result()?.to_string(),
        mime: MARKDOWN_MIME,
    })
}

/// One file for all completed jobs: the job's own file when there is only
/// one, otherwise [`COMBINED_FILE_NAME`] with a `# filename` section per job.
pub fn combined_download(jobs: &[Job]) -> Option<MarkdownFile> {
    let completed: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.status() == JobStatus::Completed && j.result().is_some())
        .collect();

    match completed.as_slice() {
        [] => None,
        [only] => job_download(only),
        many => {
            let content = many
                .iter()
                .map(|j| format!("# {}\n\n{}", j.filename, j.result().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join(SECTION_SEPARATOR);
            Some(MarkdownFile {
                name: COMBINED_FILE_NAME.to_string(),
                content,
                mime: MARKDOWN_MIME,
            })
        }
    }
}

/// Write `file` into `dir` atomically; returns the final path.
pub fn write_markdown(dir: &Path, file: &MarkdownFile) -> Result<PathBuf, Pdf2MdError> {
    let path = dir.join(&file.name);
    let io_err = |source: std::io::Error| Pdf2MdError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(file.content.as_bytes()).map_err(io_err)?;
    tmp.persist(&path).map_err(|e| io_err(e.error))?;

    info!("Wrote {} ({} bytes)", path.display(), file.content.len());
    Ok(path)
}

/// Human-readable elapsed time: `850ms`, `12s`, `3m 5s`, `1h 2m 3s`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(markdown_file_name("report.pdf"), "report.md");
        assert_eq!(markdown_file_name("v1.2.final.PDF"), "v1.2.final.md");
        assert_eq!(markdown_file_name("README"), "README.md");
        assert_eq!(markdown_file_name(".hidden"), ".hidden.md");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(12_400), "12s");
        assert_eq!(format_duration(185_000), "3m 5s");
        assert_eq!(format_duration(3_723_000), "1h 2m 3s");
    }

    #[test]
    fn write_is_atomic_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let file = MarkdownFile {
            name: "a.md".into(),
            content: "# One".into(),
            mime: MARKDOWN_MIME,
        };
        let path = write_markdown(dir.path(), &file).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# One");

        let second = MarkdownFile {
            content: "# Two".into(),
            ..file
        };
        write_markdown(dir.path(), &second).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
