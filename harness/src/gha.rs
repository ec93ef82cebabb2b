//! GitHub Actions reporter.
//!
//! Workflow commands (`::add-mask::`, `::group::`) go to stdout, where the
//! runner intercepts them. Step outputs and PATH additions go through the
//! `GITHUB_OUTPUT` / `GITHUB_PATH` files when the runner provides them; local
//! runs degrade to tracing so nothing is silently dropped.

use migrate_core::Reporter;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct WorkflowReporter {
    output_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
}

impl WorkflowReporter {
    pub fn from_env() -> Self {
        Self {
            output_file: std::env::var_os("GITHUB_OUTPUT").map(PathBuf::from),
            path_file: std::env::var_os("GITHUB_PATH").map(PathBuf::from),
        }
    }

    fn append_line(file: &Path, line: &str) -> std::io::Result<()> {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)?;
        writeln!(f, "{line}")
    }
}

impl Reporter for WorkflowReporter {
    fn register_secret(&self, value: &str) {
        println!("::add-mask::{value}");
    }

    fn start_group(&self, title: &str) {
        println!("::group::{title}");
    }

    fn end_group(&self) {
        println!("::endgroup::");
    }

    fn set_output(&self, name: &str, value: &str) {
        match &self.output_file {
            Some(file) => {
                if let Err(err) = Self::append_line(file, &format!("{name}={value}")) {
                    tracing::warn!(
                        event = "harness.reporter.output_failed",
                        name,
                        error = %err,
                        "could not write step output"
                    );
                }
            }
            None => {
                tracing::info!(event = "harness.reporter.output", name, value, "step output");
            }
        }
    }

    fn add_path(&self, dir: &Path) {
        let Some(file) = &self.path_file else {
            return;
        };
        if let Err(err) = Self::append_line(file, &dir.display().to_string()) {
            tracing::warn!(
                event = "harness.reporter.add_path_failed",
                dir = %dir.display(),
                error = %err,
                "could not append to PATH file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_output_appends_to_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("github_output");
        let reporter = WorkflowReporter {
            output_file: Some(out.clone()),
            path_file: None,
        };

        reporter.set_output("results", "[]");
        reporter.set_output("results", "[1]");

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "results=[]\nresults=[1]\n");
    }

    #[test]
    fn add_path_appends_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path_file = tmp.path().join("github_path");
        let reporter = WorkflowReporter {
            output_file: None,
            path_file: Some(path_file.clone()),
        };

        reporter.add_path(Path::new("/opt/tool/bin"));
        let contents = std::fs::read_to_string(&path_file).unwrap();
        assert_eq!(contents, "/opt/tool/bin\n");
    }
}
