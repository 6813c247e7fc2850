use futures::future::{BoxFuture, FutureExt};
use std::{
    io,
    path::{Path, PathBuf},
    process::ExitStatus,
    string::FromUtf8Error,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::AnswerConfig;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("could not start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("answer is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Something that can answer a programming question.
pub trait AnswerLookup: Send + Sync {
    fn lookup<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<String, LookupError>>;
}

/// Answers questions by running the `howdoi` command line tool.
///
/// Whether the tool talks plain `http` without verifying certificates is a
/// setting of each instance and is handed to the child process through
/// `HOWDOI_DISABLE_SSL`; the parent environment is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct HowdoiCommand {
    program: PathBuf,
    disable_ssl: bool,
}

impl HowdoiCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        HowdoiCommand {
            program: program.into(),
            disable_ssl: false,
        }
    }

    pub fn from_config(config: &AnswerConfig) -> Self {
        HowdoiCommand::new(&config.program).disable_ssl(config.disable_ssl)
    }

    pub fn disable_ssl(mut self, disable: bool) -> Self {
        self.disable_ssl = disable;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, question: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(question).kill_on_drop(true);
        if self.disable_ssl {
            cmd.env("HOWDOI_DISABLE_SSL", "1");
        } else {
            cmd.env_remove("HOWDOI_DISABLE_SSL");
        }
        cmd
    }
}

impl AnswerLookup for HowdoiCommand {
    fn lookup<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<String, LookupError>> {
        async move {
            let program = self.program.display().to_string();
            debug!(%program, "running lookup");
            let output = self
                .command(question)
                .output()
                .await
                .map_err(|source| LookupError::Spawn {
                    program: program.clone(),
                    source,
                })?;
            if !output.status.success() {
                return Err(LookupError::Failed {
                    program,
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                });
            }
            Ok(String::from_utf8(output.stdout)?.trim_end().to_owned())
        }
        .boxed()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answer_is_the_program_output() -> Result<(), LookupError> {
        let lookup = HowdoiCommand::new("echo");
        assert_eq!(lookup.lookup("sort a list in rust").await?, "sort a list in rust");
        Ok(())
    }

    #[tokio::test]
    async fn tls_setting_reaches_the_child() -> Result<(), LookupError> {
        let lookup = HowdoiCommand::new("printenv").disable_ssl(true);
        assert_eq!(lookup.lookup("HOWDOI_DISABLE_SSL").await?, "1");

        let lookup = HowdoiCommand::new("printenv");
        let err = lookup.lookup("HOWDOI_DISABLE_SSL").await.unwrap_err();
        assert!(matches!(err, LookupError::Failed { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn failing_program_is_an_error() {
        let err = HowdoiCommand::new("false").lookup("anything").await.unwrap_err();
        assert!(matches!(err, LookupError::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let lookup = HowdoiCommand::new("/nonexistent/howdoi");
        let err = lookup.lookup("anything").await.unwrap_err();
        assert!(matches!(err, LookupError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/howdoi"));
    }

    #[test]
    fn built_from_config() {
        let config = AnswerConfig::default();
        let lookup = HowdoiCommand::from_config(&config);
        assert_eq!(lookup.program(), Path::new("howdoi"));
        assert!(lookup.disable_ssl);
    }
}
