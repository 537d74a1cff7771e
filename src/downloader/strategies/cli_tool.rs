use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use tokio::process::Command;
use crate::config::AudioFormat;
use crate::downloader::{DownloadTool, ToolOutput};
use crate::errors::{AppError, Result};

/// Argument template placeholders, substituted per invocation.
pub const QUERY_PLACEHOLDER: &str = "{query}";
pub const FORMAT_PLACEHOLDER: &str = "{format}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// How long `<program> --version` may take before the tool counts as unreachable.
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// spotdl invocation: `spotdl download <query> --output-format <fmt> --output <dir>`.
pub fn default_args() -> Vec<String> {
    ["download", QUERY_PLACEHOLDER, "--output-format", FORMAT_PLACEHOLDER, "--output", OUTPUT_PLACEHOLDER]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Runs an external download executable once per attempt.
pub struct CliTool {
    name: String,
    program: String,
    args: Vec<String>,
    check_timeout: Duration,
}

impl CliTool {
    pub fn new(program: &str) -> Self {
        Self {
            name: format!("cli:{}", program),
            program: program.to_string(),
            args: default_args(),
            check_timeout: AVAILABILITY_TIMEOUT,
        }
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        if !args.is_empty() {
            self.args = args;
        }
        self
    }

    fn build_args(&self, query: &str, format: AudioFormat, output_dir: &Path) -> Vec<String> {
        let output_dir = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(QUERY_PLACEHOLDER, query)
                    .replace(FORMAT_PLACEHOLDER, format.extension())
                    .replace(OUTPUT_PLACEHOLDER, &output_dir)
            })
            .collect()
    }

    fn spawn_error(&self, error: std::io::Error) -> AppError {
        if error.kind() == std::io::ErrorKind::NotFound {
            AppError::ToolUnavailable(format!("'{}' tool not found. Install it or set tool_path.", self.program))
        } else {
            AppError::ToolUnavailable(format!("'{}' could not be started: {}", self.program, error))
        }
    }
}

#[async_trait]
impl DownloadTool for CliTool {
    async fn check_available(&self) -> Result<()> {
        // Any process that starts counts; some tools exit non-zero on --version.
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.check_timeout, status).await {
            Ok(result) => result.map(|_| ()).map_err(|e| self.spawn_error(e)),
            Err(_) => Err(AppError::ToolUnavailable(format!(
                "'{}' did not answer --version within {}s",
                self.program,
                self.check_timeout.as_secs_f64()
            ))),
        }
    }

    async fn fetch(&self, query: &str, format: AudioFormat, output_dir: &Path) -> Result<ToolOutput> {
        let args = self.build_args(query, format, output_dir);
        log::debug!("Running {} {:?}", self.program, args);

        // kill_on_drop: the attempt timeout drops this future and must not
        // leave the child running.
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(ToolOutput::ok(text))
        } else {
            log::debug!("{} exited with {}", self.program, output.status);
            Ok(ToolOutput::failed(text))
        }
    }

    fn get_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_args_follow_spotdl_layout() {
        let tool = CliTool::new("spotdl");
        let args = tool.build_args("Song - Artist", AudioFormat::M4a, &PathBuf::from("downloads"));
        assert_eq!(args, vec!["download", "Song - Artist", "--output-format", "m4a", "--output", "downloads"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_unavailable() {
        let tool = CliTool::new("playlist-downloader-missing-tool-for-tests");
        assert!(matches!(tool.check_available().await, Err(AppError::ToolUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_output_combines_stdout_and_stderr() -> Result<()> {
        let tool = CliTool::new("sh").with_args(vec![
            "-c".to_string(),
            "echo \"$1 as $2\"; echo oops >&2; [ \"$2\" = mp3 ]".to_string(),
            "sh".to_string(),
            QUERY_PLACEHOLDER.to_string(),
            FORMAT_PLACEHOLDER.to_string(),
        ]);
        tool.check_available().await?;

        let flac = tool.fetch("A - X", AudioFormat::Flac, Path::new(".")).await?;
        assert!(!flac.success);
        assert_eq!(flac.output, "A - X as flac\noops\n");

        let mp3 = tool.fetch("A - X", AudioFormat::Mp3, Path::new(".")).await?;
        assert!(mp3.success);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_version_check_is_tool_unavailable() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("stuck-dl");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let tool = CliTool::new(&script.to_string_lossy()).with_check_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();

        assert!(matches!(tool.check_available().await, Err(AppError::ToolUnavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
        Ok(())
    }
}
