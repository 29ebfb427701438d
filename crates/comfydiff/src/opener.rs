use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use shared::config::CheckerConfig;
use tokio::process::Command;
use tracing::{debug, warn};

pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Hands paths to the desktop. Failures are logged and otherwise ignored.
pub trait Opener: Send + Sync {
    fn open_file<'a>(&'a self, path: &'a Path) -> OpenFuture<'a>;

    fn open_folder<'a>(&'a self, path: &'a Path) -> OpenFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct SystemOpener {
    editor: Vec<String>,
    file_browser: Vec<String>,
}

impl SystemOpener {
    pub fn from_config(config: &CheckerConfig) -> Self {
        Self {
            editor: command_or_default(config.editor_command.as_deref(), default_editor()),
            file_browser: command_or_default(
                config.file_browser_command.as_deref(),
                default_file_browser(),
            ),
        }
    }
}

impl Opener for SystemOpener {
    fn open_file<'a>(&'a self, path: &'a Path) -> OpenFuture<'a> {
        Box::pin(launch(&self.editor, path))
    }

    fn open_folder<'a>(&'a self, path: &'a Path) -> OpenFuture<'a> {
        Box::pin(launch(&self.file_browser, path))
    }
}

async fn launch(command: &[String], path: &Path) {
    let Some((program, args)) = command.split_first() else {
        warn!("no opener command configured");
        return;
    };

    // explorer.exe reports failure even when the window opens, so the exit status is only logged.
    match Command::new(program).args(args).arg(path).status().await {
        Ok(status) => debug!(%program, %status, path = %path.display(), "opener exited"),
        Err(err) => warn!(%program, path = %path.display(), "failed to launch opener: {err}"),
    }
}

fn command_or_default(configured: Option<&str>, default: &[&str]) -> Vec<String> {
    let parsed = configured
        .map(|raw| {
            raw.split_whitespace()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        default.iter().map(|part| (*part).to_string()).collect()
    } else {
        parsed
    }
}

fn default_editor() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["notepad"]
    } else if cfg!(target_os = "macos") {
        &["open", "-t"]
    } else {
        &["xdg-open"]
    }
}

fn default_file_browser() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["explorer"]
    } else if cfg!(target_os = "macos") {
        &["open"]
    } else {
        &["xdg-open"]
    }
}

#[cfg(test)]
mod tests {
    use super::command_or_default;

    #[test]
    fn configured_command_is_split_into_program_and_args() {
        assert_eq!(
            command_or_default(Some("code --wait"), &["notepad"]),
            vec!["code".to_string(), "--wait".to_string()]
        );
    }

    #[test]
    fn blank_configuration_falls_back_to_default() {
        assert_eq!(
            command_or_default(Some("   "), &["open", "-t"]),
            vec!["open".to_string(), "-t".to_string()]
        );
        assert_eq!(
            command_or_default(None, &["xdg-open"]),
            vec!["xdg-open".to_string()]
        );
    }
}
