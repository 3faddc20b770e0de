use super::{BiometricAuthenticator, BiometricOutcome, BiometricReply};
use log::{debug, warn};
use std::io::ErrorKind;
use std::process::Command;
use std::thread;

/// Placeholder replaced with the prompt reason in command arguments
pub const REASON_PLACEHOLDER: &str = "{reason}";

/// Authenticates by running a system prompt command
///
/// The default command shows the macOS authentication sheet through
/// `osascript`. A zero exit status counts as success. If the program cannot
/// be found the reply is `Unavailable`.
#[derive(Debug, Clone)]
pub struct SystemBiometricAuthenticator {
    program: String,
    args: Vec<String>,
}

impl SystemBiometricAuthenticator {
    pub fn new() -> Self {
        Self::with_command(
            "osascript",
            vec![
                "-e".to_string(),
                format!(
                    r#"do shell script "true" with prompt "{}" with administrator privileges"#,
                    REASON_PLACEHOLDER
                ),
            ],
        )
    }

    /// Use a custom prompt command; `{reason}` in any argument is substituted
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn build_args(&self, reason: &str) -> Vec<String> {
        // Keep the reason from breaking out of a quoted AppleScript string
        let escaped = reason.replace('\\', "\\\\").replace('"', "\\\"");
        self.args
            .iter()
            .map(|arg| arg.replace(REASON_PLACEHOLDER, &escaped))
            .collect()
    }

    fn run(program: &str, args: &[String]) -> BiometricOutcome {
        match Command::new(program).args(args).output() {
            Ok(output) if output.status.success() => BiometricOutcome::Success,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                debug!("Biometric prompt exited with {}", output.status);
                BiometricOutcome::Failure(if stderr.is_empty() {
                    format!("prompt exited with {}", output.status)
                } else {
                    stderr
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Biometric prompt program not found: {}", program);
                BiometricOutcome::Unavailable
            }
            Err(e) => BiometricOutcome::Failure(e.to_string()),
        }
    }
}

impl Default for SystemBiometricAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl BiometricAuthenticator for SystemBiometricAuthenticator {
    fn authenticate(&self, reason: &str, reply: BiometricReply) {
        let program = self.program.clone();
        let args = self.build_args(reason);
        thread::spawn(move || {
            let outcome = Self::run(&program, &args);
            reply.resolve(outcome);
        });
    }
}
