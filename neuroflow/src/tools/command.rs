//! External tool command lines.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// A fully-specified external tool invocation.
///
/// Arguments are kept as strings so the exact command line can be logged
/// and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Short tool name used in logs and errors (e.g. "robex").
    pub tool: String,
    /// The executable to run.
    pub program: PathBuf,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Appends a flag followed by its value.
    #[must_use]
    pub fn flag(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Sets an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command line as it would be typed in a shell (unquoted).
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
impl ToolCommand {
    /// Returns the value following `flag`, if present.
    pub(crate) fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::new("ants", "/usr/local/bin/antsRegistrationSyN.sh")
            .flag("-d", "3")
            .flag("-f", "/atlas.nii")
            .args(["-t", "s"])
            .env("ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS", "4");

        assert_eq!(cmd.tool, "ants");
        assert_eq!(cmd.args, vec!["-d", "3", "-f", "/atlas.nii", "-t", "s"]);
        assert_eq!(cmd.flag_value("-f"), Some("/atlas.nii"));
        assert_eq!(cmd.flag_value("-o"), None);
        assert_eq!(cmd.env.len(), 1);
    }

    #[test]
    fn test_command_display() {
        let cmd = ToolCommand::new("robex", "/opt/ROBEX/runROBEX.sh")
            .path_arg(Path::new("/in/s1.nii.gz"))
            .path_arg(Path::new("/work/s1.nii.gz"));
        assert_eq!(
            cmd.display(),
            "/opt/ROBEX/runROBEX.sh /in/s1.nii.gz /work/s1.nii.gz"
        );
    }

    #[test]
    fn test_flag_value_at_end() {
        let cmd = ToolCommand::new("x", "x").arg("-o");
        assert_eq!(cmd.flag_value("-o"), None);
    }
}
