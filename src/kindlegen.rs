//! Runs Amazon's `kindlegen` on a source directory.

use crate::error::{Error, Result};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

const BINARY_NAMES: &[&str] = &["kindlegen", "kindlegen.exe"];

/// kindlegen's exit code for "built, with warnings".
const EXIT_WARNINGS: i32 = 1;

/// Lines of output kept in a failure message.
const ERROR_TAIL_LINES: usize = 12;

/// Result of a successful kindlegen run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PackOutcome {
    /// Where the dictionary ended up
    pub mobi_path: PathBuf,
    /// `Warning(...)` lines printed by kindlegen
    pub warnings: Vec<String>,
}

/// A located kindlegen binary.
#[derive(Debug, Clone)]
pub(crate) struct Packer {
    binary: PathBuf,
}

impl Packer {
    /// Uses `configured` if given, otherwise searches `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PackerNotFound`] if no binary exists.
    pub(crate) fn locate(configured: Option<&Path>) -> Result<Self> {
        Self::locate_in(configured, env::var_os("PATH"))
    }

    fn locate_in(configured: Option<&Path>, path_var: Option<OsString>) -> Result<Self> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(Self {
                    binary: path.to_path_buf(),
                });
            }
            return Err(Error::PackerNotFound {
                searched: path.display().to_string(),
            });
        }

        let found = path_var.as_ref().and_then(|paths| {
            env::split_paths(paths)
                .flat_map(|dir| BINARY_NAMES.iter().map(move |name| dir.join(name)))
                .find(|candidate| candidate.is_file())
        });

        match found {
            Some(binary) => {
                debug!("Found kindlegen at {}", binary.display());
                Ok(Self { binary })
            }
            None => Err(Error::PackerNotFound {
                searched: "kindlegen on PATH".to_string(),
            }),
        }
    }

    /// The binary that will be run.
    pub(crate) fn binary(&self) -> &Path {
        &self.binary
    }

    /// Compiles `opf_path` and moves the result to `mobi_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Packer`] if kindlegen cannot be started, fails, or
    /// reports warnings without producing a file.
    pub(crate) fn pack(&self, opf_path: &Path, mobi_path: &Path) -> Result<PackOutcome> {
        let source_dir = opf_path
            .parent()
            .ok_or_else(|| Error::config(format!("No directory for {}", opf_path.display())))?;
        let opf_name = opf_path
            .file_name()
            .ok_or_else(|| Error::config(format!("Invalid package path {}", opf_path.display())))?;
        let mobi_name = mobi_path
            .file_name()
            .ok_or_else(|| Error::config(format!("Invalid output path {}", mobi_path.display())))?;

        info!("Running {} on {}", self.binary.display(), opf_path.display());

        let output = Command::new(&self.binary)
            .current_dir(source_dir)
            .arg(opf_name)
            .args(["-c2", "-verbose", "-dont_append_source", "-o"])
            .arg(mobi_name)
            .output()
            .map_err(|e| Error::Packer {
                code: None,
                message: format!("failed to start {}: {e}", self.binary.display()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut warnings = Vec::new();

        for line in stdout.lines().chain(stderr.lines()) {
            if line.starts_with("Warning(") {
                warn!("kindlegen: {}", line);
                warnings.push(line.to_string());
            } else if line.starts_with("Error(") {
                warn!("kindlegen: {}", line);
            } else {
                debug!("kindlegen: {}", line);
            }
        }

        let produced = source_dir.join(mobi_name);
        let code = output.status.code();
        let built = output.status.success() || (code == Some(EXIT_WARNINGS) && produced.is_file());

        if !built {
            return Err(Error::Packer {
                code,
                message: failure_tail(&stdout, &stderr),
            });
        }

        if !warnings.is_empty() {
            info!("kindlegen finished with {} warnings", warnings.len());
        }

        move_file(&produced, mobi_path)?;

        Ok(PackOutcome {
            mobi_path: mobi_path.to_path_buf(),
            warnings,
        })
    }
}

/// Error lines if there are any, else the last lines of output.
fn failure_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let errors: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| l.starts_with("Error("))
        .collect();

    let chosen = if errors.is_empty() {
        &lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..]
    } else {
        &errors[errors.len().saturating_sub(ERROR_TAIL_LINES)..]
    };

    if chosen.is_empty() {
        "no output".to_string()
    } else {
        chosen.join("\n")
    }
}

/// Renames, falling back to copy and remove across file systems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    if fs::rename(from, to).is_err() {
        fs::copy(from, to).map_err(|e| Error::io(to, e))?;
        fs::remove_file(from).map_err(|e| Error::io(from, e))?;
    }

    debug!("Moved {} to {}", from.display(), to.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_locate_configured() {
        let temp = assert_fs::TempDir::new().unwrap();
        let binary = temp.child("kindlegen");
        binary.write_str("").unwrap();

        let packer = Packer::locate_in(Some(binary.path()), None).unwrap();
        assert_eq!(packer.binary(), binary.path());

        let missing = Packer::locate_in(Some(temp.path().join("nope").as_path()), None);
        assert!(matches!(missing, Err(Error::PackerNotFound { .. })));
    }

    #[test]
    fn test_locate_on_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let empty = temp.child("empty");
        empty.create_dir_all().unwrap();
        let bin = temp.child("bin");
        bin.child("kindlegen").write_str("").unwrap();

        let path_var = env::join_paths([empty.path(), bin.path()]).unwrap();
        let packer = Packer::locate_in(None, Some(path_var)).unwrap();
        assert_eq!(packer.binary(), bin.child("kindlegen").path());

        let path_var = env::join_paths([empty.path()]).unwrap();
        assert!(matches!(
            Packer::locate_in(None, Some(path_var)),
            Err(Error::PackerNotFound { .. })
        ));
        assert!(Packer::locate_in(None, None).is_err());
    }

    #[test]
    fn test_failure_tail() {
        assert_eq!(
            failure_tail("Info(prcgen): a\nError(prcgen):E1: broken\n", ""),
            "Error(prcgen):E1: broken"
        );
        assert_eq!(failure_tail("last words\n", ""), "last words");
        assert_eq!(failure_tail("", ""), "no output");
    }

    #[cfg(unix)]
    fn fake_kindlegen(dir: &assert_fs::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.child("kindlegen");
        script.write_str(&format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(script.path(), fs::Permissions::from_mode(0o755)).unwrap();
        script.path().to_path_buf()
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_with_warnings() {
        let temp = assert_fs::TempDir::new().unwrap();
        let binary = fake_kindlegen(
            &temp,
            "echo 'Info(prcgen):I1047: Added metadata dc:Title'\n\
             echo 'Warning(prcgen):W14001: Hyperlink not resolved'\n\
             printf 'MOBI' > \"$6\"\n\
             exit 1",
        );
        let source = temp.child("out").child("urth-source");
        source.child("content.opf").write_str("<package/>").unwrap();
        let mobi = temp.child("out").child("urth.mobi");

        let packer = Packer::locate_in(Some(binary.as_path()), None).unwrap();
        let outcome = packer.pack(&source.path().join("content.opf"), mobi.path()).unwrap();

        assert_eq!(outcome.mobi_path, mobi.path());
        assert_eq!(
            outcome.warnings,
            vec!["Warning(prcgen):W14001: Hyperlink not resolved"]
        );
        assert_eq!(fs::read(mobi.path()).unwrap(), b"MOBI");
        assert!(!source.child("urth.mobi").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        let binary = fake_kindlegen(&temp, "echo 'Error(kindlegen):E30005: no content'\nexit 2");
        let source = temp.child("src");
        source.child("content.opf").write_str("<package/>").unwrap();

        let packer = Packer::locate_in(Some(binary.as_path()), None).unwrap();
        let err = packer
            .pack(&source.path().join("content.opf"), &temp.path().join("x.mobi"))
            .unwrap_err();

        match err {
            Error::Packer { code, message } => {
                assert_eq!(code, Some(2));
                assert!(message.contains("E30005"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_warning_exit_without_output_is_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        let binary = fake_kindlegen(&temp, "exit 1");
        let source = temp.child("src");
        source.child("content.opf").write_str("<package/>").unwrap();

        let packer = Packer::locate_in(Some(binary.as_path()), None).unwrap();
        let result = packer.pack(&source.path().join("content.opf"), &temp.path().join("x.mobi"));
        assert!(matches!(result, Err(Error::Packer { code: Some(1), .. })));
    }
}
