use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::AssetPaths;
use crate::core::Mode;
use crate::error::{IoContext, TaskError, TransformError};
use crate::transform::{Invocation, Produced, Transform};

/// Bundles JavaScript entry points with Esbuild.
///
/// **Note:** This transform requires the `esbuild` binary, either on the
/// `PATH` or at the configured location.
pub struct Scripts {
    paths: AssetPaths,
    esbuild: String,
}

impl Scripts {
    pub fn new(paths: AssetPaths, esbuild: impl Into<String>) -> Self {
        Self {
            paths,
            esbuild: esbuild.into(),
        }
    }
}

impl Transform for Scripts {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        let mut produced = Vec::new();

        for source in crate::io::expand(&self.paths.src)? {
            let out = self.paths.dest.join(&source.relative);
            if let Some(dir) = out.parent() {
                std::fs::create_dir_all(dir).at(dir)?;
            }

            compile_esbuild(&self.esbuild, &source.path, &out, invocation.mode())?;

            if !invocation.mode().is_production() {
                produced.push(map_path(&out));
            }
            produced.push(out);
        }

        Ok(produced)
    }
}

fn map_path(out: &Utf8Path) -> Utf8PathBuf {
    let mut name = out.file_name().unwrap_or_default().to_string();
    name.push_str(".map");
    out.with_file_name(name)
}

/// Esbuild writes nothing when the bundle fails, so a broken entry never
/// replaces the previous good output.
fn compile_esbuild(
    esbuild: &str,
    file: &Utf8Path,
    out: &Utf8Path,
    mode: Mode,
) -> Result<(), TaskError> {
    let mut command = Command::new(esbuild);
    command
        .arg(file.as_str())
        .arg("--bundle")
        .arg("--minify")
        .arg("--target=es2015")
        .arg(format!("--outfile={out}"))
        .arg("--log-level=error");

    if !mode.is_production() {
        command.arg("--sourcemap");
    }

    let output = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .at(file)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransformError::Esbuild(stderr.trim().to_string()).into());
    }

    Ok(())
}

/// Writes an executable stand-in for esbuild that rejects every entry,
/// printing `message` to stderr.
#[cfg(all(test, unix))]
pub(crate) fn failing_esbuild(dir: &Utf8Path, message: &str) -> Utf8PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("esbuild");
    std::fs::write(&path, format!("#!/bin/sh\necho '{message}' >&2\nexit 1\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_path() {
        assert_eq!(
            map_path(Utf8Path::new("dist/js/main.js")),
            Utf8Path::new("dist/js/main.js.map")
        );
    }

    #[test]
    fn test_missing_binary_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        crate::io::write(&root.join("src/js/main.js"), "console.log(1)").unwrap();

        let scripts = Scripts::new(
            AssetPaths {
                src: vec![format!("{root}/src/js/main.js")],
                dest: root.join("dist/js"),
            },
            root.join("no-such-esbuild").to_string(),
        );

        let env = crate::core::Environment::default();
        let cache = crate::cache::Cache::new(root.join(".cache"));
        let err = scripts
            .run(&Invocation {
                env: &env,
                cache: &cache,
                changed: None,
            })
            .unwrap_err();

        assert!(matches!(err, TaskError::Filesystem(_)));
        assert!(!root.join("dist/js/main.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejected_entry_is_esbuild_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        crate::io::write(&root.join("src/js/main.js"), "function (").unwrap();

        let esbuild = failing_esbuild(&root, "main.js:1:9: ERROR: Expected identifier");
        let scripts = Scripts::new(
            AssetPaths {
                src: vec![format!("{root}/src/js/main.js")],
                dest: root.join("dist/js"),
            },
            esbuild.as_str(),
        );

        let env = crate::core::Environment::new(Mode::Production);
        let cache = crate::cache::Cache::new(root.join(".cache"));
        let err = scripts
            .run(&Invocation {
                env: &env,
                cache: &cache,
                changed: None,
            })
            .unwrap_err();

        match err {
            TaskError::Transform(TransformError::Esbuild(stderr)) => {
                assert_eq!(stderr, "main.js:1:9: ERROR: Expected identifier")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.join("dist/js/main.js").exists());
    }
}
