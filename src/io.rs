use std::fmt::Display;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use glob::{MatchOptions, Pattern};
use indicatif::ProgressStyle;

use crate::error::{FilesystemError, IoContext, TransformError};

const ANSI_BLUE: Style = Style::new().blue();

/// `*` never crosses a path separator, `**` does.
pub(crate) const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

pub(crate) fn style_stage() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("invalid progress bar template")
        .progress_chars("=>-")
}

pub(crate) fn style_task() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .expect("invalid progress bar template")
}

/// Delete the output directory if it exists and recreate it empty.
pub fn clean(dist: &Utf8Path) -> Result<(), FilesystemError> {
    let s = Instant::now();

    if fs::metadata(dist).is_ok() {
        fs::remove_dir_all(dist).at(dist)?;
    }

    fs::create_dir_all(dist).at(dist)?;

    tracing::info!("cleaned {dist} {}", as_overhead(s));
    Ok(())
}

/// Delete the output directory, leaving nothing behind. Missing is fine.
pub fn remove(dist: &Utf8Path) -> Result<(), FilesystemError> {
    match fs::remove_dir_all(dist) {
        Ok(()) => {
            tracing::info!("removed {dist}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).at(dist),
    }
}

/// Delete an output whose source is gone. Missing is fine.
pub(crate) fn remove_file(path: &Utf8Path) -> Result<(), FilesystemError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("removed {path}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).at(path),
    }
}

/// Write `data` to `path`, creating parent directories on the way.
pub(crate) fn write(path: &Utf8Path, data: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).at(dir)?;
    }

    fs::write(path, data).at(path)
}

/// Copy a file, creating parent directories of the target on the way.
pub(crate) fn copy(from: &Utf8Path, to: &Utf8Path) -> Result<(), FilesystemError> {
    if let Some(dir) = to.parent() {
        fs::create_dir_all(dir).at(dir)?;
    }

    fs::copy(from, to).at(from)?;
    Ok(())
}

/// Splits a glob into its static directory prefix, the part without any
/// wildcard characters. For `src/img/**/*.png` this is `src/img`.
pub(crate) fn glob_base(glob: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(glob);
    let components: Vec<_> = path.components().collect();

    match components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
    {
        Some(split) => components.iter().take(split).collect(),
        // A concrete file is relative to its own directory.
        None => path.parent().map(Utf8Path::to_path_buf).unwrap_or_default(),
    }
}

/// A file matched by a source glob, with its path relative to the glob's
/// static base. The relative part decides where the output lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: Utf8PathBuf,
    pub relative: Utf8PathBuf,
}

/// Expands every glob, skipping directories. Results keep glob order.
pub(crate) fn expand(globs: &[String]) -> Result<Vec<Source>, TransformError> {
    let mut sources = Vec::new();

    for pattern in globs {
        let base = glob_base(pattern);

        for path in glob::glob_with(pattern, MATCH)? {
            let path = Utf8PathBuf::try_from(path?)?;
            if path.is_dir() {
                continue;
            }

            let relative = relative_to(&path, &base);
            sources.push(Source { path, relative });
        }
    }

    Ok(sources)
}

/// Like [`expand`], but only for the given paths. Used by incremental
/// runs, where the watcher already knows which files changed.
pub(crate) fn select(
    globs: &[String],
    changed: &[Utf8PathBuf],
) -> Result<Vec<Source>, TransformError> {
    let mut sources = Vec::new();

    for pattern in globs {
        let base = glob_base(pattern);
        let compiled = Pattern::new(pattern)?;

        for path in changed {
            if compiled.matches_path_with(path.as_std_path(), MATCH) {
                let relative = relative_to(path, &base);
                sources.push(Source {
                    path: path.clone(),
                    relative,
                });
            }
        }
    }

    Ok(sources)
}

fn relative_to(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    path.strip_prefix(base)
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|_| path.file_name().unwrap_or(path.as_str()).into())
}
