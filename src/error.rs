use camino::Utf8PathBuf;
use thiserror::Error;

/// Problems with the static configuration or the task graph. These are
/// always reported before any build work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on '{prerequisite}', which was never registered")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Task graph contains a cycle through '{0}'")]
    CyclicDependency(String),

    #[error("Watch binding '{glob}' refers to unknown task '{task}'")]
    UnknownTask { glob: String, task: String },

    #[error("No source globs configured for '{0}'")]
    EmptySources(&'static str),

    #[error("Couldn't compile glob pattern '{glob}'.\n{source}")]
    Pattern {
        glob: String,
        source: glob::PatternError,
    },

    #[error("Couldn't read configuration file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse configuration file '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: toml::de::Error,
    },
}

/// A transform reported a processing failure, e.g. a syntax error in a
/// source file.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Image processing error in '{path}': {source}")]
    Image {
        path: Utf8PathBuf,
        source: image::ImageError,
    },

    #[error("Esbuild execution failed: {0}")]
    Esbuild(String),

    #[error("Couldn't resolve include '{include}' in '{path}'")]
    Include {
        path: Utf8PathBuf,
        include: String,
    },

    #[error("Include cycle detected at '{0}'")]
    IncludeCycle(Utf8PathBuf),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    NotUtf8(#[from] camino::FromPathBufError),
}

/// Clean, copy or write failure. Fatal for the affected task.
#[derive(Debug, Error)]
#[error("Filesystem error at '{path}': {source}")]
pub struct FilesystemError {
    pub path: Utf8PathBuf,
    pub source: std::io::Error,
}

/// The reason a single task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error("Task panicked: {0}")]
    Panic(String),
}

/// Errors that prevent a build from running at all. Failures of individual
/// tasks are never reported this way, they end up in the
/// [`BuildReport`](crate::BuildReport).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Task '{0}' not found")]
    UnknownTask(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Couldn't bind {addr}, is the port already in use?\n{source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to build runtime.\n{0}")]
    Runtime(#[from] std::io::Error),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Attaches the offending path to I/O errors.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<Utf8PathBuf>) -> Result<T, FilesystemError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<Utf8PathBuf>) -> Result<T, FilesystemError> {
        self.map_err(|source| FilesystemError {
            path: path.into(),
            source,
        })
    }
}
