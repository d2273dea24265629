//! Static configuration, read once at startup.
//!
//! Every field has a default matching the conventional `src/` → `dist/`
//! project layout, so the configuration file is optional. A minimal file
//! overriding a couple of values looks like this:
//!
//! ```toml
//! [paths.css]
//! src  = ["assets/main.scss"]
//! dest = "public/css"
//!
//! [server]
//! port = 3000
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathConfig,
    pub vendor: VendorConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub cache: CacheConfig,
    pub scripts: ScriptsConfig,
}

/// Source globs and destination directory of a single asset class.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetPaths {
    pub src: Vec<String>,
    pub dest: Utf8PathBuf,
}

impl AssetPaths {
    fn new(src: &[&str], dest: &str) -> Self {
        Self {
            src: src.iter().map(|s| s.to_string()).collect(),
            dest: dest.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Output root, removed by `clean`.
    pub dist: Utf8PathBuf,
    pub html: AssetPaths,
    pub js: AssetPaths,
    pub css: AssetPaths,
    pub img: AssetPaths,
    pub fonts: AssetPaths,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            dist: "dist".into(),
            html: AssetPaths::new(&["src/*.html"], "dist"),
            js: AssetPaths::new(&["src/js/main.js"], "dist/js"),
            css: AssetPaths::new(&["src/scss/main.scss"], "dist/css"),
            img: AssetPaths::new(&["src/img/**/*.*"], "dist/img"),
            fonts: AssetPaths::new(&["src/fonts/**/*.*"], "dist/fonts"),
        }
    }
}

impl PathConfig {
    pub(crate) fn classes(&self) -> [(&'static str, &AssetPaths); 5] {
        [
            ("html", &self.html),
            ("js", &self.js),
            ("css", &self.css),
            ("img", &self.img),
            ("fonts", &self.fonts),
        ]
    }
}

/// Third-party files concatenated into `vendor.min.css` and `vendor.min.js`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    pub styles: Vec<Utf8PathBuf>,
    pub scripts: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Preferred port for the live-reload socket. Falls back to any free
    /// port when taken.
    pub live_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9090,
            live_port: 1337,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    pub glob: String,
    pub tasks: Vec<String>,
}

impl BindingConfig {
    fn new(glob: &str, task: &str) -> Self {
        Self {
            glob: glob.into(),
            tasks: vec![task.into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub bindings: Vec<BindingConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            bindings: vec![
                BindingConfig::new("src/**/*.html", "html:build"),
                BindingConfig::new("src/scss/**/*.scss", "style:build"),
                BindingConfig::new("tailwind.config.js", "style:build"),
                BindingConfig::new("src/js/**/*.js", "js:build"),
                BindingConfig::new("src/img/**/*.*", "image:build"),
                BindingConfig::new("src/fonts/**/*.*", "fonts:build"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: Utf8PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: ".cache".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Name or path of the esbuild executable.
    pub esbuild: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            esbuild: "esbuild".into(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`. A missing file yields the
    /// defaults.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(%path, "no configuration file, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        let config = Self::parse(&text).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            ParseFailure::Invalid(err) => err,
        })?;

        tracing::info!(%path, "loaded configuration");
        Ok(config)
    }

    fn parse(text: &str) -> Result<Self, ParseFailure> {
        let config: Config = toml::from_str(text).map_err(ParseFailure::Toml)?;
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    /// Rejects empty source lists and malformed globs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (class, paths) in self.paths.classes() {
            if paths.src.is_empty() {
                return Err(ConfigError::EmptySources(class));
            }

            for glob in &paths.src {
                compile(glob)?;
            }
        }

        for binding in &self.watch.bindings {
            compile(&binding.glob)?;
        }

        Ok(())
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

pub(crate) fn compile(glob: &str) -> Result<Pattern, ConfigError> {
    Pattern::new(glob).map_err(|source| ConfigError::Pattern {
        glob: glob.to_string(),
        source,
    })
}
