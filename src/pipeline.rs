//! The stock pipeline: which tasks exist, what they depend on and which
//! source changes trigger them.

use camino::Utf8Path;
use glob::Pattern;

use crate::config::Config;
use crate::core::Notification;
use crate::error::ConfigError;
use crate::graph::TaskGraph;
use crate::transform::{Clean, Fonts, Html, Images, Scripts, Styles, Vendor, VendorKind};

pub const CLEAN: &str = "clean";
pub const HTML: &str = "html:build";
pub const JS: &str = "js:build";
pub const JS_LIB: &str = "jslib:build";
pub const STYLE: &str = "style:build";
pub const STYLE_LIB: &str = "stylelib:build";
pub const FONTS: &str = "fonts:build";
pub const IMAGES: &str = "image:build";

/// Registers the stock tasks: `clean` first, then every asset class in
/// parallel.
pub fn tasks(config: &Config) -> Result<TaskGraph, ConfigError> {
    let paths = &config.paths;
    let mut graph = TaskGraph::new();

    graph.register(CLEAN, Vec::<String>::new(), Clean::new(&paths.dist))?;

    graph
        .register(HTML, [CLEAN], Html::new(paths.html.clone()))?
        .notify(Notification::Reload);

    graph
        .register(
            JS,
            [CLEAN],
            Scripts::new(paths.js.clone(), &config.scripts.esbuild),
        )?
        .notify(Notification::Reload);

    graph.register(
        JS_LIB,
        [CLEAN],
        Vendor::new(
            VendorKind::Scripts,
            config.vendor.scripts.clone(),
            &paths.js.dest,
        ),
    )?;

    graph
        .register(STYLE, [CLEAN], Styles::new(paths.css.clone()))?
        .notify(Notification::Refresh);

    graph.register(
        STYLE_LIB,
        [CLEAN],
        Vendor::new(
            VendorKind::Styles,
            config.vendor.styles.clone(),
            &paths.css.dest,
        ),
    )?;

    graph.register(FONTS, [CLEAN], Fonts::new(paths.fonts.clone()))?;
    graph.register(IMAGES, [CLEAN], Images::new(paths.img.clone()))?;

    graph.finalize()?;
    Ok(graph)
}

/// A source glob and the tasks a change under it triggers.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    glob: String,
    pattern: Pattern,
    tasks: Vec<String>,
}

impl WatchBinding {
    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Paths are expected relative to the project root.
    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.pattern
            .matches_path_with(path.as_std_path(), crate::io::MATCH)
    }
}

/// Compiles the configured watch bindings, checking every task name against
/// the graph.
pub fn bindings(config: &Config, graph: &TaskGraph) -> Result<Vec<WatchBinding>, ConfigError> {
    config
        .watch
        .bindings
        .iter()
        .map(|binding| {
            if let Some(task) = binding.tasks.iter().find(|task| !graph.contains(task)) {
                return Err(ConfigError::UnknownTask {
                    glob: binding.glob.clone(),
                    task: task.clone(),
                });
            }

            Ok(WatchBinding {
                glob: binding.glob.clone(),
                pattern: crate::config::compile(&binding.glob)?,
                tasks: binding.tasks.clone(),
            })
        })
        .collect()
}
