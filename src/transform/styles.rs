use crate::config::AssetPaths;
use crate::error::{TaskError, TransformError};
use crate::transform::{Invocation, Produced, Transform};

/// Compiles Sass/SCSS entry files to CSS with `grass`.
///
/// Production output is compressed. Development output is expanded so it
/// stays readable in the browser's inspector.
pub struct Styles {
    paths: AssetPaths,
}

impl Styles {
    pub fn new(paths: AssetPaths) -> Self {
        Self { paths }
    }
}

impl Transform for Styles {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        let style = if invocation.mode().is_production() {
            grass::OutputStyle::Compressed
        } else {
            grass::OutputStyle::Expanded
        };

        let options = grass::Options::default().style(style);
        let mut produced = Vec::new();

        for source in crate::io::expand(&self.paths.src)? {
            // partials only exist to be imported
            if source.path.file_name().is_some_and(|name| name.starts_with('_')) {
                continue;
            }

            let css = grass::from_path(&source.path, &options).map_err(TransformError::Sass)?;

            let out = self
                .paths
                .dest
                .join(&source.relative)
                .with_extension("css");

            crate::io::write(&out, css)?;
            produced.push(out);
        }

        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::cache::Cache;
    use crate::core::{Environment, Mode};

    fn run(root: &camino::Utf8Path, mode: Mode) -> Result<Produced, TaskError> {
        let styles = Styles::new(AssetPaths {
            src: vec![format!("{root}/src/scss/*.scss")],
            dest: root.join("dist/css"),
        });

        let env = Environment::new(mode);
        let cache = Cache::new(root.join(".cache"));
        styles.run(&Invocation {
            env: &env,
            cache: &cache,
            changed: None,
        })
    }

    #[test]
    fn test_compiles_entry_with_partial() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        crate::io::write(&root.join("src/scss/_vars.scss"), "$accent: #ff0000;\n").unwrap();
        crate::io::write(
            &root.join("src/scss/main.scss"),
            "@import \"vars\";\nbody { a { color: $accent; } }\n",
        )
        .unwrap();

        let produced = run(&root, Mode::Production).unwrap();
        assert_eq!(produced, vec![root.join("dist/css/main.css")]);

        let css = std::fs::read_to_string(root.join("dist/css/main.css")).unwrap();
        assert!(css.contains("body a"));
        assert!(css.contains("red") || css.contains("#ff0000") || css.contains("#f00"));
        // compressed
        assert_eq!(css.trim_end().lines().count(), 1);
        assert!(!root.join("dist/css/_vars.css").exists());
    }

    #[test]
    fn test_syntax_error_is_transform_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        crate::io::write(&root.join("src/scss/main.scss"), "body { color: ").unwrap();

        let err = run(&root, Mode::Development).unwrap_err();
        assert!(matches!(err, TaskError::Transform(TransformError::Sass(_))));
        assert!(!root.join("dist/css/main.css").exists());
    }
}
