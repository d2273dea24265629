use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{IoContext, TaskError, TransformError};
use crate::transform::{Invocation, Produced, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorKind {
    Styles,
    Scripts,
}

impl VendorKind {
    fn file_name(self) -> &'static str {
        match self {
            VendorKind::Styles => "vendor.min.css",
            VendorKind::Scripts => "vendor.min.js",
        }
    }
}

/// Concatenates third-party libraries into a single bundle. Stylesheets are
/// minified on the way, scripts are expected to ship minified already.
pub struct Vendor {
    kind: VendorKind,
    files: Vec<Utf8PathBuf>,
    dest: Utf8PathBuf,
}

impl Vendor {
    pub fn new(kind: VendorKind, files: Vec<Utf8PathBuf>, dest: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            files,
            dest: dest.into(),
        }
    }
}

impl Transform for Vendor {
    fn run(&self, _: &Invocation) -> Result<Produced, TaskError> {
        if self.files.is_empty() {
            return Ok(vec![]);
        }

        let mut bundle = String::new();
        for file in &self.files {
            let text = fs::read_to_string(file).at(file)?;

            match self.kind {
                VendorKind::Styles => bundle.push_str(&minify_css(file, &text)?),
                VendorKind::Scripts => {
                    bundle.push_str(&text);
                    // guard against a missing trailing semicolon
                    bundle.push_str(";\n");
                }
            }
        }

        let out = self.dest.join(self.kind.file_name());
        crate::io::write(&out, bundle)?;

        Ok(vec![out])
    }
}

fn minify_css(file: &Utf8Path, text: &str) -> Result<String, TaskError> {
    let options = grass::Options::default()
        .style(grass::OutputStyle::Compressed)
        .input_syntax(grass::InputSyntax::Css);

    grass::from_string(text.to_string(), &options)
        .map_err(|e| {
            tracing::warn!("couldn't minify {file}");
            TransformError::Sass(e).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::core::Environment;

    fn run(vendor: &Vendor, root: &Utf8Path) -> Result<Produced, TaskError> {
        let env = Environment::default();
        let cache = Cache::new(root.join(".cache"));
        vendor.run(&Invocation {
            env: &env,
            cache: &cache,
            changed: None,
        })
    }

    #[test]
    fn test_scripts_concatenated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        crate::io::write(&root.join("lib/a.js"), "var a=1").unwrap();
        crate::io::write(&root.join("lib/b.js"), "var b=2;").unwrap();

        let vendor = Vendor::new(
            VendorKind::Scripts,
            vec![root.join("lib/a.js"), root.join("lib/b.js")],
            root.join("dist/js"),
        );

        let produced = run(&vendor, &root).unwrap();
        assert_eq!(produced, vec![root.join("dist/js/vendor.min.js")]);

        let text = fs::read_to_string(root.join("dist/js/vendor.min.js")).unwrap();
        assert_eq!(text, "var a=1;\nvar b=2;;\n");
    }

    #[test]
    fn test_styles_minified() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        crate::io::write(&root.join("lib/reset.css"), "body {\n  margin: 0;\n}\n").unwrap();

        let vendor = Vendor::new(
            VendorKind::Styles,
            vec![root.join("lib/reset.css")],
            root.join("dist/css"),
        );

        run(&vendor, &root).unwrap();

        let text = fs::read_to_string(root.join("dist/css/vendor.min.css")).unwrap();
        assert!(text.starts_with("body{margin:0}"));
    }

    #[test]
    fn test_empty_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let vendor = Vendor::new(VendorKind::Styles, vec![], root.join("dist/css"));

        assert!(run(&vendor, &root).unwrap().is_empty());
        assert!(!root.join("dist/css").exists());
    }

    #[test]
    fn test_missing_library_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let vendor = Vendor::new(
            VendorKind::Scripts,
            vec![root.join("node_modules/jquery/dist/jquery.min.js")],
            root.join("dist/js"),
        );

        assert!(matches!(run(&vendor, &root), Err(TaskError::Filesystem(_))));
    }
}
