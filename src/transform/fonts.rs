use crate::config::AssetPaths;
use crate::error::TaskError;
use crate::transform::{Invocation, Produced, Transform, target};

/// Copies font files verbatim, keeping their layout below the glob base.
///
/// Watch-triggered runs copy only the changed fonts and delete the outputs
/// of removed ones.
pub struct Fonts {
    paths: AssetPaths,
}

impl Fonts {
    pub fn new(paths: AssetPaths) -> Self {
        Self { paths }
    }
}

impl Transform for Fonts {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        let sources = match invocation.changed {
            Some(changed) => crate::io::select(&self.paths.src, changed)?,
            None => crate::io::expand(&self.paths.src)?,
        };

        let mut produced = Vec::new();

        for source in sources {
            let out = target(&self.paths.dest, &source.relative);

            if !source.path.exists() {
                crate::io::remove_file(&out)?;
                continue;
            }

            crate::io::copy(&source.path, &out)?;
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
    use crate::core::Environment;

    fn setup() -> (tempfile::TempDir, Utf8PathBuf, Fonts) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        crate::io::write(&root.join("src/fonts/Inter.woff2"), b"inter").unwrap();
        crate::io::write(&root.join("src/fonts/mono/Iosevka.ttf"), b"iosevka").unwrap();

        let fonts = Fonts::new(AssetPaths {
            src: vec![format!("{root}/src/fonts/**/*.*")],
            dest: root.join("dist/fonts"),
        });

        (dir, root, fonts)
    }

    fn run(fonts: &Fonts, root: &Utf8PathBuf, changed: Option<&[Utf8PathBuf]>) -> Produced {
        let env = Environment::default();
        let cache = Cache::new(root.join(".cache"));
        fonts
            .run(&Invocation {
                env: &env,
                cache: &cache,
                changed,
            })
            .unwrap()
    }

    #[test]
    fn test_copies_nested_fonts() {
        let (_dir, root, fonts) = setup();
        let produced = run(&fonts, &root, None);

        assert_eq!(produced.len(), 2);
        assert_eq!(
            std::fs::read(root.join("dist/fonts/mono/Iosevka.ttf")).unwrap(),
            b"iosevka"
        );
        assert!(root.join("dist/fonts/Inter.woff2").is_file());
    }

    #[test]
    fn test_changed_run_copies_only_changed_fonts() {
        let (_dir, root, fonts) = setup();
        run(&fonts, &root, None);

        crate::io::write(&root.join("src/fonts/Inter.woff2"), b"inter v2").unwrap();
        crate::io::write(&root.join("src/fonts/mono/Iosevka.ttf"), b"iosevka v2").unwrap();

        let changed = vec![root.join("src/fonts/Inter.woff2")];
        let produced = run(&fonts, &root, Some(&changed));

        assert_eq!(produced, vec![root.join("dist/fonts/Inter.woff2")]);
        assert_eq!(
            std::fs::read(root.join("dist/fonts/Inter.woff2")).unwrap(),
            b"inter v2"
        );
        assert_eq!(
            std::fs::read(root.join("dist/fonts/mono/Iosevka.ttf")).unwrap(),
            b"iosevka"
        );
    }

    #[test]
    fn test_removed_font_deletes_output() {
        let (_dir, root, fonts) = setup();
        run(&fonts, &root, None);
        assert!(root.join("dist/fonts/mono/Iosevka.ttf").is_file());

        std::fs::remove_file(root.join("src/fonts/mono/Iosevka.ttf")).unwrap();
        let changed = vec![root.join("src/fonts/mono/Iosevka.ttf")];
        let produced = run(&fonts, &root, Some(&changed));

        assert!(produced.is_empty());
        assert!(!root.join("dist/fonts/mono/Iosevka.ttf").exists());
        assert!(root.join("dist/fonts/Inter.woff2").is_file());
    }
}
