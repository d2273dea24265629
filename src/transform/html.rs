use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::AssetPaths;
use crate::error::{IoContext, TaskError, TransformError};
use crate::transform::{Invocation, Produced, Transform};

const DIRECTIVE: &str = "//=";

/// Expands `//= path/to/partial.html` include directives and writes the
/// pages to the destination directory.
///
/// A directive occupies a whole line and is replaced by the contents of the
/// referenced file, resolved relative to the file containing the directive.
/// Included files may include further files.
pub struct Html {
    paths: AssetPaths,
}

impl Html {
    pub fn new(paths: AssetPaths) -> Self {
        Self { paths }
    }
}

impl Transform for Html {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        let script = invocation.env.live_script();
        let mut produced = Vec::new();

        // Pages are cheap and any partial may feed any page, so every run
        // rebuilds all of them.
        for source in crate::io::expand(&self.paths.src)? {
            let mut stack = Vec::new();
            let mut text = expand_includes(&source.path, &mut stack)?;

            if let Some(script) = &script {
                text = inject(&text, script);
            }

            let out = self.paths.dest.join(&source.relative);
            crate::io::write(&out, text)?;
            produced.push(out);
        }

        Ok(produced)
    }
}

fn expand_includes(path: &Utf8Path, stack: &mut Vec<Utf8PathBuf>) -> Result<String, TaskError> {
    let canonical = path.canonicalize_utf8().at(path)?;
    if stack.contains(&canonical) {
        return Err(TransformError::IncludeCycle(path.to_owned()).into());
    }

    let text = fs::read_to_string(path).at(path)?;
    let dir = path.parent().unwrap_or(Utf8Path::new(""));

    stack.push(canonical);

    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();

        let Some(include) = trimmed.strip_prefix(DIRECTIVE) else {
            out.push_str(line);
            continue;
        };

        let include = include.trim();
        let resolved = dir.join(include);
        if !resolved.is_file() {
            return Err(TransformError::Include {
                path: path.to_owned(),
                include: include.to_string(),
            }
            .into());
        }

        let nested = expand_includes(&resolved, stack)?;
        out.push_str(&nested);

        if line.ends_with('\n') && !nested.ends_with('\n') {
            out.push('\n');
        }
    }

    stack.pop();
    Ok(out)
}

/// Places the live-reload script right before the closing body tag.
fn inject(html: &str, script: &str) -> String {
    match html.rfind("</body>") {
        Some(i) => format!("{}{}\n{}", &html[..i], script, &html[i..]),
        None => format!("{html}{script}\n"),
    }
}
