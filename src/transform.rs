//! Asset transforms, one per asset class.
//!
//! A transform turns the sources of one asset class into files in its
//! destination directory. The orchestrator treats them as opaque: it only
//! cares whether a run succeeded and which files it produced. Plain closures
//! implement [`Transform`] as well, which keeps ad-hoc tasks and test fakes
//! short.

mod clean;
mod fonts;
mod html;
mod images;
mod scripts;
mod styles;
mod vendor;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cache::Cache;
use crate::core::{Environment, Mode};
use crate::error::TaskError;

pub use clean::Clean;
pub use fonts::Fonts;
pub use html::Html;
pub use images::Images;
pub use scripts::Scripts;
pub use styles::Styles;
pub use vendor::{Vendor, VendorKind};

#[cfg(all(test, unix))]
pub(crate) use scripts::failing_esbuild;

/// Everything a transform may look at while it runs.
pub struct Invocation<'a> {
    pub env: &'a Environment,
    pub cache: &'a Cache,
    /// Source files that changed since the last run, relative to the project
    /// root. `None` for full builds.
    pub changed: Option<&'a [Utf8PathBuf]>,
}

impl<'a> Invocation<'a> {
    pub fn mode(&self) -> Mode {
        self.env.mode
    }
}

/// The files written by a successful run.
pub type Produced = Vec<Utf8PathBuf>;

pub trait Transform: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError>;
}

impl<F> Transform for F
where
    F: Fn(&Invocation) -> Result<Produced, TaskError> + Send + Sync,
{
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        self(invocation)
    }
}

/// Output path of a source file with the given relative path.
fn target(dest: &Utf8Path, relative: &Utf8Path) -> Utf8PathBuf {
    dest.join(relative)
}
