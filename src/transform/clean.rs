use camino::Utf8PathBuf;

use crate::error::TaskError;
use crate::transform::{Invocation, Produced, Transform};

/// Removes the whole output tree and recreates it empty.
pub struct Clean {
    pub dist: Utf8PathBuf,
}

impl Clean {
    pub fn new(dist: impl Into<Utf8PathBuf>) -> Self {
        Self { dist: dist.into() }
    }
}

impl Transform for Clean {
    fn run(&self, _: &Invocation) -> Result<Produced, TaskError> {
        crate::io::clean(&self.dist)?;
        Ok(vec![])
    }
}
