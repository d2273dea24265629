use std::fs;
use std::io::Cursor;

use camino::Utf8PathBuf;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::cache::Cache;
use crate::config::AssetPaths;
use crate::core::Hash32;
use crate::error::{IoContext, TaskError, TransformError};
use crate::io::Source;
use crate::transform::{Invocation, Produced, Transform, target};

const AREA: &str = "img";
const JPEG_QUALITY: u8 = 80;

/// Losslessly recompresses PNG and re-encodes JPEG images, copying every
/// other file verbatim.
///
/// Results are cached by the fingerprint of the source contents, so only
/// new or edited images are ever re-encoded. When the watcher reports
/// changed files, only those are processed; removed sources have their
/// output deleted.
pub struct Images {
    paths: AssetPaths,
}

impl Images {
    pub fn new(paths: AssetPaths) -> Self {
        Self { paths }
    }
}

impl Transform for Images {
    fn run(&self, invocation: &Invocation) -> Result<Produced, TaskError> {
        let sources = match invocation.changed {
            Some(changed) => crate::io::select(&self.paths.src, changed)?,
            None => crate::io::expand(&self.paths.src)?,
        };

        let produced = sources
            .into_par_iter()
            .map(|source| -> Result<Option<Utf8PathBuf>, TaskError> {
                let out = target(&self.paths.dest, &source.relative);

                if !source.path.exists() {
                    crate::io::remove_file(&out)?;
                    return Ok(None);
                }

                process_image(invocation.cache, &source, &out)?;
                Ok(Some(out))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(produced.into_iter().flatten().collect())
    }
}

fn process_image(cache: &Cache, source: &Source, out: &Utf8PathBuf) -> Result<(), TaskError> {
    let buffer = fs::read(&source.path).at(&source.path)?;

    let format = match image::guess_format(&buffer) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
        // svg, gif, webp and friends are passed through
        _ => {
            crate::io::copy(&source.path, out)?;
            return Ok(());
        }
    };

    let ext = source
        .path
        .extension()
        .unwrap_or(format.extensions_str()[0])
        .to_ascii_lowercase();

    let key = Hash32::hash(&buffer);

    if let Some(cached) = cache.get(AREA, key, &ext) {
        tracing::debug!("cache hit for {}", source.path);
        crate::io::copy(&cached, out)?;
        return Ok(());
    }

    let optimized = optimize(&buffer, format).map_err(|e| TransformError::Image {
        path: source.path.clone(),
        source: e,
    })?;

    // keep the source bytes when re-encoding doesn't help
    let best = if optimized.len() < buffer.len() {
        &optimized
    } else {
        &buffer
    };

    cache.put(AREA, key, &ext, best)?;
    crate::io::write(out, best)?;

    Ok(())
}

fn optimize(buffer: &[u8], format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory_with_format(buffer, format)?;
    let mut out = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            img.write_with_encoder(encoder)?;
        }
        _ => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
    }

    Ok(out.into_inner())
}
