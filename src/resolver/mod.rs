//! Resolves an Image Reference to raw bytes plus a detected media type (§4.1).

pub mod s3;

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::ImageError;
use crate::models::{ImageRef, ImageRefKind};
use s3::S3FetchError;

/// Outcome of resolving an Image Reference: either a per-image failure (§4.1,
/// surfaced in `results[i].error`) or a transient infrastructure failure that
/// the caller must treat as job-level and retry (§7) rather than attribute to
/// this one image.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("transient resolver failure: {0}")]
    Transient(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedMedia {
    Image,
    Pdf,
    Other,
}

fn sniff(bytes: &[u8], value: &str) -> DetectedMedia {
    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        if mime == "application/pdf" {
            return DetectedMedia::Pdf;
        }
        if mime.starts_with("image/") {
            return DetectedMedia::Image;
        }
        return DetectedMedia::Other;
    }
    // Fall back to extension sniffing when magic bytes are inconclusive (e.g. tiny
    // or truncated files).
    match mime_guess::from_path(value).first() {
        Some(m) if m.type_() == mime_guess::mime::IMAGE => DetectedMedia::Image,
        Some(m) if m.essence_str() == "application/pdf" => DetectedMedia::Pdf,
        _ => DetectedMedia::Other,
    }
}

/// A blob fetch-by-id collaborator for the `db` image reference kind. Left as an
/// interface: the concrete backing database is an external collaborator per §4.1.
#[async_trait::async_trait]
pub trait DbBlobFetcher: Send + Sync {
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

pub struct ImageResolver {
    local_root: PathBuf,
    s3: Option<s3::S3Resolver>,
    db: Option<std::sync::Arc<dyn DbBlobFetcher>>,
}

impl ImageResolver {
    pub async fn new(config: &Config, db: Option<std::sync::Arc<dyn DbBlobFetcher>>) -> Self {
        let s3 = s3::S3Resolver::from_config(config).await;
        ImageResolver {
            local_root: config.local_images_root.clone(),
            s3,
            db,
        }
    }

    /// Resolve the reference to bytes and a media classification. Returns
    /// `Err(ResolveError::Image)` for per-image failures per §4.1 (these go into
    /// `results[i].error` and do not affect the rest of the job); returns
    /// `Err(ResolveError::Transient)` when the backing store itself is
    /// unreachable or refuses auth, which the caller must treat as a
    /// job-level error and retry rather than blame on this one image.
    pub async fn resolve(
        &self,
        image_ref: &ImageRef,
    ) -> Result<(Vec<u8>, DetectedMedia), ResolveError> {
        let bytes = match image_ref.kind {
            ImageRefKind::LocalPath => self.read_local(&image_ref.value)?,
            ImageRefKind::S3 | ImageRefKind::Minio => {
                let s3 = self.s3.as_ref().ok_or(ImageError::ImageNotFound)?;
                match s3.fetch(&image_ref.value).await {
                    Ok(bytes) => bytes,
                    Err(S3FetchError::NotFound) => return Err(ImageError::ImageNotFound.into()),
                    Err(S3FetchError::Other(e)) => return Err(ResolveError::Transient(e)),
                }
            }
            ImageRefKind::Db => {
                let db = self.db.as_ref().ok_or(ImageError::ImageNotFound)?;
                db.fetch(&image_ref.value)
                    .await
                    .ok()
                    .flatten()
                    .ok_or(ImageError::ImageNotFound)?
            }
        };

        match sniff(&bytes, &image_ref.value) {
            DetectedMedia::Pdf => Err(ImageError::UnsupportedMedia {
                detail: "pdf".to_string(),
            }
            .into()),
            DetectedMedia::Other => Err(ImageError::UnsupportedMedia {
                detail: "not an image".to_string(),
            }
            .into()),
            DetectedMedia::Image => Ok((bytes, DetectedMedia::Image)),
        }
    }

    fn read_local(&self, value: &str) -> Result<Vec<u8>, ImageError> {
        let requested = Path::new(value);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.local_root.join(requested)
        };

        let canonical = joined.canonicalize().map_err(|_| ImageError::ImageNotFound)?;
        if !canonical.starts_with(&self.local_root) {
            return Err(ImageError::ImageNotFound);
        }

        std::fs::read(&canonical).map_err(|_| ImageError::ImageNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_pdf_magic_bytes() {
        let pdf = b"%PDF-1.4 rest of file";
        assert_eq!(sniff(pdf, "doc.pdf"), DetectedMedia::Pdf);
    }

    #[test]
    fn sniff_png_magic_bytes() {
        let png: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0];
        assert_eq!(sniff(png, "photo.png"), DetectedMedia::Image);
    }
}
