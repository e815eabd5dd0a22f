//! Image Loader: turns a user-supplied file into an in-memory [`ImageAsset`].
//!
//! File pickers and drag-and-drop both funnel through [`ImageLoader::load`],
//! so an image behaves identically whichever way it arrived.

use std::path::PathBuf;

use bytes::Bytes;
use labelscan_core::{ImageAsset, ImageEncoding, ImageOrigin, ScanError};
use tracing::{debug, info, warn};

pub mod data_uri;
pub mod mime_detect;

pub use mime_detect::{detect_mime_type, is_image, is_ocr_supported, sniff_image_mime};

/// Default upper bound on image size.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Where the image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk.
    Path(PathBuf),
    /// Bytes already in memory (uploads, dropped files).
    Bytes { name: Option<String>, data: Bytes },
    /// A `data:` URI as produced by browser file readers.
    DataUri(String),
}

impl ImageSource {
    pub fn bytes(name: Option<String>, data: impl Into<Bytes>) -> Self {
        ImageSource::Bytes {
            name,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageLoader {
    max_bytes: usize,
}

impl ImageLoader {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Load an image chosen through a file picker.
    pub async fn select(&self, source: ImageSource) -> Result<ImageAsset, ScanError> {
        self.load(source, ImageOrigin::Select).await
    }

    /// Load an image dropped onto the drop zone.
    pub async fn drop_in(&self, source: ImageSource) -> Result<ImageAsset, ScanError> {
        self.load(source, ImageOrigin::Drop).await
    }

    /// Read the source and validate it as an image.
    pub async fn load(
        &self,
        source: ImageSource,
        origin: ImageOrigin,
    ) -> Result<ImageAsset, ScanError> {
        let (name, data, encoding, declared) = match source {
            ImageSource::Path(path) => {
                let data = tokio::fs::read(&path).await.map_err(|e| {
                    ScanError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
                })?;
                let hint = detect_mime_type(&path);
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                (name, Bytes::from(data), ImageEncoding::RawBytes, Some(hint.to_string()))
            }
            ImageSource::Bytes { name, data } => (name, data, ImageEncoding::RawBytes, None),
            ImageSource::DataUri(uri) => {
                let (mime, data) = data_uri::decode(&uri)
                    .map_err(|e| ScanError::InvalidInput(e.to_string()))?;
                (None, data, ImageEncoding::DataUri, Some(mime))
            }
        };

        let asset = self.convert(name, data, encoding, declared, origin)?;
        info!(
            name = asset.name.as_deref().unwrap_or("<unnamed>"),
            mime = %asset.mime_type,
            bytes = asset.len(),
            origin = ?origin,
            "Image loaded"
        );
        Ok(asset)
    }

    fn convert(
        &self,
        name: Option<String>,
        data: Bytes,
        encoding: ImageEncoding,
        declared: Option<String>,
        origin: ImageOrigin,
    ) -> Result<ImageAsset, ScanError> {
        if data.is_empty() {
            return Err(ScanError::InvalidInput("file is empty".into()));
        }
        if data.len() > self.max_bytes {
            return Err(ScanError::InvalidInput(format!(
                "file too large ({} bytes, maximum {} bytes)",
                data.len(),
                self.max_bytes
            )));
        }

        if let Some(declared) = declared.as_deref() {
            if declared.starts_with("image/") || declared == "application/octet-stream" {
                debug!(declared, "Declared MIME type");
            } else if encoding == ImageEncoding::DataUri {
                return Err(ScanError::InvalidInput(format!(
                    "data URI declares '{declared}', not an image"
                )));
            }
        }

        let mime = sniff_image_mime(&data)
            .ok_or_else(|| ScanError::InvalidInput("not a recognized image format".into()))?;

        if let Some(declared) = declared.as_deref() {
            if is_image(declared) && declared != mime {
                warn!(declared, detected = mime, "Image type does not match its name; trusting content");
            }
        }
        if !is_ocr_supported(mime) {
            return Err(ScanError::InvalidInput(format!("unsupported image format {mime}")));
        }

        Ok(ImageAsset {
            data,
            mime_type: mime.to_string(),
            encoding,
            origin,
            name,
        })
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGE_BYTES)
    }
}

/// Render an asset as a data URI for display.
pub fn to_data_uri(asset: &ImageAsset) -> String {
    data_uri::encode(&asset.mime_type, &asset.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

    #[tokio::test]
    async fn loads_png_bytes() {
        let loader = ImageLoader::default();
        let asset = loader
            .select(ImageSource::bytes(Some("label.png".into()), PNG))
            .await
            .unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(asset.origin, ImageOrigin::Select);
        assert_eq!(asset.encoding, ImageEncoding::RawBytes);
        assert_eq!(asset.name.as_deref(), Some("label.png"));
    }

    #[tokio::test]
    async fn select_and_drop_produce_the_same_asset() {
        let loader = ImageLoader::default();
        let picked = loader.select(ImageSource::bytes(None, PNG)).await.unwrap();
        let dropped = loader.drop_in(ImageSource::bytes(None, PNG)).await.unwrap();
        assert_eq!(picked.data, dropped.data);
        assert_eq!(picked.mime_type, dropped.mime_type);
        assert_eq!(dropped.origin, ImageOrigin::Drop);
    }

    #[tokio::test]
    async fn rejects_empty_file() {
        let err = ImageLoader::default()
            .select(ImageSource::bytes(None, Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(ref m) if m.contains("empty")));
    }

    #[tokio::test]
    async fn rejects_non_image() {
        let err = ImageLoader::default()
            .select(ImageSource::bytes(Some("notes.txt".into()), &b"Sugar: 40g"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let err = ImageLoader::new(8)
            .select(ImageSource::bytes(None, PNG))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(ref m) if m.contains("too large")));
    }

    #[tokio::test]
    async fn loads_data_uri() {
        let uri = data_uri::encode("image/png", PNG);
        let asset = ImageLoader::default()
            .drop_in(ImageSource::DataUri(uri.clone()))
            .await
            .unwrap();
        assert_eq!(asset.encoding, ImageEncoding::DataUri);
        assert_eq!(to_data_uri(&asset), uri);
    }

    #[tokio::test]
    async fn rejects_non_image_data_uri() {
        let uri = data_uri::encode("text/plain", PNG);
        let err = ImageLoader::default()
            .select(ImageSource::DataUri(uri))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(ref m) if m.contains("text/plain")));
    }

    #[tokio::test]
    async fn loads_from_path_and_trusts_content_over_extension() {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(PNG).unwrap();

        let asset = ImageLoader::default()
            .select(ImageSource::Path(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert!(asset.name.unwrap().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn missing_path_is_invalid_input() {
        let err = ImageLoader::default()
            .select(ImageSource::Path(PathBuf::from("/definitely/not/here.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(ref m) if m.contains("cannot read")));
    }
}
