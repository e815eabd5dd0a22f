//! MIME type detection for label images.
//!
//! Extension lookup gives a hint; magic bytes decide.

use std::path::Path;

/// Detect an image MIME type by file extension.
pub fn detect_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png"          => "image/png",
        "gif"          => "image/gif",
        "webp"         => "image/webp",
        "bmp"          => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "pbm" | "pgm" | "ppm" | "pnm" => "image/x-portable-anymap",
        "svg"          => "image/svg+xml",
        "avif"         => "image/avif",
        _              => "application/octet-stream",
    }
}

/// Identify an image from its leading bytes. `None` if the bytes are not a
/// raster format we know.
pub fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(data).ok()?;
    let mime = format.to_mime_type();
    is_image(mime).then_some(mime)
}

/// Whether a MIME type is for an image.
pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Formats the OCR engines can read directly.
pub fn is_ocr_supported(mime: &str) -> bool {
    matches!(
        mime,
        "image/jpeg" | "image/png" | "image/gif" | "image/webp"
        | "image/bmp" | "image/tiff" | "image/x-portable-anymap"
    )
}
