//! Classification and rasterisation: downloaded bytes → ordered page images.
//!
//! ## Classification by content
//!
//! Paperless serves originals with whatever name the user uploaded, so the
//! filename is useless. We look at the leading bytes instead: `%PDF` means a
//! paginated document, a recognised image signature means a single page.
//! A `Content-Type: application/pdf` header is honoured as a hint.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-bound rendering;
//! `tokio::task::spawn_blocking` keeps it off the async worker threads.
//! The library is bound per document; a missing library is an environment
//! fault, so image uploads keep working on hosts without pdfium.
//! Image decoding is CPU-bound too and goes the same way.

use crate::config::RasterSettings;
use crate::document::{DocumentKind, PageImage, RawDocument};
use crate::error::PipelineError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Decide whether `doc` is a single image or a paginated document.
pub fn classify(doc: &RawDocument) -> Result<DocumentKind, PipelineError> {
    if doc.bytes.starts_with(b"%PDF") {
        return Ok(DocumentKind::Paginated);
    }
    if image::guess_format(&doc.bytes).is_ok() {
        return Ok(DocumentKind::Image);
    }
    let says_pdf = doc
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/pdf"));
    if says_pdf {
        return Ok(DocumentKind::Paginated);
    }

    let mut magic = [0u8; 4];
    let n = doc.bytes.len().min(4);
    magic[..n].copy_from_slice(&doc.bytes[..n]);
    Err(PipelineError::data_fault(format!(
        "unrecognised file content (first bytes {magic:?}, {} bytes total)",
        doc.bytes.len()
    )))
}

/// Turn a downloaded document into page images, in page order.
///
/// All or nothing: a single unrenderable page fails the whole document.
pub async fn rasterize(
    doc: RawDocument,
    settings: RasterSettings,
) -> Result<Vec<PageImage>, PipelineError> {
    let kind = classify(&doc)?;
    debug!("Classified document as {:?}", kind);

    tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Image => decode_image(&doc.bytes).map(|image| {
            vec![PageImage {
                page_num: 1,
                image,
            }]
        }),
        DocumentKind::Paginated => render_pdf_blocking(&doc.bytes, &settings),
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Rasterise task panicked: {e}")))?
}

/// Decode a single-image upload.
fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::data_fault(format!("image decode failed: {e}")))?;
    debug!("Decoded image → {}x{} px", image.width(), image.height());
    Ok(image)
}

/// Load the pdfium shared library.
///
/// Order: explicit path, platform library name in the working directory,
/// system library search path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match lib_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PipelineError::environment_fault(format!("pdfium unavailable: {e}")))?;
    Ok(Pdfium::new(bindings))
}

/// Render every page of a PDF held in memory.
/// pdfium takes the render cap as `i32`; saturate rather than wrap.
fn pixel_cap(px: u32) -> i32 {
    i32::try_from(px).unwrap_or(i32::MAX)
}

fn render_pdf_blocking(
    bytes: &[u8],
    settings: &RasterSettings,
) -> Result<Vec<PageImage>, PipelineError> {
    let pdfium = bind_pdfium(settings.pdfium_lib_path.as_deref())?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.contains("Password") || err_str.contains("password") {
            PipelineError::data_fault("PDF is password-protected")
        } else {
            PipelineError::data_fault(format!("corrupt PDF: {err_str}"))
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(PipelineError::data_fault("PDF has no pages"));
    }
    info!("PDF loaded: {} pages", total_pages);

    let max_px = pixel_cap(settings.max_rendered_pixels);
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.dpi as f32 / 72.0)
        .set_maximum_width(max_px)
        .set_maximum_height(max_px);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::data_fault(format!("page {page_num} failed to render: {e:?}"))
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        results.push(PageImage { page_num, image });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        buf
    }

    fn raw(bytes: Vec<u8>, content_type: Option<&str>) -> RawDocument {
        RawDocument {
            bytes,
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn classify_pdf_by_signature() {
        let doc = raw(b"%PDF-1.7\n...".to_vec(), Some("application/octet-stream"));
        assert_eq!(classify(&doc).unwrap(), DocumentKind::Paginated);
    }

    #[test]
    fn classify_image_by_signature_not_header() {
        // The header lies; the bytes win.
        let doc = raw(png_bytes(4, 4), Some("application/pdf"));
        assert_eq!(classify(&doc).unwrap(), DocumentKind::Image);
    }

    #[test]
    fn classify_pdf_by_content_type_hint() {
        let doc = raw(b"\n\n%PDF-1.4".to_vec(), Some("application/pdf; charset=binary"));
        assert_eq!(classify(&doc).unwrap(), DocumentKind::Paginated);
    }

    #[test]
    fn classify_unknown_is_data_fault() {
        let doc = raw(b"hello world".to_vec(), Some("text/plain"));
        match classify(&doc).unwrap_err() {
            PipelineError::RasterizationFailed { fault, .. } => assert_eq!(fault, Fault::Data),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_image_yields_one_page() {
        let pages = rasterize(raw(png_bytes(20, 10), None), RasterSettings::default())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_num, 1);
        assert_eq!(pages[0].image.width(), 20);
        assert_eq!(pages[0].image.height(), 10);
    }

    #[test]
    fn pixel_cap_saturates_instead_of_wrapping() {
        assert_eq!(pixel_cap(4000), 4000);
        assert_eq!(pixel_cap(u32::MAX), i32::MAX);
        assert!(pixel_cap(i32::MAX as u32 + 1) > 0);
    }

    #[test]
    fn missing_pdfium_library_is_environment_fault() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so"))).unwrap_err();
        match err {
            PipelineError::RasterizationFailed { fault, .. } => {
                assert_eq!(fault, Fault::Environment)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_image_is_data_fault() {
        let mut bytes = png_bytes(20, 10);
        bytes.truncate(40);
        let err = rasterize(raw(bytes, None), RasterSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422, "got: {err}");
    }
}
