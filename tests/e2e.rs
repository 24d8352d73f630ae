//! End-to-end tests against the native engines.
//!
//! These need a pdfium shared library (PDFIUM_LIB_PATH, the working
//! directory, or the system search path) and a tesseract install with the
//! `eng` language pack. They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use paperless_ocr_webhook::document::RawDocument;
use paperless_ocr_webhook::pipeline::raster::rasterize;
use paperless_ocr_webhook::pipeline::recognize::recognize_pages;
use paperless_ocr_webhook::{first_line_title, OcrSettings, RasterSettings, TesseractRecognizer};

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter("paperless_ocr_webhook=debug")
            .with_test_writer()
            .try_init();
    };
}

fn raster_settings() -> RasterSettings {
    RasterSettings {
        pdfium_lib_path: std::env::var_os("PDFIUM_LIB_PATH").map(Into::into),
        ..RasterSettings::default()
    }
}

/// Build a minimal PDF with one US-Letter page per entry, each showing its
/// text in 36pt Helvetica.
fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    // Object numbers: 1 catalog, 2 pages, 3 font, then (page, content) pairs.
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        n
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());
    for (i, text) in pages.iter().enumerate() {
        let content_obj = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_obj} 0 R >>"
        ));
        let stream = format!("BT /F1 36 Tf 72 680 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    let xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    out.extend_from_slice(xref.as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_pages_render_in_order() {
    e2e_skip_unless_enabled!();
    let doc = RawDocument {
        bytes: text_pdf(&["One", "Two", "Three"]),
        content_type: Some("application/pdf".into()),
    };
    let pages = rasterize(doc, raster_settings()).await.expect("render");
    let numbers: Vec<usize> = pages.iter().map(|p| p.page_num).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    // 8.5in at 200 DPI.
    assert_eq!(pages[0].image.width(), 1700);
}

#[tokio::test]
async fn corrupt_pdf_is_unprocessable() {
    e2e_skip_unless_enabled!();
    let doc = RawDocument {
        bytes: b"%PDF-1.4\nthis is not a pdf body".to_vec(),
        content_type: None,
    };
    let err = rasterize(doc, raster_settings()).await.unwrap_err();
    assert_eq!(err.status_code(), 422, "got: {err}");
}

#[tokio::test]
async fn tesseract_reads_rendered_pdf() {
    e2e_skip_unless_enabled!();
    let settings = OcrSettings {
        lang: "eng".into(),
        auto_orient: false,
        ..OcrSettings::default()
    };
    let recognizer = TesseractRecognizer::new(&settings)
        .await
        .expect("tesseract with eng installed");

    let doc = RawDocument {
        bytes: text_pdf(&["INVOICE 123", "TOTAL 50"]),
        content_type: None,
    };
    let pages = rasterize(doc, raster_settings()).await.expect("render");
    let text = recognize_pages(&recognizer, &pages).await.expect("ocr");

    let full = text.full_text();
    println!("{full}");
    let invoice = full.find("INVOICE").expect("page 1 text");
    let total = full.find("TOTAL").expect("page 2 text");
    assert!(invoice < total, "page order lost: {full:?}");
    assert!(first_line_title(&full).contains("INVOICE"));
}
