//! End-to-end tests for metadata enrichment against a live vision LLM.
//!
//! Fixtures are generated in memory, but every analysis is a real API call.
//! The tests are gated behind the `E2E_ENABLED` environment variable so they
//! do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture
//!
//! To pick a model:
//!   E2E_ENABLED=1 EDGEQUAKE_MODEL=gpt-4.1-mini cargo test --test e2e -- --nocapture

use fchanger::{
    Batch, ConversionOptions, ConverterConfig, EnrichmentConfig, LlmEnricher, MetadataEnricher,
    SourceImage, SupportedFormat,
};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and a provider can be resolved.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
        match LlmEnricher::from_config(enrichment_config()) {
            Ok(enricher) => enricher,
            Err(e) => {
                println!("SKIP — no LLM provider available: {e}");
                return;
            }
        }
    }};
}

/// Route library logs through the test harness; `RUST_LOG=fchanger=debug` for detail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn enrichment_config() -> EnrichmentConfig {
    let mut builder = EnrichmentConfig::builder().max_retries(1);
    if let Ok(model) = std::env::var("EDGEQUAKE_MODEL") {
        builder = builder.model(model);
    }
    if let Ok(provider) = std::env::var("EDGEQUAKE_PROVIDER") {
        builder = builder.provider_name(provider);
    }
    builder.build().expect("valid enrichment config")
}

/// A blue sky over a green field, large enough for a model to describe.
fn landscape_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(256, 160, |_, y| {
        if y < 100 {
            Rgba([90, 160, 235, 255])
        } else {
            Rgba([60, 150, 60, 255])
        }
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn assert_clean_filename(name: &str) {
    assert!(!name.is_empty(), "empty filename");
    assert!(name.len() <= 100, "filename too long: {name:?}");
    assert!(
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')),
        "unsanitised filename: {name:?}"
    );
    assert!(!name.starts_with('-') && !name.ends_with('-'), "{name:?}");
    assert!(!name.contains("--"), "{name:?}");
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_analyze_landscape() {
    let enricher = e2e_skip_unless_ready!();

    let record = enricher
        .analyze(&landscape_png(), "image/png")
        .await
        .expect("analysis failed");

    println!("filename:    {}", record.suggested_filename());
    println!("alt text:    {}", record.alt_text());
    println!("description: {}", record.description());

    assert_clean_filename(record.suggested_filename());
    assert!(!record.alt_text().is_empty());
    assert!(!record.description().is_empty());
}

#[tokio::test]
async fn test_smart_name_download() {
    let enricher = e2e_skip_unless_ready!();

    let (mut batch, _) =
        Batch::accept(vec![SourceImage::from_bytes("IMG_0001.png", landscape_png())]).unwrap();
    let plan = batch
        .prepare_run(ConversionOptions::new(SupportedFormat::Webp, 0.8), false)
        .unwrap();

    let config = ConverterConfig::default();
    let (outcome, failures) = tokio::join!(
        plan.execute(&config),
        batch.enrich_all(&enricher)
    );
    let report = batch.apply(outcome);

    assert!(failures.is_empty(), "enrichment failed: {failures:?}");
    assert_eq!(report.stats.converted, 1);

    let item = &batch.items()[0];
    assert!(item.use_smart_name());
    let download = item.download();
    println!("download: {}", download.filename);
    assert!(download.filename.ends_with(".webp"));
    assert_ne!(download.filename, "IMG_0001.webp");
    assert_clean_filename(download.filename.trim_end_matches(".webp"));
}
