//! Conversion pipeline wiring: service resolution, rendering, content parts
//! and progress bands, with a fake renderer and a mock provider.

mod common;

use common::*;
use pdf2md_queue::{
    AppSettings, ConversionPipeline, Converter, PipelineConfig, Pdf2MdError, ServiceKind,
    ServicePatch,
};
use std::sync::Arc;

fn pipeline(renderer: Arc<FakeRenderer>) -> ConversionPipeline {
    ConversionPipeline::with_renderer(PipelineConfig::default(), renderer)
}

#[tokio::test]
async fn converts_with_custom_openai_service() {
    let mock = MockProvider::new(openai_completion("```markdown\n# Doc\n\n\n\n\nText\n```"));
    let base = serve(mock.clone()).await;
    let renderer = FakeRenderer::pages(3);
    let settings = openai_settings(&base);

    let (sink, seen) = recording_sink();
    let markdown = pipeline(renderer.clone())
        .convert(&pdf("doc.pdf"), &settings, sink)
        .await
        .unwrap();

    assert_eq!(markdown, "# Doc\n\nText");
    assert_eq!(renderer.call_count(), 1);
    assert_eq!(mock.call_count(), 1);

    let body = mock.last_request().unwrap();
    let user = body["messages"][1]["content"].as_array().unwrap();
    assert_eq!(user.len(), 4, "intro + 3 pages");
    let intro = user[0]["text"].as_str().unwrap();
    assert!(intro.contains('3'), "intro should name the page count: {intro}");
    let urls: Vec<&str> = user[1..]
        .iter()
        .map(|p| p["image_url"]["url"].as_str().unwrap())
        .collect();
    assert_eq!(
        urls,
        [
            "data:image/png;base64,UEFHRS1",
            "data:image/png;base64,UEFHRS2",
            "data:image/png;base64,UEFHRS3",
        ]
    );

    let seen = seen.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not strictly increasing: {seen:?}");
    assert!(seen.iter().any(|&p| p > 0 && p <= 40), "no render progress: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn temperature_and_output_length_reach_the_wire() {
    let mock = MockProvider::new(openai_completion("ok"));
    let base = serve(mock.clone()).await;
    let mut settings = openai_settings(&base);
    settings.set_temperature(1.5);
    settings.set_output_length(1234);
    settings.system_prompt = "Only tables.".into();

    pipeline(FakeRenderer::pages(1))
        .convert(&pdf("t.pdf"), &settings, Arc::new(|_: u8| {}))
        .await
        .unwrap();

    let body = mock.last_request().unwrap();
    assert_eq!(body["temperature"], 1.5);
    assert_eq!(body["max_tokens"], 1234);
    assert_eq!(body["messages"][0]["content"], "Only tables.");
}

#[tokio::test]
async fn missing_credential_fails_before_rendering() {
    let mock = MockProvider::new(openai_completion("never"));
    let base = serve(mock.clone()).await;
    let mut settings = openai_settings(&base);
    let id = settings.active_service_id.clone();
    settings
        .update_service(&id, ServicePatch { api_key: Some("   ".into()), ..Default::default() })
        .unwrap();

    let renderer = FakeRenderer::pages(2);
    let err = pipeline(renderer.clone())
        .convert(&pdf("a.pdf"), &settings, Arc::new(|_: u8| {}))
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2MdError::MissingCredential { ref service } if *service == id));
    assert!(err.is_configuration());
    assert_eq!(renderer.call_count(), 0);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn builtin_default_has_no_key() {
    let renderer = FakeRenderer::pages(1);
    let err = pipeline(renderer.clone())
        .convert(&pdf("a.pdf"), &AppSettings::default(), Arc::new(|_: u8| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::MissingCredential { ref service } if service == "openai"));
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn unknown_active_service_is_reported() {
    let mut settings = AppSettings::default();
    settings.active_service_id = "vanished".into();

    let renderer = FakeRenderer::pages(1);
    let err = pipeline(renderer.clone())
        .convert(&pdf("a.pdf"), &settings, Arc::new(|_: u8| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::NoActiveService));
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn renderer_errors_become_render_failures() {
    let mock = MockProvider::new(openai_completion("never"));
    let base = serve(mock.clone()).await;
    let settings = openai_settings(&base);

    let renderer = FakeRenderer::failing(|| Pdf2MdError::PasswordRequired {
        filename: "locked.pdf".into(),
    });
    let err = pipeline(renderer)
        .convert(&pdf("locked.pdf"), &settings, Arc::new(|_: u8| {}))
        .await
        .unwrap_err();

    match err {
        Pdf2MdError::RenderFailed { detail } => assert!(detail.contains("encrypted"), "{detail}"),
        other => panic!("expected RenderFailed, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn zero_pages_is_a_render_failure() {
    let mock = MockProvider::new(openai_completion("never"));
    let base = serve(mock.clone()).await;

    let err = pipeline(FakeRenderer::pages(0))
        .convert(&pdf("empty.pdf"), &openai_settings(&base), Arc::new(|_: u8| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::RenderFailed { .. }));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn placeholder_is_reloaded_from_disk() {
    let mock = MockProvider::new(openai_completion("# Reloaded"));
    let base = serve(mock).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kept.pdf");
    std::fs::write(&path, b"%PDF-1.5\nbody").unwrap();

    let file = pdf2md_queue::SourceFile::placeholder("kept.pdf", 13, "application/pdf", Some(path));
    let markdown = pipeline(FakeRenderer::pages(1))
        .convert(&file, &openai_settings(&base), Arc::new(|_: u8| {}))
        .await
        .unwrap();
    assert_eq!(markdown, "# Reloaded");
}

#[tokio::test]
async fn custom_kind_speaks_openai_format() {
    let mock = MockProvider::new(openai_completion("custom ok"));
    let base = serve(mock.clone()).await;
    let mut settings = settings_for(&format!("{base}/v1/"), ServiceKind::Custom);
    settings.stream = false;

    let markdown = pipeline(FakeRenderer::pages(1))
        .convert(&pdf("c.pdf"), &settings, Arc::new(|_: u8| {}))
        .await
        .unwrap();
    assert_eq!(markdown, "custom ok");
    assert!(mock.last_request().unwrap()["messages"].is_array());
}

#[test]
fn read_pdf_rejects_non_pdf_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"hello world").unwrap();

    let result = tokio_test::block_on(pdf2md_queue::read_pdf(&path));
    assert!(matches!(result, Err(Pdf2MdError::NotAPdf { .. })));

    let missing = tokio_test::block_on(pdf2md_queue::read_pdf(dir.path().join("nope.pdf")));
    assert!(matches!(missing, Err(Pdf2MdError::FileNotFound { .. })));
}
