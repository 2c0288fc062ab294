//! Conversion router: picks and runs the path for one request.
//!
//! ```text
//! image payload ─────────────────────────▶ raster::reencode ─▶ Binary
//! text payload, text/code/data target ───▶ service(target) ──▶ Text
//! text payload, pdf/docx/xlsx target ────▶ service(markdown) ─▶ encode ─▶ Binary
//! ```
//!
//! The router is stateless and never touches the history ledger. Source
//! detection happens before routing; a text request that still says `auto`
//! here is a caller bug and fails with [`ConvertError::UnresolvedSource`].

use crate::error::ConvertError;
use crate::formats::Format;
use crate::output::{ConversionOutcome, DataUri};
use crate::pipeline::llm::ConversionService;
use crate::pipeline::{encode, postprocess, raster};
use crate::progress::Stage;
use crate::request::{ContentKind, ConversionRequest, Payload};
use std::sync::Arc;
use tracing::debug;

/// Which path a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Decode and re-encode locally; the service is not called.
    ImageReencode,
    /// One service call straight into the target.
    Direct,
    /// Service call into markdown, then a local document encoder.
    ViaMarkdown { document: Format },
}

impl Route {
    /// Format the text service is asked to produce, if it is called at all.
    pub fn service_target(self, target: Format) -> Option<Format> {
        match self {
            Route::ImageReencode => None,
            Route::Direct => Some(target),
            Route::ViaMarkdown { .. } => Some(Format::Markdown),
        }
    }
}

/// Pure routing decision.
pub fn plan(kind: ContentKind, target: Format) -> Route {
    match kind {
        ContentKind::Image => Route::ImageReencode,
        ContentKind::Text if target.is_binary_document() => {
            Route::ViaMarkdown { document: target }
        }
        ContentKind::Text => Route::Direct,
    }
}

/// Runs requests along their [`Route`].
#[derive(Clone)]
pub struct ConversionRouter {
    service: Arc<dyn ConversionService>,
}

impl ConversionRouter {
    pub fn new(service: Arc<dyn ConversionService>) -> Self {
        Self { service }
    }

    /// Convert without stage reporting.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionOutcome, ConvertError> {
        self.convert_with_stages(request, &|_: Stage| {}).await
    }

    /// Convert, calling `on_stage` as the attempt enters each step.
    pub async fn convert_with_stages(
        &self,
        request: ConversionRequest,
        on_stage: &(dyn Fn(Stage) + Send + Sync),
    ) -> Result<ConversionOutcome, ConvertError> {
        let route = plan(request.content_kind(), request.target);
        debug!("Routing {} → {} via {:?}", request.source, request.target, route);

        match route {
            Route::ImageReencode => {
                on_stage(Stage::EncodingImage);
                let bytes = match request.payload {
                    Payload::Binary { bytes, .. } => bytes,
                    Payload::Text(t) => t.into_bytes(),
                };
                raster::reencode(bytes, request.target)
                    .await
                    .map(ConversionOutcome::Binary)
            }
            Route::Direct => {
                on_stage(Stage::Converting);
                let text = self.generate_text(&request, request.target).await?;
                Ok(ConversionOutcome::Text(text))
            }
            Route::ViaMarkdown { document } => {
                on_stage(Stage::Converting);
                let text = self.generate_text(&request, Format::Markdown).await?;
                on_stage(Stage::EncodingDocument);
                encode_on_blocking_pool(document, text)
                    .await
                    .map(ConversionOutcome::Binary)
            }
        }
    }

    /// Ask the service for `into`, then clean the answer.
    async fn generate_text(
        &self,
        request: &ConversionRequest,
        into: Format,
    ) -> Result<String, ConvertError> {
        let source = request.source.known().ok_or(ConvertError::UnresolvedSource)?;
        let content = request.payload.as_text();

        let raw = self
            .service
            .generate(source.id(), into.id(), &content)
            .await?;
        let text = postprocess::clean_output(&raw, into);
        debug!("Service answered {} bytes ({} after cleanup)", raw.len(), text.len());

        if text.trim().is_empty() {
            return Err(ConvertError::RemoteConversion {
                message: "service returned no usable text".into(),
            });
        }
        // Text outcomes must never be a binary data URI. A bare `data:` key
        // (YAML, TOML) is ordinary text.
        if DataUri::parse(text.trim()).is_ok() {
            return Err(ConvertError::RemoteConversion {
                message: "service returned a data URI instead of text".into(),
            });
        }
        Ok(text)
    }
}

async fn encode_on_blocking_pool(document: Format, text: String) -> Result<DataUri, ConvertError> {
    tokio::task::spawn_blocking(move || encode::encode_document(document, &text))
        .await
        .map_err(|e| ConvertError::Internal(format!("Encoder task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::SourceFormat;
    use crate::output::{PDF_MIME, XLSX_MIME};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Records every call and answers with a fixed string.
    struct ScriptedService {
        answer: Result<String, String>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedService {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(msg: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Err(msg.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversionService for ScriptedService {
        async fn generate(
            &self,
            source: &str,
            target: &str,
            content: &str,
        ) -> Result<String, ConvertError> {
            self.calls
                .lock()
                .unwrap()
                .push((source.into(), target.into(), content.into()));
            self.answer
                .clone()
                .map_err(|message| ConvertError::RemoteConversion { message })
        }

        async fn detect(&self, _sample: &str) -> Result<String, ConvertError> {
            Ok("txt".into())
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn plan_covers_every_target() {
        for d in crate::formats::list() {
            let route = plan(ContentKind::Text, d.format);
            if d.format.is_binary_document() {
                assert_eq!(route, Route::ViaMarkdown { document: d.format });
                assert_eq!(route.service_target(d.format), Some(Format::Markdown));
            } else {
                assert_eq!(route, Route::Direct);
                assert_eq!(route.service_target(d.format), Some(d.format));
            }
            assert_eq!(plan(ContentKind::Image, d.format), Route::ImageReencode);
        }
    }

    #[tokio::test]
    async fn document_targets_ask_for_markdown() {
        let svc = ScriptedService::answering("| a | b |\n|---|---|\n| 1 | 2 |");
        let router = ConversionRouter::new(svc.clone());
        let req = ConversionRequest::text(SourceFormat::Known(Format::Csv), Format::Pdf, "a,b\n1,2");

        let out = router.convert(req).await.unwrap();

        assert_eq!(
            svc.calls(),
            vec![("csv".to_string(), "markdown".to_string(), "a,b\n1,2".to_string())]
        );
        match out {
            ConversionOutcome::Binary(uri) => {
                assert_eq!(uri.media_type(), PDF_MIME);
                assert!(uri.bytes().starts_with(b"%PDF"));
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_text_is_cleaned() {
        let svc = ScriptedService::answering("```yaml\na: 1\n```");
        let router = ConversionRouter::new(svc.clone());
        let req = ConversionRequest::text(SourceFormat::Known(Format::Json), Format::Yaml, "{\"a\":1}");

        let out = router.convert(req).await.unwrap();

        assert_eq!(out, ConversionOutcome::Text("a: 1\n".into()));
        assert_eq!(svc.calls()[0].1, "yaml");
    }

    #[tokio::test]
    async fn images_never_call_the_service() {
        let svc = ScriptedService::answering("unused");
        let router = ConversionRouter::new(svc.clone());
        let req = ConversionRequest::binary(
            SourceFormat::Known(Format::Png),
            Format::Jpeg,
            png_bytes(),
            "image/png",
        );

        let out = router.convert(req).await.unwrap();

        assert!(svc.calls().is_empty());
        assert!(out.content().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn undecodable_image_fails() {
        let router = ConversionRouter::new(ScriptedService::answering("unused"));
        let req = ConversionRequest::binary(
            SourceFormat::Known(Format::Png),
            Format::Webp,
            b"\x89PNG but truncated".to_vec(),
            "image/png",
        );
        let err = router.convert(req).await.unwrap_err();
        assert!(matches!(err, ConvertError::ImageDecode { .. }));
    }

    #[tokio::test]
    async fn auto_source_is_rejected() {
        let svc = ScriptedService::answering("x");
        let router = ConversionRouter::new(svc.clone());
        let req = ConversionRequest::text(SourceFormat::Auto, Format::Json, "a: 1");
        let err = router.convert(req).await.unwrap_err();
        assert!(matches!(err, ConvertError::UnresolvedSource));
        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_answer_is_a_remote_failure() {
        let router = ConversionRouter::new(ScriptedService::answering("```\n\n```"));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Json), Format::Xml, "{}");
        let err = router.convert(req).await.unwrap_err();
        assert!(matches!(err, ConvertError::RemoteConversion { .. }));
    }

    #[tokio::test]
    async fn data_uri_answer_is_rejected() {
        let router = ConversionRouter::new(ScriptedService::answering("data:text/plain;base64,eA=="));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Txt), Format::Html, "x");
        let err = router.convert(req).await.unwrap_err();
        assert!(matches!(err, ConvertError::RemoteConversion { .. }));
    }

    #[tokio::test]
    async fn leading_data_key_is_plain_text() {
        let router = ConversionRouter::new(ScriptedService::answering("data:\n  - id: 1\n"));
        let req = ConversionRequest::text(
            SourceFormat::Known(Format::Json),
            Format::Yaml,
            r#"{"data":[{"id":1}]}"#,
        );
        let out = router.convert(req).await.unwrap();
        assert_eq!(out, ConversionOutcome::Text("data:\n  - id: 1\n".into()));
    }

    #[tokio::test]
    async fn data_uri_answer_with_trailing_newline_is_rejected() {
        let router =
            ConversionRouter::new(ScriptedService::answering("data:image/png;base64,iVBORw==\n"));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Txt), Format::Markdown, "x");
        let err = router.convert(req).await.unwrap_err();
        assert!(matches!(err, ConvertError::RemoteConversion { .. }));
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let router = ConversionRouter::new(ScriptedService::failing("quota exceeded"));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Csv), Format::Docx, "a");
        let err = router.convert(req).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn inconsistent_rows_still_make_a_workbook() {
        let router = ConversionRouter::new(ScriptedService::answering(
            "# Title\nname, age\nonly one field\n",
        ));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Txt), Format::Xlsx, "x");
        match router.convert(req).await.unwrap() {
            ConversionOutcome::Binary(uri) => {
                assert_eq!(uri.media_type(), XLSX_MIME);
                assert!(uri.bytes().starts_with(b"PK"));
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pdf_payload_is_sent_as_lossy_text() {
        let svc = ScriptedService::answering("# Doc");
        let router = ConversionRouter::new(svc.clone());
        let req = ConversionRequest::binary(
            SourceFormat::Known(Format::Pdf),
            Format::Markdown,
            b"%PDF-1.4 hello".to_vec(),
            PDF_MIME,
        );
        router.convert(req).await.unwrap();
        assert_eq!(svc.calls()[0].2, "%PDF-1.4 hello");
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let router = ConversionRouter::new(ScriptedService::answering("a,b"));
        let req = ConversionRequest::text(SourceFormat::Known(Format::Csv), Format::Xlsx, "a,b");
        let seen = Mutex::new(Vec::new());
        router
            .convert_with_stages(req, &|s| seen.lock().unwrap().push(s))
            .await
            .unwrap();
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![Stage::Converting, Stage::EncodingDocument]
        );
    }
}
