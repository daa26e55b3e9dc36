use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tender_core::OcrResponse;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{OcrEngine, OcrError, OcrServiceConfig, TesseractEngine};

#[derive(Clone)]
pub struct OcrState {
    pub engine: Arc<dyn OcrEngine>,
    pub default_lang: String,
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
    lang: String,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Image,
    AllPages,
    FirstPage,
}

type OcrReply = (StatusCode, Json<OcrResponse>);

pub fn app(state: OcrState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ocr", post(image_handler))
        .route("/ocr/pdf", post(pdf_handler))
        .route("/ocr/pdf/first-page", post(first_page_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(Arc::new(state))
}

pub async fn serve(config: OcrServiceConfig) -> anyhow::Result<()> {
    let engine = TesseractEngine::new(config.dpi);
    if !engine.is_ready() {
        warn!("tesseract or pdftoppm not found on PATH; OCR requests will fail");
    }
    let state = OcrState {
        engine: Arc::new(engine),
        default_lang: config.default_lang.clone(),
    };
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding OCR service on port {}", config.port))?;
    info!(port = config.port, "OCR service listening");
    axum::serve(listener, app(state, config.max_upload_bytes)).await?;
    Ok(())
}

/// `--- Page N ---` headed blocks separated by a blank line.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(idx, text)| format!("--- Page {} ---\n{}", idx + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn health_handler(State(state): State<Arc<OcrState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tender-ocr",
        "engine_ready": state.engine.is_ready(),
    }))
}

async fn image_handler(State(state): State<Arc<OcrState>>, multipart: Multipart) -> OcrReply {
    recognize(&state, multipart, Mode::Image).await
}

async fn pdf_handler(State(state): State<Arc<OcrState>>, multipart: Multipart) -> OcrReply {
    recognize(&state, multipart, Mode::AllPages).await
}

async fn first_page_handler(State(state): State<Arc<OcrState>>, multipart: Multipart) -> OcrReply {
    recognize(&state, multipart, Mode::FirstPage).await
}

fn rejected(status: StatusCode, error: impl Into<String>) -> OcrReply {
    (status, Json(OcrResponse::failed(error)))
}

async fn read_upload(multipart: &mut Multipart, default_lang: &str) -> Result<Upload, OcrReply> {
    let mut file = None;
    let mut lang = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(rejected(StatusCode::BAD_REQUEST, err.body_text())),
        };
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| rejected(StatusCode::BAD_REQUEST, err.body_text()))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("lang") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| rejected(StatusCode::BAD_REQUEST, err.body_text()))?;
                lang = Some(value.trim().to_string()).filter(|l| !l.is_empty());
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(rejected(StatusCode::BAD_REQUEST, "No file provided"));
    };
    if filename.is_empty() {
        return Err(rejected(StatusCode::BAD_REQUEST, "Empty filename"));
    }
    Ok(Upload {
        filename,
        bytes,
        lang: lang.unwrap_or_else(|| default_lang.to_string()),
    })
}

async fn recognize(state: &OcrState, mut multipart: Multipart, mode: Mode) -> OcrReply {
    let started = Instant::now();
    let upload = match read_upload(&mut multipart, &state.default_lang).await {
        Ok(upload) => upload,
        Err(reply) => return reply,
    };

    let result: Result<(String, u32), OcrError> = match mode {
        Mode::Image => state
            .engine
            .recognize_image(&upload.bytes, &upload.lang)
            .await
            .map(|text| (text, 1)),
        Mode::AllPages => state
            .engine
            .recognize_pdf(&upload.bytes, &upload.lang, false)
            .await
            .map(|pages| (join_pages(&pages), pages.len() as u32)),
        Mode::FirstPage => state
            .engine
            .recognize_pdf(&upload.bytes, &upload.lang, true)
            .await
            .and_then(|pages| pages.into_iter().next().ok_or(OcrError::NoPages))
            .map(|text| (text, 1)),
    };

    match result {
        Ok((text, pages)) => {
            let elapsed = started.elapsed().as_secs_f64();
            info!(
                file = %upload.filename,
                ?mode,
                pages,
                chars = text.len(),
                seconds = elapsed,
                "ocr completed"
            );
            (
                StatusCode::OK,
                Json(OcrResponse::recognized(text, pages, elapsed)),
            )
        }
        Err(err) => {
            warn!(file = %upload.filename, ?mode, error = %err, "ocr failed");
            rejected(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
