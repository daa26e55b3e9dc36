use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tender_ai::{AiError, TenderAnalyzer};
use tender_core::{
    AskAnswer, AvisMetadata, Citation, DocumentType, ExtractionMethod, Tender, TenderDocument,
    TrackedValue, SourceDocument, UniversalMetadata,
};
use tender_extract::DocumentExtractor;
use tender_portal::{DownloadedArchive, PortalError, TenderPortal};
use tender_storage::{MemoryTenderRepository, TenderRepository};
use tender_sync::{AppConfig, Platform};
use tower::ServiceExt;

use super::*;

struct CannedAnalyzer;

#[async_trait]
impl TenderAnalyzer for CannedAnalyzer {
    async fn extract_avis_metadata(
        &self,
        _avis_text: &str,
        _source_date: Option<&str>,
    ) -> Result<AvisMetadata, AiError> {
        Ok(AvisMetadata::default())
    }

    async fn extract_universal_metadata(
        &self,
        _documents: &[TenderDocument],
    ) -> Result<UniversalMetadata, AiError> {
        Ok(UniversalMetadata {
            institution_address: TrackedValue::new(
                "Avenue Hassan II, Rabat".to_string(),
                SourceDocument::Cps,
            ),
            ..UniversalMetadata::default()
        })
    }

    async fn ask(
        &self,
        _question: &str,
        _documents: &[TenderDocument],
    ) -> Result<AskAnswer, AiError> {
        Ok(AskAnswer {
            answer: "Le délai d'exécution est de 90 jours [Document: CPS, Article 7].".into(),
            citations: vec![Citation {
                document: "CPS".into(),
                section: Some("Article 7".into()),
            }],
        })
    }

    async fn classify_document(
        &self,
        _text: &str,
        _filename: &str,
        _is_scanned: bool,
    ) -> Result<DocumentType, AiError> {
        Ok(DocumentType::Unknown)
    }
}

struct EmptyPortal;

#[async_trait]
impl TenderPortal for EmptyPortal {
    async fn collect_tender_links(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<String>, PortalError> {
        Ok(Vec::new())
    }

    async fn download_archive(&self, url: &str) -> Result<DownloadedArchive, PortalError> {
        Err(PortalError::MissingElement(format!("no archive at {url}")))
    }
}

struct Harness {
    app: Router,
    repository: Arc<MemoryTenderRepository>,
    _artifacts: tempfile::TempDir,
}

fn harness() -> Harness {
    let artifacts = tempfile::tempdir().unwrap();
    let repository = Arc::new(MemoryTenderRepository::new());
    let config = AppConfig {
        artifacts_dir: artifacts.path().to_path_buf(),
        ..AppConfig::default()
    };
    let platform = Platform::assemble(
        config,
        repository.clone(),
        Arc::new(EmptyPortal),
        Arc::new(CannedAnalyzer),
        DocumentExtractor::new(),
    );
    Harness {
        app: app(AppState::from_platform(&platform)),
        repository,
        _artifacts: artifacts,
    }
}

async fn seed_tender(repository: &MemoryTenderRepository, listed: bool, documents: usize) -> Uuid {
    let mut tender = Tender::new_scraped(
        "https://www.marchespublics.gov.ma/index.php?page=entreprise.EntrepriseDetailConsultation&refConsultation=1",
        Some("2026-10-14".into()),
    );
    if listed {
        let mut avis = AvisMetadata::default();
        avis.reference_tender = TrackedValue::new("07/2026".to_string(), SourceDocument::Avis);
        tender.attach_avis_metadata(avis).unwrap();
    }
    repository.insert_tender(&tender).await.unwrap();
    for idx in 0..documents {
        let document = TenderDocument {
            id: Uuid::new_v4(),
            tender_id: tender.id,
            document_type: DocumentType::Cps,
            filename: format!("CPS_{idx}.pdf"),
            raw_text: "ARTICLE 7 - Délai d'exécution : 90 jours".into(),
            page_count: Some(12),
            extraction_method: ExtractionMethod::Digital,
            file_size_bytes: 48_213,
            mime_type: "application/pdf".into(),
            created_at: Utc::now(),
        };
        repository.insert_document(&document).await.unwrap();
    }
    tender.id
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_is_wrapped() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn tenders_list_filters_and_paginates() {
    let h = harness();
    seed_tender(&h.repository, true, 0).await;
    seed_tender(&h.repository, true, 0).await;
    seed_tender(&h.repository, false, 0).await;

    let (status, body) = send(&h.app, Method::GET, "/api/tenders?status=LISTED&per_page=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["items"][0]["status"], "LISTED");

    let (_, body) = send(&h.app, Method::GET, "/api/tenders?q=07/2026", None).await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn page_at_usize_max_is_an_empty_page() {
    let h = harness();
    seed_tender(&h.repository, true, 0).await;

    let (status, body) = send(
        &h.app,
        Method::GET,
        "/api/tenders?page=18446744073709551615",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["page"], u64::MAX);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    let (status, body) = send(&h.app, Method::GET, "/api/tenders?per_page=100000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["per_page"], 200);
}

#[tokio::test]
async fn malformed_list_query_is_rejected_in_envelope() {
    let h = harness();
    seed_tender(&h.repository, true, 0).await;

    let (status, body) = send(&h.app, Method::GET, "/api/tenders?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("unknown tender status"));

    let (status, body) = send(&h.app, Method::GET, "/api/tenders?page=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, body) = send(&h.app, Method::GET, "/api/tenders?page=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn status_filter_ignores_case() {
    let h = harness();
    seed_tender(&h.repository, true, 0).await;
    seed_tender(&h.repository, false, 0).await;

    for status_param in ["listed", "Listed", "LISTED"] {
        let (status, body) = send(
            &h.app,
            Method::GET,
            &format!("/api/tenders?status={status_param}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1, "status={status_param}");
    }
}

#[tokio::test]
async fn detail_lists_documents_without_text() {
    let h = harness();
    let id = seed_tender(&h.repository, true, 2).await;

    let (status, body) = send(&h.app, Method::GET, &format!("/api/tenders/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.to_string());
    assert_eq!(body["data"]["external_reference"], "07/2026");
    let documents = body["data"]["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents[0].get("raw_text").is_none());
    assert_eq!(documents[0]["document_type"], "CPS");
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        Method::GET,
        &format!("/api/tenders/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Tender not found");

    let (status, body) = send(&h.app, Method::GET, "/api/tenders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn analyze_respects_lifecycle() {
    let h = harness();
    let pending = seed_tender(&h.repository, false, 1).await;
    let (status, _) = send(&h.app, Method::POST, &format!("/api/tenders/{pending}/analyze"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let bare = seed_tender(&h.repository, true, 0).await;
    let (status, body) = send(&h.app, Method::POST, &format!("/api/tenders/{bare}/analyze"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No documents available for analysis");

    let ready = seed_tender(&h.repository, true, 1).await;
    let (status, body) = send(&h.app, Method::POST, &format!("/api/tenders/{ready}/analyze"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ANALYZED");
    assert_eq!(
        body["data"]["universal_metadata"]["institution_address"]["value"],
        "Avenue Hassan II, Rabat"
    );
    let stored = h.repository.get_tender(ready).await.unwrap().unwrap();
    assert!(stored.universal_metadata.is_some());
}

#[tokio::test]
async fn ask_returns_answer_with_citations() {
    let h = harness();
    let id = seed_tender(&h.repository, true, 1).await;

    let (status, body) = send(
        &h.app,
        Method::POST,
        &format!("/api/tenders/{id}/ask"),
        Some(json!({"question": "Quel est le délai d'exécution ?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["citations"][0]["document"], "CPS");

    let (status, _) = send(
        &h.app,
        Method::POST,
        &format!("/api/tenders/{id}/ask"),
        Some(json!({"question": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_ask_body_is_rejected_in_envelope() {
    let h = harness();
    let id = seed_tender(&h.repository, true, 1).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/tenders/{id}/ask"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn stats_count_by_status() {
    let h = harness();
    seed_tender(&h.repository, true, 0).await;
    seed_tender(&h.repository, false, 0).await;

    let (status, body) = send(&h.app, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["listed"], 1);
    assert_eq!(body["data"]["pending"], 1);
}

#[tokio::test]
async fn scraper_controls() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/api/scraper/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_running"], false);
    assert_eq!(body["data"]["current_phase"], "Idle");

    let (status, body) = send(&h.app, Method::POST, "/api/scraper/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stopped"], false);
    assert_eq!(body["message"], "No scraper running");

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/scraper/run",
        Some(json!({"target_date": "2026-10-10", "end_date": "2026-10-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/scraper/run",
        Some(json!({"target_date": "2026-10-10"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["target_date"], "2026-10-10");
    assert_eq!(body["data"]["end_date"], "2026-10-10");
}
