use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tender_storage::{FetchedResponse, HttpClientConfig, HttpFetcher, TokenBucketConfig};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::html::{
    find_control, has_element, inputs_near_label, link_by_text, looks_like_zip, resolve_click,
    tender_links, ClickAction, FormRequest, HtmlForm,
};
use crate::{DownloadedArchive, PortalConfig, PortalError, TenderPortal};

const SOURCE_ID: &str = "marchespublics";
const SEARCH_TAB_TEXT: &str = "Consultations en cours";
const CATEGORY_ID: &str = "ctl0_CONTENU_PAGE_AdvancedSearch_categorie";
const PUBLISHED_LABEL: &str = "Date de mise en ligne :";
const DEADLINE_LABEL: &str = "Date limite de remise des plis :";
const SEARCH_BUTTON: &str = r#"input[title="Lancer la recherche"]"#;
const PAGE_SIZE_ID: &str = "ctl0_CONTENU_PAGE_resultSearch_listePageSizeTop";
const PAGE_SIZE: &str = "500";
const DOWNLOAD_LINK_ID: &str = "ctl0_CONTENU_PAGE_linkDownloadDce";
const ACCEPT_TERMS_ID: &str = "ctl0_CONTENU_PAGE_EntrepriseFormulaireDemande_accepterConditions";
const NOM_ID: &str = "ctl0_CONTENU_PAGE_EntrepriseFormulaireDemande_nom";
const PRENOM_ID: &str = "ctl0_CONTENU_PAGE_EntrepriseFormulaireDemande_prenom";
const EMAIL_ID: &str = "ctl0_CONTENU_PAGE_EntrepriseFormulaireDemande_email";
const VALIDATE_ID: &str = "ctl0_CONTENU_PAGE_validateButton";
const COMPLETE_DOWNLOAD_ID: &str = "ctl0_CONTENU_PAGE_EntrepriseDownloadDce_completeDownload";

/// The portal's date inputs take `DD/MM/YYYY`.
pub fn portal_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Advanced search by publication date range and category, with the
/// submission-deadline range cleared.
pub fn search_request(
    html: &str,
    page_url: &str,
    category: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<FormRequest, PortalError> {
    let mut form = HtmlForm::parse(html)?;
    form.set_by_id(CATEGORY_ID, category)?;

    let published = inputs_near_label(html, PUBLISHED_LABEL)?;
    let [from, to, ..] = published.as_slice() else {
        return Err(PortalError::MissingElement(PUBLISHED_LABEL.to_string()));
    };
    form.set(from, &portal_date(start));
    form.set(to, &portal_date(end));

    for name in inputs_near_label(html, DEADLINE_LABEL)?.iter().take(2) {
        form.set(name, "");
    }

    let button = find_control(html, SEARCH_BUTTON)?
        .ok_or_else(|| PortalError::MissingElement(SEARCH_BUTTON.to_string()))?;
    form.press(&button);
    form.into_request(page_url)
}

/// Switches the result list to its largest page; `None` when the results
/// page has no page-size selector (no or few results).
pub fn page_size_request(html: &str, page_url: &str) -> Result<Option<FormRequest>, PortalError> {
    let mut form = HtmlForm::parse(html)?;
    let Some(select) = form.control(PAGE_SIZE_ID).cloned() else {
        return Ok(None);
    };
    form.set(&select.name, PAGE_SIZE);
    form.postback(&select.name);
    form.into_request(page_url).map(Some)
}

/// The archive request form: terms accepted and the operator's identity.
pub fn identity_request(
    html: &str,
    page_url: &str,
    config: &PortalConfig,
) -> Result<FormRequest, PortalError> {
    let mut form = HtmlForm::parse(html)?;
    form.check_by_id(ACCEPT_TERMS_ID)?;
    form.set_by_id(NOM_ID, &config.form_nom)?;
    form.set_by_id(PRENOM_ID, &config.form_prenom)?;
    form.set_by_id(EMAIL_ID, &config.form_email)?;
    form.press_id(VALIDATE_ID);
    form.into_request(page_url)
}

/// marchespublics.gov.ma over plain HTTP with a session cookie jar.
#[derive(Debug)]
pub struct MarchesPublicsPortal {
    config: PortalConfig,
    fetcher: HttpFetcher,
}

impl MarchesPublicsPortal {
    pub fn new(config: PortalConfig) -> Result<Self, PortalError> {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: config.download_timeout,
            user_agent: Some(config.user_agent.clone()),
            global_concurrency: 16,
            per_source_concurrency: 8,
            cookie_store: true,
            token_bucket: (!config.request_interval.is_zero()).then_some(TokenBucketConfig {
                capacity: 8,
                refill_every: config.request_interval,
            }),
            ..HttpClientConfig::default()
        })?;
        Ok(Self { config, fetcher })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    async fn get(&self, run_id: Uuid, url: &str, timeout: Duration) -> Result<FetchedResponse, PortalError> {
        Ok(self
            .fetcher
            .fetch_bytes_with_timeout(run_id, SOURCE_ID, url, timeout)
            .await?)
    }

    async fn submit(&self, run_id: Uuid, request: &FormRequest) -> Result<FetchedResponse, PortalError> {
        Ok(self
            .fetcher
            .post_form(run_id, SOURCE_ID, &request.action, &request.fields)
            .await?)
    }

    async fn follow(
        &self,
        run_id: Uuid,
        action: ClickAction,
        timeout: Duration,
    ) -> Result<FetchedResponse, PortalError> {
        match action {
            ClickAction::Navigate(url) => self.get(run_id, &url, timeout).await,
            ClickAction::Submit(request) => self.submit(run_id, &request).await,
        }
    }
}

#[async_trait]
impl TenderPortal for MarchesPublicsPortal {
    async fn collect_tender_links(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, PortalError> {
        let run_id = Uuid::new_v4();
        let timeout = self.config.page_timeout;
        let span = info_span!("portal_search", %run_id, %start, %end);
        async move {
            info!(
                category = %self.config.category,
                "searching {} -> {}",
                portal_date(start),
                portal_date(end)
            );
            let home = self.get(run_id, &self.config.homepage, timeout).await?;
            let search_url = link_by_text(&home.text_lossy(), &home.final_url, SEARCH_TAB_TEXT)
                .unwrap_or_else(|| self.config.search_url.clone());

            let search_page = self.get(run_id, &search_url, timeout).await?;
            let request = search_request(
                &search_page.text_lossy(),
                &search_page.final_url,
                &self.config.category,
                start,
                end,
            )?;
            let mut results = self.submit(run_id, &request).await?;

            if let Some(resize) = page_size_request(&results.text_lossy(), &results.final_url)? {
                results = self.submit(run_id, &resize).await?;
            }

            let links = tender_links(
                &results.text_lossy(),
                &results.final_url,
                &self.config.link_prefix,
            );
            info!(found = links.len(), "tender links collected");
            Ok::<_, PortalError>(links)
        }
        .instrument(span)
        .await
    }

    async fn download_archive(&self, url: &str) -> Result<DownloadedArchive, PortalError> {
        let run_id = Uuid::new_v4();
        let page_timeout = self.config.page_timeout;
        let span = info_span!("portal_download", %run_id, url);
        async move {
            let detail = self.get(run_id, url, page_timeout).await?;
            let detail_html = detail.text_lossy();
            if !has_element(&detail_html, DOWNLOAD_LINK_ID) {
                return Err(PortalError::MissingElement(DOWNLOAD_LINK_ID.to_string()));
            }
            let open_form = resolve_click(&detail_html, &detail.final_url, DOWNLOAD_LINK_ID)?;
            let form_page = self.follow(run_id, open_form, page_timeout).await?;
            debug!("request form loaded");

            let request = identity_request(&form_page.text_lossy(), &form_page.final_url, &self.config)?;
            let confirmation = self.submit(run_id, &request).await?;

            let download = resolve_click(
                &confirmation.text_lossy(),
                &confirmation.final_url,
                COMPLETE_DOWNLOAD_ID,
            )?;
            let archive = self
                .follow(run_id, download, self.config.download_timeout)
                .await?;
            if !looks_like_zip(&archive.body) {
                return Err(PortalError::NotAnArchive {
                    url: archive.final_url,
                    bytes: archive.body.len(),
                });
            }
            info!(bytes = archive.body.len(), "archive downloaded");
            Ok::<_, PortalError>(DownloadedArchive {
                url: url.to_string(),
                bytes: archive.body,
            })
        }
        .instrument(span)
        .await
    }
}
