//! Page parsing for the portal's server-rendered (PRADO) forms.
//!
//! Everything here works on owned strings so callers never hold a parsed
//! document across an await point.

use std::collections::{HashMap, HashSet};

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::PortalError;

const POSTBACK_TARGET: &str = "PRADO_POSTBACK_TARGET";
const POSTBACK_PARAMETER: &str = "PRADO_POSTBACK_PARAMETER";

fn selector(raw: &str) -> Result<Selector, PortalError> {
    Selector::parse(raw).map_err(|e| PortalError::Selector(format!("{raw}: {e}")))
}

fn id_selector(id: &str) -> Result<Selector, PortalError> {
    selector(&format!(r#"[id="{id}"]"#))
}

/// Client ids are the server-side unique ids with `$` flattened to `_`.
pub fn prado_unique_id(client_id: &str) -> String {
    client_id.replace('_', "$")
}

pub fn resolve_url(base: &str, href: &str) -> Result<String, PortalError> {
    Url::parse(base)
        .and_then(|base| base.join(href.trim()))
        .map(String::from)
        .map_err(|e| PortalError::InvalidUrl(format!("{href}: {e}")))
}

/// A named form control, as found by id or selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub name: String,
    pub value: String,
    pub kind: String,
}

impl Control {
    fn from_element(element: ElementRef<'_>) -> Option<Self> {
        let attrs = element.value();
        let name = attrs.attr("name")?.to_string();
        let kind = match attrs.name() {
            "input" => attrs.attr("type").unwrap_or("text").to_ascii_lowercase(),
            other => other.to_string(),
        };
        let value = match kind.as_str() {
            "select" => selected_option(element),
            "textarea" => element.text().collect(),
            "checkbox" | "radio" => attrs.attr("value").unwrap_or("on").to_string(),
            _ => attrs.attr("value").unwrap_or_default().to_string(),
        };
        Some(Self { name, value, kind })
    }

    fn is_button(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "submit" | "image" | "button" | "reset" | "file"
        )
    }
}

fn selected_option(select: ElementRef<'_>) -> String {
    let Ok(options) = Selector::parse("option") else {
        return String::new();
    };
    let mut all = select.select(&options);
    let chosen = select
        .select(&options)
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| all.next());
    chosen
        .map(|o| {
            o.value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| o.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

/// The submittable state of the first form on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlForm {
    action: Option<String>,
    fields: Vec<(String, String)>,
    controls_by_id: HashMap<String, Control>,
}

impl HtmlForm {
    pub fn parse(html: &str) -> Result<Self, PortalError> {
        let document = Html::parse_document(html);
        let forms = selector("form")?;
        let controls = selector("input, select, textarea")?;
        let form = document.select(&forms).next();
        let elements: Vec<ElementRef<'_>> = match form {
            Some(form) => form.select(&controls).collect(),
            None => document.select(&controls).collect(),
        };

        let mut parsed = Self {
            action: form
                .and_then(|f| f.value().attr("action"))
                .map(str::to_string),
            ..Self::default()
        };
        for element in elements {
            let Some(control) = Control::from_element(element) else {
                continue;
            };
            let submitted = match control.kind.as_str() {
                "checkbox" | "radio" => element.value().attr("checked").is_some(),
                _ => !control.is_button(),
            };
            if submitted {
                parsed.fields.push((control.name.clone(), control.value.clone()));
            }
            if let Some(id) = element.value().attr("id") {
                parsed.controls_by_id.insert(id.to_string(), control);
            }
        }
        Ok(parsed)
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls_by_id.get(id)
    }

    /// Replaces every value submitted under `name` with a single one.
    pub fn set(&mut self, name: &str, value: &str) {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), value.to_string()));
    }

    pub fn set_by_id(&mut self, id: &str, value: &str) -> Result<(), PortalError> {
        let name = self.name_for(id)?;
        self.set(&name, value);
        Ok(())
    }

    pub fn check_by_id(&mut self, id: &str) -> Result<(), PortalError> {
        let control = self
            .control(id)
            .cloned()
            .ok_or_else(|| PortalError::MissingElement(id.to_string()))?;
        self.set(&control.name, &control.value);
        Ok(())
    }

    pub fn postback(&mut self, target: &str) {
        self.set(POSTBACK_TARGET, target);
        self.set(POSTBACK_PARAMETER, "");
    }

    /// Submits through a button, the way a click would.
    pub fn press(&mut self, button: &Control) {
        self.postback(&button.name);
        match button.kind.as_str() {
            "image" => {
                self.set(&format!("{}.x", button.name), "0");
                self.set(&format!("{}.y", button.name), "0");
            }
            "submit" | "button" => self.set(&button.name, &button.value),
            _ => {}
        }
    }

    /// Presses a control by id; elements without a form control (postback
    /// links) fall back to their unique id.
    pub fn press_id(&mut self, id: &str) {
        match self.control(id).cloned() {
            Some(control) => self.press(&control),
            None => self.postback(&prado_unique_id(id)),
        }
    }

    fn name_for(&self, id: &str) -> Result<String, PortalError> {
        self.control(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| PortalError::MissingElement(id.to_string()))
    }

    pub fn into_request(self, page_url: &str) -> Result<FormRequest, PortalError> {
        let action = resolve_url(page_url, self.action.as_deref().unwrap_or(page_url))?;
        Ok(FormRequest {
            action,
            fields: self.fields,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRequest {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

/// What following a link or button on a page amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Navigate(String),
    Submit(FormRequest),
}

pub fn has_element(html: &str, id: &str) -> bool {
    let document = Html::parse_document(html);
    id_selector(id)
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false)
}

pub fn resolve_click(html: &str, page_url: &str, id: &str) -> Result<ClickAction, PortalError> {
    let (href, script_target) = {
        let document = Html::parse_document(html);
        let sel = id_selector(id)?;
        let element = document
            .select(&sel)
            .next()
            .ok_or_else(|| PortalError::MissingElement(id.to_string()))?;
        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.starts_with('#') && !h.starts_with("javascript:"))
            .map(str::to_string);
        let script_target = element.value().attr("onclick").and_then(postback_target);
        (href, script_target)
    };
    if let Some(href) = href {
        return Ok(ClickAction::Navigate(resolve_url(page_url, &href)?));
    }
    let mut form = HtmlForm::parse(html)?;
    match script_target {
        Some(target) if form.control(id).is_none() => form.postback(&target),
        _ => form.press_id(id),
    }
    Ok(ClickAction::Submit(form.into_request(page_url)?))
}

/// First quoted argument of a `PostBack(...)` call in an onclick handler.
fn postback_target(script: &str) -> Option<String> {
    let args = &script[script.find("PostBack(")? + "PostBack(".len()..];
    let args = args.trim_start();
    let quote = args.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &args[1..];
    rest.find(quote).map(|end| rest[..end].to_string())
}

/// First control matching a CSS selector.
pub fn find_control(html: &str, css: &str) -> Result<Option<Control>, PortalError> {
    let document = Html::parse_document(html);
    let sel = selector(css)?;
    Ok(document.select(&sel).find_map(Control::from_element))
}

/// Names of the inputs sharing a parent with the element whose own text is
/// `label` (e.g. a date range "from"/"to" pair).
pub fn inputs_near_label(html: &str, label: &str) -> Result<Vec<String>, PortalError> {
    let document = Html::parse_document(html);
    let all = selector("*")?;
    let inputs = selector("input")?;
    let Some(label_element) = document.select(&all).find(|el| own_text(*el) == label) else {
        return Ok(Vec::new());
    };
    let Some(parent) = label_element.parent().and_then(ElementRef::wrap) else {
        return Ok(Vec::new());
    };
    Ok(parent
        .select(&inputs)
        .filter_map(|input| input.value().attr("name"))
        .map(str::to_string)
        .collect())
}

fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .map(|text| &**text)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Absolute link whose text contains `text`.
pub fn link_by_text(html: &str, page_url: &str, text: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]").ok()?;
    let href = document
        .select(&anchors)
        .find(|a| a.text().collect::<String>().contains(text))?
        .value()
        .attr("href")?
        .to_string();
    resolve_url(page_url, &href).ok()
}

/// Absolute tender links starting with `prefix`, de-duplicated in page order.
pub fn tender_links(html: &str, page_url: &str, prefix: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(anchors) = selector("a[href]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_url(page_url, href).ok())
        .filter(|url| url.starts_with(prefix))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}
