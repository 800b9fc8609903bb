//! HTML inspection for the login pages: form discovery, successful-control
//! collection and meta-refresh targets.
//!
//! Everything here is a pure function of a page body. Parsed documents are
//! never held across requests; callers get owned values back.

use scraper::{ElementRef, Html};
use url::Url;

/// How a form is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// A form as the browser would submit it
#[derive(Debug, Clone)]
pub struct FormSubmission {
    pub action: Url,
    pub method: FormMethod,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// Set the value of an existing control. Returns false if the form has
    /// no control with that name.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => {
                field.1 = value.to_string();
                true
            }
            None => false,
        }
    }
}

fn elements<'a>(root: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name().eq_ignore_ascii_case(tag))
}

fn named_form<'a>(document: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    elements(document.root_element(), "form").find(|form| {
        let el = form.value();
        el.attr("name") == Some(name) || el.attr("id") == Some(name)
    })
}

/// Whether the page contains a form with the given name (or id)
pub fn has_form(html: &str, name: &str) -> bool {
    let document = Html::parse_document(html);
    named_form(&document, name).is_some()
}

/// Find a form by name (or id) and collect its successful controls.
///
/// The action is resolved against `base`; a missing or empty action submits
/// back to `base`.
pub fn find_form(
    html: &str,
    name: &str,
    base: &Url,
) -> Result<Option<FormSubmission>, url::ParseError> {
    let document = Html::parse_document(html);
    let Some(form) = named_form(&document, name) else {
        return Ok(None);
    };

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => base.join(action)?,
        _ => base.clone(),
    };
    let method = match form.value().attr("method") {
        Some(m) if m.trim().eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };

    let mut fields = Vec::new();
    for control in form.descendants().filter_map(ElementRef::wrap) {
        let el = control.value();
        let Some(field_name) = el.attr("name") else {
            continue;
        };
        if el.attr("disabled").is_some() {
            continue;
        }
        let value = match el.name() {
            "input" => {
                let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => continue,
                    "checkbox" | "radio" => {
                        if el.attr("checked").is_none() {
                            continue;
                        }
                        el.attr("value").unwrap_or("on").to_string()
                    }
                    _ => el.attr("value").unwrap_or_default().to_string(),
                }
            }
            "textarea" => control.text().collect::<String>(),
            "select" => {
                let options: Vec<ElementRef> = elements(control, "option").collect();
                let chosen = options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| options.first());
                match chosen {
                    Some(option) => option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| option.text().collect::<String>().trim().to_string()),
                    None => continue,
                }
            }
            _ => continue,
        };
        fields.push((field_name.to_string(), value));
    }

    Ok(Some(FormSubmission {
        action,
        method,
        fields,
    }))
}

/// Target of a `<meta http-equiv="refresh" content="N; url=...">` tag.
///
/// A refresh without a URL (reload of the same page) yields `None`.
pub fn meta_refresh_target(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let content = elements(document.root_element(), "meta")
        .filter(|meta| {
            meta.value()
                .attr("http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
        })
        .find_map(|meta| meta.value().attr("content").map(str::to_string))?;

    let (_, rest) = content.split_once([';', ','])?;
    let rest = rest.trim();
    let target = match rest.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url") => {
            rest[3..].trim_start().strip_prefix('=')?.trim()
        }
        _ => rest,
    };
    let target = target.trim_matches(|c| c == '\'' || c == '"').trim();
    if target.is_empty() {
        return None;
    }
    base.join(target).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://auth.example.test/login/start").unwrap()
    }

    const SIGN_IN_PAGE: &str = r#"
        <html><body>
          <form name="search" action="/search"><input name="q"></form>
          <form name="signIn" method="POST" action="/ap/signin">
            <input type="hidden" name="appActionToken" value="tok123">
            <input type="email" name="email">
            <input type="password" name="password">
            <input type="checkbox" name="rememberMe" value="true">
            <input type="checkbox" name="create" value="0" checked>
            <select name="locale">
              <option value="de">Deutsch</option>
              <option value="en" selected>English</option>
            </select>
            <input type="text" name="ignored" value="x" disabled>
            <input type="submit" name="go" value="Sign in">
          </form>
        </body></html>
    "#;

    #[test]
    fn test_find_form_collects_successful_controls() {
        let form = find_form(SIGN_IN_PAGE, "signIn", &base()).unwrap().unwrap();
        assert_eq!(form.action.as_str(), "https://auth.example.test/ap/signin");
        assert_eq!(form.method, FormMethod::Post);
        assert_eq!(
            form.fields,
            vec![
                ("appActionToken".to_string(), "tok123".to_string()),
                ("email".to_string(), String::new()),
                ("password".to_string(), String::new()),
                ("create".to_string(), "0".to_string()),
                ("locale".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_fills_existing_fields_only() {
        let mut form = find_form(SIGN_IN_PAGE, "signIn", &base()).unwrap().unwrap();
        assert!(form.set("email", "me@example.test"));
        assert!(!form.set("nope", "x"));
        assert!(form
            .fields
            .contains(&("email".to_string(), "me@example.test".to_string())));
    }

    #[test]
    fn test_find_form_missing() {
        assert!(find_form("<html></html>", "signIn", &base()).unwrap().is_none());
        assert!(!has_form("<p>hi</p>", "consent-form"));
    }

    #[test]
    fn test_form_without_action_submits_to_page() {
        let html = r#"<form id="consent-form"><input name="a" value="1"></form>"#;
        let form = find_form(html, "consent-form", &base()).unwrap().unwrap();
        assert_eq!(form.action, base());
        assert_eq!(form.method, FormMethod::Get);
        assert!(has_form(html, "consent-form"));
    }

    #[test]
    fn test_meta_refresh_variants() {
        let page = |content: &str| {
            format!(r#"<html><head><meta http-equiv="Refresh" content="{content}"></head></html>"#)
        };
        assert_eq!(
            meta_refresh_target(&page("0; url=/next"), &base()).unwrap().as_str(),
            "https://auth.example.test/next"
        );
        assert_eq!(
            meta_refresh_target(&page("3;URL='https://other.test/a'"), &base())
                .unwrap()
                .as_str(),
            "https://other.test/a"
        );
        assert_eq!(
            meta_refresh_target(&page("0; done"), &base()).unwrap().as_str(),
            "https://auth.example.test/login/done"
        );
        assert!(meta_refresh_target(&page("5"), &base()).is_none());
        assert!(meta_refresh_target("<html></html>", &base()).is_none());
    }
}
