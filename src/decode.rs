//! Content-negotiated response decoding.
//!
//! The wire dispatch table from spec §4.3, expressed as the
//! type-parametric sink variants the Design Notes call for instead of a
//! dynamic `interface{}` out-parameter: the Executor picks a [`Sink`]
//! before the transport call, and [`decode`] resolves headers + body
//! bytes into a [`Decoded<T>`] according to that choice.

use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

/// The decode strategy the Executor selects for one Request, before the
/// transport call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// JSON body decoded into `T`.
    Json,
    /// XML body decoded into `T`.
    Xml,
    /// Raw bytes, no parsing. Requires the out-parameter to be a
    /// byte-sink; used for `application/octet-stream` and
    /// `Content-Disposition: attachment`.
    Bytes,
    /// Body treated as plain message text (`text/plain`, and the
    /// fallback branch of `text/html`).
    Text,
    /// Let the Content-Type header decide between Json/Xml/Bytes/Text/Html.
    Negotiated,
}

pub enum Decoded<T> {
    Typed(T),
    Bytes(Vec<u8>),
    Text(String),
    /// DELETE + 2xx: success, no body parsing performed even if a
    /// Content-Type was present.
    NoBody,
}

/// Dispatches `body` according to `sink`, consulting `content_type` only
/// when `sink` is [`Sink::Negotiated`].
///
/// `method` and `status` implement the DELETE-with-2xx short-circuit:
/// a successful DELETE never attempts to parse a body.
pub fn decode<T: DeserializeOwned>(
    sink: Sink,
    method: &str,
    status: u16,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Decoded<T>> {
    if method.eq_ignore_ascii_case("DELETE") && crate::status::is_success(status) {
        return Ok(Decoded::NoBody);
    }

    // An empty body on an otherwise-successful response has nothing to
    // negotiate a Content-Type against (some backends return 201/204
    // with no body and no header at all); treat it as the same no-body
    // success DELETE already gets rather than failing media negotiation.
    if body.is_empty() && crate::status::is_success(status) {
        return Ok(Decoded::NoBody);
    }

    let effective = match sink {
        Sink::Negotiated => negotiate(headers)?,
        other => other,
    };

    match effective {
        Sink::Json => decode_json(body).map(Decoded::Typed),
        Sink::Xml => decode_xml(body).map(Decoded::Typed),
        Sink::Bytes => Ok(Decoded::Bytes(body.to_vec())),
        Sink::Text => Ok(Decoded::Text(decode_text_or_html(headers, body))),
        Sink::Negotiated => unreachable!("negotiate() never returns Negotiated"),
    }
}

fn is_attachment(headers: &HeaderMap) -> bool {
    headers
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("attachment"))
        .unwrap_or(false)
}

fn content_type_main_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(reqwest::header::CONTENT_TYPE)?.to_str().ok()?;
    // Parameters (e.g. `; charset=utf-8`) are ignored for dispatch.
    Some(raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase())
}

fn negotiate(headers: &HeaderMap) -> Result<Sink> {
    if is_attachment(headers) {
        return Ok(Sink::Bytes);
    }

    let mime = content_type_main_value(headers).unwrap_or_default();
    match mime.as_str() {
        "application/json" => Ok(Sink::Json),
        "application/xml" | "text/xml" => Ok(Sink::Xml),
        "application/octet-stream" => Ok(Sink::Bytes),
        "text/html" => Ok(Sink::Text),
        "text/plain" => Ok(Sink::Text),
        "" => Err(Error::UnsupportedResponseMedia {
            content_type: "<none>".to_string(),
            method: String::new(),
            url: String::new(),
        }),
        other => Err(Error::UnsupportedResponseMedia {
            content_type: other.to_string(),
            method: String::new(),
            url: String::new(),
        }),
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::DecodeError {
        method: String::new(),
        url: String::new(),
        message: format!("JSON decode failed: {e}"),
    })
}

fn decode_xml<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    quick_xml::de::from_reader(body).map_err(|e| Error::DecodeError {
        method: String::new(),
        url: String::new(),
        message: format!("XML decode failed: {e}"),
    })
}

fn decode_text_or_html(headers: &HeaderMap, body: &[u8]) -> String {
    let raw = String::from_utf8_lossy(body).into_owned();
    match content_type_main_value(headers).as_deref() {
        Some("text/html") => extract_html_paragraphs(&raw).unwrap_or(raw),
        _ => raw,
    }
}

/// Extracts the text content of `<p>` elements, joined with `"; "`.
/// Returns `None` if no `<p>` text was found (caller falls back to the
/// raw body, per spec §4.3).
fn extract_html_paragraphs(html: &str) -> Option<String> {
    let mut paragraphs = Vec::new();
    let mut rest = html;
    while let Some(open) = rest.find("<p") {
        let after_open_tag = rest[open..].find('>')? + open + 1;
        let close_rel = rest[after_open_tag..].find("</p>")?;
        let inner = &rest[after_open_tag..after_open_tag + close_rel];
        let text = strip_tags(inner).trim().to_string();
        if !text.is_empty() {
            paragraphs.push(text);
        }
        rest = &rest[after_open_tag + close_rel + "</p>".len()..];
    }
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("; "))
    }
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Extracts a human-readable message from a failed response body for
/// the error taxonomy: JSON `errors` array -> first `description`, HTML
/// `<p>` text joined, XML flattened to text, plain text used verbatim.
pub fn extract_error_message(headers: &HeaderMap, body: &[u8]) -> String {
    let mime = content_type_main_value(headers).unwrap_or_default();
    let raw = String::from_utf8_lossy(body);

    if mime == "application/json" {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            if let Some(desc) = value
                .get("errors")
                .and_then(|e| e.as_array())
                .and_then(|a| a.first())
                .and_then(|first| first.get("description"))
                .and_then(|d| d.as_str())
            {
                return desc.to_string();
            }
        }
    }

    if mime == "text/html" {
        if let Some(joined) = extract_html_paragraphs(&raw) {
            return joined;
        }
    }

    if mime == "application/xml" || mime == "text/xml" {
        return strip_tags(&raw).split_whitespace().collect::<Vec<_>>().join(" ");
    }

    raw.trim().to_string()
}
