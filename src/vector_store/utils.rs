use regex::Regex;
use std::sync::OnceLock;

const MAX_MESSAGE_LEN: usize = 300;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"))
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid regex"))
}

/// Whether a Content-Type header value announces a JSON body.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("application/json") || ct.contains("+json")
        })
        .unwrap_or(false)
}

fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
    {
        return true;
    }
    let head = body.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Remove markup and collapse whitespace.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}

/// Pull a best-effort human-readable message out of an HTML error page:
/// the `<title>`, else the first `<p>`, else the stripped body text.
pub fn extract_html_message(body: &str) -> Option<String> {
    for re in [title_re(), paragraph_re()] {
        if let Some(caps) = re.captures(body) {
            let text = strip_tags(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    let stripped = strip_tags(body);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

fn json_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["message", "error", "detail"] {
        match value.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            // Some services nest: {"error": {"message": "..."}}
            Some(serde_json::Value::Object(obj)) => {
                if let Some(serde_json::Value::String(s)) = obj.get("message") {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Turn an error response into a diagnosable message, whatever content type
/// the remote service actually returned.
pub fn extract_error_message(status: u16, content_type: Option<&str>, body: &str) -> String {
    let detail = if is_json_content_type(content_type) || body.trim_start().starts_with('{') {
        json_message(body)
    } else if looks_like_html(content_type, body) {
        extract_html_message(body)
    } else {
        let trimmed = body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    match detail {
        Some(msg) => truncate(&format!("HTTP {status}: {msg}")),
        None => format!("HTTP {status} (empty body)"),
    }
}
