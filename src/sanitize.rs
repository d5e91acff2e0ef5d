//! Turning raw submitted form values into storage-ready values.
//!
//! Every built-in sanitizer is total: any input shape, including a missing
//! value (`Value::Null`), has a defined output and nothing here fails.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::{FieldSpec, FieldType};

/// A custom sanitizer attached to a field, overriding the type-based one.
///
/// It receives the raw submitted value (`Value::Null` when the field was not
/// submitted) and the field name. Whatever it returns is stored verbatim.
pub trait Sanitize: Send + Sync {
    fn sanitize(&self, raw: &Value, name: &str) -> Value;
}

impl<F> Sanitize for F
where
    F: Fn(&Value, &str) -> Value + Send + Sync,
{
    fn sanitize(&self, raw: &Value, name: &str) -> Value {
        self(raw, name)
    }
}

const NEW_LINE: &str = "SETTEI-NEW-LINE";
const TABULATION: &str = "SETTEI-TABULATION";

static RE_SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*?>.*?</script>|<style[^>]*?>.*?</style>").unwrap()
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_LONE_LT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^a-zA-Z/!?]|$)").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n\t ]+").unwrap());
static RE_OCTET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[a-fA-F0-9]{2}").unwrap());
static RE_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static RE_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t\n\r\x0B\x0C]*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").unwrap()
});
static RE_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\n\r\x0B\x0C]*[+-]?\d+").unwrap());
static RE_URL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9\-~+_.?#=!&;,/:%@$|*'()\[\]\x{80}-\x{10FFFF}]").unwrap()
});
static RE_URL_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)%0[ad]").unwrap());
static RE_PHP_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9-]+?\.php").unwrap());

const URL_PROTOCOLS: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "irc6", "ircs", "gopher", "nntp",
    "feed", "telnet", "mms", "rtsp", "sms", "svn", "tel", "fax", "xmpp", "webcal", "urn",
];

/// Runs the sanitizer of a single field.
///
/// Returns `None` when the field produces no stored value at all, which is
/// the case for `action` fields and for `multi` fields without input or
/// options.
pub fn sanitize_field(name: &str, field: &FieldSpec, raw: &Value) -> Option<Value> {
    if let Some(sanitizer) = &field.sanitize {
        return Some(sanitizer.sanitize(raw, name));
    }

    let value = match &field.kind {
        FieldType::Checkbox => Value::from(u8::from(is_truthy(raw))),
        FieldType::Radio | FieldType::Select => Value::from(sanitize_key(&to_text(raw))),
        FieldType::Media => Value::from(absint(raw)),
        FieldType::Textarea => Value::from(sanitize_textarea(&to_text(raw))),
        FieldType::Multi => {
            let options = field.options()?;
            if !is_truthy(raw) {
                return None;
            }
            let toggles = sanitize_multi(raw, options.keys());
            Value::from(serde_json::to_string(&toggles).ok()?)
        }
        FieldType::Action => return None,
        FieldType::Email => Value::from(sanitize_email(&to_text(raw))),
        FieldType::Url => Value::from(sanitize_url(&to_text(raw))),
        FieldType::Number => float_value(floatval(raw)),
        FieldType::Text | FieldType::Other(_) => Value::from(sanitize_text(&to_text(raw))),
    };

    Some(value)
}

/// Loose truthiness of a submitted value.
///
/// `null`, `false`, `0`, `0.0`, `""`, `"0"` and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Scalar text of a submitted value. Collections have no text.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".into(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn float_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0.0))
}

/// Plain-text sanitization: strips tags, percent-encoded octets and control
/// characters, collapses whitespace runs and trims.
pub fn sanitize_text(text: &str) -> String {
    let mut text = if text.contains('<') {
        let text = RE_LONE_LT.replace_all(text, "&lt;$1");
        let text = RE_SCRIPT_STYLE.replace_all(&text, "");
        RE_TAG.replace_all(&text, "").into_owned()
    } else {
        text.to_string()
    };

    text = RE_WHITESPACE.replace_all(&text, " ").into_owned();
    text = RE_CONTROL.replace_all(&text, "").into_owned();

    // removing one octet can expose another, e.g. `%%4141`
    while RE_OCTET.is_match(&text) {
        text = RE_OCTET.replace_all(&text, "").into_owned();
    }

    text.trim().to_string()
}

/// Multi-line variant of [`sanitize_text`].
///
/// Line breaks and tabs are swapped for sentinel tokens so they survive the
/// whitespace collapse. Each line then loses its leading spaces and trailing
/// whitespace, while indentation tabs are kept. Blank lines at either end of
/// the text are dropped.
pub fn sanitize_textarea(text: &str) -> String {
    let text = text.replace('\n', NEW_LINE).replace('\t', TABULATION);
    let text = sanitize_text(&text);

    let lines: Vec<_> = text
        .split(NEW_LINE)
        .map(|line| {
            line.replace(TABULATION, "\t")
                .trim_start_matches(' ')
                .trim_end()
                .to_string()
        })
        .collect();

    lines.join("\n").trim_matches('\n').to_string()
}

/// Normalizes an identifier: lowercase, `[a-z0-9_-]` only.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Integer value of a submitted value, parsed from the leading digits.
pub fn intval(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => RE_INT
            .find(s)
            .and_then(|m| m.as_str().trim_start().parse::<i64>().ok())
            .unwrap_or(0),
        Value::Array(_) | Value::Object(_) => i64::from(is_truthy(value)),
    }
}

/// Non-negative integer, as used for attachment references.
pub fn absint(value: &Value) -> u64 {
    intval(value).unsigned_abs()
}

/// Floating-point value parsed from the leading number, `0.0` otherwise.
pub fn floatval(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => RE_FLOAT
            .find(s)
            .and_then(|m| m.as_str().trim_start().parse::<f64>().ok())
            .unwrap_or(0.0),
        other => intval(other) as f64,
    };

    if n.is_finite() { n } else { 0.0 }
}

/// Strips the characters an email address can't contain.
///
/// Returns an empty string when nothing resembling `local@domain.tld`
/// remains. The address is not otherwise validated.
pub fn sanitize_email(email: &str) -> String {
    let email = email.trim();

    if email.len() < 6 {
        return String::new();
    }

    let Some((local, domain)) = email.split_once('@') else {
        return String::new();
    };

    let local: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(*c))
        .collect();

    if local.is_empty() || domain.contains("..") {
        return String::new();
    }

    let subs: Vec<String> = domain
        .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '\0')
        .split('.')
        .map(|sub| {
            sub.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '\0')
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .filter(|sub| !sub.is_empty())
        .collect();

    if subs.len() < 2 {
        return String::new();
    }

    format!("{local}@{}", subs.join("."))
}

/// Cleans a URL for storage.
///
/// Disallowed characters are removed, a missing scheme becomes `http://`, and
/// any URL with a scheme outside the allowlist is rejected as empty.
pub fn sanitize_url(url: &str) -> String {
    let url = url.trim().replace(' ', "%20");
    let mut url = RE_URL_CHARS.replace_all(&url, "").into_owned();

    if url.is_empty() {
        return url;
    }

    if !url.to_ascii_lowercase().starts_with("mailto:") {
        while RE_URL_NEWLINE.is_match(&url) {
            url = RE_URL_NEWLINE.replace_all(&url, "").into_owned();
        }
    }

    url = url.replace(";//", "://");

    if !url.contains(':')
        && !url.starts_with(['/', '#', '?'])
        && !RE_PHP_FILE.is_match(&url)
    {
        url = format!("http://{url}");
    }

    if url.starts_with(['/', '#', '?']) {
        return url;
    }

    if let Some((scheme, _)) = url.split_once(':') {
        let scheme = scheme.to_ascii_lowercase();
        if !URL_PROTOCOLS.contains(&scheme.as_str()) {
            tracing::debug!("rejected URL with protocol '{}'", scheme);
            return String::new();
        }
    }

    url
}

/// Forces a 0/1 toggle for every option key.
///
/// The raw value is either a mapping of option key to a truthy/falsy value
/// or a list of the checked keys.
pub fn sanitize_multi<'a>(
    raw: &Value,
    keys: impl IntoIterator<Item = &'a String>,
) -> Map<String, Value> {
    keys.into_iter()
        .map(|key| {
            let checked = match raw {
                Value::Object(map) => map.get(key).is_some_and(is_truthy),
                Value::Array(list) => list.iter().any(|item| to_text(item) == *key),
                _ => false,
            };
            (key.clone(), Value::from(u8::from(checked)))
        })
        .collect()
}
