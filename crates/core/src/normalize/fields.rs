//! JSON field extraction helpers.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

/// First pointer resolving to a non-blank string (numbers are stringified).
pub(super) fn first_string(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match body.pointer(p)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First pointer resolving to a number or a numeric string.
pub(super) fn first_f64(body: &Value, pointers: &[&str]) -> Option<f64> {
    pointers.iter().find_map(|p| match body.pointer(p)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// First pointer resolving to an integer or an integer string.
pub(super) fn first_i64(body: &Value, pointers: &[&str]) -> Option<i64> {
    pointers.iter().find_map(|p| match body.pointer(p)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_f64_to_i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Integral floats such as `7.0` within the exactly representable range.
fn whole_f64_to_i64(f: f64) -> Option<i64> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    (f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT).then(|| f as i64)
}

/// Genre-like list: plain strings or objects carrying a `name`/`title`.
/// Collects from every pointer, deduplicated in first-seen order.
pub(super) fn string_list(body: &Value, pointers: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for pointer in pointers {
        let Some(Value::Array(items)) = body.pointer(pointer) else {
            continue;
        };
        for item in items {
            let name = match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj
                    .get("name")
                    .or_else(|| obj.get("title"))
                    .and_then(Value::as_str),
                _ => None,
            };
            if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                if !out.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
                    out.push(name.to_string());
                }
            }
        }
    }
    out
}

/// Year from the leading digits of a date such as `1998-04-03`.
pub(super) fn year_from(date: &str) -> Option<i32> {
    let digits: String = date.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Minutes from strings like `24 min per ep` or `1 hr 55 min`.
pub(super) fn parse_duration_minutes(raw: &str) -> Option<u32> {
    let lower = raw.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let mut minutes = 0u32;
    let mut matched = false;

    for pair in tokens.windows(2) {
        let Ok(value) = pair[0].parse::<u32>() else {
            continue;
        };
        let add = if pair[1].starts_with("hr") || pair[1].starts_with("hour") {
            value.checked_mul(60)?
        } else if pair[1].starts_with("min") {
            value
        } else {
            continue;
        };
        minutes = minutes.checked_add(add)?;
        matched = true;
    }

    if !matched {
        return lower.trim().parse().ok();
    }
    (minutes > 0).then_some(minutes)
}

/// Strip HTML markup, turning line breaks into newlines.
pub(super) fn strip_html(raw: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(raw, "\n");
    let text = TAG_RE.replace_all(&with_breaks, "");
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_string_skips_null_and_blank() {
        let body = json!({ "a": null, "b": "", "c": " value " });
        assert_eq!(
            first_string(&body, &["/a", "/b", "/c"]).as_deref(),
            Some("value")
        );
        assert_eq!(first_string(&body, &["/missing"]), None);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let body = json!({ "rating": "82.51", "count": "1200", "id": 7 });
        assert_eq!(first_f64(&body, &["/rating"]), Some(82.51));
        assert_eq!(first_i64(&body, &["/count"]), Some(1200));
        assert_eq!(first_i64(&body, &["/id"]), Some(7));
        assert_eq!(first_i64(&body, &["/rating"]), None);
    }

    #[test]
    fn test_string_list_mixed_shapes() {
        let body = json!({
            "genres": [{ "name": "Action" }, "Drama", { "title": "action" }],
            "themes": [{ "name": "Military" }]
        });
        assert_eq!(
            string_list(&body, &["/genres", "/themes"]),
            vec!["Action", "Drama", "Military"]
        );
    }

    #[test]
    fn test_year_from_date() {
        assert_eq!(year_from("2009-04-05T00:00:00+00:00"), Some(2009));
        assert_eq!(year_from("1998"), Some(1998));
        assert_eq!(year_from("n/a"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_minutes("24 min per ep"), Some(24));
        assert_eq!(parse_duration_minutes("1 hr 55 min"), Some(115));
        assert_eq!(parse_duration_minutes("2 hr"), Some(120));
        assert_eq!(parse_duration_minutes("Unknown"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_none() {
        assert_eq!(parse_duration_minutes("99999999 hr"), None);
        assert_eq!(parse_duration_minutes("4294967295 min 1 min"), None);
        assert_eq!(parse_duration_minutes("99999999999999 min"), None);
    }

    #[test]
    fn test_first_i64_rejects_fractional_and_huge_floats() {
        let body = json!({ "a": 7.0, "b": 7.5, "c": 1e300 });
        assert_eq!(first_i64(&body, &["/a"]), Some(7));
        assert_eq!(first_i64(&body, &["/b"]), None);
        assert_eq!(first_i64(&body, &["/c"]), None);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("Line one<br><br />Line <b>two</b> &amp; more"),
            "Line one\n\nLine two & more"
        );
    }
}
