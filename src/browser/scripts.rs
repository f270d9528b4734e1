//! In-page scripts used by the Chromium session.
//!
//! Arguments are embedded as JSON string literals so selectors and values
//! containing quotes cannot break out of the script.

fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

const IS_VISIBLE_FN: &str = r#"function(el) {
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

/// `true` when the first element matching `selector` is rendered
pub fn element_visible(selector: &str) -> String {
    format!(
        "(() => {{ const visible = {}; return visible(document.querySelector({})); }})()",
        IS_VISIBLE_FN,
        js_str(selector)
    )
}

/// `true` when an element matching `selector` is in the document
pub fn element_attached(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_str(selector))
}

/// `true` when some visible element's rendered text matches `text`.
///
/// Text is whitespace-normalized on both sides. Loose matching is a
/// case-insensitive substring test; exact matching compares the whole
/// element text. Same rules as [`text_matches`].
pub fn text_visible(text: &str, exact: bool) -> String {
    format!(
        r#"(() => {{
    const visible = {visible};
    const normalize = s => (s || '').replace(/\s+/g, ' ').trim();
    const exact = {exact};
    const needle = exact ? normalize({text}) : normalize({text}).toLowerCase();
    for (const el of document.querySelectorAll('body, body *')) {{
        if (['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'].includes(el.tagName)) continue;
        const raw = normalize(el.innerText);
        const hay = exact ? raw : raw.toLowerCase();
        if ((exact ? hay === needle : hay.includes(needle)) && visible(el)) return true;
    }}
    return false;
}})()"#,
        visible = IS_VISIBLE_FN,
        exact = exact,
        text = js_str(text)
    )
}

/// Collapse whitespace runs to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether an element with rendered text `haystack` matches `needle`
pub fn text_matches(haystack: &str, needle: &str, exact: bool) -> bool {
    let haystack = normalize_whitespace(haystack);
    let needle = normalize_whitespace(needle);
    if exact {
        haystack == needle
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Set an input's value and fire the events frameworks listen for
pub fn fill(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector({});
    if (!el) return false;
    el.focus();
    if (el.isContentEditable) {{
        el.textContent = {value};
    }} else {{
        el.value = {value};
    }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
        js_str(selector),
        value = js_str(value)
    )
}

/// Select an option by value; returns `null` when the element is missing,
/// `false` when no option has that value
pub fn select_option(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector({});
    if (!el) return null;
    const wanted = {};
    const option = Array.from(el.options || []).find(o => o.value === wanted);
    if (!option) return false;
    el.value = wanted;
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
        js_str(selector),
        js_str(value)
    )
}

/// Whether the document has finished loading
pub const READY_STATE: &str = "document.readyState";

/// Text of every rendered element under `body`, excluding scripts and styles
pub const VISIBLE_TEXT: &str = r#"(() => Array.from(document.querySelectorAll('body *'))
    .filter(el => el.offsetParent !== null && !['script', 'style'].includes(el.tagName.toLowerCase()))
    .map(el => el.textContent)
    .join(' ')
    .trim())()"#;
