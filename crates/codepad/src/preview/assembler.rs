use tracing::debug;

use crate::preview::markup::{
    escape_closing_tag, insert_before, is_full_document, strip_external_references,
};
use crate::types::{FileBundle, Framework, PreviewDocument};

/// Scripts that must run before everything else, in this order
const PRIORITY_CHUNKS: [&str; 3] = ["polyfills", "runtime", "main"];

const SOURCE_MAP_MARKER: &str = "//# sourceMappingURL=";

const PRELOAD_FETCH: &str = "fetch(";

/// Build one self-contained preview document from a compiled bundle.
///
/// External script, stylesheet and base references are removed and the
/// bundle's JavaScript and first stylesheet are inlined instead. The result
/// depends only on the bundle contents and the framework.
pub fn assemble(bundle: &FileBundle, framework: Framework) -> PreviewDocument {
    let markup = strip_external_references(
        bundle
            .get("index.html")
            .unwrap_or_else(|| framework.default_mount()),
    );

    let scripts: String = ordered_scripts(bundle)
        .into_iter()
        .map(|(_, code)| {
            format!(
                "<script type=\"module\">{}</script>\n",
                rewrite_script(code)
            )
        })
        .collect();

    let style = bundle
        .iter()
        .find(|(path, _)| path.ends_with(".css"))
        .map(|(_, css)| format!("<style>{}</style>", escape_closing_tag(css, "style")))
        .unwrap_or_default();

    let html = if is_full_document(&markup) {
        merge_into_document(markup, &style, &scripts)
    } else {
        wrap_fragment(&markup, &style, &scripts)
    };

    debug!(%framework, files = bundle.len(), bytes = html.len(), "assembled preview document");
    PreviewDocument::new(html)
}

/// JavaScript files in execution order: priority chunks first, then the rest
/// in path order. Source maps are skipped.
pub fn ordered_scripts(bundle: &FileBundle) -> Vec<(&str, &str)> {
    let mut scripts: Vec<(Option<usize>, &str, &str)> = bundle
        .iter()
        .filter(|(path, _)| path.ends_with(".js"))
        .map(|(path, code)| (priority_rank(file_name(path)), path, code))
        .collect();

    // Stable sort keeps path order within each rank
    scripts.sort_by_key(|(rank, _, _)| rank.unwrap_or(PRIORITY_CHUNKS.len()));
    scripts
        .into_iter()
        .map(|(_, path, code)| (path, code))
        .collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn priority_rank(name: &str) -> Option<usize> {
    PRIORITY_CHUNKS
        .iter()
        .position(|chunk| is_chunk(name, chunk))
}

/// `chunk.js`, or a hashed variant such as `chunk-5XK2.js` or `chunk.5xk2.js`
fn is_chunk(name: &str, chunk: &str) -> bool {
    let Some(stem) = name.strip_suffix(".js") else {
        return false;
    };
    let Some(rest) = stem.strip_prefix(chunk) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    let Some(hash) = rest.strip_prefix('-').or_else(|| rest.strip_prefix('.')) else {
        return false;
    };
    !hash.is_empty()
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Make a bundled script safe to run inline
pub fn rewrite_script(code: &str) -> String {
    let code = strip_source_map_comments(code);
    let code = neutralize_preload_fetch(&code);
    escape_closing_tag(&code, "script")
}

fn strip_source_map_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;

    while let Some(idx) = rest.find(SOURCE_MAP_MARKER) {
        out.push_str(&rest[..idx]);
        let comment = &rest[idx..];
        rest = comment.find('\n').map_or("", |nl| &comment[nl..]);
    }

    out.push_str(rest);
    out
}

/// Replace module-preload fetches (`fetch(e.href,t)`) with a resolved promise;
/// the preloaded chunks are already inlined.
fn neutralize_preload_fetch(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;

    while let Some(idx) = rest.find(PRELOAD_FETCH) {
        let args_start = idx + PRELOAD_FETCH.len();
        let args = &rest[args_start..];
        match preload_args_len(args) {
            Some(len) => {
                out.push_str(&rest[..idx]);
                out.push_str("Promise.resolve()");
                rest = &args[len..];
            }
            None => {
                out.push_str(&rest[..args_start]);
                rest = args;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Length of `ident.href,ident)` at the start of `args`
fn preload_args_len(args: &str) -> Option<usize> {
    let first = ident_len(args)?;
    let after = args[first..].strip_prefix(".href,")?;
    let second = ident_len(after)?;
    after[second..]
        .starts_with(')')
        .then_some(first + ".href,".len() + second + 1)
}

fn ident_len(s: &str) -> Option<usize> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
    let first = s.chars().next()?;
    if !(is_ident(first) && !first.is_ascii_digit()) {
        return None;
    }
    Some(s.find(|c: char| !is_ident(c)).unwrap_or(s.len()))
}

fn merge_into_document(mut markup: String, style: &str, scripts: &str) -> String {
    if !style.is_empty()
        && !insert_before(&mut markup, "</head>", style)
        && !insert_before(&mut markup, "<body", style)
    {
        markup.insert_str(0, style);
    }

    if !scripts.is_empty()
        && !insert_before(&mut markup, "</body>", scripts)
        && !insert_before(&mut markup, "</html>", scripts)
    {
        markup.push_str(scripts);
    }

    markup
}

fn wrap_fragment(markup: &str, style: &str, scripts: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Preview</title>
    {style}
</head>
<body>
    {markup}
    {scripts}
</body>
</html>"#
    )
}
