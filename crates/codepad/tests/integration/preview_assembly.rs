use codepad::preview::{assemble, ordered_scripts};
use codepad::types::{FileBundle, Framework};

use super::fixture_bundle;

#[test]
fn test_assembly_is_deterministic() {
    let bundle = fixture_bundle("react");
    let first = assemble(&bundle, Framework::React);
    let second = assemble(&bundle.clone(), Framework::React);
    assert_eq!(first, second);
}

#[test]
fn test_priority_scripts_run_first() {
    let bundle = fixture_bundle("react");
    let order: Vec<_> = ordered_scripts(&bundle)
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(
        order,
        ["polyfills.js", "runtime.js", "main.js", "vendor.js"]
    );

    let html = assemble(&bundle, Framework::React).into_html();
    let polyfills = html.find("__polyfilled").unwrap();
    let runtime = html.find("__runtimeLoaded").unwrap();
    let main = html.find("Hello from React").unwrap();
    let vendor = html.find("__vendor").unwrap();
    assert!(polyfills < runtime && runtime < main && main < vendor);
}

#[test]
fn test_document_has_no_external_references() {
    let html = assemble(&fixture_bundle("react"), Framework::React).into_html();

    assert!(!html.contains("src=\"runtime.js\""));
    assert!(!html.contains("src=\"main.js\""));
    assert!(!html.contains("<link"));
    assert!(!html.contains("sourceMappingURL"));
    assert!(html.contains("#root { font-family: sans-serif; }"));
    assert!(html.contains(r#"<div id="root"></div>"#));
}

#[test]
fn test_inline_script_cannot_close_its_tag() {
    let html = assemble(&fixture_bundle("react"), Framework::React).into_html();
    let vendor = html.find("window.__vendor").unwrap();
    let line_end = vendor + html[vendor..].find('\n').unwrap();
    assert!(!html[vendor..line_end].contains("</script>"));
}

#[test]
fn test_missing_index_uses_framework_mount() {
    let bundle = FileBundle::new().with_file("main.js", "boot()");
    let html = assemble(&bundle, Framework::Angular).into_html();
    assert!(html.contains("<app-root></app-root>"));
    assert!(html.contains("boot()"));
}

#[test]
fn test_fragment_with_header_is_wrapped() {
    let bundle = FileBundle::new()
        .with_file(
            "index.html",
            r#"<header><h1>Todo</h1></header><div id="app"></div>"#,
        )
        .with_file("main.js", "mount()")
        .with_file("styles.css", "h1 { color: red; }");
    let html = assemble(&bundle, Framework::Vue).into_html();

    assert!(html.starts_with("<!DOCTYPE html>"));
    let head_end = html.find("</head>").unwrap();
    let header = html.find("<header>").unwrap();
    assert!(html.find("h1 { color: red; }").unwrap() < head_end);
    assert!(head_end < header);
    assert!(header < html.find("mount()").unwrap());
}
