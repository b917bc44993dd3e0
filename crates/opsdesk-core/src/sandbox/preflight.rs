//! Static checks and rewrites applied to component source before it is
//! compiled.

use regex::Regex;
use std::sync::OnceLock;

use super::RenderError;
use crate::recovery::lexical::{
    catch_re, finally_re, mask_literals, static_regex, try_re, TryCounts,
};

pub const DEFAULT_COMPONENT_NAME: &str = "GeneratedComponent";

/// Identifiers that never have a meaning inside a component.
pub const FORBIDDEN: &[&str] = &[
    "eval",
    "import",
    "require",
    "fetch",
    "process",
    "window",
    "document",
    "globalThis",
];

static EXPORT_RE: OnceLock<Regex> = OnceLock::new();
static LINK_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static LINK_REQUIRE_DECL_RE: OnceLock<Regex> = OnceLock::new();
static LINK_REQUIRE_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();
static FORBIDDEN_RE: OnceLock<Regex> = OnceLock::new();

fn export_re() -> &'static Regex {
    static_regex(&EXPORT_RE, r"^\s*export\s+default\s+")
}

fn link_import_re() -> &'static Regex {
    static_regex(&LINK_IMPORT_RE, r#"(?m)^\s*import\s+["'][^"']*link["']\s+as\s+Link\s*;?[ \t]*\r?\n?"#)
}

fn link_require_decl_re() -> &'static Regex {
    static_regex(
        &LINK_REQUIRE_DECL_RE,
        r#"(?:const|let|var)\s+Link\s*=\s*require\(\s*['"]next/link['"]\s*\)\.default\s*;?"#,
    )
}

fn link_require_re() -> &'static Regex {
    static_regex(&LINK_REQUIRE_RE, r#"require\(\s*['"]next/link['"]\s*\)\.default"#)
}

fn name_re() -> &'static Regex {
    static_regex(&NAME_RE, r"\b(?:fn|function|const|let)\s+(\w+)\s*[=(]")
}

fn forbidden_re() -> &'static Regex {
    static_regex(
        &FORBIDDEN_RE,
        r"\b(eval|import|require|fetch|process|window|document|globalThis)\b",
    )
}

/// Source ready to compile, plus the name of its entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub code: String,
    pub name: String,
}

/// More `try` than handlers, and nothing handling the last one: the model
/// output was cut off in the middle of a block.
pub fn check_control_flow(code: &str) -> Result<(), RenderError> {
    if !TryCounts::of(code).has_unpaired_try() {
        return Ok(());
    }
    let masked = mask_literals(code);
    let Some(last_try) = try_re().find_iter(&masked).last() else {
        return Ok(());
    };
    let tail = &masked[last_try.start()..];
    if catch_re().is_match(tail) || finally_re().is_match(tail) {
        return Ok(());
    }
    Err(RenderError::IncompleteBlock {
        code: code.to_string(),
    })
}

/// Drop `export default` and self-made `Link` imports; `Link` is provided.
pub fn rewrite(code: &str) -> String {
    let code = export_re().replace(code, "");
    let code = link_import_re().replace_all(&code, "");
    let code = link_require_decl_re().replace_all(&code, "");
    link_require_re().replace_all(&code, "Link").into_owned()
}

pub fn scan_forbidden(code: &str) -> Result<(), RenderError> {
    match forbidden_re().captures(&mask_literals(code)) {
        Some(caps) => Err(RenderError::ForbiddenIdentifier {
            identifier: caps[1].to_string(),
            code: code.to_string(),
        }),
        None => Ok(()),
    }
}

/// Name of the first declared function or constant.
pub fn component_name(code: &str) -> String {
    name_re()
        .captures(&mask_literals(code))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| DEFAULT_COMPONENT_NAME.to_string())
}

pub fn prepare(code: &str) -> Result<Prepared, RenderError> {
    check_control_flow(code)?;
    let rewritten = rewrite(code);
    scan_forbidden(&rewritten)?;
    let name = component_name(&rewritten);
    Ok(Prepared {
        code: rewritten,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_trailing_try_fails_fast() {
        let code = "fn A() { try { save(); } catch (e) {} try { load(); }";
        assert!(matches!(
            check_control_flow(code),
            Err(RenderError::IncompleteBlock { .. })
        ));
        assert!(prepare(code).is_err());
    }

    #[test]
    fn test_handler_after_last_try_passes() {
        // counts are off but the last try is handled
        let code = "fn A() { try { try { x(); } catch (e) {} }";
        assert!(check_control_flow(code).is_ok());
    }

    #[test]
    fn test_try_inside_strings_and_comments_is_not_control_flow() {
        let code = "fn A() {\n  // try { again\n  ui::text(\"Please try { again\")\n}";
        assert!(check_control_flow(code).is_ok());

        let disguised = "fn A() { try { load(); ui::text(`catch (later)`) }";
        assert!(matches!(
            check_control_flow(disguised),
            Err(RenderError::IncompleteBlock { .. })
        ));
    }

    #[test]
    fn test_rewrite_strips_export_and_link_imports() {
        let code = "export default fn Nav() {\n  let Link = require('next/link').default;\n  require(\"next/link\").default::to(`/`, `Home`)\n}";
        let rewritten = rewrite(code);
        assert!(rewritten.starts_with("fn Nav()"));
        assert!(!rewritten.contains("require"));
        assert!(rewritten.contains("Link::to("));

        let imported = rewrite("import \"next/link\" as Link;\nfn A() { Link::to(`/`, `x`) }");
        assert_eq!(imported, "fn A() { Link::to(`/`, `x`) }");
    }

    #[test]
    fn test_forbidden_identifiers_outside_strings() {
        assert!(scan_forbidden("fn A() { ui::text(`Bulk import`) }").is_ok());
        match scan_forbidden("fn A() { eval(`1`) }") {
            Err(RenderError::ForbiddenIdentifier { identifier, .. }) => assert_eq!(identifier, "eval"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(scan_forbidden("fn A() { let w = window; }").is_err());
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("fn EditStock() { }"), "EditStock");
        assert_eq!(component_name("const Panel = || ui::text(`x`);"), "Panel");
        assert_eq!(component_name("// fn Ignored()\nfn Real() {}"), "Real");
        assert_eq!(component_name("ui::text(`x`)"), DEFAULT_COMPONENT_NAME);
    }
}
