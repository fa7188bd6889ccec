use crate::error::{Error, UnresolvableParameter};
use crate::locate::enclosing_function;
use crate::resolve::{ResolvedName, resolve_name};
use crate::rewrite::{Action, TraceCall, site_is_decorated, toggle_site};
use crate::syntax::{ParseOptions, SyntaxTree};

/// Everything a toggle needs besides the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleOptions {
    pub parse: ParseOptions,
    pub trace: TraceCall,
}

/// Result of a successful toggle.
#[derive(Debug, Clone)]
pub struct Toggled {
    /// The whole source text after the toggle.
    pub source: String,
    pub name: ResolvedName,
    pub action: Action,
    /// Parameters left out of the START snapshot. Empty when undecorating.
    pub skipped_params: Vec<UnresolvableParameter>,
}

/// Toggle trace logging in the innermost function containing
/// `cursor_line` (1-based).
///
/// The source is reprinted as a whole, so formatting outside the toggled
/// body may be normalized. On error nothing is produced.
pub fn toggle(source: &str, cursor_line: usize, options: &ToggleOptions) -> Result<Toggled, Error> {
    let mut tree = SyntaxTree::parse(source, &options.parse)?;
    let site = enclosing_function(&tree, cursor_line)?;
    let name = resolve_name(&site, options.parse.file_stem());

    let outcome = toggle_site(&mut tree.module, &site, &name, &options.trace)
        .ok_or(Error::NoEnclosingFunction { line: cursor_line })?;
    let source = tree.print()?;

    Ok(Toggled {
        source,
        name,
        action: outcome.action,
        skipped_params: outcome.skipped_params,
    })
}

/// [`toggle`] with default options, returning only the new source.
pub fn toggle_source(source: &str, cursor_line: usize) -> Result<String, Error> {
    toggle(source, cursor_line, &ToggleOptions::default()).map(|toggled| toggled.source)
}

/// What a toggle at a line would act on.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Inspection {
    pub name: String,
    pub kind: &'static str,
    pub start_line: usize,
    pub end_line: usize,
    pub decorated: bool,
}

/// Describe the function a toggle at `cursor_line` would target, without
/// changing anything.
pub fn inspect(
    source: &str,
    cursor_line: usize,
    options: &ToggleOptions,
) -> Result<Inspection, Error> {
    let tree = SyntaxTree::parse(source, &options.parse)?;
    let site = enclosing_function(&tree, cursor_line)?;
    let name = resolve_name(&site, options.parse.file_stem());
    let decorated = site_is_decorated(&tree.module, &site, &name, &options.trace);

    Ok(Inspection {
        name: name.to_string(),
        kind: site.kind.label(),
        start_line: site.start_line,
        end_line: site.end_line,
        decorated,
    })
}
