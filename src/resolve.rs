use std::fmt;

use swc_core::ecma::ast::{Callee, Expr, Lit, MemberExpr, MemberProp, OptChainBase, PropName, SuperProp};
use tracing::debug;

use crate::locate::{FunctionKind, FunctionSite, Slot};

/// Name used when nothing in the syntactic context names the function.
pub const ANONYMOUS: &str = "anon";

/// Separator between name and marker inside a trace label.
pub(crate) const LABEL_SEPARATOR: &str = " - ";

/// Presentational name of a function-like construct, derived from where it
/// sits in the tree. Used both to write trace labels and to recognize them.
///
/// Never empty and never contains the label separator `" - "`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedName(String);

impl ResolvedName {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let cleaned = raw.trim().replace(LABEL_SEPARATOR, "-");
        if cleaned.is_empty() {
            Self(ANONYMOUS.to_string())
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolvedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the name of `site` from its kind and the slot it occupies.
///
/// Declarations and methods carry their own names. Function and lambda
/// expressions are named after their container, in this order: anonymous
/// default export, `import(...).then` callback, `X(...).then` callback,
/// call argument, variable binding, property/member value. Anything left
/// is `anon` for lambdas; function expressions fall back to their own
/// identifier, then to the nearest enclosing named declaration.
///
/// `file_stem` is the containing file's name without extension, if known.
pub fn resolve_name(site: &FunctionSite, file_stem: Option<&str>) -> ResolvedName {
    let raw = match &site.kind {
        FunctionKind::Declaration { ident } => ident.clone(),
        FunctionKind::ObjectMethod { key } | FunctionKind::ClassMethod { key } => key.clone(),
        FunctionKind::Expression { ident } => resolve_expression(site, ident.as_deref(), file_stem),
        FunctionKind::Lambda => resolve_expression(site, None, file_stem),
    };
    let name = ResolvedName::new(raw);
    debug!(%name, kind = site.kind.label(), slot = ?site.slot, "resolved function name");
    name
}

fn resolve_expression(site: &FunctionSite, own: Option<&str>, file_stem: Option<&str>) -> String {
    match &site.slot {
        Slot::DefaultExport => match own {
            Some(ident) => ident.to_string(),
            None => default_export_name(file_stem),
        },
        Slot::ImportThen => "import-then".to_string(),
        Slot::PromiseThen { receiver } => format!("{}-then", or_anonymous(receiver)),
        Slot::Argument { callee } => format!("{}-callback", or_anonymous(callee)),
        Slot::Binding { name } => name.clone(),
        Slot::Member { key } => own.unwrap_or(key).to_string(),
        Slot::Detached => match site.kind {
            FunctionKind::Lambda => ANONYMOUS.to_string(),
            _ => own
                .or(site.enclosing.as_deref())
                .unwrap_or(ANONYMOUS)
                .to_string(),
        },
    }
}

fn default_export_name(file_stem: Option<&str>) -> String {
    match file_stem.filter(|stem| !stem.is_empty()) {
        Some(stem) => format!("{stem}-default-export"),
        None => "default-export".to_string(),
    }
}

fn or_anonymous(chain: &str) -> &str {
    if chain.is_empty() { ANONYMOUS } else { chain }
}

/// Skip parentheses and TypeScript-only wrappers around an expression.
pub fn strip_wrappers(mut expr: &Expr) -> &Expr {
    loop {
        expr = match expr {
            Expr::Paren(paren) => &paren.expr,
            Expr::TsAs(ts) => &ts.expr,
            Expr::TsSatisfies(ts) => &ts.expr,
            Expr::TsNonNull(ts) => &ts.expr,
            Expr::TsTypeAssertion(ts) => &ts.expr,
            Expr::TsConstAssertion(ts) => &ts.expr,
            Expr::TsInstantiation(ts) => &ts.expr,
            _ => return expr,
        };
    }
}

/// Flatten a chain of member accesses and calls into a dotted path:
/// `a.b().c` becomes `a.b.c`. Segments that have no static name
/// (computed identifiers, literals, arbitrary expressions) are dropped.
pub fn flatten_chain(expr: &Expr) -> String {
    let mut segments = Vec::new();
    push_segments(expr, &mut segments);
    segments.join(".")
}

pub fn flatten_member(member: &MemberExpr) -> String {
    let mut segments = Vec::new();
    push_member(member, &mut segments);
    segments.join(".")
}

fn push_segments(expr: &Expr, out: &mut Vec<String>) {
    match strip_wrappers(expr) {
        Expr::Ident(ident) => out.push(ident.sym.to_string()),
        Expr::This(_) => out.push("this".to_string()),
        Expr::Member(member) => push_member(member, out),
        Expr::SuperProp(super_prop) => {
            out.push("super".to_string());
            if let SuperProp::Ident(prop) = &super_prop.prop {
                out.push(prop.sym.to_string());
            }
        }
        Expr::Call(call) => match &call.callee {
            Callee::Expr(callee) => push_segments(callee, out),
            Callee::Super(_) => out.push("super".to_string()),
            Callee::Import(_) => out.push("import".to_string()),
        },
        Expr::New(new) => push_segments(&new.callee, out),
        Expr::OptChain(chain) => match &*chain.base {
            OptChainBase::Member(member) => push_member(member, out),
            OptChainBase::Call(call) => push_segments(&call.callee, out),
        },
        _ => {}
    }
}

fn push_member(member: &MemberExpr, out: &mut Vec<String>) {
    push_segments(&member.obj, out);
    if let Some(prop) = member_prop_name(&member.prop) {
        out.push(prop);
    }
}

/// Static name of a member property, if it has one.
pub fn member_prop_name(prop: &MemberProp) -> Option<String> {
    match prop {
        MemberProp::Ident(ident) => Some(ident.sym.to_string()),
        MemberProp::PrivateName(private) => Some(format!("#{}", private.name)),
        MemberProp::Computed(computed) => match strip_wrappers(&computed.expr) {
            Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
            Expr::Lit(Lit::Num(n)) => Some(n.value.to_string()),
            _ => None,
        },
    }
}

/// Name of an object/class key.
pub fn prop_name(key: &PropName) -> String {
    match key {
        PropName::Ident(ident) => ident.sym.to_string(),
        PropName::Str(s) => s.value.to_string(),
        PropName::Num(n) => n.value.to_string(),
        PropName::BigInt(b) => b.value.to_string(),
        PropName::Computed(computed) => match strip_wrappers(&computed.expr) {
            Expr::Lit(Lit::Str(s)) => s.value.to_string(),
            other => flatten_chain(other),
        },
    }
}
