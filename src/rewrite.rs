use std::fmt;
use std::mem;

use swc_core::common::{DUMMY_SP, Span, SyntaxContext};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};
use tracing::{debug, warn};

use crate::error::UnresolvableParameter;
use crate::locate::{FunctionSite, normalize_lambda_body};
use crate::resolve::{LABEL_SEPARATOR, ResolvedName};

/// Local that holds the original return value while FINISH is traced.
pub const LAZY_RESULT: &str = "__lazyResult";

/// Prefix of every trace label.
const LABEL_PREFIX: &str = "**";

/// Suffix of a trace label: which statement the trace precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Start,
    /// Index of the original statement that follows (never 0).
    Step(usize),
    Finish,
}

impl Marker {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "START" => Some(Marker::Start),
            "FINISH" => Some(Marker::Finish),
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits.parse().ok().map(Marker::Step)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Start => f.write_str("START"),
            Marker::Step(idx) => write!(f, "{idx}"),
            Marker::Finish => f.write_str("FINISH"),
        }
    }
}

/// `**<name> - <marker>`
pub fn label(name: &ResolvedName, marker: Marker) -> String {
    format!("{LABEL_PREFIX}{name}{LABEL_SEPARATOR}{marker}")
}

/// Marker of `label` if it is a trace label for `name`.
pub fn parse_label(label: &str, name: &ResolvedName) -> Option<Marker> {
    let marker = label
        .strip_prefix(LABEL_PREFIX)?
        .strip_prefix(name.as_str())?
        .strip_prefix(LABEL_SEPARATOR)?;
    Marker::parse(marker)
}

/// The designated trace call, as a dotted path (`console.log`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCall {
    path: Vec<String>,
}

impl Default for TraceCall {
    fn default() -> Self {
        Self {
            path: vec!["console".to_string(), "log".to_string()],
        }
    }
}

impl fmt::Display for TraceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

impl TraceCall {
    /// Parse a dotted identifier path. Returns `None` unless every segment
    /// is a plain JavaScript identifier.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path.trim().split('.').map(str::to_string).collect();
        segments
            .iter()
            .all(|segment| is_identifier(segment))
            .then_some(Self { path: segments })
    }

    fn callee(&self) -> Expr {
        let mut segments = self.path.iter();
        let first = segments.next().map_or("console", String::as_str);
        let mut callee = Expr::Ident(Ident::new(first.into(), DUMMY_SP, SyntaxContext::empty()));
        for segment in segments {
            callee = Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(callee),
                prop: MemberProp::Ident(IdentName::new(segment.as_str().into(), DUMMY_SP)),
            });
        }
        callee
    }

    fn is_callee(&self, expr: &Expr) -> bool {
        let mut segments = Vec::with_capacity(self.path.len());
        callee_segments(expr, &mut segments)
            && segments.iter().copied().eq(self.path.iter().map(String::as_str))
    }

    /// `TRACE("**name - marker"[, { p1, p2 }])`
    pub fn statement(&self, name: &ResolvedName, marker: Marker, snapshot: Option<&[String]>) -> Stmt {
        let mut args = vec![ExprOrSpread {
            spread: None,
            expr: Box::new(Expr::Lit(Lit::Str(Str {
                span: DUMMY_SP,
                value: label(name, marker).into(),
                raw: None,
            }))),
        }];
        if let Some(params) = snapshot.filter(|params| !params.is_empty()) {
            args.push(ExprOrSpread {
                spread: None,
                expr: Box::new(Expr::Object(ObjectLit {
                    span: DUMMY_SP,
                    props: params
                        .iter()
                        .map(|param| {
                            PropOrSpread::Prop(Box::new(Prop::Shorthand(Ident::new(
                                param.as_str().into(),
                                DUMMY_SP,
                                SyntaxContext::empty(),
                            ))))
                        })
                        .collect(),
                })),
            });
        }
        Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(Expr::Call(CallExpr {
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                callee: Callee::Expr(Box::new(self.callee())),
                args,
                type_args: None,
            })),
        })
    }

    /// Marker of `stmt` if it is a trace statement for `name`.
    pub fn marker_of(&self, stmt: &Stmt, name: &ResolvedName) -> Option<Marker> {
        let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
            return None;
        };
        let Expr::Call(call) = &**expr else {
            return None;
        };
        let Callee::Expr(callee) = &call.callee else {
            return None;
        };
        if !self.is_callee(callee) {
            return None;
        }
        let first = call.args.first().filter(|arg| arg.spread.is_none())?;
        let Expr::Lit(Lit::Str(text)) = &*first.expr else {
            return None;
        };
        parse_label(&text.value, name)
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn callee_segments<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) -> bool {
    match expr {
        Expr::Ident(ident) => {
            out.push(&ident.sym);
            true
        }
        Expr::Member(MemberExpr {
            obj,
            prop: MemberProp::Ident(prop),
            ..
        }) => {
            if !callee_segments(obj, out) {
                return false;
            }
            out.push(&prop.sym);
            true
        }
        _ => false,
    }
}

/// Number of leading directives (`"use strict";`, `"use server";`).
/// They must stay first in the body to keep their effect.
pub fn prologue_len(stmts: &[Stmt]) -> usize {
    stmts.iter().take_while(|stmt| is_directive(stmt)).count()
}

fn is_directive(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(&**expr, Expr::Lit(Lit::Str(_))))
}

/// Whether `stmts` already carries traces for `name`: its first statement
/// after the directives is a START or numbered trace.
pub fn is_decorated(stmts: &[Stmt], name: &ResolvedName, call: &TraceCall) -> bool {
    matches!(
        stmts[prologue_len(stmts)..]
            .first()
            .and_then(|stmt| call.marker_of(stmt, name)),
        Some(Marker::Start | Marker::Step(_))
    )
}

/// Insert a trace before every statement and a FINISH trace at the end.
/// Directives are left in front and not numbered.
///
/// A trailing `return <expr>` is split into a `const` binding, the FINISH
/// trace and a `return` of the binding, so the value is computed before
/// FINISH fires and returned unchanged.
pub fn decorate(
    mut stmts: Vec<Stmt>,
    name: &ResolvedName,
    params: &[String],
    call: &TraceCall,
) -> Vec<Stmt> {
    let body = stmts.split_off(prologue_len(&stmts));
    let mut decorated = stmts;
    decorated.reserve(body.len() * 2 + 3);
    if body.is_empty() {
        decorated.push(call.statement(name, Marker::Start, Some(params)));
    }
    for (idx, stmt) in body.into_iter().enumerate() {
        let (marker, snapshot) = if idx == 0 {
            (Marker::Start, Some(params))
        } else {
            (Marker::Step(idx), None)
        };
        decorated.push(call.statement(name, marker, snapshot));
        decorated.push(stmt);
    }

    let finish = call.statement(name, Marker::Finish, None);
    match decorated.pop() {
        Some(Stmt::Return(ReturnStmt {
            span,
            arg: Some(value),
        })) => {
            decorated.push(lazy_result_binding(span, value));
            decorated.push(finish);
            decorated.push(Stmt::Return(ReturnStmt {
                span: DUMMY_SP,
                arg: Some(Box::new(Expr::Ident(lazy_result_ident()))),
            }));
        }
        Some(bare_return @ Stmt::Return(_)) => {
            decorated.push(finish);
            decorated.push(bare_return);
        }
        Some(last) => {
            decorated.push(last);
            decorated.push(finish);
        }
        None => decorated.push(finish),
    }
    decorated
}

/// Remove every trace for `name` and undo the trailing-return split.
pub fn undecorate(stmts: Vec<Stmt>, name: &ResolvedName, call: &TraceCall) -> Vec<Stmt> {
    let mut kept: Vec<Stmt> = stmts
        .into_iter()
        .filter(|stmt| call.marker_of(stmt, name).is_none())
        .collect();
    collapse_lazy_result(&mut kept);
    kept
}

fn lazy_result_ident() -> Ident {
    Ident::new(LAZY_RESULT.into(), DUMMY_SP, SyntaxContext::empty())
}

fn lazy_result_binding(span: Span, value: Box<Expr>) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: lazy_result_ident(),
                type_ann: None,
            }),
            init: Some(value),
            definite: false,
        }],
    })))
}

fn is_lazy_result_binding(stmt: &Stmt) -> bool {
    let Stmt::Decl(Decl::Var(decl)) = stmt else {
        return false;
    };
    match decl.decls.as_slice() {
        [
            VarDeclarator {
                name: Pat::Ident(binding),
                init: Some(_),
                ..
            },
        ] => decl.kind == VarDeclKind::Const && &*binding.id.sym == LAZY_RESULT,
        _ => false,
    }
}

fn returns_lazy_result(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(ReturnStmt {
            arg: Some(value), ..
        }) => matches!(&**value, Expr::Ident(ident) if &*ident.sym == LAZY_RESULT),
        _ => false,
    }
}

/// `const __lazyResult = e; return __lazyResult;` at the tail becomes
/// `return e;`.
fn collapse_lazy_result(stmts: &mut Vec<Stmt>) {
    let [.., binding, ret] = stmts.as_slice() else {
        return;
    };
    if !is_lazy_result_binding(binding) || !returns_lazy_result(ret) {
        return;
    }
    stmts.pop();
    let Some(Stmt::Decl(Decl::Var(decl))) = stmts.pop() else {
        return;
    };
    let VarDecl { span, decls, .. } = *decl;
    let value = decls.into_iter().next().and_then(|declarator| declarator.init);
    stmts.push(Stmt::Return(ReturnStmt { span, arg: value }));
}

/// Turn `{ return <expr>; }` back into an expression body.
pub fn restore_lambda_body(arrow: &mut ArrowExpr) {
    let BlockStmtOrExpr::BlockStmt(block) = &mut *arrow.body else {
        return;
    };
    if !matches!(
        block.stmts.as_slice(),
        [Stmt::Return(ReturnStmt { arg: Some(_), .. })]
    ) {
        return;
    }
    let Some(Stmt::Return(ReturnStmt {
        arg: Some(value), ..
    })) = block.stmts.pop()
    else {
        return;
    };
    // An object literal or sequence right after `=>` would not parse back.
    let value = match *value {
        Expr::Object(_) | Expr::Seq(_) => Box::new(Expr::Paren(ParenExpr {
            span: DUMMY_SP,
            expr: value,
        })),
        _ => value,
    };
    *arrow.body = BlockStmtOrExpr::Expr(value);
}

/// Identifiers bound by a parameter list, flattened depth-first, plus the
/// parameters that could not be listed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParamSnapshot {
    pub names: Vec<String>,
    pub skipped: Vec<UnresolvableParameter>,
}

impl ParamSnapshot {
    pub fn from_pats<'a>(pats: impl IntoIterator<Item = &'a Pat>) -> Self {
        let mut snapshot = Self::default();
        for (index, pat) in pats.into_iter().enumerate() {
            snapshot.collect(index, pat);
        }
        snapshot
    }

    pub fn from_constructor(params: &[ParamOrTsParamProp]) -> Self {
        let mut snapshot = Self::default();
        for (index, param) in params.iter().enumerate() {
            match param {
                ParamOrTsParamProp::Param(param) => snapshot.collect(index, &param.pat),
                ParamOrTsParamProp::TsParamProp(prop) => match &prop.param {
                    TsParamPropParam::Ident(binding) => {
                        snapshot.names.push(binding.id.sym.to_string());
                    }
                    TsParamPropParam::Assign(assign) => snapshot.collect(index, &assign.left),
                },
            }
        }
        snapshot
    }

    fn collect(&mut self, index: usize, pat: &Pat) {
        match pat {
            Pat::Ident(binding) if &*binding.id.sym == "this" => {
                self.skip(index, "this parameter");
            }
            Pat::Ident(binding) => self.names.push(binding.id.sym.to_string()),
            Pat::Array(array) => {
                for elem in array.elems.iter().flatten() {
                    self.collect(index, elem);
                }
            }
            Pat::Object(object) => {
                for prop in &object.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => self.collect(index, &kv.value),
                        ObjectPatProp::Assign(assign) => {
                            self.names.push(assign.key.id.sym.to_string());
                        }
                        ObjectPatProp::Rest(rest) => self.collect(index, &rest.arg),
                    }
                }
            }
            Pat::Rest(rest) => self.collect(index, &rest.arg),
            Pat::Assign(assign) => self.collect(index, &assign.left),
            Pat::Expr(_) => self.skip(index, "expression pattern"),
            Pat::Invalid(_) => self.skip(index, "invalid pattern"),
        }
    }

    fn skip(&mut self, index: usize, shape: &'static str) {
        let skipped = UnresolvableParameter { index, shape };
        warn!("{skipped}");
        self.skipped.push(skipped);
    }
}

/// Which way a toggle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Decorated,
    Undecorated,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Decorated => f.write_str("decorated"),
            Action::Undecorated => f.write_str("undecorated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub action: Action,
    pub skipped_params: Vec<UnresolvableParameter>,
}

/// Toggle traces in the body of the construct at `site`.
///
/// Returns `None` if no construct in `module` has the site's span.
pub fn toggle_site(
    module: &mut Module,
    site: &FunctionSite,
    name: &ResolvedName,
    call: &TraceCall,
) -> Option<ToggleOutcome> {
    let mut toggler = SiteToggler {
        span: site.span,
        name,
        call,
        outcome: None,
    };
    module.visit_mut_with(&mut toggler);
    toggler.outcome
}

/// Whether the body of the construct at `site` is currently decorated.
/// Expression-bodied arrows never are.
pub fn site_is_decorated(
    module: &Module,
    site: &FunctionSite,
    name: &ResolvedName,
    call: &TraceCall,
) -> bool {
    let mut probe = DecorationProbe {
        span: site.span,
        name,
        call,
        decorated: None,
    };
    module.visit_with(&mut probe);
    probe.decorated.unwrap_or(false)
}

struct SiteToggler<'a> {
    span: Span,
    name: &'a ResolvedName,
    call: &'a TraceCall,
    outcome: Option<ToggleOutcome>,
}

impl SiteToggler<'_> {
    fn is_target(&self, span: Span) -> bool {
        self.outcome.is_none() && span == self.span
    }

    fn toggle_body(&mut self, stmts: &mut Vec<Stmt>, params: ParamSnapshot) -> Action {
        let body = mem::take(stmts);
        let action = if is_decorated(&body, self.name, self.call) {
            *stmts = undecorate(body, self.name, self.call);
            self.outcome = Some(ToggleOutcome {
                action: Action::Undecorated,
                skipped_params: Vec::new(),
            });
            Action::Undecorated
        } else {
            *stmts = decorate(body, self.name, &params.names, self.call);
            self.outcome = Some(ToggleOutcome {
                action: Action::Decorated,
                skipped_params: params.skipped,
            });
            Action::Decorated
        };
        debug!(name = %self.name, %action, statements = stmts.len(), "rewrote function body");
        action
    }
}

impl VisitMut for SiteToggler<'_> {
    fn visit_mut_function(&mut self, function: &mut Function) {
        if self.is_target(function.span)
            && let Some(body) = &mut function.body
        {
            let params = ParamSnapshot::from_pats(function.params.iter().map(|param| &param.pat));
            self.toggle_body(&mut body.stmts, params);
            return;
        }
        function.visit_mut_children_with(self);
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        if self.is_target(arrow.span) {
            normalize_lambda_body(arrow);
            let params = ParamSnapshot::from_pats(&arrow.params);
            if let BlockStmtOrExpr::BlockStmt(block) = &mut *arrow.body
                && self.toggle_body(&mut block.stmts, params) == Action::Undecorated
            {
                restore_lambda_body(arrow);
            }
            return;
        }
        arrow.visit_mut_children_with(self);
    }

    fn visit_mut_constructor(&mut self, ctor: &mut Constructor) {
        if self.is_target(ctor.span)
            && let Some(body) = &mut ctor.body
        {
            let params = ParamSnapshot::from_constructor(&ctor.params);
            self.toggle_body(&mut body.stmts, params);
            return;
        }
        ctor.visit_mut_children_with(self);
    }

    fn visit_mut_getter_prop(&mut self, getter: &mut GetterProp) {
        if self.is_target(getter.span)
            && let Some(body) = &mut getter.body
        {
            self.toggle_body(&mut body.stmts, ParamSnapshot::default());
            return;
        }
        getter.visit_mut_children_with(self);
    }

    fn visit_mut_setter_prop(&mut self, setter: &mut SetterProp) {
        if self.is_target(setter.span)
            && let Some(body) = &mut setter.body
        {
            let params = ParamSnapshot::from_pats([&*setter.param]);
            self.toggle_body(&mut body.stmts, params);
            return;
        }
        setter.visit_mut_children_with(self);
    }
}

struct DecorationProbe<'a> {
    span: Span,
    name: &'a ResolvedName,
    call: &'a TraceCall,
    decorated: Option<bool>,
}

impl DecorationProbe<'_> {
    fn check(&mut self, span: Span, body: Option<&BlockStmt>) -> bool {
        if self.decorated.is_some() || span != self.span {
            return false;
        }
        self.decorated = Some(body.is_some_and(|body| is_decorated(&body.stmts, self.name, self.call)));
        true
    }
}

impl Visit for DecorationProbe<'_> {
    fn visit_function(&mut self, function: &Function) {
        if !self.check(function.span, function.body.as_ref()) {
            function.visit_children_with(self);
        }
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        let body = match &*arrow.body {
            BlockStmtOrExpr::BlockStmt(block) => Some(block),
            BlockStmtOrExpr::Expr(_) => None,
        };
        if !self.check(arrow.span, body) {
            arrow.visit_children_with(self);
        }
    }

    fn visit_constructor(&mut self, ctor: &Constructor) {
        if !self.check(ctor.span, ctor.body.as_ref()) {
            ctor.visit_children_with(self);
        }
    }

    fn visit_getter_prop(&mut self, getter: &GetterProp) {
        if !self.check(getter.span, getter.body.as_ref()) {
            getter.visit_children_with(self);
        }
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        if !self.check(setter.span, setter.body.as_ref()) {
            setter.visit_children_with(self);
        }
    }
}
