use std::mem;

use swc_core::common::{DUMMY_SP, Span, SyntaxContext};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};
use tracing::debug;

use crate::error::Error;
use crate::resolve::{flatten_chain, flatten_member, member_prop_name, prop_name, strip_wrappers};
use crate::syntax::SyntaxTree;

/// The function-like constructs a toggle can target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKind {
    /// `function name() {}`
    Declaration { ident: String },
    /// `function () {}` or `function name() {}` in expression position.
    Expression { ident: Option<String> },
    /// Arrow function.
    Lambda,
    /// Method, getter or setter in an object literal.
    ObjectMethod { key: String },
    /// Method, getter, setter, private method or constructor in a class body.
    ClassMethod { key: String },
}

impl FunctionKind {
    pub fn label(&self) -> &'static str {
        match self {
            FunctionKind::Declaration { .. } => "function declaration",
            FunctionKind::Expression { .. } => "function expression",
            FunctionKind::Lambda => "arrow function",
            FunctionKind::ObjectMethod { .. } => "object method",
            FunctionKind::ClassMethod { .. } => "class method",
        }
    }
}

/// Where an expression-position function sits relative to its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Slot {
    /// No container that names it.
    #[default]
    Detached,
    /// `export default function () {}` / `export default () => {}`
    DefaultExport,
    /// Callback of `import(...).then(...)`.
    ImportThen,
    /// Callback of `X(...).then(...)`; `receiver` is the flattened `X`.
    PromiseThen { receiver: String },
    /// Positional argument of a call or `new` expression.
    Argument { callee: String },
    /// Initializer of a variable, or value assigned to a plain identifier.
    Binding { name: String },
    /// Value of an object property, class field, JSX attribute or member
    /// assignment.
    Member { key: String },
}

/// A function-like construct found in the tree, with everything needed to
/// name it and to find it again for rewriting.
#[derive(Debug, Clone)]
pub struct FunctionSite {
    pub kind: FunctionKind,
    /// Span of the node the rewriter matches on: the `Function` for
    /// declarations, expressions and methods; the arrow, constructor,
    /// getter or setter node otherwise.
    pub span: Span,
    pub start_line: usize,
    pub end_line: usize,
    pub slot: Slot,
    /// Identifier of the nearest enclosing named function or class.
    pub enclosing: Option<String>,
}

/// Find the innermost function-like construct whose lines contain `line`
/// (1-based).
///
/// The construct starting on the latest line wins; constructs starting on
/// the same line are ordered by their start offset, so the innermost (or
/// last) one wins.
pub fn enclosing_function(tree: &SyntaxTree, line: usize) -> Result<FunctionSite, Error> {
    let site = collect_functions(tree)
        .into_iter()
        .filter(|site| site.start_line <= line && line <= site.end_line)
        .max_by_key(|site| (site.start_line, site.span.lo))
        .ok_or(Error::NoEnclosingFunction { line })?;
    debug!(
        line,
        kind = site.kind.label(),
        start = site.start_line,
        end = site.end_line,
        "located enclosing function"
    );
    Ok(site)
}

/// Every function-like construct with a body, in source order.
pub fn collect_functions(tree: &SyntaxTree) -> Vec<FunctionSite> {
    let mut collector = SiteCollector {
        tree,
        slot: Slot::Detached,
        named: Vec::new(),
        sites: Vec::new(),
    };
    tree.module.visit_with(&mut collector);
    collector.sites
}

/// Give an expression-bodied arrow an explicit `{ return <expr>; }` body so
/// every construct exposes a statement list.
pub fn normalize_lambda_body(arrow: &mut ArrowExpr) {
    if let BlockStmtOrExpr::Expr(expr) = &mut *arrow.body {
        let expr = mem::replace(expr, Box::new(Expr::Invalid(Invalid { span: DUMMY_SP })));
        *arrow.body = BlockStmtOrExpr::BlockStmt(BlockStmt {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            stmts: vec![Stmt::Return(ReturnStmt {
                span: DUMMY_SP,
                arg: Some(expr),
            })],
        });
    }
}

struct SiteCollector<'a> {
    tree: &'a SyntaxTree,
    /// Slot of the expression currently being visited.
    slot: Slot,
    named: Vec<String>,
    sites: Vec<FunctionSite>,
}

impl SiteCollector<'_> {
    fn record(&mut self, kind: FunctionKind, span: Span) {
        let (start_line, end_line) = self.tree.line_span(span);
        let slot = mem::take(&mut self.slot);
        self.sites.push(FunctionSite {
            kind,
            span,
            start_line,
            end_line,
            slot,
            enclosing: self.named.last().cloned(),
        });
    }

    fn with_slot(&mut self, slot: Slot, visit: impl FnOnce(&mut Self)) {
        let saved = mem::replace(&mut self.slot, slot);
        visit(self);
        self.slot = saved;
    }

    /// Visit the inside of a function or class, optionally as a named scope.
    fn within(&mut self, name: Option<String>, visit: impl FnOnce(&mut Self)) {
        let scoped = name.is_some();
        self.named.extend(name);
        self.with_slot(Slot::Detached, visit);
        if scoped {
            self.named.pop();
        }
    }

    fn visit_arguments(&mut self, callee: Option<&Expr>, args: &[ExprOrSpread]) {
        let slot = match callee {
            Some(callee) => argument_slot(callee),
            None => Slot::Argument {
                callee: String::new(),
            },
        };
        for arg in args {
            let slot = if arg.spread.is_some() {
                Slot::Detached
            } else {
                slot.clone()
            };
            self.with_slot(slot, |v| v.visit_expr(&arg.expr));
        }
    }
}

fn argument_slot(callee: &Expr) -> Slot {
    match then_receiver(callee) {
        Some(Expr::Call(CallExpr {
            callee: Callee::Import(_),
            ..
        })) => Slot::ImportThen,
        Some(receiver) if is_call(receiver) => {
            Slot::PromiseThen {
                receiver: flatten_chain(receiver),
            }
        }
        _ => Slot::Argument {
            callee: flatten_chain(callee),
        },
    }
}

/// Object of a `.then` / `?.then` member callee.
fn then_receiver(callee: &Expr) -> Option<&Expr> {
    let member = match strip_wrappers(callee) {
        Expr::Member(member) => member,
        Expr::OptChain(chain) => match &*chain.base {
            OptChainBase::Member(member) => member,
            OptChainBase::Call(_) => return None,
        },
        _ => return None,
    };
    (member_prop_name(&member.prop).as_deref() == Some("then")).then(|| strip_wrappers(&member.obj))
}

fn is_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call(_) => true,
        Expr::OptChain(chain) => matches!(&*chain.base, OptChainBase::Call(_)),
        _ => false,
    }
}

impl Visit for SiteCollector<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            // Transparent: the wrapped expression keeps the current slot.
            Expr::Paren(_)
            | Expr::TsAs(_)
            | Expr::TsSatisfies(_)
            | Expr::TsNonNull(_)
            | Expr::TsTypeAssertion(_)
            | Expr::TsConstAssertion(_)
            | Expr::TsInstantiation(_)
            | Expr::Fn(_)
            | Expr::Arrow(_) => expr.visit_children_with(self),
            _ => self.with_slot(Slot::Detached, |v| expr.visit_children_with(v)),
        }
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        let ident = decl.ident.sym.to_string();
        if decl.function.body.is_some() {
            self.record(
                FunctionKind::Declaration {
                    ident: ident.clone(),
                },
                decl.function.span,
            );
        }
        self.within(Some(ident), |v| decl.function.visit_with(v));
    }

    fn visit_fn_expr(&mut self, expr: &FnExpr) {
        let ident = expr.ident.as_ref().map(|ident| ident.sym.to_string());
        if expr.function.body.is_some() {
            self.record(
                FunctionKind::Expression {
                    ident: ident.clone(),
                },
                expr.function.span,
            );
        }
        self.within(ident, |v| expr.function.visit_with(v));
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        self.record(FunctionKind::Lambda, arrow.span);
        self.within(None, |v| arrow.visit_children_with(v));
    }

    fn visit_method_prop(&mut self, method: &MethodProp) {
        if method.function.body.is_some() {
            self.record(
                FunctionKind::ObjectMethod {
                    key: prop_name(&method.key),
                },
                method.function.span,
            );
        }
        self.within(None, |v| method.visit_children_with(v));
    }

    fn visit_getter_prop(&mut self, getter: &GetterProp) {
        if getter.body.is_some() {
            self.record(
                FunctionKind::ObjectMethod {
                    key: prop_name(&getter.key),
                },
                getter.span,
            );
        }
        self.within(None, |v| getter.visit_children_with(v));
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        if setter.body.is_some() {
            self.record(
                FunctionKind::ObjectMethod {
                    key: prop_name(&setter.key),
                },
                setter.span,
            );
        }
        self.within(None, |v| setter.visit_children_with(v));
    }

    fn visit_class_decl(&mut self, decl: &ClassDecl) {
        let ident = decl.ident.sym.to_string();
        self.within(Some(ident), |v| decl.class.visit_with(v));
    }

    fn visit_class_expr(&mut self, expr: &ClassExpr) {
        let ident = expr.ident.as_ref().map(|ident| ident.sym.to_string());
        self.within(ident, |v| expr.class.visit_with(v));
    }

    fn visit_class_method(&mut self, method: &ClassMethod) {
        if method.function.body.is_some() {
            self.record(
                FunctionKind::ClassMethod {
                    key: prop_name(&method.key),
                },
                method.function.span,
            );
        }
        self.within(None, |v| method.visit_children_with(v));
    }

    fn visit_private_method(&mut self, method: &PrivateMethod) {
        if method.function.body.is_some() {
            self.record(
                FunctionKind::ClassMethod {
                    key: format!("#{}", method.key.name),
                },
                method.function.span,
            );
        }
        self.within(None, |v| method.visit_children_with(v));
    }

    fn visit_constructor(&mut self, ctor: &Constructor) {
        if ctor.body.is_some() {
            self.record(
                FunctionKind::ClassMethod {
                    key: "constructor".to_string(),
                },
                ctor.span,
            );
        }
        self.within(None, |v| ctor.visit_children_with(v));
    }

    fn visit_class_prop(&mut self, prop: &ClassProp) {
        prop.decorators.visit_with(self);
        prop.key.visit_with(self);
        if let Some(value) = &prop.value {
            let key = prop_name(&prop.key);
            self.with_slot(Slot::Member { key }, |v| v.visit_expr(value));
        }
    }

    fn visit_private_prop(&mut self, prop: &PrivateProp) {
        prop.decorators.visit_with(self);
        if let Some(value) = &prop.value {
            let key = format!("#{}", prop.key.name);
            self.with_slot(Slot::Member { key }, |v| v.visit_expr(value));
        }
    }

    fn visit_key_value_prop(&mut self, prop: &KeyValueProp) {
        prop.key.visit_with(self);
        let key = prop_name(&prop.key);
        self.with_slot(Slot::Member { key }, |v| v.visit_expr(&prop.value));
    }

    fn visit_jsx_attr(&mut self, attr: &JSXAttr) {
        let expr = match &attr.value {
            Some(JSXAttrValue::JSXExprContainer(JSXExprContainer {
                expr: JSXExpr::Expr(expr),
                ..
            })) => expr,
            _ => return attr.visit_children_with(self),
        };
        let key = match &attr.name {
            JSXAttrName::Ident(ident) => ident.sym.to_string(),
            JSXAttrName::JSXNamespacedName(name) => format!("{}:{}", name.ns.sym, name.name.sym),
        };
        self.with_slot(Slot::Member { key }, |v| v.visit_expr(expr));
    }

    fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
        decl.name.visit_with(self);
        if let Some(init) = &decl.init {
            let slot = match &decl.name {
                Pat::Ident(binding) => Slot::Binding {
                    name: binding.id.sym.to_string(),
                },
                _ => Slot::Detached,
            };
            self.with_slot(slot, |v| v.visit_expr(init));
        }
    }

    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        assign.left.visit_with(self);
        let slot = match &assign.left {
            AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => Slot::Binding {
                name: binding.id.sym.to_string(),
            },
            AssignTarget::Simple(SimpleAssignTarget::Member(member)) => Slot::Member {
                key: flatten_member(member),
            },
            _ => Slot::Detached,
        };
        self.with_slot(slot, |v| v.visit_expr(&assign.right));
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        call.callee.visit_with(self);
        match &call.callee {
            Callee::Expr(callee) => self.visit_arguments(Some(&**callee), &call.args),
            Callee::Super(_) | Callee::Import(_) => self.visit_arguments(None, &call.args),
        }
        call.type_args.visit_with(self);
    }

    fn visit_opt_call(&mut self, call: &OptCall) {
        call.callee.visit_with(self);
        self.visit_arguments(Some(&*call.callee), &call.args);
        call.type_args.visit_with(self);
    }

    fn visit_new_expr(&mut self, new: &NewExpr) {
        new.callee.visit_with(self);
        if let Some(args) = &new.args {
            self.visit_arguments(Some(&*new.callee), args);
        }
        new.type_args.visit_with(self);
    }

    fn visit_export_default_decl(&mut self, export: &ExportDefaultDecl) {
        let slot = match &export.decl {
            DefaultDecl::Fn(_) => Slot::DefaultExport,
            _ => Slot::Detached,
        };
        self.with_slot(slot, |v| export.visit_children_with(v));
    }

    fn visit_export_default_expr(&mut self, export: &ExportDefaultExpr) {
        self.with_slot(Slot::DefaultExport, |v| v.visit_expr(&export.expr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ParseOptions;

    fn parse(source: &str) -> SyntaxTree {
        SyntaxTree::parse(source, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn picks_innermost_function() {
        let source = r#"function outer(items) {
  const doubled = items.map((item) => {
    return item * 2;
  });
  return doubled;
}
"#;
        let tree = parse(source);
        let inner = enclosing_function(&tree, 3).unwrap();
        assert_eq!(inner.kind, FunctionKind::Lambda);
        assert_eq!((inner.start_line, inner.end_line), (2, 4));

        let outer = enclosing_function(&tree, 5).unwrap();
        assert_eq!(
            outer.kind,
            FunctionKind::Declaration {
                ident: "outer".to_string()
            }
        );
    }

    #[test]
    fn same_line_prefers_later_start() {
        let tree = parse("function run() { return [1, 2].map((n) => n + 1); }\n");
        let site = enclosing_function(&tree, 1).unwrap();
        assert_eq!(site.kind, FunctionKind::Lambda);
    }

    #[test]
    fn outside_every_function_is_an_error() {
        let source = "const limit = 10;\nfunction f() {\n  return limit;\n}\n";
        let tree = parse(source);
        let err = enclosing_function(&tree, 1).unwrap_err();
        assert!(
            matches!(err, Error::NoEnclosingFunction { line: 1 }),
            "got {err:?}"
        );
        assert!(enclosing_function(&tree, 0).is_err());
        assert!(enclosing_function(&tree, 99).is_err());
    }

    #[test]
    fn bodiless_declarations_are_not_candidates() {
        let source = r#"declare function external(a: string): void;
function overloaded(a: string): string;
function overloaded(a: any) {
  return a;
}
abstract class Shape {
  abstract area(): number;
}
"#;
        let tree = parse(source);
        let sites = collect_functions(&tree);
        assert_eq!(sites.len(), 1, "got {sites:?}");
        assert_eq!(sites[0].start_line, 3);
        assert!(enclosing_function(&tree, 7).is_err());
    }

    #[test]
    fn collects_methods_accessors_and_constructors() {
        let source = r#"class Counter {
  constructor(start) { this.n = start; }
  get value() { return this.n; }
  set value(v) { this.n = v; }
  #bump() { this.n++; }
  static create() { return new Counter(0); }
}
const o = { run() {}, get x() { return 1; }, set x(v) {} };
"#;
        let tree = parse(source);
        let kinds: Vec<String> = collect_functions(&tree)
            .into_iter()
            .map(|site| match site.kind {
                FunctionKind::ClassMethod { key } => format!("class:{key}"),
                FunctionKind::ObjectMethod { key } => format!("object:{key}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [
                "class:constructor",
                "class:value",
                "class:value",
                "class:#bump",
                "class:create",
                "object:run",
                "object:x",
                "object:x",
            ]
        );
    }

    #[test]
    fn slot_does_not_leak_into_nested_expressions() {
        let source = "const pick = cond ? () => 1 : () => 2;\nconst wrapped = compose(() => 3);\n";
        let tree = parse(source);
        let slots: Vec<Slot> = collect_functions(&tree)
            .into_iter()
            .map(|site| site.slot)
            .collect();
        assert_eq!(
            slots,
            [
                Slot::Detached,
                Slot::Detached,
                Slot::Argument {
                    callee: "compose".to_string()
                },
            ]
        );
    }

    #[test]
    fn enclosing_tracks_named_scopes() {
        let source = "class Repo {\n  load = function () {\n    go();\n  };\n}\n";
        let tree = parse(source);
        let site = enclosing_function(&tree, 3).unwrap();
        assert_eq!(site.enclosing.as_deref(), Some("Repo"));
        assert_eq!(
            site.slot,
            Slot::Member {
                key: "load".to_string()
            }
        );
    }

    #[test]
    fn normalizes_expression_body() {
        let mut tree = parse("const f = () => x + 1;\n");
        let ModuleItem::Stmt(Stmt::Decl(Decl::Var(decl))) = &mut tree.module.body[0] else {
            panic!("expected a variable declaration");
        };
        let Some(Expr::Arrow(arrow)) = decl.decls[0].init.as_deref_mut() else {
            panic!("expected an arrow initializer");
        };
        normalize_lambda_body(arrow);
        let BlockStmtOrExpr::BlockStmt(block) = &*arrow.body else {
            panic!("body should be a block");
        };
        assert!(matches!(
            block.stmts.as_slice(),
            [Stmt::Return(ReturnStmt { arg: Some(_), .. })]
        ));
    }
}
