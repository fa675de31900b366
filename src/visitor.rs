use crate::symbols::{
    Diagnostic, DiagnosticKind, ImportRecord, Location, Symbol, SymbolKind, Usage, UsageKind,
};
use crate::utils::LineIndex;
use lazy_static::lazy_static;
use rustpython_ast::{self as ast, Expr, ExprContext, Stmt, TextSize};
use std::collections::HashSet;

lazy_static! {
    /// Constructors and factory functions whose results are wired up by
    /// decorators later, e.g. `app = Flask(__name__)` or `app =
    /// make_app()` followed by `@app.route(...)`. The assignment target
    /// gets a synthetic reference so the instance is not reported as an
    /// unused variable.
    static ref FRAMEWORK_FACTORIES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Flask");
        s.insert("Blueprint");
        s.insert("Celery");
        s.insert("FastAPI");
        s.insert("APIRouter");
        s.insert("Api");
        s.insert("Namespace");
        s.insert("create_app");
        s.insert("make_app");
        s.insert("create_celery");
        s.insert("make_celery");
        s.insert("app_factory");
        s
    };
}

/// Methods that register their arguments with some runtime registry or
/// signal, keeping the referenced callables alive.
const REGISTRY_METHODS: [&str; 8] = [
    "connect",
    "connect_via",
    "register",
    "add",
    "append",
    "extend",
    "update",
    "include",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Class,
    Function,
}

struct ScopeFrame {
    name: String,
    kind: ScopeKind,
}

/// Walks one parsed file and collects definitions, references, and raw
/// import facts. One instance per file; the analyzer merges the outputs.
pub struct Collector<'a> {
    pub file: String,
    pub module: String,
    pub definitions: Vec<Symbol>,
    pub usages: Vec<Usage>,
    pub imports: Vec<ImportRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Names that appear as the object of a non-literal `getattr` form.
    pub dynamic_targets: Vec<String>,
    /// `(class name, table name)` pairs from `__tablename__` string
    /// assignments in class bodies.
    pub model_tables: Vec<(String, String)>,
    scope: Vec<ScopeFrame>,
    /// One set per active function scope; names in any of them are local
    /// and do not produce usages of module-level symbols.
    locals_stack: Vec<HashSet<String>>,
    /// Direct base names of each enclosing class.
    class_bases_stack: Vec<Vec<String>>,
    line_index: &'a LineIndex,
}

impl<'a> Collector<'a> {
    pub fn new(file: String, module: String, line_index: &'a LineIndex) -> Self {
        Self {
            file,
            module,
            definitions: Vec::new(),
            usages: Vec::new(),
            imports: Vec::new(),
            diagnostics: Vec::new(),
            dynamic_targets: Vec::new(),
            model_tables: Vec::new(),
            scope: Vec::new(),
            locals_stack: Vec::new(),
            class_bases_stack: Vec::new(),
            line_index,
        }
    }

    pub fn collect(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn location(&self, offset: TextSize) -> Location {
        let (line, col) = self.line_index.line_col(offset);
        Location {
            file: self.file.clone(),
            line,
            col,
        }
    }

    fn in_function(&self) -> bool {
        self.scope.iter().any(|f| f.kind == ScopeKind::Function)
    }

    fn in_class(&self) -> bool {
        self.scope
            .last()
            .map_or(false, |f| f.kind == ScopeKind::Class)
    }

    fn mark_local(&mut self, name: &str) {
        if let Some(top) = self.locals_stack.last_mut() {
            top.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals_stack.iter().any(|set| set.contains(name))
    }

    fn qualified(&self, name: &str) -> String {
        let mut parts = vec![self.module.as_str()];
        parts.extend(self.scope.iter().map(|f| f.name.as_str()));
        parts.push(name);
        parts.join(".")
    }

    /// Qualified name of the nearest enclosing function or method, if
    /// any. References at module or class-body scope have no caller.
    fn current_caller(&self) -> Option<String> {
        let idx = self
            .scope
            .iter()
            .rposition(|f| f.kind == ScopeKind::Function)?;
        let mut parts = vec![self.module.as_str()];
        parts.extend(self.scope[..=idx].iter().map(|f| f.name.as_str()));
        Some(parts.join("."))
    }

    /// Qualified name of the innermost enclosing class, if any.
    fn enclosing_class(&self) -> Option<String> {
        let idx = self.scope.iter().rposition(|f| f.kind == ScopeKind::Class)?;
        let mut parts = vec![self.module.as_str()];
        parts.extend(self.scope[..=idx].iter().map(|f| f.name.as_str()));
        Some(parts.join("."))
    }

    fn push_usage(
        &mut self,
        name: String,
        chain: Option<String>,
        kind: UsageKind,
        offset: TextSize,
    ) {
        let usage = Usage {
            name,
            attribute_chain: chain,
            kind,
            location: self.location(offset),
            caller: self.current_caller(),
            module: self.module.clone(),
        };
        self.usages.push(usage);
    }

    fn define(&mut self, symbol: Symbol) {
        self.definitions.push(symbol);
    }

    fn define_variable(&mut self, name: &str, offset: TextSize) {
        let qualified_name = self.qualified(name);
        let location = self.location(offset);
        let parent_class = if self.in_class() {
            self.enclosing_class()
        } else {
            None
        };
        self.define(Symbol {
            qualified_name,
            name: name.to_string(),
            kind: SymbolKind::Variable,
            location,
            decorators: Vec::new(),
            is_entrypoint: false,
            entrypoint_reasons: Vec::new(),
            parent_class,
            parent_class_bases: Vec::new(),
            noqa_codes: Default::default(),
            dynamic_risk: false,
        });
    }

    // === statements ===

    pub fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(node) => {
                self.visit_function_def(
                    node.name.as_str(),
                    &node.decorator_list,
                    &node.args,
                    node.returns.as_deref(),
                    &node.body,
                    node.range.start(),
                );
            }
            Stmt::AsyncFunctionDef(node) => {
                self.visit_function_def(
                    node.name.as_str(),
                    &node.decorator_list,
                    &node.args,
                    node.returns.as_deref(),
                    &node.body,
                    node.range.start(),
                );
            }
            Stmt::ClassDef(node) => self.visit_class_def(node),
            Stmt::Import(node) => self.visit_import(node),
            Stmt::ImportFrom(node) => self.visit_import_from(node),
            Stmt::Assign(node) => self.visit_assign(node),
            Stmt::AnnAssign(node) => {
                if let Expr::Name(target) = &*node.target {
                    if self.in_function() {
                        self.mark_local(target.id.as_str());
                    } else {
                        self.define_variable(target.id.as_str(), node.range.start());
                    }
                }
                self.visit_annotation(&node.annotation);
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::AugAssign(node) => {
                if let Expr::Name(target) = &*node.target {
                    if self.in_function() {
                        self.mark_local(target.id.as_str());
                    } else {
                        // Both a definition and a read.
                        self.define_variable(target.id.as_str(), node.range.start());
                        self.push_usage(
                            target.id.to_string(),
                            Some(target.id.to_string()),
                            UsageKind::NameRef,
                            node.range.start(),
                        );
                    }
                } else {
                    self.visit_expr(&node.target);
                }
                self.visit_expr(&node.value);
            }
            Stmt::Expr(node) => self.visit_expr(&node.value),
            Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Assert(node) => {
                self.visit_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Delete(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
            }
            Stmt::If(node) => {
                self.visit_expr(&node.test);
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::While(node) => {
                self.visit_expr(&node.test);
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::For(node) => {
                self.bind_loop_target(&node.target);
                self.visit_expr(&node.iter);
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::AsyncFor(node) => {
                self.bind_loop_target(&node.target);
                self.visit_expr(&node.iter);
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::With(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_loop_target(vars);
                    }
                }
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_loop_target(vars);
                    }
                }
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::Try(node) => {
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_);
                    }
                    if let Some(name) = &handler.name {
                        self.mark_local(name.as_str());
                    }
                    for stmt in &handler.body {
                        self.visit_stmt(stmt);
                    }
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.finalbody {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::TryStar(node) => {
                for stmt in &node.body {
                    self.visit_stmt(stmt);
                }
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_);
                    }
                    if let Some(name) = &handler.name {
                        self.mark_local(name.as_str());
                    }
                    for stmt in &handler.body {
                        self.visit_stmt(stmt);
                    }
                }
                for stmt in &node.orelse {
                    self.visit_stmt(stmt);
                }
                for stmt in &node.finalbody {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::Match(node) => {
                self.visit_expr(&node.subject);
                for case in &node.cases {
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    for stmt in &case.body {
                        self.visit_stmt(stmt);
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_function_def(
        &mut self,
        name: &str,
        decorator_list: &[Expr],
        args: &ast::Arguments,
        returns: Option<&Expr>,
        body: &[Stmt],
        offset: TextSize,
    ) {
        // Decorators, annotations, and defaults evaluate in the
        // enclosing scope.
        let decorators = self.record_decorators(decorator_list);
        for arg in args
            .posonlyargs
            .iter()
            .chain(args.args.iter())
            .chain(args.kwonlyargs.iter())
        {
            if let Some(annotation) = &arg.def.annotation {
                self.visit_annotation(annotation);
            }
            if let Some(default) = &arg.default {
                self.visit_expr(default);
            }
        }
        if let Some(returns) = returns {
            self.visit_annotation(returns);
        }

        let is_method = self.in_class();
        let kind = if is_method {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let parent_class = if is_method { self.enclosing_class() } else { None };
        let parent_class_bases = if is_method {
            self.class_bases_stack.last().cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        let qualified_name = self.qualified(name);
        let location = self.location(offset);
        self.define(Symbol {
            qualified_name,
            name: name.to_string(),
            kind,
            location,
            decorators,
            is_entrypoint: false,
            entrypoint_reasons: Vec::new(),
            parent_class,
            parent_class_bases,
            noqa_codes: Default::default(),
            dynamic_risk: false,
        });

        self.scope.push(ScopeFrame {
            name: name.to_string(),
            kind: ScopeKind::Function,
        });
        self.locals_stack.push(HashSet::new());
        for arg in args
            .posonlyargs
            .iter()
            .chain(args.args.iter())
            .chain(args.kwonlyargs.iter())
        {
            let param = arg.def.arg.as_str();
            if param != "self" && param != "cls" {
                self.mark_local(param);
            }
        }
        if let Some(vararg) = &args.vararg {
            self.mark_local(vararg.arg.as_str());
        }
        if let Some(kwarg) = &args.kwarg {
            self.mark_local(kwarg.arg.as_str());
        }
        for stmt in body {
            self.visit_stmt(stmt);
        }
        self.locals_stack.pop();
        self.scope.pop();
    }

    fn visit_class_def(&mut self, node: &ast::StmtClassDef) {
        let decorators = self.record_decorators(&node.decorator_list);

        let mut bases = Vec::new();
        for base in &node.bases {
            if let Some(chain) = dotted_chain(base) {
                bases.push(chain);
            }
            self.record_reference(base);
        }
        for keyword in &node.keywords {
            self.visit_expr(&keyword.value);
        }

        let qualified_name = self.qualified(node.name.as_str());
        let location = self.location(node.range.start());
        self.define(Symbol {
            qualified_name,
            name: node.name.to_string(),
            kind: SymbolKind::Class,
            location,
            decorators,
            is_entrypoint: false,
            entrypoint_reasons: Vec::new(),
            parent_class: None,
            parent_class_bases: bases.clone(),
            noqa_codes: Default::default(),
            dynamic_risk: false,
        });

        self.scope.push(ScopeFrame {
            name: node.name.to_string(),
            kind: ScopeKind::Class,
        });
        self.class_bases_stack.push(bases);
        for stmt in &node.body {
            self.visit_stmt(stmt);
        }
        self.class_bases_stack.pop();
        self.scope.pop();
    }

    fn visit_import(&mut self, node: &ast::StmtImport) {
        for alias in &node.names {
            let module_text = alias.name.to_string();
            let local = alias
                .asname
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| {
                    module_text
                        .split('.')
                        .next()
                        .unwrap_or(&module_text)
                        .to_string()
                });
            self.record_import_binding(
                module_text.clone(),
                None,
                alias.asname.as_ref().map(|a| a.to_string()),
                0,
                local,
                node.range.start(),
            );
            let leaf = module_text
                .rsplit('.')
                .next()
                .unwrap_or(&module_text)
                .to_string();
            self.push_usage(
                leaf,
                Some(module_text),
                UsageKind::ImportRef,
                node.range.start(),
            );
        }
    }

    fn visit_import_from(&mut self, node: &ast::StmtImportFrom) {
        // Compiler directive, not a real import.
        if let Some(module) = &node.module {
            if module.as_str() == "__future__" {
                return;
            }
        }
        let module_text = node
            .module
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        let level = node.level.as_ref().map_or(0, |l| l.to_u32() as usize);

        for alias in &node.names {
            if alias.name.as_str() == "*" {
                self.imports.push(ImportRecord {
                    module_text: module_text.clone(),
                    imported_name: None,
                    alias: None,
                    level,
                    is_star: true,
                    local_name: String::new(),
                    location: self.location(node.range.start()),
                    from_module: self.module.clone(),
                });
                continue;
            }
            let name = alias.name.to_string();
            let local = alias
                .asname
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| name.clone());
            self.record_import_binding(
                module_text.clone(),
                Some(name.clone()),
                alias.asname.as_ref().map(|a| a.to_string()),
                level,
                local,
                node.range.start(),
            );
            if level == 0 && !module_text.is_empty() {
                self.push_usage(
                    name.clone(),
                    Some(format!("{}.{}", module_text, name)),
                    UsageKind::ImportRef,
                    node.range.start(),
                );
            }
        }
    }

    fn record_import_binding(
        &mut self,
        module_text: String,
        imported_name: Option<String>,
        alias: Option<String>,
        level: usize,
        local: String,
        offset: TextSize,
    ) {
        self.imports.push(ImportRecord {
            module_text,
            imported_name,
            alias,
            level,
            is_star: false,
            local_name: local.clone(),
            location: self.location(offset),
            from_module: self.module.clone(),
        });
        if self.in_function() {
            self.mark_local(&local);
            return;
        }
        let qualified_name = self.qualified(&local);
        let location = self.location(offset);
        self.define(Symbol {
            qualified_name,
            name: local,
            kind: SymbolKind::Import,
            location,
            decorators: Vec::new(),
            is_entrypoint: false,
            entrypoint_reasons: Vec::new(),
            parent_class: None,
            parent_class_bases: Vec::new(),
            noqa_codes: Default::default(),
            dynamic_risk: false,
        });
    }

    fn visit_assign(&mut self, node: &ast::StmtAssign) {
        // `__all__ = [...]` re-exports every listed name.
        if !self.in_function() && !self.in_class() {
            if let Some(Expr::Name(target)) = node.targets.first() {
                if target.id.as_str() == "__all__" {
                    self.record_dunder_all(&node.value);
                }
            }
        }

        // `__tablename__ = 'users'` maps the enclosing model class to
        // its table name, so ForeignKey("users.id") references reach it.
        if self.in_class() && node.targets.len() == 1 {
            if let (Some(Expr::Name(target)), Expr::Constant(constant)) =
                (node.targets.first(), &*node.value)
            {
                if target.id.as_str() == "__tablename__" {
                    if let ast::Constant::Str(table) = &constant.value {
                        if let Some(class_name) = self.scope.last().map(|f| f.name.clone()) {
                            self.model_tables.push((class_name, table.to_string()));
                        }
                    }
                }
            }
        }

        let single =
            node.targets.len() == 1 && matches!(node.targets.first(), Some(Expr::Name(_)));
        for target in &node.targets {
            self.bind_target(target, single);
            // Registry pattern: HANDLERS['key'] = func keeps func alive.
            if let Expr::Subscript(sub) = target {
                self.visit_expr(&sub.value);
                self.visit_expr(&sub.slice);
                if let Expr::Name(value) = &*node.value {
                    self.push_usage(
                        value.id.to_string(),
                        Some(value.id.to_string()),
                        UsageKind::NameRef,
                        node.range.start(),
                    );
                }
            }
        }

        // Factory pattern: app = Flask(__name__). Decorators will
        // reference the instance, so the variable is implicitly used.
        // The synthetic reference is anchored at the value expression so
        // it is not mistaken for the definition site.
        if !self.in_function() {
            if let (Some(Expr::Name(target)), Expr::Call(call)) =
                (node.targets.first(), &*node.value)
            {
                if node.targets.len() == 1 {
                    if let Some(chain) = dotted_chain(&call.func) {
                        let leaf = chain.rsplit('.').next().unwrap_or(&chain);
                        if FRAMEWORK_FACTORIES.contains(leaf) {
                            self.push_usage(
                                target.id.to_string(),
                                Some(target.id.to_string()),
                                UsageKind::NameRef,
                                call.range.start(),
                            );
                        }
                    }
                }
            }
        }

        self.visit_expr(&node.value);
    }

    fn record_dunder_all(&mut self, value: &Expr) {
        let elements = match value {
            Expr::List(list) => &list.elts,
            Expr::Tuple(tuple) => &tuple.elts,
            _ => return,
        };
        for element in elements {
            if let Expr::Constant(constant) = element {
                if let ast::Constant::Str(name) = &constant.value {
                    self.push_usage(
                        name.to_string(),
                        Some(name.to_string()),
                        UsageKind::NameRef,
                        constant.range.start(),
                    );
                }
            }
        }
    }

    fn bind_target(&mut self, target: &Expr, single: bool) {
        match target {
            Expr::Name(name) => {
                if self.in_function() {
                    self.mark_local(name.id.as_str());
                } else if self.in_class() {
                    // Only simple class attributes become symbols.
                    if single {
                        self.define_variable(name.id.as_str(), name.range.start());
                    }
                } else {
                    self.define_variable(name.id.as_str(), name.range.start());
                }
            }
            Expr::Tuple(tuple) => {
                if !self.in_class() {
                    for element in &tuple.elts {
                        self.bind_target(element, false);
                    }
                }
            }
            Expr::List(list) => {
                if !self.in_class() {
                    for element in &list.elts {
                        self.bind_target(element, false);
                    }
                }
            }
            Expr::Starred(starred) => self.bind_target(&starred.value, single),
            Expr::Attribute(attr) => self.visit_expr(&attr.value),
            _ => {}
        }
    }

    fn bind_loop_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                if self.in_function() {
                    self.mark_local(name.id.as_str());
                }
                // Loop targets at module scope are not definitions.
            }
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.bind_loop_target(element);
                }
            }
            Expr::List(list) => {
                for element in &list.elts {
                    self.bind_loop_target(element);
                }
            }
            Expr::Starred(starred) => self.bind_loop_target(&starred.value),
            _ => {}
        }
    }

    // === decorators ===

    fn record_decorators(&mut self, decorator_list: &[Expr]) -> Vec<String> {
        let mut decorators = Vec::new();
        for decorator in decorator_list {
            decorators.push(normalize_decorator(decorator));

            let callable = match decorator {
                Expr::Call(call) => &*call.func,
                other => other,
            };
            if let Some(chain) = dotted_chain(callable) {
                let leaf = chain.rsplit('.').next().unwrap_or(&chain).to_string();
                self.push_usage(
                    leaf,
                    Some(chain),
                    UsageKind::DecoratorRef,
                    decorator_offset(decorator),
                );
            }
            // Decorator arguments are ordinary expressions.
            if let Expr::Call(call) = decorator {
                for arg in &call.args {
                    self.visit_expr(arg);
                }
                for keyword in &call.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
        }
        decorators
    }

    // === expressions ===

    pub fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(node) => {
                if matches!(node.ctx, ExprContext::Load | ExprContext::Del) {
                    let id = node.id.as_str();
                    if id != "self" && id != "cls" && !self.is_local(id) {
                        self.push_usage(
                            id.to_string(),
                            Some(id.to_string()),
                            UsageKind::NameRef,
                            node.range.start(),
                        );
                    }
                }
            }
            Expr::Call(node) => self.visit_call(node),
            Expr::Attribute(node) => {
                if matches!(node.ctx, ExprContext::Load | ExprContext::Del) {
                    self.record_attribute(node);
                }
                // Bases that are themselves calls or subscripts still
                // carry references.
                if !matches!(&*node.value, Expr::Name(_) | Expr::Attribute(_)) {
                    self.visit_expr(&node.value);
                }
            }
            Expr::BoolOp(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::BinOp(node) => {
                self.visit_expr(&node.left);
                self.visit_expr(&node.right);
            }
            Expr::UnaryOp(node) => self.visit_expr(&node.operand),
            Expr::Lambda(node) => self.visit_expr(&node.body),
            Expr::IfExp(node) => {
                self.visit_expr(&node.test);
                self.visit_expr(&node.body);
                self.visit_expr(&node.orelse);
            }
            Expr::Dict(node) => {
                for key in node.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::Set(node) => {
                for element in &node.elts {
                    self.visit_expr(element);
                }
            }
            Expr::ListComp(node) => {
                self.visit_comprehensions(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::SetComp(node) => {
                self.visit_comprehensions(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::DictComp(node) => {
                self.visit_comprehensions(&node.generators);
                self.visit_expr(&node.key);
                self.visit_expr(&node.value);
            }
            Expr::GeneratorExp(node) => {
                self.visit_comprehensions(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::Await(node) => self.visit_expr(&node.value),
            Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Expr::YieldFrom(node) => self.visit_expr(&node.value),
            Expr::Compare(node) => {
                self.visit_expr(&node.left);
                for comparator in &node.comparators {
                    self.visit_expr(comparator);
                }
            }
            Expr::Subscript(node) => {
                self.visit_expr(&node.value);
                self.visit_expr(&node.slice);
            }
            Expr::Starred(node) => self.visit_expr(&node.value),
            Expr::FormattedValue(node) => self.visit_expr(&node.value),
            Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::List(node) => {
                for element in &node.elts {
                    self.visit_expr(element);
                }
            }
            Expr::Tuple(node) => {
                for element in &node.elts {
                    self.visit_expr(element);
                }
            }
            Expr::Slice(node) => {
                if let Some(lower) = &node.lower {
                    self.visit_expr(lower);
                }
                if let Some(upper) = &node.upper {
                    self.visit_expr(upper);
                }
                if let Some(step) = &node.step {
                    self.visit_expr(step);
                }
            }
            Expr::NamedExpr(node) => {
                if let Expr::Name(target) = &*node.target {
                    if self.in_function() {
                        self.mark_local(target.id.as_str());
                    }
                }
                self.visit_expr(&node.value);
            }
            _ => {}
        }
    }

    fn visit_comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.bind_loop_target(&generator.target);
            self.visit_expr(&generator.iter);
            for if_clause in &generator.ifs {
                self.visit_expr(if_clause);
            }
        }
    }

    fn visit_call(&mut self, node: &ast::ExprCall) {
        self.check_dynamic_access(node);
        self.check_registry_call(node);
        self.check_sqlalchemy_patterns(node);

        match self.callee_chain(&node.func) {
            Some(chain) => {
                let leaf = chain.rsplit('.').next().unwrap_or(&chain).to_string();
                self.push_usage(leaf, Some(chain), UsageKind::Call, node.range.start());
                // The object of a method call is itself a reference.
                if let Expr::Attribute(attr) = &*node.func {
                    self.visit_expr(&attr.value);
                }
            }
            None => {
                // Chained or computed callees: visiting the callee
                // expression covers the object and any inner calls.
                if !matches!(&*node.func, Expr::Name(_)) {
                    self.visit_expr(&node.func);
                }
            }
        }
        for arg in &node.args {
            self.visit_expr(arg);
        }
        for keyword in &node.keywords {
            self.visit_expr(&keyword.value);
        }
    }

    /// Dotted chain of a callee. `self.m()` and `cls.m()` inside a class
    /// are qualified to the enclosing class so the method link is exact.
    fn callee_chain(&self, func: &Expr) -> Option<String> {
        if let Expr::Attribute(attr) = func {
            if let Expr::Name(base) = &*attr.value {
                let base_id = base.id.as_str();
                if base_id == "self" || base_id == "cls" {
                    if let Some(class) = self.enclosing_class() {
                        return Some(format!("{}.{}", class, attr.attr));
                    }
                }
            }
        }
        match func {
            Expr::Name(name) => {
                if self.is_local(name.id.as_str()) {
                    None
                } else {
                    Some(name.id.to_string())
                }
            }
            _ => dotted_chain(func),
        }
    }

    fn record_attribute(&mut self, node: &ast::ExprAttribute) {
        if let Expr::Name(base) = &*node.value {
            let base_id = base.id.as_str();
            if base_id == "self" || base_id == "cls" {
                if let Some(class) = self.enclosing_class() {
                    self.push_usage(
                        node.attr.to_string(),
                        Some(format!("{}.{}", class, node.attr)),
                        UsageKind::Attribute,
                        node.range.start(),
                    );
                }
                return;
            }
            // Model.query marks the model as used through the ORM.
            if node.attr.as_str() == "query" {
                self.push_usage(
                    base.id.to_string(),
                    Some(base.id.to_string()),
                    UsageKind::OrmRef,
                    node.range.start(),
                );
            }
        }
        let chain = dotted_chain_of_attribute(node);
        self.push_usage(
            node.attr.to_string(),
            chain,
            UsageKind::Attribute,
            node.range.start(),
        );
    }

    /// `getattr(x, "name")` and friends. A literal attribute name becomes
    /// a synthetic reference; a dynamic one is recorded as a risk on the
    /// object.
    fn check_dynamic_access(&mut self, node: &ast::ExprCall) {
        let func_name = match &*node.func {
            Expr::Name(name) => name.id.as_str(),
            _ => return,
        };
        if !matches!(func_name, "getattr" | "hasattr" | "setattr" | "delattr") {
            return;
        }
        if node.args.len() < 2 {
            return;
        }
        match &node.args[1] {
            Expr::Constant(constant) => {
                if let ast::Constant::Str(name) = &constant.value {
                    self.push_usage(
                        name.to_string(),
                        Some(name.to_string()),
                        UsageKind::NameRef,
                        constant.range.start(),
                    );
                }
            }
            _ => {
                let location = self.location(node.range.start());
                self.diagnostics.push(Diagnostic {
                    file: location.file,
                    line: location.line,
                    kind: DiagnosticKind::Dynamic,
                    message: format!("non-literal {} cannot be resolved statically", func_name),
                });
                if let Some(Expr::Name(base)) = node.args.first() {
                    self.dynamic_targets.push(base.id.to_string());
                }
            }
        }
    }

    /// `signal.connect(f)`, `registry.register(f)`, `handlers.extend([f])`
    /// and similar registration calls keep their arguments alive.
    fn check_registry_call(&mut self, node: &ast::ExprCall) {
        let attr = match &*node.func {
            Expr::Attribute(attr) => attr.attr.as_str(),
            _ => return,
        };
        if !REGISTRY_METHODS.contains(&attr) {
            return;
        }
        for arg in &node.args {
            self.record_registered(arg);
        }
    }

    fn record_registered(&mut self, arg: &Expr) {
        match arg {
            Expr::Name(name) => {
                if !self.is_local(name.id.as_str()) {
                    self.push_usage(
                        name.id.to_string(),
                        Some(name.id.to_string()),
                        UsageKind::NameRef,
                        name.range.start(),
                    );
                }
            }
            Expr::List(list) => {
                for element in &list.elts {
                    self.record_registered(element);
                }
            }
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.record_registered(element);
                }
            }
            Expr::Dict(dict) => {
                for value in &dict.values {
                    self.record_registered(value);
                }
            }
            _ => {}
        }
    }

    /// SQLAlchemy ORM call patterns. A model referenced only through
    /// the ORM (`session.query(User)`, `relationship("User")`,
    /// `ForeignKey("users.id")`, `backref("posts")`) still counts as
    /// used.
    fn check_sqlalchemy_patterns(&mut self, node: &ast::ExprCall) {
        // session.query(Model) or db.session.query(Model)
        if is_session_query_call(node) {
            for arg in &node.args {
                if let Expr::Name(name) = arg {
                    self.record_orm_usage(name.id.to_string(), name.range.start());
                }
            }
        }

        // relationship("Model") or relationship(Model), plus the
        // backref keyword.
        if callee_leaf_is(node, "relationship") {
            if let Some(arg) = node.args.first() {
                match arg {
                    Expr::Constant(constant) => {
                        if let ast::Constant::Str(target) = &constant.value {
                            self.record_orm_usage(target.to_string(), constant.range.start());
                        }
                    }
                    Expr::Name(name) => {
                        self.record_orm_usage(name.id.to_string(), name.range.start());
                    }
                    _ => {}
                }
            }
            for keyword in &node.keywords {
                if keyword.arg.as_ref().map(|k| k.as_str()) == Some("backref") {
                    if let Expr::Constant(constant) = &keyword.value {
                        if let ast::Constant::Str(target) = &constant.value {
                            self.record_orm_usage(target.to_string(), constant.range.start());
                        }
                    }
                }
            }
        }

        // ForeignKey("tablename.field") references the table's model.
        if callee_leaf_is(node, "ForeignKey") {
            if let Some(Expr::Constant(constant)) = node.args.first() {
                if let ast::Constant::Str(target) = &constant.value {
                    let table = target.split('.').next().unwrap_or(target);
                    self.record_orm_usage(table.to_string(), constant.range.start());
                }
            }
        }

        // backref("name")
        if callee_leaf_is(node, "backref") {
            if let Some(Expr::Constant(constant)) = node.args.first() {
                if let ast::Constant::Str(target) = &constant.value {
                    self.record_orm_usage(target.to_string(), constant.range.start());
                }
            }
        }
    }

    fn record_orm_usage(&mut self, name: String, offset: TextSize) {
        self.push_usage(name.clone(), Some(name), UsageKind::OrmRef, offset);
    }

    /// Base classes and other bare references that may be dotted.
    fn record_reference(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(node) => {
                if !self.is_local(node.id.as_str()) {
                    self.push_usage(
                        node.id.to_string(),
                        Some(node.id.to_string()),
                        UsageKind::NameRef,
                        node.range.start(),
                    );
                }
            }
            Expr::Attribute(node) => {
                let chain = dotted_chain_of_attribute(node);
                self.push_usage(
                    node.attr.to_string(),
                    chain,
                    UsageKind::Attribute,
                    node.range.start(),
                );
            }
            Expr::Subscript(node) => {
                // Generic[T] style bases.
                self.record_reference(&node.value);
                self.visit_expr(&node.slice);
            }
            _ => self.visit_expr(expr),
        }
    }

    /// Recursively records type references inside an annotation,
    /// including `Optional[X]`, `Dict[K, V]`, and `A | B` forms.
    fn visit_annotation(&mut self, node: &Expr) {
        match node {
            Expr::Name(name) => {
                if !self.is_local(name.id.as_str()) {
                    self.push_usage(
                        name.id.to_string(),
                        Some(name.id.to_string()),
                        UsageKind::NameRef,
                        name.range.start(),
                    );
                }
            }
            Expr::Attribute(attr) => {
                let chain = dotted_chain_of_attribute(attr);
                self.push_usage(
                    attr.attr.to_string(),
                    chain,
                    UsageKind::Attribute,
                    attr.range.start(),
                );
            }
            Expr::Subscript(sub) => {
                self.visit_annotation(&sub.value);
                match &*sub.slice {
                    Expr::Tuple(tuple) => {
                        for element in &tuple.elts {
                            self.visit_annotation(element);
                        }
                    }
                    other => self.visit_annotation(other),
                }
            }
            Expr::BinOp(binop) => {
                self.visit_annotation(&binop.left);
                self.visit_annotation(&binop.right);
            }
            // String forward references stay out of the graph.
            Expr::Constant(_) => {}
            _ => {}
        }
    }
}

/// Builds the dotted path of a pure `Name`/`Attribute` chain.
pub fn dotted_chain(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name) => Some(name.id.to_string()),
        Expr::Attribute(attr) => {
            dotted_chain(&attr.value).map(|base| format!("{}.{}", base, attr.attr))
        }
        _ => None,
    }
}

fn dotted_chain_of_attribute(node: &ast::ExprAttribute) -> Option<String> {
    dotted_chain(&node.value).map(|base| format!("{}.{}", base, node.attr))
}

/// `session.query(...)` and `db.session.query(...)` calls.
fn is_session_query_call(node: &ast::ExprCall) -> bool {
    match &*node.func {
        Expr::Attribute(attr) if attr.attr.as_str() == "query" => match &*attr.value {
            Expr::Name(name) => matches!(name.id.as_str(), "session" | "Session"),
            Expr::Attribute(inner) => inner.attr.as_str() == "session",
            _ => false,
        },
        _ => false,
    }
}

/// Calls whose callee leaf matches, bare (`relationship(...)`) or
/// dotted (`db.relationship(...)`).
fn callee_leaf_is(node: &ast::ExprCall, leaf: &str) -> bool {
    match &*node.func {
        Expr::Name(name) => name.id.as_str() == leaf,
        Expr::Attribute(attr) => attr.attr.as_str() == leaf,
        _ => false,
    }
}

fn decorator_offset(decorator: &Expr) -> TextSize {
    match decorator {
        Expr::Call(call) => call.range.start(),
        Expr::Attribute(attr) => attr.range.start(),
        Expr::Name(name) => name.range.start(),
        _ => TextSize::from(0),
    }
}

/// Stringifies a decorator deterministically as `dotted.path` or
/// `dotted.path(arg, …)`. Literal arguments are rendered from their
/// values and truncated to 64 characters; anything non-literal renders
/// as `…`.
pub fn normalize_decorator(expr: &Expr) -> String {
    match expr {
        Expr::Call(call) => {
            let base = dotted_chain(&call.func).unwrap_or_else(|| "<dynamic>".to_string());
            let mut rendered = Vec::new();
            for arg in &call.args {
                rendered.push(render_argument(arg));
            }
            for keyword in &call.keywords {
                match &keyword.arg {
                    Some(name) => {
                        rendered.push(format!("{}={}", name, render_argument(&keyword.value)))
                    }
                    None => rendered.push(format!("**{}", render_argument(&keyword.value))),
                }
            }
            format!("{}({})", base, rendered.join(", "))
        }
        _ => dotted_chain(expr).unwrap_or_else(|| "<dynamic>".to_string()),
    }
}

fn render_argument(expr: &Expr) -> String {
    match literal_repr(expr) {
        Some(text) => truncate(&text, 64),
        None => "…".to_string(),
    }
}

fn literal_repr(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Constant(constant) => constant_repr(&constant.value),
        Expr::List(list) => {
            let items = list
                .elts
                .iter()
                .map(literal_repr)
                .collect::<Option<Vec<_>>>()?;
            Some(format!("[{}]", items.join(", ")))
        }
        Expr::Tuple(tuple) => {
            let items = tuple
                .elts
                .iter()
                .map(literal_repr)
                .collect::<Option<Vec<_>>>()?;
            Some(format!("({})", items.join(", ")))
        }
        _ => None,
    }
}

fn constant_repr(constant: &ast::Constant) -> Option<String> {
    match constant {
        ast::Constant::Str(value) => Some(format!("'{}'", value)),
        ast::Constant::Int(value) => Some(value.to_string()),
        ast::Constant::Float(value) => Some(value.to_string()),
        ast::Constant::Bool(value) => Some(if *value { "True" } else { "False" }.to_string()),
        ast::Constant::None => Some("None".to_string()),
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
