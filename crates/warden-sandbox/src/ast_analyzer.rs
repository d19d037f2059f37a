//! Static analysis of untrusted Python source before it is ever handed to
//! an interpreter.
//!
//! Parsing happens first — a syntax error is itself a refusal, not a panic
//! further down the pipeline. The walk tracks nesting depth, loop depth,
//! and every import/call/attribute node, flagging anything outside the
//! policy's allow-lists without attempting to "fix" the source.

use rustpython_parser::ast::{self, Expr, Stmt};
use rustpython_parser::{Mode, parse};

use warden_types::{SandboxPolicy, Violation, ViolationKind};

/// Dunder attributes a restricted program may still read — everything
/// else under `__...__` is assumed to be a reflection/escape primitive.
const ALLOWED_DUNDERS: &[&str] = &[
    "__init__", "__str__", "__repr__", "__len__", "__iter__", "__next__",
    "__contains__", "__add__", "__sub__", "__mul__", "__eq__", "__ne__",
    "__lt__", "__gt__", "__le__", "__ge__", "__hash__",
];

/// Attributes that reach into interpreter internals regardless of the
/// dunder allow-list — these stay blocked even if spelled without dunders
/// in a future Python grammar.
const SENSITIVE_ATTRS: &[&str] = &[
    "__class__", "__bases__", "__subclasses__", "__globals__", "__code__",
    "__closure__", "__dict__", "__module__", "__mro__",
];

/// Method names that reach outside the sandbox regardless of which object
/// they're called on (`os.system`, `socket.connect`, `file.write`, ...).
const DANGEROUS_METHODS: &[&str] = &[
    "system", "popen", "spawn", "exec", "eval", "call", "check_output", "run",
    "connect", "bind", "listen", "read", "write", "open",
    "__getattribute__", "__setattr__", "__delattr__",
];

/// Walks a parsed module, collecting [`Violation`]s against `policy`.
pub struct AstAnalyzer<'a> {
    policy: &'a SandboxPolicy,
    violations: Vec<Violation>,
    depth: u32,
}

impl<'a> AstAnalyzer<'a> {
    /// Build an analyzer bound to `policy`'s import/builtin allow-lists
    /// and AST depth bound.
    #[must_use]
    pub fn new(policy: &'a SandboxPolicy) -> Self {
        Self {
            policy,
            violations: Vec::new(),
            depth: 0,
        }
    }

    /// Parse and walk `code`, returning every violation found. An empty
    /// vector means the source is safe to pass on to the SafeEnv-backed
    /// interpreter.
    pub fn check(mut self, code: &str) -> Vec<Violation> {
        let module = match parse(code, Mode::Module, "<sandbox>") {
            Ok(m) => m,
            Err(err) => {
                return vec![Violation::new(
                    ViolationKind::AstDepth,
                    format!("syntax error: {err}"),
                )];
            }
        };

        let ast::Mod::Module(module) = module else {
            self.violations.push(Violation::new(
                ViolationKind::AstDepth,
                "expected a module-level program",
            ));
            return self.violations;
        };

        for stmt in &module.body {
            self.visit_stmt(stmt);
        }
        self.violations
    }

    fn enter(&mut self) -> bool {
        self.depth += 1;
        if self.depth > self.policy.max_ast_depth {
            self.violations.push(Violation::new(
                ViolationKind::AstDepth,
                format!("AST depth exceeds maximum ({})", self.policy.max_ast_depth),
            ));
            return false;
        }
        true
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if !self.enter() {
            self.depth -= 1;
            return;
        }

        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    self.check_import(alias.name.as_str());
                }
            }
            Stmt::ImportFrom(import) => {
                if let Some(module) = &import.module {
                    self.check_import(module.as_str());
                }
            }
            Stmt::While(stmt_while) => {
                let is_while_true = matches!(
                    stmt_while.test.as_ref(),
                    Expr::Constant(c) if matches!(c.value, ast::Constant::Bool(true))
                );
                if is_while_true && !body_has_break(&stmt_while.body) {
                    self.violations.push(Violation::new(
                        ViolationKind::InfiniteLoop,
                        "'while True' with no reachable break",
                    ));
                }
                for s in &stmt_while.body {
                    self.visit_stmt(s);
                }
                for s in &stmt_while.orelse {
                    self.visit_stmt(s);
                }
            }
            Stmt::For(stmt_for) => {
                self.visit_expr(&stmt_for.iter);
                for s in &stmt_for.body {
                    self.visit_stmt(s);
                }
                for s in &stmt_for.orelse {
                    self.visit_stmt(s);
                }
            }
            Stmt::FunctionDef(f) => {
                for s in &f.body {
                    self.visit_stmt(s);
                }
            }
            Stmt::If(stmt_if) => {
                self.visit_expr(&stmt_if.test);
                for s in &stmt_if.body {
                    self.visit_stmt(s);
                }
                for s in &stmt_if.orelse {
                    self.visit_stmt(s);
                }
            }
            Stmt::Expr(expr_stmt) => self.visit_expr(&expr_stmt.value),
            Stmt::Assign(assign) => self.visit_expr(&assign.value),
            _ => {}
        }

        self.depth -= 1;
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(call) => {
                match call.func.as_ref() {
                    Expr::Name(name) => {
                        let id = name.id.as_str();
                        if self.policy.blocked_builtins.contains(id) {
                            self.violations.push(Violation::new(
                                ViolationKind::BlockedBuiltin,
                                format!("blocked function call: {id}()"),
                            ));
                        } else if id == "__import__" {
                            self.violations.push(Violation::new(
                                ViolationKind::BlockedBuiltin,
                                "dynamic import via __import__ is blocked",
                            ));
                        }
                    }
                    Expr::Attribute(attr) => {
                        if DANGEROUS_METHODS.contains(&attr.attr.as_str()) {
                            self.violations.push(Violation::new(
                                ViolationKind::BlockedBuiltin,
                                format!("blocked method call: .{}()", attr.attr),
                            ));
                        }
                    }
                    _ => {}
                }
                for arg in &call.args {
                    self.visit_expr(arg);
                }
            }
            Expr::Attribute(attr) => {
                let name = attr.attr.as_str();
                if name.starts_with("__") && name.ends_with("__") && !ALLOWED_DUNDERS.contains(&name) {
                    self.violations.push(Violation::new(
                        ViolationKind::BlockedBuiltin,
                        format!("blocked dunder access: {name}"),
                    ));
                }
                if SENSITIVE_ATTRS.contains(&name) {
                    self.violations.push(Violation::new(
                        ViolationKind::BlockedBuiltin,
                        format!("blocked sensitive attribute: {name}"),
                    ));
                }
                self.visit_expr(&attr.value);
            }
            Expr::BinOp(binop) => {
                self.visit_expr(&binop.left);
                self.visit_expr(&binop.right);
            }
            _ => {}
        }
    }

    fn check_import(&mut self, dotted: &str) {
        let module = dotted.split('.').next().unwrap_or(dotted);
        if self.policy.blocked_imports.contains(module) {
            self.violations.push(Violation::new(
                ViolationKind::BlockedImport,
                format!("blocked import: {module}"),
            ));
        } else if !self.policy.allow_imports.contains(module) {
            self.violations.push(Violation::new(
                ViolationKind::BlockedImport,
                format!("unapproved import: {module}"),
            ));
        }
    }
}

fn body_has_break(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Break(_) => true,
        Stmt::If(s) => body_has_break(&s.body) || body_has_break(&s.orelse),
        Stmt::For(s) => body_has_break(&s.body),
        Stmt::Try(s) => body_has_break(&s.body),
        _ => false,
    })
}

/// Convenience wrapper: `true` if `code` has no static violations under
/// `policy`.
#[must_use]
pub fn is_safe(code: &str, policy: &SandboxPolicy) -> bool {
    AstAnalyzer::new(policy).check(code).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SandboxPolicy {
        SandboxPolicy::default()
    }

    #[test]
    fn benign_arithmetic_is_safe() {
        let violations = AstAnalyzer::new(&policy()).check("x = 1 + 2\nprint(x)");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn blocked_import_is_flagged() {
        let violations = AstAnalyzer::new(&policy()).check("import os");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::BlockedImport);
    }

    #[test]
    fn unapproved_import_is_flagged() {
        let violations = AstAnalyzer::new(&policy()).check("import numpy");
        assert_eq!(violations[0].kind, ViolationKind::BlockedImport);
    }

    #[test]
    fn eval_call_is_flagged() {
        let violations = AstAnalyzer::new(&policy()).check("eval('1+1')");
        assert!(violations.iter().any(|v| v.kind == ViolationKind::BlockedBuiltin));
    }

    #[test]
    fn dunder_globals_access_is_flagged() {
        let violations = AstAnalyzer::new(&policy()).check("x = (1).__class__.__globals__");
        assert!(violations.iter().any(|v| v.kind == ViolationKind::BlockedBuiltin));
    }

    #[test]
    fn while_true_without_break_is_flagged() {
        let violations = AstAnalyzer::new(&policy()).check("while True:\n    x = 1\n");
        assert!(violations.iter().any(|v| v.kind == ViolationKind::InfiniteLoop));
    }

    #[test]
    fn while_true_with_break_is_allowed() {
        let violations =
            AstAnalyzer::new(&policy()).check("while True:\n    if x:\n        break\n");
        assert!(!violations.iter().any(|v| v.kind == ViolationKind::InfiniteLoop));
    }

    #[test]
    fn syntax_error_is_a_violation_not_a_panic() {
        let violations = AstAnalyzer::new(&policy()).check("def f(:");
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn allowed_import_passes() {
        let violations = AstAnalyzer::new(&policy()).check("import math\nmath.sqrt(4)");
        assert!(violations.is_empty(), "{violations:?}");
    }
}
