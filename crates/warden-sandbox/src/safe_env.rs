//! Builds the restricted global scope a sandboxed program runs against.
//!
//! The AST analyzer already rejects blocked imports and calls statically;
//! this module is the runtime backstop. Rather than start from the
//! interpreter's full builtin set and shadow the handful of names the
//! policy blocks, `build_scope` rebuilds `__builtins__` itself from
//! `policy.allow_builtins`, so a builtin that's simply absent from the
//! allowlist is just as unreachable as one on `blocked_builtins` — the
//! allowlist is consulted, not bypassed.

use std::sync::{Arc, Mutex};

use rustpython_vm::function::FuncArgs;
use rustpython_vm::scope::Scope;
use rustpython_vm::{PyResult, VirtualMachine};

use warden_types::SandboxPolicy;

/// Stdout captured from a sandboxed run's `print` calls, shared with the
/// thread that owns the interpreter.
pub type SharedStdout = Arc<Mutex<String>>;

/// Build a fresh global scope for `vm`. `__builtins__` is replaced wholesale
/// with a dict built from `policy.allow_builtins`, filtered through
/// [`SandboxPolicy::builtin_allowed`] so the blocklist still wins on
/// conflict; every name in `policy.blocked_builtins` additionally gets an
/// explicit stub that raises, so a program gets a clear permission error
/// instead of a bare `NameError`. `print` is special-cased to append to
/// `stdout` instead of writing to the real process stdout.
pub fn build_scope(vm: &VirtualMachine, policy: &SandboxPolicy, stdout: &SharedStdout) -> Scope {
    let scope = vm.new_scope_with_builtins();
    let restricted = vm.ctx.new_dict();

    for name in &policy.allow_builtins {
        if !policy.builtin_allowed(name) {
            continue;
        }
        if name == "print" {
            let stdout = Arc::clone(stdout);
            let captured_print = vm.new_function(
                "print",
                move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<()> {
                    let mut out = stdout.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    for (i, arg) in args.args.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        out.push_str(arg.str(vm)?.as_str());
                    }
                    out.push('\n');
                    Ok(())
                },
            );
            let _ = restricted.set_item("print", captured_print.into(), vm);
            continue;
        }
        if let Ok(value) = vm.builtins.get_attr(name.as_str(), vm) {
            let _ = restricted.set_item(name.as_str(), value, vm);
        }
    }

    for name in &policy.blocked_builtins {
        let blocked_name = name.clone();
        let stub = vm.new_function(name.clone(), move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult {
            Err(vm.new_exception_msg(
                vm.ctx.exceptions.permission_error.to_owned(),
                format!("'{blocked_name}' is blocked by sandbox policy"),
            ))
        });
        let _ = restricted.set_item(name.as_str(), stub.into(), vm);
    }

    let _ = scope.globals.set_item("__builtins__", restricted.into(), vm);
    scope
}

/// Extra globals supplied by the caller, filtered by the import and
/// builtin gate before the interpreter ever sees them — keys starting
/// with `_` or naming a blocked builtin are dropped rather than erroring,
/// since this is additive context, not code the caller is entitled to run.
pub fn filter_extra_globals(
    policy: &SandboxPolicy,
    extra: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    extra
        .iter()
        .filter(|(key, _)| !key.starts_with('_') && !policy.blocked_builtins.contains(*key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
