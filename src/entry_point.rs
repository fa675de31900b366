use rustpython_ast::{Constant, Expr, Stmt};
use std::collections::BTreeSet;

/// Scans a module body for a top-level `if __name__ == "__main__":` block
/// and returns the names referenced inside it.
///
/// A module with such a block is an entrypoint module; the top-level
/// functions it calls (or passes around) are execution roots and must
/// not be reported as dead.
pub fn detect_main_block(stmts: &[Stmt]) -> Option<BTreeSet<String>> {
    let mut found = false;
    let mut names = BTreeSet::new();

    for stmt in stmts {
        if !is_main_guard(stmt) {
            continue;
        }
        found = true;
        if let Stmt::If(if_stmt) = stmt {
            for body_stmt in &if_stmt.body {
                collect_names(body_stmt, &mut names);
            }
        }
    }

    if found {
        Some(names)
    } else {
        None
    }
}

/// Checks for `if __name__ == "__main__":` in either operand order.
fn is_main_guard(stmt: &Stmt) -> bool {
    if let Stmt::If(if_stmt) = stmt {
        if let Expr::Compare(compare) = &*if_stmt.test {
            if compare.ops.len() == 1 && compare.comparators.len() == 1 {
                let left = &*compare.left;
                let right = &compare.comparators[0];
                return is_name_dunder(left) && is_main_string(right)
                    || is_name_dunder(right) && is_main_string(left);
            }
        }
    }
    false
}

fn is_name_dunder(expr: &Expr) -> bool {
    if let Expr::Name(name) = expr {
        return name.id.as_str() == "__name__";
    }
    false
}

fn is_main_string(expr: &Expr) -> bool {
    if let Expr::Constant(constant) = expr {
        if let Constant::Str(value) = &constant.value {
            return value.as_str() == "__main__";
        }
    }
    false
}

/// Collects referenced names from a statement inside the main block,
/// descending into nested control flow.
fn collect_names(stmt: &Stmt, names: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Expr(expr_stmt) => collect_from_expr(&expr_stmt.value, names),
        Stmt::Assign(assign) => collect_from_expr(&assign.value, names),
        Stmt::Return(ret) => {
            if let Some(value) = &ret.value {
                collect_from_expr(value, names);
            }
        }
        Stmt::If(if_stmt) => {
            collect_from_expr(&if_stmt.test, names);
            for body_stmt in &if_stmt.body {
                collect_names(body_stmt, names);
            }
            for else_stmt in &if_stmt.orelse {
                collect_names(else_stmt, names);
            }
        }
        Stmt::For(for_stmt) => {
            collect_from_expr(&for_stmt.iter, names);
            for body_stmt in &for_stmt.body {
                collect_names(body_stmt, names);
            }
        }
        Stmt::While(while_stmt) => {
            collect_from_expr(&while_stmt.test, names);
            for body_stmt in &while_stmt.body {
                collect_names(body_stmt, names);
            }
        }
        Stmt::With(with_stmt) => {
            for item in &with_stmt.items {
                collect_from_expr(&item.context_expr, names);
            }
            for body_stmt in &with_stmt.body {
                collect_names(body_stmt, names);
            }
        }
        Stmt::Try(try_stmt) => {
            for body_stmt in &try_stmt.body {
                collect_names(body_stmt, names);
            }
            for body_stmt in &try_stmt.orelse {
                collect_names(body_stmt, names);
            }
            for body_stmt in &try_stmt.finalbody {
                collect_names(body_stmt, names);
            }
        }
        _ => {}
    }
}

/// Extracts name references from an expression: calls, bare names,
/// attribute bases, and argument positions.
fn collect_from_expr(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Call(call) => {
            match &*call.func {
                Expr::Name(name) => {
                    names.insert(name.id.to_string());
                }
                Expr::Attribute(attr) => {
                    names.insert(attr.attr.to_string());
                    collect_from_expr(&attr.value, names);
                }
                _ => {}
            }
            for arg in &call.args {
                collect_from_expr(arg, names);
            }
            for keyword in &call.keywords {
                collect_from_expr(&keyword.value, names);
            }
        }
        Expr::Name(name) => {
            names.insert(name.id.to_string());
        }
        Expr::Attribute(attr) => collect_from_expr(&attr.value, names),
        Expr::BinOp(binop) => {
            collect_from_expr(&binop.left, names);
            collect_from_expr(&binop.right, names);
        }
        Expr::Await(await_expr) => collect_from_expr(&await_expr.value, names),
        _ => {}
    }
}
