// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Constant-expression evaluation.
//!
//! The evaluator is a pure function over [`ConstExpr`] trees; identifier
//! resolution goes through the caller-supplied [`ConstResolver`] so this
//! module never depends on the registry. A failed evaluation is `None` and
//! the caller omits that member; it never aborts a build.

use crate::decl::{BinaryOp, ConstDecl, ConstExpr, Ref, UnaryOp};
use crate::literal;
use crate::value::Value;
use crate::Str;
use tracing::debug;

/// Resolves constant identifiers on behalf of the evaluator.
pub trait ConstResolver {
    /// Resolve an unqualified identifier as seen from `pkg_path`.
    fn resolve(&self, pkg_path: &str, name: &str) -> Option<Ref<ConstDecl>>;

    /// Resolve `pkg.name` as seen from `from_pkg`; `pkg` may be a package
    /// name or a full package path.
    fn resolve_qualified(&self, from_pkg: &str, pkg: &str, name: &str) -> Option<Ref<ConstDecl>>;
}

/// Evaluate a constant declaration, memoizing the result on the declaration.
/// Repeated calls are idempotent and cheap.
pub fn eval_const(decl: &ConstDecl, resolver: &dyn ConstResolver) -> Option<Value> {
    let mut visited = Vec::new();
    eval_decl(decl, resolver, &mut visited)
}

fn eval_decl(
    decl: &ConstDecl,
    resolver: &dyn ConstResolver,
    visited: &mut Vec<(Str, Str)>,
) -> Option<Value> {
    if let Some(v) = decl.cached_value() {
        return v;
    }
    let key = (decl.pkg_path.clone(), decl.name.clone());
    if visited.contains(&key) {
        debug!(name = %decl.name, pkg = %decl.pkg_path, "constant reference cycle");
        return None;
    }
    visited.push(key);
    let v = eval_expr(&decl.expr, decl, resolver, visited);
    visited.pop();
    decl.memoize(v.clone());
    v
}

fn eval_expr(
    expr: &ConstExpr,
    ctx: &ConstDecl,
    resolver: &dyn ConstResolver,
    visited: &mut Vec<(Str, Str)>,
) -> Option<Value> {
    match expr {
        ConstExpr::Int(text) => literal::parse_int(text),
        ConstExpr::Float(text) => literal::parse_float(text).map(Value::Float),
        ConstExpr::Str(text) => literal::unquote_string(text).map(|s| Value::String(s.into())),
        ConstExpr::Char(text) => {
            literal::unquote_char(text).map(|c| Value::Int(i64::from(u32::from(c))))
        }
        ConstExpr::Ident(name) => {
            if name.as_ref() == "iota" {
                return Some(Value::Int(i64::from(ctx.block_index)));
            }
            match resolver.resolve(&ctx.pkg_path, name) {
                Some(target) => eval_decl(&target, resolver, visited),
                None => {
                    debug!(ident = %name, pkg = %ctx.pkg_path, "unresolved constant identifier");
                    None
                }
            }
        }
        ConstExpr::Selector { pkg, name } => {
            match resolver.resolve_qualified(&ctx.pkg_path, pkg, name) {
                Some(target) => eval_decl(&target, resolver, visited),
                None => {
                    debug!(ident = %name, selector = %pkg, from = %ctx.pkg_path,
                           "unresolved cross-package constant");
                    None
                }
            }
        }
        ConstExpr::Unary { op, expr } => {
            let v = eval_expr(expr, ctx, resolver, visited)?;
            match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::BitNot => v.bit_not(),
            }
        }
        ConstExpr::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, ctx, resolver, visited)?;
            let b = eval_expr(rhs, ctx, resolver, visited)?;
            match op {
                BinaryOp::Add => a.add(&b),
                BinaryOp::Sub => a.sub(&b),
                BinaryOp::Mul => a.mul(&b),
                BinaryOp::Div => a.div(&b),
                BinaryOp::Rem => a.rem(&b),
                BinaryOp::And => a.and(&b),
                BinaryOp::Or => a.or(&b),
                BinaryOp::Xor => a.xor(&b),
                BinaryOp::AndNot => a.and_not(&b),
                BinaryOp::Shl => a.shl(&b),
                BinaryOp::Shr => a.shr(&b),
            }
        }
        ConstExpr::Paren(inner) => eval_expr(inner, ctx, resolver, visited),
        ConstExpr::Call { fcn, args } => {
            // Only single-argument primitive conversions are evaluable.
            if args.len() != 1 {
                debug!(fcn = %fcn, "unsupported call shape in constant expression");
                return None;
            }
            let v = eval_expr(&args[0], ctx, resolver, visited)?;
            v.convert(fcn)
        }
    }
}
