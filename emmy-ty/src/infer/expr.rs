//! Operators, literals and table constructors.

use emmy_parser::{BinaryOp, FieldKey, LiteralKind, NodeId, NodeKind, UnaryOp};

use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::{normalize_number, Truthiness, Ty, TyPrimitiveKind};

use super::function::vararg_type;
use super::infer;

pub(super) fn unary(ctx: &SearchContext, file: &LuaFile, op: UnaryOp, operand: NodeId) -> Option<Ty> {
    match op {
        UnaryOp::Len | UnaryOp::BitNot => Some(Ty::NUMBER),
        UnaryOp::Not => {
            let ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(operand)));
            Some(match ty.map(|t| t.truthiness()) {
                Some(Truthiness::True) => Ty::boolean(false),
                Some(Truthiness::False) => Ty::boolean(true),
                _ => Ty::BOOLEAN,
            })
        }
        UnaryOp::Minus => {
            let ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(operand)))?;
            Some(match &ty {
                Ty::Literal(TyPrimitiveKind::Number, value) => negate(value),
                Ty::Literal(TyPrimitiveKind::String, value) if value.trim().parse::<f64>().is_ok() => {
                    negate(&normalize_number(value))
                }
                _ => ty.widen(),
            })
        }
    }
}

fn negate(value: &str) -> Ty {
    match value.strip_prefix('-') {
        Some(positive) => Ty::number(positive),
        None if value == "0" => Ty::number("0"),
        None => Ty::number(format!("-{}", value)),
    }
}

pub(super) fn binary(ctx: &SearchContext, file: &LuaFile, op: BinaryOp, left: NodeId, right: NodeId) -> Option<Ty> {
    match op {
        BinaryOp::Concat => Some(Ty::STRING),
        op if op.is_comparison() => Some(Ty::BOOLEAN),
        BinaryOp::And | BinaryOp::Or => and_or(ctx, file, op, left, right),
        _ => {
            let ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(left)))?;
            Some(ty.widen())
        }
    }
}

/// `a and b`, `a or b`: drop the operand the left truthiness rules out.
fn and_or(ctx: &SearchContext, file: &LuaFile, op: BinaryOp, left: NodeId, right: NodeId) -> Option<Ty> {
    let rhs = || ctx.with_index(0, false, |ctx| infer(ctx, file.node(right)));
    let Some(lty) = ctx.with_index(0, false, |ctx| infer(ctx, file.node(left))) else {
        return rhs();
    };
    let is_and = op == BinaryOp::And;
    match (lty.truthiness(), is_and) {
        (Truthiness::True, true) | (Truthiness::False, false) => return rhs(),
        (Truthiness::False, true) | (Truthiness::True, false) => return Some(lty),
        _ => {}
    }
    // The left value survives only when it makes the expression short-circuit.
    let kept = Ty::union_all(lty.resolved_members(ctx).into_iter().filter_map(|member| {
        let member = match member {
            Ty::Primitive(TyPrimitiveKind::Boolean) => Ty::boolean(!is_and),
            other => other,
        };
        let short_circuits = match member.truthiness() {
            Truthiness::True => !is_and,
            Truthiness::False => is_and,
            Truthiness::Unknown => true,
        };
        short_circuits.then_some(member)
    }));
    let rty = rhs()?;
    Some(kept.union(&rty))
}

pub(super) fn literal(ctx: &SearchContext, file: &LuaFile, id: NodeId, kind: LiteralKind, text: &str) -> Ty {
    match kind {
        LiteralKind::Nil => Ty::Nil,
        LiteralKind::True => Ty::boolean(true),
        LiteralKind::False => Ty::boolean(false),
        LiteralKind::String => Ty::string(text),
        LiteralKind::Number => {
            let normalized = normalize_number(text);
            let valid = normalized.parse::<f64>().is_ok();
            if valid { Ty::number(normalized) } else { Ty::Unknown }
        }
        LiteralKind::Varargs => {
            let ty = file
                .tree
                .enclosing_function(id)
                .and_then(|func| vararg_type(ctx, file, func))
                .unwrap_or(Ty::Unknown);
            Ty::multiple(vec![ty], true)
        }
    }
}

/// `{ ... }` in a variadic function is an array of the vararg type; any
/// other constructor is a structural table.
pub(super) fn table(ctx: &SearchContext, file: &LuaFile, id: NodeId, fields: &[NodeId]) -> Ty {
    let tree = &file.tree;
    if let [field] = fields {
        if let NodeKind::TableField {
            key: FieldKey::Positional(_),
            value,
        } = tree.kind(*field)
        {
            if matches!(tree.kind(*value), NodeKind::Literal { kind: LiteralKind::Varargs, .. }) {
                let base = tree
                    .enclosing_function(id)
                    .and_then(|func| vararg_type(ctx, file, func))
                    .unwrap_or(Ty::Unknown);
                return Ty::array(base);
            }
        }
    }
    Ty::table(file.node(id))
}
