/*
 * expr.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression evaluation.
//!
//! Arithmetic follows the host's widening rules: the result has the widest
//! operand type, at least `Int`. Integer results that overflow move to
//! `Long`, and `Long` overflow falls back to `Double`. Errors such as a
//! division by zero are reported and evaluate to null.

use std::cmp::Ordering;

use super::{Renderer, is_truthy};
use crate::ast::{BinaryOp, Expr, SourcePos};
use crate::context::Context;
use crate::error::VtlResult;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Renderer<'_> {
    pub(super) fn evaluate(&mut self, expr: &Expr, ctx: &mut Context) -> VtlResult<Option<Value>> {
        Ok(match expr {
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Int(n) => Some(Value::Int(*n)),
            Expr::Long(n) => Some(Value::Long(*n)),
            Expr::Double(n) => Some(Value::Double(*n)),
            Expr::Str(literal) => Some(Value::String(match &literal.interpolated {
                Some(block) => self.render_to_string(block, ctx)?,
                None => literal.text.clone(),
            })),
            Expr::Reference(reference) => self.reference_value(reference, ctx)?,
            Expr::ObjectArray(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.evaluate(item, ctx)? {
                        values.push(value);
                    }
                }
                Some(Value::list(values))
            }
            Expr::Range { start, end, pos } => {
                let start = self.evaluate(start, ctx)?;
                let end = self.evaluate(end, ctx)?;
                self.range(start, end, *pos)
            }
            Expr::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.evaluate(key, ctx)?;
                    let value = self.evaluate(value, ctx)?;
                    if let (Some(key), Some(value)) = (key, value) {
                        values.push((key.to_string(), value));
                    }
                }
                Some(Value::map(values))
            }
            Expr::Binary { op, lhs, rhs, pos } => self.binary(*op, lhs, rhs, *pos, ctx)?,
            Expr::Not(inner) => {
                let value = self.evaluate(inner, ctx)?;
                Some(Value::Bool(!is_truthy(value.as_ref())))
            }
        })
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: SourcePos,
        ctx: &mut Context,
    ) -> VtlResult<Option<Value>> {
        let arith = match op {
            BinaryOp::And | BinaryOp::Or => {
                let left = is_truthy(self.evaluate(lhs, ctx)?.as_ref());
                // Short-circuit.
                if left == (op == BinaryOp::Or) {
                    return Ok(Some(Value::Bool(left)));
                }
                let right = is_truthy(self.evaluate(rhs, ctx)?.as_ref());
                return Ok(Some(Value::Bool(right)));
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let left = self.evaluate(lhs, ctx)?;
                let right = self.evaluate(rhs, ctx)?;
                let (Some(left), Some(right)) = (left, right) else {
                    self.warn(
                        "null-comparison",
                        format!("null operand of '{}' compares as false", op.symbol()),
                        pos,
                    );
                    return Ok(Some(Value::Bool(false)));
                };
                let equal = values_equal(&left, &right);
                return Ok(Some(Value::Bool(equal == (op == BinaryOp::Eq))));
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let left = self.evaluate(lhs, ctx)?;
                let right = self.evaluate(rhs, ctx)?;
                let ordering = match (&left, &right) {
                    (Some(left), Some(right)) => compare(left, right),
                    _ => None,
                };
                let Some(ordering) = ordering else {
                    self.error(
                        "invalid-comparison",
                        format!(
                            "cannot compare {} {} {}",
                            describe(left.as_ref()),
                            op.symbol(),
                            describe(right.as_ref())
                        ),
                        pos,
                    );
                    return Ok(Some(Value::Bool(false)));
                };
                let result = match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                return Ok(Some(Value::Bool(result)));
            }
            BinaryOp::Add => Arith::Add,
            BinaryOp::Sub => Arith::Sub,
            BinaryOp::Mul => Arith::Mul,
            BinaryOp::Div => Arith::Div,
            BinaryOp::Mod => Arith::Mod,
        };

        let left = self.evaluate(lhs, ctx)?;
        let right = self.evaluate(rhs, ctx)?;
        Ok(self.arithmetic(arith, op, left, right, pos))
    }

    fn arithmetic(
        &mut self,
        arith: Arith,
        op: BinaryOp,
        left: Option<Value>,
        right: Option<Value>,
        pos: SourcePos,
    ) -> Option<Value> {
        let (Some(left), Some(right)) = (left, right) else {
            self.error(
                "invalid-operand",
                format!("null operand of '{}'", op.symbol()),
                pos,
            );
            return None;
        };

        if matches!(arith, Arith::Add)
            && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
        {
            return Some(Value::String(format!("{left}{right}")));
        }

        let ranks = (left.type_of().numeric_rank(), right.type_of().numeric_rank());
        let (Some(left_rank), Some(right_rank)) = ranks else {
            self.error(
                "invalid-operand",
                format!(
                    "'{}' is not defined for {} and {}",
                    op.symbol(),
                    left.type_of(),
                    right.type_of()
                ),
                pos,
            );
            return None;
        };
        let rank = left_rank.max(right_rank).max(INT_RANK);

        if rank <= LONG_RANK {
            let (a, b) = (left.as_i64()?, right.as_i64()?);
            if b == 0 && matches!(arith, Arith::Div | Arith::Mod) {
                self.error("division-by-zero", format!("{a} {} 0", op.symbol()), pos);
                return None;
            }
            return Some(match integer_op(arith, a, b) {
                Some(n) if rank == INT_RANK => i32::try_from(n).map_or(Value::Long(n), Value::Int),
                Some(n) => Value::Long(n),
                None => Value::Double(float_op(arith, a as f64, b as f64)),
            });
        }

        let (a, b) = (left.as_f64()?, right.as_f64()?);
        if b == 0.0 && matches!(arith, Arith::Div | Arith::Mod) {
            self.error("division-by-zero", format!("{a} {} 0", op.symbol()), pos);
            return None;
        }
        let n = float_op(arith, a, b);
        if rank == FLOAT_RANK {
            Some(Value::Float(n as f32))
        } else {
            Some(Value::Double(n))
        }
    }

    /// `[start..end]`, inclusive, counting down when `start > end`.
    fn range(&mut self, start: Option<Value>, end: Option<Value>, pos: SourcePos) -> Option<Value> {
        let bounds = (
            start.as_ref().and_then(Value::as_i64),
            end.as_ref().and_then(Value::as_i64),
        );
        let (Some(start_n), Some(end_n)) = bounds else {
            self.error(
                "invalid-range",
                format!(
                    "range bounds must be integers, got {} and {}",
                    describe(start.as_ref()),
                    describe(end.as_ref())
                ),
                pos,
            );
            return None;
        };
        let values: Vec<Value> = if start_n <= end_n {
            (start_n..=end_n).map(integer_value).collect()
        } else {
            (end_n..=start_n).rev().map(integer_value).collect()
        };
        Some(Value::list(values))
    }
}

const INT_RANK: u8 = 2;
const LONG_RANK: u8 = 3;
const FLOAT_RANK: u8 = 4;

fn integer_op(arith: Arith, a: i64, b: i64) -> Option<i64> {
    match arith {
        Arith::Add => a.checked_add(b),
        Arith::Sub => a.checked_sub(b),
        Arith::Mul => a.checked_mul(b),
        Arith::Div => a.checked_div(b),
        // Zero divisors are rejected before this point.
        Arith::Mod => Some(a.wrapping_rem(b)),
    }
}

fn float_op(arith: Arith, a: f64, b: f64) -> f64 {
    match arith {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Mod => a % b,
    }
}

fn integer_value(n: i64) -> Value {
    i32::try_from(n).map_or(Value::Long(n), Value::Int)
}

/// Numbers compare by value across types, other values of the same type
/// with `==`, and mixed types by their rendered text.
fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_number() && right.is_number() {
        return compare(left, right) == Some(Ordering::Equal);
    }
    if left.type_of() == right.type_of() {
        return left == right;
    }
    left.to_string() == right.to_string()
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return Some(a.cmp(&b));
    }
    if left.is_number() && right.is_number() {
        return left.as_f64()?.partial_cmp(&right.as_f64()?);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.type_of().name().to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{render, render_with, services};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_arithmetic() {
        let mut ctx = Context::new();
        assert_eq!(render("#set($x = 1 + 1)$x", &mut ctx), "2");
        assert_eq!(render("#set($x = 7 / 2)$x #set($y = 7 % 3)$y", &mut ctx), "3 1");
        assert_eq!(render("#set($x = 2 * 3 - 10)$x", &mut ctx), "-4");
    }

    #[test]
    fn test_int_overflow_widens_to_long() {
        let mut ctx = Context::new();
        ctx.put("big", Value::Int(i32::MAX));
        let out = render("#set($x = $big + 1)$x", &mut ctx);
        assert_eq!(out, "2147483648");
        assert!(matches!(ctx.get("x"), Some(Value::Long(2_147_483_648))));
    }

    #[test]
    fn test_long_min_remainder_is_zero() {
        let mut ctx = Context::new();
        ctx.put("big", Value::Long(i64::MIN));
        assert_eq!(render("#set($y = $big % -1)$y", &mut ctx), "0");
        assert!(matches!(ctx.get("y"), Some(Value::Long(0))));
    }

    #[test]
    fn test_float_plus_double() {
        let mut ctx = Context::new();
        ctx.put("a", Value::Float(1.2));
        ctx.put("b", Value::Double(5.3));
        assert_eq!(render("#set($x = $a + $b)$x", &mut ctx), "6.5");
        assert!(matches!(ctx.get("x"), Some(Value::Double(_))));

        let mut ctx = Context::new();
        ctx.put("a", Value::Float(1.5));
        ctx.put("b", Value::Float(2.0));
        render("#set($x = $a * $b)", &mut ctx);
        assert_eq!(ctx.get("x"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_string_concatenation() {
        let mut ctx = Context::new();
        ctx.put("n", Value::Int(3));
        assert_eq!(render("#set($s = 'n=' + $n)$s", &mut ctx), "n=3");
    }

    #[test]
    fn test_division_by_zero_is_reported() {
        let services = services();
        let mut ctx = Context::new();
        let (out, diagnostics) = render_with(&services, "#set($x = 1 / 0)$!x", &mut ctx);
        assert_eq!(out, "");
        assert!(diagnostics.contains_code("division-by-zero"));
        assert!(diagnostics.contains_code("null-set"));
    }

    #[test]
    fn test_comparisons() {
        let mut ctx = Context::new();
        ctx.put("i", Value::Int(5));
        ctx.put("l", Value::Long(5));
        ctx.put("d", Value::Double(5.0));
        assert_eq!(
            render(
                "#if($i == $l && $l == $d)eq#end #if($i < 6 and $d >= 5)lt#end #if('a' < 'b')str#end",
                &mut ctx
            ),
            "eq lt str"
        );
        assert_eq!(render("#if($i != '5')ne#{else}same#end", &mut ctx), "same");
    }

    #[test]
    fn test_null_comparison_is_false() {
        let services = services();
        let mut ctx = Context::new();
        let (out, diagnostics) =
            render_with(&services, "#if($nope == $nope)a#{else}b#end", &mut ctx);
        assert_eq!(out, "b");
        assert!(diagnostics.contains_code("null-comparison"));
    }

    #[test]
    fn test_short_circuit() {
        let services = services();
        let mut ctx = Context::new();
        let (out, diagnostics) =
            render_with(&services, "#if(false && 1 / 0 == 1)a#{else}b#end", &mut ctx);
        assert_eq!(out, "b");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_ranges() {
        let mut ctx = Context::new();
        assert_eq!(render("#set($r = [1..4])$r", &mut ctx), "[1, 2, 3, 4]");
        assert_eq!(render("#set($r = [3..1])$r", &mut ctx), "[3, 2, 1]");
        ctx.put("n", Value::Int(2));
        assert_eq!(render("#set($r = [$n..$n])$r", &mut ctx), "[2]");
    }

    #[test]
    fn test_list_and_map_literals() {
        let mut ctx = Context::new();
        assert_eq!(
            render("#set($l = [1, 'two', $nope, true])$l", &mut ctx),
            "[1, two, true]"
        );
        assert_eq!(
            render("#set($m = {'b': 1, 'a': [2], 'c': $nope})$m $m.a", &mut ctx),
            "{b=1, a=[2]} [2]"
        );
    }

    #[test]
    fn test_interpolated_string() {
        let mut ctx = Context::new();
        ctx.put("who", Value::from("world"));
        assert_eq!(
            render("#set($s = \"hello $who\")$s #set($t = 'hello $who')$t", &mut ctx),
            "hello world hello $who"
        );
    }

    #[test]
    fn test_not() {
        let mut ctx = Context::new();
        assert_eq!(render("#if(!$nope)a#end#if(not true)b#end", &mut ctx), "a");
    }
}
