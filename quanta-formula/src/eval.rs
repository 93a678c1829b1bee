//! Formula evaluator
//!
//! Walks the expression tree keeping every intermediate value as a
//! dimensioned quantity. Sums, differences and comparisons need equal
//! dimensions; products and quotients combine them.

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::functions::FunctionTable;
use crate::parser::parse_formula;
use crate::resolver::Resolver;
use crate::value::{additive_tag, multiplicative_tag};
use crate::FormulaValue;
use quanta_core::{PassToken, QuantaError, Result};
use quanta_units::{filter_expression, DimensionVector, QuantityRegistry, QuantityValue};
use std::cmp::Ordering;
use std::sync::Arc;

/// Identifiers a formula references, in order of first appearance
pub fn references(formula: &str) -> Result<Vec<String>> {
    Ok(parse_formula(formula)?.references())
}

/// Formula evaluator bound to a registry and a function table
pub struct FormulaEvaluator {
    registry: Arc<QuantityRegistry>,
    functions: FunctionTable,
}

impl FormulaEvaluator {
    pub fn new(registry: Arc<QuantityRegistry>) -> Self {
        Self {
            registry,
            functions: FunctionTable::standard(),
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    pub fn registry(&self) -> &Arc<QuantityRegistry> {
        &self.registry
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Parse and evaluate a formula
    pub fn evaluate(
        &self,
        formula: &str,
        resolver: &mut dyn Resolver,
        pass: PassToken,
    ) -> Result<FormulaValue> {
        let expr = parse_formula(formula)?;
        tracing::trace!(formula, %pass, "evaluating formula");
        self.evaluate_expr(&expr, resolver, pass)
    }

    pub fn evaluate_expr(
        &self,
        expr: &Expr,
        resolver: &mut dyn Resolver,
        pass: PassToken,
    ) -> Result<FormulaValue> {
        match expr {
            Expr::Number { value, unit: None } => {
                Ok(FormulaValue::untagged(QuantityValue::ratio(*value)))
            }
            Expr::Number { value, unit: Some(tag) } => {
                let filtered = filter_expression(&self.registry, tag)?;
                Ok(FormulaValue::new(
                    QuantityValue::new(filtered.to_si(*value), filtered.dimension),
                    filtered.user_expression,
                ))
            }
            Expr::Reference(name) => {
                let quantity = resolver.resolve(name, pass).map_err(|e| match e {
                    QuantaError::CircularReference(_) => e,
                    other => other.into_evaluation_failure(&format!("[{}]", name)),
                })?;
                Ok(FormulaValue::untagged(quantity))
            }
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                let value = self.evaluate_expr(operand, resolver, pass)?;
                Ok(FormulaValue::new(-value.quantity, value.tag))
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, resolver, pass),
            Expr::Call { name, args } => self.eval_call(name, args, resolver, pass),
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        resolver: &mut dyn Resolver,
        pass: PassToken,
    ) -> Result<FormulaValue> {
        // && and || skip the right side once the left decides
        match op {
            BinOp::And => {
                let l = self.evaluate_expr(left, resolver, pass)?;
                if !l.is_truthy() {
                    return Ok(FormulaValue::boolean(false));
                }
                let r = self.evaluate_expr(right, resolver, pass)?;
                return Ok(FormulaValue::boolean(r.is_truthy()));
            }
            BinOp::Or => {
                let l = self.evaluate_expr(left, resolver, pass)?;
                if l.is_truthy() {
                    return Ok(FormulaValue::boolean(true));
                }
                let r = self.evaluate_expr(right, resolver, pass)?;
                return Ok(FormulaValue::boolean(r.is_truthy()));
            }
            _ => {}
        }

        let l = self.evaluate_expr(left, resolver, pass)?;
        let r = self.evaluate_expr(right, resolver, pass)?;

        match op {
            BinOp::Add => Ok(FormulaValue::new(
                l.quantity.checked_add(r.quantity)?,
                additive_tag(&l.tag, &r.tag),
            )),
            BinOp::Sub => Ok(FormulaValue::new(
                l.quantity.checked_sub(r.quantity)?,
                additive_tag(&l.tag, &r.tag),
            )),
            BinOp::Mul => Ok(FormulaValue::new(
                l.quantity.checked_mul(r.quantity)?,
                multiplicative_tag(&l.tag, &r.tag, 1),
            )),
            BinOp::Div => Ok(FormulaValue::new(
                l.quantity.checked_div(r.quantity)?,
                multiplicative_tag(&l.tag, &r.tag, -1),
            )),
            BinOp::Pow => power(l.quantity, r.quantity).map(FormulaValue::untagged),
            comparison => {
                let ordering = l.quantity.checked_cmp(&r.quantity)?;
                Ok(FormulaValue::boolean(compare(comparison, ordering)))
            }
        }
    }

    fn eval_call(
        &self,
        name: &str,
        args: &[Expr],
        resolver: &mut dyn Resolver,
        pass: PassToken,
    ) -> Result<FormulaValue> {
        if name.eq_ignore_ascii_case("if") {
            let [cond, then, otherwise] = args else {
                return Err(QuantaError::evaluation(format!(
                    "if(cond, a, b) expects 3 arguments, got {}",
                    args.len()
                )));
            };
            let cond = self.evaluate_expr(cond, resolver, pass)?;
            let chosen = if cond.is_truthy() { then } else { otherwise };
            return self.evaluate_expr(chosen, resolver, pass);
        }

        let values = args
            .iter()
            .map(|arg| self.evaluate_expr(arg, resolver, pass))
            .collect::<Result<Vec<_>>>()?;
        self.functions.call(name, &values)
    }
}

fn power(base: QuantityValue, exponent: QuantityValue) -> Result<QuantityValue> {
    if !exponent.is_ratio() {
        return Err(QuantaError::incompatible(
            format!("exponent [{}]", exponent.dimension),
            DimensionVector::RATIO,
        ));
    }
    if base.is_ratio() {
        return Ok(QuantityValue::ratio(base.magnitude.powf(exponent.magnitude)));
    }

    let e = exponent.magnitude;
    if e.fract() != 0.0 || e.abs() > f64::from(i32::MAX) {
        return Err(QuantaError::evaluation(format!(
            "non-integer power {} of a value with dimension {}",
            e, base.dimension
        )));
    }
    base.checked_powi(e as i32)
}

fn compare(op: BinOp, ordering: Option<Ordering>) -> bool {
    match op {
        BinOp::Eq => ordering == Some(Ordering::Equal),
        BinOp::Ne => ordering != Some(Ordering::Equal),
        BinOp::Lt => ordering == Some(Ordering::Less),
        BinOp::Gt => ordering == Some(Ordering::Greater),
        BinOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MapResolver, NoReferences};
    use quanta_core::codes;

    fn evaluator() -> FormulaEvaluator {
        FormulaEvaluator::new(Arc::new(QuantityRegistry::builtin().unwrap()))
    }

    fn eval(formula: &str) -> Result<FormulaValue> {
        evaluator().evaluate(formula, &mut NoReferences, PassToken::NONE)
    }

    fn number(formula: &str) -> f64 {
        eval(formula).unwrap().quantity.magnitude
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(number("2+3*4"), 14.0);
        assert_eq!(number("(1+2)^2"), 9.0);
        assert_eq!(number("10 - 4 - 3"), 3.0);
        assert_eq!(number("2^3^2"), 64.0);
        assert_eq!(number("-2^2"), 4.0);
        assert_eq!(number("1.5e3 / 3"), 500.0);
    }

    #[test]
    fn test_functions() {
        assert_eq!(number("ln(1)"), 0.0);
        assert_eq!(number("exp(0) + noop(2)"), 3.0);
        assert_eq!(number("if(0, 5, 7)"), 7.0);
        assert_eq!(number("if(1, 5, 7)"), 5.0);
        assert_eq!(number("IF(-3, 5, 7)"), 5.0);
    }

    #[test]
    fn test_if_is_lazy() {
        // the untaken branch would fail to resolve
        assert_eq!(number("if(1, 5, [missing])"), 5.0);
        let err = eval("if(0, 5, [missing])").unwrap_err();
        assert_eq!(err.code(), codes::EVALUATION_FAILED);
        let err = eval("if(1, 2)").unwrap_err();
        assert_eq!(err.code(), codes::EVALUATION_FAILED);
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(number("1 < 2"), 1.0);
        assert_eq!(number("2 <= 1"), 0.0);
        assert_eq!(number("3 == 3 && 4 != 4"), 0.0);
        assert_eq!(number("0 || 2"), 1.0);
        assert_eq!(number("1{kg} > 500{g}"), 1.0);
        // short circuit: the right side is never resolved
        assert_eq!(number("0 && [missing]"), 0.0);
    }

    #[test]
    fn test_units_add() {
        let ev = evaluator();
        let value = ev.evaluate("1{kg} + 1000{g}", &mut NoReferences, PassToken::NONE).unwrap();
        assert!((value.quantity.magnitude - 2.0).abs() < 1e-12);
        assert_eq!(value.tag, "kg");
        let (shown, unit) = value.value_in_tag(ev.registry()).unwrap();
        assert!((shown - 2.0).abs() < 1e-12);
        assert_eq!(unit, "kg");
    }

    #[test]
    fn test_units_incompatible() {
        let err = eval("1{kg} + 1{s}").unwrap_err();
        assert_eq!(err.code(), codes::INCOMPATIBLE_DIMENSION);
        let err = eval("1{kg} < 1{s}").unwrap_err();
        assert_eq!(err.code(), codes::INCOMPATIBLE_DIMENSION);
        let err = eval("sin(1{kg})").unwrap_err();
        assert_eq!(err.code(), codes::INCOMPATIBLE_DIMENSION);
        let err = eval("2^1{m}").unwrap_err();
        assert_eq!(err.code(), codes::INCOMPATIBLE_DIMENSION);
    }

    #[test]
    fn test_units_multiply_divide() {
        let ev = evaluator();
        let speed = ev.evaluate("3{km} / 0.5{hr}", &mut NoReferences, PassToken::NONE).unwrap();
        assert_eq!(speed.tag, "km/hr");
        assert_eq!(speed.quantity.dimension, DimensionVector::VELOCITY);
        let (shown, _) = speed.value_in_tag(ev.registry()).unwrap();
        assert!((shown - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_units_power() {
        let area = eval("2{m}^2").unwrap();
        assert_eq!(area.quantity.dimension, DimensionVector::AREA);
        assert_eq!(area.quantity.magnitude, 4.0);
        assert!(area.tag.is_empty());

        let err = eval("2{m}^0.5").unwrap_err();
        assert_eq!(err.code(), codes::EVALUATION_FAILED);
    }

    #[test]
    fn test_references() {
        let ev = evaluator();
        let mut resolver = MapResolver::new()
            .with("a", QuantityValue::new(3.0, DimensionVector::MASS))
            .with("b", QuantityValue::ratio(2.0));
        let value = ev.evaluate("-[a] * [b]", &mut resolver, PassToken::NONE).unwrap();
        assert_eq!(value.quantity, QuantityValue::new(-6.0, DimensionVector::MASS));
        assert_eq!(value.value_in_tag(ev.registry()).unwrap(), (-6.0, "kg".to_string()));

        let err = ev.evaluate("[c] + 1", &mut resolver, PassToken::NONE).unwrap_err();
        assert_eq!(err.code(), codes::EVALUATION_FAILED);
        assert!(err.to_string().contains("[c]"));
    }

    #[test]
    fn test_reduction_failures() {
        assert_eq!(eval("nosuch(1)").unwrap_err().code(), codes::EVALUATION_FAILED);
        assert_eq!(eval("ln(1, 2)").unwrap_err().code(), codes::EVALUATION_FAILED);
        assert_eq!(eval("1 +").unwrap_err().code(), codes::PARSE_FAILURE);
        assert_eq!(eval("1{furlong}").unwrap_err().code(), codes::UNKNOWN_UNIT);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(number("1/0").is_infinite());
        assert!(number("0/0").is_nan());
    }

    #[test]
    fn test_references_listing() {
        assert_eq!(
            references("[x]*[y] + if([x] > 0, [z], 1)").unwrap(),
            vec!["x".to_string(), "y".to_string(), "z".to_string()]
        );
        assert!(references("1 +").is_err());
    }
}
