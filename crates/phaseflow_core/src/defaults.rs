//! Suggested default values for expression parameters.
//!
//! A parameter that multiplicatively scales some domain-dependent sub-term
//! anywhere in the tree defaults to 1.0; a purely additive offset defaults
//! to 0.0. This is a structural check over the AST, not a semantic one:
//! equivalent but differently-factored expressions can classify differently.

use crate::expr::Expr;
use std::collections::HashMap;

/// Returns true iff `arb` (or a power node containing `arb`) appears as a
/// multiplicative sibling of a sub-term that contains `main`, anywhere in
/// the expression tree.
///
/// Multiplicative chains flatten through nested `*`, `/` and unary minus, so
/// in `a*sinh(k*x) + c` both `a` (sibling of `sinh(k*x)`) and `k` (sibling
/// of `x` inside the call) count, while `c` does not. A divisor counts as a
/// sibling too: `x/a` scales by `a^-1`.
pub fn multiplies_var(main: &str, arb: &str, expr: &Expr) -> bool {
    if let Some(factors) = product_factors(expr) {
        for (i, factor) in factors.iter().enumerate() {
            if !is_arb_factor(factor, arb) {
                continue;
            }
            if factors
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && other.contains_symbol(main))
            {
                return true;
            }
        }
    }

    match expr {
        Expr::Number(_) | Expr::Variable(_) => false,
        Expr::Binary(left, _, right) => {
            multiplies_var(main, arb, left) || multiplies_var(main, arb, right)
        }
        Expr::Neg(inner) => multiplies_var(main, arb, inner),
        Expr::Call(_, args) => args.iter().any(|arg| multiplies_var(main, arb, arg)),
    }
}

/// Suggested default value for each parameter: 1.0 if it scales a term
/// containing any domain variable, 0.0 otherwise. The check is a boolean OR
/// across the whole tree and across the domain variables.
pub fn suggest_defaults(
    expr: &Expr,
    domain_vars: &[String],
    parameters: &[String],
) -> HashMap<String, f64> {
    parameters
        .iter()
        .map(|param| {
            let scaling = domain_vars
                .iter()
                .any(|main| multiplies_var(main, param, expr));
            (param.clone(), if scaling { 1.0 } else { 0.0 })
        })
        .collect()
}

/// Flattened factor list if `expr` heads a multiplicative chain of at least
/// two factors, otherwise None.
fn product_factors(expr: &Expr) -> Option<Vec<&Expr>> {
    if !matches!(expr, Expr::Binary(_, '*', _) | Expr::Binary(_, '/', _)) {
        return None;
    }
    let mut factors = Vec::new();
    collect_factors(expr, &mut factors);
    Some(factors)
}

fn collect_factors<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Binary(left, '*', right) | Expr::Binary(left, '/', right) => {
            collect_factors(left, out);
            collect_factors(right, out);
        }
        Expr::Neg(inner) => collect_factors(inner, out),
        other => out.push(other),
    }
}

/// The factor forms that count as "the parameter itself": the bare symbol,
/// or any power node mentioning it (k^10, 2^k, k^-1).
fn is_arb_factor(factor: &Expr, arb: &str) -> bool {
    match factor {
        Expr::Variable(name) => name == arb,
        Expr::Binary(_, '^', _) => factor.contains_symbol(arb),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;

    fn defaults(source: &str, domain: &[&str]) -> HashMap<String, f64> {
        let expr = parse(source).expect("should parse");
        let domain: Vec<String> = domain.iter().map(|s| s.to_string()).collect();
        let parameters: Vec<String> = expr
            .free_symbols()
            .into_iter()
            .filter(|s| !domain.contains(s))
            .collect();
        suggest_defaults(&expr, &domain, &parameters)
    }

    #[test]
    fn multiplier_inside_call_argument_counts() {
        let expr = parse("a*sinh(k*x) + c").expect("should parse");
        assert!(multiplies_var("x", "a", &expr));
        assert!(multiplies_var("x", "k", &expr));
        assert!(!multiplies_var("x", "c", &expr));
        assert!(!multiplies_var("x", "b", &expr));
    }

    #[test]
    fn deeply_nested_products_classify() {
        let expr = parse("w*a^pi*sin(k^10*tan(y*x)*z) + d + e^10*tan(f)").expect("should parse");
        assert!(multiplies_var("x", "w", &expr));
        assert!(multiplies_var("x", "a", &expr));
        assert!(multiplies_var("x", "k", &expr));
        assert!(multiplies_var("x", "z", &expr));
        assert!(multiplies_var("x", "y", &expr));
        assert!(!multiplies_var("x", "d", &expr));
        assert!(!multiplies_var("x", "e", &expr));
        assert!(!multiplies_var("x", "f", &expr));
    }

    #[test]
    fn scaling_and_offset_parameters_split() {
        let map = defaults("a*x*cos(x*y) + b", &["x", "y"]);
        assert_eq!(map["a"], 1.0);
        assert_eq!(map["b"], 0.0);
    }

    #[test]
    fn power_of_parameter_counts_as_scaling() {
        let map = defaults("a^2*sin(x) + b*y + c", &["x", "y"]);
        assert_eq!(map["a"], 1.0);
        assert_eq!(map["b"], 1.0);
        assert_eq!(map["c"], 0.0);
    }

    #[test]
    fn divisor_counts_as_scaling() {
        let map = defaults("x/a + b", &["x", "y"]);
        assert_eq!(map["a"], 1.0);
        assert_eq!(map["b"], 0.0);
    }

    #[test]
    fn single_variable_domain_only_checks_that_variable() {
        let map = defaults("b*sinh(y) + c", &["y"]);
        assert_eq!(map["b"], 1.0);
        assert_eq!(map["c"], 0.0);
    }

    #[test]
    fn classification_is_structural_not_semantic() {
        // b multiplies an x-term here even though the product is zero.
        let map = defaults("b*x*0 + x", &["x", "y"]);
        assert_eq!(map["b"], 1.0);
    }

    #[test]
    fn constant_expressions_have_offset_parameters() {
        let map = defaults("a*b + c", &["x", "y"]);
        assert_eq!(map["a"], 0.0);
        assert_eq!(map["b"], 0.0);
        assert_eq!(map["c"], 0.0);
    }

    #[test]
    fn one_occurrence_anywhere_suffices() {
        // a appears once additively and once multiplicatively; OR wins.
        let map = defaults("a + a*x", &["x", "y"]);
        assert_eq!(map["a"], 1.0);
    }
}
