//! Expression → compiled numeric function.
//!
//! Compilation parses the source, classifies it by which of the two domain
//! symbols it uses, zero-pads domain-free expressions so every compiled
//! function keeps a uniform calling convention, and lowers the AST to
//! bytecode for a small stack VM.
//!
//! The VM is stateless; all scratch (the value stack and the randomness
//! source feeding `noise`) lives in an [`EvalContext`] supplied per call, so
//! a compiled function is safe to evaluate from independent contexts.

use crate::defaults::suggest_defaults;
use crate::expr::{parse, Expr, ParseError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors produced while turning a source string into bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' takes {expected} argument(s), found {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Errors produced when evaluating a compiled function with bad inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("missing value for second domain variable '{0}'")]
    MissingDomainValue(String),
    #[error("expression declares {expected} parameter(s) but only {found} value(s) were supplied")]
    MissingArgument { expected: usize, found: usize },
    #[error("expression declares {expected} parameter(s) but {found} value(s) were supplied")]
    ExtraArguments { expected: usize, found: usize },
    #[error("expected {expected} domain input column(s), got {found}")]
    DomainArityMismatch { expected: usize, found: usize },
    #[error("domain input columns must have equal length ({left} vs {right})")]
    DomainLengthMismatch { left: usize, right: usize },
}

/// Which of the two canonical domain symbols a single-variable expression
/// depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainVar {
    First,
    Second,
}

/// Domain arity of a compiled expression, fixed at compile time.
///
/// A `Constant` expression references neither domain symbol; it is augmented
/// with `zero(s1, s2)` so it still evaluates as a function of two unused
/// inputs. Its calling convention is therefore the same as `Double`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    Constant,
    Single(DomainVar),
    Double,
}

impl Arity {
    /// Number of domain values the compiled function consumes per call.
    pub fn domain_len(&self) -> usize {
        match self {
            Arity::Single(_) => 1,
            Arity::Constant | Arity::Double => 2,
        }
    }
}

/// OpCodes for the stack-based VM.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes a domain value (by index into the call's domain inputs).
    LoadVar(usize),
    /// Pushes a parameter value (by index in declared parameter order).
    LoadParam(usize),
    /// Pops (b, a), pushes (a op b).
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Pops a, pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    /// Indicator of the open interval (-0.5, 0.5).
    Rect,
    /// Pops its argument, pushes an independent uniform draw in [-1, 1].
    Noise,
    /// Pops (b, a), pushes a * 0. Structural placeholder term.
    Zero,
}

/// A compiled sequence of operations.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Per-call scratch: the VM value stack and the randomness source consumed
/// by the `noise` primitive. Evaluation is pure apart from that one
/// injected effect.
pub struct EvalContext {
    stack: Vec<f64>,
    rng: StdRng,
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(64),
            rng: StdRng::from_entropy(),
        }
    }

    /// A context with a fixed RNG seed, for reproducible noisy evaluation.
    pub fn seeded(seed: u64) -> Self {
        Self {
            stack: Vec::with_capacity(64),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack-based VM for evaluating compiled expressions.
pub struct Vm;

impl Vm {
    /// Executes the bytecode against one element of domain input.
    ///
    /// The bytecode is well-formed by construction (the lowering pass checks
    /// function arities and resolves every symbol), so stack underflow
    /// cannot occur here.
    pub fn execute(
        bytecode: &Bytecode,
        vars: &[f64],
        params: &[f64],
        stack: &mut Vec<f64>,
        rng: &mut impl Rng,
    ) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(*val),
                OpCode::LoadVar(idx) => stack.push(vars[*idx]),
                OpCode::LoadParam(idx) => stack.push(params[*idx]),
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => Self::apply_unary(stack, f64::sin),
                OpCode::Cos => Self::apply_unary(stack, f64::cos),
                OpCode::Tan => Self::apply_unary(stack, f64::tan),
                OpCode::Asin => Self::apply_unary(stack, f64::asin),
                OpCode::Acos => Self::apply_unary(stack, f64::acos),
                OpCode::Atan => Self::apply_unary(stack, f64::atan),
                OpCode::Sinh => Self::apply_unary(stack, f64::sinh),
                OpCode::Cosh => Self::apply_unary(stack, f64::cosh),
                OpCode::Tanh => Self::apply_unary(stack, f64::tanh),
                OpCode::Exp => Self::apply_unary(stack, f64::exp),
                OpCode::Ln => Self::apply_unary(stack, f64::ln),
                OpCode::Log10 => Self::apply_unary(stack, f64::log10),
                OpCode::Sqrt => Self::apply_unary(stack, f64::sqrt),
                OpCode::Abs => Self::apply_unary(stack, f64::abs),
                OpCode::Rect => {
                    let a = stack.pop().unwrap();
                    stack.push(if a > -0.5 && a < 0.5 { 1.0 } else { 0.0 });
                }
                OpCode::Noise => {
                    let _ = stack.pop().unwrap();
                    stack.push(rng.gen_range(-1.0..=1.0));
                }
                OpCode::Zero => {
                    let _b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    // args[0] * 0: NaN in the first argument propagates.
                    stack.push(a * 0.0);
                }
            }
        }

        stack.pop().unwrap_or(0.0)
    }

    fn apply_unary(stack: &mut Vec<f64>, f: impl Fn(f64) -> f64) {
        let a = stack.pop().unwrap();
        stack.push(f(a));
    }
}

/// Lowers an AST to bytecode, resolving symbol names to indices.
struct Lowerer {
    var_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Lowerer {
    fn new(domain: &[String], params: &[String]) -> Self {
        let var_map = domain
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = params
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    fn lower(&self, expr: &Expr) -> Result<Bytecode, CompileError> {
        let mut ops = Vec::new();
        self.lower_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn lower_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else {
                    // Both maps are built from the expression's own free
                    // symbols, so the lookup is total.
                    ops.push(OpCode::LoadParam(self.param_map[name]));
                }
            }
            Expr::Binary(left, op, right) => {
                self.lower_recursive(left, ops)?;
                self.lower_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    _ => OpCode::Pow,
                });
            }
            Expr::Neg(inner) => {
                self.lower_recursive(inner, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, args) => {
                let (expected, op) = function_op(name)
                    .ok_or_else(|| CompileError::UnknownFunction(name.clone()))?;
                if args.len() != expected {
                    return Err(CompileError::WrongArity {
                        name: name.clone(),
                        expected,
                        found: args.len(),
                    });
                }
                for arg in args {
                    self.lower_recursive(arg, ops)?;
                }
                ops.push(op);
            }
        }
        Ok(())
    }
}

fn function_op(name: &str) -> Option<(usize, OpCode)> {
    let op = match name {
        "sin" => OpCode::Sin,
        "cos" => OpCode::Cos,
        "tan" => OpCode::Tan,
        "asin" => OpCode::Asin,
        "acos" => OpCode::Acos,
        "atan" => OpCode::Atan,
        "sinh" => OpCode::Sinh,
        "cosh" => OpCode::Cosh,
        "tanh" => OpCode::Tanh,
        "exp" => OpCode::Exp,
        "log" | "ln" => OpCode::Ln,
        "log10" => OpCode::Log10,
        "sqrt" => OpCode::Sqrt,
        "abs" => OpCode::Abs,
        "rect" => OpCode::Rect,
        "noise" => OpCode::Noise,
        "zero" => return Some((2, OpCode::Zero)),
        _ => return None,
    };
    Some((1, op))
}

/// A compiled scalar function of one or two domain variables plus any number
/// of parameters. Immutable after compilation; holds no evaluation state.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    expr: Expr,
    bytecode: Bytecode,
    arity: Arity,
    domain: Vec<String>,
    parameters: Vec<String>,
    defaults: HashMap<String, f64>,
}

impl CompiledFunction {
    /// Compiles `source` against the given pair of domain symbols.
    ///
    /// Classification is decided once here: both symbols present gives
    /// `Double`, one gives `Single`, neither gives `Constant` after the
    /// expression is augmented with `zero(s1, s2)` so it still accepts both
    /// domain inputs.
    pub fn compile(source: &str, domain_symbols: (&str, &str)) -> Result<Self, CompileError> {
        let parsed = parse(source)?;
        let (s1, s2) = domain_symbols;
        let has_first = parsed.contains_symbol(s1);
        let has_second = parsed.contains_symbol(s2);

        let (expr, arity, domain) = match (has_first, has_second) {
            (true, true) => (parsed, Arity::Double, vec![s1.to_string(), s2.to_string()]),
            (true, false) => (parsed, Arity::Single(DomainVar::First), vec![s1.to_string()]),
            (false, true) => (
                parsed,
                Arity::Single(DomainVar::Second),
                vec![s2.to_string()],
            ),
            (false, false) => {
                let padding = Expr::Call(
                    "zero".to_string(),
                    vec![
                        Expr::Variable(s1.to_string()),
                        Expr::Variable(s2.to_string()),
                    ],
                );
                let padded = Expr::Binary(Box::new(parsed), '+', Box::new(padding));
                (padded, Arity::Constant, vec![s1.to_string(), s2.to_string()])
            }
        };

        let parameters: Vec<String> = expr
            .free_symbols()
            .into_iter()
            .filter(|name| name != s1 && name != s2)
            .collect();

        let bytecode = Lowerer::new(&domain, &parameters).lower(&expr)?;
        let defaults = suggest_defaults(&expr, &domain, &parameters);

        Ok(Self {
            expr,
            bytecode,
            arity,
            domain,
            parameters,
            defaults,
        })
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Domain symbols actually consumed per call, in canonical order.
    pub fn domain_variables(&self) -> &[String] {
        &self.domain
    }

    /// Free symbols other than the domain variables, in discovery order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Suggested default value per parameter (1.0 for scaling parameters,
    /// 0.0 for additive offsets). Computed once at compile time.
    pub fn default_values(&self) -> &HashMap<String, f64> {
        &self.defaults
    }

    /// Default values in declared parameter order.
    pub fn default_vector(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|name| self.defaults[name])
            .collect()
    }

    /// The compiled expression tree (including the zero-padding term for
    /// constant expressions).
    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    /// Scalar evaluation with the positional calling convention: for two-input
    /// functions `rest[0]` is the second domain value and the remainder are
    /// parameter values in declared order; for single-variable functions all
    /// of `rest` are parameter values.
    pub fn evaluate(
        &self,
        ctx: &mut EvalContext,
        primary: f64,
        rest: &[f64],
    ) -> Result<f64, EvalError> {
        match self.arity.domain_len() {
            1 => self.call(ctx, &[primary], rest),
            _ => {
                let (&second, params) = rest
                    .split_first()
                    .ok_or_else(|| EvalError::MissingDomainValue(self.domain[1].clone()))?;
                self.call(ctx, &[primary, second], params)
            }
        }
    }

    /// Scalar evaluation with domain values and parameter values already
    /// split apart.
    pub fn call(
        &self,
        ctx: &mut EvalContext,
        domain: &[f64],
        params: &[f64],
    ) -> Result<f64, EvalError> {
        if domain.len() != self.arity.domain_len() {
            return Err(EvalError::DomainArityMismatch {
                expected: self.arity.domain_len(),
                found: domain.len(),
            });
        }
        self.check_param_count(params.len())?;
        Ok(self.eval_raw(ctx, domain, params))
    }

    /// Vectorized evaluation: each entry of `domain` is one column of input
    /// values (one column per domain variable, equal lengths). Returns one
    /// output per element. `noise` draws independently per element.
    pub fn evaluate_many(
        &self,
        ctx: &mut EvalContext,
        domain: &[&[f64]],
        params: &[f64],
    ) -> Result<Vec<f64>, EvalError> {
        if domain.len() != self.arity.domain_len() {
            return Err(EvalError::DomainArityMismatch {
                expected: self.arity.domain_len(),
                found: domain.len(),
            });
        }
        let len = domain[0].len();
        for column in &domain[1..] {
            if column.len() != len {
                return Err(EvalError::DomainLengthMismatch {
                    left: len,
                    right: column.len(),
                });
            }
        }
        self.check_param_count(params.len())?;

        let mut out = Vec::with_capacity(len);
        let mut vars = [0.0; 2];
        for i in 0..len {
            for (slot, column) in vars.iter_mut().zip(domain) {
                *slot = column[i];
            }
            out.push(Vm::execute(
                &self.bytecode,
                &vars[..domain.len()],
                params,
                &mut ctx.stack,
                &mut ctx.rng,
            ));
        }
        Ok(out)
    }

    /// Evaluation without input validation. Callers must uphold
    /// `domain.len() == arity().domain_len()` and
    /// `params.len() == parameters().len()`.
    pub(crate) fn eval_raw(&self, ctx: &mut EvalContext, domain: &[f64], params: &[f64]) -> f64 {
        debug_assert_eq!(domain.len(), self.arity.domain_len());
        debug_assert_eq!(params.len(), self.parameters.len());
        Vm::execute(
            &self.bytecode,
            domain,
            params,
            &mut ctx.stack,
            &mut ctx.rng,
        )
    }

    fn check_param_count(&self, found: usize) -> Result<(), EvalError> {
        let expected = self.parameters.len();
        if found < expected {
            Err(EvalError::MissingArgument { expected, found })
        } else if found > expected {
            Err(EvalError::ExtraArguments { expected, found })
        } else {
            Ok(())
        }
    }
}
