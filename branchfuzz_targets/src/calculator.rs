//! Floating-point expression evaluator.
//!
//! Supports number literals, the variable `x`, `+ - * / % **`, unary signs,
//! parentheses and a fixed set of one-argument functions. `**` binds tighter
//! than a unary sign on its left and is right-associative. Expressions that
//! mention `x` are evaluated at [`SAMPLE_POINTS`] points spread over
//! `[-10, 10]`; the first failing point fails the whole execution.

use crate::{MAX_NESTING, MAX_OPERATORS};
use branchfuzz_core::target::{ExecContext, Target, TargetError};

pub const SEEDS: &[&str] = &[
    "2 + 3",
    "5 * 6",
    "log(10)",
    "sin(3.14)",
    "exp(2)",
    "x ** 2",
    "sqrt(x)",
    "x + 5 * sin(x)",
    "cos(x) / log(x + 1)",
];

pub const SAMPLE_POINTS: usize = 10;
const SAMPLE_MIN: f64 = -10.0;
const SAMPLE_MAX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
    Sqrt,
    Abs,
    Round,
    Ceil,
    Floor,
    Factorial,
}

impl Function {
    pub const ALL: [Function; 11] = [
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Log,
        Function::Exp,
        Function::Sqrt,
        Function::Abs,
        Function::Round,
        Function::Ceil,
        Function::Floor,
        Function::Factorial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Factorial => "factorial",
        }
    }

    fn branch(self) -> &'static str {
        match self {
            Function::Sin => "calc_func_sin",
            Function::Cos => "calc_func_cos",
            Function::Tan => "calc_func_tan",
            Function::Log => "calc_func_log",
            Function::Exp => "calc_func_exp",
            Function::Sqrt => "calc_func_sqrt",
            Function::Abs => "calc_func_abs",
            Function::Round => "calc_func_round",
            Function::Ceil => "calc_func_ceil",
            Function::Floor => "calc_func_floor",
            Function::Factorial => "calc_func_factorial",
        }
    }

    pub fn lookup(name: &str) -> Option<Function> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn apply(self, arg: f64, ctx: &mut ExecContext<'_>) -> Result<f64, TargetError> {
        let value = match self {
            Function::Sin => arg.sin(),
            Function::Cos => arg.cos(),
            Function::Tan => arg.tan(),
            Function::Log => {
                if arg <= 0.0 {
                    return Err(domain_error(ctx, "log of a non-positive number"));
                }
                arg.ln()
            }
            Function::Exp => arg.exp(),
            Function::Sqrt => {
                if arg < 0.0 {
                    return Err(domain_error(ctx, "sqrt of a negative number"));
                }
                arg.sqrt()
            }
            Function::Abs => arg.abs(),
            Function::Round => arg.round_ties_even(),
            Function::Ceil => arg.ceil(),
            Function::Floor => arg.floor(),
            Function::Factorial => {
                if arg < 0.0 || arg.fract() != 0.0 {
                    return Err(domain_error(
                        ctx,
                        "factorial needs a non-negative integral value",
                    ));
                }
                factorial(arg, ctx)?
            }
        };
        Ok(value)
    }
}

fn factorial(n: f64, ctx: &mut ExecContext<'_>) -> Result<f64, TargetError> {
    let mut acc = 1.0_f64;
    let mut k = 2.0;
    while k <= n {
        acc *= k;
        if acc.is_infinite() {
            break;
        }
        k += 1.0;
        ctx.checkpoint()?;
    }
    Ok(acc)
}

fn syntax_error(ctx: &mut ExecContext<'_>, message: impl Into<String>) -> TargetError {
    ctx.record("calc_syntax_error");
    TargetError::runtime("syntax", message)
}

fn domain_error(ctx: &mut ExecContext<'_>, message: &str) -> TargetError {
    ctx.record("calc_domain_error");
    TargetError::runtime("domain", message)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

pub fn tokenize(text: &str, ctx: &mut ExecContext<'_>) -> Result<Vec<Token>, TargetError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| syntax_error(ctx, format!("Malformed number '{literal}'")))?;
            tokens.push(Token::Number(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::DoubleStar
            }
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => {
                ctx.record("calc_unknown_char");
                return Err(TargetError::runtime(
                    "syntax",
                    format!("Unexpected character '{c}' at position {i}"),
                ));
            }
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable,
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn has_variable(&self) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Variable => true,
            Expr::Neg(inner) => inner.has_variable(),
            Expr::Binary { left, right, .. } => left.has_variable() || right.has_variable(),
            Expr::Call { arg, .. } => arg.has_variable(),
        }
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn descend(&mut self, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            ctx.record("calc_too_deep");
            return Err(syntax_error(ctx, "Expression nested too deeply"));
        }
        ctx.checkpoint()
    }

    fn binary(
        &mut self,
        op: BinOp,
        left: Expr,
        right: Expr,
        ctx: &mut ExecContext<'_>,
    ) -> Result<Expr, TargetError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            ctx.record("calc_too_deep");
            return Err(syntax_error(ctx, "Too many operators"));
        }
        ctx.checkpoint()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        if self.tokens.is_empty() {
            return Err(syntax_error(ctx, "Empty expression"));
        }
        let expr = self.expr(ctx)?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(syntax_error(ctx, format!("Unexpected trailing {token:?}"))),
        }
    }

    fn expr(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        let mut left = self.term(ctx)?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.term(ctx)?;
            left = self.binary(op, left, right, ctx)?;
        }
    }

    fn term(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        let mut left = self.unary(ctx)?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary(ctx)?;
            left = self.binary(op, left, right, ctx)?;
        }
    }

    fn unary(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.bump();
                self.descend(ctx)?;
                let inner = self.unary(ctx)?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.bump();
                self.descend(ctx)?;
                let inner = self.unary(ctx)?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.power(ctx),
        }
    }

    fn power(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        let base = self.atom(ctx)?;
        if self.peek() != Some(&Token::DoubleStar) {
            return Ok(base);
        }
        self.bump();
        self.descend(ctx)?;
        let exponent = self.unary(ctx)?;
        self.depth -= 1;
        self.binary(BinOp::Pow, base, exponent, ctx)
    }

    fn parenthesized(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        if self.bump() != Some(&Token::LParen) {
            return Err(syntax_error(ctx, "Expected '('"));
        }
        self.descend(ctx)?;
        let inner = self.expr(ctx)?;
        self.depth -= 1;
        if self.bump() != Some(&Token::RParen) {
            return Err(syntax_error(ctx, "Expected ')'"));
        }
        Ok(inner)
    }

    fn atom(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        match self.peek() {
            Some(Token::Number(value)) => {
                self.bump();
                Ok(Expr::Number(*value))
            }
            Some(Token::Ident(name)) if name == "x" => {
                self.bump();
                Ok(Expr::Variable)
            }
            Some(Token::Ident(name)) => {
                let Some(function) = Function::lookup(name) else {
                    ctx.record("calc_unknown_name");
                    return Err(TargetError::runtime(
                        "name",
                        format!("Unknown name '{name}'"),
                    ));
                };
                self.bump();
                let arg = self.parenthesized(ctx)?;
                Ok(Expr::Call {
                    function,
                    arg: Box::new(arg),
                })
            }
            Some(Token::LParen) => {
                ctx.record("calc_paren");
                self.parenthesized(ctx)
            }
            other => Err(syntax_error(ctx, format!("Unexpected {other:?}"))),
        }
    }
}

pub fn parse(text: &str, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
    let tokens = tokenize(text, ctx)?;
    Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    }
    .parse(ctx)
}

/// Floored modulo: the result takes the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

pub fn evaluate(expr: &Expr, x: f64, ctx: &mut ExecContext<'_>) -> Result<f64, TargetError> {
    let value = match expr {
        Expr::Number(value) => {
            ctx.record("calc_number");
            *value
        }
        Expr::Variable => {
            ctx.record("calc_variable");
            x
        }
        Expr::Neg(inner) => {
            ctx.record("calc_neg");
            -evaluate(inner, x, ctx)?
        }
        Expr::Call { function, arg } => {
            ctx.record(function.branch());
            let arg = evaluate(arg, x, ctx)?;
            function.apply(arg, ctx)?
        }
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, x, ctx)?;
            let rhs = evaluate(right, x, ctx)?;
            match op {
                BinOp::Add => {
                    ctx.record("calc_add");
                    lhs + rhs
                }
                BinOp::Sub => {
                    ctx.record("calc_sub");
                    lhs - rhs
                }
                BinOp::Mul => {
                    ctx.record("calc_mul");
                    lhs * rhs
                }
                BinOp::Div | BinOp::Mod if rhs == 0.0 => {
                    ctx.record("calc_div_zero");
                    return Err(TargetError::runtime("zero-division", "Division by zero"));
                }
                BinOp::Div => {
                    ctx.record("calc_div");
                    lhs / rhs
                }
                BinOp::Mod => {
                    ctx.record("calc_mod");
                    floored_mod(lhs, rhs)
                }
                BinOp::Pow => {
                    ctx.record("calc_pow");
                    if lhs == 0.0 && rhs < 0.0 {
                        ctx.record("calc_div_zero");
                        return Err(TargetError::runtime(
                            "zero-division",
                            "Zero raised to a negative power",
                        ));
                    }
                    if lhs < 0.0 && rhs.fract() != 0.0 {
                        return Err(domain_error(ctx, "Negative base with fractional exponent"));
                    }
                    lhs.powf(rhs)
                }
            }
        }
    };
    if !value.is_finite() {
        ctx.record("calc_non_finite");
        return Err(TargetError::runtime(
            "overflow",
            format!("Result {value} is not finite"),
        ));
    }
    Ok(value)
}

/// The `x` values a variable expression is evaluated at.
pub fn sample_points() -> impl Iterator<Item = f64> {
    let step = (SAMPLE_MAX - SAMPLE_MIN) / (SAMPLE_POINTS - 1) as f64;
    (0..SAMPLE_POINTS).map(move |i| SAMPLE_MIN + step * i as f64)
}

/// The calculator as a fuzz target.
#[derive(Debug, Default)]
pub struct Calculator {
    results: Vec<f64>,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values computed by the last successful execution, one per sample
    /// point for variable expressions.
    pub fn results(&self) -> &[f64] {
        &self.results
    }
}

impl Target<String> for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn execute(&mut self, input: &String, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        self.results.clear();
        ctx.record("calc_start");
        let expr = parse(input, ctx)?;
        let results = if expr.has_variable() {
            ctx.record("calc_has_variable");
            sample_points()
                .map(|x| evaluate(&expr, x, ctx))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            ctx.record("calc_constant");
            vec![evaluate(&expr, 0.0, ctx)?]
        };
        ctx.record("calc_result");
        self.results = results;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchfuzz_core::coverage::CoverageMap;

    fn run(text: &str) -> (Result<Vec<f64>, TargetError>, CoverageMap) {
        let mut target = Calculator::new();
        let mut scope = CoverageMap::new();
        let result = {
            let mut ctx = ExecContext::new(&mut scope, None);
            target.execute(&text.to_string(), &mut ctx)
        };
        (result.map(|()| target.results().to_vec()), scope)
    }

    fn constant(text: &str) -> f64 {
        let (result, _) = run(text);
        let values = result.unwrap();
        assert_eq!(values.len(), 1);
        values[0]
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(constant("2 + 3 * 4"), 14.0);
        assert_eq!(constant("(2 + 3) * 4"), 20.0);
        assert_eq!(constant("2 ** 3 ** 2"), 512.0);
        assert_eq!(constant("-2 ** 2"), -4.0);
        assert_eq!(constant("2 ** -1"), 0.5);
        assert_eq!(constant("10 - 4 - 3"), 3.0);
        assert_eq!(constant("-7 % 3"), 2.0);
        assert_eq!(constant("7 % -3"), -2.0);
    }

    #[test]
    fn functions_record_their_branch() {
        let (result, scope) = run("abs(floor(-2.5)) + factorial(4)");
        assert_eq!(result.unwrap(), vec![27.0]);
        for tag in [
            "calc_start",
            "calc_func_abs",
            "calc_func_floor",
            "calc_func_factorial",
            "calc_neg",
            "calc_add",
            "calc_constant",
            "calc_result",
        ] {
            assert!(scope.contains(tag), "missing {tag}");
        }
        assert_eq!(constant("round(2.5)"), 2.0);
        assert_eq!(constant("ceil(0.2)"), 1.0);
    }

    #[test]
    fn seeds_evaluate() {
        for seed in ["2 + 3", "5 * 6", "log(10)", "sin(3.14)", "exp(2)", "x ** 2", "x + 5 * sin(x)"] {
            let (result, _) = run(seed);
            assert!(result.is_ok(), "{seed} failed: {result:?}");
        }
    }

    #[test]
    fn variable_expressions_use_every_sample_point() {
        let (result, scope) = run("x ** 2");
        let values = result.unwrap();
        assert_eq!(values.len(), SAMPLE_POINTS);
        assert_eq!(values[0], 100.0);
        assert!((values[SAMPLE_POINTS - 1] - 100.0).abs() < 1e-9);
        assert!(scope.contains("calc_has_variable"));
        assert!(scope.contains("calc_variable"));
        assert!(scope.contains("calc_pow"));
    }

    #[test]
    fn domain_errors() {
        for (text, tag) in [
            ("sqrt(x)", "calc_domain_error"),
            ("log(0)", "calc_domain_error"),
            ("factorial(2.5)", "calc_domain_error"),
            ("(-8) ** 0.5", "calc_domain_error"),
            ("1 / (2 - 2)", "calc_div_zero"),
            ("5 % 0", "calc_div_zero"),
            ("0 ** -1", "calc_div_zero"),
            ("exp(1000)", "calc_non_finite"),
            ("factorial(200)", "calc_non_finite"),
        ] {
            let (result, scope) = run(text);
            assert!(result.is_err(), "{text} should fail");
            assert!(scope.contains(tag), "{text} should record {tag}");
            assert!(!scope.contains("calc_result"));
        }
    }

    #[test]
    fn syntax_errors() {
        for (text, tag) in [
            ("", "calc_syntax_error"),
            ("2 +", "calc_syntax_error"),
            ("(1 + 2", "calc_syntax_error"),
            ("1 2", "calc_syntax_error"),
            ("1..2", "calc_syntax_error"),
            ("sin 2", "calc_syntax_error"),
            ("2 $ 3", "calc_unknown_char"),
            ("y + 1", "calc_unknown_name"),
        ] {
            let (result, scope) = run(text);
            assert!(result.is_err(), "{text:?} should fail");
            assert!(scope.contains(tag), "{text:?} should record {tag}");
        }
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let text = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let (result, scope) = run(&text);
        assert!(result.is_err());
        assert!(scope.contains("calc_too_deep"));

        let text = format!("{}1", "-".repeat(300));
        let (result, scope) = run(&text);
        assert!(result.is_err());
        assert!(scope.contains("calc_too_deep"));
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let text = vec!["1"; MAX_OPERATORS + 1].join("+");
        let (result, _) = run(&text);
        assert_eq!(result.unwrap(), vec![(MAX_OPERATORS + 1) as f64]);

        let text = vec!["1"; 50_000].join("*");
        let (result, scope) = run(&text);
        assert!(result.is_err());
        assert!(scope.contains("calc_too_deep"));
    }

    #[test]
    fn sample_points_span_the_interval() {
        let points: Vec<f64> = sample_points().collect();
        assert_eq!(points.len(), SAMPLE_POINTS);
        assert_eq!(points[0], -10.0);
        assert!((points[SAMPLE_POINTS - 1] - 10.0).abs() < 1e-9);
        assert!(points.iter().all(|p| *p != 0.0));
    }
}
