//! A tiny imperative language: integer assignments and `print`.
//!
//! ```text
//! program   := stmt*
//! stmt      := IDENT '=' expr ';' | 'print' '(' expr ')' ';'
//! expr      := term (('+' | '-') term)*
//! term      := factor (('*' | '/') factor)*
//! factor    := NUMBER | IDENT | '(' expr ')'
//! ```

use crate::{MAX_NESTING, MAX_OPERATORS};
use branchfuzz_core::target::{ExecContext, Target, TargetError};
use std::collections::HashMap;

/// Characters the toy-language mutator draws from.
pub const ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+-*/=(); \n";

pub const SEEDS: &[&str] = &[
    "x=1;print(x);",
    "x=2;y=3;print(x+y);",
    "print(1+2*3);",
    "abc=123;print(abc);",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Print,
    Number(i64),
    Plus,
    Minus,
    Star,
    Slash,
    Equals,
    LParen,
    RParen,
    Semi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Ident(String),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { name: String, value: Expr },
    Print(Expr),
}

fn syntax_error(message: impl Into<String>) -> TargetError {
    TargetError::runtime("syntax", message)
}

pub fn tokenize(code: &str, ctx: &mut ExecContext<'_>) -> Result<Vec<Token>, TargetError> {
    ctx.record("lexer_start");
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if ident == "print" {
                ctx.record("lexer_print_kw");
                tokens.push(Token::Print);
            } else {
                ctx.record("lexer_ident");
                tokens.push(Token::Ident(ident));
            }
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            ctx.record("lexer_number");
            let value = digits.parse::<i64>().map_err(|_| {
                ctx.record("lexer_number_overflow");
                TargetError::runtime("overflow", format!("Integer literal {digits} is too large"))
            })?;
            tokens.push(Token::Number(value));
            continue;
        }

        let (token, tag) = match c {
            '+' => (Token::Plus, "lexer_plus"),
            '-' => (Token::Minus, "lexer_minus"),
            '*' => (Token::Star, "lexer_star"),
            '/' => (Token::Slash, "lexer_slash"),
            '=' => (Token::Equals, "lexer_equals"),
            '(' => (Token::LParen, "lexer_lparen"),
            ')' => (Token::RParen, "lexer_rparen"),
            ';' => (Token::Semi, "lexer_semi"),
            _ => {
                ctx.record("lexer_unknown_symbol");
                return Err(syntax_error(format!("Unknown symbol '{c}' at position {i}")));
            }
        };
        ctx.record(tag);
        tokens.push(token);
        i += 1;
    }

    ctx.record("lexer_end");
    Ok(tokens)
}

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            operators: 0,
        }
    }

    fn current(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(
        &mut self,
        expected: &Token,
        tag: &'static str,
        message: &str,
        ctx: &mut ExecContext<'_>,
    ) -> Result<(), TargetError> {
        if self.current() != Some(expected) {
            ctx.record(tag);
            return Err(syntax_error(message));
        }
        self.advance();
        Ok(())
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
            ctx.record("parse_too_deep");
            return Err(syntax_error(format!(
                "More than {MAX_OPERATORS} binary operators"
            )));
        }
        Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn parse_program(&mut self, ctx: &mut ExecContext<'_>) -> Result<Vec<Stmt>, TargetError> {
        ctx.record("parse_program_start");
        let mut statements = Vec::new();
        while self.current().is_some() {
            ctx.checkpoint()?;
            statements.push(self.parse_statement(ctx)?);
        }
        ctx.record("parse_program_end");
        Ok(statements)
    }

    fn parse_statement(&mut self, ctx: &mut ExecContext<'_>) -> Result<Stmt, TargetError> {
        match self.current() {
            Some(Token::Ident(_)) => {
                ctx.record("parse_stmt_assign");
                self.parse_assign(ctx)
            }
            Some(Token::Print) => {
                ctx.record("parse_stmt_print");
                self.parse_print(ctx)
            }
            other => {
                ctx.record("parse_stmt_error");
                Err(syntax_error(format!("Unexpected token {other:?}")))
            }
        }
    }

    fn parse_assign(&mut self, ctx: &mut ExecContext<'_>) -> Result<Stmt, TargetError> {
        let name = match self.current() {
            Some(Token::Ident(name)) => name.clone(),
            other => return Err(syntax_error(format!("Expected identifier, got {other:?}"))),
        };
        self.advance();
        self.expect(
            &Token::Equals,
            "parse_assign_no_equals",
            "Expected '=' in assignment.",
            ctx,
        )?;
        let value = self.parse_expr(ctx)?;
        self.expect(
            &Token::Semi,
            "parse_assign_no_semi",
            "Expected ';' after assignment.",
            ctx,
        )?;
        Ok(Stmt::Assign { name, value })
    }

    fn parse_print(&mut self, ctx: &mut ExecContext<'_>) -> Result<Stmt, TargetError> {
        self.advance();
        self.expect(
            &Token::LParen,
            "parse_print_no_lparen",
            "Expected '(' after 'print'.",
            ctx,
        )?;
        let value = self.parse_expr(ctx)?;
        self.expect(
            &Token::RParen,
            "parse_print_no_rparen",
            "Expected ')' after expression in print.",
            ctx,
        )?;
        self.expect(
            &Token::Semi,
            "parse_print_no_semi",
            "Expected ';' after print statement.",
            ctx,
        )?;
        Ok(Stmt::Print(value))
    }

    fn parse_expr(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        let mut left = self.parse_term(ctx)?;
        loop {
            let op = match self.current() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            ctx.checkpoint()?;
            self.advance();
            let right = self.parse_term(ctx)?;
            left = self.binary(op, left, right, ctx)?;
        }
    }

    fn parse_term(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        let mut left = self.parse_factor(ctx)?;
        loop {
            let op = match self.current() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            ctx.checkpoint()?;
            self.advance();
            let right = self.parse_factor(ctx)?;
            left = self.binary(op, left, right, ctx)?;
        }
    }

    fn parse_factor(&mut self, ctx: &mut ExecContext<'_>) -> Result<Expr, TargetError> {
        match self.current() {
            Some(Token::Number(value)) => {
                self.advance();
                Ok(Expr::Number(*value))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Expr::Ident(name.clone()))
            }
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    ctx.record("parse_too_deep");
                    return Err(syntax_error(format!(
                        "Parentheses nested deeper than {MAX_NESTING}"
                    )));
                }
                self.advance();
                self.depth += 1;
                let inner = self.parse_expr(ctx)?;
                self.depth -= 1;
                self.expect(
                    &Token::RParen,
                    "parse_factor_no_rparen",
                    "Expected ')' after expression.",
                    ctx,
                )?;
                Ok(inner)
            }
            other => {
                ctx.record("parse_factor_error");
                Err(syntax_error(format!("Unexpected token in factor: {other:?}")))
            }
        }
    }
}

/// Division rounding toward negative infinity. `None` on overflow.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

#[derive(Debug, Default)]
pub struct Interpreter {
    variables: HashMap<String, i64>,
    printed: Vec<i64>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn printed(&self) -> &[i64] {
        &self.printed
    }

    pub fn variable(&self, name: &str) -> Option<i64> {
        self.variables.get(name).copied()
    }

    pub fn eval_program(
        &mut self,
        program: &[Stmt],
        ctx: &mut ExecContext<'_>,
    ) -> Result<(), TargetError> {
        for stmt in program {
            ctx.checkpoint()?;
            self.eval_statement(stmt, ctx)?;
        }
        Ok(())
    }

    fn eval_statement(&mut self, stmt: &Stmt, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        match stmt {
            Stmt::Assign { name, value } => {
                ctx.record("interp_assign");
                let value = self.eval_expr(value, ctx)?;
                self.variables.insert(name.clone(), value);
            }
            Stmt::Print(expr) => {
                ctx.record("interp_print");
                let value = self.eval_expr(expr, ctx)?;
                self.printed.push(value);
            }
        }
        Ok(())
    }

    fn eval_expr(&self, expr: &Expr, ctx: &mut ExecContext<'_>) -> Result<i64, TargetError> {
        match expr {
            Expr::Number(value) => Ok(*value),
            Expr::Ident(name) => self.variables.get(name).copied().ok_or_else(|| {
                ctx.record("interp_undefined_var");
                TargetError::runtime("name", format!("Undefined variable '{name}'"))
            }),
            Expr::BinOp { op, left, right } => {
                ctx.record("interp_binop");
                let lhs = self.eval_expr(left, ctx)?;
                let rhs = self.eval_expr(right, ctx)?;
                let result = match op {
                    BinOp::Add => lhs.checked_add(rhs),
                    BinOp::Sub => lhs.checked_sub(rhs),
                    BinOp::Mul => lhs.checked_mul(rhs),
                    BinOp::Div => {
                        if rhs == 0 {
                            ctx.record("interp_div_zero");
                            return Err(TargetError::runtime("zero-division", "Division by zero"));
                        }
                        floor_div(lhs, rhs)
                    }
                };
                result.ok_or_else(|| {
                    ctx.record("interp_overflow");
                    TargetError::runtime("overflow", format!("{lhs} {op:?} {rhs} overflows i64"))
                })
            }
        }
    }
}

/// Lexes, parses and runs `code`. Returns the printed values.
pub fn parse_and_run(code: &str, ctx: &mut ExecContext<'_>) -> Result<Vec<i64>, TargetError> {
    let tokens = tokenize(code, ctx)?;
    let program = Parser::new(&tokens).parse_program(ctx)?;
    let mut interpreter = Interpreter::new();
    interpreter.eval_program(&program, ctx)?;
    Ok(interpreter.printed)
}

/// The toy-language pipeline as a fuzz target.
///
/// Printed values are captured per execution instead of going to stdout.
#[derive(Debug, Default)]
pub struct ToyLang {
    output: Vec<i64>,
}

impl ToyLang {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values printed by the last successful execution.
    pub fn output(&self) -> &[i64] {
        &self.output
    }
}

impl Target<String> for ToyLang {
    fn name(&self) -> &str {
        "toy-lang"
    }

    fn execute(&mut self, input: &String, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        self.output.clear();
        self.output = parse_and_run(input, ctx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchfuzz_core::coverage::CoverageMap;

    fn run(code: &str) -> (Result<Vec<i64>, TargetError>, CoverageMap) {
        let mut scope = CoverageMap::new();
        let result = {
            let mut ctx = ExecContext::new(&mut scope, None);
            parse_and_run(code, &mut ctx)
        };
        (result, scope)
    }

    #[test]
    fn runs_seed_programs() {
        let (out, scope) = run("x=2;y=3;print(x+y);");
        assert_eq!(out.unwrap(), vec![5]);
        for tag in [
            "lexer_start",
            "lexer_ident",
            "lexer_equals",
            "lexer_number",
            "lexer_semi",
            "lexer_print_kw",
            "lexer_lparen",
            "lexer_plus",
            "lexer_rparen",
            "lexer_end",
            "parse_program_start",
            "parse_stmt_assign",
            "parse_stmt_print",
            "parse_program_end",
            "interp_assign",
            "interp_print",
            "interp_binop",
        ] {
            assert!(scope.contains(tag), "missing {tag}");
        }

        let (out, _) = run("print(1+2*3);");
        assert_eq!(out.unwrap(), vec![7]);
    }

    #[test]
    fn parentheses_and_precedence() {
        let (out, _) = run("print((1+2)*3); print(10-4-3);");
        assert_eq!(out.unwrap(), vec![9, 3]);
    }

    #[test]
    fn division_floors_toward_negative_infinity() {
        let (out, scope) = run("a=0-7; print(a/2); print(7/2); print(7/(0-2));");
        assert_eq!(out.unwrap(), vec![-4, 3, -4]);
        assert!(scope.contains("lexer_slash"));
        assert!(scope.contains("lexer_minus"));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let (out, scope) = run("x=0;print(1/x);");
        let err = out.unwrap_err();
        assert_eq!(err, TargetError::runtime("zero-division", "Division by zero"));
        assert!(scope.contains("interp_div_zero"));
        assert!(scope.contains("interp_print"));
    }

    #[test]
    fn undefined_variable() {
        let (out, scope) = run("print(y);");
        assert!(out.is_err());
        assert!(scope.contains("interp_undefined_var"));
    }

    #[test]
    fn unknown_symbol_stops_the_lexer() {
        let (out, scope) = run("x=1?");
        assert!(out.is_err());
        assert!(scope.contains("lexer_unknown_symbol"));
        assert!(!scope.contains("lexer_end"));
        assert!(!scope.contains("parse_program_start"));
    }

    #[test]
    fn parse_error_tags() {
        let cases = [
            ("x 1;", "parse_assign_no_equals"),
            ("x=1", "parse_assign_no_semi"),
            ("print 1;", "parse_print_no_lparen"),
            ("print(1;", "parse_print_no_rparen"),
            ("print(1)", "parse_print_no_semi"),
            ("x=(1+2;", "parse_factor_no_rparen"),
            ("x=;", "parse_factor_error"),
            ("1;", "parse_stmt_error"),
            (";", "parse_stmt_error"),
        ];
        for (code, tag) in cases {
            let (out, scope) = run(code);
            assert!(out.is_err(), "{code:?} should fail");
            assert!(scope.contains(tag), "{code:?} should record {tag}");
            assert!(!scope.contains("parse_program_end"));
        }
    }

    #[test]
    fn empty_program_is_valid() {
        let (out, scope) = run("  \n ");
        assert_eq!(out.unwrap(), Vec::<i64>::new());
        assert!(scope.contains("parse_program_end"));
    }

    #[test]
    fn overflow_is_a_runtime_error() {
        let (out, scope) = run("x=9223372036854775807;print(x+1);");
        assert!(out.is_err());
        assert!(scope.contains("interp_overflow"));

        let (out, scope) = run("print(99999999999999999999);");
        assert!(out.is_err());
        assert!(scope.contains("lexer_number_overflow"));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let code = format!("print({}1{});", "(".repeat(200), ")".repeat(200));
        let (out, scope) = run(&code);
        assert!(out.is_err());
        assert!(scope.contains("parse_too_deep"));

        let code = format!("print({}1{});", "(".repeat(100), ")".repeat(100));
        let (out, _) = run(&code);
        assert_eq!(out.unwrap(), vec![1]);
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let code = format!("print({});", vec!["1"; MAX_OPERATORS + 1].join("+"));
        let (out, _) = run(&code);
        assert_eq!(out.unwrap(), vec![MAX_OPERATORS as i64 + 1]);

        let code = format!("x={};", vec!["1"; 50_000].join("-"));
        let (out, scope) = run(&code);
        assert!(out.is_err());
        assert!(scope.contains("parse_too_deep"));
    }

    #[test]
    fn target_captures_output() {
        let mut target = ToyLang::new();
        let mut scope = CoverageMap::new();
        let mut ctx = ExecContext::new(&mut scope, None);
        target
            .execute(&"abc=123;print(abc);".to_string(), &mut ctx)
            .unwrap();
        assert_eq!(target.output(), &[123]);
        assert_eq!(target.name(), "toy-lang");
    }

    #[test]
    fn interpreter_keeps_variables() {
        let mut scope = CoverageMap::new();
        let mut ctx = ExecContext::new(&mut scope, None);
        let tokens = tokenize("x=4; y=x*x;", &mut ctx).unwrap();
        let program = Parser::new(&tokens).parse_program(&mut ctx).unwrap();
        assert_eq!(program.len(), 2);
        let mut interp = Interpreter::new();
        interp.eval_program(&program, &mut ctx).unwrap();
        assert_eq!(interp.variable("y"), Some(16));
        assert!(interp.printed().is_empty());
    }
}
