use crate::input::{EditableInput, Input};
use rand::Rng;
use std::ops::{Range, RangeInclusive};
use thiserror::Error;

/// Functions the expression mutator wraps operands in.
pub const DEFAULT_FUNCTIONS: &[&str] = &["sin", "cos", "tan", "log", "exp", "sqrt", "abs"];
/// Binary operators the expression mutator splices with.
pub const DEFAULT_OPERATORS: &[&str] = &["+", "-", "*", "/", "**", "%"];

const DEFAULT_WRAP_PROBABILITY: f64 = 0.4;
const DEFAULT_LITERAL_BOUND: f64 = 20.0;
const VARIABLE_PROBABILITY: f64 = 0.3;
const FRESH_WRAP_PROBABILITY: f64 = 0.2;
const MAX_FRESH_STEPS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutatorError {
    #[error("Mutation alphabet must contain at least one unit")]
    EmptyAlphabet,
    #[error("Invalid generated length range {start}..={end}")]
    InvalidLengthRange { start: usize, end: usize },
}

/// A `Mutator` derives a new candidate input from an existing one.
///
/// `input_opt == None` asks for a freshly synthesized input instead; the
/// pure-random policy only ever calls it that way. Mutation cannot fail: a
/// seed the operator cannot work with (e.g. an empty one) is replaced by a
/// fresh minimal input.
///
/// # Type Parameters
/// * `I`: The type of `Input` this mutator operates on.
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<I: Input, R: Rng + ?Sized> {
    fn mutate(&mut self, input_opt: Option<&I>, rng: &mut R) -> I;
}

impl<I, R, M> Mutator<I, R> for Box<M>
where
    I: Input,
    R: Rng + ?Sized,
    M: Mutator<I, R> + ?Sized,
{
    fn mutate(&mut self, input_opt: Option<&I>, rng: &mut R) -> I {
        (**self).mutate(input_opt, rng)
    }
}

/// Synthesizes inputs from nothing.
pub trait Generator<I: Input, R: Rng + ?Sized> {
    fn generate(&mut self, rng: &mut R) -> I;
}

/// Draws a length from `len_range`, then that many units uniformly from the alphabet.
#[derive(Debug, Clone)]
pub struct UniformGenerator<I: EditableInput> {
    alphabet: Vec<I::Unit>,
    len_range: RangeInclusive<usize>,
}

impl<I: EditableInput> UniformGenerator<I> {
    pub fn new(alphabet: Vec<I::Unit>, len_range: RangeInclusive<usize>) -> Result<Self, MutatorError> {
        if alphabet.is_empty() {
            return Err(MutatorError::EmptyAlphabet);
        }
        if len_range.start() > len_range.end() {
            return Err(MutatorError::InvalidLengthRange {
                start: *len_range.start(),
                end: *len_range.end(),
            });
        }
        Ok(Self {
            alphabet,
            len_range,
        })
    }

    pub fn alphabet(&self) -> &[I::Unit] {
        &self.alphabet
    }
}

impl<I, R> Generator<I, R> for UniformGenerator<I>
where
    I: EditableInput,
    R: Rng + ?Sized,
{
    fn generate(&mut self, rng: &mut R) -> I {
        let len = rng.random_range(self.len_range.clone());
        let units = (0..len)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect();
        I::from_units(units)
    }
}

/// One local edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Replace,
}

impl EditKind {
    pub const ALL: [EditKind; 3] = [EditKind::Insert, EditKind::Delete, EditKind::Replace];
}

/// Unstructured mutator: inserts, deletes or replaces one unit at a random
/// position. Falls back to its generator when there is nothing to edit.
#[derive(Debug, Clone)]
pub struct EditMutator<I: EditableInput, G> {
    alphabet: Vec<I::Unit>,
    generator: G,
}

impl<I: EditableInput, G> EditMutator<I, G> {
    pub fn new(alphabet: Vec<I::Unit>, generator: G) -> Result<Self, MutatorError> {
        if alphabet.is_empty() {
            return Err(MutatorError::EmptyAlphabet);
        }
        Ok(Self {
            alphabet,
            generator,
        })
    }

    fn random_unit<R: Rng + ?Sized>(&self, rng: &mut R) -> I::Unit {
        self.alphabet[rng.random_range(0..self.alphabet.len())]
    }

    /// A fresh input from the generator, never empty.
    pub fn fresh<R>(&mut self, rng: &mut R) -> I
    where
        R: Rng + ?Sized,
        G: Generator<I, R>,
    {
        let generated = self.generator.generate(rng);
        if generated.is_empty() {
            I::from_units(vec![self.random_unit(rng)])
        } else {
            generated
        }
    }

    /// Applies one specific edit to `seed`.
    ///
    /// Insertion may happen at any position in `0..=len`, so appending is
    /// possible. An empty seed is replaced by [`EditMutator::fresh`].
    pub fn apply<R>(&mut self, seed: &I, kind: EditKind, rng: &mut R) -> I
    where
        R: Rng + ?Sized,
        G: Generator<I, R>,
    {
        let mut units = seed.to_units();
        if units.is_empty() {
            return self.fresh(rng);
        }
        match kind {
            EditKind::Insert => {
                let pos = rng.random_range(0..=units.len());
                let unit = self.random_unit(rng);
                units.insert(pos, unit);
            }
            EditKind::Delete => {
                let pos = rng.random_range(0..units.len());
                units.remove(pos);
            }
            EditKind::Replace => {
                let pos = rng.random_range(0..units.len());
                units[pos] = self.random_unit(rng);
            }
        }
        I::from_units(units)
    }
}

impl<I, R, G> Mutator<I, R> for EditMutator<I, G>
where
    I: EditableInput,
    R: Rng + ?Sized,
    G: Generator<I, R>,
{
    fn mutate(&mut self, input_opt: Option<&I>, rng: &mut R) -> I {
        match input_opt {
            Some(seed) if !seed.is_empty() => {
                let kind = EditKind::ALL[rng.random_range(0..EditKind::ALL.len())];
                self.apply(seed, kind, rng)
            }
            _ => self.fresh(rng),
        }
    }
}

/// Structured mutator for arithmetic expressions.
///
/// Either wraps the seed (or one of its operands) in a function call, or
/// splices it into `(seed OP literal)`. Fresh expressions are built from a
/// literal or the variable `x` by a few random wrap/extend steps.
#[derive(Debug, Clone)]
pub struct ExpressionMutator {
    functions: Vec<String>,
    operators: Vec<String>,
    wrap_probability: f64,
    literal_bound: f64,
}

impl Default for ExpressionMutator {
    fn default() -> Self {
        Self {
            functions: DEFAULT_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            operators: DEFAULT_OPERATORS.iter().map(|o| o.to_string()).collect(),
            wrap_probability: DEFAULT_WRAP_PROBABILITY,
            literal_bound: DEFAULT_LITERAL_BOUND,
        }
    }
}

impl ExpressionMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(mut self, functions: &[&str]) -> Result<Self, MutatorError> {
        if functions.is_empty() {
            return Err(MutatorError::EmptyAlphabet);
        }
        self.functions = functions.iter().map(|f| f.to_string()).collect();
        Ok(self)
    }

    pub fn with_wrap_probability(mut self, probability: f64) -> Self {
        self.wrap_probability = probability.clamp(0.0, 1.0);
        self
    }

    fn pick<'a, R: Rng + ?Sized>(choices: &'a [String], rng: &mut R) -> &'a str {
        &choices[rng.random_range(0..choices.len())]
    }

    fn literal<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let value: f64 = rng.random_range(-self.literal_bound..=self.literal_bound);
        format!("{value:.2}")
    }

    fn operand<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        if rng.random_bool(VARIABLE_PROBABILITY) {
            "x".to_string()
        } else {
            self.literal(rng)
        }
    }

    /// Wraps either the whole expression or one operand token in a call.
    pub fn wrap<R: Rng + ?Sized>(&self, expr: &str, rng: &mut R) -> String {
        let func = Self::pick(&self.functions, rng);
        let spans = operand_spans(expr);
        if spans.is_empty() || rng.random_bool(0.5) {
            return format!("{func}({expr})");
        }
        let span = spans[rng.random_range(0..spans.len())].clone();
        format!(
            "{}{func}({}){}",
            &expr[..span.start],
            &expr[span.clone()],
            &expr[span.end..]
        )
    }

    /// `(expr OP literal)`.
    pub fn splice<R: Rng + ?Sized>(&self, expr: &str, rng: &mut R) -> String {
        let op = Self::pick(&self.operators, rng);
        format!("({expr} {op} {})", self.literal(rng))
    }

    pub fn generate_expression<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let mut expr = self.operand(rng);
        let steps = rng.random_range(1..=MAX_FRESH_STEPS);
        for _ in 0..steps {
            if rng.random_bool(FRESH_WRAP_PROBABILITY) {
                expr = format!("{}({expr})", Self::pick(&self.functions, rng));
            } else {
                let op = Self::pick(&self.operators, rng);
                expr = format!("{expr} {op} {}", self.operand(rng));
            }
        }
        expr
    }
}

impl<R: Rng + ?Sized> Mutator<String, R> for ExpressionMutator {
    fn mutate(&mut self, input_opt: Option<&String>, rng: &mut R) -> String {
        match input_opt {
            Some(seed) if !seed.trim().is_empty() => {
                if rng.random_bool(self.wrap_probability) {
                    self.wrap(seed, rng)
                } else {
                    self.splice(seed, rng)
                }
            }
            _ => self.generate_expression(rng),
        }
    }
}

/// Byte ranges of number literals and variable names in `expr`.
///
/// Identifiers directly followed by `(` are function names and are skipped.
pub fn operand_spans(expr: &str) -> Vec<Range<usize>> {
    let bytes = expr.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_digit() || (b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            spans.push(start..i);
        } else if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            if bytes.get(i) != Some(&b'(') {
                spans.push(start..i);
            }
        } else {
            i += 1;
        }
    }
    spans
}
