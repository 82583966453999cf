//! Systems under test for the branchfuzz engine.
//!
//! Each module implements [`branchfuzz_core::Target<String>`] and records the
//! branch tags of its decision points. [`registry`] pairs every target with the
//! mutator and seed corpus it is fuzzed with.

pub mod calculator;
pub mod classifier;
pub mod maze;
pub mod registry;
pub mod toy_lang;

pub use calculator::Calculator;
pub use classifier::Classifier;
pub use maze::{Maze, MazeGenerator, MazeTarget};
pub use registry::{TargetKind, TargetKit, UnknownTarget, kit};
pub use toy_lang::ToyLang;

/// Python's `string.printable`: digits, letters, punctuation, whitespace.
pub const PRINTABLE: &str = concat!(
    "0123456789",
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~",
    " \t\n\r\x0b\x0c",
);

/// Nesting depth past which the recursive-descent parsers give up.
pub const MAX_NESTING: usize = 128;

/// Binary operators one parse may build. Operator chains nest the syntax tree
/// one level per operator, so this bounds evaluation depth as well.
pub const MAX_OPERATORS: usize = 1024;
