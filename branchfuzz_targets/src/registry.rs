use crate::maze::MazeGenerator;
use crate::{PRINTABLE, calculator, classifier, toy_lang};
use crate::{Calculator, Classifier, MazeTarget, ToyLang};
use branchfuzz_core::mutator::{
    EditMutator, ExpressionMutator, Generator, Mutator, MutatorError, UniformGenerator,
};
use branchfuzz_core::target::Target;
use log::debug;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of random mazes the maze corpus starts with.
const MAZE_SEEDS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown target '{0}', expected one of: toy-lang, maze, classifier, calculator")]
pub struct UnknownTarget(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    ToyLang,
    Maze,
    Classifier,
    Calculator,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [
        TargetKind::ToyLang,
        TargetKind::Maze,
        TargetKind::Classifier,
        TargetKind::Calculator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetKind::ToyLang => "toy-lang",
            TargetKind::Maze => "maze",
            TargetKind::Classifier => "classifier",
            TargetKind::Calculator => "calculator",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetKind {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        TargetKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| UnknownTarget(s.to_string()))
    }
}

pub type BoxedTarget = Box<dyn Target<String> + Send>;
pub type BoxedMutator = Box<dyn Mutator<String, ChaCha8Rng> + Send>;

/// A target together with the mutator and seed corpus it is fuzzed with.
pub struct TargetKit {
    pub kind: TargetKind,
    pub target: BoxedTarget,
    pub mutator: BoxedMutator,
    pub seeds: Vec<String>,
}

impl fmt::Debug for TargetKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetKit")
            .field("kind", &self.kind)
            .field("seeds", &self.seeds)
            .finish_non_exhaustive()
    }
}

fn text_mutator(alphabet: &str, max_len: usize) -> Result<BoxedMutator, MutatorError> {
    let units: Vec<char> = alphabet.chars().collect();
    let generator = UniformGenerator::<String>::new(units.clone(), 0..=max_len)?;
    Ok(Box::new(EditMutator::<String, _>::new(units, generator)?))
}

/// Builds the kit for `kind`. `rng_seed` drives any randomly generated seeds.
pub fn kit(kind: TargetKind, rng_seed: u64) -> Result<TargetKit, MutatorError> {
    let (target, mutator, seeds): (BoxedTarget, BoxedMutator, Vec<String>) = match kind {
        TargetKind::ToyLang => (
            Box::new(ToyLang::new()),
            text_mutator(toy_lang::ALPHABET, 50)?,
            toy_lang::SEEDS.iter().map(|s| s.to_string()).collect(),
        ),
        TargetKind::Maze => {
            let mut generator = MazeGenerator::new();
            let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
            let seeds = (0..MAZE_SEEDS)
                .map(|_| generator.generate(&mut rng))
                .collect();
            let mut alphabet: Vec<char> = PRINTABLE.chars().collect();
            alphabet.push('\n');
            let mutator = EditMutator::<String, _>::new(alphabet, generator)?;
            (Box::new(MazeTarget::new()), Box::new(mutator), seeds)
        }
        TargetKind::Classifier => (
            Box::new(Classifier::new()),
            text_mutator(PRINTABLE, 20)?,
            classifier::SEEDS.iter().map(|s| s.to_string()).collect(),
        ),
        TargetKind::Calculator => (
            Box::new(Calculator::new()),
            Box::new(ExpressionMutator::new()),
            calculator::SEEDS.iter().map(|s| s.to_string()).collect(),
        ),
    };
    debug!("Built {kind} kit with {} seed(s)", seeds.len());
    Ok(TargetKit {
        kind,
        target,
        mutator,
        seeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchfuzz_core::campaign::{FuzzPolicy, run_campaign};
    use branchfuzz_core::coverage::{BranchId, CoverageMap};
    use branchfuzz_core::executor::{ExecutionStatus, Executor, InProcessExecutor};
    use branchfuzz_core::mutator::EditKind;
    use branchfuzz_core::target::{ExecContext, TargetError, from_fn};

    fn campaign(kind: TargetKind, policy: FuzzPolicy, iterations: u64, seed: u64) -> CoverageMap {
        let kit = kit(kind, seed).unwrap();
        let executor = InProcessExecutor::new(kit.target);
        run_campaign(executor, kit.mutator, policy, iterations, kit.seeds, seed)
            .unwrap()
            .coverage
    }

    #[test]
    fn target_kinds_parse_by_name() {
        for kind in TargetKind::ALL {
            assert_eq!(kind.name().parse::<TargetKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.name());
        }
        assert_eq!("Toy_Lang".parse::<TargetKind>().unwrap(), TargetKind::ToyLang);
        let err = "json".parse::<TargetKind>().unwrap_err();
        assert_eq!(err, UnknownTarget("json".to_string()));
    }

    #[test]
    fn kits_carry_their_seed_corpus() {
        let toy = kit(TargetKind::ToyLang, 0).unwrap();
        assert_eq!(toy.seeds[0], "x=1;print(x);");
        assert_eq!(toy.target.name(), "toy-lang");

        let maze = kit(TargetKind::Maze, 0).unwrap();
        assert_eq!(maze.seeds.len(), MAZE_SEEDS);
        assert_eq!(maze.seeds, kit(TargetKind::Maze, 0).unwrap().seeds);

        assert_eq!(kit(TargetKind::Classifier, 0).unwrap().seeds.len(), 7);
        assert_eq!(kit(TargetKind::Calculator, 0).unwrap().seeds.len(), 9);
    }

    #[test]
    fn toy_lang_guided_campaign_covers_the_core_pipeline() {
        let kit = kit(TargetKind::ToyLang, 11).unwrap();
        let executor = InProcessExecutor::new(kit.target);
        let report = run_campaign(
            executor,
            kit.mutator,
            FuzzPolicy::CoverageGuided,
            300,
            vec!["x=1;print(x);".to_string()],
            11,
        )
        .unwrap();
        for tag in [
            "lexer_start",
            "lexer_ident",
            "lexer_equals",
            "lexer_number",
            "lexer_semi",
            "parse_program_start",
            "parse_stmt_assign",
            "interp_assign",
        ] {
            assert!(report.coverage.contains(tag), "missing {tag}");
        }
        assert_eq!(report.history.len(), 300);
        assert!(report.history.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sample_maze_reaches_parse_and_path_branches() {
        let mut kit = kit(TargetKind::Maze, 0).unwrap();
        let mut scope = CoverageMap::new();
        let mut ctx = ExecContext::new(&mut scope, None);
        kit.target
            .execute(&"S.#.\n.#F.\n....\n".to_string(), &mut ctx)
            .unwrap();
        assert!(scope.contains("maze_parsed"));
        assert!(scope.contains("path_found"));
    }

    #[test]
    fn empty_seed_mutation_is_never_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let empty = String::new();
        for kind in TargetKind::ALL {
            let mut kit = kit(kind, 9).unwrap();
            for _ in 0..20 {
                let out = kit.mutator.mutate(Some(&empty), &mut rng);
                assert!(!out.is_empty(), "{kind} produced an empty candidate");
                let mut scope = CoverageMap::new();
                let mut ctx = ExecContext::new(&mut scope, None);
                let _ = kit.target.execute(&out, &mut ctx);
            }
        }

        let alphabet: Vec<char> = toy_lang::ALPHABET.chars().collect();
        let generator = UniformGenerator::<String>::new(alphabet.clone(), 0..=0).unwrap();
        let mut edits = EditMutator::<String, _>::new(alphabet, generator).unwrap();
        for kind in EditKind::ALL {
            let out = edits.apply(&empty, kind, &mut rng);
            assert_eq!(out.chars().count(), 1, "{kind:?} on an empty seed");
        }
    }

    #[test]
    fn guided_is_not_worse_than_random() {
        for kind in [TargetKind::ToyLang, TargetKind::Classifier] {
            let random = campaign(kind, FuzzPolicy::PureRandom, 1000, 5);
            let guided = campaign(kind, FuzzPolicy::CoverageGuided, 1000, 5);
            assert!(
                guided.len() >= random.len(),
                "{kind}: guided {} < random {}",
                guided.len(),
                random.len()
            );
        }
    }

    #[test]
    fn flat_operator_chains_become_the_sentinel() {
        let chains = [
            (TargetKind::ToyLang, format!("x={};", vec!["1"; 50_000].join("+"))),
            (TargetKind::Calculator, vec!["1"; 50_000].join("+")),
        ];
        for (kind, chain) in chains {
            let kit = kit(kind, 3).unwrap();
            let mut executor = InProcessExecutor::new(kit.target);
            let mut scope = CoverageMap::new();
            let status = executor.execute_sync(&chain, &mut scope);
            assert!(
                matches!(status, ExecutionStatus::RuntimeError(_)),
                "{kind}: {status:?}"
            );
            assert!(scope.contains("exception"), "{kind}");
        }
    }

    #[test]
    fn always_failing_target_only_covers_the_sentinel() {
        let target = from_fn("always-fails", |_: &String, _ctx: &mut ExecContext<'_>| {
            Err(TargetError::runtime("boom", "always fails"))
        });
        let kit = kit(TargetKind::Classifier, 1).unwrap();
        let report = run_campaign(
            InProcessExecutor::new(target),
            kit.mutator,
            FuzzPolicy::CoverageGuided,
            200,
            kit.seeds,
            1,
        )
        .unwrap();
        assert_eq!(report.history.len(), 200);
        let covered: Vec<&BranchId> = report.coverage.iter().collect();
        assert_eq!(covered, vec![&BranchId::from("exception")]);
    }
}
