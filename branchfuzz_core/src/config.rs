use crate::campaign::FuzzPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which campaigns a run performs.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyChoice {
    PureRandom,
    CoverageGuided,
    /// Both policies, as independent campaigns, for side-by-side comparison.
    #[default]
    Compare,
}

impl PolicyChoice {
    pub fn policies(self) -> Vec<FuzzPolicy> {
        match self {
            PolicyChoice::PureRandom => vec![FuzzPolicy::PureRandom],
            PolicyChoice::CoverageGuided => vec![FuzzPolicy::CoverageGuided],
            PolicyChoice::Compare => vec![FuzzPolicy::PureRandom, FuzzPolicy::CoverageGuided],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    #[serde(default = "default_iterations")]
    pub max_iterations: u64,
    #[serde(default)]
    pub rng_seed: u64,
    #[serde(default)]
    pub policy: PolicyChoice,
}

pub fn default_iterations() -> u64 {
    500
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_iterations(),
            rng_seed: 0,
            policy: PolicyChoice::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TargetSettings {
    #[serde(default = "default_target_name")]
    pub name: String,
    /// Per-execution time bound. `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sentinel_branch")]
    pub sentinel_branch: String,
}

fn default_target_name() -> String {
    "toy-lang".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_sentinel_branch() -> String {
    "exception".to_string()
}

impl TargetSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            name: default_target_name(),
            timeout_ms: default_timeout_ms(),
            sentinel_branch: default_sentinel_branch(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CorpusType {
    #[default]
    InMemory,
    OnDisk,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorpusConfig {
    #[serde(default)]
    pub corpus_type: CorpusType,
    pub initial_seed_paths: Option<Vec<PathBuf>>,
    #[serde(default = "default_on_disk_path")]
    pub on_disk_path: PathBuf,
}

pub fn default_on_disk_path() -> PathBuf {
    PathBuf::from("./.branchfuzz_corpus")
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            corpus_type: CorpusType::default(),
            initial_seed_paths: None,
            on_disk_path: default_on_disk_path(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BranchfuzzConfig {
    #[serde(default)]
    pub fuzzer: Option<FuzzerSettings>,
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
}

impl BranchfuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: BranchfuzzConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn fuzzer(&self) -> FuzzerSettings {
        self.fuzzer.clone().unwrap_or_default()
    }

    pub fn corpus(&self) -> CorpusConfig {
        self.corpus.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: BranchfuzzConfig = toml::from_str("").unwrap();
        let fuzzer = config.fuzzer();
        assert_eq!(fuzzer.max_iterations, 500);
        assert_eq!(fuzzer.rng_seed, 0);
        assert_eq!(fuzzer.policy, PolicyChoice::Compare);
        assert_eq!(config.target.name, "toy-lang");
        assert_eq!(config.target.timeout(), Some(Duration::from_millis(1000)));
        assert_eq!(config.target.sentinel_branch, "exception");
        assert_eq!(config.corpus().corpus_type, CorpusType::InMemory);
        assert_eq!(config.corpus().on_disk_path, PathBuf::from("./.branchfuzz_corpus"));
    }

    #[test]
    fn full_file_parses() {
        let text = r#"
            [fuzzer]
            max-iterations = 300
            rng-seed = 7
            policy = "coverage-guided"

            [target]
            name = "maze"
            timeout-ms = 0
            sentinel-branch = "fuzz_exception"

            [corpus]
            corpus-type = "on-disk"
            initial-seed-paths = ["seeds/maze"]
            on-disk-path = "/tmp/maze_corpus"
        "#;
        let config: BranchfuzzConfig = toml::from_str(text).unwrap();
        let fuzzer = config.fuzzer();
        assert_eq!(fuzzer.max_iterations, 300);
        assert_eq!(fuzzer.rng_seed, 7);
        assert_eq!(fuzzer.policy.policies(), vec![FuzzPolicy::CoverageGuided]);
        assert_eq!(config.target.name, "maze");
        assert_eq!(config.target.timeout(), None);
        let corpus = config.corpus();
        assert_eq!(corpus.corpus_type, CorpusType::OnDisk);
        assert_eq!(
            corpus.initial_seed_paths,
            Some(vec![PathBuf::from("seeds/maze")])
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res = toml::from_str::<BranchfuzzConfig>("[fuzzer]\nthreads = 4\n");
        assert!(res.is_err());
    }

    #[test]
    fn load_from_missing_file_fails_with_path() {
        let err = BranchfuzzConfig::load_from_file(Path::new("/nonexistent/branchfuzz.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("branchfuzz.toml"));
    }
}
