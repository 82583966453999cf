use crate::coverage::BranchId;
use crate::input::Input;
use bincode::{
    self,
    config::{Configuration, Fixint, LittleEndian, NoLimit},
    de::Decode,
    enc::Encode,
    error::{DecodeError, EncodeError},
};
use log::{debug, error};
use rand::Rng;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Defines errors that can arise during corpus operations.
///
/// These errors cover issues from I/O problems when interacting with file systems
/// (for on-disk corpora) to logical errors like attempting to retrieve a non-existent input.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The requested input ID was not found within the corpus.
    #[error("Input ID {0} not found in corpus or index")]
    InputNotFound(usize),

    /// An operation could not be performed because the corpus is empty.
    #[error("Corpus is empty, cannot select an input")]
    CorpusIsEmpty,

    #[error("Corpus I/O error: {0}")]
    Io(String),

    #[error("Corpus serialization error: {0}")]
    Serialization(String),

    #[error("Corpus deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}
impl From<serde_json::Error> for CorpusError {
    fn from(err: serde_json::Error) -> Self {
        CorpusError::Deserialization(format!("JSON operation error: {}", err))
    }
}
impl From<EncodeError> for CorpusError {
    fn from(err: EncodeError) -> Self {
        CorpusError::Serialization(format!("Bincode encoding error: {}", err))
    }
}
impl From<DecodeError> for CorpusError {
    fn from(err: DecodeError) -> Self {
        CorpusError::Deserialization(format!("Bincode decoding error: {}", err))
    }
}

/// Where a corpus entry came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EntryOrigin {
    /// Supplied before the campaign started.
    Seed { source: String },
    /// Kept by a guided campaign because it reached new branches.
    Discovered { iteration: u64 },
}

/// Metadata stored next to every corpus entry.
///
/// Serialized to JSON as part of the on-disk corpus index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntryMetadata {
    pub origin: EntryOrigin,
    /// Branches this entry was the first to reach. Empty for seeds.
    pub new_branches: Vec<String>,
    /// MD5 hex digest of the input bytes.
    pub fingerprint: String,
}

impl CorpusEntryMetadata {
    pub fn seed<I: Input>(input: &I, source: impl Into<String>) -> Self {
        Self {
            origin: EntryOrigin::Seed {
                source: source.into(),
            },
            new_branches: Vec::new(),
            fingerprint: fingerprint(input.as_bytes()),
        }
    }

    pub fn discovered<I: Input>(input: &I, iteration: u64, new_branches: &[BranchId]) -> Self {
        Self {
            origin: EntryOrigin::Discovered { iteration },
            new_branches: new_branches.iter().map(|b| b.to_string()).collect(),
            fingerprint: fingerprint(input.as_bytes()),
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Defines the common interface for a collection of fuzzing inputs.
///
/// A corpus is append-only: entries keep their ID (insertion index) for the
/// lifetime of the corpus and there is no API to remove or reorder them.
/// Implementations must be `Send` and `Sync` so independent campaigns can run
/// on separate threads.
///
/// # Type Parameters
/// * `I`: The type of input stored in the corpus, which must implement the [`Input`] trait.
pub trait Corpus<I: Input>: Send + Sync {
    /// Appends an input and returns its ID.
    fn add(&mut self, input: I, metadata: CorpusEntryMetadata) -> Result<usize, CorpusError>;

    /// Retrieves an input and its metadata by ID. `None` if the ID is unknown.
    ///
    /// Takes `&mut self` so backends may cache what they load.
    fn get(&mut self, id: usize) -> Option<(&I, &CorpusEntryMetadata)>;

    /// Selects an entry uniformly at random. `None` if the corpus is empty.
    fn random_select(
        &mut self,
        rng: &mut dyn RngCore,
    ) -> Option<(usize, &I, &CorpusEntryMetadata)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads initial seed inputs from files or directories of files.
    ///
    /// Directories are not traversed recursively. The on-disk format of a
    /// seed file depends on the implementation. Returns the number loaded.
    fn load_initial_seeds(&mut self, seed_paths: &[PathBuf]) -> Result<usize, CorpusError>;
}

fn seed_files_in(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut files = Vec::new();
    for entry_result in fs::read_dir(dir)
        .map_err(|e| CorpusError::Io(format!("Failed to read seed directory {:?}: {}", dir, e)))?
    {
        let entry = entry_result.map_err(|e| {
            CorpusError::Io(format!("Error reading entry in seed directory {:?}: {}", dir, e))
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            if name == INDEX_FILENAME || name.starts_with('.') {
                continue;
            }
        }
        files.push(path);
    }
    // read_dir order is platform dependent; sort so seed IDs are reproducible.
    files.sort();
    Ok(files)
}

/// Keeps all entries in a `Vec`. The corpus campaigns use by default.
#[derive(Debug)]
pub struct InMemoryCorpus<I: Input> {
    entries: Vec<(I, CorpusEntryMetadata)>,
}

impl<I: Input> InMemoryCorpus<I> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A corpus holding `seeds` in order, tagged as seed entries.
    pub fn from_seeds(seeds: impl IntoIterator<Item = I>) -> Self {
        let entries = seeds
            .into_iter()
            .enumerate()
            .map(|(n, input)| {
                let meta = CorpusEntryMetadata::seed(&input, format!("seed #{n}"));
                (input, meta)
            })
            .collect();
        Self { entries }
    }

    /// Entries in insertion order.
    pub fn inputs(&self) -> impl Iterator<Item = &I> {
        self.entries.iter().map(|(input, _)| input)
    }
}

impl<I: Input> Default for InMemoryCorpus<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Input> Corpus<I> for InMemoryCorpus<I> {
    fn add(&mut self, input: I, metadata: CorpusEntryMetadata) -> Result<usize, CorpusError> {
        let id = self.entries.len();
        self.entries.push((input, metadata));
        Ok(id)
    }

    fn get(&mut self, id: usize) -> Option<(&I, &CorpusEntryMetadata)> {
        self.entries
            .get(id)
            .map(|tuple_ref| (&tuple_ref.0, &tuple_ref.1))
    }

    fn random_select(
        &mut self,
        rng: &mut dyn RngCore,
    ) -> Option<(usize, &I, &CorpusEntryMetadata)> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.entries.len());
        self.entries
            .get(index)
            .map(|(input_ref, metadata_ref)| (index, input_ref, metadata_ref))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Seed files are read as raw bytes and converted with [`Input::from_bytes`].
    fn load_initial_seeds(&mut self, seed_paths: &[PathBuf]) -> Result<usize, CorpusError> {
        let mut loaded_count = 0;
        for path_buf in seed_paths {
            let files = if path_buf.is_file() {
                vec![path_buf.clone()]
            } else if path_buf.is_dir() {
                seed_files_in(path_buf)?
            } else {
                return Err(CorpusError::Io(format!(
                    "Seed path {:?} is neither a file nor a directory",
                    path_buf
                )));
            };
            for file_path in files {
                let data_bytes = fs::read(&file_path).map_err(|e| {
                    CorpusError::Io(format!("Failed to read seed file {:?}: {}", file_path, e))
                })?;
                let input_obj = I::from_bytes(data_bytes);
                let metadata = CorpusEntryMetadata::seed(&input_obj, file_path.display().to_string());
                self.add(input_obj, metadata)?;
                loaded_count += 1;
            }
        }
        Ok(loaded_count)
    }
}

/// Default filename for the corpus index JSON file.
const INDEX_FILENAME: &str = "corpus_index.json";
/// File extension for individual bincode-serialized input files.
const INPUT_FILE_EXTENSION: &str = "fuzzinput";

/// Last input `OnDiskCorpus::get` loaded, kept to avoid re-reading it.
#[derive(Debug)]
struct OnDiskCorpusCache<I: Input> {
    id: usize,
    input: I,
    metadata: CorpusEntryMetadata,
}

/// A persistent corpus: one bincode file per input plus a JSON index.
///
/// Opening a directory that already holds a corpus restores it, so a guided
/// campaign can resume from an earlier campaign's discoveries.
pub struct OnDiskCorpus<I: Input + Encode + Decode<()>> {
    corpus_dir_path: PathBuf,
    index_file_path: PathBuf,
    /// Filename stem (e.g. "input_00000000") to metadata.
    filename_to_metadata_index: HashMap<String, CorpusEntryMetadata>,
    /// Corpus ID to filename stem.
    id_to_filename_stem: Vec<String>,
    last_accessed_cache: Option<OnDiskCorpusCache<I>>,
    bincode_config: Configuration<LittleEndian, Fixint, NoLimit>,
    _input_marker: PhantomData<I>,
}

impl<I: Input + Encode + Decode<()>> OnDiskCorpus<I> {
    fn current_bincode_config() -> Configuration<LittleEndian, Fixint, NoLimit> {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
    }

    /// Opens the corpus stored in `corpus_dir_path`, creating the directory
    /// and an empty index if needed.
    pub fn new(corpus_dir_path: PathBuf) -> Result<Self, CorpusError> {
        if !corpus_dir_path.exists() {
            fs::create_dir_all(&corpus_dir_path).map_err(|e| {
                CorpusError::Io(format!(
                    "Failed to create corpus directory at {:?}: {}",
                    corpus_dir_path, e
                ))
            })?;
        } else if !corpus_dir_path.is_dir() {
            return Err(CorpusError::Io(format!(
                "Corpus path {:?} exists but is not a directory",
                corpus_dir_path
            )));
        }

        let index_file_path = corpus_dir_path.join(INDEX_FILENAME);
        let mut corpus_instance = Self {
            corpus_dir_path,
            index_file_path,
            filename_to_metadata_index: HashMap::new(),
            id_to_filename_stem: Vec::new(),
            last_accessed_cache: None,
            bincode_config: Self::current_bincode_config(),
            _input_marker: PhantomData,
        };

        corpus_instance
            .load_index_from_disk()
            .map_err(|e| match e {
                CorpusError::Io(msg)
                | CorpusError::Deserialization(msg)
                | CorpusError::Serialization(msg) => CorpusError::Io(format!(
                    "Failed during corpus initialization (loading index from {:?}): {}",
                    corpus_instance.index_file_path, msg
                )),
                other_err => other_err,
            })?;

        if !corpus_instance.index_file_path.exists() {
            corpus_instance.save_index_to_disk()?;
        }
        debug!(
            "Opened on-disk corpus at {:?} with {} entries",
            corpus_instance.corpus_dir_path,
            corpus_instance.id_to_filename_stem.len()
        );
        Ok(corpus_instance)
    }

    pub fn dir(&self) -> &Path {
        &self.corpus_dir_path
    }

    /// `input_00000000` -> `<dir>/input_00000000.fuzzinput`.
    fn get_input_file_path_from_stem(&self, filename_stem: &str) -> PathBuf {
        self.corpus_dir_path
            .join(filename_stem)
            .with_extension(INPUT_FILE_EXTENSION)
    }

    fn save_index_to_disk(&self) -> Result<(), CorpusError> {
        let file = File::create(&self.index_file_path).map_err(|e| {
            CorpusError::Io(format!(
                "Failed to create or truncate index file {:?}: {}",
                self.index_file_path, e
            ))
        })?;
        let writer = BufWriter::new(file);
        let data_to_serialize = (&self.id_to_filename_stem, &self.filename_to_metadata_index);
        serde_json::to_writer_pretty(writer, &data_to_serialize).map_err(|e| {
            CorpusError::Serialization(format!(
                "Failed to serialize corpus index to JSON for {:?}: {}",
                self.index_file_path, e
            ))
        })?;
        Ok(())
    }

    /// A missing or empty index file means an empty corpus.
    fn load_index_from_disk(&mut self) -> Result<(), CorpusError> {
        self.id_to_filename_stem = Vec::new();
        self.filename_to_metadata_index = HashMap::new();
        if !self.index_file_path.is_file() {
            return Ok(());
        }
        let file = File::open(&self.index_file_path).map_err(|e| {
            CorpusError::Io(format!(
                "Failed to open index file {:?}: {}",
                self.index_file_path, e
            ))
        })?;
        if file.metadata()?.len() == 0 {
            return Ok(());
        }

        let reader = BufReader::new(file);
        let (id_to_stem, entries_index): (Vec<String>, HashMap<String, CorpusEntryMetadata>) =
            serde_json::from_reader(reader).map_err(|e| {
                CorpusError::Deserialization(format!(
                    "Failed to parse JSON from index file {:?}: {}. The file might be corrupted.",
                    self.index_file_path, e
                ))
            })?;
        if let Some(missing) = id_to_stem
            .iter()
            .find(|stem| !entries_index.contains_key(*stem))
        {
            return Err(CorpusError::Deserialization(format!(
                "Index lists {missing} but holds no metadata for it"
            )));
        }
        self.id_to_filename_stem = id_to_stem;
        self.filename_to_metadata_index = entries_index;
        Ok(())
    }

    fn load_input_from_file_path(&self, file_path: &Path) -> Result<I, CorpusError> {
        let file_content = fs::read(file_path).map_err(|e| {
            CorpusError::Io(format!("Failed to read input file {:?}: {}", file_path, e))
        })?;
        if file_content.is_empty() {
            return Err(CorpusError::Deserialization(format!(
                "Input file {:?} is empty, cannot deserialize.",
                file_path
            )));
        }
        let (decoded_input, _length): (I, usize) =
            bincode::decode_from_slice(&file_content, self.bincode_config).map_err(|e| {
                CorpusError::Deserialization(format!(
                    "Bincode deserialization failed for input file {:?}: {}",
                    file_path, e
                ))
            })?;
        Ok(decoded_input)
    }
}

impl<I: Input + Encode + Decode<()>> Corpus<I> for OnDiskCorpus<I> {
    fn add(&mut self, input: I, metadata: CorpusEntryMetadata) -> Result<usize, CorpusError> {
        let new_id = self.id_to_filename_stem.len();
        let filename_stem = format!("input_{:08}", new_id);
        let file_path = self.get_input_file_path_from_stem(&filename_stem);

        let bytes_to_write = bincode::encode_to_vec(&input, self.bincode_config)?;

        let mut file_writer = File::create(&file_path).map_err(|e| {
            CorpusError::Io(format!("Failed to create input file {:?}: {}", file_path, e))
        })?;
        file_writer.write_all(&bytes_to_write).map_err(|e| {
            CorpusError::Io(format!("Failed to write to input file {:?}: {}", file_path, e))
        })?;

        self.id_to_filename_stem.push(filename_stem.clone());
        self.filename_to_metadata_index
            .insert(filename_stem, metadata);

        self.save_index_to_disk()?;
        self.last_accessed_cache = None;
        debug!("Stored corpus entry {new_id} at {:?}", file_path);
        Ok(new_id)
    }

    fn get(&mut self, id: usize) -> Option<(&I, &CorpusEntryMetadata)> {
        let cache_hit = self
            .last_accessed_cache
            .as_ref()
            .is_some_and(|cached| cached.id == id);

        if !cache_hit {
            let filename_stem = self.id_to_filename_stem.get(id)?.clone();
            let file_path = self.get_input_file_path_from_stem(&filename_stem);
            let Some(metadata) = self.filename_to_metadata_index.get(&filename_stem).cloned()
            else {
                error!(
                    "OnDiskCorpus index inconsistency: no metadata for '{}' (ID {})",
                    filename_stem, id
                );
                return None;
            };
            match self.load_input_from_file_path(&file_path) {
                Ok(input) => {
                    self.last_accessed_cache = Some(OnDiskCorpusCache {
                        id,
                        input,
                        metadata,
                    });
                }
                Err(e) => {
                    error!("OnDiskCorpus failed to load input for ID {}: {}", id, e);
                    self.last_accessed_cache = None;
                    return None;
                }
            }
        }

        self.last_accessed_cache
            .as_ref()
            .map(|cache_ref| (&cache_ref.input, &cache_ref.metadata))
    }

    fn random_select(
        &mut self,
        rng: &mut dyn RngCore,
    ) -> Option<(usize, &I, &CorpusEntryMetadata)> {
        if self.id_to_filename_stem.is_empty() {
            self.last_accessed_cache = None;
            return None;
        }
        let id = rng.random_range(0..self.id_to_filename_stem.len());
        self.get(id)
            .map(|(input_ref, meta_ref)| (id, input_ref, meta_ref))
    }

    fn len(&self) -> usize {
        self.id_to_filename_stem.len()
    }

    /// Seed files are bincode-encoded inputs. The corpus's own index file and
    /// dotfiles are skipped.
    fn load_initial_seeds(&mut self, seed_paths: &[PathBuf]) -> Result<usize, CorpusError> {
        let mut loaded_count = 0;
        for path_buf in seed_paths {
            let files = if path_buf.is_file() {
                let is_own_index = path_buf
                    .file_name()
                    .is_some_and(|name| name == INDEX_FILENAME)
                    && path_buf
                        .parent()
                        .is_some_and(|p| p == self.corpus_dir_path);
                if is_own_index {
                    continue;
                }
                vec![path_buf.clone()]
            } else if path_buf.is_dir() {
                seed_files_in(path_buf)?
            } else {
                return Err(CorpusError::Io(format!(
                    "Seed path {:?} is neither a file nor a directory",
                    path_buf
                )));
            };
            for file_path in files {
                let input_obj = self.load_input_from_file_path(&file_path)?;
                let metadata = CorpusEntryMetadata::seed(&input_obj, file_path.display().to_string());
                self.add(input_obj, metadata)?;
                loaded_count += 1;
            }
        }
        Ok(loaded_count)
    }
}
