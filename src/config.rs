//! Configuration builders controlling annotation, encoding and artifact layout.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datafile::TokenWidth;
use crate::error::{Result, TokprepError};
use crate::special_tokens::{self, END_OF_TEXT, REFERENCE_CLOSE, REFERENCE_OPEN};

/// Number of leading tokens held out as the validation split.
pub const DEFAULT_VALIDATION_TOKENS: usize = 32_768;
/// Raw text of the Tiny Shakespeare corpus.
pub const TINY_SHAKESPEARE_URL: &str =
    "https://raw.githubusercontent.com/karpathy/char-rnn/master/data/tinyshakespeare/input.txt";
/// Vocabulary used when none is configured.
pub const DEFAULT_VOCABULARY: &str = "gpt2";

/// Where the pre-trained BPE vocabulary is loaded from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VocabularySource {
    /// A Hugging Face `tokenizer.json` on disk.
    File(PathBuf),
    /// A Hugging Face hub identifier such as `gpt2`.
    Pretrained(String),
}

impl Default for VocabularySource {
    fn default() -> Self {
        Self::Pretrained(DEFAULT_VOCABULARY.into())
    }
}

impl std::fmt::Display for VocabularySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Pretrained(name) => write!(f, "pretrained:{name}"),
        }
    }
}

/// Markers wrapped around each document reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerScheme {
    /// `open`, reference, `close`.
    Paired {
        /// Emitted before the reference.
        open: String,
        /// Emitted after the reference.
        close: String,
    },
    /// `marker`, reference.
    Single {
        /// Emitted before the reference.
        marker: String,
    },
}

impl Default for MarkerScheme {
    fn default() -> Self {
        Self::Paired {
            open: REFERENCE_OPEN.into(),
            close: REFERENCE_CLOSE.into(),
        }
    }
}

impl MarkerScheme {
    /// Returns every marker string the scheme emits.
    #[must_use]
    pub fn markers(&self) -> Vec<&str> {
        match self {
            Self::Paired { open, close } => vec![open.as_str(), close.as_str()],
            Self::Single { marker } => vec![marker.as_str()],
        }
    }
}

/// Controls how raw text is turned into annotated documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Marker emitted before every document and after the last one.
    pub end_of_text: String,
    /// Markers wrapped around the document reference.
    pub markers: MarkerScheme,
    /// Optional label prepended to every reference (`<prefix>-<namespace>-<n>`).
    pub reference_prefix: Option<String>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            end_of_text: END_OF_TEXT.into(),
            markers: MarkerScheme::default(),
            reference_prefix: None,
        }
    }
}

impl AnnotationConfig {
    /// Returns the control strings emitted by the annotator, end-of-text first.
    #[must_use]
    pub fn special_tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.end_of_text.clone()];
        tokens.extend(self.markers.markers().into_iter().map(str::to_string));
        tokens
    }

    /// Validates the invariants required for unambiguous annotation.
    pub fn validate(&self) -> Result<()> {
        let tokens = self.special_tokens();
        for token in &tokens {
            if token.is_empty() {
                return Err(TokprepError::InvalidConfig(
                    "annotation markers must not be empty".into(),
                ));
            }
            if token.contains("\n\n") {
                return Err(TokprepError::InvalidConfig(format!(
                    "annotation marker {token:?} must not contain a blank line"
                )));
            }
        }
        let unique: HashSet<&String> = tokens.iter().collect();
        if unique.len() != tokens.len() {
            return Err(TokprepError::InvalidConfig(
                "annotation markers must be distinct".into(),
            ));
        }
        if let Some(prefix) = &self.reference_prefix {
            if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
                return Err(TokprepError::InvalidConfig(format!(
                    "reference prefix {prefix:?} must be non-empty and contain no whitespace"
                )));
            }
        }
        Ok(())
    }
}

/// One raw input of the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// `http(s)://` URL or local filesystem path.
    pub location: String,
    /// Document-id namespace; must be unique across sources.
    pub namespace: u32,
    /// File name used inside the output directory when `location` is a URL.
    #[serde(default)]
    pub local_name: Option<String>,
}

impl SourceConfig {
    /// Creates a source without an explicit local file name.
    pub fn new(location: impl Into<String>, namespace: u32) -> Self {
        Self {
            location: location.into(),
            namespace,
            local_name: None,
        }
    }

    /// Sets the file name a remote source is stored under.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Returns true when the location has to be fetched over HTTP(S).
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }

    /// Resolves where the raw text lives on disk once fetched.
    pub fn local_path(&self, directory: &Path) -> Result<PathBuf> {
        if !self.is_remote() {
            return Ok(PathBuf::from(&self.location));
        }
        let name = match &self.local_name {
            Some(name) => name.as_str(),
            None => self
                .location
                .split(['?', '#'])
                .next()
                .and_then(|url| url.rsplit('/').next())
                .unwrap_or_default(),
        };
        if name.is_empty() {
            return Err(TokprepError::InvalidConfig(format!(
                "cannot derive a file name from {}; set local_name",
                self.location
            )));
        }
        Ok(directory.join(name))
    }
}

/// Full configuration of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw inputs, merged in order.
    pub sources: Vec<SourceConfig>,
    /// Directory receiving downloads and every artifact.
    pub output_dir: PathBuf,
    /// Stem used for artifact file names.
    pub dataset_name: String,
    /// Number of leading tokens written to the validation file.
    pub validation_tokens: usize,
    /// Pre-trained vocabulary to encode with.
    pub vocabulary: VocabularySource,
    /// Document annotation settings.
    pub annotation: AnnotationConfig,
    /// Control strings recognised by the encoder on top of the annotation markers.
    pub extra_special_tokens: Vec<String>,
    /// On-disk width; `None` picks the narrowest width covering the vocabulary.
    pub token_width: Option<TokenWidth>,
    /// Enables progress bars for the download and encode stages.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceConfig::new(TINY_SHAKESPEARE_URL, 1)
                .with_local_name("tiny_shakespeare.txt")],
            output_dir: PathBuf::from("tinyshakespeare"),
            dataset_name: "tiny_shakespeare".into(),
            validation_tokens: DEFAULT_VALIDATION_TOKENS,
            vocabulary: VocabularySource::default(),
            annotation: AnnotationConfig::default(),
            extra_special_tokens: Vec::new(),
            token_width: None,
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    /// Returns a builder initialised with [`PipelineConfig::default`].
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Validates the invariants required for a run.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(TokprepError::InvalidConfig(
                "at least one source is required".into(),
            ));
        }
        let mut namespaces = HashSet::with_capacity(self.sources.len());
        let mut local_paths = HashSet::with_capacity(self.sources.len());
        for source in &self.sources {
            if source.location.trim().is_empty() {
                return Err(TokprepError::InvalidConfig(
                    "source location must not be empty".into(),
                ));
            }
            if !namespaces.insert(source.namespace) {
                return Err(TokprepError::InvalidConfig(format!(
                    "namespace {} is used by more than one source",
                    source.namespace
                )));
            }
            let path = source.local_path(&self.output_dir)?;
            if !local_paths.insert(path.clone()) {
                return Err(TokprepError::InvalidConfig(format!(
                    "source {} resolves to {}, which another source already uses; set local_name",
                    source.location,
                    path.display()
                )));
            }
        }
        if self.dataset_name.is_empty() || self.dataset_name.contains(['/', '\\']) {
            return Err(TokprepError::InvalidConfig(format!(
                "dataset_name {:?} must be a non-empty file stem",
                self.dataset_name
            )));
        }
        if self.extra_special_tokens.iter().any(String::is_empty) {
            return Err(TokprepError::InvalidConfig(
                "extra special tokens must not be empty".into(),
            ));
        }
        self.annotation.validate()
    }

    /// Returns the full control-token inventory: annotation markers followed by extras.
    #[must_use]
    pub fn special_tokens(&self) -> Vec<String> {
        special_tokens::merge_tokens(
            &self.annotation.special_tokens(),
            &self.extra_special_tokens,
        )
    }

    /// Path of the human-readable annotated corpus.
    #[must_use]
    pub fn annotated_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_annotated.txt", self.dataset_name))
    }

    /// Path of the validation token file.
    #[must_use]
    pub fn validation_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_val.bin", self.dataset_name))
    }

    /// Path of the training token file.
    #[must_use]
    pub fn train_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_train.bin", self.dataset_name))
    }

    /// Loads a configuration from a JSON file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| TokprepError::io(err, Some(path.to_path_buf())))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|err| TokprepError::io(err, Some(path.to_path_buf())))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default, Clone)]
pub struct PipelineBuilder {
    cfg: PipelineConfig,
}

impl PipelineBuilder {
    /// Creates a builder with [`PipelineConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured sources.
    #[must_use]
    pub fn sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = SourceConfig>,
    {
        self.cfg.sources = sources.into_iter().collect();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.output_dir = dir.into();
        self
    }

    /// Sets the artifact file stem.
    #[must_use]
    pub fn dataset_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.dataset_name = name.into();
        self
    }

    /// Sets the validation token budget.
    #[must_use]
    pub fn validation_tokens(mut self, value: usize) -> Self {
        self.cfg.validation_tokens = value;
        self
    }

    /// Sets the vocabulary source.
    #[must_use]
    pub fn vocabulary(mut self, source: VocabularySource) -> Self {
        self.cfg.vocabulary = source;
        self
    }

    /// Replaces the annotation settings.
    #[must_use]
    pub fn annotation(mut self, annotation: AnnotationConfig) -> Self {
        self.cfg.annotation = annotation;
        self
    }

    /// Sets the label prepended to document references.
    #[must_use]
    pub fn reference_prefix(mut self, prefix: Option<String>) -> Self {
        self.cfg.annotation.reference_prefix = prefix;
        self
    }

    /// Overrides the additional special tokens registered with the encoder.
    #[must_use]
    pub fn extra_special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.extra_special_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Forces the on-disk token width.
    #[must_use]
    pub fn token_width(mut self, width: Option<TokenWidth>) -> Self {
        self.cfg.token_width = width;
        self
    }

    /// Enables or disables progress bars.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`PipelineConfig`].
    pub fn build(mut self) -> Result<PipelineConfig> {
        special_tokens::dedup_in_place(&mut self.cfg.extra_special_tokens);
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
