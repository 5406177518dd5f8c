//! Linear driver: fetch → annotate → assemble → encode → split → write.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::annotate::{document_count, Annotator};
use crate::config::PipelineConfig;
use crate::corpus::{assemble, read_source};
use crate::datafile::{write_token_file, TokenWidth};
use crate::encoder::EncoderAdapter;
use crate::error::{Result, TokprepError};
use crate::fetch::{ensure_present, Fetch};
use crate::metrics::{sample_rss_kb, ArtifactReport, PipelineReport, SourceReport, StageTimings};
use crate::split::split;

/// Annotated corpus held in memory after the annotation stage.
#[derive(Debug, Clone)]
pub struct AnnotatedCorpus {
    /// Concatenated annotated text of every source.
    pub text: String,
    /// Per-source summaries in merge order.
    pub sources: Vec<SourceReport>,
    /// Where the annotated text was persisted.
    pub annotated: ArtifactReport,
}

/// Runs one configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    annotator: Annotator,
}

impl Pipeline {
    /// Validates `config` and prepares the annotator.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let annotator = Annotator::new(config.annotation.clone())?;
        Ok(Self { config, annotator })
    }

    /// Returns the configuration the pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the document annotator.
    #[must_use]
    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Ensures every source is present locally, in configuration order.
    pub fn fetch_sources<F>(&self, fetcher: &F) -> Result<Vec<PathBuf>>
    where
        F: Fetch + ?Sized,
    {
        self.config
            .sources
            .iter()
            .map(|source| ensure_present(source, &self.config.output_dir, fetcher))
            .collect()
    }

    /// Fetches, reads and annotates every source, then writes the annotated corpus file.
    pub fn annotate<F>(&self, fetcher: &F) -> Result<AnnotatedCorpus>
    where
        F: Fetch + ?Sized,
    {
        let paths = self.fetch_sources(fetcher)?;
        self.annotate_paths(&paths)
    }

    /// Runs every stage and returns the run report.
    ///
    /// The encoder must recognise every marker the annotator emits.
    pub fn run<F>(&self, encoder: &EncoderAdapter, fetcher: &F) -> Result<PipelineReport>
    where
        F: Fetch + ?Sized,
    {
        self.check_encoder(encoder)?;
        let started = Instant::now();
        let mut timings = StageTimings::default();

        let stage = Instant::now();
        let paths = self.fetch_sources(fetcher)?;
        timings.fetch = stage.elapsed();

        let stage = Instant::now();
        let corpus = self.annotate_paths(&paths)?;
        timings.annotate = stage.elapsed();

        let stage = Instant::now();
        let spinner = self.spinner("encoding annotated corpus...")?;
        let tokens = encoder.encode(&corpus.text)?;
        drop(spinner);
        timings.encode = stage.elapsed();
        info!(
            "encoded {} bytes into {} tokens in {:.2?}",
            corpus.text.len(),
            tokens.len(),
            timings.encode
        );
        drop(corpus.text);

        let stage = Instant::now();
        let width = self.config.token_width.unwrap_or_else(|| {
            encoder
                .max_token_id()
                .map_or(TokenWidth::U16, TokenWidth::for_max_id)
        });
        let parts = split(&tokens, self.config.validation_tokens);
        if parts.train.is_empty() {
            warn!(
                "only {} tokens produced; validation budget of {} leaves the train split empty",
                tokens.len(),
                self.config.validation_tokens
            );
        }
        let validation_path = self.config.validation_path();
        let train_path = self.config.train_path();
        let validation = write_token_file(&validation_path, parts.validation, width)?;
        let train = write_token_file(&train_path, parts.train, width)?;
        timings.write = stage.elapsed();
        timings.total = started.elapsed();

        Ok(PipelineReport {
            sources: corpus.sources,
            annotated: corpus.annotated,
            total_tokens: tokens.len(),
            token_width: width,
            validation: ArtifactReport {
                path: validation_path,
                size: validation,
            },
            train: ArtifactReport {
                path: train_path,
                size: train,
            },
            timings,
            rss_kb: sample_rss_kb(),
        })
    }

    fn annotate_paths(&self, paths: &[PathBuf]) -> Result<AnnotatedCorpus> {
        let mut raw_texts = Vec::with_capacity(paths.len());
        let mut sources = Vec::with_capacity(paths.len());
        for (source, path) in self.config.sources.iter().zip(paths) {
            let raw = read_source(path)?;
            let documents = document_count(&raw);
            debug!(
                "source {} (namespace {}) holds {documents} documents",
                path.display(),
                source.namespace
            );
            sources.push(SourceReport {
                location: source.location.clone(),
                namespace: source.namespace,
                path: path.clone(),
                bytes: raw.len(),
                documents,
            });
            raw_texts.push(raw);
        }

        let text = assemble(
            &self.annotator,
            raw_texts
                .iter()
                .zip(&self.config.sources)
                .map(|(raw, source)| (raw.as_str(), source.namespace)),
        )?;

        let output_dir = &self.config.output_dir;
        if !output_dir.as_os_str().is_empty() {
            fs::create_dir_all(output_dir)
                .map_err(|err| TokprepError::io(err, Some(output_dir.clone())))?;
        }
        let annotated_path = self.config.annotated_path();
        info!("Writing {} ...", annotated_path.display());
        fs::write(&annotated_path, &text)
            .map_err(|err| TokprepError::io(err, Some(annotated_path.clone())))?;

        Ok(AnnotatedCorpus {
            annotated: ArtifactReport {
                path: annotated_path,
                size: text.len(),
            },
            text,
            sources,
        })
    }

    fn check_encoder(&self, encoder: &EncoderAdapter) -> Result<()> {
        for marker in self.annotator.special_tokens() {
            if encoder.token_id(&marker).is_none() {
                return Err(TokprepError::InvalidConfig(format!(
                    "encoder does not treat annotation marker {marker:?} as a special token"
                )));
            }
        }
        Ok(())
    }

    fn spinner(&self, message: &'static str) -> Result<Spinner> {
        if !self.config.show_progress {
            return Ok(Spinner(None));
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg} {elapsed}")
            .map_err(|err| TokprepError::Internal(err.to_string()))?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        Ok(Spinner(Some(pb)))
    }
}

/// Stage spinner, cleared when the stage ends on any path.
struct Spinner(Option<ProgressBar>);

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = self.0.take() {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, VocabularySource};
    use crate::datafile::read_token_file;
    use crate::encoder::test_support::{char_tokenizer, sparse_char_tokenizer};
    use std::path::Path;
    use tempfile::tempdir;

    struct OfflineFetcher;

    impl Fetch for OfflineFetcher {
        fn fetch(&self, url: &str, _destination: &Path) -> Result<()> {
            Err(TokprepError::Fetch {
                url: url.to_string(),
                message: "network disabled in tests".into(),
            })
        }
    }

    fn write_source(dir: &Path, name: &str, text: &str) -> SourceConfig {
        let path = dir.join(name);
        fs::write(&path, text).expect("write source");
        SourceConfig::new(path.to_string_lossy(), 0)
    }

    fn config(dir: &Path, sources: Vec<SourceConfig>, validation: usize) -> PipelineConfig {
        PipelineConfig::builder()
            .sources(sources)
            .output_dir(dir.join("out"))
            .dataset_name("sample")
            .validation_tokens(validation)
            .vocabulary(VocabularySource::File(dir.join("unused.json")))
            .show_progress(false)
            .build()
            .expect("config")
    }

    fn encoder(cfg: &PipelineConfig) -> EncoderAdapter {
        EncoderAdapter::from_tokenizer(char_tokenizer(), &cfg.special_tokens()).expect("encoder")
    }

    #[test]
    fn run_writes_all_artifacts_and_splits_tokens() {
        let dir = tempdir().expect("tempdir");
        let mut first = write_source(dir.path(), "a.txt", "to be\n\nor not");
        first.namespace = 1;
        let mut second = write_source(dir.path(), "b.txt", "the end\n\nfin");
        second.namespace = 2;
        let cfg = config(dir.path(), vec![first, second], 8);
        let encoder = encoder(&cfg);
        let pipeline = Pipeline::new(cfg.clone()).expect("pipeline");

        let report = pipeline.run(&encoder, &OfflineFetcher).expect("run");
        assert_eq!(report.documents(), 4);
        assert_eq!(report.token_width, TokenWidth::U16);
        assert_eq!(report.validation.size, 8);
        assert_eq!(
            report.validation.size + report.train.size,
            report.total_tokens
        );

        let annotated = fs::read_to_string(cfg.annotated_path()).expect("annotated");
        let expected = encoder.encode(&annotated).expect("encode");
        assert_eq!(expected.len(), report.total_tokens);

        let validation = read_token_file(cfg.validation_path()).expect("validation");
        let train = read_token_file(cfg.train_path()).expect("train");
        assert_eq!(validation.tokens, expected[..8]);
        assert_eq!(train.tokens, expected[8..]);
    }

    #[test]
    fn small_corpus_clamps_into_validation() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(dir.path(), "tiny.txt", "");
        let cfg = config(dir.path(), vec![source], 10_000);
        let pipeline = Pipeline::new(cfg.clone()).expect("pipeline");
        let report = pipeline.run(&encoder(&cfg), &OfflineFetcher).expect("run");
        assert_eq!(report.train.size, 0);
        assert_eq!(report.validation.size, report.total_tokens);
        assert_eq!(read_token_file(cfg.train_path()).expect("train").header.count, 0);
    }

    #[test]
    fn identical_runs_produce_identical_bytes() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(
            dir.path(),
            "raw.txt",
            "First Citizen:\nBefore we proceed\n\nAll:\nSpeak, speak.",
        );
        let cfg = config(dir.path(), vec![source], 5);
        let encoder = encoder(&cfg);
        let pipeline = Pipeline::new(cfg.clone()).expect("pipeline");

        pipeline.run(&encoder, &OfflineFetcher).expect("first run");
        let first = (
            fs::read(cfg.validation_path()).expect("val"),
            fs::read(cfg.train_path()).expect("train"),
        );
        pipeline.run(&encoder, &OfflineFetcher).expect("second run");
        let second = (
            fs::read(cfg.validation_path()).expect("val"),
            fs::read(cfg.train_path()).expect("train"),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn encoder_missing_markers_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(dir.path(), "raw.txt", "text");
        let cfg = config(dir.path(), vec![source], 5);
        let encoder = EncoderAdapter::from_tokenizer(char_tokenizer(), &[]).expect("encoder");
        let err = Pipeline::new(cfg)
            .expect("pipeline")
            .run(&encoder, &OfflineFetcher)
            .expect_err("markers unknown to encoder");
        assert!(matches!(err, TokprepError::InvalidConfig(_)));
    }

    #[test]
    fn extra_special_tokens_encode_atomically_in_sources() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(dir.path(), "raw.txt", "sneaky <|pad|> text");
        let cfg = PipelineConfig {
            extra_special_tokens: vec!["<|pad|>".into()],
            ..config(dir.path(), vec![source], 0)
        };
        let encoder = encoder(&cfg);
        let pad = encoder.token_id("<|pad|>").expect("pad id");
        let report = Pipeline::new(cfg.clone())
            .expect("pipeline")
            .run(&encoder, &OfflineFetcher)
            .expect("pad allowed");
        assert_eq!(report.validation.size, 0);

        let train = read_token_file(cfg.train_path()).expect("train");
        assert_eq!(train.tokens.iter().filter(|&&id| id == pad).count(), 1);
    }

    #[test]
    fn width_covers_sparse_vocabulary_ids() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(dir.path(), "raw.txt", "a~b");
        let cfg = config(dir.path(), vec![source], 0);
        let encoder =
            EncoderAdapter::from_tokenizer(sparse_char_tokenizer(70_000), &cfg.special_tokens())
                .expect("encoder");
        assert!(encoder.vocab_size() <= usize::from(u16::MAX));

        let report = Pipeline::new(cfg.clone())
            .expect("pipeline")
            .run(&encoder, &OfflineFetcher)
            .expect("run");
        assert_eq!(report.token_width, TokenWidth::U32);
        let train = read_token_file(cfg.train_path()).expect("train");
        assert!(train.tokens.contains(&70_000));
    }

    #[test]
    fn spinner_is_cleared_when_stage_fails() {
        fn failing_stage(pb: ProgressBar) -> Result<()> {
            let _spinner = Spinner(Some(pb));
            Err(TokprepError::Internal("encode failed".into()))
        }

        let pb = ProgressBar::hidden();
        pb.enable_steady_tick(Duration::from_millis(10));
        assert!(failing_stage(pb.clone()).is_err());
        assert!(pb.is_finished());
    }

    #[test]
    fn progress_enabled_run_completes() {
        let dir = tempdir().expect("tempdir");
        let source = write_source(dir.path(), "raw.txt", "to be\n\nor not");
        let cfg = PipelineConfig {
            show_progress: true,
            ..config(dir.path(), vec![source], 4)
        };
        let report = Pipeline::new(cfg.clone())
            .expect("pipeline")
            .run(&encoder(&cfg), &OfflineFetcher)
            .expect("run");
        assert_eq!(report.validation.size, 4);
    }

    #[test]
    fn remote_sources_sharing_a_file_name_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut cfg = config(
            dir.path(),
            vec![SourceConfig::new("https://a.example/one/input.txt", 1)],
            5,
        );
        cfg.sources
            .push(SourceConfig::new("https://b.example/two/input.txt", 2));
        let err = Pipeline::new(cfg).expect_err("colliding local paths");
        assert!(matches!(err, TokprepError::InvalidConfig(_)));
    }

    #[test]
    fn missing_remote_source_aborts_before_writing() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(
            dir.path(),
            vec![SourceConfig::new("https://example.com/input.txt", 1)],
            5,
        );
        let pipeline = Pipeline::new(cfg.clone()).expect("pipeline");
        let err = pipeline
            .run(&encoder(&cfg), &OfflineFetcher)
            .expect_err("offline");
        assert!(matches!(err, TokprepError::Fetch { .. }));
        assert!(!cfg.annotated_path().exists());
        assert!(!cfg.validation_path().exists());
    }
}
