//! Corpus preparation for language-model training.
//!
//! The crate exposes both a library API and a `tokprep` command line interface. A run reads one
//! or more raw text sources, splits them into blank-line delimited documents, wraps every
//! document in control markers carrying a `<namespace>-<n>` reference, encodes the annotated
//! corpus with a pre-trained BPE vocabulary, and writes the first `validation_tokens` ids to a
//! validation file and the rest to a training file.
//!
//! ```no_run
//! use tokprep::{EncoderAdapter, HttpFetcher, Pipeline, PipelineConfig};
//!
//! # fn main() -> tokprep::Result<()> {
//! let config = PipelineConfig::builder()
//!     .validation_tokens(32_768)
//!     .show_progress(false)
//!     .build()?;
//! let encoder = EncoderAdapter::new(&config.vocabulary, &config.special_tokens())?;
//! let fetcher = HttpFetcher::new(false)?;
//! let report = Pipeline::new(config)?.run(&encoder, &fetcher)?;
//! println!("{} train tokens", report.train.size);
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library portion
//! only can disable default features to avoid the CLI dependencies.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod annotate;
pub mod config;
pub mod corpus;
pub mod datafile;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod pipeline;
pub mod special_tokens;
pub mod split;

pub use annotate::{AnnotatedDocument, Annotator};
pub use config::{
    AnnotationConfig, MarkerScheme, PipelineBuilder, PipelineConfig, SourceConfig,
    VocabularySource,
};
pub use datafile::{read_token_file, write_token_file, TokenFile, TokenFileHeader, TokenWidth};
pub use encoder::EncoderAdapter;
pub use error::{Result, TokprepError};
pub use fetch::{ensure_present, Fetch, HttpFetcher};
pub use metrics::{PipelineReport, StageTimings};
pub use pipeline::{AnnotatedCorpus, Pipeline};
pub use special_tokens::TokenId;
pub use split::{split, Split};
