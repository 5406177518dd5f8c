//! Document annotation: splits raw text on blank lines and wraps every fragment in control markers.
//!
//! For each source the annotator produces
//!
//! ```text
//! <eot> [<open> ref <close> ' ' fragment '\n\n' <eot>]*
//! ```
//!
//! where `ref` is `<namespace>-<n>` (optionally prefixed) and `n` counts fragments from 1.
//! Fragments are produced by a plain delimiter split, so consecutive blank lines produce empty
//! documents that are still annotated and numbered.

use std::borrow::Cow;

use crate::config::{AnnotationConfig, MarkerScheme};
use crate::error::{Result, TokprepError};

/// Boundary between documents in raw text and after every annotated body.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Turns raw text into a lazily produced sequence of annotated fragments.
#[derive(Debug, Clone)]
pub struct Annotator {
    config: AnnotationConfig,
}

/// A document recovered from annotated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedDocument<'a> {
    /// Reference string written between the markers.
    pub reference: &'a str,
    /// Original fragment text.
    pub body: &'a str,
}

impl Annotator {
    /// Creates an annotator after validating the marker configuration.
    pub fn new(config: AnnotationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration the annotator was built with.
    #[must_use]
    pub fn config(&self) -> &AnnotationConfig {
        &self.config
    }

    /// Returns every control string the annotator may emit.
    #[must_use]
    pub fn special_tokens(&self) -> Vec<String> {
        self.config.special_tokens()
    }

    /// Formats the reference for the `sequence`-th document (1-based) of `namespace`.
    #[must_use]
    pub fn reference(&self, namespace: u32, sequence: usize) -> String {
        match &self.config.reference_prefix {
            Some(prefix) => format!("{prefix}-{namespace}-{sequence}"),
            None => format!("{namespace}-{sequence}"),
        }
    }

    /// Lazily yields the annotated pieces of `raw` in emission order.
    pub fn annotate<'a>(
        &'a self,
        raw: &'a str,
        namespace: u32,
    ) -> impl Iterator<Item = Cow<'a, str>> + 'a {
        let documents = raw
            .split(DOCUMENT_SEPARATOR)
            .enumerate()
            .flat_map(move |(idx, fragment)| self.document_pieces(namespace, idx + 1, fragment));
        std::iter::once(Cow::Borrowed(self.config.end_of_text.as_str())).chain(documents)
    }

    /// Annotates `raw` and concatenates the pieces.
    #[must_use]
    pub fn annotate_to_string(&self, raw: &str, namespace: u32) -> String {
        self.annotate(raw, namespace).collect()
    }

    /// Recovers the documents of annotated text, in order, by splitting on the reference markers.
    pub fn documents<'a>(&self, annotated: &'a str) -> Result<Vec<AnnotatedDocument<'a>>> {
        let trailer = format!("{DOCUMENT_SEPARATOR}{}", self.config.end_of_text);
        let (open, close) = match &self.config.markers {
            MarkerScheme::Paired { open, close } => (open.as_str(), Some(close.as_str())),
            MarkerScheme::Single { marker } => (marker.as_str(), None),
        };

        let mut documents = Vec::new();
        for piece in annotated.split(open).skip(1) {
            let (reference, rest) = match close {
                Some(close) => piece.split_once(close),
                None => piece.split_once(' '),
            }
            .ok_or_else(|| {
                TokprepError::Internal(format!("unterminated document reference in {piece:?}"))
            })?;
            let rest = match close {
                Some(_) => rest.strip_prefix(' ').unwrap_or(rest),
                None => rest,
            };
            let end = rest.find(&trailer).ok_or_else(|| {
                TokprepError::Internal(format!("document {reference} is missing its trailer"))
            })?;
            documents.push(AnnotatedDocument {
                reference,
                body: &rest[..end],
            });
        }
        Ok(documents)
    }

    fn document_pieces<'a>(
        &'a self,
        namespace: u32,
        sequence: usize,
        fragment: &'a str,
    ) -> Vec<Cow<'a, str>> {
        let reference = Cow::Owned(self.reference(namespace, sequence));
        let mut pieces = Vec::with_capacity(7);
        match &self.config.markers {
            MarkerScheme::Paired { open, close } => {
                pieces.push(Cow::Borrowed(open.as_str()));
                pieces.push(reference);
                pieces.push(Cow::Borrowed(close.as_str()));
            }
            MarkerScheme::Single { marker } => {
                pieces.push(Cow::Borrowed(marker.as_str()));
                pieces.push(reference);
            }
        }
        pieces.push(Cow::Borrowed(" "));
        pieces.push(Cow::Borrowed(fragment));
        pieces.push(Cow::Borrowed(DOCUMENT_SEPARATOR));
        pieces.push(Cow::Borrowed(self.config.end_of_text.as_str()));
        pieces
    }
}

/// Number of documents `raw` splits into.
#[must_use]
pub fn document_count(raw: &str) -> usize {
    raw.split(DOCUMENT_SEPARATOR).count()
}
