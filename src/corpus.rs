//! Facilities for loading raw sources and assembling them into one annotated corpus.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::debug;

use crate::annotate::{Annotator, DOCUMENT_SEPARATOR};
use crate::error::{Result, TokprepError};

/// Reads a raw UTF-8 source into memory.
///
/// Invalid UTF-8 surfaces as an [`TokprepError::Io`] carrying the offending path.
pub fn read_source<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).map_err(|err| TokprepError::io(err, Some(path.to_path_buf())))?;
    debug!("read {} bytes from {}", text.len(), path.display());
    Ok(text)
}

/// Annotates every `(raw_text, namespace)` pair and joins the results with a blank line.
///
/// Sources keep their order. A single source yields exactly its annotated text; namespaces must be
/// distinct so that document references stay unique across the corpus.
pub fn assemble<'a, I>(annotator: &Annotator, sources: I) -> Result<String>
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut seen = HashSet::new();
    let mut corpus = String::new();
    for (idx, (raw, namespace)) in sources.into_iter().enumerate() {
        if !seen.insert(namespace) {
            return Err(TokprepError::InvalidConfig(format!(
                "namespace {namespace} appears in more than one source"
            )));
        }
        if idx > 0 {
            corpus.push_str(DOCUMENT_SEPARATOR);
        }
        corpus.extend(annotator.annotate(raw, namespace));
    }
    Ok(corpus)
}
