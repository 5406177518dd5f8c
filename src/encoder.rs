//! Encoder adapter over a pre-trained Hugging Face BPE vocabulary.

use rustc_hash::FxHashSet;
use tokenizers::tokenizer::AddedToken;
use tokenizers::Tokenizer;

use crate::config::VocabularySource;
use crate::error::{Result, TokprepError};
use crate::special_tokens::{self, TokenId};

/// Thin wrapper around `tokenizers::Tokenizer` that keeps the control strings atomic.
///
/// Every declared special string is registered as a special added token, so it maps to exactly
/// one id wherever it occurs verbatim. Encoding refuses input containing a special string that
/// the caller did not allow.
#[must_use]
#[derive(Debug, Clone)]
pub struct EncoderAdapter {
    inner: Tokenizer,
    special_tokens: Vec<String>,
    special_ids: FxHashSet<TokenId>,
}

impl EncoderAdapter {
    /// Loads the vocabulary and registers `special_tokens`.
    pub fn new(source: &VocabularySource, special_tokens: &[String]) -> Result<Self> {
        let tokenizer = load_vocabulary(source)?;
        Self::from_tokenizer(tokenizer, special_tokens)
    }

    /// Wraps an existing [`Tokenizer`], registering `special_tokens` as atomic added tokens.
    pub fn from_tokenizer(mut tokenizer: Tokenizer, special_tokens: &[String]) -> Result<Self> {
        let mut tokens = special_tokens.to_vec();
        special_tokens::dedup_in_place(&mut tokens);
        if tokens.iter().any(String::is_empty) {
            return Err(TokprepError::InvalidConfig(
                "special tokens must not be empty".into(),
            ));
        }

        let added = tokens
            .iter()
            .map(|token| AddedToken::from(token.clone(), true))
            .collect::<Vec<_>>();
        tokenizer.add_special_tokens(&added);

        let mut special_ids = FxHashSet::default();
        for token in &tokens {
            let id = tokenizer.token_to_id(token).ok_or_else(|| {
                TokprepError::Internal(format!("special token {token:?} was not registered"))
            })?;
            special_ids.insert(id);
        }
        Ok(Self {
            inner: tokenizer,
            special_tokens: tokens,
            special_ids,
        })
    }

    /// Provides immutable access to the underlying tokenizer.
    #[must_use]
    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }

    /// Returns the registered special strings in registration order.
    #[must_use]
    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Returns true when `id` belongs to a registered special string.
    #[must_use]
    pub fn is_special_id(&self, id: TokenId) -> bool {
        self.special_ids.contains(&id)
    }

    /// Returns the id a registered special string encodes to.
    #[must_use]
    pub fn token_id(&self, token: &str) -> Option<TokenId> {
        if self.special_tokens.iter().any(|special| special == token) {
            self.inner.token_to_id(token)
        } else {
            None
        }
    }

    /// Total vocabulary size including added tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Largest id the vocabulary can produce, added tokens included.
    #[must_use]
    pub fn max_token_id(&self) -> Option<TokenId> {
        self.inner.get_vocab(true).into_values().max()
    }

    /// Encodes `text`, allowing every registered special string.
    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let allowed = self
            .special_tokens
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        self.encode_with_allowed(text, &allowed)
    }

    /// Encodes `text`, failing if it contains a registered special string not listed in `allowed`.
    pub fn encode_with_allowed(&self, text: &str, allowed: &[&str]) -> Result<Vec<TokenId>> {
        let disallowed = self
            .special_tokens
            .iter()
            .map(String::as_str)
            .filter(|token| !allowed.contains(token));
        if let Some((offset, token)) = special_tokens::find_first(text, disallowed) {
            return Err(TokprepError::DisallowedSpecialToken {
                token: token.to_string(),
                offset,
            });
        }
        let encoding = self.inner.encode(text, false)?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decodes ids back into text, keeping special strings unless `skip_special_tokens` is set.
    pub fn decode(&self, ids: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        Ok(self.inner.decode(ids, skip_special_tokens)?)
    }
}

fn load_vocabulary(source: &VocabularySource) -> Result<Tokenizer> {
    match source {
        VocabularySource::File(path) => Tokenizer::from_file(path).map_err(|err| {
            TokprepError::Tokenizers(format!("failed to load {}: {err}", path.display()))
        }),
        VocabularySource::Pretrained(identifier) => Tokenizer::from_pretrained(identifier, None)
            .map_err(|err| {
                TokprepError::Tokenizers(format!("failed to load pretrained {identifier}: {err}"))
            }),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{char_tokenizer, sparse_char_tokenizer};
    use super::*;
    use crate::special_tokens::{default_tokens, END_OF_TEXT, REFERENCE_CLOSE, REFERENCE_OPEN};

    fn adapter() -> EncoderAdapter {
        EncoderAdapter::from_tokenizer(char_tokenizer(), &default_tokens()).expect("adapter")
    }

    #[test]
    fn special_tokens_encode_atomically() {
        let encoder = adapter();
        let eot = encoder.token_id(END_OF_TEXT).expect("eot id");
        let open = encoder.token_id(REFERENCE_OPEN).expect("open id");
        let close = encoder.token_id(REFERENCE_CLOSE).expect("close id");
        assert!(encoder.is_special_id(eot));

        let ids = encoder
            .encode("<|endoftext|><|br|>1-1<|er|> hi")
            .expect("encode");
        assert_eq!(ids[0], eot);
        assert_eq!(ids[1], open);
        assert_eq!(ids[5], close);
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn merges_apply_to_body_text() {
        let encoder = adapter();
        let ids = encoder.encode("the").expect("encode");
        assert_eq!(ids, vec![encoder.inner().token_to_id("the").expect("merged id")]);
        assert_eq!(encoder.decode(&ids, false).expect("decode"), "the");
    }

    #[test]
    fn disallowed_special_token_is_an_error() {
        let encoder = adapter();
        let err = encoder
            .encode_with_allowed("plain text <|br|> leaks", &[END_OF_TEXT])
            .expect_err("must reject");
        assert!(matches!(
            err,
            TokprepError::DisallowedSpecialToken { ref token, offset: 11 }
                if token == REFERENCE_OPEN
        ));
        assert!(encoder
            .encode_with_allowed("plain text", &[])
            .expect("no specials present")
            .iter()
            .all(|&id| !encoder.is_special_id(id)));
    }

    #[test]
    fn special_ids_extend_the_vocabulary() {
        let base = char_tokenizer().get_vocab_size(true);
        let encoder = adapter();
        assert_eq!(encoder.vocab_size(), base + 3);
        assert_eq!(encoder.special_tokens().len(), 3);
        assert_eq!(encoder.token_id("a"), None);
    }

    #[test]
    fn max_token_id_sees_sparse_ids() {
        assert_eq!(adapter().max_token_id(), Some(adapter().vocab_size() as TokenId - 1));

        let sparse =
            EncoderAdapter::from_tokenizer(sparse_char_tokenizer(70_000), &default_tokens())
                .expect("sparse adapter");
        assert_eq!(sparse.max_token_id(), Some(70_000));
        assert!(sparse.vocab_size() < 70_000);
    }

    #[test]
    fn empty_special_token_is_rejected() {
        let err = EncoderAdapter::from_tokenizer(char_tokenizer(), &[String::new()])
            .expect_err("empty token");
        assert!(matches!(err, TokprepError::InvalidConfig(_)));
    }
}
