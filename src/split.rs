//! Deterministic validation/train partitioning of a token sequence.

use crate::special_tokens::TokenId;

/// Borrowed view of a token sequence cut into a validation prefix and a training remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// The first `min(validation_size, len)` tokens.
    pub validation: &'a [TokenId],
    /// Everything after the validation prefix.
    pub train: &'a [TokenId],
}

/// Cuts `tokens` at `validation_size`, clamping at the sequence length.
#[must_use]
pub fn split(tokens: &[TokenId], validation_size: usize) -> Split<'_> {
    let (validation, train) = tokens.split_at(validation_size.min(tokens.len()));
    Split { validation, train }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_goes_to_validation() {
        let tokens: Vec<TokenId> = (0..10).collect();
        let parts = split(&tokens, 3);
        assert_eq!(parts.validation, &[0, 1, 2]);
        assert_eq!(parts.train, &[3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn budget_larger_than_sequence_clamps() {
        let tokens: Vec<TokenId> = (0..50).collect();
        let parts = split(&tokens, 100);
        assert_eq!(parts.validation.len(), 50);
        assert!(parts.train.is_empty());
    }

    #[test]
    fn lengths_always_add_up() {
        let tokens: Vec<TokenId> = (0..17).collect();
        for budget in [0, 1, 16, 17, 18, usize::MAX] {
            let parts = split(&tokens, budget);
            assert_eq!(parts.validation.len() + parts.train.len(), tokens.len());
        }
        let empty = split(&[], 5);
        assert!(empty.validation.is_empty() && empty.train.is_empty());
    }
}
