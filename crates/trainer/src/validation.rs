//! Time-ordered validation splits

use crate::error::TrainError;
use std::ops::Range;

/// Split `len` time-ordered rows into leading train and trailing test ranges.
///
/// Both sides need at least two rows.
pub fn train_test_split(len: usize, test_ratio: f64) -> Result<(Range<usize>, Range<usize>), TrainError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(TrainError::InvalidConfig(format!(
            "test_ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }

    let test_len = ((len as f64) * test_ratio).ceil() as usize;
    let train_len = len.saturating_sub(test_len);
    if train_len < 2 || test_len < 2 {
        return Err(TrainError::InsufficientData {
            required: 4,
            actual: len,
        });
    }

    Ok((0..train_len, train_len..len))
}

/// Contiguous, non-shuffled folds covering `0..len`.
///
/// The first `len % k` folds take one extra row. Returns no folds when
/// `k < 2` or there are fewer rows than folds.
pub fn contiguous_folds(len: usize, k: usize) -> Vec<Range<usize>> {
    if k < 2 || len < k {
        return Vec::new();
    }

    let base = len / k;
    let extra = len % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;

    for i in 0..k {
        let size = base + usize::from(i < extra);
        folds.push(start..start + size);
        start += size;
    }

    folds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_order() {
        let (train, test) = train_test_split(100, 0.2).unwrap();
        assert_eq!(train, 0..80);
        assert_eq!(test, 80..100);
    }

    #[test]
    fn test_split_rounds_test_up() {
        let (train, test) = train_test_split(11, 0.2).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.end, test.start);
    }

    #[test]
    fn test_split_rejects_tiny_input() {
        assert!(matches!(
            train_test_split(3, 0.2),
            Err(TrainError::InsufficientData { actual: 3, .. })
        ));
        assert!(matches!(
            train_test_split(100, 1.5),
            Err(TrainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_folds_cover_range() {
        let folds = contiguous_folds(12, 5);
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0], 0..3);
        assert_eq!(folds[1], 3..6);
        assert_eq!(folds[4], 10..12);
        assert_eq!(folds.iter().map(|f| f.len()).sum::<usize>(), 12);
        assert!(contiguous_folds(3, 5).is_empty());
    }
}
