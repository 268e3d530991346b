use tracing::debug;

/// A contiguous slice of the input list sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Sequential batch index (0-based)
    pub index: usize,

    /// Filenames in input order
    pub filenames: Vec<String>,
}

impl Batch {
    /// Creates a new batch.
    #[must_use]
    pub fn new(index: usize, filenames: Vec<String>) -> Self {
        Self { index, filenames }
    }

    /// Returns the number of filenames in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    /// Returns true if this batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

/// Splits a filename list into fixed-size batches.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    batch_size: usize,
}

impl Batcher {
    /// Creates a batcher. A size of zero is treated as one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Number of batches `total` filenames produce: `ceil(total / batch_size)`.
    #[must_use]
    pub const fn batch_count(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }

    /// Partitions `filenames` into contiguous batches, preserving order.
    ///
    /// Every batch but the last holds exactly `batch_size` names.
    ///
    /// # Examples
    ///
    /// ```
    /// use rename_forge::Batcher;
    ///
    /// let names = vec!["A.mkv".to_string(), "B.mkv".to_string(), "C.mkv".to_string()];
    /// let batches = Batcher::new(2).split(names);
    ///
    /// assert_eq!(batches.len(), 2);
    /// assert_eq!(batches[0].filenames, ["A.mkv", "B.mkv"]);
    /// assert_eq!(batches[1].filenames, ["C.mkv"]);
    /// ```
    #[must_use]
    pub fn split(&self, filenames: Vec<String>) -> Vec<Batch> {
        let total = filenames.len();
        let mut batches = Vec::with_capacity(self.batch_count(total));
        let mut rest = filenames.into_iter().peekable();

        while rest.peek().is_some() {
            let chunk: Vec<String> = rest.by_ref().take(self.batch_size).collect();
            batches.push(Batch::new(batches.len(), chunk));
        }

        debug!(
            "Split {} filenames into {} batches of up to {}",
            total,
            batches.len(),
            self.batch_size
        );

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("file_{i:04}.mkv")).collect()
    }

    #[test]
    fn test_split_example() {
        let input = vec!["A.mkv".to_string(), "B.mkv".to_string(), "C.mkv".to_string()];
        let batches = Batcher::new(2).split(input);

        assert_eq!(
            batches,
            vec![
                Batch::new(0, vec!["A.mkv".to_string(), "B.mkv".to_string()]),
                Batch::new(1, vec!["C.mkv".to_string()]),
            ]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(Batcher::new(10).split(Vec::new()).is_empty());
        assert_eq!(Batcher::new(10).batch_count(0), 0);
    }

    #[test]
    fn test_batch_count_and_reconstruction() {
        for total in [1, 2, 7, 149, 150, 151, 300, 451] {
            for size in [1, 2, 3, 150] {
                let input = names(total);
                let batcher = Batcher::new(size);
                let batches = batcher.split(input.clone());

                assert_eq!(batches.len(), total.div_ceil(size), "n={total} b={size}");
                assert_eq!(batches.len(), batcher.batch_count(total));

                let rebuilt: Vec<String> =
                    batches.iter().flat_map(|b| b.filenames.clone()).collect();
                assert_eq!(rebuilt, input);

                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    assert!(!batch.is_empty());
                    assert!(batch.len() <= size);
                }
            }
        }
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let batches = Batcher::new(0).split(names(3));
        assert_eq!(batches.len(), 3);
    }
}
