use std::ops::Range;

/// Split of `[0, ndata)` into contiguous, non-overlapping parts.
///
/// The part size is `ceil(ndata / parts)` and the number of parts is recomputed
/// downward so that every part but the last has exactly that size; the last part
/// absorbs the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    ndata: usize,
    part_size: usize,
    parts: usize,
}

impl Partition {
    /// Builds the split for `ndata` records and at most `requested_parts` parts.
    ///
    /// # Panics
    ///
    /// Panics if `ndata` or `requested_parts` is zero. The optimizer rejects both
    /// with an error before it builds a partition.
    pub fn new(ndata: usize, requested_parts: usize) -> Self {
        assert!(ndata > 0, "dataset must not be empty");
        assert!(requested_parts > 0, "at least one part is required");
        let part_size = ndata.div_ceil(requested_parts);
        let parts = ndata / part_size;
        Self {
            ndata,
            part_size,
            parts,
        }
    }

    pub fn ndata(&self) -> usize {
        self.ndata
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Nominal size of every part except possibly the last.
    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Index range of part `p`.
    ///
    /// # Panics
    ///
    /// Panics if `p >= self.parts()`.
    pub fn range(&self, p: usize) -> Range<usize> {
        assert!(p < self.parts, "part {p} out of range ({} parts)", self.parts);
        let start = p * self.part_size;
        if p + 1 == self.parts {
            start..self.ndata
        } else {
            start..start + self.part_size
        }
    }

    pub fn len_of(&self, p: usize) -> usize {
        self.range(p).len()
    }

    /// Number of data points covered by the first `k` parts.
    pub fn points_in_first(&self, k: usize) -> usize {
        match k {
            0 => 0,
            k if k >= self.parts => self.ndata,
            k => k * self.part_size,
        }
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.parts).map(move |p| self.range(p))
    }
}
