use gridmap_core::{GridMapError, GridMapResult};
use gridmap_mapping::PointRange;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Inclusive sub-range of points. `[-1, -1]` stands for "no such chunk".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub first: i64,
    pub last: i64,
}

impl ChunkRange {
    pub const INVALID: ChunkRange = ChunkRange { first: -1, last: -1 };

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Number of points; 0 for the invalid range and for reversed bounds.
    pub fn len(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.last
            .checked_sub(self.first)
            .and_then(|span| span.checked_add(1))
            .and_then(|points| usize::try_from(points).ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, point: i64) -> bool {
        self.is_valid() && self.first <= point && point <= self.last
    }

    pub fn point_range(&self) -> Option<PointRange> {
        if !self.is_valid() {
            return None;
        }
        let first = usize::try_from(self.first).ok()?;
        let last = usize::try_from(self.last).ok()?;
        PointRange::new(first, last).ok()
    }

    /// Chunks needed to cover this range with at most `size` points each.
    fn chunk_count(&self, size: i64) -> i64 {
        (self.last - self.first) / size + 1
    }
}

/// `first:last`, both inclusive.
impl FromStr for ChunkRange {
    type Err = GridMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GridMapError::Config(format!("invalid range '{s}', expected FIRST:LAST"));
        let (first, last) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            first: first.trim().parse().map_err(|_| invalid())?,
            last: last.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Splits disjoint point ranges into contiguous chunks of at most `size`
/// points. Chunks are numbered across ranges in point order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCutter {
    spans: Vec<ChunkRange>,
    size: i64,
}

impl ChunkCutter {
    pub fn new(first: i64, last: i64, size: i64) -> GridMapResult<Self> {
        Self::from_ranges(vec![ChunkRange { first, last }], size)
    }

    /// Ranges may come in any order but must not share a point.
    pub fn from_ranges(mut spans: Vec<ChunkRange>, size: i64) -> GridMapResult<Self> {
        if size < 1 {
            return Err(GridMapError::Config(format!("invalid chunk size {size}")));
        }
        if spans.is_empty() {
            return Err(GridMapError::Config("no point range to cut".to_string()));
        }
        for span in &spans {
            if span.first < 0 || span.first > span.last {
                return Err(GridMapError::Config(format!(
                    "invalid point range [{}, {}]",
                    span.first, span.last
                )));
            }
        }
        spans.sort_by_key(|span| span.first);
        for pair in spans.windows(2) {
            if pair[1].first <= pair[0].last {
                return Err(GridMapError::Config(format!(
                    "point range [{}, {}] overlaps [{}, {}]",
                    pair[0].first, pair[0].last, pair[1].first, pair[1].last
                )));
            }
        }
        Ok(Self { spans, size })
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn chunk_count(&self) -> usize {
        let total = self
            .spans
            .iter()
            .fold(0i64, |acc, span| acc.saturating_add(span.chunk_count(self.size)));
        usize::try_from(total).unwrap_or(usize::MAX)
    }

    pub fn chunk_range(&self, index: i64) -> ChunkRange {
        if index < 0 {
            return ChunkRange::INVALID;
        }
        let mut offset = index;
        for span in &self.spans {
            let count = span.chunk_count(self.size);
            if offset < count {
                // offset * size <= last - first
                let first = span.first + offset * self.size;
                return ChunkRange {
                    first,
                    last: first.saturating_add(self.size - 1).min(span.last),
                };
            }
            offset -= count;
        }
        ChunkRange::INVALID
    }

    /// Index of the chunk holding `point`, if any range covers it.
    pub fn chunk_of(&self, point: i64) -> Option<usize> {
        let mut preceding = 0i64;
        for span in &self.spans {
            if span.contains(point) {
                let index = preceding.saturating_add((point - span.first) / self.size);
                return usize::try_from(index).ok();
            }
            preceding = preceding.saturating_add(span.chunk_count(self.size));
        }
        None
    }

    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        self.spans.iter().flat_map(move |span| {
            (0..span.chunk_count(self.size)).map(move |k| {
                let first = span.first + k * self.size;
                ChunkRange {
                    first,
                    last: first.saturating_add(self.size - 1).min(span.last),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(first: i64, last: i64) -> ChunkRange {
        ChunkRange { first, last }
    }

    #[test]
    fn year_of_hours_in_92_point_chunks() {
        let cutter = ChunkCutter::new(0, 8735, 92).unwrap();
        assert_eq!(cutter.chunk_count(), 95);
        assert_eq!(cutter.chunk_range(0), range(0, 91));
        assert_eq!(cutter.chunk_range(94), range(8648, 8735));
        assert_eq!(cutter.chunk_range(95), ChunkRange::INVALID);
        assert_eq!(cutter.chunk_range(-1), ChunkRange::INVALID);
    }

    #[test]
    fn chunks_cover_the_range_exactly() {
        for first in 0..5 {
            for last in first..first + 20 {
                for size in 1..8 {
                    let cutter = ChunkCutter::new(first, last, size).unwrap();
                    let ranges: Vec<ChunkRange> = cutter.ranges().collect();
                    assert_eq!(ranges.len(), cutter.chunk_count());
                    assert_eq!(
                        ranges.iter().map(ChunkRange::len).sum::<usize>(),
                        (last - first + 1) as usize
                    );
                    assert_eq!(ranges[0].first, first);
                    assert_eq!(ranges[ranges.len() - 1].last, last);
                    for pair in ranges.windows(2) {
                        assert_eq!(pair[0].last + 1, pair[1].first);
                    }
                    assert!(ranges.iter().all(|r| r.len() as i64 <= size));
                    assert_eq!(cutter.chunk_range(cutter.chunk_count() as i64), ChunkRange::INVALID);
                    for (i, r) in ranges.iter().enumerate() {
                        assert_eq!(cutter.chunk_range(i as i64), *r);
                        assert_eq!(cutter.chunk_of(r.first), Some(i));
                        assert_eq!(cutter.chunk_of(r.last), Some(i));
                    }
                }
            }
        }
    }

    #[test]
    fn huge_chunk_size_does_not_overflow() {
        let cutter = ChunkCutter::new(0, 10, i64::MAX).unwrap();
        assert_eq!(cutter.chunk_count(), 1);
        assert_eq!(cutter.chunk_range(0), range(0, 10));
        assert_eq!(cutter.chunk_range(1), ChunkRange::INVALID);
        assert_eq!(cutter.chunk_of(10), Some(0));

        let cutter = ChunkCutter::new(5, i64::MAX, i64::MAX).unwrap();
        assert_eq!(cutter.chunk_count(), 1);
        assert_eq!(cutter.chunk_range(0), range(5, i64::MAX));
        assert_eq!(cutter.ranges().count(), 1);
    }

    #[test]
    fn disjoint_ranges_are_cut_separately() {
        let cutter =
            ChunkCutter::from_ranges(vec![range(20, 24), range(0, 9), range(10, 12)], 4).unwrap();
        let ranges: Vec<ChunkRange> = cutter.ranges().collect();
        assert_eq!(
            ranges,
            vec![
                range(0, 3),
                range(4, 7),
                range(8, 9),
                range(10, 12),
                range(20, 23),
                range(24, 24),
            ]
        );
        assert_eq!(cutter.chunk_count(), 6);
        assert_eq!(cutter.chunk_range(4), range(20, 23));
        assert_eq!(cutter.chunk_of(9), Some(2));
        assert_eq!(cutter.chunk_of(24), Some(5));
        assert_eq!(cutter.chunk_of(15), None);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let err = ChunkCutter::from_ranges(vec![range(0, 10), range(10, 20)], 5).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("overlaps"));
        assert!(ChunkCutter::from_ranges(vec![range(5, 30), range(0, 9)], 5).is_err());
        assert!(ChunkCutter::from_ranges(Vec::new(), 5).is_err());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(ChunkCutter::new(5, 4, 1).is_err());
        assert!(ChunkCutter::new(0, 4, 0).is_err());
        assert!(ChunkCutter::new(-1, 4, 2).is_err());
    }

    #[test]
    fn length_of_unchecked_ranges() {
        assert_eq!(range(3, 7).len(), 5);
        assert_eq!(range(7, 3).len(), 0);
        assert_eq!(range(i64::MIN, i64::MAX).len(), 0);
        assert_eq!(ChunkRange::INVALID.len(), 0);
        assert!(range(7, 3).is_empty());
    }

    #[test]
    fn chunk_range_parses_and_converts() {
        assert_eq!("3:7".parse::<ChunkRange>().unwrap(), range(3, 7));
        assert!("3-7".parse::<ChunkRange>().is_err());
        let points = range(3, 7).point_range().unwrap();
        assert_eq!((points.first, points.last), (3, 7));
        assert!(ChunkRange::INVALID.point_range().is_none());
    }
}
