use crate::domain::{Cost, Matrix};

/// Time-window data of a contiguous sub-path.
///
/// A segment knows the total lateness accumulated inside it (`time_warp`),
/// the feasible window `[tw_early, tw_late]` for starting it, its duration
/// when started inside that window, and the largest release time among its
/// clients. Two adjacent segments merge in O(1), which is what makes the
/// move evaluators constant-time: routes cache merged segments over every
/// prefix and suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindowSegment {
    pub idx_first: usize,
    pub idx_last: usize,
    pub duration: Cost,
    pub time_warp: Cost,
    pub tw_early: Cost,
    pub tw_late: Cost,
    pub release: Cost,
}

impl TimeWindowSegment {
    /// Lateness accumulated strictly within the segment.
    pub fn segment_time_warp(&self) -> Cost {
        self.time_warp
    }

    /// Segment lateness plus the lateness forced by waiting for the segment's
    /// goods to be released at the depot.
    pub fn total_time_warp(&self) -> Cost {
        self.segment_time_warp() + (self.release - self.tw_late).max(0)
    }

    /// Concatenates two adjacent segments over the arc connecting them.
    ///
    /// `delta` is the time spent in the first segment (net of its time warp)
    /// plus the connecting travel; starting the second segment before its
    /// window opens adds wait, finishing past its close adds time warp. The
    /// composition is associative, so cached prefix and suffix segments can
    /// be combined with ad-hoc middle parts in any grouping.
    pub fn merge(dist: &Matrix<Cost>, first: Self, second: Self) -> Self {
        let arc = dist.get(first.idx_last, second.idx_first);
        let delta = first.duration - first.time_warp + arc;

        let wait = (second.tw_early - delta - first.tw_late).max(0);
        let warp = (first.tw_early + delta - second.tw_late).max(0);

        Self {
            idx_first: first.idx_first,
            idx_last: second.idx_last,
            duration: first.duration + second.duration + arc + wait,
            time_warp: first.time_warp + second.time_warp + warp,
            tw_early: (second.tw_early - delta).max(first.tw_early) - wait,
            tw_late: (second.tw_late - delta).min(first.tw_late) + warp,
            release: first.release.max(second.release),
        }
    }

    /// Convenience fold over more than two segments.
    pub fn merge_all(dist: &Matrix<Cost>, segments: impl IntoIterator<Item = Self>) -> Self {
        let mut iter = segments.into_iter();
        let first = iter.next().unwrap_or_default();
        iter.fold(first, |acc, seg| Self::merge(dist, acc, seg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(
        idx: usize,
        duration: Cost,
        time_warp: Cost,
        tw_early: Cost,
        tw_late: Cost,
        release: Cost,
    ) -> TimeWindowSegment {
        TimeWindowSegment {
            idx_first: idx,
            idx_last: idx,
            duration,
            time_warp,
            tw_early,
            tw_late,
            release,
        }
    }

    #[test]
    fn segment_time_warp_is_stored_warp() {
        assert_eq!(seg(0, 0, 0, 0, 0, 0).segment_time_warp(), 0);
        assert_eq!(seg(0, 0, 5, 0, 0, 0).segment_time_warp(), 5);
    }

    #[test]
    fn total_time_warp_includes_release() {
        assert_eq!(seg(0, 0, 5, 0, 0, 0).total_time_warp(), 5);
        assert_eq!(seg(0, 0, 5, 0, 0, 5).total_time_warp(), 10);
    }

    #[test]
    fn merge_two() {
        let dist = Matrix::from_rows(vec![vec![1, 4], vec![1, 2]]);
        let tws1 = seg(0, 5, 0, 0, 5, 0);
        let mut tws2 = seg(1, 0, 5, 3, 6, 0);

        // The first stop has duration five and starts at time zero; driving
        // the connecting arc (four) means arriving at nine, which is three
        // past the second stop's closing time. Total warp is 5 + 3 = 8.
        let merged = TimeWindowSegment::merge(&dist, tws1, tws2);
        assert_eq!(merged.segment_time_warp(), 8);
        assert_eq!(merged.total_time_warp(), 8);

        // A release time of three on the second stop only moves the total.
        tws2.release = 3;
        let merged = TimeWindowSegment::merge(&dist, tws1, tws2);
        assert_eq!(merged.segment_time_warp(), 8);
        assert_eq!(merged.total_time_warp(), 11);
    }

    #[test]
    fn merge_is_associative() {
        let dist = Matrix::from_rows(vec![vec![1, 4, 1], vec![1, 2, 4], vec![1, 1, 1]]);
        let tws1 = seg(0, 5, 0, 0, 5, 0);
        let tws2 = seg(1, 0, 0, 3, 6, 0);
        let tws3 = seg(2, 0, 0, 2, 3, 2);

        let left = TimeWindowSegment::merge(&dist, TimeWindowSegment::merge(&dist, tws1, tws2), tws3);
        let right = TimeWindowSegment::merge(&dist, tws1, TimeWindowSegment::merge(&dist, tws2, tws3));
        let folded = TimeWindowSegment::merge_all(&dist, [tws1, tws2, tws3]);

        assert_eq!(left, right);
        assert_eq!(left, folded);

        // Three warp from 0 -> 1 and seven from 1 -> 2, plus release two.
        assert_eq!(folded.segment_time_warp(), 10);
        assert_eq!(folded.total_time_warp(), 12);
    }
}
