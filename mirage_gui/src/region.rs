//! Disjoint-rectangle region algebra.
//!
//! A [`RegionList`] holds the dirty (or clean) area of the screen as a set
//! of pairwise non-overlapping rectangles. Redraw planning leans on three
//! operations: union a damaged rect in, subtract the area a window covers,
//! and clip to a bounding rect. The no-overlap invariant is what makes the
//! redraw loop blit every damaged pixel exactly once.

use thiserror::Error;

use crate::rect::Rect;

/// Node budget per list, standing in for the interpreter's fixed-size
/// rectangle stash. Exhausting it is a hard error: dropping a dirty rect
/// instead would leave stale pixels on screen.
pub const DEFAULT_NODE_BUDGET: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("region node budget of {budget} exhausted")]
    PoolExhausted { budget: usize },
}

/// An ordered set of pairwise-disjoint rectangles.
#[derive(Debug, Clone)]
pub struct RegionList {
    rects: Vec<Rect>,
    budget: usize,
}

impl Default for RegionList {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionList {
    pub fn new() -> Self {
        RegionList {
            rects: Vec::new(),
            budget: DEFAULT_NODE_BUDGET,
        }
    }

    pub fn with_budget(budget: usize) -> Self {
        RegionList {
            rects: Vec::new(),
            budget,
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut list = Self::new();
        if !rect.is_empty() {
            list.rects.push(rect);
        }
        list
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn as_slice(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Total covered area. Meaningful because members never overlap.
    pub fn covered_area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Union a dirty rect into the list, preserving disjointness.
    ///
    /// Candidates queue up and re-scan the list until they intersect
    /// nothing. A candidate wholly inside a member is discarded. A partial
    /// overlap splits both rects along the shared horizontal band: the
    /// off-band pieces re-queue, and the two same-height band pieces merge
    /// into one wider rect (their x-ranges overlap, so the union is exact).
    ///
    /// Degenerate rects are ignored. On pool exhaustion the list may be
    /// left partially updated; callers treat that as fatal.
    pub fn add(&mut self, rect: Rect) -> Result<(), RegionError> {
        if rect.is_empty() {
            return Ok(());
        }
        let mut queue = vec![rect];
        while let Some(candidate) = queue.pop() {
            let Some(index) = self.rects.iter().position(|m| m.intersects(&candidate)) else {
                self.rects.push(candidate);
                self.check_budget(queue.len())?;
                continue;
            };

            if self.rects[index].contains_rect(&candidate) {
                continue;
            }
            let member = self.rects.remove(index);

            let band_y1 = candidate.y1.max(member.y1);
            let band_y2 = candidate.y2.min(member.y2);
            // At most one of the pair sticks out above, one below.
            for r in [candidate, member] {
                if r.y1 < band_y1 {
                    queue.push(Rect::new(r.x1, r.y1, r.x2, band_y1 - 1));
                }
                if r.y2 > band_y2 {
                    queue.push(Rect::new(r.x1, band_y2 + 1, r.x2, r.y2));
                }
            }
            queue.push(Rect::new(
                candidate.x1.min(member.x1),
                band_y1,
                candidate.x2.max(member.x2),
                band_y2,
            ));
            self.check_budget(queue.len())?;
        }
        Ok(())
    }

    /// Subtract a rect from the covered area.
    ///
    /// Each intersecting member splits into up to four remainder slivers
    /// (top, bottom, left, right of the hole), re-inserted in y2 order;
    /// fully covered members vanish.
    pub fn remove(&mut self, rect: Rect) -> Result<(), RegionError> {
        if rect.is_empty() {
            return Ok(());
        }
        let mut index = 0;
        while index < self.rects.len() {
            let member = self.rects[index];
            let Some(hole) = member.intersection(&rect) else {
                index += 1;
                continue;
            };
            self.rects.remove(index);

            let mut slivers: Vec<Rect> = Vec::with_capacity(4);
            if member.y1 < hole.y1 {
                slivers.push(Rect::new(member.x1, member.y1, member.x2, hole.y1 - 1));
            }
            if member.y2 > hole.y2 {
                slivers.push(Rect::new(member.x1, hole.y2 + 1, member.x2, member.y2));
            }
            if member.x1 < hole.x1 {
                slivers.push(Rect::new(member.x1, hole.y1, hole.x1 - 1, hole.y2));
            }
            if member.x2 > hole.x2 {
                slivers.push(Rect::new(hole.x2 + 1, hole.y1, member.x2, hole.y2));
            }
            slivers.sort_by_key(|s| s.y2);
            for (offset, sliver) in slivers.iter().enumerate() {
                self.rects.insert(index + offset, *sliver);
            }
            index += slivers.len();
            self.check_budget(0)?;
        }
        Ok(())
    }

    /// Intersect every member with `bounds` in place, dropping the emptied.
    pub fn clip_to(&mut self, bounds: Rect) {
        self.rects.retain_mut(|m| match m.intersection(&bounds) {
            Some(clipped) => {
                *m = clipped;
                true
            }
            None => false,
        });
    }

    /// Does any member intersect `rect`? Short-circuits on the first hit.
    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|m| m.intersects(rect))
    }

    /// Invariant check: no two members overlap.
    pub fn is_disjoint(&self) -> bool {
        for (i, a) in self.rects.iter().enumerate() {
            for b in &self.rects[i + 1..] {
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }

    fn check_budget(&self, queued: usize) -> Result<(), RegionError> {
        if self.rects.len() + queued > self.budget {
            Err(RegionError::PoolExhausted {
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_with(rects: &[Rect]) -> RegionList {
        let mut list = RegionList::new();
        for r in rects {
            list.add(*r).expect("in budget");
        }
        assert!(list.is_disjoint());
        list
    }

    #[test]
    fn disjoint_adds_accumulate() {
        let list = region_with(&[Rect::new(0, 0, 9, 9), Rect::new(20, 0, 29, 9)]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.covered_area(), 200);
    }

    #[test]
    fn add_is_idempotent_on_covered_area() {
        let mut list = region_with(&[Rect::new(0, 0, 9, 9), Rect::new(5, 5, 14, 14)]);
        let area = list.covered_area();
        list.add(Rect::new(0, 0, 9, 9)).expect("in budget");
        list.add(Rect::new(5, 5, 14, 14)).expect("in budget");
        assert_eq!(list.covered_area(), area);
        assert!(list.is_disjoint());
    }

    #[test]
    fn overlapping_add_counts_shared_area_once() {
        // Two 10x10 squares overlapping in a 5x5 corner.
        let list = region_with(&[Rect::new(0, 0, 9, 9), Rect::new(5, 5, 14, 14)]);
        assert_eq!(list.covered_area(), 100 + 100 - 25);
    }

    #[test]
    fn contained_add_changes_nothing() {
        let mut list = region_with(&[Rect::new(0, 0, 19, 19)]);
        list.add(Rect::new(5, 5, 10, 10)).expect("in budget");
        assert_eq!(list.len(), 1);
        assert_eq!(list.covered_area(), 400);
    }

    #[test]
    fn cross_pattern_stays_disjoint() {
        let list = region_with(&[
            Rect::new(10, 0, 19, 29), // vertical bar
            Rect::new(0, 10, 29, 19), // horizontal bar
        ]);
        assert!(list.is_disjoint());
        assert_eq!(list.covered_area(), 300 + 300 - 100);
    }

    #[test]
    fn remove_punches_a_hole() {
        let mut list = region_with(&[Rect::new(0, 0, 9, 9)]);
        list.remove(Rect::new(3, 3, 6, 6)).expect("in budget");
        assert!(list.is_disjoint());
        assert_eq!(list.covered_area(), 100 - 16);
        assert!(!list.intersects_rect(&Rect::new(3, 3, 6, 6)));
        assert!(list.intersects_rect(&Rect::new(0, 0, 2, 2)));
    }

    #[test]
    fn remove_of_covering_rect_empties_the_list() {
        let mut list = region_with(&[Rect::new(2, 2, 5, 5), Rect::new(7, 2, 9, 5)]);
        list.remove(Rect::new(0, 0, 20, 20)).expect("in budget");
        assert!(list.is_empty());
    }

    #[test]
    fn add_then_remove_restores_the_complement() {
        let base = Rect::new(0, 0, 9, 9);
        let probe = Rect::new(5, 0, 14, 9);

        let mut list = region_with(&[base]);
        list.add(probe).expect("in budget");
        list.remove(probe).expect("in budget");
        assert!(list.is_disjoint());

        // Exactly the part of `base` outside `probe` survives.
        assert_eq!(list.covered_area(), 50);
        assert!(list.intersects_rect(&Rect::new(0, 0, 4, 9)));
        assert!(!list.intersects_rect(&probe));
    }

    #[test]
    fn degenerate_rects_are_ignored() {
        let mut list = region_with(&[Rect::new(0, 0, 9, 9)]);
        list.add(Rect::new(8, 8, 2, 2)).expect("in budget");
        list.remove(Rect::new(8, 8, 2, 2)).expect("in budget");
        assert_eq!(list.len(), 1);
        assert_eq!(list.covered_area(), 100);
    }

    #[test]
    fn clip_drops_outside_members_and_trims_the_rest() {
        let mut list = region_with(&[Rect::new(0, 0, 9, 9), Rect::new(30, 30, 39, 39)]);
        list.clip_to(Rect::new(5, 5, 20, 20));
        assert_eq!(list.len(), 1);
        assert_eq!(list.as_slice()[0], Rect::new(5, 5, 9, 9));
    }

    #[test]
    fn duplicate_preserves_order_and_content() {
        let list = region_with(&[Rect::new(0, 0, 9, 9), Rect::new(20, 0, 29, 9)]);
        let copy = list.clone();
        assert_eq!(copy.as_slice(), list.as_slice());
    }

    #[test]
    fn pool_exhaustion_is_reported_not_dropped() {
        let mut list = RegionList::with_budget(3);
        // Disjoint single-pixel rects use one node each.
        list.add(Rect::new(0, 0, 0, 0)).expect("in budget");
        list.add(Rect::new(2, 0, 2, 0)).expect("in budget");
        list.add(Rect::new(4, 0, 4, 0)).expect("in budget");
        let err = list.add(Rect::new(6, 0, 6, 0)).unwrap_err();
        assert_eq!(err, RegionError::PoolExhausted { budget: 3 });
    }

    #[test]
    fn heavy_overlap_sequence_keeps_the_invariant() {
        let mut list = RegionList::new();
        let rects = [
            Rect::new(0, 0, 15, 15),
            Rect::new(10, 10, 25, 25),
            Rect::new(5, 12, 30, 18),
            Rect::new(12, 0, 18, 30),
            Rect::new(0, 0, 30, 30),
            Rect::new(2, 2, 3, 3),
        ];
        for r in rects {
            list.add(r).expect("in budget");
            assert!(list.is_disjoint());
        }
        // The last-but-one add covers everything: area is exactly its area.
        assert_eq!(list.covered_area(), 31 * 31);

        for r in [Rect::new(0, 0, 30, 14), Rect::new(0, 15, 14, 30)] {
            list.remove(r).expect("in budget");
            assert!(list.is_disjoint());
        }
        assert_eq!(list.covered_area(), 16 * 16);
    }
}
