//! Vertical layout helpers shared by item stacks and port sides.
//!
//! Two policies exist. *Stacked* layout packs items from a top margin with a
//! fixed gap, so the stack height is a function of the item heights alone.
//! *Collision* layout keeps each item where it was put and only shifts
//! neighbours by the minimum needed to restore the gap. Both operate on a
//! slice of [`Slot`]s in display order.

/// Vertical extent of one laid-out item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot<K> {
    pub key: K,
    pub top: f64,
    pub height: f64,
}

impl<K> Slot<K> {
    pub fn new(key: K, top: f64, height: f64) -> Self {
        Self { key, top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Index at which an item with top coordinate `y` goes among `slots`.
///
/// Ties go after existing items, so re-inserting at an unchanged position
/// keeps the previous order.
pub fn insertion_index<K>(slots: &[Slot<K>], y: f64) -> usize {
    slots.iter().position(|s| s.top > y).unwrap_or(slots.len())
}

/// Pack `slots` downwards starting at `top`. Returns the bottom of the last
/// item, or `top` when empty.
pub fn stack_compact<K>(slots: &mut [Slot<K>], top: f64, spacing: f64) -> f64 {
    let mut y = top;
    let mut bottom = top;
    for slot in slots.iter_mut() {
        slot.top = y;
        bottom = slot.bottom();
        y = bottom + spacing;
    }
    bottom
}

/// Height of a stacked stack holding items of the given heights.
pub fn stacked_height(
    heights: impl IntoIterator<Item = f64>,
    top_margin: f64,
    bottom_margin: f64,
    spacing: f64,
) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for h in heights {
        total += h;
        count += 1;
    }
    let gaps = count.saturating_sub(1) as f64 * spacing;
    top_margin + total + gaps + bottom_margin
}

/// Insert `moved` among `slots` by its vertical position and resolve overlap
/// around it: items below are pushed down, items above are pulled up, and if
/// that lifts the first item above `min_y` everything is pushed back down.
/// Returns the final index of the moved item.
pub fn collision_place<K>(
    slots: &mut Vec<Slot<K>>,
    mut moved: Slot<K>,
    min_y: f64,
    spacing: f64,
) -> usize {
    moved.top = moved.top.max(min_y);
    let index = insertion_index(slots, moved.top);
    slots.insert(index, moved);

    for i in index + 1..slots.len() {
        let need = slots[i - 1].bottom() + spacing;
        if slots[i].top < need {
            slots[i].top = need;
        }
    }
    for i in (0..index).rev() {
        let limit = slots[i + 1].top - spacing;
        if slots[i].bottom() > limit {
            slots[i].top = limit - slots[i].height;
        }
    }
    if slots.first().is_some_and(|s| s.top < min_y) {
        collision_settle(slots, min_y, spacing);
    }
    index
}

/// Restore the collision invariant without moving anything that already
/// satisfies it: every item at or below `min_y` and at least `spacing` below
/// its predecessor. Items must already be in display order.
pub fn collision_settle<K>(slots: &mut [Slot<K>], min_y: f64, spacing: f64) {
    let mut floor = min_y;
    for slot in slots.iter_mut() {
        if slot.top < floor {
            slot.top = floor;
        }
        floor = slot.bottom() + spacing;
    }
}

/// Whether no two slots overlap once `spacing` is accounted for.
pub fn is_separated<K>(slots: &[Slot<K>], spacing: f64) -> bool {
    slots
        .windows(2)
        .all(|w| w[1].top >= w[0].bottom() + spacing - 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tops(slots: &[Slot<u32>]) -> Vec<f64> {
        slots.iter().map(|s| s.top).collect()
    }

    #[test]
    fn compact_packs_from_top() {
        let mut slots = vec![Slot::new(1, 500.0, 40.0), Slot::new(2, 0.0, 20.0)];
        let bottom = stack_compact(&mut slots, 80.0, 16.0);
        assert_eq!(tops(&slots), vec![80.0, 136.0]);
        assert_eq!(bottom, 156.0);
        assert_eq!(stacked_height([40.0, 20.0], 80.0, 16.0, 16.0), 172.0);
        assert_eq!(stacked_height(std::iter::empty(), 80.0, 16.0, 16.0), 96.0);
    }

    #[test]
    fn collision_place_pushes_below_and_pulls_above() {
        let mut slots = vec![Slot::new(1, 32.0, 8.0), Slot::new(2, 48.0, 8.0)];
        let idx = collision_place(&mut slots, Slot::new(3, 44.0, 8.0), 32.0, 8.0);
        assert_eq!(idx, 1);
        assert_eq!(slots.iter().map(|s| s.key).collect::<Vec<_>>(), vec![1, 3, 2]);
        // Pulling item 1 up would cross min_y, so everything settles downwards.
        assert_eq!(tops(&slots), vec![32.0, 48.0, 64.0]);
        assert!(is_separated(&slots, 8.0));
    }

    #[test]
    fn collision_place_leaves_free_neighbours_alone() {
        let mut slots = vec![Slot::new(1, 32.0, 8.0), Slot::new(2, 80.0, 8.0)];
        collision_place(&mut slots, Slot::new(3, 56.0, 8.0), 32.0, 8.0);
        assert_eq!(tops(&slots), vec![32.0, 56.0, 80.0]);
    }

    #[test]
    fn collision_place_pulls_items_above_up() {
        let mut slots = vec![Slot::new(1, 32.0, 8.0), Slot::new(2, 64.0, 8.0)];
        collision_place(&mut slots, Slot::new(3, 68.0, 8.0), 32.0, 8.0);
        // 3 goes after 2; 2 is pulled up to keep the gap.
        assert_eq!(tops(&slots), vec![32.0, 52.0, 68.0]);
    }

    #[test]
    fn settle_clamps_and_pushes_down() {
        let mut slots = vec![Slot::new(1, 0.0, 8.0), Slot::new(2, 36.0, 8.0)];
        collision_settle(&mut slots, 32.0, 8.0);
        assert_eq!(tops(&slots), vec![32.0, 48.0]);
    }
}
