use gpui::{Pixels, ScrollHandle, point, px};

/// Distance from the tail within which follow mode resumes.
const AUTO_FOLLOW_RESUME_THRESHOLD: Pixels = px(24.);
/// Ignores floating-point scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 1.0;

/// Keeps the transcript pinned to its newest message unless the user scrolls up.
pub struct ScrollManager {
    scroll_handle: ScrollHandle,
    pending_scroll_to_bottom: bool,
    follow_bottom: bool,
    last_scroll_offset: Pixels,
    last_max_offset: Pixels,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            scroll_handle: ScrollHandle::new(),
            pending_scroll_to_bottom: false,
            follow_bottom: true,
            last_scroll_offset: Pixels::ZERO,
            last_max_offset: Pixels::ZERO,
        }
    }

    pub fn handle(&self) -> &ScrollHandle {
        &self.scroll_handle
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.follow_bottom = true;
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        if self.follow_bottom || was_near_bottom(self.last_scroll_offset, self.last_max_offset) {
            self.pending_scroll_to_bottom = true;
        }
    }

    /// Reads the handle after layout and decides whether the user left the tail.
    pub fn update_follow_state(&mut self) {
        let offset = self.scroll_handle.offset().y;
        let max_offset = self.scroll_handle.max_offset().height;
        let offset_delta = f32::from(offset) - f32::from(self.last_scroll_offset);
        let max_delta = (f32::from(max_offset) - f32::from(self.last_max_offset)).abs();
        let content_size_changed = max_delta > SCROLL_DELTA_EPSILON;
        let user_scrolled_up = offset_delta > SCROLL_DELTA_EPSILON && !content_size_changed;
        let user_scrolled_down = offset_delta < -SCROLL_DELTA_EPSILON && !content_size_changed;

        if self.pending_scroll_to_bottom
            || (content_size_changed
                && was_near_bottom(self.last_scroll_offset, self.last_max_offset))
        {
            self.follow_bottom = true;
        } else if self.follow_bottom {
            if user_scrolled_up {
                self.follow_bottom = false;
            }
        } else if user_scrolled_down && was_near_bottom(offset, max_offset) {
            self.follow_bottom = true;
        }

        self.last_scroll_offset = offset;
        self.last_max_offset = max_offset;
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        let should_scroll = self.follow_bottom || self.pending_scroll_to_bottom;

        if should_scroll {
            let max_offset = self.scroll_handle.max_offset().height;
            let current_x = self.scroll_handle.offset().x;
            let target_y = if max_offset > Pixels::ZERO {
                -max_offset
            } else {
                Pixels::ZERO
            };
            self.scroll_handle.set_offset(point(current_x, target_y));
        }

        self.pending_scroll_to_bottom = false;
        should_scroll
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

/// GPUI scrolls with negative y offsets, so `offset + max` approaches zero at the tail.
fn was_near_bottom(offset: Pixels, max_offset: Pixels) -> bool {
    if max_offset <= Pixels::ZERO {
        return true;
    }

    (offset + max_offset).abs() <= AUTO_FOLLOW_RESUME_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_counts_as_tail() {
        assert!(was_near_bottom(Pixels::ZERO, Pixels::ZERO));
    }

    #[test]
    fn tail_threshold_is_respected() {
        assert!(was_near_bottom(px(-290.), px(300.)));
        assert!(!was_near_bottom(px(-100.), px(300.)));
    }

    #[test]
    fn new_manager_follows_the_tail() {
        let mut manager = ScrollManager::new();

        assert!(manager.is_following_bottom());
        manager.request_scroll_to_bottom_if_following();
        assert!(manager.apply_pending_scroll());
    }
}
