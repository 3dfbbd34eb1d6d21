//! Auto-scroll bookkeeping for the chat log.
//!
//! The log follows its bottom edge while new content arrives, unless the
//! user has scrolled away. Scrolling back to the bottom (or clicking there
//! without selecting text) resumes following. While a reply target is set,
//! the position saved on entering reply mode is held instead.

/// Distance from the bottom, in pixels, still treated as "at the bottom"
/// when the user scrolls or clicks.
pub const USER_BOTTOM_THRESHOLD: f64 = 50.0;
/// Looser tolerance used when content changes underneath the viewport.
pub const CONTENT_BOTTOM_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    fn within(&self, threshold: f64) -> bool {
        self.distance_from_bottom() < threshold
    }
}

/// What the host should do with the scroll container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    None,
    ToBottom,
    /// Hold the container at this `scroll_top`.
    Restore(f64),
}

#[derive(Debug, Clone, Default)]
pub struct ScrollTracker {
    user_has_scrolled: bool,
    show_jump_button: bool,
    selecting: bool,
    last_message_count: usize,
    reply_anchor: Option<f64>,
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while new content should pull the log to the bottom.
    pub fn is_following(&self) -> bool {
        !self.user_has_scrolled && self.reply_anchor.is_none()
    }

    pub fn show_jump_button(&self) -> bool {
        self.show_jump_button && self.reply_anchor.is_none()
    }

    pub fn in_reply_mode(&self) -> bool {
        self.reply_anchor.is_some()
    }

    /// The user scrolled the container.
    pub fn on_scroll(&mut self, viewport: Viewport) {
        if self.reply_anchor.is_some() {
            return;
        }
        let at_bottom = viewport.within(USER_BOTTOM_THRESHOLD);
        self.user_has_scrolled = !at_bottom;
        self.show_jump_button = !at_bottom;
    }

    /// Messages were added or grew; decide whether to move the container.
    pub fn on_content_change(&mut self, viewport: Viewport, message_count: usize) -> ScrollAction {
        if let Some(anchor) = self.reply_anchor {
            self.last_message_count = message_count;
            return ScrollAction::Restore(anchor);
        }

        let at_bottom = viewport.within(CONTENT_BOTTOM_THRESHOLD);
        let grew = message_count > self.last_message_count;
        self.last_message_count = message_count;

        if !self.user_has_scrolled || at_bottom {
            self.show_jump_button = false;
            return ScrollAction::ToBottom;
        }
        if grew {
            self.show_jump_button = true;
        }
        ScrollAction::None
    }

    /// Entering reply mode pins the current position; leaving it resumes
    /// following the bottom.
    pub fn set_reply_mode(&mut self, active: bool, viewport: Viewport) {
        match (self.reply_anchor.is_some(), active) {
            (false, true) => self.reply_anchor = Some(viewport.scroll_top),
            (true, false) => {
                self.reply_anchor = None;
                self.user_has_scrolled = false;
            }
            _ => {}
        }
    }

    pub fn pointer_down(&mut self) {
        self.selecting = true;
    }

    /// A click that selected no text while at the bottom resumes following.
    pub fn pointer_up(&mut self, viewport: Viewport, has_selection: bool) {
        self.selecting = false;
        if !has_selection && viewport.within(USER_BOTTOM_THRESHOLD) {
            self.user_has_scrolled = false;
        }
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// The "jump to latest" button was pressed.
    pub fn jump_to_bottom(&mut self) -> ScrollAction {
        self.user_has_scrolled = false;
        self.show_jump_button = false;
        ScrollAction::ToBottom
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const AT_BOTTOM: Viewport = Viewport {
        scroll_top: 1500.0,
        scroll_height: 2000.0,
        client_height: 480.0,
    };
    const SCROLLED_UP: Viewport = Viewport {
        scroll_top: 200.0,
        scroll_height: 2000.0,
        client_height: 480.0,
    };

    #[test]
    fn follows_new_content_by_default() {
        let mut tracker = ScrollTracker::new();
        assert!(tracker.is_following());
        assert_eq!(tracker.on_content_change(SCROLLED_UP, 1), ScrollAction::ToBottom);
    }

    #[test]
    fn scrolling_away_stops_following() {
        let mut tracker = ScrollTracker::new();
        tracker.on_scroll(SCROLLED_UP);
        assert!(!tracker.is_following());
        assert!(tracker.show_jump_button());
        assert_eq!(tracker.on_content_change(SCROLLED_UP, 3), ScrollAction::None);
    }

    #[test]
    fn scrolling_back_to_bottom_resumes() {
        let mut tracker = ScrollTracker::new();
        tracker.on_scroll(SCROLLED_UP);
        tracker.on_scroll(AT_BOTTOM);
        assert!(tracker.is_following());
        assert!(!tracker.show_jump_button());
        assert_eq!(tracker.on_content_change(AT_BOTTOM, 2), ScrollAction::ToBottom);
    }

    #[test]
    fn content_tolerance_is_looser_than_scroll_tolerance() {
        let near = Viewport::new(1440.0, 2000.0, 480.0);
        assert_eq!(near.distance_from_bottom(), 80.0);
        let mut tracker = ScrollTracker::new();
        tracker.on_scroll(near);
        assert!(!tracker.is_following());
        assert_eq!(tracker.on_content_change(near, 1), ScrollAction::ToBottom);
    }

    #[test]
    fn jump_to_bottom_resumes_following() {
        let mut tracker = ScrollTracker::new();
        tracker.on_scroll(SCROLLED_UP);
        assert_eq!(tracker.on_content_change(SCROLLED_UP, 3), ScrollAction::None);
        assert!(tracker.show_jump_button());
        assert_eq!(tracker.jump_to_bottom(), ScrollAction::ToBottom);
        assert!(tracker.is_following());
        assert!(!tracker.show_jump_button());
    }

    #[test]
    fn reply_mode_pins_position() {
        let mut tracker = ScrollTracker::new();
        tracker.set_reply_mode(true, SCROLLED_UP);
        tracker.on_scroll(AT_BOTTOM);
        assert_eq!(tracker.on_content_change(AT_BOTTOM, 4), ScrollAction::Restore(200.0));
        assert!(!tracker.show_jump_button());

        tracker.set_reply_mode(false, SCROLLED_UP);
        assert!(tracker.is_following());
        assert_eq!(tracker.on_content_change(SCROLLED_UP, 5), ScrollAction::ToBottom);
    }

    #[test]
    fn click_at_bottom_without_selection_resumes() {
        let mut tracker = ScrollTracker::new();
        tracker.on_scroll(SCROLLED_UP);
        tracker.pointer_down();
        assert!(tracker.is_selecting());
        tracker.pointer_up(AT_BOTTOM, true);
        assert!(!tracker.is_selecting());
        assert!(!tracker.is_following());
        tracker.pointer_up(AT_BOTTOM, false);
        assert!(tracker.is_following());
    }
}
