//! Visibility and width of the chat layout's panels.

use tracing::warn;

use crate::storage::{self, KeyValueStore};

/// Viewports narrower than this hide the sidebar.
pub const MOBILE_BREAKPOINT: f64 = 768.0;

pub const SIDEBAR_WIDTH_KEY: &str = "sidebarWidth";
pub const CANVAS_WIDTH_KEY: &str = "canvasWidth";

pub const DEFAULT_SIDEBAR_WIDTH: f64 = 280.0;
pub const DEFAULT_CANVAS_WIDTH: f64 = 380.0;

const SIDEBAR_BOUNDS: (f64, f64) = (200.0, 400.0);
const CANVAS_BOUNDS: (f64, f64) = (300.0, 600.0);

/// Panels that float over the chat; at most one is open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    ModelPanel,
    Marketplace,
    Settings,
    UserMenu,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub sidebar_open: bool,
    pub canvas_open: bool,
    overlay: Option<Overlay>,
    sidebar_width: f64,
    canvas_width: f64,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            sidebar_open: true,
            canvas_open: false,
            overlay: None,
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            canvas_width: DEFAULT_CANVAS_WIDTH,
        }
    }
}

fn clamp(width: f64, (min, max): (f64, f64)) -> f64 {
    width.max(min).min(max)
}

impl PanelState {
    /// Defaults with widths restored (and clamped) from `store`.
    pub fn restore(store: &dyn KeyValueStore) -> Self {
        let mut state = Self::default();
        if let Some(width) = storage::get_number(store, SIDEBAR_WIDTH_KEY) {
            state.sidebar_width = clamp(width, SIDEBAR_BOUNDS);
        }
        if let Some(width) = storage::get_number(store, CANVAS_WIDTH_KEY) {
            state.canvas_width = clamp(width, CANVAS_BOUNDS);
        }
        state
    }

    pub fn is_open(&self, overlay: Overlay) -> bool {
        self.overlay == Some(overlay)
    }

    pub fn open_overlay(&self) -> Option<Overlay> {
        self.overlay
    }

    pub fn sidebar_width(&self) -> f64 {
        self.sidebar_width
    }

    pub fn canvas_width(&self) -> f64 {
        self.canvas_width
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn toggle_canvas(&mut self) {
        self.canvas_open = !self.canvas_open;
    }

    /// Opening an overlay closes whichever other overlay was open.
    pub fn toggle(&mut self, overlay: Overlay) {
        self.overlay = if self.overlay == Some(overlay) {
            None
        } else {
            Some(overlay)
        };
    }

    pub fn toggle_model_panel(&mut self) {
        self.toggle(Overlay::ModelPanel);
    }

    pub fn toggle_marketplace(&mut self) {
        self.toggle(Overlay::Marketplace);
    }

    pub fn toggle_settings(&mut self) {
        self.toggle(Overlay::Settings);
    }

    pub fn toggle_user_menu(&mut self) {
        self.toggle(Overlay::UserMenu);
    }

    /// Close every overlay; sidebar and canvas keep their state.
    pub fn close_all_panels(&mut self) {
        self.overlay = None;
    }

    /// Show the sidebar on wide viewports and hide it on narrow ones.
    pub fn handle_viewport(&mut self, width: f64) {
        self.sidebar_open = width >= MOBILE_BREAKPOINT;
    }

    pub fn set_sidebar_width(&mut self, width: f64, store: &mut dyn KeyValueStore) -> f64 {
        self.sidebar_width = clamp(width, SIDEBAR_BOUNDS);
        persist(store, SIDEBAR_WIDTH_KEY, self.sidebar_width);
        self.sidebar_width
    }

    pub fn set_canvas_width(&mut self, width: f64, store: &mut dyn KeyValueStore) -> f64 {
        self.canvas_width = clamp(width, CANVAS_BOUNDS);
        persist(store, CANVAS_WIDTH_KEY, self.canvas_width);
        self.canvas_width
    }
}

fn persist(store: &mut dyn KeyValueStore, key: &str, width: f64) {
    if let Err(e) = store.set(key, &width.to_string()) {
        warn!(key, error = %e, "failed to persist panel width");
    }
}
