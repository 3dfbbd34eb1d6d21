//! Drag-to-resize handling for side panels.
//!
//! A [`ResizablePanel`] turns pointer events into a clamped panel size.
//! Moves are rate-limited with a leading-edge throttle: the first move of an
//! interval is applied, the rest are dropped. Time is passed in by the caller
//! so the handler stays deterministic.

use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, warn};

use crate::storage::{self, KeyValueStore};

pub const DEFAULT_INITIAL_SIZE: f64 = 280.0;
pub const DEFAULT_MIN_SIZE: f64 = 200.0;
pub const DEFAULT_MAX_SIZE: f64 = 500.0;
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Edge of the panel the drag handle sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEdge {
    Right,
    Left,
    Top,
    Bottom,
}

impl HandleEdge {
    /// Right and bottom handles grow the panel as the pointer moves away from
    /// the origin; left and top handles shrink it.
    fn sign(self) -> f64 {
        match self {
            HandleEdge::Right | HandleEdge::Bottom => 1.0,
            HandleEdge::Left | HandleEdge::Top => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Cursor {
    #[strum(serialize = "col-resize")]
    ColResize,
    #[strum(serialize = "row-resize")]
    RowResize,
}

/// Document-level styling applied while a drag is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyStyle {
    pub cursor: Option<Cursor>,
    pub user_select_disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone)]
pub struct ResizeConfig {
    pub direction: Direction,
    pub edge: HandleEdge,
    pub initial_size: f64,
    pub min_size: f64,
    pub max_size: f64,
    pub throttle: Duration,
    /// Storage key the size is persisted under; `None` disables persistence.
    pub storage_key: Option<String>,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Horizontal,
            edge: HandleEdge::Right,
            initial_size: DEFAULT_INITIAL_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            throttle: DEFAULT_THROTTLE,
            storage_key: None,
        }
    }
}

impl ResizeConfig {
    fn clamp(&self, size: f64) -> f64 {
        size.max(self.min_size).min(self.max_size)
    }

    fn axis(&self, point: Point) -> f64 {
        match self.direction {
            Direction::Horizontal => point.x,
            Direction::Vertical => point.y,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    origin: f64,
    start_size: f64,
    last_applied: Option<Instant>,
}

/// What the host should draw for an open panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelView {
    pub size: f64,
    pub dragging: bool,
}

type ResizeObserver = Box<dyn FnMut(f64)>;

pub struct ResizablePanel {
    config: ResizeConfig,
    size: f64,
    open: bool,
    drag: Option<Drag>,
    on_resize: Option<ResizeObserver>,
}

impl std::fmt::Debug for ResizablePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizablePanel")
            .field("config", &self.config)
            .field("size", &self.size)
            .field("open", &self.open)
            .field("dragging", &self.drag.is_some())
            .finish()
    }
}

impl ResizablePanel {
    /// Build an open panel, restoring its last size from `store` (clamped to
    /// the configured bounds) when a storage key is set.
    pub fn new(config: ResizeConfig, store: &dyn KeyValueStore) -> Self {
        let restored = config
            .storage_key
            .as_deref()
            .and_then(|key| storage::get_number(store, key));
        let size = config.clamp(restored.unwrap_or(config.initial_size));
        Self {
            config,
            size,
            open: true,
            drag: None,
            on_resize: None,
        }
    }

    /// Register a callback fired with the new size after every applied move.
    pub fn on_resize(mut self, observer: impl FnMut(f64) + 'static) -> Self {
        self.on_resize = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &ResizeConfig {
        &self.config
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Closing a panel mid-drag abandons the drag without persisting.
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
        if !open {
            self.drag = None;
        }
    }

    /// `None` while the panel is closed.
    pub fn view(&self) -> Option<PanelView> {
        self.open.then(|| PanelView {
            size: self.size,
            dragging: self.drag.is_some(),
        })
    }

    pub fn body_style(&self) -> BodyStyle {
        if self.drag.is_none() {
            return BodyStyle::default();
        }
        let cursor = match self.config.direction {
            Direction::Horizontal => Cursor::ColResize,
            Direction::Vertical => Cursor::RowResize,
        };
        BodyStyle {
            cursor: Some(cursor),
            user_select_disabled: true,
        }
    }

    pub fn pointer_down(&mut self, at: Point) {
        if !self.open {
            return;
        }
        self.drag = Some(Drag {
            origin: self.config.axis(at),
            start_size: self.size,
            last_applied: None,
        });
    }

    /// Apply a pointer move. Returns the new size when the move was applied,
    /// `None` when it was throttled or no drag is active.
    pub fn pointer_move(&mut self, at: Point, now: Instant) -> Option<f64> {
        if !self.open {
            return None;
        }
        let drag = self.drag.as_mut()?;
        if let Some(last) = drag.last_applied
            && now.saturating_duration_since(last) < self.config.throttle
        {
            return None;
        }
        drag.last_applied = Some(now);

        let delta = self.config.axis(at) - drag.origin;
        let size = self
            .config
            .clamp(drag.start_size + self.config.edge.sign() * delta);
        self.size = size;
        if let Some(observer) = self.on_resize.as_mut() {
            observer(size);
        }
        Some(size)
    }

    /// End the drag and persist the final size. No-op when not dragging.
    pub fn pointer_up(&mut self, store: &mut dyn KeyValueStore) {
        if self.drag.take().is_none() {
            return;
        }
        debug!(size = self.size, "panel resize finished");
        if let Some(key) = self.config.storage_key.as_deref()
            && let Err(e) = store.set(key, &self.size.to_string())
        {
            warn!(key, error = %e, "failed to persist panel size");
        }
    }

    /// The pointer left the window; handled like a release.
    pub fn pointer_leave(&mut self, store: &mut dyn KeyValueStore) {
        self.pointer_up(store);
    }
}
