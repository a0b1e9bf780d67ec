use std::collections::BTreeSet;

use crate::error::Result;
use crate::events::{Direction, Key, PreloadSettled};
use crate::lister::ImageList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Empty,
    Showing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
}

/// What a key press asks of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Close,
    Advance(Direction),
    TogglePause,
    Ignored,
}

impl KeyAction {
    pub fn for_key(key: Key) -> Self {
        match key {
            Key::Escape => Self::Close,
            Key::ArrowLeft => Self::Advance(Direction::Backward),
            Key::ArrowRight => Self::Advance(Direction::Forward),
            Key::Space => Self::TogglePause,
            Key::Other => Self::Ignored,
        }
    }

    /// Space would otherwise scroll the page underneath the slideshow.
    pub fn prevents_default(self) -> bool {
        matches!(self, Self::TogglePause)
    }
}

/// Dependencies of the auto-advance timer; a change means tear down and re-arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDeps {
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowPhase {
    Loading,
    Empty,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub index: usize,
    pub active: bool,
}

/// Read-only view of the controller published to the host after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowSnapshot {
    pub phase: SlideshowPhase,
    pub images: ImageList,
    pub current_index: usize,
    pub loaded: usize,
}

impl SlideshowSnapshot {
    pub fn initial() -> Self {
        Self {
            phase: SlideshowPhase::Loading,
            images: ImageList::empty(),
            current_index: 0,
            loaded: 0,
        }
    }

    pub fn current_image(&self) -> Option<&str> {
        match self.phase {
            SlideshowPhase::Playing | SlideshowPhase::Paused => {
                self.images.get(self.current_index).map(String::as_str)
            }
            SlideshowPhase::Loading | SlideshowPhase::Empty => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.phase == SlideshowPhase::Paused
    }

    /// One dot per image, the current one active.
    pub fn indicators(&self) -> impl Iterator<Item = Indicator> + '_ {
        (0..self.images.len()).map(|index| Indicator {
            index,
            active: index == self.current_index,
        })
    }
}

pub struct SlideshowSM {
    images: ImageList,
    generation: u64,
    phase: Phase,
    current_index: usize,
    paused: bool,
    loaded: BTreeSet<usize>,
}

impl Default for SlideshowSM {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideshowSM {
    pub fn new() -> Self {
        Self {
            images: ImageList::empty(),
            generation: 0,
            phase: Phase::Loading,
            current_index: 0,
            paused: false,
            loaded: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn images(&self) -> &ImageList {
        &self.images
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.loaded.contains(&index)
    }

    /// Starts a new fetch. The returned generation tags every result belonging to it;
    /// results carrying an older generation are ignored.
    pub fn begin_load(&mut self) -> (u64, Option<PhaseChange>) {
        self.generation += 1;
        self.images = ImageList::empty();
        self.current_index = 0;
        self.loaded.clear();
        (self.generation, self.goto(Phase::Loading))
    }

    pub fn on_list_fetched(
        &mut self,
        generation: u64,
        outcome: Result<ImageList>,
    ) -> Option<PhaseChange> {
        if generation != self.generation || self.phase != Phase::Loading {
            return None;
        }
        match outcome {
            Ok(images) if !images.is_empty() => {
                self.images = images;
                self.current_index = 0;
                // Stay in Loading until the first preload settles.
                None
            }
            Ok(_) | Err(_) => self.goto(Phase::Empty),
        }
    }

    pub fn on_preload_settled(&mut self, settled: PreloadSettled) -> Option<PhaseChange> {
        if settled.generation != self.generation || settled.index >= self.images.len() {
            return None;
        }
        if settled.ok {
            self.loaded.insert(settled.index);
        }
        if self.phase == Phase::Loading {
            return self.goto(Phase::Showing);
        }
        None
    }

    /// Moves one slide, wrapping at either end. Returns false on an empty list.
    pub fn advance(&mut self, direction: Direction) -> bool {
        let len = self.images.len();
        if len == 0 {
            return false;
        }
        self.current_index = match direction {
            Direction::Forward => (self.current_index + 1) % len,
            Direction::Backward => (self.current_index + len - 1) % len,
        };
        true
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        if index >= self.images.len() {
            return false;
        }
        self.current_index = index;
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// `None` while the timer must stay disarmed.
    pub fn timer_deps(&self) -> Option<TimerDeps> {
        if self.paused || self.images.is_empty() {
            return None;
        }
        Some(TimerDeps {
            generation: self.generation,
        })
    }

    pub fn snapshot(&self) -> SlideshowSnapshot {
        let phase = match (self.phase, self.paused) {
            (Phase::Loading, _) => SlideshowPhase::Loading,
            (Phase::Empty, _) => SlideshowPhase::Empty,
            (Phase::Showing, false) => SlideshowPhase::Playing,
            (Phase::Showing, true) => SlideshowPhase::Paused,
        };
        SlideshowSnapshot {
            phase,
            images: self.images.clone(),
            current_index: self.current_index,
            loaded: self.loaded.len(),
        }
    }

    fn goto(&mut self, to: Phase) -> Option<PhaseChange> {
        if self.phase == to {
            return None;
        }
        let ch = PhaseChange {
            from: self.phase,
            to,
        };
        self.phase = to;
        Some(ch)
    }
}
