use crate::error::Error;
use crate::lister::ImageList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Keys the slideshow reacts to while it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ArrowLeft,
    ArrowRight,
    Space,
    Other,
}

/// Host -> Slideshow (buttons, indicators, clicks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideshowCommand {
    Advance(Direction),
    JumpTo(usize),
    /// Click on the slide area.
    TogglePause,
    /// Re-fetch the list; the new list supersedes the current one.
    Reload,
    Close,
}

/// Result of the list fetch, tagged with the load generation that requested it.
#[derive(Debug)]
pub struct ListFetched {
    pub generation: u64,
    pub outcome: Result<ImageList, Error>,
}

/// One preload settling (successfully or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadSettled {
    pub generation: u64,
    pub index: usize,
    pub ok: bool,
}

/// Emitted by the auto-advance timer; `epoch` identifies the arming it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub epoch: u64,
}
