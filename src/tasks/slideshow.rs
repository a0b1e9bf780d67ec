pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use tokio::select;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Configuration;
use crate::events::{Direction, Key, ListFetched, PreloadSettled, SlideshowCommand, Tick};
use crate::lister::ImageList;
use crate::preload::Preloader;
use crate::source::ImageSource;
use state::{KeyAction, PhaseChange, SlideshowSM, SlideshowSnapshot, TimerDeps};

#[derive(Debug, Clone, Copy)]
pub struct SlideshowOptions {
    pub advance_interval: Duration,
}

impl From<&Configuration> for SlideshowOptions {
    fn from(cfg: &Configuration) -> Self {
        Self {
            advance_interval: cfg.advance_interval,
        }
    }
}

impl SlideshowOptions {
    /// Checks options assembled after [`Configuration::validated`], e.g. CLI overrides.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.advance_interval > Duration::ZERO,
            "advance interval must be greater than zero"
        );
        Ok(self)
    }
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            advance_interval: Configuration::DEFAULT_ADVANCE_INTERVAL,
        }
    }
}

/// Why a slideshow session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Button,
    Escape,
    Cancelled,
    HostGone,
}

/// Result of handing a key press to the open slideshow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDispatch {
    pub delivered: usize,
    pub prevent_default: bool,
}

/// Fan-out point for host key presses. A slideshow session attaches one listener
/// while it is open and detaches it on close.
#[derive(Debug, Clone)]
pub struct KeyboardHub {
    tx: broadcast::Sender<Key>,
}

impl Default for KeyboardHub {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn dispatch(&self, key: Key) -> KeyDispatch {
        let delivered = self.tx.send(key).unwrap_or(0);
        KeyDispatch {
            delivered,
            prevent_default: delivered > 0 && KeyAction::for_key(key).prevents_default(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn attach(&self) -> KeyListener {
        KeyListener {
            rx: Some(self.tx.subscribe()),
        }
    }
}

struct KeyListener {
    rx: Option<broadcast::Receiver<Key>>,
}

impl KeyListener {
    fn is_attached(&self) -> bool {
        self.rx.is_some()
    }

    async fn recv(&mut self) -> Option<Key> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(key) => return Some(key),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "keyboard listener lagged; dropping key presses");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }
}

/// The auto-advance timer as an owned effect: armed once per dependency set,
/// released exactly once on change, close or drop.
struct AutoAdvance {
    period: Duration,
    tick_tx: mpsc::Sender<Tick>,
    epoch: u64,
    armed: Option<(TimerDeps, JoinHandle<()>)>,
}

impl AutoAdvance {
    fn new(period: Duration, tick_tx: mpsc::Sender<Tick>) -> Self {
        if period.is_zero() {
            warn!("auto-advance interval is zero; the timer stays disarmed");
        }
        Self {
            period,
            tick_tx,
            epoch: 0,
            armed: None,
        }
    }

    fn rebind(&mut self, deps: Option<TimerDeps>) {
        if self.armed.as_ref().map(|(d, _)| *d) == deps {
            return;
        }
        self.release();
        if let Some(deps) = deps {
            self.acquire(deps);
        }
    }

    fn acquire(&mut self, deps: TimerDeps) {
        if self.period.is_zero() {
            return;
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let period = self.period;
        let tick_tx = self.tick_tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tick_tx.send(Tick { epoch }).await.is_err() {
                    break;
                }
            }
        });
        debug!(epoch, generation = deps.generation, "auto-advance armed");
        self.armed = Some((deps, handle));
    }

    fn release(&mut self) {
        if let Some((_, handle)) = self.armed.take() {
            handle.abort();
            debug!(epoch = self.epoch, "auto-advance released");
        }
    }

    /// Ticks queued by a released arming must not advance the show.
    fn accepts(&self, tick: Tick) -> bool {
        self.armed.is_some() && tick.epoch == self.epoch
    }
}

impl Drop for AutoAdvance {
    fn drop(&mut self) {
        self.release();
    }
}

/// Channels a host uses to drive one slideshow session.
pub struct SlideshowHandle {
    pub commands: mpsc::Sender<SlideshowCommand>,
    pub snapshots: watch::Receiver<SlideshowSnapshot>,
    pub task: JoinHandle<Result<CloseReason>>,
}

/// Opens a slideshow session on its own task.
pub fn open<S, P>(
    source: S,
    preloader: P,
    options: SlideshowOptions,
    keyboard: &KeyboardHub,
    cancel: CancellationToken,
) -> SlideshowHandle
where
    S: ImageSource + 'static,
    P: Preloader + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (snap_tx, snap_rx) = watch::channel(SlideshowSnapshot::initial());
    let keys = keyboard.attach();
    let task = tokio::spawn(run(source, preloader, options, cmd_rx, keys, snap_tx, cancel));
    SlideshowHandle {
        commands: cmd_tx,
        snapshots: snap_rx,
        task,
    }
}

/// Drives one slideshow session until it is closed.
///
/// Rules:
/// - The list is fetched once per load generation; `Reload` starts a new one.
/// - Every image of a non-empty list is preloaded concurrently; the first one
///   to settle, whichever index it is, ends `Loading`.
/// - While playing with a non-empty list the timer advances forward every
///   `advance_interval`; pausing or a new list re-arms it from scratch.
/// - On close the timer is aborted and the keyboard listener detached; in-flight
///   preloads run to completion and their results are dropped.
#[instrument(skip_all, fields(interval = ?options.advance_interval))]
async fn run<S, P>(
    source: S,
    preloader: P,
    options: SlideshowOptions,
    mut commands: mpsc::Receiver<SlideshowCommand>,
    mut keys: KeyListener,
    snapshots: watch::Sender<SlideshowSnapshot>,
    cancel: CancellationToken,
) -> Result<CloseReason>
where
    S: ImageSource + 'static,
    P: Preloader + 'static,
{
    let source = Arc::new(source);
    let preloader = Arc::new(preloader);
    let (fetch_tx, mut fetch_rx) = mpsc::channel::<ListFetched>(4);
    let (preload_tx, mut preload_rx) = mpsc::channel::<PreloadSettled>(64);
    let (tick_tx, mut tick_rx) = mpsc::channel::<Tick>(1);

    let mut sm = SlideshowSM::new();
    let mut timer = AutoAdvance::new(options.advance_interval, tick_tx);
    start_fetch(&mut sm, &source, &fetch_tx);

    let reason = loop {
        select! {
            _ = cancel.cancelled() => break CloseReason::Cancelled,

            cmd = commands.recv() => match cmd {
                None => break CloseReason::HostGone,
                Some(SlideshowCommand::Close) => break CloseReason::Button,
                Some(SlideshowCommand::Advance(direction)) => {
                    sm.advance(direction);
                }
                Some(SlideshowCommand::JumpTo(index)) => {
                    if !sm.jump_to(index) {
                        warn!(index, len = sm.images().len(), "ignoring jump to missing slide");
                    }
                }
                Some(SlideshowCommand::TogglePause) => {
                    let paused = sm.toggle_pause();
                    debug!(paused, "pause toggled");
                }
                Some(SlideshowCommand::Reload) => {
                    info!("reloading image list");
                    start_fetch(&mut sm, &source, &fetch_tx);
                }
            },

            Some(key) = keys.recv(), if keys.is_attached() => match KeyAction::for_key(key) {
                KeyAction::Close => break CloseReason::Escape,
                KeyAction::Advance(direction) => {
                    sm.advance(direction);
                }
                KeyAction::TogglePause => {
                    let paused = sm.toggle_pause();
                    debug!(paused, "pause toggled by key");
                }
                KeyAction::Ignored => {}
            },

            Some(ListFetched { generation, outcome }) = fetch_rx.recv() => {
                if let Err(err) = &outcome {
                    warn!(error = %err, "failed to fetch image list");
                }
                let images = outcome.as_ref().ok().cloned();
                log_change(sm.on_list_fetched(generation, outcome));
                let still_loading = sm.generation() == generation && sm.is_loading();
                if let Some(images) = images.filter(|_| still_loading) {
                    start_preloads(generation, &images, &preloader, &preload_tx);
                }
            }

            Some(settled) = preload_rx.recv() => {
                debug!(index = settled.index, ok = settled.ok, "preload settled");
                log_change(sm.on_preload_settled(settled));
            }

            Some(tick) = tick_rx.recv() => {
                if timer.accepts(tick) {
                    sm.advance(Direction::Forward);
                } else {
                    debug!(epoch = tick.epoch, "dropping stale tick");
                }
            }
        }

        timer.rebind(sm.timer_deps());
        let snapshot = sm.snapshot();
        snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    };

    timer.release();
    drop(keys);
    info!(?reason, "slideshow closed");
    Ok(reason)
}

fn start_fetch<S>(sm: &mut SlideshowSM, source: &Arc<S>, fetch_tx: &mpsc::Sender<ListFetched>)
where
    S: ImageSource + 'static,
{
    let (generation, change) = sm.begin_load();
    log_change(change);
    let source = Arc::clone(source);
    let fetch_tx = fetch_tx.clone();
    tokio::spawn(async move {
        let outcome = source.fetch().await;
        let _ = fetch_tx.send(ListFetched { generation, outcome }).await;
    });
}

fn start_preloads<P>(
    generation: u64,
    images: &ImageList,
    preloader: &Arc<P>,
    preload_tx: &mpsc::Sender<PreloadSettled>,
) where
    P: Preloader + 'static,
{
    debug!(count = images.len(), generation, "preloading images");
    for (index, url) in images.iter().enumerate() {
        let url = url.clone();
        let preloader = Arc::clone(preloader);
        let preload_tx = preload_tx.clone();
        tokio::spawn(async move {
            let ok = match preloader.preload(&url).await {
                Ok(()) => true,
                Err(err) => {
                    debug!(url = %url, error = %err, "preload failed");
                    false
                }
            };
            let _ = preload_tx
                .send(PreloadSettled {
                    generation,
                    index,
                    ok,
                })
                .await;
        });
    }
}

fn log_change(change: Option<PhaseChange>) {
    if let Some(ch) = change {
        debug!(from = ?ch.from, to = ?ch.to, "slideshow phase changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_rebind_is_idempotent_and_release_drops_stale_ticks() {
        let (tick_tx, mut tick_rx) = mpsc::channel(4);
        let mut timer = AutoAdvance::new(Duration::from_secs(1), tick_tx);
        let deps = TimerDeps { generation: 1 };

        timer.rebind(Some(deps));
        timer.rebind(Some(deps));
        assert_eq!(timer.epoch, 1);

        let tick = tick_rx.recv().await.unwrap();
        assert!(timer.accepts(tick));

        timer.rebind(None);
        assert!(timer.armed.is_none());
        assert!(!timer.accepts(tick));

        timer.rebind(Some(deps));
        assert_eq!(timer.epoch, 2);
        assert!(!timer.accepts(tick));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let options = SlideshowOptions {
            advance_interval: Duration::ZERO,
        };
        assert!(options.validated().is_err());
        assert!(SlideshowOptions::default().validated().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_never_arms() {
        let (tick_tx, mut tick_rx) = mpsc::channel(4);
        let mut timer = AutoAdvance::new(Duration::ZERO, tick_tx);
        timer.rebind(Some(TimerDeps { generation: 1 }));
        assert!(timer.armed.is_none());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(tick_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn hub_only_prevents_default_with_an_attached_listener() {
        let hub = KeyboardHub::new();
        assert!(!hub.dispatch(Key::Space).prevent_default);

        let listener = hub.attach();
        assert_eq!(hub.listener_count(), 1);
        let dispatch = hub.dispatch(Key::Space);
        assert_eq!(dispatch.delivered, 1);
        assert!(dispatch.prevent_default);
        assert!(!hub.dispatch(Key::ArrowLeft).prevent_default);

        drop(listener);
        assert_eq!(hub.listener_count(), 0);
    }
}
