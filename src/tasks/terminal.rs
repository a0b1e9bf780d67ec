//! Hosts a slideshow session in the terminal: crossterm key presses feed the
//! keyboard hub, snapshots are rendered as a single status line.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Key, SlideshowCommand};
use crate::preload::Preloader;
use crate::source::ImageSource;
use crate::tasks::slideshow::state::{SlideshowPhase, SlideshowSnapshot};
use crate::tasks::slideshow::{
    self, CloseReason, KeyboardHub, SlideshowHandle, SlideshowOptions,
};

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Host input that is not part of the slideshow keyboard contract.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostInput {
    Key(Key),
    Command(SlideshowCommand),
}

fn map_key(ev: &KeyEvent) -> HostInput {
    match ev.code {
        // Raw mode swallows SIGINT.
        KeyCode::Char('c') if ev.modifiers.contains(KeyModifiers::CONTROL) => {
            HostInput::Command(SlideshowCommand::Close)
        }
        KeyCode::Esc => HostInput::Key(Key::Escape),
        KeyCode::Left => HostInput::Key(Key::ArrowLeft),
        KeyCode::Right => HostInput::Key(Key::ArrowRight),
        KeyCode::Char(' ') => HostInput::Key(Key::Space),
        KeyCode::Char('r') | KeyCode::Char('R') => HostInput::Command(SlideshowCommand::Reload),
        KeyCode::Char('q') | KeyCode::Char('Q') => HostInput::Command(SlideshowCommand::Close),
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            HostInput::Command(SlideshowCommand::JumpTo(index))
        }
        _ => HostInput::Key(Key::Other),
    }
}

pub fn describe(snapshot: &SlideshowSnapshot) -> String {
    match snapshot.phase {
        SlideshowPhase::Loading => "Loading images...".to_string(),
        SlideshowPhase::Empty => {
            "No images found. Add images to the slideshow folder and press r to reload."
                .to_string()
        }
        SlideshowPhase::Playing | SlideshowPhase::Paused => {
            let marker = if snapshot.is_paused() { "||" } else { ">" };
            let dots: String = snapshot
                .indicators()
                .map(|i| if i.active { '●' } else { '○' })
                .collect();
            format!(
                "{marker} [{}/{}] {} {dots}",
                snapshot.current_index + 1,
                snapshot.images.len(),
                snapshot.current_image().unwrap_or_default(),
            )
        }
    }
}

fn render(line: &str) -> io::Result<()> {
    let mut out = io::stdout();
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(line))?;
    out.flush()
}

/// Runs one session until it is closed from the keyboard or `cancel` fires.
pub async fn run<S, P>(
    source: S,
    preloader: P,
    options: SlideshowOptions,
    cancel: CancellationToken,
) -> Result<CloseReason>
where
    S: ImageSource + 'static,
    P: Preloader + 'static,
{
    let keyboard = KeyboardHub::new();
    let session_cancel = cancel.child_token();
    let session = slideshow::open(source, preloader, options, &keyboard, session_cancel.clone());

    if let Err(err) = terminal::enable_raw_mode() {
        session_cancel.cancel();
        return Err(err).context("failed to enable raw terminal mode");
    }
    let input_stop = CancellationToken::new();
    let input = tokio::task::spawn_blocking({
        let keyboard = keyboard.clone();
        let commands = session.commands.clone();
        let stop = input_stop.clone();
        move || read_input(&keyboard, &commands, &stop)
    });

    let outcome = drive_session(session, &session_cancel, render).await;

    input_stop.cancel();
    match input.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("terminal input failed: {err}"),
        Err(err) => warn!("terminal input task failed: {err}"),
    }
    terminal::disable_raw_mode().context("failed to restore terminal mode")?;
    execute!(io::stdout(), Print("\r\n"))?;
    outcome
}

/// Draws every snapshot until the session ends. A drawing failure cancels the
/// session and waits for it before the error is returned.
async fn drive_session<F>(
    session: SlideshowHandle,
    cancel: &CancellationToken,
    mut draw: F,
) -> Result<CloseReason>
where
    F: FnMut(&str) -> io::Result<()>,
{
    let SlideshowHandle {
        commands,
        mut snapshots,
        task,
    } = session;
    let rendered = render_until_closed(&mut snapshots, &mut draw).await;
    if rendered.is_err() {
        cancel.cancel();
    }
    drop(commands);
    let reason = task.await.context("slideshow task panicked")??;
    rendered.context("failed to draw slideshow status")?;
    Ok(reason)
}

async fn render_until_closed<F>(
    snapshots: &mut watch::Receiver<SlideshowSnapshot>,
    draw: &mut F,
) -> io::Result<()>
where
    F: FnMut(&str) -> io::Result<()>,
{
    draw(&describe(&snapshots.borrow()))?;
    while snapshots.changed().await.is_ok() {
        let line = describe(&snapshots.borrow_and_update());
        draw(&line)?;
    }
    Ok(())
}

fn read_input(
    keyboard: &KeyboardHub,
    commands: &mpsc::Sender<SlideshowCommand>,
    stop: &CancellationToken,
) -> io::Result<()> {
    while !stop.is_cancelled() {
        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(ev) = event::read()? else {
            continue;
        };
        if ev.kind != KeyEventKind::Press {
            continue;
        }
        match map_key(&ev) {
            HostInput::Key(key) => {
                let dispatch = keyboard.dispatch(key);
                debug!(?key, delivered = dispatch.delivered, "key dispatched");
            }
            HostInput::Command(cmd) => {
                if commands.blocking_send(cmd).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::ImageList;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn keys_map_to_slideshow_contract() {
        assert_eq!(map_key(&press(KeyCode::Esc)), HostInput::Key(Key::Escape));
        assert_eq!(map_key(&press(KeyCode::Left)), HostInput::Key(Key::ArrowLeft));
        assert_eq!(map_key(&press(KeyCode::Right)), HostInput::Key(Key::ArrowRight));
        assert_eq!(map_key(&press(KeyCode::Char(' '))), HostInput::Key(Key::Space));
        assert_eq!(
            map_key(&press(KeyCode::Char('3'))),
            HostInput::Command(SlideshowCommand::JumpTo(2))
        );
        assert_eq!(map_key(&press(KeyCode::Char('x'))), HostInput::Key(Key::Other));
        assert_eq!(
            map_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            HostInput::Command(SlideshowCommand::Close)
        );
    }

    #[test]
    fn status_line_shows_position_and_indicators() {
        let snapshot = SlideshowSnapshot {
            phase: SlideshowPhase::Paused,
            images: ["/slideshow/a.png", "/slideshow/b.png"].into_iter().collect::<ImageList>(),
            current_index: 1,
            loaded: 2,
        };
        assert_eq!(describe(&snapshot), "|| [2/2] /slideshow/b.png ○●");
    }

    struct FixedSource;

    impl ImageSource for FixedSource {
        async fn fetch(&self) -> crate::error::Result<ImageList> {
            Ok(["/slideshow/a.png"].into_iter().collect())
        }
    }

    struct NoopPreloader;

    impl Preloader for NoopPreloader {
        async fn preload(&self, _url: &str) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn draw_failure_cancels_the_session() {
        let hub = KeyboardHub::new();
        let cancel = CancellationToken::new();
        let session = slideshow::open(
            FixedSource,
            NoopPreloader,
            SlideshowOptions::default(),
            &hub,
            cancel.clone(),
        );

        let mut draws = 0;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            drive_session(session, &cancel, |_| {
                draws += 1;
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }),
        )
        .await
        .expect("session should end after a draw failure");

        assert!(outcome.is_err());
        assert_eq!(draws, 1);
        assert!(cancel.is_cancelled());
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn session_close_ends_drawing_with_its_reason() {
        let hub = KeyboardHub::new();
        let cancel = CancellationToken::new();
        let session = slideshow::open(
            FixedSource,
            NoopPreloader,
            SlideshowOptions::default(),
            &hub,
            cancel.clone(),
        );
        session.commands.send(SlideshowCommand::Close).await.unwrap();

        let mut lines = Vec::new();
        let reason = drive_session(session, &cancel, |line| {
            lines.push(line.to_string());
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(reason, CloseReason::Button);
        assert!(!lines.is_empty());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn empty_state_explains_how_to_add_images() {
        let snapshot = SlideshowSnapshot {
            phase: SlideshowPhase::Empty,
            ..SlideshowSnapshot::initial()
        };
        assert!(describe(&snapshot).starts_with("No images found."));
    }
}
