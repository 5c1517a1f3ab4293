use anyhow::{bail, Context, Result};
use console::style;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taleplay_config::Config;
use taleplay_core::{format_clock, Book, BookId, Chapter, PersistenceStore, PlaybackSnapshot, ProgressRecord};
use taleplay_database::SqliteStore;
use taleplay_engine::{
    DecoderTransportFactory, EngineConfig, NowPlayingSink, OutputKind, PlaybackEngine,
    PlaybackEvent, PlaybackSpeed, ProgressTracker, RemoteCommand, RemoteControlBridge, SleepTimer,
    TrackerConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepRequest {
    Minutes(u64),
    EndOfChapter,
    Chapters(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayOptions {
    /// 1-based chapter to start from instead of the saved position
    pub chapter: Option<u32>,
    pub speed: Option<f32>,
    pub sleep: Option<SleepRequest>,
}

/// A line typed while a book is playing
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PlayerCommand {
    Toggle,
    Forward,
    Back,
    Speed(f32),
    SleepMinutes(Option<u64>),
    SleepEndOfChapter,
    SleepChapters(Option<u32>),
    CancelSleep,
    Next,
    Previous,
    Status,
    Help,
    Quit,
}

pub(crate) fn parse_command(line: &str) -> Result<PlayerCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(PlayerCommand::Status);
    };
    let arg = parts.next();

    let command = match head {
        "p" => PlayerCommand::Toggle,
        "f" => PlayerCommand::Forward,
        "b" => PlayerCommand::Back,
        "s" => match arg.map(str::parse::<f32>) {
            Some(Ok(speed)) => PlayerCommand::Speed(speed),
            _ => return Err("usage: s <speed>, e.g. s 1.25".to_string()),
        },
        "t" => match arg.map(str::parse::<u64>) {
            None => PlayerCommand::SleepMinutes(None),
            Some(Ok(minutes)) if minutes > 0 => PlayerCommand::SleepMinutes(Some(minutes)),
            _ => return Err("usage: t [minutes]".to_string()),
        },
        "e" => PlayerCommand::SleepEndOfChapter,
        "c" => match arg.map(str::parse::<u32>) {
            None => PlayerCommand::SleepChapters(None),
            Some(Ok(chapters)) if chapters > 0 => PlayerCommand::SleepChapters(Some(chapters)),
            _ => return Err("usage: c [chapters]".to_string()),
        },
        "x" => PlayerCommand::CancelSleep,
        "n" => PlayerCommand::Next,
        "v" => PlayerCommand::Previous,
        "i" => PlayerCommand::Status,
        "h" | "?" => PlayerCommand::Help,
        "q" => PlayerCommand::Quit,
        other => return Err(format!("unknown command '{}', type h for help", other)),
    };
    Ok(command)
}

/// Chapter index and position to start from
///
/// An explicit chapter wins. Otherwise playback resumes at the latest saved
/// record, rewound a little; a chapter saved at its very end resumes at the
/// start of the next one.
pub(crate) fn resolve_start(
    chapters: &[Chapter],
    latest: Option<&ProgressRecord>,
    requested_chapter: Option<u32>,
    rewind_secs: f64,
) -> Result<(usize, f64)> {
    if chapters.is_empty() {
        bail!("Book has no chapters");
    }

    if let Some(requested) = requested_chapter {
        let index = requested.saturating_sub(1) as usize;
        if index >= chapters.len() {
            bail!("Book has {} chapters, not {}", chapters.len(), requested);
        }
        return Ok((index, 0.0));
    }

    let Some(record) = latest else {
        return Ok((0, 0.0));
    };

    let index = chapters
        .iter()
        .position(|c| c.id == record.chapter_id)
        .unwrap_or_else(|| (record.chapter_index as usize).min(chapters.len() - 1));
    let chapter = &chapters[index];

    let finished = chapter.duration_secs > 0.0 && record.position_secs >= chapter.duration_secs - 0.5;
    if finished && index + 1 < chapters.len() {
        return Ok((index + 1, 0.0));
    }

    Ok((index, (record.position_secs - rewind_secs).max(0.0)))
}

fn sleep_duration(minutes: u64) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("Sleep timer of {} minutes is too long", minutes))
}

/// Prints a line whenever the chapter or play state changes
#[derive(Default)]
struct ConsoleNowPlaying {
    last: Mutex<Option<(String, bool)>>,
}

impl NowPlayingSink for ConsoleNowPlaying {
    fn update_now_playing(&self, snapshot: &PlaybackSnapshot, title: &str, subtitle: &str) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let key = (title.to_string(), snapshot.is_playing);
        if last.as_ref() == Some(&key) {
            return;
        }
        *last = Some(key);

        let icon = if snapshot.is_playing {
            style("▶").green()
        } else {
            style("⏸").yellow()
        };
        println!(
            "{} {} | {} [{} / {}] {}",
            icon,
            style(title).bold(),
            subtitle,
            format_clock(snapshot.position_secs),
            format_clock(snapshot.duration_secs),
            snapshot.speed
        );
    }

    fn clear_now_playing(&self) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

fn output_kind() -> OutputKind {
    #[cfg(feature = "device-output")]
    {
        OutputKind::Device
    }
    #[cfg(not(feature = "device-output"))]
    {
        OutputKind::Silent
    }
}

struct Session {
    engine: PlaybackEngine,
    tracker: ProgressTracker,
    timer: SleepTimer,
    remote: mpsc::Sender<RemoteCommand>,
    store: SqliteStore,
    config: Config,
    chapters: Vec<Chapter>,
    current: usize,
}

impl Session {
    async fn play_chapter(&mut self, index: usize, start_secs: f64) -> Result<()> {
        let chapter = self.chapters[index].clone();
        self.engine
            .play(chapter.clone(), start_secs)
            .await
            .with_context(|| format!("Failed to play {}", chapter.file_path.display()))?;
        self.current = index;
        Ok(())
    }

    async fn send_remote(&self, command: RemoteCommand) -> Result<()> {
        self.remote
            .send(command)
            .await
            .context("Remote command handler stopped")
    }

    /// Returns false when the session should end
    async fn apply(&mut self, command: PlayerCommand) -> Result<bool> {
        let player = &self.config.player;
        match command {
            PlayerCommand::Toggle => self.send_remote(RemoteCommand::TogglePlayPause).await?,
            PlayerCommand::Forward => {
                let delta = player.skip_forward_secs as f64;
                self.send_remote(RemoteCommand::Skip(delta)).await?
            }
            PlayerCommand::Back => {
                let delta = -(player.skip_back_secs as f64);
                self.send_remote(RemoteCommand::Skip(delta)).await?
            }
            PlayerCommand::Speed(speed) => {
                self.engine.set_playback_speed(speed).await?;
                let speed = self.engine.speed().await;
                self.store.set_playback_speed(speed).await?;
                println!("Speed {}", speed);
            }
            PlayerCommand::SleepMinutes(minutes) => {
                let minutes = minutes.unwrap_or(self.config.sleep_timer.default_minutes as u64);
                self.timer.start_for_duration(sleep_duration(minutes)?).await?;
                println!("Sleep timer: {}", self.timer.state().await);
            }
            PlayerCommand::SleepEndOfChapter => {
                self.timer.start_until_end_of_chapter().await;
                println!("Sleep timer: end of chapter");
            }
            PlayerCommand::SleepChapters(count) => {
                let count = count.unwrap_or(self.config.sleep_timer.default_chapter_count);
                self.timer.start_for_chapter_count(count).await?;
                println!("Sleep timer: {}", self.timer.state().await);
            }
            PlayerCommand::CancelSleep => {
                self.timer.cancel().await;
                println!("Sleep timer off");
            }
            PlayerCommand::Next => {
                if self.current + 1 < self.chapters.len() {
                    self.play_chapter(self.current + 1, 0.0).await?;
                } else {
                    println!("Already at the last chapter");
                }
            }
            PlayerCommand::Previous => {
                let target = self.current.saturating_sub(1);
                self.play_chapter(target, 0.0).await?;
            }
            PlayerCommand::Status => self.print_status().await,
            PlayerCommand::Help => print_help(),
            PlayerCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Returns false when the book is finished
    async fn on_chapter_end(&mut self) -> Result<bool> {
        if self.timer.on_chapter_completed().await {
            println!("{} Sleep timer: paused", style("☾").cyan());
            return Ok(true);
        }

        if !self.config.player.auto_advance {
            return Ok(true);
        }

        if self.current + 1 < self.chapters.len() {
            self.play_chapter(self.current + 1, 0.0).await?;
            Ok(true)
        } else {
            println!("{} Finished the book", style("✓").green().bold());
            Ok(false)
        }
    }

    async fn print_status(&self) {
        let snapshot = self.engine.current_snapshot();
        let timer = self.timer.state().await;
        println!(
            "Chapter {}/{} at {} of {} | {} | {} | sleep timer {}",
            self.current + 1,
            self.chapters.len(),
            format_clock(snapshot.position_secs),
            format_clock(snapshot.duration_secs),
            if snapshot.is_playing { "playing" } else { "paused" },
            snapshot.speed,
            timer
        );
        if let Some(left) = timer.remaining_at(chrono::Utc::now()) {
            println!("  {} left", format_clock(left.num_seconds() as f64));
        }
    }

    async fn shutdown(self) {
        if let Err(e) = self.tracker.flush().await {
            log::warn!("Failed to save final position: {}", e);
        }
        self.timer.cancel().await;
        if let Err(e) = self.engine.stop().await {
            log::warn!("Failed to stop playback: {}", e);
        }
        self.store.close().await;
    }
}

fn print_help() {
    println!("  p          play / pause");
    println!("  f, b       skip forward / back");
    println!("  s <speed>  set speed (0.75 to 2.0)");
    println!("  t [min]    sleep after minutes");
    println!("  e          sleep at end of chapter");
    println!("  c [n]      sleep after n chapters");
    println!("  x          cancel sleep timer");
    println!("  n, v       next / previous chapter");
    println!("  i          status");
    println!("  q          quit");
}

pub async fn start_playback(
    store: SqliteStore,
    config: &Config,
    book_id: BookId,
    options: PlayOptions,
) -> Result<()> {
    let book: Book = store.book(book_id).await.context("Failed to get book")?;
    let chapters = store
        .get_chapters(book_id)
        .await
        .context("Failed to get chapters")?;
    let latest = store
        .latest_progress(book_id)
        .await
        .context("Failed to read saved progress")?;

    let rewind = if options.chapter.is_some() {
        0.0
    } else {
        config.player.resume_rewind_secs as f64
    };
    let (start_index, start_secs) = resolve_start(&chapters, latest.as_ref(), options.chapter, rewind)?;

    let speed = match options.speed {
        Some(speed) => PlaybackSpeed::clamped(speed),
        None => store
            .stored_playback_speed()
            .await?
            .unwrap_or_else(|| PlaybackSpeed::clamped(config.player.default_speed)),
    };

    let engine = PlaybackEngine::new(
        Arc::new(DecoderTransportFactory::new(output_kind())),
        Arc::new(ConsoleNowPlaying::default()),
        EngineConfig {
            poll_interval: Duration::from_millis(config.player.poll_interval_ms),
            initial_speed: speed,
        },
    );
    let tracker = ProgressTracker::new(
        Arc::new(store.clone()),
        Arc::new(engine.clone()),
        TrackerConfig {
            autosave_threshold_secs: config.player.autosave_threshold_secs,
        },
    );
    let tracker_task = tracker.attach(&engine);
    let timer = SleepTimer::new(Arc::new(engine.clone()), Arc::new(tracker.clone()));
    let (remote, remote_rx) = mpsc::channel(16);
    let remote_task = RemoteControlBridge::new(Arc::new(engine.clone())).attach(remote_rx);
    let mut events = engine.subscribe();

    store.set_last_opened_book(book_id).await?;
    if options.speed.is_some() {
        store.set_playback_speed(speed).await?;
    }

    println!("\n{} {}", style("▶").green().bold(), style(&book.title).bold());
    if let Some(author) = &book.author {
        println!("by {}", author);
    }
    println!("Type h for commands.\n");

    let mut session = Session {
        engine,
        tracker,
        timer,
        remote,
        store,
        config: config.clone(),
        chapters,
        current: start_index,
    };

    session
        .engine
        .set_now_playing_metadata(Some(book.title.as_str()), None)
        .await;
    session.play_chapter(start_index, start_secs).await?;

    match options.sleep {
        Some(SleepRequest::Minutes(minutes)) => {
            session
                .apply(PlayerCommand::SleepMinutes(Some(minutes)))
                .await?;
        }
        Some(SleepRequest::EndOfChapter) => {
            session.apply(PlayerCommand::SleepEndOfChapter).await?;
        }
        Some(SleepRequest::Chapters(count)) => {
            session.apply(PlayerCommand::SleepChapters(Some(count))).await?;
        }
        None => {}
    }

    let result = run_loop(&mut session, &mut events).await;
    session.shutdown().await;
    tracker_task.abort();
    remote_task.abort();
    result
}

async fn run_loop(
    session: &mut Session,
    events: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                return Ok(());
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => match parse_command(&line) {
                        Ok(command) => match session.apply(command).await {
                            Ok(true) => {}
                            Ok(false) => return Ok(()),
                            Err(e) => println!("{} {:#}", style("✗").red(), e),
                        },
                        Err(message) => println!("{}", message),
                    },
                    None => {
                        log::debug!("stdin closed, playing until the book ends");
                        stdin_open = false;
                    }
                }
            }
            event = events.recv() => match event {
                Some(PlaybackEvent::Ended(_)) => {
                    if !session.on_chapter_end().await? {
                        return Ok(());
                    }
                }
                Some(PlaybackEvent::Snapshot(_)) => {}
                None => return Ok(()),
            }
        }
    }
}
