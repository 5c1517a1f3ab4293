//! Inbound transport commands from outside the app
//!
//! Lock-screen buttons, headset keys and media-session callbacks arrive as
//! [`RemoteCommand`]s. The bridge maps each one onto a single engine call.
//! Callers are never blocked by the engine lock: `dispatch` runs one command on
//! its own task, while `attach` drains a channel on a single task so commands
//! reach the engine in the order they were sent.

use crate::control::PlaybackControl;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    /// Absolute position in seconds
    Seek(f64),
    /// Relative jump in seconds, negative to rewind
    Skip(f64),
}

#[derive(Clone)]
pub struct RemoteControlBridge {
    player: Arc<dyn PlaybackControl>,
}

impl RemoteControlBridge {
    pub fn new(player: Arc<dyn PlaybackControl>) -> Self {
        Self { player }
    }

    /// Starts the mapped command and returns without waiting for it
    ///
    /// Separate dispatches may reach the engine in any order; use
    /// [`attach`](Self::attach) when order matters.
    pub fn dispatch(&self, command: RemoteCommand) -> JoinHandle<()> {
        let player = Arc::clone(&self.player);
        tokio::spawn(async move { execute(player.as_ref(), command).await })
    }

    /// Runs every command from `commands`, one after another, until the sender closes
    pub fn attach(&self, mut commands: mpsc::Receiver<RemoteCommand>) -> JoinHandle<()> {
        let player = Arc::clone(&self.player);
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                log::debug!("Remote command: {:?}", command);
                execute(player.as_ref(), command).await;
            }
            log::debug!("Remote command channel closed");
        })
    }
}

async fn execute(player: &dyn PlaybackControl, command: RemoteCommand) {
    let result = match command {
        RemoteCommand::Play => player.resume().await,
        RemoteCommand::Pause => player.pause().await,
        RemoteCommand::TogglePlayPause => {
            if player.current_snapshot().is_playing {
                player.pause().await
            } else {
                player.resume().await
            }
        }
        RemoteCommand::Seek(position) => player.seek(position).await,
        RemoteCommand::Skip(delta) => player.skip_by(delta).await,
    };

    if let Err(e) = result {
        log::warn!("Remote command {:?} failed: {}", command, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SnapshotSource;
    use crate::error::EngineResult;
    use crate::test_support::RecordingControl;
    use async_trait::async_trait;
    use std::time::Duration;
    use taleplay_core::PlaybackSnapshot;

    #[tokio::test]
    async fn test_commands_map_one_to_one() {
        let control = Arc::new(RecordingControl::new(false));
        let bridge = RemoteControlBridge::new(control.clone());

        bridge.dispatch(RemoteCommand::Play).await.unwrap();
        bridge.dispatch(RemoteCommand::Pause).await.unwrap();
        bridge.dispatch(RemoteCommand::Seek(42.0)).await.unwrap();
        bridge.dispatch(RemoteCommand::Skip(-15.0)).await.unwrap();

        assert_eq!(
            control.calls(),
            vec!["resume", "pause", "seek 42", "skip -15"]
        );
    }

    #[tokio::test]
    async fn test_toggle_follows_snapshot() {
        let playing = Arc::new(RecordingControl::new(true));
        RemoteControlBridge::new(playing.clone())
            .dispatch(RemoteCommand::TogglePlayPause)
            .await
            .unwrap();
        assert_eq!(playing.calls(), vec!["pause"]);

        let paused = Arc::new(RecordingControl::new(false));
        RemoteControlBridge::new(paused.clone())
            .dispatch(RemoteCommand::TogglePlayPause)
            .await
            .unwrap();
        assert_eq!(paused.calls(), vec!["resume"]);
    }

    #[tokio::test]
    async fn test_attach_drains_channel() {
        let control = Arc::new(RecordingControl::new(false));
        let bridge = RemoteControlBridge::new(control.clone());
        let (tx, rx) = mpsc::channel(8);

        let handle = bridge.attach(rx);
        tx.send(RemoteCommand::Pause).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(control.calls(), vec!["pause"]);
    }

    /// Seeks take a while, everything else is immediate
    struct SlowSeek {
        inner: RecordingControl,
    }

    impl SnapshotSource for SlowSeek {
        fn current_snapshot(&self) -> PlaybackSnapshot {
            self.inner.current_snapshot()
        }
    }

    #[async_trait]
    impl PlaybackControl for SlowSeek {
        async fn pause(&self) -> EngineResult<()> {
            self.inner.pause().await
        }

        async fn resume(&self) -> EngineResult<()> {
            self.inner.resume().await
        }

        async fn seek(&self, position_secs: f64) -> EngineResult<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.seek(position_secs).await
        }

        async fn skip_by(&self, delta_secs: f64) -> EngineResult<()> {
            self.inner.skip_by(delta_secs).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_attach_keeps_send_order() {
        let control = Arc::new(SlowSeek {
            inner: RecordingControl::new(true),
        });
        let bridge = RemoteControlBridge::new(control.clone());
        let (tx, rx) = mpsc::channel(8);

        let handle = bridge.attach(rx);
        tx.send(RemoteCommand::Seek(10.0)).await.unwrap();
        tx.send(RemoteCommand::Skip(5.0)).await.unwrap();
        tx.send(RemoteCommand::Pause).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(control.inner.calls(), vec!["seek 10", "skip 5", "pause"]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let control = Arc::new(RecordingControl::failing());
        let bridge = RemoteControlBridge::new(control.clone());

        bridge.dispatch(RemoteCommand::Play).await.unwrap();
        assert_eq!(control.calls(), vec!["resume"]);
    }
}
