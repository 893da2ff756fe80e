use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::error::ClipError;
use crate::models::settings::{PlayAudioSettings, PlaybackAction};
use crate::playback::action::{behavior_for, PlaybackBehavior};
use crate::playback::playlist::Playlist;
use crate::traits::playback_output::{PlaybackHandle, PlaybackOutput, PlaybackRequest};

/// Player state as seen by the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
}

/// What the worker thread plays once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// The clip at the cursor, once.
    Once,
    /// The clip at the cursor, until stopped.
    RepeatOne,
    /// The playlist from the cursor, wrapping, until stopped.
    RepeatAll,
    /// The playlist from the cursor to its end, once.
    ToEnd,
}

enum Source {
    Single { path: PathBuf, repeat: bool },
    Playlist { limit: Option<usize> },
}

/// A running worker thread.
struct Run {
    cancel: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Arc<dyn PlaybackHandle>>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Run {
    fn stop(mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        let current = self.current.lock().take();
        if let Some(handle) = current {
            handle.stop();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Playback worker panicked");
            }
        }
    }
}

/// Playback primitives the action behaviours are built from.
pub struct PlayerCore {
    output: Arc<dyn PlaybackOutput>,
    device_id: String,
    volume: f32,
    playlist: Arc<Mutex<Playlist>>,
    run: Mutex<Option<Run>>,
    overlapping: Mutex<Vec<Arc<dyn PlaybackHandle>>>,
}

impl PlayerCore {
    fn new(output: Arc<dyn PlaybackOutput>, settings: &PlayAudioSettings) -> Self {
        Self {
            output,
            device_id: settings.device_id.clone(),
            volume: settings.volume.clamp(0.0, 1.0),
            playlist: Arc::new(Mutex::new(Playlist::new(
                settings.files.clone(),
                settings.order,
            ))),
            run: Mutex::new(None),
            overlapping: Mutex::new(Vec::new()),
        }
    }

    pub fn is_playing(&self) -> bool {
        let running = self
            .run
            .lock()
            .as_ref()
            .is_some_and(|run| !run.finished.load(Ordering::SeqCst));
        running || self.overlapping.lock().iter().any(|h| !h.is_finished())
    }

    /// Stop the current program and start `program` on a worker thread.
    pub fn start(&self, program: Program) -> Result<(), ClipError> {
        self.stop_current();

        let source = {
            let mut playlist = self.playlist.lock();
            if playlist.is_empty() {
                return Err(ClipError::ConfigurationFailed("playlist is empty".into()));
            }
            match program {
                Program::Once | Program::RepeatOne => Source::Single {
                    path: playlist.next().ok_or_else(|| {
                        ClipError::ConfigurationFailed("playlist is empty".into())
                    })?,
                    repeat: program == Program::RepeatOne,
                },
                Program::RepeatAll => Source::Playlist { limit: None },
                Program::ToEnd => Source::Playlist {
                    limit: Some(playlist.remaining()),
                },
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let current = Arc::new(Mutex::new(None));
        let worker = Worker {
            output: Arc::clone(&self.output),
            device_id: self.device_id.clone(),
            volume: self.volume,
            playlist: Arc::clone(&self.playlist),
            cancel: Arc::clone(&cancel),
            finished: Arc::clone(&finished),
            current: Arc::clone(&current),
        };
        let thread = thread::Builder::new()
            .name("clip-playback".into())
            .spawn(move || worker.run(source))
            .map_err(|e| ClipError::Unknown(format!("failed to spawn playback thread: {}", e)))?;

        *self.run.lock() = Some(Run {
            cancel,
            finished,
            current,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Play the clip at the cursor on top of anything already playing.
    pub fn play_overlapping(&self) -> Result<(), ClipError> {
        let path = self
            .playlist
            .lock()
            .next()
            .ok_or_else(|| ClipError::ConfigurationFailed("playlist is empty".into()))?;
        let handle = self.output.play(&PlaybackRequest {
            path,
            device_id: self.device_id.clone(),
            volume: self.volume,
        })?;
        let mut overlapping = self.overlapping.lock();
        overlapping.retain(|h| !h.is_finished());
        overlapping.push(handle);
        Ok(())
    }

    pub fn stop_current(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            run.stop();
        }
    }

    pub fn stop_all(&self) {
        self.stop_current();
        for handle in self.overlapping.lock().drain(..) {
            handle.stop();
        }
    }

    pub fn rewind(&self) {
        self.playlist.lock().rewind();
    }
}

struct Worker {
    output: Arc<dyn PlaybackOutput>,
    device_id: String,
    volume: f32,
    playlist: Arc<Mutex<Playlist>>,
    cancel: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Arc<dyn PlaybackHandle>>>>,
}

impl Worker {
    fn run(self, source: Source) {
        let mut played = 0usize;
        while !self.cancel.load(Ordering::SeqCst) {
            let path = match &source {
                Source::Single { path, repeat } => (*repeat || played == 0).then(|| path.clone()),
                Source::Playlist { limit } => match limit {
                    Some(limit) if played >= *limit => None,
                    _ => self.playlist.lock().next(),
                },
            };
            let Some(path) = path else {
                break;
            };

            let request = PlaybackRequest {
                path,
                device_id: self.device_id.clone(),
                volume: self.volume,
            };
            let handle = match self.output.play(&request) {
                Ok(handle) => handle,
                Err(e) => {
                    log::error!("Failed to play {}: {}", request.path.display(), e);
                    break;
                }
            };
            *self.current.lock() = Some(Arc::clone(&handle));
            if self.cancel.load(Ordering::SeqCst) {
                handle.stop();
                break;
            }
            handle.wait();
            played += 1;
        }
        self.current.lock().take();
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Playback engine of one button: a playlist, an output, and the behaviour
/// selected by its [`PlaybackAction`].
pub struct AudioPlayer {
    core: PlayerCore,
    action: PlaybackAction,
    behavior: Box<dyn PlaybackBehavior>,
}

impl AudioPlayer {
    pub fn new(output: Arc<dyn PlaybackOutput>, settings: &PlayAudioSettings) -> Self {
        Self {
            core: PlayerCore::new(output, settings),
            action: settings.action,
            behavior: behavior_for(settings.action),
        }
    }

    pub fn action(&self) -> PlaybackAction {
        self.action
    }

    pub fn state(&self) -> PlayerState {
        if self.core.is_playing() {
            PlayerState::Playing
        } else {
            PlayerState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.core.is_playing()
    }

    /// Playlist position of the next clip.
    pub fn cursor(&self) -> usize {
        self.core.playlist.lock().cursor()
    }

    /// Handle a button press.
    pub fn press(&self) -> Result<(), ClipError> {
        log::debug!("Playback press ({:?})", self.action);
        self.behavior.press(&self.core)
    }

    pub fn stop(&self) {
        self.behavior.stop(&self.core);
    }

    /// Apply new settings. Changing the action stops playback.
    pub fn update(&mut self, settings: &PlayAudioSettings) {
        if settings.action != self.action {
            self.behavior.stop(&self.core);
            self.action = settings.action;
            self.behavior = behavior_for(settings.action);
        }
        {
            let mut playlist = self.core.playlist.lock();
            playlist.set_files(settings.files.clone());
            playlist.set_order(settings.order);
        }
        self.core.device_id = settings.device_id.clone();
        self.core.volume = settings.volume.clamp(0.0, 1.0);
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.core.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::PlaylistOrder;
    use crate::test_support::{eventually, MockPlaybackOutput};

    fn settings(action: PlaybackAction, files: &[&str]) -> PlayAudioSettings {
        PlayAudioSettings {
            files: files.iter().map(PathBuf::from).collect(),
            action,
            ..Default::default()
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn player(output: &Arc<MockPlaybackOutput>, action: PlaybackAction) -> AudioPlayer {
        AudioPlayer::new(output.clone(), &settings(action, &["a", "b", "c"]))
    }

    #[test]
    fn play_next_replaces_current_clip() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::PlayNext);

        player.press().unwrap();
        output.wait_for_plays(1);
        player.press().unwrap();

        assert_eq!(output.wait_for_plays(2), paths(&["a", "b"]));
        assert!(eventually(|| output.playing() == 1));
        assert_eq!(player.state(), PlayerState::Playing);
    }

    #[test]
    fn play_stop_toggles() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::PlayStop);

        player.press().unwrap();
        output.wait_for_plays(1);
        assert!(eventually(|| player.is_playing()));

        player.press().unwrap();
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(output.playing(), 0);

        player.press().unwrap();
        assert_eq!(output.wait_for_plays(2), paths(&["a", "b"]));
    }

    #[test]
    fn play_stop_ends_after_one_clip() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::PlayStop);

        player.press().unwrap();
        output.wait_for_plays(1);
        output.finish_current();

        assert!(eventually(|| !player.is_playing()));
        assert_eq!(output.played(), paths(&["a"]));
    }

    #[test]
    fn loop_stop_repeats_one_clip() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::LoopStop);

        player.press().unwrap();
        for n in 1..3 {
            output.wait_for_plays(n);
            output.finish_current();
        }
        assert_eq!(output.wait_for_plays(3), paths(&["a", "a", "a"]));

        player.press().unwrap();
        assert!(!player.is_playing());
        assert_eq!(output.playing(), 0);
    }

    #[test]
    fn loop_all_wraps_playlist() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::LoopAllStop);

        player.press().unwrap();
        for n in 1..4 {
            output.wait_for_plays(n);
            output.finish_current();
        }
        assert_eq!(output.wait_for_plays(4), paths(&["a", "b", "c", "a"]));

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(player.cursor(), 1);
    }

    #[test]
    fn loop_all_reset_rewinds_on_stop() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::LoopAllStopReset);

        player.press().unwrap();
        output.wait_for_plays(1);
        output.finish_current();
        output.wait_for_plays(2);

        player.press().unwrap();
        assert_eq!(player.cursor(), 0);

        player.press().unwrap();
        assert_eq!(output.wait_for_plays(3), paths(&["a", "b", "a"]));
    }

    #[test]
    fn overlap_keeps_previous_clips_playing() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::PlayOverlap);

        player.press().unwrap();
        player.press().unwrap();

        assert_eq!(output.playing(), 2);
        assert_eq!(output.played(), paths(&["a", "b"]));
        player.stop();
        assert_eq!(output.playing(), 0);
    }

    #[test]
    fn continuous_plays_to_end_then_stops() {
        let output = Arc::new(MockPlaybackOutput::new(true));
        let player = player(&output, PlaybackAction::Continuous);

        player.press().unwrap();
        assert!(eventually(|| !player.is_playing()));
        assert_eq!(output.played(), paths(&["a", "b", "c"]));

        player.press().unwrap();
        assert!(eventually(|| !player.is_playing()));
        assert_eq!(output.played().len(), 6);
    }

    #[test]
    fn continuous_stop_keeps_cursor() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let player = player(&output, PlaybackAction::Continuous);

        player.press().unwrap();
        output.wait_for_plays(1);
        output.finish_current();
        output.wait_for_plays(2);
        player.press().unwrap();
        assert!(!player.is_playing());
        assert_eq!(player.cursor(), 2);

        player.press().unwrap();
        assert_eq!(output.wait_for_plays(3), paths(&["a", "b", "c"]));
    }

    #[test]
    fn empty_playlist_is_a_configuration_error() {
        let output = Arc::new(MockPlaybackOutput::new(true));
        let player = AudioPlayer::new(output.clone(), &settings(PlaybackAction::PlayNext, &[]));
        assert!(matches!(player.press(), Err(ClipError::ConfigurationFailed(_))));
    }

    #[test]
    fn changing_action_stops_playback() {
        let output = Arc::new(MockPlaybackOutput::new(false));
        let mut player = player(&output, PlaybackAction::LoopStop);
        player.press().unwrap();
        output.wait_for_plays(1);

        let mut next = settings(PlaybackAction::PlayOverlap, &["x"]);
        next.order = PlaylistOrder::Random;
        player.update(&next);

        assert_eq!(player.action(), PlaybackAction::PlayOverlap);
        assert!(!player.is_playing());
        player.press().unwrap();
        assert_eq!(output.played().last(), Some(&PathBuf::from("x")));
    }
}
