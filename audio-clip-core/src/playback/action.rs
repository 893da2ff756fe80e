//! One small behaviour object per [`PlaybackAction`], chosen when the
//! button is bound.

use crate::models::error::ClipError;
use crate::models::settings::PlaybackAction;
use crate::playback::player::{PlayerCore, Program};

/// What a button press and a stop request do for one action type.
pub trait PlaybackBehavior: Send + Sync {
    fn press(&self, player: &PlayerCore) -> Result<(), ClipError>;

    fn stop(&self, player: &PlayerCore) {
        player.stop_all();
    }
}

/// Stop whatever plays and start the next clip.
struct Restart;

impl PlaybackBehavior for Restart {
    fn press(&self, player: &PlayerCore) -> Result<(), ClipError> {
        player.start(Program::Once)
    }
}

/// Start `program` when idle, stop when playing.
struct Toggle {
    program: Program,
    rewind_on_stop: bool,
}

impl PlaybackBehavior for Toggle {
    fn press(&self, player: &PlayerCore) -> Result<(), ClipError> {
        if player.is_playing() {
            self.stop(player);
            Ok(())
        } else {
            player.start(self.program)
        }
    }

    fn stop(&self, player: &PlayerCore) {
        player.stop_all();
        if self.rewind_on_stop {
            player.rewind();
        }
    }
}

/// Start the next clip without touching the ones already playing.
struct Overlap;

impl PlaybackBehavior for Overlap {
    fn press(&self, player: &PlayerCore) -> Result<(), ClipError> {
        player.play_overlapping()
    }
}

pub fn behavior_for(action: PlaybackAction) -> Box<dyn PlaybackBehavior> {
    let toggle = |program, rewind_on_stop| -> Box<dyn PlaybackBehavior> {
        Box::new(Toggle {
            program,
            rewind_on_stop,
        })
    };
    match action {
        PlaybackAction::PlayNext => Box::new(Restart),
        PlaybackAction::PlayStop => toggle(Program::Once, false),
        PlaybackAction::LoopStop => toggle(Program::RepeatOne, false),
        PlaybackAction::LoopAllStop => toggle(Program::RepeatAll, false),
        PlaybackAction::LoopAllStopReset => toggle(Program::RepeatAll, true),
        PlaybackAction::PlayOverlap => Box::new(Overlap),
        PlaybackAction::Continuous => toggle(Program::ToEnd, false),
    }
}
