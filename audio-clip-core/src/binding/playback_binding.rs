use std::sync::Arc;

use crate::models::error::ClipError;
use crate::models::settings::PlayAudioSettings;
use crate::playback::player::AudioPlayer;
use crate::traits::playback_output::PlaybackOutput;
use crate::traits::settings_store::SettingsStore;

/// A "play audio" button driving one [`AudioPlayer`].
pub struct PlaybackBinding {
    output: Arc<dyn PlaybackOutput>,
    settings: Arc<dyn SettingsStore<PlayAudioSettings>>,
    player: Option<AudioPlayer>,
}

impl PlaybackBinding {
    pub fn new(
        output: Arc<dyn PlaybackOutput>,
        settings: Arc<dyn SettingsStore<PlayAudioSettings>>,
    ) -> Self {
        Self {
            output,
            settings,
            player: None,
        }
    }

    pub fn player(&self) -> Option<&AudioPlayer> {
        self.player.as_ref()
    }

    pub fn on_appear(&mut self) -> bool {
        self.reload()
    }

    pub fn on_settings_changed(&mut self) -> bool {
        self.reload()
    }

    pub fn on_key_press(&mut self) -> bool {
        let result = match &self.player {
            Some(player) => player.press(),
            None => Err(ClipError::ConfigurationFailed("playback binding has no settings".into())),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("Playback action failed on key press: {}", e);
                false
            }
        }
    }

    pub fn on_disappear(&mut self) {
        if let Some(player) = self.player.take() {
            player.stop();
        }
    }

    fn reload(&mut self) -> bool {
        let settings = match self.settings.get_settings() {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Playback settings unreadable: {}", e);
                return false;
            }
        };
        match self.player.as_mut() {
            Some(player) => player.update(&settings),
            None => self.player = Some(AudioPlayer::new(Arc::clone(&self.output), &settings)),
        }
        true
    }
}
