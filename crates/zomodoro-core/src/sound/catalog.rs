//! Track catalog.
//!
//! The built-in catalog can be replaced by a `sounds.toml` in the data
//! directory:
//!
//! ```toml
//! [[sound]]
//! name = "rain"
//! group = "cozy"
//! url = "https://example.com/rain.wav"
//! fallback = "pink"
//! volume = 0.4
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use super::engine::clamp_level;
use super::generators::Texture;
use crate::error::ConfigError;

pub const CATALOG_FILE: &str = "sounds.toml";

pub const DEFAULT_TRACK_VOLUME: f32 = 0.5;

const ASSET_BASE: &str = "https://raw.githubusercontent.com/ZiPPO7777/Zomodoro--Android-App/main/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoundGroup {
    /// Preloaded at startup.
    Cozy,
    Playful,
    Noise,
    #[default]
    Ambience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDescriptor {
    pub name: String,
    #[serde(default)]
    pub group: SoundGroup,
    #[serde(default, rename = "url", skip_serializing_if = "Option::is_none")]
    pub remote: Option<Url>,
    /// Texture played while the remote asset loads, or instead of it.
    pub fallback: Texture,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    DEFAULT_TRACK_VOLUME
}

impl SoundDescriptor {
    pub fn generated(name: &str, group: SoundGroup, texture: Texture) -> Self {
        Self {
            name: name.to_string(),
            group,
            remote: None,
            fallback: texture,
            volume: DEFAULT_TRACK_VOLUME,
        }
    }

    /// Remote track under the default asset host.
    fn hosted(name: &str, group: SoundGroup, path: &str, fallback: Texture) -> Self {
        let remote = Url::parse(ASSET_BASE).and_then(|base| base.join(path)).ok();
        Self {
            remote,
            ..Self::generated(name, group, fallback)
        }
    }

    pub fn kind(&self) -> SourceKind {
        if self.remote.is_some() {
            SourceKind::Remote
        } else {
            SourceKind::Generated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "sound", default)]
    sounds: Vec<SoundDescriptor>,
}

impl Default for Catalog {
    fn default() -> Self {
        use SoundGroup::{Ambience, Cozy, Noise, Playful};
        use Texture::*;

        let sounds = vec![
            SoundDescriptor::hosted("happy-panda", Cozy, "Cozy%26Chill1/HappyPanda.mp4", White),
            SoundDescriptor::hosted("sleepy-bunny", Cozy, "Cozy%26Chill1/SleepyBunny.mp4", Pink),
            SoundDescriptor::hosted("lemon-drop", Cozy, "Cozy%26Chill1/LemonDrop.mp4", Brown),
            SoundDescriptor::hosted("dreamy-fox", Cozy, "Cozy%26Chill1/DreamyFox.mp4", Violet),
            SoundDescriptor::hosted("fluffy-blanket", Cozy, "Cozy%26Chill1/FluffyBlanket.mp4", Pink),
            SoundDescriptor::hosted("cinnamon-toast", Cozy, "Cozy%26Chill1/CinnamonToast.mp4", Brown),
            SoundDescriptor::hosted("bouncy-squirrel", Playful, "Music/BouncySquirrel.mp4", Cafe),
            SoundDescriptor::hosted("jellybean-jump", Playful, "Music/JellybeanJump.mp4", Fireplace),
            SoundDescriptor::hosted("sprinkles-dance", Playful, "Music/SprinklesDance.mp4", Library),
            SoundDescriptor::hosted("giggle-goose", Playful, "GiggleGoose.mp4", Birds),
            SoundDescriptor::hosted("rainbow-hamster", Playful, "Music/RainbowHamster.mp4", Cafe),
            SoundDescriptor::hosted("cherry-pop", Playful, "Music/CherryPop.mp4", Fireplace),
            SoundDescriptor::generated("white-noise", Noise, White),
            SoundDescriptor::generated("pink-noise", Noise, Pink),
            SoundDescriptor::generated("brown-noise", Noise, Brown),
            SoundDescriptor::generated("violet-noise", Noise, Violet),
            SoundDescriptor::generated("cafe", Ambience, Cafe),
            SoundDescriptor::generated("fireplace", Ambience, Fireplace),
            SoundDescriptor::generated("library", Ambience, Library),
            SoundDescriptor::generated("birds", Ambience, Birds),
            SoundDescriptor::generated("fan", Ambience, Fan),
            SoundDescriptor::generated("train", Ambience, Train),
        ];
        Self { sounds }
    }
}

impl Catalog {
    /// Build from descriptors. Names must be unique; volumes are clamped.
    pub fn new(sounds: Vec<SoundDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut sounds = sounds;
        for sound in &mut sounds {
            if sound.name.trim().is_empty() {
                return Err(ConfigError::ParseFailed("sound name must not be empty".into()));
            }
            if !seen.insert(sound.name.clone()) {
                return Err(ConfigError::ParseFailed(format!("duplicate sound '{}'", sound.name)));
            }
            sound.volume = clamp_level(sound.volume);
        }
        Ok(Self { sounds })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let parsed: Catalog = toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::new(parsed.sounds)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Load `sounds.toml` from `dir`, or the built-in catalog when there is
    /// no such file.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CATALOG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let catalog = Self::from_toml(&content)?;
                tracing::info!(path = %path.display(), tracks = catalog.len(), "loaded sound catalog");
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SoundDescriptor> {
        self.sounds.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundDescriptor> {
        self.sounds.iter()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Names of the tracks in `group`, in catalog order.
    pub fn group(&self, group: SoundGroup) -> Vec<String> {
        self.sounds
            .iter()
            .filter(|s| s.group == group)
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_twelve_remote_and_ten_generated() {
        let catalog = Catalog::default();
        let remote = catalog.iter().filter(|s| s.kind() == SourceKind::Remote).count();
        let generated = catalog.iter().filter(|s| s.kind() == SourceKind::Generated).count();
        assert_eq!(remote, 12);
        assert_eq!(generated, 10);
        assert_eq!(catalog.group(SoundGroup::Cozy).len(), 6);
    }

    #[test]
    fn hosted_urls_keep_escaped_path() {
        let catalog = Catalog::default();
        let panda = catalog.get("happy-panda").unwrap();
        assert_eq!(
            panda.remote.as_ref().unwrap().as_str(),
            "https://raw.githubusercontent.com/ZiPPO7777/Zomodoro--Android-App/main/Cozy%26Chill1/HappyPanda.mp4"
        );
        assert_eq!(catalog.get("giggle-goose").unwrap().fallback, Texture::Birds);
    }

    #[test]
    fn parses_toml_catalog() {
        let catalog = Catalog::from_toml(
            r#"
            [[sound]]
            name = "rain"
            group = "cozy"
            url = "http://localhost/rain.wav"
            fallback = "pink"
            volume = 1.7

            [[sound]]
            name = "hum"
            fallback = "fan"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        let rain = catalog.get("rain").unwrap();
        assert_eq!(rain.kind(), SourceKind::Remote);
        assert_eq!(rain.volume, 1.0);
        let hum = catalog.get("hum").unwrap();
        assert_eq!(hum.kind(), SourceKind::Generated);
        assert_eq!(hum.group, SoundGroup::Ambience);
        assert_eq!(hum.volume, DEFAULT_TRACK_VOLUME);
    }

    #[test]
    fn nan_volume_is_silenced() {
        let catalog = Catalog::from_toml(
            r#"
            [[sound]]
            name = "hiss"
            fallback = "white"
            volume = nan
            "#,
        )
        .unwrap();
        assert_eq!(catalog.get("hiss").unwrap().volume, 0.0);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Catalog::from_toml(
            r#"
            [[sound]]
            name = "a"
            fallback = "white"
            [[sound]]
            name = "a"
            fallback = "brown"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_file_means_default_catalog() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Catalog::load(dir.path()).unwrap(), Catalog::default());
    }

    #[test]
    fn file_catalog_replaces_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CATALOG_FILE),
            "[[sound]]\nname = \"only\"\nfallback = \"train\"\n",
        )
        .unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("happy-panda").is_none());
    }

    #[test]
    fn exported_toml_parses_back() {
        let catalog = Catalog::default();
        let text = catalog.to_toml().unwrap();
        assert_eq!(Catalog::from_toml(&text).unwrap(), catalog);
    }
}
