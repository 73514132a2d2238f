//! Configuration: config directory resolution and pipeline settings.
//!
//! Settings come from `fusion_sync.json` in the config directory, with
//! every field defaulted, then a couple of environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::entities::keys::*;
use crate::entities::{Comp, CreatorAttributes, FrameRangeSource, RenderTarget};
use crate::utils::sequences::DEFAULT_PADDING;

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "fusion_sync.json";

pub const ENV_CONFIG_DIR: &str = "FUSION_SYNC_CONFIG_DIR";
pub const ENV_CALLBACK_INTERVAL: &str = "AYON_FUSION_CALLBACK_INTERVAL";
/// Working directory of the current task, set by the launcher
pub const ENV_WORKDIR: &str = "AYON_WORKDIR";

/// Overrides for the default config location.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg, then `FUSION_SYNC_CONFIG_DIR`, then defaults.
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(ENV_CONFIG_DIR).ok().map(PathBuf::from));
        Self { config_dir }
    }

    /// Config directory:
    /// 1. CLI `--config-dir` / `FUSION_SYNC_CONFIG_DIR`
    /// 2. current folder if it holds `fusion_sync.json`
    /// 3. platform config dir (`~/.config/fusion-sync` on Linux)
    /// 4. `.`
    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(current_dir) = std::env::current_dir() {
            if current_dir.join(SETTINGS_FILE).exists() {
                return current_dir;
            }
        }
        if let Some(dir) = dirs_next::config_dir() {
            return dir.join("fusion-sync");
        }
        PathBuf::from(".")
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Create the config directory if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.config_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Sequence and single-image Saver creator options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverCreatorSettings {
    pub temp_rendering_path_template: String,
    pub default_variants: Vec<String>,
    /// `reviewable` and/or `farm_rendering`
    pub instance_attributes: Vec<String>,
    pub image_format: String,
    pub default_frame_range_option: FrameRangeSource,
    /// Frame of single-image savers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_frame: Option<i64>,
}

const RENDER_PATH_TEMPLATE: &str =
    "{workdir}/renders/fusion/{product[name]}/{product[name]}.{frame}.{ext}";
const IMAGE_PATH_TEMPLATE: &str = "{workdir}/renders/fusion/{product[name]}/{product[name]}.{ext}";

impl Default for SaverCreatorSettings {
    fn default() -> Self {
        Self {
            temp_rendering_path_template: RENDER_PATH_TEMPLATE.to_string(),
            default_variants: vec!["Main".to_string(), "Mask".to_string()],
            instance_attributes: vec!["reviewable".to_string(), "farm_rendering".to_string()],
            image_format: "exr".to_string(),
            default_frame_range_option: FrameRangeSource::CurrentTask,
            default_frame: None,
        }
    }
}

impl SaverCreatorSettings {
    fn image_saver_default() -> Self {
        Self {
            temp_rendering_path_template: IMAGE_PATH_TEMPLATE.to_string(),
            default_frame: Some(0),
            ..Self::default()
        }
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.instance_attributes.iter().any(|a| a == name)
    }

    /// Render targets offered on the creator page.
    pub fn render_targets(&self) -> Vec<RenderTarget> {
        let mut targets = vec![RenderTarget::Local, RenderTarget::Frames];
        if self.has_attribute("farm_rendering") {
            targets.push(RenderTarget::Farm);
        }
        targets
    }

    /// Creator attributes of a new instance. Custom range defaults follow
    /// the comp timeline when a comp is open.
    pub fn default_creator_attributes(&self, comp: Option<&dyn Comp>) -> CreatorAttributes {
        let (start, end, handle_start, handle_end) = match comp {
            Some(comp) => {
                let attrs = comp.get_attrs();
                let get = |key: &str| attrs.get_i64(key).unwrap_or(0);
                let (global_start, global_end) = (get(COMPN_GLOBAL_START), get(COMPN_GLOBAL_END));
                (
                    global_start,
                    global_end,
                    get(COMPN_RENDER_START) - global_start,
                    global_end - get(COMPN_RENDER_END),
                )
            }
            None => (1001, 1100, 0, 0),
        };

        CreatorAttributes {
            review: self.has_attribute("reviewable"),
            frame_range_source: self.default_frame_range_option,
            image_format: self.image_format.clone(),
            custom_frame_start: Some(start),
            custom_frame_end: Some(end),
            custom_handle_start: Some(handle_start),
            custom_handle_end: Some(handle_end),
            frame: self.default_frame,
            ..CreatorAttributes::default()
        }
    }

    /// Fill the rendering path template. `{frame}` becomes `padding` zeros.
    pub fn rendering_path(
        &self,
        workdir: &Path,
        product_name: &str,
        product_type: &str,
        ext: &str,
        padding: usize,
    ) -> PathBuf {
        let path = self
            .temp_rendering_path_template
            .replace("{workdir}", &workdir.to_string_lossy())
            .replace("{product[name]}", product_name)
            .replace("{product[type]}", product_type)
            .replace("{subset}", product_name)
            .replace("{family}", product_type)
            .replace("{frame}", &"0".repeat(padding))
            .replace("{ext}", ext);
        PathBuf::from(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateSettings {
    /// Digits of the `{frame}` token in rendering paths
    pub frame_padding: usize,
    pub create_saver: SaverCreatorSettings,
    pub create_image_saver: SaverCreatorSettings,
}

impl Default for CreateSettings {
    fn default() -> Self {
        Self {
            frame_padding: DEFAULT_PADDING,
            create_saver: SaverCreatorSettings::default(),
            create_image_saver: SaverCreatorSettings::image_saver_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionalPluginSettings {
    pub enabled: bool,
    /// Artists may switch the plugin off per instance
    pub optional: bool,
}

impl Default for OptionalPluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub validate_saver_resolution: OptionalPluginSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Poller interval in milliseconds
    pub callback_interval_ms: u64,
    /// Fixed working directory root. When unset the root is resolved at
    /// save time from the task context, then `AYON_WORKDIR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    pub create: CreateSettings,
    pub publish: PublishSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            callback_interval_ms: 1000,
            workdir: None,
            create: CreateSettings::default(),
            publish: PublishSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Settings file of `paths` plus process environment overrides.
    pub fn load(paths: &PathConfig) -> Result<Self> {
        let mut settings = Self::from_file(&paths.config_file(SETTINGS_FILE))?;
        settings.apply_env_with(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `AYON_FUSION_CALLBACK_INTERVAL` as returned by `lookup`.
    /// Unparsable intervals are ignored. `AYON_WORKDIR` changes with the
    /// task and is never copied here.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_CALLBACK_INTERVAL) {
            match u64::from_str(value.trim()) {
                Ok(ms) => self.callback_interval_ms = ms,
                Err(_) => warn!("Ignoring invalid {}: {:?}", ENV_CALLBACK_INTERVAL, value),
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }
}
