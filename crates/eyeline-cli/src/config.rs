use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Commented template written by `eyeline config init`.
pub const TEMPLATE: &str = r#"# eyeline configuration

# Where the eye position store lives.
db_path = "~/Pictures/eyeline/eyepositions.db"

# Fresh photos straight from the camera, picked up by `eyeline pre`.
drop_dir = "~/Pictures/eyeline/drop"

# Permanent photo storage. File names in here are the keys of the store.
photo_dir = "~/Pictures/eyeline/photos"

# Rendered frames. Must differ from photo_dir.
target_dir = "~/Pictures/eyeline/frames"

# `pre` names photos <prefix>_YYYY-MM-DD_HH-MM-SS.jpg and can move instead of copy.
prefix = "eyeline"
delete = false

# Longest side of the image used for detection and coarse correction.
max_size = 1024
# Side of the zoomed window during fine correction.
zoom_size = 640

# SCRFD models used for the face pass and both eye passes.
model_dir = "~/.local/share/eyeline/models"
face_model = "det_10g.onnx"
eyeglasses_model = "det_10g.onnx"
eye_model = "det_10g.onnx"

# Date caption on rendered frames. Leave font_path out to render without one.
# font_path = "/usr/share/fonts/TTF/DejaVuSans.ttf"
font_size = 64.0
date_format = "%x"
locale = "de_DE"

# Eye anchors as a share of the frame, and the frame size.
offset_pct = [0.43, 0.425]
dest_size = [1920, 1080]

# Optional strftime pattern matching whole photo file names, used when a
# photo carries no EXIF capture time.
# date_format_in_filename = "IMG_%Y%m%d_%H%M%S.jpg"

pos_debug = false
detection_debug = false
"#;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub db_path: PathBuf,
    pub drop_dir: Option<PathBuf>,
    pub photo_dir: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
    pub prefix: Option<String>,
    pub delete: bool,
    pub max_size: u32,
    pub zoom_size: u32,
    pub model_dir: PathBuf,
    pub face_model: String,
    pub eyeglasses_model: String,
    pub eye_model: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub date_format: String,
    pub locale: String,
    pub offset_pct: (f64, f64),
    pub dest_size: (u32, u32),
    pub date_format_in_filename: Option<String>,
    pub pos_debug: bool,
    pub detection_debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            db_path: data_dir.join("eyepositions.db"),
            drop_dir: None,
            photo_dir: None,
            target_dir: None,
            prefix: None,
            delete: false,
            max_size: 1024,
            zoom_size: 640,
            model_dir: data_dir.join("models"),
            face_model: "det_10g.onnx".to_string(),
            eyeglasses_model: "det_10g.onnx".to_string(),
            eye_model: "det_10g.onnx".to_string(),
            font_path: None,
            font_size: 64.0,
            date_format: "%x".to_string(),
            locale: "de_DE".to_string(),
            offset_pct: (0.43, 0.425),
            dest_size: (1920, 1080),
            date_format_in_filename: None,
            pos_debug: false,
            detection_debug: false,
        }
    }
}

impl Config {
    /// Defaults, then the config file, then `EYELINE_*` environment variables.
    ///
    /// A missing file at the default location is fine; an explicitly given
    /// one must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config = Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config file");
            config
        } else if explicit.is_some() {
            bail!("config file {} does not exist", path.display());
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.expand_paths();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override settings from environment lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("EYELINE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("EYELINE_PHOTO_DIR") {
            self.photo_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("EYELINE_DROP_DIR") {
            self.drop_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("EYELINE_TARGET_DIR") {
            self.target_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("EYELINE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("EYELINE_MAX_SIZE") {
            self.max_size = v
                .parse()
                .with_context(|| format!("EYELINE_MAX_SIZE must be a positive integer, got '{v}'"))?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.db_path = expand_home(&self.db_path);
        self.model_dir = expand_home(&self.model_dir);
        for dir in [
            &mut self.drop_dir,
            &mut self.photo_dir,
            &mut self.target_dir,
            &mut self.font_path,
        ]
        .into_iter()
        .flatten()
        {
            *dir = expand_home(dir);
        }
    }

    pub fn locale(&self) -> Result<chrono::Locale> {
        chrono::Locale::try_from(self.locale.as_str()).map_err(|_| anyhow::anyhow!("unknown locale '{}'", self.locale))
    }
}

/// Write the template to `path`, refusing to overwrite.
pub fn init(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, not overwriting", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("eyeline")
        .join("config.toml")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("eyeline")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// `dir` made absolute, if it is set and exists. Logs why not otherwise.
pub fn checked_dir(dir: Option<&Path>, key: &str) -> Option<PathBuf> {
    let Some(dir) = dir else {
        tracing::error!(key, "directory is not configured");
        return None;
    };
    match dir.canonicalize() {
        Ok(abs) if abs.is_dir() => Some(abs),
        _ => {
            tracing::error!(key, path = %dir.display(), "not a valid directory");
            None
        }
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
