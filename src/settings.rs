use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const SETTINGS_FILE: &str = "settings.toml";
const DATA_DIR_NAME: &str = ".timetrack";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse settings.toml: {0}")]
	TomlDecode(#[from] toml::de::Error),
	#[error("failed to encode settings.toml: {0}")]
	TomlEncode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub export_dir: Option<PathBuf>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			log_level: default_log_level(),
			export_dir: None,
		}
	}
}

fn default_log_level() -> String {
	DEFAULT_LOG_LEVEL.to_string()
}

impl Settings {
	/// A missing file means defaults.
	pub fn load(data_dir: &Path) -> Result<Self, SettingsError> {
		let raw = match fs::read_to_string(data_dir.join(SETTINGS_FILE)) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
			Err(err) => return Err(SettingsError::Io(err)),
		};

		Ok(toml::from_str(&raw)?)
	}

	/// Writes a default settings file unless one exists. Returns whether a
	/// file was created.
	pub fn write_default(data_dir: &Path) -> Result<bool, SettingsError> {
		let path = data_dir.join(SETTINGS_FILE);
		if path.exists() {
			return Ok(false);
		}

		fs::create_dir_all(data_dir)?;
		fs::write(&path, toml::to_string_pretty(&Self::default())?)?;
		Ok(true)
	}

	pub fn export_dir(&self, data_dir: &Path) -> PathBuf {
		match &self.export_dir {
			Some(dir) if dir.is_absolute() => dir.clone(),
			Some(dir) => data_dir.join(dir),
			None => data_dir.join("exports"),
		}
	}

	/// `TIMETRACK_LOG` wins over the file.
	pub fn log_level(&self) -> String {
		env::var("TIMETRACK_LOG")
			.ok()
			.filter(|level| !level.trim().is_empty())
			.unwrap_or_else(|| self.log_level.clone())
	}
}

pub fn resolve_data_dir(cli_path: Option<PathBuf>) -> PathBuf {
	pick_data_dir(cli_path, env::var_os("TIMETRACK_HOME"), env::var_os("HOME"))
}

fn pick_data_dir(
	cli_path: Option<PathBuf>,
	env_home: Option<OsString>,
	user_home: Option<OsString>,
) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env_home.filter(|path| !path.is_empty()) {
		return absolutize(PathBuf::from(path));
	}

	if let Some(home) = user_home.filter(|home| !home.is_empty()) {
		return PathBuf::from(home).join(DATA_DIR_NAME);
	}

	absolutize(PathBuf::from(DATA_DIR_NAME))
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	}
}

#[cfg(test)]
mod tests {
	use std::ffi::OsString;
	use std::fs;
	use std::path::PathBuf;

	use tempfile::TempDir;

	use super::{Settings, SettingsError, pick_data_dir};

	#[test]
	fn data_dir_prefers_flag_then_env_then_home() {
		let flag = Some(PathBuf::from("/srv/flag"));
		let env_home = Some(OsString::from("/srv/env"));
		let home = Some(OsString::from("/home/sam"));

		assert_eq!(
			pick_data_dir(flag, env_home.clone(), home.clone()),
			PathBuf::from("/srv/flag")
		);
		assert_eq!(
			pick_data_dir(None, env_home, home.clone()),
			PathBuf::from("/srv/env")
		);
		assert_eq!(
			pick_data_dir(None, Some(OsString::new()), home),
			PathBuf::from("/home/sam/.timetrack")
		);
		assert!(pick_data_dir(None, None, None).is_absolute());
	}

	#[test]
	fn missing_settings_mean_defaults() {
		let dir = TempDir::new().unwrap();
		let settings = Settings::load(dir.path()).expect("defaults");
		assert_eq!(settings, Settings::default());
		assert_eq!(settings.export_dir(dir.path()), dir.path().join("exports"));
	}

	#[test]
	fn reads_partial_settings_file() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("settings.toml"), "export_dir = \"out\"\n").unwrap();

		let settings = Settings::load(dir.path()).expect("settings parse");
		assert_eq!(settings.log_level, "info");
		assert_eq!(settings.export_dir(dir.path()), dir.path().join("out"));
	}

	#[test]
	fn malformed_settings_are_an_error() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("settings.toml"), "log_level = [").unwrap();
		assert!(matches!(
			Settings::load(dir.path()),
			Err(SettingsError::TomlDecode(_))
		));
	}

	#[test]
	fn default_file_is_written_once() {
		let dir = TempDir::new().unwrap();
		let data_dir = dir.path().join("data");
		assert!(Settings::write_default(&data_dir).unwrap());
		assert!(!Settings::write_default(&data_dir).unwrap());
		assert_eq!(Settings::load(&data_dir).unwrap(), Settings::default());
	}
}
