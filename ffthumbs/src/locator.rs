//! ffmpeg / ffprobe discovery and version checks.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use tracing::{debug, info};

use crate::{Error, Result};

/// Oldest ffmpeg release the generated filter graphs are known to work with.
pub const MIN_FFMPEG_VERSION: Version = Version::new(5, 0, 0);

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Accepts `6`, `6.1`, `6.1.1` and `n6.1.1`; missing components are zero.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('n').unwrap_or(trimmed);

        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in digits.split('.').filter(|p| !p.is_empty()) {
            if count == parts.len() {
                break;
            }
            parts[count] = part
                .parse()
                .map_err(|_| Error::version(format!("invalid version number: {s}")))?;
            count += 1;
        }

        if count == 0 {
            return Err(Error::version(format!("invalid version number: {s}")));
        }

        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

/// Platform-specific executable file name.
fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.to_ascii_lowercase().ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Look `name` up in the directories listed in `PATH`.
pub fn find_binary(name: &str) -> Result<PathBuf> {
    let path_var = env::var_os("PATH")
        .ok_or_else(|| Error::locate(name, "PATH environment variable is not set"))?;
    let file_name = executable_name(name);

    env::split_paths(&path_var)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
        .inspect(|found| debug!(path = %found.display(), "Found {}", name))
        .ok_or_else(|| Error::locate(name, "binary not found in PATH"))
}

/// Use the configured path when there is one, otherwise search `PATH`.
fn resolve(configured: Option<&Path>, name: &str) -> Result<PathBuf> {
    match configured {
        Some(path) if !path.as_os_str().is_empty() => Ok(path.to_path_buf()),
        _ => find_binary(name),
    }
}

/// Extract the release number from `<name> -version` output.
pub fn parse_version_output(name: &str, output: &str) -> Result<Version> {
    let pattern = Regex::new(&format!(r"{} version n?([0-9][0-9.]*)", regex::escape(name)))
        .map_err(|e| Error::version(format!("invalid version pattern: {e}")))?;

    let raw = pattern
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::version(format!("cannot find {name} version")))?;

    raw.parse()
}

/// Run `<path> -version` and parse the reported release.
pub fn binary_version(path: &Path, name: &str) -> Result<Version> {
    let output = process_utils::std_command(path)
        .arg("-version")
        .env("LC_ALL", "C")
        .output()
        .map_err(|source| Error::Spawn {
            program: process_utils::program_name(path),
            source,
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(Error::version(format!(
            "cannot check {name} version: {}",
            text.trim()
        )));
    }

    parse_version_output(name, &text)
}

/// Resolve ffmpeg and make sure it is recent enough.
pub fn verified_ffmpeg_path(configured: Option<&Path>) -> Result<PathBuf> {
    let path = resolve(configured, "ffmpeg")?;
    let version = binary_version(&path, "ffmpeg")?;

    if version < MIN_FFMPEG_VERSION {
        return Err(Error::version(format!(
            "ffmpeg is too old: required {MIN_FFMPEG_VERSION}, current {version}"
        )));
    }

    info!(path = %path.display(), %version, "Using ffmpeg");
    Ok(path)
}

/// Resolve ffprobe. No version requirement applies.
pub fn ffprobe_path(configured: Option<&Path>) -> Result<PathBuf> {
    resolve(configured, "ffprobe")
}
