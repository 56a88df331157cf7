//! Delivery of rendered templates
//!
//! Writes content to the target path atomically (temp file in the same
//! directory, then rename), creating parent directories as needed. Mode and
//! ownership are applied only when running with elevated privilege; otherwise
//! they are skipped and logged. An overwritten file keeps its previous mode
//! unless a new one is applied.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use confstage_namespace::Namespace;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Delivery errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file mode '{0}'")]
    InvalidMode(String),

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("failed to change ownership of {path}: {reason}")]
    Ownership { path: PathBuf, reason: String },
}

/// Where and how one template is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub mode: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

impl Target {
    /// Build from merged target metadata.
    ///
    /// Returns `Ok(None)` when there is no non-empty `target`, which means the
    /// template is not built.
    pub fn from_metadata(metadata: &Namespace) -> Result<Option<Self>, DeliveryError> {
        let path = match metadata.get_str("target") {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => return Ok(None),
        };

        let mode = match metadata.get("perms") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_mode(v)?),
        };

        Ok(Some(Self {
            path,
            mode,
            user: owner_field(metadata.get("user")),
            group: owner_field(metadata.get("group")),
        }))
    }
}

fn owner_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a file mode written in octal notation.
///
/// Strings (`"0644"`, `"644"`, `"0o644"`) are octal. Integers are read by
/// their decimal digits as octal notation, so `644` means `0o644`, since YAML
/// files commonly write modes unquoted.
pub fn parse_mode(value: &Value) -> Result<u32, DeliveryError> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        other => return Err(DeliveryError::InvalidMode(other.to_string())),
    };

    let digits = text.strip_prefix("0o").unwrap_or(&text);
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if !digits.is_empty() && mode <= 0o7777 => Ok(mode),
        _ => Err(DeliveryError::InvalidMode(text)),
    }
}

/// Whether ownership and mode changes are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Elevated,
    Unprivileged,
}

impl Privilege {
    /// Privilege of the current process (effective uid 0 is elevated)
    pub fn current() -> Self {
        #[cfg(unix)]
        {
            if nix::unistd::geteuid().is_root() {
                return Privilege::Elevated;
            }
        }
        Privilege::Unprivileged
    }
}

/// What delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Content written
    Written,
    /// Existing file already held identical content; nothing touched
    Unchanged,
}

/// Writes rendered content to targets
#[derive(Debug, Clone)]
pub struct Deliverer {
    privilege: Privilege,
    checksum: bool,
}

impl Deliverer {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            privilege,
            checksum: false,
        }
    }

    /// Skip targets whose current content has the same SHA-256
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn deliver(&self, target: &Target, content: &str) -> Result<DeliveryOutcome, DeliveryError> {
        if self.checksum && is_unchanged(&target.path, content) {
            info!(path = %target.path.display(), "content unchanged, skipping write");
            return Ok(DeliveryOutcome::Unchanged);
        }

        write_atomic(&target.path, content.as_bytes()).map_err(|source| DeliveryError::Write {
            path: target.path.clone(),
            source,
        })?;
        debug!(path = %target.path.display(), bytes = content.len(), "wrote target");

        match self.privilege {
            Privilege::Elevated => self.apply_ownership(target)?,
            Privilege::Unprivileged => {
                if target.mode.is_some() || target.user.is_some() || target.group.is_some() {
                    info!(
                        path = %target.path.display(),
                        "not running with elevated privilege, skipping permissions and ownership"
                    );
                }
            }
        }

        Ok(DeliveryOutcome::Written)
    }

    fn apply_ownership(&self, target: &Target) -> Result<(), DeliveryError> {
        if let Some(mode) = target.mode {
            set_mode(&target.path, mode)?;
            info!(path = %target.path.display(), mode = format!("{:o}", mode), "applied permissions");
        }

        if target.user.is_some() || target.group.is_some() {
            chown(&target.path, target.user.as_deref(), target.group.as_deref())?;
            info!(
                path = %target.path.display(),
                user = target.user.as_deref().unwrap_or("-"),
                group = target.group.as_deref().unwrap_or("-"),
                "applied ownership"
            );
        }

        Ok(())
    }
}

/// SHA-256 of content as hex
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn is_unchanged(path: &Path, content: &str) -> bool {
    match fs::read(path) {
        Ok(existing) => content_digest(&existing) == content_digest(content.as_bytes()),
        Err(_) => false,
    }
}

/// Write-then-rename within the target's directory
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"))?;
    let temp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let result = fs::write(&temp_path, content)
        .and_then(|()| keep_permissions(path, &temp_path))
        .and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Give the temp file the mode of the file it replaces
fn keep_permissions(path: &Path, temp_path: &Path) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(existing) => fs::set_permissions(temp_path, existing.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), DeliveryError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        DeliveryError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), DeliveryError> {
    Ok(())
}

#[cfg(unix)]
fn chown(path: &Path, user: Option<&str>, group: Option<&str>) -> Result<(), DeliveryError> {
    use nix::unistd::{Gid, Group, Uid, User};

    let uid = match user {
        None => None,
        Some(name) => Some(match name.parse::<u32>() {
            Ok(id) => Uid::from_raw(id),
            Err(_) => User::from_name(name)
                .ok()
                .flatten()
                .map(|u| u.uid)
                .ok_or_else(|| DeliveryError::UnknownUser(name.to_string()))?,
        }),
    };

    let gid = match group {
        None => None,
        Some(name) => Some(match name.parse::<u32>() {
            Ok(id) => Gid::from_raw(id),
            Err(_) => Group::from_name(name)
                .ok()
                .flatten()
                .map(|g| g.gid)
                .ok_or_else(|| DeliveryError::UnknownGroup(name.to_string()))?,
        }),
    };

    nix::unistd::chown(path, uid, gid).map_err(|e| DeliveryError::Ownership {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn chown(_path: &Path, _user: Option<&str>, _group: Option<&str>) -> Result<(), DeliveryError> {
    Ok(())
}
