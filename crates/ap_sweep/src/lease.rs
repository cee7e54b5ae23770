//! Single-host sweep lease
//!
//! A JSON file holding `{holder, acquired_at, expires_at}`. Creation uses
//! `create_new`, so two sweeps on one host cannot both hold it. An expired
//! or unreadable lease is taken over by renaming it aside. The file is
//! removed when the lease is released or dropped.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Lease errors
#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Sweep lease {path} is held by {holder} until {expires_at}")]
    Held {
        path: PathBuf,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Lease I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Contents of the lease file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseState {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseState {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Identity written into lease files by this process
#[must_use]
pub fn default_holder() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}:{}", std::process::id())
}

/// A held lease; dropping it releases the file
#[derive(Debug)]
pub struct SweepLease {
    path: PathBuf,
    state: LeaseState,
    released: bool,
}

impl SweepLease {
    /// Take the lease at `path` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Held`] when an unexpired lease exists, or
    /// [`LeaseError::Io`] when the file cannot be read or written.
    pub fn acquire(
        path: &Path,
        holder: impl Into<String>,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Self, LeaseError> {
        let state = LeaseState {
            holder: holder.into(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let io_err = |source| LeaseError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // One takeover attempt: a stale file is moved aside and creation retried.
        for attempt in 0..2 {
            let err = match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let body = serde_json::to_vec_pretty(&state)
                        .map_err(|e| io_err(io::Error::other(e)))?;
                    file.write_all(&body).map_err(io_err)?;
                    debug!(path = %path.display(), holder = %state.holder, "Acquired sweep lease");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        state,
                        released: false,
                    });
                }
                Err(e) => e,
            };
            if err.kind() != io::ErrorKind::AlreadyExists {
                return Err(io_err(err));
            }
            if attempt > 0 {
                break;
            }

            let seen = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err(e)),
            };
            match serde_json::from_slice::<LeaseState>(&seen) {
                Ok(existing) if !existing.is_expired(now) => {
                    return Err(LeaseError::Held {
                        path: path.to_path_buf(),
                        holder: existing.holder,
                        expires_at: existing.expires_at,
                    });
                }
                Ok(existing) => {
                    warn!(
                        path = %path.display(),
                        previous = %existing.holder,
                        "Taking over stale sweep lease"
                    );
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Unreadable sweep lease, taking over"
                    );
                }
            }
            if !take_over_stale(path, &seen).map_err(io_err)? {
                break;
            }
        }

        // Another sweep took the lease between our read and retry.
        match read_state(path) {
            Ok(Some(existing)) => Err(LeaseError::Held {
                path: path.to_path_buf(),
                holder: existing.holder,
                expires_at: existing.expires_at,
            }),
            Ok(None) => Err(io_err(io::Error::from(io::ErrorKind::AlreadyExists))),
            Err(e) => Err(io_err(e)),
        }
    }

    #[must_use]
    pub fn state(&self) -> &LeaseState {
        &self.state
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lease file.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Io`] if the file exists but cannot be removed.
    pub fn release(mut self) -> Result<(), LeaseError> {
        self.released = true;
        remove_if_ours(&self.path, &self.state).map_err(|source| LeaseError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for SweepLease {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = remove_if_ours(&self.path, &self.state)
        {
            warn!(path = %self.path.display(), error = %e, "Failed to release sweep lease");
        }
    }
}

/// Read the lease file; `Ok(None)` when it is missing or not valid JSON
fn read_state(path: &Path) -> io::Result<Option<LeaseState>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Move the lease at `path` aside, provided it still holds `seen`.
///
/// Returns `Ok(false)` when the file changed after it was judged stale. The
/// rename is atomic, so a live lease moved aside by mistake is linked back
/// into place rather than deleted.
fn take_over_stale(path: &Path, seen: &[u8]) -> io::Result<bool> {
    let aside = path.with_extension(format!("stale.{}", std::process::id()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    }

    let unchanged = matches!(fs::read(&aside), Ok(bytes) if bytes == seen);
    if !unchanged {
        match fs::hard_link(&aside, path) {
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => return Err(e),
            _ => {}
        }
    }
    fs::remove_file(&aside)?;
    Ok(unchanged)
}

fn remove_if_ours(path: &Path, ours: &LeaseState) -> io::Result<()> {
    match read_state(path)? {
        Some(current) if current == *ours => match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}
