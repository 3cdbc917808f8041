//! Resolution of script payloads for the compatibility shim.
//!
//! The native API reads package files itself; the shim cannot, so file
//! payloads are read here and shipped as source. Only paths that stay inside
//! the package install directory are readable.

use std::path::{Component, Path, PathBuf};

use super::request::ScriptPayload;
use super::shim::{ShimFile, ShimScript};

/// Why a payload could not be prepared for the shim.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The payload names no files.
    #[error("payload names no files")]
    Empty,

    /// A file path escapes the package directory.
    #[error("'{0}' is outside the package")]
    OutsidePackage(String),

    /// A file could not be read.
    #[error("failed to read '{name}': {source}")]
    Read {
        /// Package-relative name.
        name: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Turn `payload` into a shim script, reading files below `install_path`.
///
/// # Errors
///
/// Returns [`PayloadError`] if a file is missing, unreadable or outside the
/// package.
pub async fn resolve_payload(
    payload: &ScriptPayload,
    install_path: &Path,
) -> Result<ShimScript, PayloadError> {
    let files = match payload {
        ScriptPayload::Code { source } => {
            return Ok(ShimScript::Code {
                source: source.clone(),
            });
        },
        ScriptPayload::Files { files } => files,
    };
    if files.is_empty() {
        return Err(PayloadError::Empty);
    }

    let root = tokio::fs::canonicalize(install_path)
        .await
        .map_err(|source| PayloadError::Read {
            name: install_path.display().to_string(),
            source,
        })?;

    let mut sources = Vec::with_capacity(files.len());
    for name in files {
        let path = package_path(&root, name)?;
        let resolved = tokio::fs::canonicalize(&path)
            .await
            .map_err(|source| PayloadError::Read {
                name: name.clone(),
                source,
            })?;
        // Symlinks may still point outside.
        if !resolved.starts_with(&root) {
            return Err(PayloadError::OutsidePackage(name.clone()));
        }
        let source = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| PayloadError::Read {
                name: name.clone(),
                source,
            })?;
        sources.push(ShimFile {
            name: name.clone(),
            source,
        });
    }
    Ok(ShimScript::Files { sources })
}

/// Join a package-relative name onto `root`, rejecting absolute paths and
/// parent components.
fn package_path(root: &Path, name: &str) -> Result<PathBuf, PayloadError> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                pushed = true;
            },
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PayloadError::OutsidePackage(name.to_string()));
            },
        }
    }
    if pushed {
        Ok(path)
    } else {
        Err(PayloadError::OutsidePackage(name.to_string()))
    }
}
