use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::info;

/// Basic-auth header value for the tracker: the token is the username and the
/// password is empty, so it is encoded as `token:`.
pub fn encode_basic_auth(token: &str) -> String {
    let user_pass = if token.ends_with(':') {
        token.to_string()
    } else {
        format!("{token}:")
    };
    STANDARD.encode(user_pass.as_bytes())
}

/// Inverse of [`encode_basic_auth`]: recovers the bare token.
pub fn decode_basic_auth(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("Basic auth value is not valid base64")?;
    let user_pass = String::from_utf8(bytes).context("Basic auth value is not valid UTF-8")?;
    Ok(user_pass.strip_suffix(':').unwrap_or(&user_pass).to_string())
}

/// Saved tracker token: `~/.meetbill/tracker_token`.
pub fn default_token_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".meetbill").join("tracker_token"))
}

/// Persist the tracker token (base64, not encrypted).
pub fn save_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, STANDARD.encode(token.trim().as_bytes()))
        .with_context(|| format!("Failed to write token file: {}", path.display()))?;
    restrict_permissions(path)?;
    info!("Saved tracker token to {}", path.display());
    Ok(())
}

/// Load a saved token. `Ok(None)` when no token has been saved.
pub fn load_token(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let encoded = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .with_context(|| format!("Token file is corrupt: {}", path.display()))?;
    let token = String::from_utf8(bytes).context("Saved token is not valid UTF-8")?;
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(token))
}

/// Remove the saved token. Returns whether a file was deleted.
pub fn clear_token(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path)
        .with_context(|| format!("Failed to remove token file: {}", path.display()))?;
    Ok(true)
}

/// Show only the ends of a secret.
pub fn redact(secret: &str) -> String {
    if secret.len() > 8 && secret.is_ascii() {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "****".to_string()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
