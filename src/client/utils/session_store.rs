use keyring::Entry;
use log::warn;
use std::path::PathBuf;

const SERVICE: &str = "roommate_chat";
const USER: &str = "auth_token";
const TOKEN_ENV: &str = "CHAT_AUTH_TOKEN";

fn fallback_enabled() -> bool {
    std::env::var("KEYRING_FALLBACK").unwrap_or_default() == "true"
}

fn fallback_path() -> PathBuf {
    std::path::Path::new("data").join("auth_token.txt")
}

pub fn save_auth_token(token: &str) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, USER);
    match entry.set_password(token) {
        Ok(()) => Ok(()),
        Err(e) if fallback_enabled() => {
            let path = fallback_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, token)?;
            warn!("[CHAT:TOKEN] Keyring unavailable ({}), token persisted to fallback file", e);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("keyring unavailable and file fallback disabled: {}", e)),
    }
}

/// `CHAT_AUTH_TOKEN` wins over the keyring so a session can be forced from
/// the environment.
pub fn load_auth_token() -> Option<String> {
    if let Some(t) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()) {
        return Some(t.trim().to_string());
    }

    let entry = Entry::new(SERVICE, USER);
    match entry.get_password() {
        Ok(t) if !t.trim().is_empty() => Some(t),
        Ok(_) => None,
        Err(_) if fallback_enabled() => std::fs::read_to_string(fallback_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|t| !t.is_empty()),
        Err(_) => None,
    }
}

pub fn clear_auth_token() -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, USER);
    let _ = entry.delete_password();
    if fallback_enabled() {
        let path = fallback_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
