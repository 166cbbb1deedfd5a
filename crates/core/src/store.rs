use std::path::PathBuf;

/// Root directory for persisted client state.
pub fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("comlens")
}

/// Fixed storage key for the session token.
pub fn token_path() -> PathBuf {
    data_root().join("session_token.json")
}

/// Handoff record written by a trigger surface and consumed by the
/// controller on startup.
pub fn pending_path() -> PathBuf {
    data_root().join("pending_analysis.json")
}
