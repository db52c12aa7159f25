use std::{
    env,
    path::{Path, PathBuf},
};

pub(crate) fn find_ffmpeg() -> Option<PathBuf> {
    let bin = if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };

    if Path::new(bin).exists() {
        return Some(PathBuf::from(bin));
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let x = dir.join(bin);
            x.is_file().then_some(x)
        })
    })
}

/// Shortens a secret so it can appear in debug logs.
pub(crate) fn redact(secret: &str) -> String {
    match secret.char_indices().nth(8) {
        Some((i, _)) => format!("{}...", &secret[..i]),
        None => "***".to_owned(),
    }
}

/// Response bodies end up inside error messages, keep them readable.
pub(crate) fn truncate_body(body: String) -> String {
    const LIMIT: usize = 512;

    match body.char_indices().nth(LIMIT) {
        Some((i, _)) => format!("{}...", &body[..i]),
        None => body,
    }
}
