//! Shared key derivation for stored media.
//!
//! Callers validate the identifiers first; these functions only format.

/// Extension of the final path segment including the dot, if any.
///
/// `uploads/u1/song.wav` yields `.wav`; `uploads/u1/song` and
/// `uploads/u1/.hidden` yield `None`.
pub fn extension_of(key: &str) -> Option<&str> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 == file_name.len() => None,
        Some(idx) => Some(&file_name[idx..]),
    }
}

/// Canonical location of a track's audio: `media/{user_id}/{track_id}{ext}`.
pub fn media_key(user_id: &str, track_id: &str, ext: &str) -> String {
    format!("media/{}/{}{}", user_id, track_id, ext)
}

/// Directory the encoder writes renditions to, with trailing slash.
pub fn hls_output_prefix(prefix: &str, user_id: &str, track_id: &str) -> String {
    format!("{}/{}/{}/", prefix.trim_matches('/'), user_id, track_id)
}

/// Predicted master playlist key for a track.
pub fn hls_manifest_key(prefix: &str, user_id: &str, track_id: &str) -> String {
    format!("{}master.m3u8", hls_output_prefix(prefix, user_id, track_id))
}
