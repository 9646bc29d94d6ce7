//! Clip container selection

/// Container preference for recorded clips, most preferred first.
///
/// The empty entry stands for the platform default and is always supported.
pub const PREFERRED_MIME_TYPES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/mp4",
    "audio/wav",
    "",
];

/// What the empty preference resolves to
pub const PLATFORM_DEFAULT_MIME_TYPE: &str = "audio/wav";

/// Pick the first supported container, first match wins
pub fn select_mime_type<S, F>(preferences: &[S], is_supported: F) -> String
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    preferences
        .iter()
        .map(|p| p.as_ref())
        .find(|p| p.is_empty() || is_supported(p))
        .filter(|p| !p.is_empty())
        .unwrap_or(PLATFORM_DEFAULT_MIME_TYPE)
        .to_string()
}

/// Containers the local encoder can produce
pub fn locally_supported(mime: &str) -> bool {
    mime == "audio/wav"
}
