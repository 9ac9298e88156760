//! Object key derivation
//!
//! Uploaded key: `<input_prefix><unique>-<sanitized filename>`. The derived
//! object's key is `<output_prefix><full uploaded key>` - a pure string
//! transformation the backend is expected to mirror when it writes its
//! output.

use uuid::Uuid;

/// Replace every character outside `[A-Za-z0-9._-]` with '_'.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Fresh random token, generated per upload so retrying the same filename
/// never collides with a previous upload's key.
pub fn fresh_unique_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn upload_key(input_prefix: &str, unique_id: &str, filename: &str) -> String {
    format!("{}{}-{}", input_prefix, unique_id, sanitize_filename(filename))
}

pub fn derived_key(output_prefix: &str, uploaded_key: &str) -> String {
    format!("{}{}", output_prefix, uploaded_key)
}
