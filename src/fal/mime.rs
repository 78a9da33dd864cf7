use std::path::Path;

/// Content type to declare when uploading a file, chosen by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("zip") => "application/zip",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("safetensors") => "application/octet-stream",
        _ => {
            tracing::debug!(
                "No known content type for {}, using application/octet-stream",
                path.display()
            );
            "application/octet-stream"
        }
    }
}
