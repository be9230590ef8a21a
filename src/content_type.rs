//! Extension based MIME inference.

/// MIME type for `path` based on its extension, or `None` when the type would
/// only be known as generic binary.
pub fn content_type(path: &str) -> Option<&'static str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "manifest" => "text/cache-manifest",
        "js" => "application/javascript",
        "json" => "application/json",
        "webmanifest" => "application/manifest+json",
        "xml" => "application/xml",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "eot" => "application/vnd.ms-fontobject",
        "ttf" => "font/ttf",
        "woff" => "application/font-woff",
        "woff2" => "application/font-woff2",
        "m4a" => "audio/m4a",
        "mp3" => "audio/mp3",
        _ => return None,
    };
    Some(mime)
}

/// Text content goes through reference rewriting before upload.
pub fn is_text(content_type: &str) -> bool {
    content_type.starts_with("text/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_is_text() {
        let ct = content_type("/reference/basic.md").unwrap();
        assert_eq!(ct, "text/markdown");
        assert!(is_text(ct));
    }

    #[test]
    fn images_are_not_text() {
        assert_eq!(content_type("/static/img/x.PNG"), Some("image/png"));
        assert!(!is_text("image/png"));
    }

    #[test]
    fn unknown_and_missing_extensions() {
        assert_eq!(content_type("/blob.xyz"), None);
        assert_eq!(content_type("/Makefile"), None);
        assert_eq!(content_type("/dir.d/README"), None);
    }
}
