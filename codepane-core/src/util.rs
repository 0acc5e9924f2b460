use std::path::Path;

use url::Url;

use crate::mode::Mode;

/// Convert a local path to a `file://` URI.
pub fn file_path_to_uri(path: &Path) -> Option<String> {
    if path.is_dir() {
        Url::from_directory_path(path).ok().map(|u| u.to_string())
    } else {
        Url::from_file_path(path).ok().map(|u| u.to_string())
    }
}

/// True for a dotted script identifier path such as `codepaneReceive` or
/// `window.ob.receive`.
pub fn is_script_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => chars
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
                _ => false,
            }
        })
}

/// Pick an editor mode from a file name, falling back to plain text.
pub fn mode_from_path(path: &str) -> Mode {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "json" | "jsonc" | "har" | "geojson" => Mode::Json,
        "xml" | "xsd" | "xsl" | "xslt" | "svg" | "plist" | "wsdl" => Mode::Xml,
        _ => Mode::Plain,
    }
}

/// Pick an editor mode from an HTTP `Content-Type` header value.
pub fn mode_from_content_type(content_type: &str) -> Mode {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence == "application/json" || essence.ends_with("+json") {
        Mode::Json
    } else if essence == "application/xml" || essence == "text/xml" || essence.ends_with("+xml") {
        Mode::Xml
    } else {
        Mode::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_path_by_extension() {
        assert_eq!(mode_from_path("/tmp/body.json"), Mode::Json);
        assert_eq!(mode_from_path("/tmp/BODY.JSON"), Mode::Json);
        assert_eq!(mode_from_path("feed.xml"), Mode::Xml);
        assert_eq!(mode_from_path("notes.txt"), Mode::Plain);
        assert_eq!(mode_from_path("Makefile"), Mode::Plain);
    }

    #[test]
    fn mode_from_content_type_ignores_parameters() {
        assert_eq!(
            mode_from_content_type("application/json; charset=utf-8"),
            Mode::Json
        );
        assert_eq!(mode_from_content_type("application/problem+json"), Mode::Json);
        assert_eq!(mode_from_content_type("application/atom+xml"), Mode::Xml);
        assert_eq!(mode_from_content_type("text/XML"), Mode::Xml);
        assert_eq!(mode_from_content_type("text/html"), Mode::Plain);
        assert_eq!(mode_from_content_type(""), Mode::Plain);
    }

    #[test]
    fn script_paths() {
        assert!(is_script_path("codepaneReceive"));
        assert!(is_script_path("window.ob.$receive_2"));
        assert!(!is_script_path(""));
        assert!(!is_script_path("ob..receive"));
        assert!(!is_script_path("1st"));
        assert!(!is_script_path("alert(1);receive"));
        assert!(!is_script_path("receive "));
    }

    #[test]
    fn file_path_to_uri_existing_dir() {
        let uri = file_path_to_uri(Path::new("/tmp"));
        assert!(uri.is_some());
        assert!(uri.unwrap().starts_with("file:///tmp"));
    }

    #[test]
    fn file_path_to_uri_relative_path_is_none() {
        assert!(file_path_to_uri(Path::new("relative/editor.html")).is_none());
    }
}
