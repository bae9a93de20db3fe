use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::PreprocessError;

/// A caller-supplied image after its transport encoding is peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// `http(s)` URL the provider fetches itself.
    Remote(String),
    /// Raw encoded bytes from a data URL or bare base64.
    Inline(Vec<u8>),
}

/// Accepts `data:image/...;base64,` URLs, bare base64 and `http(s)` URLs.
pub fn parse_input(raw: &str) -> Result<ImageInput, PreprocessError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PreprocessError::Empty);
    }

    let lower = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(ImageInput::Remote(trimmed.to_string()));
    }

    let payload = if lower.starts_with("data:") {
        let (header, body) = trimmed
            .split_once(',')
            .ok_or_else(|| PreprocessError::Unparseable("data URL without payload".into()))?;
        if !header.ends_with(";base64") {
            return Err(PreprocessError::Unparseable(
                "only base64 data URLs are supported".into(),
            ));
        }
        body
    } else {
        trimmed
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| PreprocessError::Unparseable(format!("invalid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }
    Ok(ImageInput::Inline(bytes))
}

/// Wrap bytes as a data URL with the given MIME subtype token.
pub fn to_data_url(bytes: &[u8], mime_token: &str) -> String {
    format!("data:image/{mime_token};base64,{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_urls_pass_through() {
        assert_eq!(
            parse_input(" https://cdn.example.com/a.jpg ").unwrap(),
            ImageInput::Remote("https://cdn.example.com/a.jpg".into())
        );
        assert!(matches!(
            parse_input("HTTP://example.com/x.png").unwrap(),
            ImageInput::Remote(_)
        ));
    }

    #[test]
    fn data_url_decodes() {
        let url = to_data_url(b"abc", "png");
        assert_eq!(url, "data:image/png;base64,YWJj");
        assert_eq!(parse_input(&url).unwrap(), ImageInput::Inline(b"abc".to_vec()));
    }

    #[test]
    fn bare_base64_with_newlines() {
        assert_eq!(
            parse_input("YW\nJj").unwrap(),
            ImageInput::Inline(b"abc".to_vec())
        );
    }

    #[test]
    fn empty_and_garbage_rejected() {
        assert!(matches!(parse_input("   "), Err(PreprocessError::Empty)));
        assert!(matches!(
            parse_input("data:image/png;base64,"),
            Err(PreprocessError::Empty)
        ));
        assert!(matches!(
            parse_input("not base64 at all!"),
            Err(PreprocessError::Unparseable(_))
        ));
        assert!(matches!(
            parse_input("data:text/plain,hello"),
            Err(PreprocessError::Unparseable(_))
        ));
    }
}
