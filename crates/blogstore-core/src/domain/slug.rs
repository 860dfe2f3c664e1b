//! URL-safe slug derivation.

const SEPARATOR: char = '-';

/// Derive a lowercase, ASCII, dash-separated slug from free text.
///
/// Deterministic: the same input always yields the same slug. Accented Latin
/// letters are folded to their base letter, `@` is spelled out as `at`, runs
/// of whitespace and ASCII punctuation collapse into one dash, and any other
/// symbol is dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    let push_word = |slug: &mut String, word: &str, pending: &mut bool| {
        if *pending && !slug.is_empty() {
            slug.push(SEPARATOR);
        }
        *pending = false;
        slug.push_str(word);
    };

    for ch in text.chars() {
        if ch == '@' {
            pending_separator = true;
            push_word(&mut slug, "at", &mut pending_separator);
            pending_separator = true;
            continue;
        }

        match fold(ch) {
            Some(folded) => {
                let mut buf = [0u8; 4];
                push_word(&mut slug, folded.encode_utf8(&mut buf), &mut pending_separator);
            }
            None => {
                if ch.is_whitespace() || ch.is_ascii_punctuation() {
                    pending_separator = true;
                }
            }
        }
    }

    slug
}

/// Map a character to its lowercase ASCII alphanumeric form, if it has one.
fn fold(ch: char) -> Option<char> {
    if ch.is_ascii_alphanumeric() {
        return Some(ch.to_ascii_lowercase());
    }
    let folded = match ch.to_lowercase().next().unwrap_or(ch) {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_title() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn test_collapses_punctuation_and_trims() {
        assert_eq!(slugify("  Rust -- is, like... GREAT!  "), "rust-is-like-great");
    }

    #[test]
    fn test_folds_accents() {
        assert_eq!(slugify("Publicación número Ñandú"), "publicacion-numero-nandu");
    }

    #[test]
    fn test_at_sign_is_spelled_out() {
        assert_eq!(slugify("ping me@home"), "ping-me-at-home");
    }

    #[test]
    fn test_output_is_url_safe_and_deterministic() {
        let titles = [
            "Post para el usuario 3",
            "¿Qué tal? 100% útil",
            "tabs\tand\nnewlines",
            "emoji 🚀 rocket",
        ];
        for title in titles {
            let slug = slugify(title);
            assert_eq!(slug, slugify(title));
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "{slug}"
            );
            assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            assert!(!slug.contains("--"));
        }
    }

    #[test]
    fn test_symbols_only_yields_empty() {
        assert_eq!(slugify("!!! ???"), "");
    }
}
