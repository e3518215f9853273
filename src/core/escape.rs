use super::error::FelError;

/// Escaping policy for text destined for a provider's XML schema.
///
/// Most providers expect accented Latin letters as numeric character
/// references and do not tolerate raw `&`, `'`, `>`, `"`. Digifact takes
/// accents literally but additionally requires `<` escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    /// Escape XML-reserved characters and accented letters as `&#NNN;`.
    NumericRefs,
    /// Escape XML-reserved characters only, including `<`.
    Plain,
}

fn numeric_ref(c: char) -> Option<&'static str> {
    Some(match c {
        'ñ' => "&#241;",
        'Ñ' => "&#209;",
        'á' => "&#225;",
        'é' => "&#233;",
        'í' => "&#237;",
        'ó' => "&#243;",
        'ú' => "&#250;",
        'Á' => "&#193;",
        'É' => "&#201;",
        'Í' => "&#205;",
        'Ó' => "&#211;",
        'Ú' => "&#218;",
        _ => return None,
    })
}

/// Escape a text value according to the provider policy.
pub fn escape_value(value: &str, mode: EscapeMode) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '<' if mode == EscapeMode::Plain => out.push_str("&lt;"),
            _ => match mode {
                EscapeMode::NumericRefs => match numeric_ref(c) {
                    Some(r) => out.push_str(r),
                    None => out.push(c),
                },
                EscapeMode::Plain => out.push(c),
            },
        }
    }
    out
}

/// Escape a required value, rejecting blanks.
///
/// `field` names the offending field in the error; `context` names the
/// block it belongs to (emitter, receiver, invoice line).
pub fn escape_required(
    context: &str,
    field: &str,
    value: &str,
    mode: EscapeMode,
) -> Result<String, FelError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FelError::MissingRequiredField {
            field: format!("{context}.{field}"),
        });
    }
    Ok(escape_value(trimmed, mode))
}

/// Strip dashes out of a tax identifier. Providers reject formatted NITs.
pub fn strip_nit(value: &str) -> String {
    value.chars().filter(|c| *c != '-').collect()
}

/// Replace accented vowels with their bare letters and drop colons.
/// MegaPrint addenda values travel through this instead of escaping.
pub fn strip_accents(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'á' => out.push('a'),
            'Á' => out.push('A'),
            'é' => out.push('e'),
            'É' => out.push('E'),
            'í' => out.push('i'),
            'Í' => out.push('I'),
            'ó' => out.push('o'),
            'Ó' => out.push('O'),
            'ú' => out.push('u'),
            'Ú' => out.push('U'),
            ':' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Reduce rich text to plain text: tags dropped, entities for the common
/// cases decoded, block tags becoming newlines.
pub fn strip_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
                tag.push(t);
            }
            let tag = tag.trim_start_matches('/').to_ascii_lowercase();
            if tag.starts_with("br") || tag.starts_with("p") || tag.starts_with("div") {
                if !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
        } else if c == '&' {
            let mut entity = String::new();
            while let Some(&n) = chars.peek() {
                chars.next();
                if n == ';' {
                    break;
                }
                entity.push(n);
                if entity.len() > 6 {
                    break;
                }
            }
            match entity.as_str() {
                "amp" => out.push('&'),
                "lt" => out.push('<'),
                "gt" => out.push('>'),
                "quot" => out.push('"'),
                "apos" => out.push('\''),
                "nbsp" => out.push(' '),
                other => {
                    out.push('&');
                    out.push_str(other);
                }
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_refs_escape_accents_and_reserved() {
        assert_eq!(
            escape_value("Año & Compañía", EscapeMode::NumericRefs),
            "A&#241;o &amp; Compa&#241;&#237;a"
        );
        assert_eq!(
            escape_value("José > \"Q\"", EscapeMode::NumericRefs),
            "Jos&#233; &gt; &quot;Q&quot;"
        );
    }

    #[test]
    fn numeric_refs_leave_lt_alone() {
        // the schema dialects using this mode never carry '<' through
        // text fields, and the upstream systems reject &lt; there
        assert_eq!(escape_value("a<b", EscapeMode::NumericRefs), "a<b");
    }

    #[test]
    fn plain_mode_keeps_accents_escapes_lt() {
        assert_eq!(escape_value("José<hr>", EscapeMode::Plain), "José&lt;hr&gt;");
    }

    #[test]
    fn required_rejects_blank() {
        let err = escape_required("receptor", "street", "   ", EscapeMode::Plain);
        assert!(matches!(
            err,
            Err(FelError::MissingRequiredField { field }) if field == "receptor.street"
        ));
    }

    #[test]
    fn nit_dashes_stripped() {
        assert_eq!(strip_nit("1234567-8"), "12345678");
        assert_eq!(strip_nit("CF"), "CF");
    }

    #[test]
    fn accent_stripping() {
        assert_eq!(strip_accents("Depósito: Café"), "Deposito Cafe");
    }

    #[test]
    fn html_stripping() {
        assert_eq!(
            strip_html("<p>Pago &amp; env\u{ed}o</p><br/>30 d\u{ed}as"),
            "Pago & env\u{ed}o\n30 d\u{ed}as"
        );
    }
}
