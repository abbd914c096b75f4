//! Helpers for rendering metrics in the Prometheus exposition format.

use std::io::Write as _;

use unicode_segmentation::UnicodeSegmentation;

/// A sample value that can be written into an exposition buffer.
pub(crate) trait SampleValue {
    fn write_to(&self, buffer: &mut Vec<u8>);
}

impl SampleValue for u64 {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        let mut fmt = itoa::Buffer::new();
        buffer.extend_from_slice(fmt.format(*self).as_bytes());
    }
}

impl SampleValue for f64 {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        write_f64(buffer, *self);
    }
}

/// Writes a float using the canonical tokens of the exposition format.
///
/// Infinities are written as `+Inf`/`-Inf` and NaN as `NaN`.  Finite values use the shortest
/// representation that round-trips, which never falls back to scientific notation.
pub(crate) fn write_f64(buffer: &mut Vec<u8>, value: f64) {
    if value.is_nan() {
        buffer.extend_from_slice(b"NaN");
    } else if value == f64::INFINITY {
        buffer.extend_from_slice(b"+Inf");
    } else if value == f64::NEG_INFINITY {
        buffer.extend_from_slice(b"-Inf");
    } else {
        let _ = write!(buffer, "{}", value);
    }
}

/// Writes a help (description) line in the Prometheus [exposition format].
///
/// `help` is expected to be sanitized already.
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub(crate) fn write_help_line(buffer: &mut Vec<u8>, name: &str, help: &str) {
    buffer.extend_from_slice(b"# HELP ");
    buffer.extend_from_slice(name.as_bytes());
    buffer.push(b' ');
    buffer.extend_from_slice(help.as_bytes());
    buffer.push(b'\n');
}

/// Writes a metric type line in the Prometheus [exposition format].
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub(crate) fn write_type_line(buffer: &mut Vec<u8>, name: &str, metric_type: &str) {
    buffer.extend_from_slice(b"# TYPE ");
    buffer.extend_from_slice(name.as_bytes());
    buffer.push(b' ');
    buffer.extend_from_slice(metric_type.as_bytes());
    buffer.push(b'\n');
}

/// Writes a single sample line in the Prometheus [exposition format].
///
/// `labels` is the pre-rendered label text of the instance (`key="value",...`), possibly empty.
/// When `suffix` is specified it is appended to `name` with an underscore, which is how the
/// `_bucket`, `_sum`, and `_count` series of a histogram are written.  `additional_label` carries a
/// type-specific label such as `le`.
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub(crate) fn write_metric_line<V: SampleValue>(
    buffer: &mut Vec<u8>,
    name: &str,
    suffix: Option<&'static str>,
    labels: &[u8],
    additional_label: Option<(&'static str, &dyn SampleValue)>,
    value: V,
) {
    buffer.extend_from_slice(name.as_bytes());
    if let Some(suffix) = suffix {
        buffer.push(b'_');
        buffer.extend_from_slice(suffix.as_bytes());
    }

    if !labels.is_empty() || additional_label.is_some() {
        buffer.push(b'{');
        buffer.extend_from_slice(labels);

        if let Some((label, label_value)) = additional_label {
            if !labels.is_empty() {
                buffer.push(b',');
            }
            buffer.extend_from_slice(label.as_bytes());
            buffer.extend_from_slice(b"=\"");
            label_value.write_to(buffer);
            buffer.push(b'"');
        }

        buffer.push(b'}');
    }

    buffer.push(b' ');
    value.write_to(buffer);
    buffer.push(b'\n');
}

/// Writes the `+Inf` bucket line of a histogram.
pub(crate) fn write_infinite_bucket_line(
    buffer: &mut Vec<u8>,
    name: &str,
    labels: &[u8],
    count: u64,
) {
    struct PositiveInfinity;

    impl SampleValue for PositiveInfinity {
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(b"+Inf");
        }
    }

    let le_label = Some(("le", &PositiveInfinity as &dyn SampleValue));
    write_metric_line(buffer, name, Some("bucket"), labels, le_label, count);
}

/// Sanitizes a metric name to be valid under the Prometheus [data model].
///
/// Every invalid extended grapheme cluster is replaced by a single underscore, so the result has
/// one character for every visible symbol of the input: an emoji with its variation selector, a
/// flag, or a `\r\n` pair each become one `_`.
///
/// [data model]: https://prometheus.io/docs/concepts/data_model/#metric-names-and-labels
pub fn sanitize_metric_name(name: &str) -> String {
    // The first character must be [a-zA-Z_:], and all subsequent characters must be [a-zA-Z0-9_:].
    sanitize_identifier(name, valid_metric_name_start_character, valid_metric_name_character)
}

/// Sanitizes a label key to be valid under the Prometheus [data model].
///
/// Follows the same replacement rules as [`sanitize_metric_name`], without allowing colons.
///
/// [data model]: https://prometheus.io/docs/concepts/data_model/#metric-names-and-labels
pub fn sanitize_label_key(key: &str) -> String {
    // The first character must be [a-zA-Z_], and all subsequent characters must be [a-zA-Z0-9_].
    sanitize_identifier(key, valid_label_key_start_character, valid_label_key_character)
}

/// Escapes a label value for the Prometheus [exposition format].
///
/// Backslashes, double quotes, and line feeds are escaped; everything else passes through.
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn sanitize_label_value(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => sanitized.push_str("\\\\"),
            '"' => sanitized.push_str("\\\""),
            '\n' => sanitized.push_str("\\n"),
            c => sanitized.push(c),
        }
    }
    sanitized
}

/// Sanitizes help text for a `# HELP` line.
///
/// Control characters, bidirectional formatting characters, and zero-width characters are removed
/// outright, and any remaining backslash is escaped.
pub fn sanitize_description(help: &str) -> String {
    let mut sanitized = String::with_capacity(help.len());
    for c in help.chars() {
        if is_disallowed_in_description(c) {
            continue;
        }
        if c == '\\' {
            sanitized.push_str("\\\\");
        } else {
            sanitized.push(c);
        }
    }
    sanitized
}

fn sanitize_identifier(
    input: &str,
    valid_start: fn(char) -> bool,
    valid: fn(char) -> bool,
) -> String {
    let mut sanitized = String::with_capacity(input.len());

    // Valid characters are all ASCII, so a grapheme is kept only when it is a single valid
    // character.  Anything else, however many code points it spans, becomes one underscore.
    for (idx, grapheme) in input.graphemes(true).enumerate() {
        let mut chars = grapheme.chars();
        let kept = match (chars.next(), chars.next()) {
            (Some(c), None) if idx == 0 => valid_start(c).then_some(c),
            (Some(c), None) => valid(c).then_some(c),
            _ => None,
        };
        sanitized.push(kept.unwrap_or('_'));
    }

    sanitized
}

#[inline]
fn is_disallowed_in_description(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            // Bidirectional formatting.
            '\u{061C}'
                | '\u{200E}'
                | '\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2066}'..='\u{2069}'
                // Zero-width characters.
                | '\u{200B}'
                | '\u{200C}'
                | '\u{200D}'
                | '\u{2060}'
                | '\u{FEFF}'
        )
}

#[inline]
fn valid_metric_name_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_:].
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

#[inline]
fn valid_metric_name_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_:].
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

#[inline]
fn valid_label_key_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_].
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
fn valid_label_key_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_].
    c.is_ascii_alphanumeric() || c == '_'
}
