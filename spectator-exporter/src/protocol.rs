//! The text line protocol.
//!
//! Every measurement becomes one line of the form `<symbol>:<name>[,<key>=<value>...]:<value>`,
//! with tags sorted by key.  The symbol tells the agent how to combine values: `c` for values that
//! add up, `m` for maximums and `g` for gauges.  A gauge with a time to live carries it in whole
//! seconds after the symbol, as in `g,300`.

use spectator::{Id, Measurement, Op};
use thiserror::Error;

/// Errors that could occur while parsing a protocol line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not have a symbol, an identity and a value separated by `:`.
    #[error("invalid protocol line '{line}': expected <symbol>:<id>:<value>")]
    MissingSegment {
        /// The offending line.
        line: String,
    },

    /// A tag is not of the form `<key>=<value>`.
    #[error("invalid tag '{tag}' in protocol line '{line}'")]
    InvalidTag {
        /// The offending tag.
        tag: String,
        /// The offending line.
        line: String,
    },
}

#[inline]
fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '^')
}

fn write_sanitized(buf: &mut String, s: &str) {
    buf.extend(s.chars().map(|c| if is_valid_char(c) { c } else { '_' }));
}

/// Replaces every character the agent does not accept with `_`.
pub fn sanitize(s: &str) -> String {
    let mut buf = String::with_capacity(s.len());
    write_sanitized(&mut buf, s);
    buf
}

/// Returns the protocol symbol for a measurement.
pub fn symbol(measurement: &Measurement) -> char {
    match measurement.statistic() {
        Some(statistic) if statistic.is_gauge() => 'g',
        _ => match measurement.op() {
            Op::Max => 'm',
            _ => 'c',
        },
    }
}

/// Formats a numeric value for the wire.
///
/// Integral values are written without a fractional part.
pub(crate) struct ValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl ValueFormatter {
    pub fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    // 2^53, past which not every integer has an exact f64 representation.
    const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

    pub fn format(&mut self, value: f64) -> &str {
        if value.fract() == 0.0 && value.abs() <= Self::MAX_EXACT_INT {
            self.int_writer.format(value as i64)
        } else {
            self.float_writer.format(value)
        }
    }
}

/// Appends the protocol line for `measurement` to `buf`, without a trailing newline.
pub(crate) fn write_line(buf: &mut String, formatter: &mut ValueFormatter, measurement: &Measurement) {
    let id = measurement.id();
    let symbol = symbol(measurement);
    buf.push(symbol);
    if let Some(ttl) = measurement.ttl().filter(|_| symbol == 'g') {
        buf.push(',');
        buf.push_str(itoa::Buffer::new().format(ttl.as_secs()));
    }
    buf.push(':');
    write_sanitized(buf, id.name());
    for (key, value) in id.tags() {
        buf.push(',');
        write_sanitized(buf, key);
        buf.push('=');
        write_sanitized(buf, value);
    }
    buf.push(':');
    buf.push_str(formatter.format(measurement.value()));
}

/// Formats the protocol line for `measurement`.
///
/// ```
/// use spectator::{Id, Measurement};
/// use spectator_exporter::protocol::format_line;
///
/// let id = Id::new("server requests", [("statistic", "count"), ("status", "200")]);
/// assert_eq!(format_line(&Measurement::new(id, 3.0)), "c:server_requests,statistic=count,status=200:3");
/// ```
pub fn format_line(measurement: &Measurement) -> String {
    let mut buf = String::new();
    write_line(&mut buf, &mut ValueFormatter::new(), measurement);
    buf
}

/// Splits a protocol line into its symbol, identity and value.
///
/// Optional parts after the symbol, such as `g,300` gauge TTLs, are dropped.
///
/// # Errors
///
/// If the line is not made of three `:`-separated segments, or a tag has no `=`, an error is
/// returned.
pub fn parse_line(line: &str) -> Result<(String, Id, String), ParseError> {
    let mut segments = line.splitn(3, ':');
    let (symbol_segment, id_segment, value) = match (segments.next(), segments.next(), segments.next()) {
        (Some(s), Some(i), Some(v)) => (s, i, v),
        _ => return Err(ParseError::MissingSegment { line: line.to_string() }),
    };

    let symbol = symbol_segment.split(',').next().unwrap_or_default();
    let mut parts = id_segment.split(',');
    let name = parts.next().unwrap_or_default();

    let mut tags = Vec::new();
    for tag in parts {
        match tag.split_once('=') {
            Some((key, value)) => tags.push((key, value)),
            None => return Err(ParseError::InvalidTag { tag: tag.to_string(), line: line.to_string() }),
        }
    }

    Ok((symbol.to_string(), Id::new(name, tags), value.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use spectator::{Id, Measurement};

    use super::{format_line, parse_line, sanitize, ParseError, ValueFormatter};

    fn measurement(stat: &str, value: f64) -> Measurement {
        Measurement::new(Id::new("test", [("statistic", stat)]), value)
    }

    #[test]
    fn symbols() {
        assert_eq!(format_line(&measurement("count", 1.0)), "c:test,statistic=count:1");
        assert_eq!(format_line(&measurement("totalTime", 0.5)), "c:test,statistic=totalTime:0.5");
        assert_eq!(format_line(&measurement("percentile", 2.0)), "c:test,statistic=percentile:2");
        assert_eq!(format_line(&measurement("max", 7.0)), "m:test,statistic=max:7");
        assert_eq!(format_line(&measurement("gauge", 42.5)), "g:test,statistic=gauge:42.5");
        assert_eq!(format_line(&measurement("activeTasks", 2.0)), "g:test,statistic=activeTasks:2");
        assert_eq!(format_line(&measurement("duration", 0.25)), "g:test,statistic=duration:0.25");
    }

    #[test]
    fn gauge_ttl_follows_symbol() {
        let gauge = measurement("gauge", 1.0).with_ttl(Some(Duration::from_secs(300)));
        let line = format_line(&gauge);
        assert_eq!(line, "g,300:test,statistic=gauge:1");
        assert_eq!(parse_line(&line).unwrap().0, "g");

        // Only gauges carry a time to live.
        let count = measurement("count", 1.0).with_ttl(Some(Duration::from_secs(300)));
        assert_eq!(format_line(&count), "c:test,statistic=count:1");
    }

    #[test]
    fn invalid_characters_are_replaced() {
        let id = Id::new("test`!@#$%^&*()-=~_+[]{}\\|;:'\",<.>/?foo", [("tag1,:=", "value1,:=")]);
        let line = format_line(&Measurement::new(id.with_tag("statistic", "count"), 1.0));
        assert_eq!(line, "c:test______^____-_~______________.___foo,statistic=count,tag1___=value1___:1");
    }

    #[test]
    fn sanitize_keeps_valid_characters() {
        assert_eq!(sanitize("a-b.c_d~e^F9"), "a-b.c_d~e^F9");
        assert_eq!(sanitize("a b/c"), "a_b_c");
    }

    #[test]
    fn large_and_fractional_values() {
        let mut formatter = ValueFormatter::new();
        assert_eq!(formatter.format(0.0), "0");
        assert_eq!(formatter.format(-3.0), "-3");
        assert_eq!(formatter.format(1.25), "1.25");
        assert_eq!(formatter.format(1e20), "1e20");
    }

    #[test]
    fn parse_counter_line() {
        let (symbol, id, value) = parse_line("c:counter,foo=bar,statistic=count:1").unwrap();
        assert_eq!(symbol, "c");
        assert_eq!(id, Id::new("counter", [("foo", "bar"), ("statistic", "count")]));
        assert_eq!(value, "1");
    }

    #[test]
    fn parse_drops_symbol_options() {
        let (symbol, id, value) = parse_line("g,300:gauge:42").unwrap();
        assert_eq!(symbol, "g");
        assert_eq!(id, Id::from_name("gauge"));
        assert_eq!(value, "42");
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert_eq!(
            parse_line("c:counter"),
            Err(ParseError::MissingSegment { line: "c:counter".to_string() })
        );
        assert!(matches!(parse_line("c:counter,foo:1"), Err(ParseError::InvalidTag { .. })));
    }

    proptest! {
        #[test]
        fn formatted_lines_parse_back(
            name in "[a-zA-Z0-9._]{1,20}",
            tags in proptest::collection::btree_map("[a-z]{2,8}", "[a-zA-Z0-9]{1,8}", 0..4),
            value in 1u32..1_000_000,
        ) {
            let id = Id::new(name, tags).with_tag("statistic", "count");
            let line = format_line(&Measurement::new(id.clone(), f64::from(value)));
            let (symbol, parsed, parsed_value) = parse_line(&line).unwrap();
            prop_assert_eq!(symbol, "c");
            prop_assert_eq!(parsed, id);
            prop_assert_eq!(parsed_value, value.to_string());
        }
    }
}
