#![allow(clippy::too_many_arguments)]
// <METRIC_NAME>:<VALUE>|<TYPE>|@<SAMPLE_RATE>|#<TAG_KEY_1>:<TAG_VALUE_1>,<TAG_2>

/// DogStatsD metric types supported by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    Count,
    Gauge,
    Timing,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Count => "c",
            MetricType::Gauge => "g",
            MetricType::Timing => "ms",
        }
    }
}

/// Metrics naming [rules](https://docs.datadoghq.com/developers/dogstatsd/datagram_shell?tabs=metrics)
/// - Metric names must start with a letter.
/// - Metric names must only contain ASCII alphanumerics, underscores, and periods.
/// - Other characters, including spaces, are converted to underscores.
/// - Unicode is not supported.
pub fn sanitize_metric_name(name: &str) -> String {
    // The first character must be [a-zA-Z_], and all subsequent characters must be [a-zA-Z0-9_.].
    let mut out = String::with_capacity(name.len());
    let mut is_invalid: fn(char) -> bool = invalid_metric_name_start_character;
    for c in name.chars() {
        if is_invalid(c) {
            out.push('_');
        } else {
            out.push(c);
        }
        is_invalid = invalid_metric_name_character;
    }
    out
}

/// Appends a single DogStatsD line for one sample to `buffer`.
///
/// The namespace and name are written verbatim, a `.` separating them unless the namespace
/// already ends with one.  Client tags are written before call tags.  The sample rate is only
/// written when below 1.
pub fn write_metric_line<T>(
    buffer: &mut String,
    namespace: Option<&str>,
    name: &str,
    mtype: MetricType,
    value: T,
    sample_rate: f64,
    client_tags: &[String],
    tags: &[&str],
) where
    T: std::fmt::Display,
{
    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        buffer.push_str(ns);
        if !ns.ends_with('.') {
            buffer.push('.');
        }
    }
    buffer.push_str(name);

    buffer.push(':');
    buffer.push_str(value.to_string().as_str());
    buffer.push('|');
    buffer.push_str(mtype.as_str());

    if sample_rate < 1.0 {
        buffer.push_str("|@");
        buffer.push_str(sample_rate.to_string().as_str());
    }

    let mut all_tags = client_tags
        .iter()
        .map(String::as_str)
        .chain(tags.iter().copied())
        .peekable();
    if all_tags.peek().is_some() {
        buffer.push_str("|#");

        let mut first = true;
        for tag in all_tags {
            if first {
                first = false;
            } else {
                buffer.push(',');
            }
            buffer.push_str(tag);
        }
    }

    buffer.push('\n');
}

#[inline]
fn invalid_metric_name_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_].
    !(c.is_ascii_alphabetic() || c == '_')
}

#[inline]
fn invalid_metric_name_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_.].
    !(c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
