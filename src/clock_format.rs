use std::fmt;

use clap::ValueEnum;

/// Wall-clock format used when stamping per-probe records.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum TimestampFormat {
    /// RFC 3339 with millisecond precision, always UTC.
    #[default]
    #[value(name = "rfc3339")]
    Rfc3339,
    /// Milliseconds since the Unix epoch.
    #[value(name = "unix")]
    Unix,
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimestampFormat::Rfc3339 => write!(f, "rfc3339"),
            TimestampFormat::Unix => write!(f, "unix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format_parsing() {
        assert_eq!(
            TimestampFormat::from_str("rfc3339", false).unwrap(),
            TimestampFormat::Rfc3339
        );
        assert_eq!(
            TimestampFormat::from_str("unix", false).unwrap(),
            TimestampFormat::Unix
        );
        assert!(TimestampFormat::from_str("INVALID", false).is_err());
    }

    #[test]
    fn test_timestamp_format_display() {
        assert_eq!(TimestampFormat::Rfc3339.to_string(), "rfc3339");
        assert_eq!(TimestampFormat::Unix.to_string(), "unix");
    }

    #[test]
    fn test_timestamp_format_case_insensitive() {
        assert_eq!(
            TimestampFormat::from_str("UNIX", true).unwrap(),
            TimestampFormat::Unix
        );
        assert!(TimestampFormat::from_str("UNIX", false).is_err());
    }

    #[test]
    fn test_timestamp_format_default() {
        assert_eq!(TimestampFormat::default(), TimestampFormat::Rfc3339);
    }
}
