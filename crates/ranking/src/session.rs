//! Session context: what kind of viewing session the user is ranking for.

/// Viewing mood for the current request. `Any` applies no bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionTone {
    #[default]
    Any,
    /// Something short; favors sub-cutoff runtimes.
    Short,
    /// A weeknight watch; mildly favors shorter runtimes.
    Weeknight,
    /// Watching with kids; boosts family fare, penalizes horror.
    Family,
}

impl SessionTone {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Some(SessionTone::Any),
            "short" => Some(SessionTone::Short),
            "weeknight" => Some(SessionTone::Weeknight),
            "family" => Some(SessionTone::Family),
            _ => None,
        }
    }
}

/// Per-request ranking context, passed explicitly into the scorer so no
/// session state hides in module-level globals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext {
    pub tone: SessionTone,
}

impl SessionContext {
    pub fn with_tone(tone: SessionTone) -> Self {
        Self { tone }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_tones_case_insensitively() {
        assert_eq!(SessionTone::parse("Family"), Some(SessionTone::Family));
        assert_eq!(SessionTone::parse("SHORT"), Some(SessionTone::Short));
        assert_eq!(SessionTone::parse("weeknight"), Some(SessionTone::Weeknight));
        assert_eq!(SessionTone::parse("brunch"), None);
    }
}
