use octofhir_core::same_instant_or_date;

use super::AttrValue;

/// Rules that hide a planned change when old and new mean the same thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSuppress {
    /// IAM names and IDs compare case-insensitively
    CaseInsensitive,
    /// Empty config for a server-generated field keeps the generated value
    WhenGenerated,
    /// Only ever set by import, never diffed
    ImportedOnly,
    /// RFC3339 timestamps or dates naming the same instant
    SameTime,
}

impl DiffSuppress {
    /// True when the change from `old` to `new` should not be planned.
    pub fn suppress(&self, old: &AttrValue, new: &AttrValue) -> bool {
        if old == new {
            return true;
        }
        match self {
            DiffSuppress::CaseInsensitive => match (old.as_str(), new.as_str()) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            },
            DiffSuppress::WhenGenerated => new.is_empty(),
            DiffSuppress::ImportedOnly => true,
            DiffSuppress::SameTime => match (old.as_str(), new.as_str()) {
                (Some(a), Some(b)) => same_instant_or_date(a, b),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        let s = DiffSuppress::CaseInsensitive;
        assert!(s.suppress(&"Admins".into(), &"admins".into()));
        assert!(!s.suppress(&"admins".into(), &"users".into()));
    }

    #[test]
    fn test_when_generated() {
        let s = DiffSuppress::WhenGenerated;
        assert!(s.suppress(&"8f1c".into(), &AttrValue::Null));
        assert!(s.suppress(&"8f1c".into(), &"".into()));
        assert!(!s.suppress(&"8f1c".into(), &"other".into()));
    }

    #[test]
    fn test_same_time() {
        let s = DiffSuppress::SameTime;
        assert!(s.suppress(
            &"2025-01-01T00:00:00Z".into(),
            &"2025-01-01T01:00:00+01:00".into()
        ));
        assert!(s.suppress(&"2025-01-01T00:00:00Z".into(), &"2025-01-01".into()));
        assert!(!s.suppress(&"2025-01-01".into(), &"2025-01-02".into()));
    }

    #[test]
    fn test_imported_only_always_suppresses() {
        assert!(DiffSuppress::ImportedOnly.suppress(&AttrValue::Null, &"x".into()));
    }
}
