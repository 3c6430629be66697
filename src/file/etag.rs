/// An entity tag as found in `ETag`, `If-Match`, `If-None-Match` and
/// `If-Range`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityTag {
    Strong(String),
    Weak(String),
}

impl EntityTag {
    /// Parse a single quoted tag, optionally prefixed by `W/`
    ///
    /// Returns `None` for anything that is not a quoted tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        let (is_weak, quoted) = match tag.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, tag),
        };
        let opaque = quoted.strip_prefix('"')?.strip_suffix('"')?;
        if opaque.contains('"') {
            return None;
        }

        Some(if is_weak {
            EntityTag::Weak(opaque.to_string())
        } else {
            EntityTag::Strong(opaque.to_string())
        })
    }

    /// Parse a comma separated list of tags, skipping malformed entries
    pub fn parse_list(list: &str) -> impl Iterator<Item = EntityTag> + '_ {
        list.split(',').filter_map(EntityTag::parse)
    }

    pub fn get_tag(&self) -> String {
        match self {
            EntityTag::Strong(tag) => format!("\"{}\"", tag),
            EntityTag::Weak(tag) => format!("W/\"{}\"", tag),
        }
    }

    fn is_weak(&self) -> bool {
        matches!(self, EntityTag::Weak(_))
    }

    /// Opaque tags are equal, whatever their strength
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.as_ref() == other.as_ref()
    }

    /// Both tags are strong and their opaque tags are equal
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.is_weak() && !other.is_weak() && self.as_ref() == other.as_ref()
    }
}

impl AsRef<str> for EntityTag {
    fn as_ref(&self) -> &str {
        match self {
            EntityTag::Strong(str) => str.as_str(),
            EntityTag::Weak(str) => str.as_str(),
        }
    }
}

#[cfg(test)]
mod t {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(EntityTag::parse("\"abc\""), Some(EntityTag::Strong("abc".to_owned())));
        assert_eq!(EntityTag::parse(" W/\"abc\" "), Some(EntityTag::Weak("abc".to_owned())));
        assert_eq!(EntityTag::parse("abc"), None);
        assert_eq!(EntityTag::parse("\"a\"b\""), None);
    }

    #[test]
    fn comparisons() {
        let strong = EntityTag::Strong("v1".to_owned());
        let weak = EntityTag::Weak("v1".to_owned());
        assert!(strong.strong_eq(&strong));
        assert!(!strong.strong_eq(&weak));
        assert!(strong.weak_eq(&weak));
        assert!(!strong.weak_eq(&EntityTag::Strong("v2".to_owned())));
    }

    #[test]
    fn list() {
        let tags: Vec<_> = EntityTag::parse_list("\"a\", W/\"b\", junk").collect();
        assert_eq!(tags, vec![EntityTag::Strong("a".to_owned()), EntityTag::Weak("b".to_owned())]);
        assert_eq!(EntityTag::Weak("b".to_owned()).get_tag(), "W/\"b\"");
    }
}
