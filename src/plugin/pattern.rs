use std::fmt;

/// Role pattern a plugin registers under.
///
/// A pattern is either exact (`router`) or a glob where `*` matches any run
/// of characters (`linux-*`, `*`, `rt*-edge`). Specificity ranks exact above
/// any glob, and globs by how many literal characters they pin down; the
/// registry uses the rank for most-specific-wins resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RolePattern {
    raw: String,
}

impl RolePattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        !self.raw.contains('*')
    }

    /// Whether the pattern matches a device role.
    pub fn matches(&self, role: &str) -> bool {
        if self.is_exact() {
            return self.raw == role;
        }
        let parts: Vec<&str> = self.raw.split('*').collect();
        let mut rest = role;

        // Leading fragment is anchored to the start.
        let first = parts[0];
        if !rest.starts_with(first) {
            return false;
        }
        rest = &rest[first.len()..];

        // Trailing fragment is anchored to the end.
        let last = parts[parts.len() - 1];
        if rest.len() < last.len() || !rest.ends_with(last) {
            return false;
        }
        rest = &rest[..rest.len() - last.len()];

        // Middle fragments must appear in order in what remains.
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
        true
    }

    /// Resolution rank: exact beats glob, then more literal characters
    /// beats fewer. Equal ranks on distinct matching patterns are an
    /// ambiguity, never a silent pick.
    pub fn rank(&self) -> (u8, usize) {
        let exact = u8::from(self.is_exact());
        let literals = self.raw.chars().filter(|c| *c != '*').count();
        (exact, literals)
    }
}

impl fmt::Display for RolePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = RolePattern::new("router");
        assert!(pattern.matches("router"));
        assert!(!pattern.matches("router-edge"));
        assert!(!pattern.matches("route"));
        assert!(pattern.is_exact());
    }

    #[test]
    fn bare_star_matches_everything() {
        let pattern = RolePattern::new("*");
        assert!(pattern.matches("router"));
        assert!(pattern.matches(""));
        assert!(!pattern.is_exact());
        assert_eq!(pattern.rank(), (0, 0));
    }

    #[test]
    fn prefix_glob_matches_suffix_run() {
        let pattern = RolePattern::new("linux-*");
        assert!(pattern.matches("linux-debian"));
        assert!(pattern.matches("linux-"));
        assert!(!pattern.matches("linux"));
        assert!(!pattern.matches("bsd-linux-"));
    }

    #[test]
    fn suffix_glob_matches_prefix_run() {
        let pattern = RolePattern::new("*-edge");
        assert!(pattern.matches("router-edge"));
        assert!(!pattern.matches("edge"));
        assert!(!pattern.matches("router-edge-2"));
    }

    #[test]
    fn middle_glob_anchors_both_ends() {
        let pattern = RolePattern::new("rt*-edge");
        assert!(pattern.matches("rtr-edge"));
        assert!(pattern.matches("rt-edge"));
        assert!(!pattern.matches("gen-edge"));
    }

    #[test]
    fn multi_star_fragments_match_in_order() {
        let pattern = RolePattern::new("a*b*c");
        assert!(pattern.matches("abc"));
        assert!(pattern.matches("axxbyyc"));
        assert!(!pattern.matches("acb"));
    }

    #[test]
    fn exact_outranks_any_glob() {
        let exact = RolePattern::new("rt");
        let glob = RolePattern::new("rt*-very-long-literal");
        assert!(exact.rank() > glob.rank());
    }

    #[test]
    fn glob_rank_counts_literal_chars() {
        assert!(RolePattern::new("linux-*").rank() > RolePattern::new("li*").rank());
        assert_eq!(
            RolePattern::new("rt*").rank(),
            RolePattern::new("*tr").rank()
        );
    }

    #[test]
    fn overlapping_globs_can_share_a_match() {
        let a = RolePattern::new("rt*");
        let b = RolePattern::new("*tr");
        assert!(a.matches("rtr"));
        assert!(b.matches("rtr"));
    }
}
