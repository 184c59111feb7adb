use core::error::Error;
use std::fmt;
use std::str::FromStr;

use derive_more::Display;

const WILDCARD: &str = "*";

/// One component of a [`Selector`]: an exact literal, or `None` for `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldMatch(Option<String>);

impl FieldMatch {
    pub fn any() -> Self {
        Self(None)
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.is_none()
    }

    /// The literal to match, `None` for the wildcard.
    pub fn literal(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Exact, case-sensitive comparison. The wildcard matches everything.
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.0 {
            None => true,
            Some(expected) => expected == candidate,
        }
    }
}

impl From<&str> for FieldMatch {
    fn from(text: &str) -> Self {
        if text == WILDCARD {
            Self::any()
        } else {
            Self::exact(text)
        }
    }
}

impl fmt::Display for FieldMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal().unwrap_or(WILDCARD))
    }
}

/// Which processes to monitor, written `namespace/pod/container/comm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub namespace: FieldMatch,
    pub pod: FieldMatch,
    pub container: FieldMatch,
    pub comm: FieldMatch,
}

#[derive(Debug, Display)]
#[display("invalid process filter '{input}', expected namespace/pod/container/command")]
pub struct SelectorParseError {
    pub input: String,
}

impl Error for SelectorParseError {}

impl FromStr for Selector {
    type Err = SelectorParseError;

    /// Splits on `/` into at most four parts; the last part keeps any
    /// remaining `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(4, '/').collect();
        let [namespace, pod, container, comm] = parts.as_slice() else {
            return Err(SelectorParseError {
                input: s.to_string(),
            });
        };

        Ok(Self {
            namespace: (*namespace).into(),
            pod: (*pod).into(),
            container: (*container).into(),
            comm: (*comm).into(),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.pod, self.container, self.comm
        )
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn parses_default_filter() {
        let selector: Selector = "default/*/*/*".parse().expect("valid selector");

        assert_eq!(selector.namespace, FieldMatch::exact("default"));
        assert!(selector.pod.is_wildcard());
        assert!(selector.container.is_wildcard());
        assert!(selector.comm.is_wildcard());
    }

    #[test]
    fn last_part_keeps_extra_slashes() {
        let selector: Selector = "ns/pod/ctr/a/b".parse().expect("valid selector");

        assert_eq!(selector.comm, FieldMatch::exact("a/b"));
    }

    #[test]
    fn fewer_than_four_parts_is_rejected() {
        let err = "ns/pod/ctr".parse::<Selector>().expect_err("must fail");

        assert_eq!(err.input, "ns/pod/ctr");
        assert!(err.to_string().contains("namespace/pod/container/command"));
    }

    #[test]
    fn empty_parts_are_literals() {
        let selector: Selector = "///".parse().expect("four empty parts");

        assert_eq!(selector.namespace, FieldMatch::exact(""));
        assert!(!selector.namespace.matches("default"));
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let field = FieldMatch::exact("nginx");

        assert!(field.matches("nginx"));
        assert!(!field.matches("Nginx"));
        assert!(!field.matches("nginx-worker"));
        assert!(FieldMatch::any().matches("anything"));
    }

    #[test]
    fn display_round_trips_the_text_form() {
        let selector: Selector = "kube-system/*/etcd/etcd".parse().expect("valid selector");

        assert_eq!(selector.to_string(), "kube-system/*/etcd/etcd");
    }
}
