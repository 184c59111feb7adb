use core::error::Error;

use derive_more::Display;
use error_stack::Report;

#[derive(Debug, Display)]
pub enum NamespaceError {
    #[display("pid namespace of process {pid} is unavailable")]
    NamespaceUnavailable { pid: u32 },
    #[display("malformed pid namespace link '{link}'")]
    MalformedNamespaceLink { link: String },
}

impl Error for NamespaceError {}

/// Inode number identifying a PID namespace, as found in `/proc/<pid>/ns/pid`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("pid:[{_0}]")]
pub struct PidNamespace(pub u64);

impl PidNamespace {
    /// Parses the target of an `ns/pid` link, `pid:[<inode>]`.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::MalformedNamespaceLink`] if `link` is not of that form
    pub fn from_link(link: &str) -> Result<Self, Report<NamespaceError>> {
        link.trim()
            .strip_prefix("pid:[")
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|inode| inode.parse::<u64>().ok())
            .map(Self)
            .ok_or_else(|| {
                Report::new(NamespaceError::MalformedNamespaceLink {
                    link: link.to_string(),
                })
            })
    }
}
