//! `/proc/<pid>/smaps` report parsing.
//!
//! A report is a sequence of mapping entries. Each entry starts with a header
//! line
//!
//! ```text
//! 7d4337f0f000-7d4337f10000 rw-p 0002d000 00:2bc 42926480   /usr/lib/ld-2.31.so
//! ```
//!
//! followed by `Name:  <value> kB` lines. Entries are aggregated by mapping
//! path: several mappings of the same file collapse into one [`SmapsMapping`]
//! whose counters are the field-wise sum.

use core::error::Error;
use std::collections::HashMap;
use std::io::BufRead;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Serialize;

/// Path used for mappings whose header carries no path.
pub const ANON_PATH: &str = "[anon]";

const BYTES_PER_KIB: u64 = 1024;
const PERM_CHARS: &str = "rwxps-";

#[derive(Debug, Display)]
pub enum SmapsError {
    #[display("failed to read smaps report")]
    ReadFailure,
}

impl Error for SmapsError {}

/// Recognised smaps keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmapsField {
    Size,
    Rss,
    Pss,
    PssDirty,
    SharedClean,
    SharedDirty,
    PrivateClean,
    PrivateDirty,
    Referenced,
    Anonymous,
    LazyFree,
    AnonHugePages,
    ShmemPmdMapped,
    SharedHugetlb,
    PrivateHugetlb,
    Swap,
    SwapPss,
    KernelPageSize,
    MmuPageSize,
    Locked,
}

impl SmapsField {
    pub const ALL: [SmapsField; 20] = [
        SmapsField::Size,
        SmapsField::Rss,
        SmapsField::Pss,
        SmapsField::PssDirty,
        SmapsField::SharedClean,
        SmapsField::SharedDirty,
        SmapsField::PrivateClean,
        SmapsField::PrivateDirty,
        SmapsField::Referenced,
        SmapsField::Anonymous,
        SmapsField::LazyFree,
        SmapsField::AnonHugePages,
        SmapsField::ShmemPmdMapped,
        SmapsField::SharedHugetlb,
        SmapsField::PrivateHugetlb,
        SmapsField::Swap,
        SmapsField::SwapPss,
        SmapsField::KernelPageSize,
        SmapsField::MmuPageSize,
        SmapsField::Locked,
    ];

    /// Looks up a field by the key used in the smaps report (case-sensitive).
    pub fn from_smaps_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.smaps_key() == key)
    }

    /// Key as written by the kernel.
    pub const fn smaps_key(self) -> &'static str {
        match self {
            SmapsField::Size => "Size",
            SmapsField::Rss => "Rss",
            SmapsField::Pss => "Pss",
            SmapsField::PssDirty => "Pss_Dirty",
            SmapsField::SharedClean => "Shared_Clean",
            SmapsField::SharedDirty => "Shared_Dirty",
            SmapsField::PrivateClean => "Private_Clean",
            SmapsField::PrivateDirty => "Private_Dirty",
            SmapsField::Referenced => "Referenced",
            SmapsField::Anonymous => "Anonymous",
            SmapsField::LazyFree => "LazyFree",
            SmapsField::AnonHugePages => "AnonHugePages",
            SmapsField::ShmemPmdMapped => "ShmemPmdMapped",
            SmapsField::SharedHugetlb => "Shared_Hugetlb",
            SmapsField::PrivateHugetlb => "Private_Hugetlb",
            SmapsField::Swap => "Swap",
            SmapsField::SwapPss => "SwapPss",
            SmapsField::KernelPageSize => "KernelPageSize",
            SmapsField::MmuPageSize => "MMUPageSize",
            SmapsField::Locked => "Locked",
        }
    }

    /// Short snake_case name, used as field name in line encoders.
    pub const fn name(self) -> &'static str {
        match self {
            SmapsField::Size => "size",
            SmapsField::Rss => "rss",
            SmapsField::Pss => "pss",
            SmapsField::PssDirty => "pss_dirty",
            SmapsField::SharedClean => "shared_clean",
            SmapsField::SharedDirty => "shared_dirty",
            SmapsField::PrivateClean => "private_clean",
            SmapsField::PrivateDirty => "private_dirty",
            SmapsField::Referenced => "referenced",
            SmapsField::Anonymous => "anonymous",
            SmapsField::LazyFree => "lazyfree",
            SmapsField::AnonHugePages => "anon_hugepages",
            SmapsField::ShmemPmdMapped => "shmem_pmdmapped",
            SmapsField::SharedHugetlb => "shared_hugetlb",
            SmapsField::PrivateHugetlb => "private_hugetlb",
            SmapsField::Swap => "swap",
            SmapsField::SwapPss => "swap_pss",
            SmapsField::KernelPageSize => "kernel_page_size",
            SmapsField::MmuPageSize => "mmu_page_size",
            SmapsField::Locked => "locked",
        }
    }

    /// Prometheus gauge name, `process_smaps_<name>_bytes`.
    pub fn metric_name(self) -> String {
        format!("process_smaps_{}_bytes", self.name())
    }

    pub const fn help(self) -> &'static str {
        match self {
            SmapsField::Size => "Total size of the memory mapping in bytes.",
            SmapsField::Rss => {
                "Resident Set Size: amount of the mapping currently resident in RAM (bytes)."
            }
            SmapsField::Pss => {
                "Proportional Set Size: mapping's share of RAM, divided by number of processes sharing each page (bytes)."
            }
            SmapsField::PssDirty => "Proportional Set Size of dirty pages in the mapping (bytes).",
            SmapsField::SharedClean => "Amount of clean shared pages in the mapping (bytes).",
            SmapsField::SharedDirty => "Amount of dirty shared pages in the mapping (bytes).",
            SmapsField::PrivateClean => "Amount of clean private pages in the mapping (bytes).",
            SmapsField::PrivateDirty => "Amount of dirty private pages in the mapping (bytes).",
            SmapsField::Referenced => {
                "Amount of memory in the mapping currently marked as referenced or accessed (bytes)."
            }
            SmapsField::Anonymous => {
                "Amount of memory in the mapping that does not belong to any file (bytes)."
            }
            SmapsField::LazyFree => {
                "Amount of memory in the mapping marked by madvise(MADV_FREE), to be freed under memory pressure (bytes)."
            }
            SmapsField::AnonHugePages => {
                "Amount of memory in the mapping backed by transparent hugepages (bytes)."
            }
            SmapsField::ShmemPmdMapped => {
                "Amount of shared (shmem/tmpfs) memory in the mapping backed by huge pages (bytes)."
            }
            SmapsField::SharedHugetlb => {
                "Amount of memory in the mapping backed by hugetlbfs pages and shared (bytes)."
            }
            SmapsField::PrivateHugetlb => {
                "Amount of memory in the mapping backed by hugetlbfs pages and private (bytes)."
            }
            SmapsField::Swap => {
                "Amount of would-be-anonymous memory in the mapping that is swapped out (bytes)."
            }
            SmapsField::SwapPss => "Proportional share of swap space used by the mapping (bytes).",
            SmapsField::KernelPageSize => "Kernel page size used for the mapping (bytes).",
            SmapsField::MmuPageSize => "MMU page size used for the mapping (bytes).",
            SmapsField::Locked => "Amount of memory in the mapping that is locked in RAM (bytes).",
        }
    }
}

/// Aggregated accounting of every mapping sharing one path. All values in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SmapsMapping {
    pub path: String,
    pub size: u64,
    pub rss: u64,
    pub pss: u64,
    pub pss_dirty: u64,
    pub shared_clean: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub private_dirty: u64,
    pub referenced: u64,
    pub anonymous: u64,
    pub lazy_free: u64,
    pub anon_huge_pages: u64,
    pub shmem_pmd_mapped: u64,
    pub shared_hugetlb: u64,
    pub private_hugetlb: u64,
    pub swap: u64,
    pub swap_pss: u64,
    pub kernel_page_size: u64,
    pub mmu_page_size: u64,
    pub locked: u64,
}

impl SmapsMapping {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: SmapsField) -> u64 {
        match field {
            SmapsField::Size => self.size,
            SmapsField::Rss => self.rss,
            SmapsField::Pss => self.pss,
            SmapsField::PssDirty => self.pss_dirty,
            SmapsField::SharedClean => self.shared_clean,
            SmapsField::SharedDirty => self.shared_dirty,
            SmapsField::PrivateClean => self.private_clean,
            SmapsField::PrivateDirty => self.private_dirty,
            SmapsField::Referenced => self.referenced,
            SmapsField::Anonymous => self.anonymous,
            SmapsField::LazyFree => self.lazy_free,
            SmapsField::AnonHugePages => self.anon_huge_pages,
            SmapsField::ShmemPmdMapped => self.shmem_pmd_mapped,
            SmapsField::SharedHugetlb => self.shared_hugetlb,
            SmapsField::PrivateHugetlb => self.private_hugetlb,
            SmapsField::Swap => self.swap,
            SmapsField::SwapPss => self.swap_pss,
            SmapsField::KernelPageSize => self.kernel_page_size,
            SmapsField::MmuPageSize => self.mmu_page_size,
            SmapsField::Locked => self.locked,
        }
    }

    fn field_mut(&mut self, field: SmapsField) -> &mut u64 {
        match field {
            SmapsField::Size => &mut self.size,
            SmapsField::Rss => &mut self.rss,
            SmapsField::Pss => &mut self.pss,
            SmapsField::PssDirty => &mut self.pss_dirty,
            SmapsField::SharedClean => &mut self.shared_clean,
            SmapsField::SharedDirty => &mut self.shared_dirty,
            SmapsField::PrivateClean => &mut self.private_clean,
            SmapsField::PrivateDirty => &mut self.private_dirty,
            SmapsField::Referenced => &mut self.referenced,
            SmapsField::Anonymous => &mut self.anonymous,
            SmapsField::LazyFree => &mut self.lazy_free,
            SmapsField::AnonHugePages => &mut self.anon_huge_pages,
            SmapsField::ShmemPmdMapped => &mut self.shmem_pmd_mapped,
            SmapsField::SharedHugetlb => &mut self.shared_hugetlb,
            SmapsField::PrivateHugetlb => &mut self.private_hugetlb,
            SmapsField::Swap => &mut self.swap,
            SmapsField::SwapPss => &mut self.swap_pss,
            SmapsField::KernelPageSize => &mut self.kernel_page_size,
            SmapsField::MmuPageSize => &mut self.mmu_page_size,
            SmapsField::Locked => &mut self.locked,
        }
    }

    /// Adds `bytes` to `field`. Returns `false` and leaves the field
    /// untouched when the sum would overflow.
    pub fn add(&mut self, field: SmapsField, bytes: u64) -> bool {
        let slot = self.field_mut(field);
        match slot.checked_add(bytes) {
            Some(sum) => {
                *slot = sum;
                true
            }
            None => false,
        }
    }
}

/// Parses a smaps report into one record per distinct mapping path.
///
/// Records come out in the order their path was first seen. Malformed lines
/// are skipped; only an I/O failure of `reader` is an error.
///
/// # Errors
///
/// - [`SmapsError::ReadFailure`] if reading from `reader` fails
pub fn parse_smaps<R: BufRead>(mut reader: R) -> Result<Vec<SmapsMapping>, Report<SmapsError>> {
    let mut mappings: Vec<SmapsMapping> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    let mut current: Option<usize> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .change_context(SmapsError::ReadFailure)?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }

        if let Some(path) = parse_header(line) {
            let index = match by_path.get(path) {
                Some(&index) => index,
                None => {
                    mappings.push(SmapsMapping::new(path));
                    by_path.insert(path.to_string(), mappings.len() - 1);
                    mappings.len() - 1
                }
            };
            current = Some(index);
            continue;
        }

        let Some((key, kib)) = parse_kv(line) else {
            continue;
        };
        let (Some(index), Some(field)) = (current, SmapsField::from_smaps_key(key)) else {
            continue;
        };
        let added = kib
            .checked_mul(BYTES_PER_KIB)
            .is_some_and(|bytes| mappings[index].add(field, bytes));
        if !added {
            tracing::debug!(key, kib, "smaps value overflows, ignoring");
        }
    }

    Ok(mappings)
}

/// Recognises a mapping header and returns its aggregation path.
fn parse_header(line: &str) -> Option<&str> {
    let mut parts = line.splitn(6, ' ');

    let (start, end) = parts.next()?.split_once('-')?;
    if !is_hex(start) || !is_hex(end) {
        return None;
    }

    let perms = parts.next()?;
    if perms.chars().count() != 4 || !perms.chars().all(|c| PERM_CHARS.contains(c)) {
        return None;
    }

    if !is_hex(parts.next()?) {
        return None;
    }

    let dev = parts.next()?;
    if dev.is_empty() || !dev.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
        return None;
    }

    let inode = parts.next()?;
    if inode.is_empty() || !inode.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match parts.next().map(str::trim) {
        Some(path) if !path.is_empty() => Some(path),
        _ => Some(ANON_PATH),
    }
}

/// Recognises `Name:<whitespace><decimal> kB`. Anything else, including
/// values in other units or too large for `u64`, yields `None`.
fn parse_kv(line: &str) -> Option<(&str, u64)> {
    let (key, rest) = line.split_once(':')?;
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_') {
        return None;
    }

    let value = rest.trim_start();
    if value.len() == rest.len() {
        return None;
    }

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(digits_end);
    if digits.is_empty() || !unit.starts_with(" kB") {
        return None;
    }

    Some((key, digits.parse().ok()?))
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::io::Read;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    fn parse(text: &str) -> Vec<SmapsMapping> {
        parse_smaps(text.as_bytes()).expect("in-memory reads never fail")
    }

    #[test]
    fn aggregates_entries_sharing_a_path() {
        let report = "\
7f0000000000-7f0000001000 r-xp 00000000 08:01 1234 /usr/lib/libc.so
Size:                  4 kB
Rss:                   4 kB
Pss:                   2 kB
7f0000001000-7f0000002000 rw-p 00001000 08:01 1234 /usr/lib/libc.so
Size:                  4 kB
Rss:                   4 kB
Private_Dirty:         4 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        let libc = &mappings[0];
        assert_eq!(libc.path, "/usr/lib/libc.so");
        assert_eq!(libc.size, 8192);
        assert_eq!(libc.rss, 8192);
        assert_eq!(libc.pss, 2048);
        assert_eq!(libc.private_dirty, 4096);
        assert_eq!(libc.swap, 0);
    }

    #[test]
    fn two_libc_entries_sum_their_rss() {
        let report = "\
7f0000-7f1000 r-xp 00000000 08:01 11 /lib/libc.so
Rss:                 100 kB
7f1000-7f2000 rw-p 00001000 08:01 11 /lib/libc.so
Rss:                 100 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].rss, 204800);
    }

    #[test]
    fn headerless_path_uses_anon_marker() {
        let mappings = parse("7f0000-7f1000 rw-p 00000000 00:00 0\n");

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].path, ANON_PATH);
    }

    #[test]
    fn missing_path_becomes_anon() {
        let report = "\
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0
Size:                132 kB
Anonymous:           12 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].path, ANON_PATH);
        assert_eq!(mappings[0].size, 132 * 1024);
        assert_eq!(mappings[0].anonymous, 12 * 1024);
    }

    #[test]
    fn anonymous_entries_are_aggregated_together() {
        let report = "\
7ffd00000000-7ffd00001000 rw-p 00000000 00:00 0
Rss:                   4 kB
7ffd00002000-7ffd00003000 rw-p 00000000 00:00 0
Rss:                   8 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].path, ANON_PATH);
        assert_eq!(mappings[0].rss, 12 * 1024);
    }

    #[test]
    fn bracketed_pseudo_paths_are_kept_verbatim() {
        let report = "\
55d000000000-55d000021000 rw-p 00000000 00:00 0                          [heap]
Rss:                  16 kB
7ffc00000000-7ffc00021000 rw-p 00000000 00:00 0                          [stack]
Rss:                  20 kB
";
        let mappings = parse(report);

        let paths: Vec<&str> = mappings.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["[heap]", "[stack]"]);
        assert_eq!(mappings[0].rss, 16 * 1024);
        assert_eq!(mappings[1].rss, 20 * 1024);
    }

    #[test]
    fn paths_with_spaces_are_preserved() {
        let report = "\
7f0000000000-7f0000001000 r--p 00000000 08:01 99   /tmp/my file (deleted)
Size:                  4 kB
";
        let mappings = parse(report);

        assert_eq!(mappings[0].path, "/tmp/my file (deleted)");
    }

    #[test]
    fn non_kb_and_non_numeric_values_are_ignored() {
        let report = "\
7f0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/app
Size:                  4 kB
Rss:                   4 MB
Pss:                 abc kB
THPeligible:    0
VmFlags: rd mr mw me sd
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].size, 4096);
        assert_eq!(mappings[0].rss, 0);
        assert_eq!(mappings[0].pss, 0);
    }

    #[test]
    fn unknown_keys_and_garbage_lines_are_skipped() {
        let report = "\
not a header at all
7f0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/app

FilePmdMapped:         4 kB
Size:                  8 kB
??? ###
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].size, 8192);
    }

    #[test]
    fn key_value_before_any_header_is_ignored() {
        let report = "\
Size:                  4 kB
7f0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/app
Size:                  8 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].size, 8192);
    }

    #[test]
    fn overflowing_values_leave_the_field_unchanged() {
        let report = format!(
            "\
7f0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/app
Size:                  4 kB
Size: {} kB
Rss: 99999999999999999999999 kB
",
            u64::MAX
        );
        let mappings = parse(&report);

        assert_eq!(mappings[0].size, 4096);
        assert_eq!(mappings[0].rss, 0);
    }

    #[test]
    fn headers_with_invalid_fields_are_not_headers() {
        let report = "\
7f0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/app
Size:                  4 kB
zz0000000000-7f0000001000 r--p 00000000 08:01 1 /bin/other
Size:                  4 kB
7f0000000000-7f0000001000 rwxpq 00000000 08:01 1 /bin/other
Size:                  4 kB
";
        let mappings = parse(report);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].size, 3 * 4096);
    }

    #[test]
    fn every_recognised_key_is_accumulated() {
        let mut report =
            String::from("7f0000000000-7f0000001000 rw-s 00000000 00:05 7 /dev/shm/pool\n");
        for (i, field) in SmapsField::ALL.iter().enumerate() {
            report.push_str(&format!("{}: {} kB\n", field.smaps_key(), i + 1));
        }
        let mappings = parse(&report);

        assert_eq!(mappings.len(), 1);
        for (i, field) in SmapsField::ALL.iter().enumerate() {
            assert_eq!(
                mappings[0].get(*field),
                (i as u64 + 1) * 1024,
                "field {field:?}"
            );
        }
    }

    #[test]
    fn records_follow_first_seen_order() {
        let report = "\
00400000-00401000 r-xp 00000000 08:01 1 /b
00401000-00402000 r-xp 00000000 08:01 2 /a
00402000-00403000 r-xp 00000000 08:01 1 /b
";
        let paths: Vec<String> = parse(report).into_iter().map(|m| m.path).collect();

        assert_eq!(paths, vec!["/b".to_string(), "/a".to_string()]);
    }

    #[test]
    fn empty_report_yields_no_records() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn field_lookup_is_case_sensitive() {
        assert_eq!(SmapsField::from_smaps_key("MMUPageSize"), Some(SmapsField::MmuPageSize));
        assert_eq!(SmapsField::from_smaps_key("rss"), None);
        assert_eq!(
            SmapsField::LazyFree.metric_name(),
            "process_smaps_lazyfree_bytes"
        );
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device went away"))
        }
    }

    #[test]
    fn read_errors_are_reported() {
        let result = parse_smaps(io::BufReader::new(FailingReader));

        assert!(matches!(
            result.map_err(|report| report.current_context().to_string()),
            Err(message) if message == "failed to read smaps report"
        ));
    }
}
