use std::collections::BTreeMap;
use std::fmt;

/// Final conversion report returned by `copy_tree`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportConvert {
    /// Terminal datasets visited (including compound fields).
    pub cnt_scanned: u64,
    /// Terminal datasets that passed include/exclude filtering.
    pub cnt_matched: u64,
    /// Blocks created and written (or counted in dry-run).
    pub cnt_copied: u64,
    /// Blocks compared against the source.
    pub cnt_verified: u64,
    /// Terminal datasets skipped by include/exclude filtering.
    pub cnt_skipped: u64,
    /// Elements written across all blocks.
    pub cnt_elements: u64,
    /// Payload bytes written across all blocks.
    pub cnt_bytes: u64,
}

impl ReportConvert {
    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_matched".to_string(), self.cnt_matched);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_verified".to_string(), self.cnt_verified);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_elements".to_string(), self.cnt_elements);
        dict_counts.insert("cnt_bytes".to_string(), self.cnt_bytes);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} scanned={} matched={} copied={} verified={} skipped={} elements={} bytes={}",
            self.cnt_scanned,
            self.cnt_matched,
            self.cnt_copied,
            self.cnt_verified,
            self.cnt_skipped,
            self.cnt_elements,
            self.cnt_bytes
        )
    }
}

impl fmt::Display for ReportConvert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[CONVERT]"))
    }
}

/// Mutable accumulator for conversion statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportConvertBuilder {
    pub cnt_scanned: u64,
    pub cnt_matched: u64,
    pub cnt_copied: u64,
    pub cnt_verified: u64,
    pub cnt_skipped: u64,
    pub cnt_elements: u64,
    pub cnt_bytes: u64,
}

impl ReportConvertBuilder {
    /// Increment one or more named counters by `value`.
    ///
    /// Unknown names are ignored.
    pub fn add_counts(&mut self, field_names: &[&str], value: u64) {
        for field_name in field_names {
            match *field_name {
                "cnt_scanned" => self.cnt_scanned += value,
                "cnt_matched" => self.cnt_matched += value,
                "cnt_copied" => self.cnt_copied += value,
                "cnt_verified" => self.cnt_verified += value,
                "cnt_skipped" => self.cnt_skipped += value,
                "cnt_elements" => self.cnt_elements += value,
                "cnt_bytes" => self.cnt_bytes += value,
                _ => {}
            }
        }
    }

    pub fn add_scanned(&mut self) {
        self.cnt_scanned += 1;
    }

    pub fn add_matched(&mut self) {
        self.cnt_matched += 1;
    }

    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    /// Record one written block of `n_elements` elements / `n_bytes` bytes.
    pub fn add_copied(&mut self, n_elements: u64, n_bytes: u64) {
        self.cnt_copied += 1;
        self.cnt_elements += n_elements;
        self.cnt_bytes += n_bytes;
    }

    pub fn add_verified(&mut self) {
        self.cnt_verified += 1;
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportConvert {
        ReportConvert {
            cnt_scanned: self.cnt_scanned,
            cnt_matched: self.cnt_matched,
            cnt_copied: self.cnt_copied,
            cnt_verified: self.cnt_verified,
            cnt_skipped: self.cnt_skipped,
            cnt_elements: self.cnt_elements,
            cnt_bytes: self.cnt_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportConvert, ReportConvertBuilder};

    #[test]
    fn report_convert_to_dict_and_format() {
        let mut builder = ReportConvertBuilder::default();
        builder.add_counts(&["cnt_scanned", "cnt_matched"], 3);
        builder.add_counts(&["cnt_unknown"], 9);
        builder.add_scanned();
        builder.add_skipped();
        builder.add_copied(300, 2400);
        builder.add_copied(2, 16);
        builder.add_verified();
        let report: ReportConvert = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_scanned"], 4);
        assert_eq!(dict_counts["cnt_matched"], 3);
        assert_eq!(dict_counts["cnt_copied"], 2);
        assert_eq!(dict_counts["cnt_elements"], 302);
        assert_eq!(dict_counts.len(), 7);

        let txt = report.format("[CONVERT]");
        assert_eq!(
            txt,
            "[CONVERT] scanned=4 matched=3 copied=2 verified=1 skipped=1 elements=302 bytes=2416"
        );
        assert_eq!(report.to_string(), txt);
    }
}
