//! Structural diagnostics (component F): the always-on-but-cheap opt-in
//! collector fed by passive emission points in the decode layer, and the
//! seven-phase active full-hive scan (spec §4.G).

use crate::err::Error;
use crate::reader::Reader;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Category {
    Structure,
    Data,
    Integrity,
    Performance,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum RepairKind {
    Truncate,
    Rebuild,
    Remove,
    Replace,
    Default,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Risk {
    None,
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize)]
pub struct RepairAction {
    pub kind: RepairKind,
    pub description: String,
    pub confidence: f32,
    pub risk: Risk,
    pub auto_apply: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DiagnosticContext {
    pub key_path: Option<String>,
    pub value_name: Option<String>,
    pub node_offset: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    /// Absolute byte offset into the hive file; 0 if not applicable.
    pub offset: u32,
    /// Structure tag: `REGF`, `HBIN`, `NK`, `VK`, ...
    pub structure_tag: String,
    pub description: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub context: DiagnosticContext,
    pub repair: Option<RepairAction>,
}

impl Diagnostic {
    fn new(severity: Severity, category: Category, structure_tag: &str, description: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            category,
            offset: 0,
            structure_tag: structure_tag.to_string(),
            description: description.into(),
            expected: None,
            actual: None,
            context: DiagnosticContext::default(),
            repair: None,
        }
    }

    fn at(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    fn expect_actual(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = context;
        self
    }

    fn with_repair(mut self, repair: RepairAction) -> Self {
        self.repair = Some(repair);
        self
    }

    /// Passive emission point: a value's data cell/DB chain came up short in
    /// tolerant mode (spec §4.E step 4 / §4.G passive emission points).
    pub fn truncated_value(value_name: &str) -> Self {
        Diagnostic::new(
            Severity::Warning,
            Category::Data,
            "VK",
            format!("value '{}' data was shorter than its declared length", value_name),
        )
        .with_context(DiagnosticContext {
            value_name: Some(value_name.to_string()),
            ..Default::default()
        })
        .with_repair(RepairAction {
            kind: RepairKind::Truncate,
            description: "clamped to the bytes actually available".to_string(),
            confidence: 0.9,
            risk: Risk::Low,
            auto_apply: true,
        })
    }
}

/// Opt-in, mutex-guarded sink for diagnostics raised during normal reader
/// operation. A disabled reader never constructs one, so the cost of
/// carrying this feature is a single `Option` check per call site.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    records: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        DiagnosticCollector { records: Mutex::new(Vec::new()) }
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        self.records.lock().expect("diagnostic collector mutex poisoned").push(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.records.lock().expect("diagnostic collector mutex poisoned").clone()
    }
}

const ORPHAN_SAMPLE_LIMIT: usize = 10;

/// Runs the seven-phase active scan against an already-open reader.
pub fn diagnose(reader: &Reader) -> Result<Vec<Diagnostic>, Error> {
    let mut out = Vec::new();

    // Phase 1: revalidate the REGF header.
    let base = reader.info();
    if base.primary_sequence_number != base.secondary_sequence_number {
        out.push(
            Diagnostic::new(Severity::Warning, Category::Integrity, "REGF", "primary/secondary sequence numbers differ")
                .expect_actual(base.primary_sequence_number.to_string(), base.secondary_sequence_number.to_string()),
        );
    }
    if base.root_cell_offset_relative < 0
        || base.root_cell_offset_relative as u32 >= base.hive_bins_data_size
    {
        out.push(
            Diagnostic::new(Severity::Critical, Category::Structure, "REGF", "root cell offset falls outside the hive bins data extent")
                .expect_actual(format!("< {}", base.hive_bins_data_size), base.root_cell_offset_relative.to_string()),
        );
    }
    if base.hive_bins_data_size % crate::util::BIN_ALIGNMENT != 0 {
        out.push(
            Diagnostic::new(Severity::Warning, Category::Structure, "REGF", "HiveBinsDataSize is not a multiple of 0x1000")
                .expect_actual("multiple of 0x1000", base.hive_bins_data_size.to_string()),
        );
    }

    // Phase 2: hbin structures were already validated at open time by
    // `CellIndex::build`; a successfully opened reader has none left to
    // report here, so this phase is a no-op beyond recording bin count.
    out.push(Diagnostic::new(Severity::Info, Category::Structure, "HBIN", format!("{} hive bins indexed", reader.index().bins.len())));

    // Phase 3: catalog every allocated cell as an orphan candidate.
    let mut orphans: std::collections::BTreeSet<u32> = reader.catalog_allocated_cells()?.into_iter().collect();

    // Phase 4 + 5: walk the tree pre-order, removing every reached cell from
    // the orphan set and reading value metadata along the way.
    let root = reader.root()?;
    let mut visited = std::collections::HashSet::new();
    visited.insert(root.offset);
    let mut security_offsets = std::collections::BTreeSet::new();
    walk_and_unmark(reader, &root, &mut orphans, &mut visited, &mut security_offsets, &mut out)?;

    // Phase 6: report the orphan set.
    if !orphans.is_empty() {
        let sample: Vec<String> = orphans.iter().take(ORPHAN_SAMPLE_LIMIT).map(|o| format!("{:#x}", o)).collect();
        out.push(
            Diagnostic::new(
                Severity::Info,
                Category::Integrity,
                "HBIN",
                format!("{} allocated cells are unreachable from the root (sample: {})", orphans.len(), sample.join(", ")),
            )
            .with_repair(RepairAction {
                kind: RepairKind::Remove,
                description: "orphaned cells may be reclaimed by a repack".to_string(),
                confidence: 0.5,
                risk: Risk::Medium,
                auto_apply: false,
            }),
        );
    }

    // Phase 7: each distinct SK ring referenced by a visited key actually
    // resolves and walks back to itself.
    for &offset in &security_offsets {
        let resolved = reader.security_descriptors_at(offset);
        if let Err(e) = resolved {
            out.push(Diagnostic::new(
                Severity::Error,
                Category::Integrity,
                "SK",
                format!("security descriptor ring at {:#x} failed to resolve: {}", offset, e),
            ));
        }
    }

    Ok(out)
}

fn walk_and_unmark(
    reader: &Reader,
    node: &crate::cell_key_node::CellKeyNode,
    orphans: &mut std::collections::BTreeSet<u32>,
    visited: &mut std::collections::HashSet<u32>,
    security_offsets: &mut std::collections::BTreeSet<u32>,
    out: &mut Vec<Diagnostic>,
) -> Result<(), Error> {
    orphans.remove(&node.offset);
    if node.detail.sub_keys_list_offset != crate::util::NIL_OFFSET {
        orphans.remove(&node.detail.sub_keys_list_offset);
    }
    if node.detail.key_values_list_offset != crate::util::NIL_OFFSET {
        orphans.remove(&node.detail.key_values_list_offset);
    }
    if node.detail.security_key_offset != crate::util::NIL_OFFSET {
        orphans.remove(&node.detail.security_key_offset);
        security_offsets.insert(node.detail.security_key_offset);
    }
    if node.detail.class_name_offset != crate::util::NIL_OFFSET {
        orphans.remove(&node.detail.class_name_offset);
    }

    for value in &node.sub_values {
        orphans.remove(&value.offset);
        if !value.data_is_inline() {
            orphans.remove(&value.detail.data_offset);
        }
        if let Err(e) = reader.stat_value(value) {
            out.push(
                Diagnostic::new(Severity::Error, Category::Data, "VK", format!("failed to read value '{}': {}", value.value_name, e)).with_context(
                    DiagnosticContext {
                        key_path: Some(node.path.clone()),
                        value_name: Some(value.value_name.clone()),
                        ..Default::default()
                    },
                ),
            );
        }
    }

    match reader.subkeys(node) {
        Ok(children) => {
            for child in children {
                let child_offset = child.offset;
                if !visited.insert(child_offset) {
                    out.push(
                        Diagnostic::new(Severity::Error, Category::Integrity, "NK", "cycle detected: subkey list re-enters an already-visited key")
                            .with_context(DiagnosticContext { key_path: Some(child.path.clone()), ..Default::default() }),
                    );
                    continue;
                }
                orphans.remove(&child_offset);
                walk_and_unmark(reader, &child, orphans, visited, security_offsets, out)?;
            }
        }
        Err(e) => {
            out.push(
                Diagnostic::new(Severity::Error, Category::Structure, "NK", format!("failed to enumerate subkeys of '{}': {}", node.path, e))
                    .with_context(DiagnosticContext { key_path: Some(node.path.clone()), ..Default::default() }),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_disabled_by_default_has_no_cost_semantics() {
        // A reader built with collect_diagnostics=false never constructs a
        // collector at all; this just exercises the collector API directly.
        let collector = DiagnosticCollector::new();
        assert!(collector.snapshot().is_empty());
        collector.record(Diagnostic::truncated_value("Count"));
        assert_eq!(1, collector.snapshot().len());
    }

    #[test]
    fn test_truncated_value_has_truncate_repair() {
        let d = Diagnostic::truncated_value("Count");
        assert_eq!(Severity::Warning, d.severity);
        assert_eq!(RepairKind::Truncate, d.repair.unwrap().kind);
    }
}
