//! `.reg` text import boundary (component I, spec §6): parses classic
//! Windows Registry Editor 5.00 text into a flat operation list, optionally
//! optimizes that list (last-write-wins dedup, delete-shadowing, grouping
//! and ordering), then applies it through the same [`crate::editor`] a
//! programmatic caller would use.

use crate::cell_key_value::RegType;
use crate::editor::Transaction;
use crate::err::Error;
use crate::filter;
use itertools::Itertools;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum RegOp {
    CreateKey { path: String },
    DeleteKey { path: String, recursive: bool },
    SetValue { path: String, name: String, value_type: RegType, data: Vec<u8> },
    DeleteValue { path: String, name: String },
}

impl RegOp {
    fn path(&self) -> &str {
        match self {
            RegOp::CreateKey { path } | RegOp::DeleteKey { path, .. } => path,
            RegOp::SetValue { path, .. } | RegOp::DeleteValue { path, .. } => path,
        }
    }

    fn value_name(&self) -> &str {
        match self {
            RegOp::SetValue { name, .. } | RegOp::DeleteValue { name, .. } => name,
            RegOp::CreateKey { .. } | RegOp::DeleteKey { .. } => "",
        }
    }

    /// `(normalized_path, value_name_or_"")` dedup key (spec §6).
    fn dedup_key(&self) -> (String, String) {
        (filter::normalize_path(self.path()).join("\\"), self.value_name().to_ascii_lowercase())
    }

    fn ordering_rank(&self) -> u8 {
        match self {
            RegOp::CreateKey { .. } => 0,
            RegOp::DeleteKey { .. } => 1,
            RegOp::DeleteValue { .. } => 2,
            RegOp::SetValue { .. } => 3,
        }
    }
}

/// Joins backslash-continued lines (a trailing `\` before the newline,
/// common in multi-line `hex:` value data) into single logical lines.
fn join_continuations(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for line in text.lines() {
        let trimmed = line.trim_end();
        if let Some(stripped) = trimmed.strip_suffix('\\') {
            pending.push_str(stripped.trim_end());
            continue;
        }
        pending.push_str(trimmed);
        out.push(std::mem::take(&mut pending));
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

/// Unescapes a `.reg` quoted string: `\\` and `\"` are the only escapes in
/// practice.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_quoted(s: &str) -> Option<(String, String)> {
    let s = s.strip_prefix('"')?;
    let mut end = None;
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == '"' {
            end = Some(i);
            break;
        }
        i += 1;
    }
    let end = end?;
    let content: String = chars[..end].iter().collect();
    let rest: String = chars[end + 1..].iter().collect();
    Some((unescape(&content), rest))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, Error> {
    s.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| u8::from_str_radix(s, 16).map_err(|_| Error::corrupt(format!("invalid hex byte '{}'", s))))
        .collect()
}

fn parse_value_spec(spec: &str) -> Result<(RegType, Vec<u8>), Error> {
    let spec = spec.trim();
    if let Some(rest) = spec.strip_prefix("dword:") {
        let n = u32::from_str_radix(rest.trim(), 16).map_err(|_| Error::corrupt("invalid dword literal"))?;
        return Ok((RegType::Dword, n.to_le_bytes().to_vec()));
    }
    if let Some(rest) = spec.strip_prefix("hex(") {
        let (type_hex, rest) = rest.split_once(')').ok_or_else(|| Error::corrupt("malformed hex(N): literal"))?;
        let rest = rest.strip_prefix(':').ok_or_else(|| Error::corrupt("malformed hex(N): literal"))?;
        let type_num = u32::from_str_radix(type_hex.trim(), 16).map_err(|_| Error::corrupt("invalid hex(N) type digit"))?;
        let mut logs = crate::log::Logs::default();
        let value_type = RegType::from_value(type_num, &mut logs);
        return Ok((value_type, parse_hex_bytes(rest)?));
    }
    if let Some(rest) = spec.strip_prefix("hex:") {
        return Ok((RegType::Binary, parse_hex_bytes(rest)?));
    }
    if let Some((content, _)) = parse_quoted(spec) {
        let mut data: Vec<u8> = content.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        data.extend_from_slice(&[0, 0]);
        return Ok((RegType::Sz, data));
    }
    Err(Error::corrupt(format!("unrecognized value literal: {}", spec)))
}

/// Parses `.reg` text into a flat, unoptimized operation list (spec §6).
pub fn parse(text: &str) -> Result<Vec<RegOp>, Error> {
    let mut ops = Vec::new();
    let mut current_path: Option<String> = None;

    for line in join_continuations(text) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with("Windows Registry Editor") {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(deleted) = section.strip_prefix('-') {
                ops.push(RegOp::DeleteKey { path: deleted.to_string(), recursive: true });
                current_path = None;
            } else {
                ops.push(RegOp::CreateKey { path: section.to_string() });
                current_path = Some(section.to_string());
            }
            continue;
        }

        let path = current_path
            .clone()
            .ok_or_else(|| Error::corrupt("value line appears before any [key] section"))?;

        if let Some(rest) = line.strip_prefix("@=") {
            if rest.trim() == "-" {
                ops.push(RegOp::DeleteValue { path, name: String::new() });
            } else {
                let (value_type, data) = parse_value_spec(rest)?;
                ops.push(RegOp::SetValue { path, name: String::new(), value_type, data });
            }
            continue;
        }

        let (name, rest) = parse_quoted(line).ok_or_else(|| Error::corrupt(format!("malformed value line: {}", line)))?;
        let rest = rest.trim_start().strip_prefix('=').ok_or_else(|| Error::corrupt(format!("expected '=' after value name: {}", line)))?;
        if rest.trim() == "-" {
            ops.push(RegOp::DeleteValue { path, name });
        } else {
            let (value_type, data) = parse_value_spec(rest)?;
            ops.push(RegOp::SetValue { path, name, value_type, data });
        }
    }

    Ok(ops)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub deduplicated: usize,
    pub shadowed: usize,
}

/// Applies the right-to-left last-write-wins, delete-shadowing, and
/// grouping/ordering pass described in spec §6.
pub fn optimize(ops: Vec<RegOp>) -> (Vec<RegOp>, OptimizeStats) {
    let mut stats = OptimizeStats::default();

    // Right-to-left last-write-wins: keep only the last occurrence of each
    // (path, value_name) key, dropping earlier duplicates.
    let mut last_index: HashMap<(String, String), usize> = HashMap::new();
    for (i, op) in ops.iter().enumerate() {
        if matches!(op, RegOp::SetValue { .. }) {
            if last_index.insert(op.dedup_key(), i).is_some() {
                stats.deduplicated += 1;
            }
        }
    }
    let mut kept: Vec<(usize, RegOp)> = ops
        .into_iter()
        .enumerate()
        .filter(|(i, op)| !matches!(op, RegOp::SetValue { .. }) || last_index.get(&op.dedup_key()) == Some(i))
        .collect();

    // Delete-shadowing: any earlier operation under a key recursively
    // deleted later is dropped in favor of the DeleteKey itself.
    let deleted_prefixes: Vec<(usize, Vec<String>)> = kept
        .iter()
        .filter_map(|(i, op)| match op {
            RegOp::DeleteKey { path, recursive: true } => Some((*i, filter::normalize_path(path))),
            _ => None,
        })
        .collect();

    kept.retain(|(i, op)| {
        if matches!(op, RegOp::DeleteKey { .. }) {
            return true;
        }
        let segments = filter::normalize_path(op.path());
        for (del_index, del_segments) in &deleted_prefixes {
            if *del_index > *i && segments.starts_with(del_segments.as_slice()) {
                stats.shadowed += 1;
                return false;
            }
        }
        true
    });

    // Grouping and ordering: group operations by key path so each key's
    // edits stay contiguous, order groups by depth (parents before
    // children, first-seen order as a tiebreak), and within a group sort
    // CreateKey -> DeleteKey -> DeleteValue -> SetValue.
    let remaining: Vec<RegOp> = kept.into_iter().map(|(_, op)| op).collect();
    let mut path_order: Vec<(String, usize)> = Vec::new();
    let mut seen_paths = std::collections::HashSet::new();
    for op in &remaining {
        let key = filter::normalize_path(op.path()).join("\\");
        if seen_paths.insert(key.clone()) {
            path_order.push((key, filter::normalize_path(op.path()).len()));
        }
    }
    path_order.sort_by_key(|(_, depth)| *depth);

    let mut groups = remaining.into_iter().into_group_map_by(|op| filter::normalize_path(op.path()).join("\\"));
    let mut final_ops = Vec::new();
    for (key, _) in path_order {
        if let Some(mut group) = groups.remove(&key) {
            group.sort_by_key(|op| op.ordering_rank());
            final_ops.append(&mut group);
        }
    }

    (final_ops, stats)
}

/// Applies an operation list against an open transaction.
pub fn apply(ops: &[RegOp], txn: &mut Transaction) -> Result<(), Error> {
    for op in ops {
        match op {
            RegOp::CreateKey { path } => txn.create_key(path, true)?,
            RegOp::DeleteKey { path, recursive } => txn.delete_key(path, *recursive)?,
            RegOp::SetValue { path, name, value_type, data } => txn.set_value(path, name, *value_type, data.clone())?,
            RegOp::DeleteValue { path, name } => txn.delete_value(path, name)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_reg_file() {
        let text = "Windows Registry Editor Version 5.00\n\n[HKEY_LOCAL_MACHINE\\Software\\Vendor]\n\"Count\"=dword:00000001\n\"Name\"=\"hello\"\n";
        let ops = parse(text).unwrap();
        assert_eq!(
            vec![
                RegOp::CreateKey { path: "HKEY_LOCAL_MACHINE\\Software\\Vendor".to_string() },
                RegOp::SetValue { path: "HKEY_LOCAL_MACHINE\\Software\\Vendor".to_string(), name: "Count".to_string(), value_type: RegType::Dword, data: 1u32.to_le_bytes().to_vec() },
                RegOp::SetValue {
                    path: "HKEY_LOCAL_MACHINE\\Software\\Vendor".to_string(),
                    name: "Name".to_string(),
                    value_type: RegType::Sz,
                    data: {
                        let mut d: Vec<u8> = "hello".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
                        d.extend_from_slice(&[0, 0]);
                        d
                    },
                },
            ],
            ops
        );
    }

    #[test]
    fn test_parse_delete_key_and_value() {
        let text = "[-HKLM\\Software\\Old]\n[HKLM\\Software\\New]\n\"Stale\"=-\n";
        let ops = parse(text).unwrap();
        assert_eq!(RegOp::DeleteKey { path: "HKLM\\Software\\Old".to_string(), recursive: true }, ops[0]);
        assert_eq!(RegOp::DeleteValue { path: "HKLM\\Software\\New".to_string(), name: "Stale".to_string() }, ops[2]);
    }

    #[test]
    fn test_parse_hex_binary() {
        let text = "[HKLM\\Software\\X]\n\"Blob\"=hex:01,02,03\n";
        let ops = parse(text).unwrap();
        assert_eq!(
            RegOp::SetValue { path: "HKLM\\Software\\X".to_string(), name: "Blob".to_string(), value_type: RegType::Binary, data: vec![1, 2, 3] },
            ops[1]
        );
    }

    #[test]
    fn test_optimize_last_write_wins() {
        let ops = vec![
            RegOp::CreateKey { path: "X".to_string() },
            RegOp::SetValue { path: "X".to_string(), name: "a".to_string(), value_type: RegType::Sz, data: b"v1".to_vec() },
            RegOp::SetValue { path: "X".to_string(), name: "a".to_string(), value_type: RegType::Sz, data: b"v2".to_vec() },
            RegOp::SetValue { path: "X".to_string(), name: "a".to_string(), value_type: RegType::Sz, data: b"v3".to_vec() },
        ];
        let (optimized, stats) = optimize(ops);
        assert_eq!(2, stats.deduplicated);
        let sets: Vec<_> = optimized.iter().filter(|op| matches!(op, RegOp::SetValue { .. })).collect();
        assert_eq!(1, sets.len());
        assert_eq!(&RegOp::SetValue { path: "X".to_string(), name: "a".to_string(), value_type: RegType::Sz, data: b"v3".to_vec() }, sets[0]);
    }

    #[test]
    fn test_optimize_delete_shadowing() {
        let ops = vec![
            RegOp::SetValue { path: "A\\B".to_string(), name: "x".to_string(), value_type: RegType::Sz, data: b"v".to_vec() },
            RegOp::DeleteKey { path: "A".to_string(), recursive: true },
            RegOp::CreateKey { path: "C".to_string() },
        ];
        let (optimized, stats) = optimize(ops);
        assert_eq!(1, stats.shadowed);
        assert!(!optimized.iter().any(|op| matches!(op, RegOp::SetValue { path, .. } if path == "A\\B")));
        assert!(optimized.iter().any(|op| matches!(op, RegOp::DeleteKey { path, .. } if path == "A")));
    }

    #[test]
    fn test_optimize_orders_parents_before_children_and_ranks_within_key() {
        let ops = vec![
            RegOp::SetValue { path: "A\\B".to_string(), name: "x".to_string(), value_type: RegType::Sz, data: b"v".to_vec() },
            RegOp::CreateKey { path: "A\\B".to_string() },
            RegOp::CreateKey { path: "A".to_string() },
        ];
        let (optimized, _) = optimize(ops);
        assert_eq!(RegOp::CreateKey { path: "A".to_string() }, optimized[0]);
        assert_eq!(RegOp::CreateKey { path: "A\\B".to_string() }, optimized[1]);
    }
}
