//! Copy-on-write transactional editor (component G, spec §4.H).
//!
//! A [`Transaction`] materializes the source hive's tree into an owned,
//! mutable [`PlanKey`] arena the moment it's opened; every operation below
//! mutates that in-memory tree. The source reader's buffer is never
//! touched. `commit` hands the finished tree to [`crate::emitter`], which
//! lays it out as a brand new byte image.

use crate::cell_key_node::CellKeyNode;
use crate::cell_key_value::RegType;
use crate::emitter::{self, CommitOptions, Writer};
use crate::err::Error;
use crate::filter;
use crate::reader::Reader;
use crate::util;
use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LimitsPreset {
    Default,
    Relaxed,
    Strict,
}

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_subkeys: u32,
    pub max_values: u32,
    pub max_value_size: u64,
    pub max_key_name_len: usize,
    pub max_value_name_len: usize,
    pub max_depth: u32,
    pub max_total_size: u64,
}

impl Limits {
    pub fn from_preset(preset: LimitsPreset) -> Self {
        match preset {
            LimitsPreset::Default => Limits {
                max_subkeys: 512,
                max_values: 16_384,
                max_value_size: 1024 * 1024,
                max_key_name_len: 255,
                max_value_name_len: 16_383,
                max_depth: 512,
                max_total_size: 2 * 1024 * 1024 * 1024,
            },
            LimitsPreset::Relaxed => Limits {
                max_subkeys: 65_535,
                max_values: 16_384,
                max_value_size: 10 * 1024 * 1024,
                max_key_name_len: 255,
                max_value_name_len: 16_383,
                max_depth: 1024,
                max_total_size: 4 * 1024 * 1024 * 1024,
            },
            LimitsPreset::Strict => Limits {
                max_subkeys: 256,
                max_values: 1_024,
                max_value_size: 64 * 1024,
                max_key_name_len: 128,
                max_value_name_len: 255,
                max_depth: 128,
                max_total_size: 100 * 1024 * 1024,
            },
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::from_preset(LimitsPreset::Default)
    }
}

#[derive(Clone, Debug)]
pub struct PlanValue {
    pub name: String,
    pub value_type: RegType,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PlanKey {
    pub name: String,
    pub last_written: DateTime<Utc>,
    pub values: Vec<PlanValue>,
    pub children: Vec<PlanKey>,
    /// Hive-relative offset of this key's SK cell, inherited from the
    /// source hive (or from the parent, for a newly created key) so a
    /// commit doesn't orphan every key's security descriptor.
    pub security_key_offset: u32,
}

impl PlanKey {
    fn new(name: impl Into<String>) -> Self {
        PlanKey {
            name: name.into(),
            last_written: Utc::now(),
            values: Vec::new(),
            children: Vec::new(),
            security_key_offset: util::NIL_OFFSET,
        }
    }

    fn find_child_mut(&mut self, name: &str) -> Option<&mut PlanKey> {
        self.children.iter_mut().find(|c| util::names_eq_ci(&c.name, name))
    }

    fn find_value_mut(&mut self, name: &str) -> Option<&mut PlanValue> {
        self.values.iter_mut().find(|v| util::names_eq_ci(&v.name, name))
    }
}

fn materialize(reader: &Reader, node: &CellKeyNode) -> Result<PlanKey, Error> {
    let mut plan = PlanKey {
        name: node.key_name.clone(),
        last_written: node.last_key_written_date_and_time,
        values: Vec::with_capacity(node.sub_values.len()),
        children: Vec::new(),
        security_key_offset: node.detail.security_key_offset,
    };
    for value in &node.sub_values {
        let data = reader.read_bytes(value).unwrap_or_default();
        plan.values.push(PlanValue {
            name: value.value_name.clone(),
            value_type: value.detail.value_type,
            data,
        });
    }
    for child in reader.subkeys(node)? {
        plan.children.push(materialize(reader, &child)?);
    }
    Ok(plan)
}

/// A copy-on-write edit session against an already-open reader.
pub struct Transaction {
    root: PlanKey,
    limits: Limits,
}

impl Transaction {
    pub fn begin(reader: &Reader) -> Result<Self, Error> {
        let root_node = reader.root()?;
        Ok(Transaction {
            root: materialize(reader, &root_node)?,
            limits: Limits::default(),
        })
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    fn navigate_mut(&mut self, segments: &[String]) -> Option<&mut PlanKey> {
        let mut current = &mut self.root;
        for segment in segments {
            current = current.find_child_mut(segment)?;
        }
        Some(current)
    }

    /// Resolves every segment but the last, so the caller can act on the
    /// named leaf relative to its parent.
    fn navigate_parent_mut(&mut self, segments: &[String]) -> Result<&mut PlanKey, Error> {
        if segments.is_empty() {
            return Ok(&mut self.root);
        }
        self.navigate_mut(&segments[..segments.len() - 1])
            .ok_or_else(|| Error::not_found("parent of the target path does not exist"))
    }

    /// Creates `path`, materializing missing intermediate components when
    /// `create_parents` is set (spec §4.H `create_key`).
    pub fn create_key(&mut self, path: &str, create_parents: bool) -> Result<(), Error> {
        let segments = filter::normalize_path_preserve_case(path);
        if segments.len() as u32 > self.limits.max_depth {
            return Err(Error::sanity_limit("key depth exceeds the configured limit"));
        }
        let mut current = &mut self.root;
        for (i, segment) in segments.iter().enumerate() {
            if segment.len() > self.limits.max_key_name_len {
                return Err(Error::sanity_limit("key name exceeds the configured limit"));
            }
            if current.find_child_mut(segment).is_none() {
                if !create_parents && i + 1 < segments.len() {
                    return Err(Error::state("intermediate key does not exist and create_parents is false"));
                }
                if current.children.len() as u32 >= self.limits.max_subkeys {
                    return Err(Error::sanity_limit("subkey count exceeds the configured limit"));
                }
                let mut new_key = PlanKey::new(segment.clone());
                new_key.security_key_offset = current.security_key_offset;
                current.children.push(new_key);
            }
            current = current.find_child_mut(segment).expect("just inserted or already present");
        }
        Ok(())
    }

    /// Removes `path` from its parent's subkey list (spec §4.H
    /// `delete_key`). Non-recursive deletion of a key with children fails
    /// `State`.
    pub fn delete_key(&mut self, path: &str, recursive: bool) -> Result<(), Error> {
        let segments = filter::normalize_path(path);
        if segments.is_empty() {
            return Err(Error::state("cannot delete the root key"));
        }
        let target_name = segments.last().unwrap().clone();
        let parent = self.navigate_parent_mut(&segments)?;
        let target = parent
            .find_child_mut(&target_name)
            .ok_or_else(|| Error::not_found(format!("key '{}' does not exist", path)))?;
        if !recursive && !target.children.is_empty() {
            return Err(Error::state("key has subkeys; pass recursive to delete them"));
        }
        parent.children.retain(|c| !util::names_eq_ci(&c.name, &target_name));
        Ok(())
    }

    /// Creates or replaces a named value under `path` (spec §4.H
    /// `set_value`): existing entries of the same name (case-insensitive)
    /// are replaced in place; otherwise the value is appended.
    pub fn set_value(&mut self, path: &str, name: &str, value_type: RegType, data: Vec<u8>) -> Result<(), Error> {
        if name.len() > self.limits.max_value_name_len {
            return Err(Error::sanity_limit("value name exceeds the configured limit"));
        }
        if data.len() as u64 > self.limits.max_value_size {
            return Err(Error::sanity_limit("value data exceeds the configured limit"));
        }
        let segments = filter::normalize_path(path);
        let key = self
            .navigate_mut(&segments)
            .ok_or_else(|| Error::not_found(format!("key '{}' does not exist", path)))?;
        if let Some(existing) = key.find_value_mut(name) {
            existing.value_type = value_type;
            existing.data = data;
            return Ok(());
        }
        if key.values.len() as u32 >= self.limits.max_values {
            return Err(Error::sanity_limit("value count exceeds the configured limit"));
        }
        key.values.push(PlanValue { name: name.to_string(), value_type, data });
        Ok(())
    }

    /// Removes a value by case-insensitive name match (spec §4.H
    /// `delete_value`).
    pub fn delete_value(&mut self, path: &str, name: &str) -> Result<(), Error> {
        let segments = filter::normalize_path(path);
        let key = self
            .navigate_mut(&segments)
            .ok_or_else(|| Error::not_found(format!("key '{}' does not exist", path)))?;
        let before = key.values.len();
        key.values.retain(|v| !util::names_eq_ci(&v.name, name));
        if key.values.len() == before {
            return Err(Error::not_found(format!("value '{}' does not exist under '{}'", name, path)));
        }
        Ok(())
    }

    fn total_size_estimate(node: &PlanKey) -> u64 {
        let mut size = node.name.len() as u64 + 96; // rough NK overhead
        for value in &node.values {
            size += value.name.len() as u64 + value.data.len() as u64 + 40;
        }
        for child in &node.children {
            size += Transaction::total_size_estimate(child);
        }
        size
    }

    /// Lays the finished plan out as a fresh byte image and hands it to
    /// `writer` (spec §4.I).
    pub fn commit(self, writer: &mut dyn Writer, reader: &Reader, opts: CommitOptions) -> Result<(), Error> {
        if Transaction::total_size_estimate(&self.root) > self.limits.max_total_size {
            return Err(Error::sanity_limit("total hive size exceeds the configured limit"));
        }
        emitter::emit(reader, &self.root, opts, writer)
    }

    /// Discards the transaction without writing anything.
    pub fn rollback(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> PlanKey {
        PlanKey::new(name)
    }

    #[test]
    fn test_create_key_nested_with_parents() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        txn.create_key(r"Software\Vendor", true).unwrap();
        assert_eq!(1, txn.root.children.len());
        assert_eq!("Software", txn.root.children[0].name);
        assert_eq!(1, txn.root.children[0].children.len());
    }

    #[test]
    fn test_create_key_preserves_case_while_matching_case_insensitively() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        txn.create_key("Software", true).unwrap();
        // A second create_key with different casing must not duplicate the
        // existing child; the stored name keeps its original casing.
        txn.create_key("SOFTWARE", true).unwrap();
        assert_eq!(1, txn.root.children.len());
        assert_eq!("Software", txn.root.children[0].name);
    }

    #[test]
    fn test_create_key_without_parents_fails() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        assert!(txn.create_key(r"Software\Vendor", false).is_err());
    }

    #[test]
    fn test_set_value_then_replace() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        txn.create_key("Software", true).unwrap();
        txn.set_value("Software", "Count", RegType::Dword, vec![1, 0, 0, 0]).unwrap();
        txn.set_value("Software", "Count", RegType::Dword, vec![2, 0, 0, 0]).unwrap();
        let key = txn.navigate_mut(&["software".to_string()]).unwrap();
        assert_eq!(1, key.values.len());
        assert_eq!(vec![2, 0, 0, 0], key.values[0].data);
    }

    #[test]
    fn test_delete_value_not_found() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        txn.create_key("Software", true).unwrap();
        assert!(txn.delete_value("Software", "Missing").is_err());
    }

    #[test]
    fn test_delete_key_non_recursive_with_children_fails() {
        let mut txn = Transaction { root: leaf(""), limits: Limits::default() };
        txn.create_key(r"Software\Vendor", true).unwrap();
        assert!(txn.delete_key("Software", false).is_err());
        assert!(txn.delete_key("Software", true).is_ok());
        assert!(txn.root.children.is_empty());
    }

    #[test]
    fn test_limits_preset_values() {
        let strict = Limits::from_preset(LimitsPreset::Strict);
        assert_eq!(256, strict.max_subkeys);
        assert_eq!(1_024, strict.max_values);
    }
}
