use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::dates::SnapshotDate;
use crate::snapshot_store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Added { value: Value },
    Removed { value: Value },
    Changed { old: Value, new: Value },
}

impl Change {
    fn inverted(self) -> Self {
        match self {
            Self::Added { value } => Self::Removed { value },
            Self::Removed { value } => Self::Added { value },
            Self::Changed { old, new } => Self::Changed { old: new, new: old },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub path: String,
    #[serde(flatten)]
    pub change: Change,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDiff {
    entries: Vec<DiffEntry>,
}

impl JsonDiff {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The same diff seen from the other side: added and removed swap, old and new swap.
    pub fn inverted(self) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|entry| DiffEntry {
                    path: entry.path,
                    change: entry.change.inverted(),
                })
                .collect(),
        }
    }
}

pub fn diff_values(old: &Value, new: &Value) -> JsonDiff {
    let mut entries = Vec::new();
    diff_at(String::new(), old, new, &mut entries);
    JsonDiff { entries }
}

/// `None` when either snapshot is missing or unparsable.
pub fn diff_snapshots(
    store: &SnapshotStore,
    older: SnapshotDate,
    newer: SnapshotDate,
) -> Option<JsonDiff> {
    let old = match store.load(older) {
        Ok(value) => value,
        Err(err) => {
            debug!("no diff available: {err}");
            return None;
        }
    };
    let new = match store.load(newer) {
        Ok(value) => value,
        Err(err) => {
            debug!("no diff available: {err}");
            return None;
        }
    };

    Some(diff_values(&old, &new))
}

fn diff_at(path: String, old: &Value, new: &Value, out: &mut Vec<DiffEntry>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            diff_objects(&path, old_map, new_map, out)
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            diff_arrays(&path, old_items, new_items, out)
        }
        _ => out.push(DiffEntry {
            path,
            change: Change::Changed {
                old: old.clone(),
                new: new.clone(),
            },
        }),
    }
}

fn diff_objects(
    path: &str,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    out: &mut Vec<DiffEntry>,
) {
    for (key, old_value) in old {
        let child = child_path(path, key);
        match new.get(key) {
            Some(new_value) => diff_at(child, old_value, new_value, out),
            None => out.push(DiffEntry {
                path: child,
                change: Change::Removed {
                    value: old_value.clone(),
                },
            }),
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.push(DiffEntry {
                path: child_path(path, key),
                change: Change::Added {
                    value: new_value.clone(),
                },
            });
        }
    }
}

// Equal elements are paired by order of occurrence before anything is reported,
// so an insertion near the front of a long list does not shift every later element.
fn diff_arrays(path: &str, old: &[Value], new: &[Value], out: &mut Vec<DiffEntry>) {
    let mut unpaired_old: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (index, value) in old.iter().enumerate() {
        unpaired_old
            .entry(value.to_string())
            .or_default()
            .push_back(index);
    }

    let mut old_paired = vec![false; old.len()];
    let mut new_paired = vec![false; new.len()];
    for (index, value) in new.iter().enumerate() {
        if let Some(old_index) = unpaired_old
            .get_mut(&value.to_string())
            .and_then(VecDeque::pop_front)
        {
            old_paired[old_index] = true;
            new_paired[index] = true;
        }
    }

    for index in 0..old.len().max(new.len()) {
        let old_left = old.get(index).filter(|_| !old_paired[index]);
        let new_left = new.get(index).filter(|_| !new_paired[index]);
        let child = child_path(path, &index.to_string());

        match (old_left, new_left) {
            (Some(old_value), Some(new_value)) => diff_at(child, old_value, new_value, out),
            (Some(old_value), None) => out.push(DiffEntry {
                path: child,
                change: Change::Removed {
                    value: old_value.clone(),
                },
            }),
            (None, Some(new_value)) => out.push(DiffEntry {
                path: child,
                change: Change::Added {
                    value: new_value.clone(),
                },
            }),
            (None, None) => {}
        }
    }
}

fn child_path(parent: &str, token: &str) -> String {
    let escaped = token.replace('~', "~0").replace('/', "~1");
    format!("{parent}/{escaped}")
}
