use toml::{Table, Value};

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a Table for the same key, recurse.
/// Otherwise, `overlay`'s value wins.
pub fn deep_merge(mut base: Table, overlay: Table) -> Table {
    for (key, overlay_val) in overlay {
        match (base.remove(&key), overlay_val) {
            (Some(Value::Table(base_tbl)), Value::Table(overlay_tbl)) => {
                base.insert(key, Value::Table(deep_merge(base_tbl, overlay_tbl)));
            }
            (_, overlay_val) => {
                base.insert(key, overlay_val);
            }
        }
    }
    base
}

/// Set `value` at a dotted key, creating intermediate tables.
///
/// A scalar standing where an intermediate table is needed is replaced: the
/// higher layer owns the whole subtree it writes into.
pub(crate) fn insert_dotted(table: &mut Table, dotted_key: &str, value: Value) {
    let (parents, leaf) = match dotted_key.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, dotted_key),
    };

    let mut current = table;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            let slot = current
                .entry(segment)
                .or_insert_with(|| Value::Table(Table::new()));
            if !slot.is_table() {
                *slot = Value::Table(Table::new());
            }
            let Some(next) = slot.as_table_mut() else {
                return;
            };
            current = next;
        }
    }
    current.insert(leaf.to_string(), value);
}

/// Navigate a table by dotted key path (e.g. `"log.limit.warn"`).
pub(crate) fn get_dotted<'a>(table: &'a Table, dotted_key: &str) -> Option<&'a Value> {
    let (path, leaf) = match dotted_key.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, dotted_key),
    };

    let tbl = match path {
        Some(path) => {
            let mut current = table;
            for segment in path.split('.') {
                current = current.get(segment)?.as_table()?;
            }
            current
        }
        None => table,
    };

    tbl.get(leaf)
}
