//! Dependency ordering of reflected tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::schema::Table;

/// Order tables so that referenced tables come before the tables that
/// reference them (Kahn's algorithm).
///
/// Ties are broken by name, so the result is deterministic. Self references
/// and references to tables outside the set are ignored. When a cycle leaves
/// no table ready, the remaining table with the smallest name is released
/// and ordering continues.
pub fn dependency_order(tables: Vec<Table>) -> Vec<Table> {
    let names: BTreeSet<String> = tables.iter().map(|t| t.name.clone()).collect();

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for table in &tables {
        let parents: BTreeSet<&str> = table
            .referenced_tables()
            .filter(|r| names.contains(*r))
            .collect();
        in_degree.insert(table.name.as_str(), parents.len());
        for parent in parents {
            dependents.entry(parent).or_default().push(table.name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(tables.len());

    while !in_degree.is_empty() {
        let current = match ready.pop_first() {
            Some(name) => name,
            None => {
                // Cycle: release the smallest remaining name.
                let Some((&name, _)) = in_degree.iter().next() else {
                    break;
                };
                debug!("Breaking foreign key cycle at table {}", name);
                name
            }
        };
        if in_degree.remove(current).is_none() {
            continue;
        }
        order.push(current.to_string());

        for &child in dependents.get(current).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut tables = tables;
    tables.sort_by_key(|t| position.get(t.name.as_str()).copied().unwrap_or(usize::MAX));
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;

    fn table(name: &str, refs: &[&str]) -> Table {
        Table {
            schema: "public".into(),
            name: name.into(),
            columns: vec![],
            foreign_keys: refs
                .iter()
                .map(|r| ForeignKey {
                    name: format!("fk_{}_{}", name, r),
                    ref_table: r.to_string(),
                    ref_schema: "public".into(),
                })
                .collect(),
        }
    }

    fn names(tables: &[Table]) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_parents_before_children() {
        let ordered = dependency_order(vec![
            table("order_items", &["orders", "products"]),
            table("orders", &["customers"]),
            table("products", &[]),
            table("customers", &[]),
        ]);
        assert_eq!(
            names(&ordered),
            vec!["customers", "orders", "products", "order_items"]
        );
    }

    #[test]
    fn test_independent_tables_sorted_by_name() {
        let ordered = dependency_order(vec![table("b", &[]), table("c", &[]), table("a", &[])]);
        assert_eq!(names(&ordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_self_reference_ignored() {
        let ordered = dependency_order(vec![table("employees", &["employees"]), table("a", &[])]);
        assert_eq!(names(&ordered), vec!["a", "employees"]);
    }

    #[test]
    fn test_cycle_broken_deterministically() {
        let ordered = dependency_order(vec![
            table("y", &["x"]),
            table("x", &["y"]),
            table("z", &["y"]),
        ]);
        assert_eq!(names(&ordered), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_external_reference_ignored() {
        let ordered = dependency_order(vec![table("orders", &["elsewhere"])]);
        assert_eq!(names(&ordered), vec!["orders"]);
    }

    #[test]
    fn test_empty() {
        assert!(dependency_order(vec![]).is_empty());
    }
}
