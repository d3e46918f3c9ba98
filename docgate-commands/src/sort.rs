//! In-memory sorting of query results.

use std::cmp::Ordering;

use docgate_core::{
    Document,
    compare::sort_order,
    query::{Sort, SortDirection},
};

/// Sorts documents by the given keys.
///
/// Missing fields sort before null and null before every other value. The sort is stable, so
/// documents whose keys do not order keep their input order.
pub fn sort_documents(docs: &mut [Document], sort: &[Sort]) {
    if sort.is_empty() {
        return;
    }

    docs.sort_by(|a, b| compare_documents(a, b, sort));
}

fn compare_documents(a: &Document, b: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let ordering = sort_order(a.get_path(&key.field), b.get_path(&key.field));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
