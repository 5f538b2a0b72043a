use std::collections::BTreeMap;

use crate::record::EntityState;

/// Builds the feature matrix for one classification cycle:
/// `[one-hot entity id | total | count]` per entity, in snapshot order.
///
/// The one-hot columns are the sorted distinct identifiers of this snapshot only, so a
/// column index means nothing outside the cycle that built it.
pub fn feature_matrix(snapshot: &[EntityState]) -> Vec<Vec<f64>> {
    let categories: BTreeMap<&str, usize> = {
        let mut ids: Vec<&str> = snapshot.iter().map(|s| s.entity_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect()
    };
    let width = categories.len() + 2;

    snapshot
        .iter()
        .map(|state| {
            let mut row = vec![0.0; width];
            row[categories[state.entity_id.as_str()]] = 1.0;
            row[width - 2] = state.total;
            row[width - 1] = state.count as f64;
            row
        })
        .collect()
}
