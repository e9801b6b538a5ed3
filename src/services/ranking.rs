// src/services/ranking.rs

use crate::{
    config::TieBreak,
    models::result::{Cohort, Placement, ResultRecord},
    store::{ResultStore, StoreResult},
};

/// Rank `results` by average, highest first.
///
/// Missing or non-finite averages rank as 0. The sort is stable, so under
/// [`TieBreak::LoadOrder`] equal averages keep their input order.
pub fn rank_cohort(results: &[ResultRecord], tie_break: TieBreak) -> Vec<Placement> {
    let mut ordered: Vec<(&ResultRecord, f64)> = results
        .iter()
        .map(|result| (result, result.ranking_average()))
        .collect();
    ordered.sort_by(|(_, a), (_, b)| b.total_cmp(a));

    let out_of = ordered.len() as i32;
    let mut placements = Vec::with_capacity(ordered.len());
    let mut previous: Option<(f64, i32)> = None;

    for (index, (result, average)) in ordered.into_iter().enumerate() {
        let position = match (tie_break, previous) {
            (TieBreak::Shared, Some((prev_average, prev_position))) if prev_average == average => {
                prev_position
            }
            _ => index as i32 + 1,
        };
        previous = Some((average, position));
        placements.push(Placement {
            result_id: result.id,
            position,
            out_of,
        });
    }

    placements
}

/// Recompute and persist positions for every result in `cohort`.
///
/// Returns how many results were ranked.
pub async fn recalculate<S>(store: &S, cohort: &Cohort, tie_break: TieBreak) -> StoreResult<usize>
where
    S: ResultStore + ?Sized,
{
    let members = store.list_cohort(cohort).await?;
    let placements = rank_cohort(&members, tie_break);
    store.apply_placements(&placements).await?;

    tracing::debug!(
        "Ranked {} results for {} {} {}",
        placements.len(),
        cohort.class_name,
        cohort.session,
        cohort.term
    );

    Ok(placements.len())
}

/// [`recalculate`] after a result write. Failures are logged, never returned,
/// so the write that triggered it still succeeds.
pub async fn recalculate_best_effort<S>(store: &S, cohort: &Cohort, tie_break: TieBreak)
where
    S: ResultStore + ?Sized,
{
    if let Err(e) = recalculate(store, cohort, tie_break).await {
        tracing::error!(
            "Failed to recalculate positions for {} {} {}: {}",
            cohort.class_name,
            cohort.session,
            cohort.term,
            e
        );
    }
}
