//! Candidate Reduction
//!
//! Discretizes raw directional observations into 12 uniform 30-degree
//! heading bins and keeps the nearest observation per bin, so the model is
//! shown at most one candidate per direction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{NavError, NavResult};
use crate::types::{Candidate, CandidateObservation, ViewIndex, HEADING_BIN_DEG};

/// Map a fine-grained raw heading index to one of 12 uniform bins.
/// Bin 12 wraps to bin 0. The exact formula is load-bearing: recorded
/// trajectories are only reproducible if it never changes.
fn heading_bin(raw: i64) -> i64 {
    (12 - ((raw + 5).div_euclid(10))).rem_euclid(12)
}

/// Scan in input order and keep, per occupied bin, the position of the
/// entry with the smallest distance. Exact ties keep the first entry seen.
/// Returned positions are in first-occurrence order of their bins.
fn retain_min_per_bin(heading_idxs: &[i64], distances: &[f64]) -> Vec<usize> {
    // (bin, kept input position)
    let mut kept: Vec<(i64, usize)> = Vec::new();

    for (pos, (&h, &d)) in heading_idxs.iter().zip(distances.iter()).enumerate() {
        let bin = heading_bin(h);
        match kept.iter_mut().find(|(b, _)| *b == bin) {
            Some((_, best)) => {
                if d < distances[*best] {
                    *best = pos;
                }
            }
            None => kept.push((bin, pos)),
        }
    }

    kept.into_iter().map(|(_, pos)| pos).collect()
}

/// Reduce parallel heading/distance sequences to one pair per occupied bin.
///
/// Both sequences must have the same length. Output order is the
/// first-occurrence order of each bin, not bin-numeric order; at most 12
/// pairs come back, each carrying the minimum distance seen for its bin.
pub fn filter_minimum_distances(
    heading_idxs: &[i64],
    distance_idxs: &[f64],
) -> NavResult<(Vec<i64>, Vec<f64>)> {
    if heading_idxs.len() != distance_idxs.len() {
        return Err(NavError::Input(format!(
            "heading_idxs and distance_idxs must have the same length ({} vs {})",
            heading_idxs.len(),
            distance_idxs.len()
        )));
    }

    let kept = retain_min_per_bin(heading_idxs, distance_idxs);
    Ok((
        kept.iter().map(|&i| heading_idxs[i]).collect(),
        kept.iter().map(|&i| distance_idxs[i]).collect(),
    ))
}

/// Reduce raw observations to one candidate per occupied heading bin.
///
/// Applies the same per-bin minimum-distance rule as
/// [`filter_minimum_distances`], then builds the step's immutable candidate
/// set: retained JPEG payloads are base64-encoded, the heading snaps to the
/// bin center, and the point id combines the observation's elevation level
/// with the bin.
pub fn build_candidates(observations: &[CandidateObservation]) -> NavResult<Vec<Candidate>> {
    let headings: Vec<i64> = observations.iter().map(|o| o.heading_idx).collect();
    let distances: Vec<f64> = observations.iter().map(|o| o.distance).collect();

    retain_min_per_bin(&headings, &distances)
        .into_iter()
        .map(|pos| {
            let obs = &observations[pos];
            let bin = heading_bin(obs.heading_idx);
            Ok(Candidate {
                viewpoint_id: obs.viewpoint_id.clone(),
                point_id: ViewIndex::from_parts(obs.elevation_level, bin as u8)?,
                selection_index: obs.selection_index,
                image: obs
                    .image_jpeg
                    .as_deref()
                    .map(|bytes| BASE64.encode(bytes)),
                heading_deg: bin as f64 * HEADING_BIN_DEG,
                distance: obs.distance,
            })
        })
        .collect()
}
