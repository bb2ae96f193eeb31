//! Action Executor
//!
//! Translates a chosen candidate into the ordered primitive commands that
//! bring the simulator camera onto the candidate's sub-view, then moves.
//! Vertical alignment is strict level-by-level; rotation is monotonic
//! single-step clockwise. Each primitive completes before the next is
//! issued, and the post-move state must name the candidate's viewpoint.

use tracing::{debug, info};

use crate::error::{NavError, NavResult};
use crate::types::{Candidate, NavigationState, Primitive, SimulatorPort, HEADING_BINS};

/// Execute one step's resolved action against the simulator.
///
/// `None` is the stop sentinel: no primitives are issued, the episode is
/// marked ended, and the location is unchanged. Otherwise the camera is
/// aligned to the candidate's point id and a move is issued. A simulator
/// state that disagrees with the expected target at any checkpoint is a
/// fatal desynchronization; the episode must abort, never retry.
pub async fn execute_move(
    sim: &dyn SimulatorPort,
    selected: Option<&Candidate>,
    nav: &mut NavigationState,
) -> NavResult<()> {
    let Some(candidate) = selected else {
        info!(episode = %nav.episode_id, step = nav.step, "stop action, ending episode");
        nav.ended = true;
        return Ok(());
    };

    let view = sim.current().await.map_err(NavError::Simulator)?;
    let target_level = candidate.point_id.level();
    let mut level = view.view_index.level();

    // Vertical alignment, one level at a time.
    while level < target_level {
        sim.apply(Primitive::Up).await.map_err(NavError::Simulator)?;
        level += 1;
    }
    while level > target_level {
        sim.apply(Primitive::Down)
            .await
            .map_err(NavError::Simulator)?;
        level -= 1;
    }

    // Rotate clockwise until the simulator reports the target sub-view.
    // One full revolution without a match means the camera is not where
    // this side of the conversation thinks it is.
    let mut rotations = 0u8;
    let aligned = loop {
        let view = sim.current().await.map_err(NavError::Simulator)?;
        if view.view_index == candidate.point_id {
            break view;
        }
        if rotations >= HEADING_BINS {
            return Err(NavError::Desync {
                expected: format!("view index {}", candidate.point_id.index()),
                actual: format!("view index {}", view.view_index.index()),
            });
        }
        sim.apply(Primitive::Right)
            .await
            .map_err(NavError::Simulator)?;
        rotations += 1;
    };

    // The navigable location the move will use must name the candidate.
    let nav_loc = aligned
        .navigable
        .get(candidate.selection_index)
        .ok_or_else(|| NavError::Desync {
            expected: format!("navigable location {}", candidate.selection_index),
            actual: format!("{} navigable locations", aligned.navigable.len()),
        })?;
    if nav_loc.viewpoint_id != candidate.viewpoint_id {
        return Err(NavError::Desync {
            expected: candidate.viewpoint_id.clone(),
            actual: nav_loc.viewpoint_id.clone(),
        });
    }

    sim.apply(Primitive::MoveTo(candidate.selection_index))
        .await
        .map_err(NavError::Simulator)?;

    let after = sim.current().await.map_err(NavError::Simulator)?;
    if after.viewpoint_id != candidate.viewpoint_id {
        return Err(NavError::Desync {
            expected: candidate.viewpoint_id.clone(),
            actual: after.viewpoint_id.clone(),
        });
    }

    debug!(
        episode = %nav.episode_id,
        step = nav.step,
        viewpoint = %after.viewpoint_id,
        "moved to candidate"
    );

    nav.current_viewpoint = after.viewpoint_id.clone();
    nav.current_view_index = after.view_index;
    nav.trajectory.push(after.viewpoint_id);
    Ok(())
}
