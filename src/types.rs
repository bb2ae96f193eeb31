//! Wayfarer - Type Definitions
//!
//! Shared types and port traits for the navigation core: view-index
//! geometry, candidates, episode state, decision records, and the
//! interfaces to the simulator, the prompt/memory collaborator, and the
//! inference transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult, TransportError};

// ─── View Geometry ───────────────────────────────────────────────

/// Heading bins per elevation level (each bin spans 30 degrees).
pub const HEADING_BINS: u8 = 12;

/// Discrete elevation levels (down, horizon, up).
pub const ELEVATION_LEVELS: u8 = 3;

/// Total discrete sub-views of one panorama.
pub const VIEWS_PER_PANO: u8 = HEADING_BINS * ELEVATION_LEVELS;

/// Angular width of one heading bin, in degrees.
pub const HEADING_BIN_DEG: f64 = 30.0;

/// A discrete sub-view of a panorama: one of 36 positions, decomposable
/// into an elevation level (0..3, level 1 is the horizon) and a heading
/// bin (0..12). Always in range by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewIndex(u8);

impl ViewIndex {
    /// Build a view index, rejecting anything outside `0..36`.
    pub fn new(index: u8) -> NavResult<Self> {
        if index >= VIEWS_PER_PANO {
            return Err(NavError::Input(format!(
                "view index {} out of range 0..{}",
                index, VIEWS_PER_PANO
            )));
        }
        Ok(Self(index))
    }

    /// Build a view index from an elevation level and a heading bin.
    pub fn from_parts(level: u8, heading_bin: u8) -> NavResult<Self> {
        if level >= ELEVATION_LEVELS {
            return Err(NavError::Input(format!(
                "elevation level {} out of range 0..{}",
                level, ELEVATION_LEVELS
            )));
        }
        if heading_bin >= HEADING_BINS {
            return Err(NavError::Input(format!(
                "heading bin {} out of range 0..{}",
                heading_bin, HEADING_BINS
            )));
        }
        Ok(Self(level * HEADING_BINS + heading_bin))
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    /// Elevation level: 0 = looking down, 1 = horizon, 2 = looking up.
    pub fn level(&self) -> u8 {
        self.0 / HEADING_BINS
    }

    /// Heading bin within the level, clockwise.
    pub fn heading_bin(&self) -> u8 {
        self.0 % HEADING_BINS
    }

    /// Heading of the bin center in degrees.
    pub fn heading_deg(&self) -> f64 {
        self.heading_bin() as f64 * HEADING_BIN_DEG
    }
}

// ─── Candidates ──────────────────────────────────────────────────

/// A navigable neighboring viewpoint, annotated for one rollout step.
/// Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Stable identifier of the target viewpoint in the navigation graph.
    pub viewpoint_id: String,
    /// Sub-view of the current panorama that faces this candidate.
    pub point_id: ViewIndex,
    /// Index into the simulator's navigable-locations list.
    pub selection_index: usize,
    /// Base64-encoded JPEG of the view toward this candidate, if captured.
    pub image: Option<String>,
    pub heading_deg: f64,
    pub distance: f64,
}

/// A raw per-direction observation, before heading-bin reduction.
/// Supplied by the observation collaborator each step.
#[derive(Clone, Debug)]
pub struct CandidateObservation {
    pub viewpoint_id: String,
    pub selection_index: usize,
    /// Fine-grained raw heading index, reduced to one of 12 bins.
    pub heading_idx: i64,
    /// Elevation level of the observation (1 = horizon).
    pub elevation_level: u8,
    pub distance: f64,
    /// Raw JPEG bytes of the view, if captured.
    pub image_jpeg: Option<Vec<u8>>,
}

// ─── Episode State ───────────────────────────────────────────────

/// Per-episode navigation state. Created at episode start, threaded through
/// every rollout step, discarded at episode end. Mutated only by the action
/// executor (successful move) and the agent (stop).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub episode_id: String,
    pub current_viewpoint: String,
    pub current_view_index: ViewIndex,
    /// Ordered viewpoint identifiers visited so far, starting point included.
    pub trajectory: Vec<String>,
    pub step: usize,
    pub ended: bool,
}

impl NavigationState {
    pub fn new(start_viewpoint: String, start_view_index: ViewIndex) -> Self {
        Self {
            episode_id: uuid::Uuid::new_v4().to_string(),
            trajectory: vec![start_viewpoint.clone()],
            current_viewpoint: start_viewpoint,
            current_view_index: start_view_index,
            step: 0,
            ended: false,
        }
    }
}

// ─── Decisions ───────────────────────────────────────────────────

/// Schema-checked decision object produced by the model. Both decode paths
/// (free text and structured output) end in one of these.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NavDecision {
    #[serde(rename = "Thought", default)]
    pub thought: Option<String>,
    #[serde(rename = "Action", default)]
    pub action: Option<String>,
    #[serde(rename = "Planning", default)]
    pub planning: Option<String>,
}

/// One step's parsed decision. Produced once per step, consumed immediately.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDecision {
    /// Verbatim answer text from the model.
    pub raw_output: String,
    /// Zero-based option index, `None` when the answer did not parse.
    pub action_index: Option<usize>,
    pub tokens_used: u64,
}

/// The resolved action for a step, after fallback policy is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavAction {
    /// Terminate the episode at the current viewpoint.
    Stop,
    /// Move to the candidate at this index.
    MoveTo(usize),
}

/// Record of one completed turn, handed to the prompt/memory port.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub id: String,
    pub step: usize,
    pub decision: ActionDecision,
    pub timestamp: String,
}

impl TurnRecord {
    pub fn new(step: usize, decision: ActionDecision) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step,
            decision,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─── Inference ───────────────────────────────────────────────────

/// How the model is asked to answer, and how the answer is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Free-text answer, decoded by scanning for the action grammar.
    Text,
    /// Structured JSON object answer, decoded by deserialization.
    Json,
}

/// Structured-output directive for the request payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

impl ResponseFormat {
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
        }
    }
}

/// A validated inference answer.
#[derive(Clone, Debug)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
}

/// One transport round trip: serialize the request body, move it to the
/// endpoint, bring back the parsed JSON response. Retry, backoff, and
/// per-attempt timeouts live above this interface, so the underlying
/// transport (HTTP client, RPC stub, test double) is swappable without
/// touching retry logic.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn round_trip(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, TransportError>;
}

// ─── Simulator Port ──────────────────────────────────────────────

/// A primitive camera/move command understood by the simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Up,
    Down,
    Left,
    Right,
    Forward,
    /// Move to the navigable location at this index.
    MoveTo(usize),
}

/// A neighboring location reachable from the current view.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigableLocation {
    pub viewpoint_id: String,
}

/// The simulator's reported view state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimView {
    pub view_index: ViewIndex,
    pub viewpoint_id: String,
    pub navigable: Vec<NavigableLocation>,
}

/// Narrow port over the panorama simulator. Implemented by an adapter so
/// the executor never touches any single simulator's internals.
#[async_trait]
pub trait SimulatorPort: Send + Sync {
    async fn apply(&self, cmd: Primitive) -> anyhow::Result<()>;
    async fn current(&self) -> anyhow::Result<SimView>;
}

// ─── Prompt / Memory Port ────────────────────────────────────────

/// Per-step prompt payload supplied by the external prompt collaborator.
#[derive(Clone, Debug)]
pub struct NavPrompt {
    pub task_description: String,
    pub prompt: String,
    /// Option labels shown to the model, the reserved stop option last.
    pub option_labels: Vec<String>,
    /// Base64 image payloads, `None` slots kept so indices stay aligned.
    pub images: Vec<Option<String>>,
}

/// System/user text pair for captioning one candidate image.
#[derive(Clone, Debug)]
pub struct CaptionPrompt {
    pub task_description: String,
    pub prompt: String,
}

/// Everything the prompt collaborator needs to assemble one step's prompt.
pub struct StepContext<'a> {
    pub candidates: &'a [Candidate],
    pub captions: &'a [String],
    pub step: usize,
    pub mode: OutputMode,
}

/// Port to the external prompt/memory collaborator: supplies the per-step
/// payload and keeps the episode history.
pub trait PromptPort: Send {
    fn caption_prompt(&self) -> CaptionPrompt;
    fn build_step(&mut self, ctx: StepContext<'_>) -> anyhow::Result<NavPrompt>;
    fn record_turn(&mut self, turn: &TurnRecord) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_index_decomposes_into_level_and_bin() {
        let v = ViewIndex::new(14).unwrap();
        assert_eq!(v.level(), 1);
        assert_eq!(v.heading_bin(), 2);
        assert_eq!(v.heading_deg(), 60.0);

        let v = ViewIndex::new(26).unwrap();
        assert_eq!(v.level(), 2);
        assert_eq!(v.heading_bin(), 2);
    }

    #[test]
    fn view_index_rejects_out_of_range() {
        assert!(ViewIndex::new(35).is_ok());
        assert!(ViewIndex::new(36).is_err());
        assert!(ViewIndex::from_parts(3, 0).is_err());
        assert!(ViewIndex::from_parts(0, 12).is_err());
    }

    #[test]
    fn view_index_round_trips_through_parts() {
        for index in 0..VIEWS_PER_PANO {
            let v = ViewIndex::new(index).unwrap();
            let rebuilt = ViewIndex::from_parts(v.level(), v.heading_bin()).unwrap();
            assert_eq!(rebuilt, v);
        }
    }

    #[test]
    fn navigation_state_starts_with_the_initial_viewpoint() {
        let state = NavigationState::new("vp-start".to_string(), ViewIndex::new(12).unwrap());
        assert_eq!(state.trajectory, vec!["vp-start".to_string()]);
        assert_eq!(state.current_viewpoint, "vp-start");
        assert_eq!(state.step, 0);
        assert!(!state.ended);
    }

    #[test]
    fn nav_decision_deserializes_from_model_keys() {
        let decision: NavDecision =
            serde_json::from_str(r#"{"Thought":"go left","Action":"Waypoint_2"}"#).unwrap();
        assert_eq!(decision.action.as_deref(), Some("Waypoint_2"));
        assert_eq!(decision.thought.as_deref(), Some("go left"));
        assert!(decision.planning.is_none());
    }
}
