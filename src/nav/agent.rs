//! The Navigation Agent
//!
//! One rollout step: observe -> infer -> parse -> move -> remember.
//! The agent owns a single trajectory; gathering observations, building
//! prompt text, and keeping episode history belong to the external
//! collaborators behind the ports. Cancellation of an episode is honored
//! only between steps, never inside a primitive sequence.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AgentConfig, JSON_MODEL, TEXT_MODEL};
use crate::error::{NavError, NavResult};
use crate::inference::NavInferenceClient;
use crate::types::{
    ActionDecision, Candidate, CandidateObservation, NavAction, NavDecision, NavigationState,
    OutputMode, PromptPort, ResponseFormat, SimulatorPort, StepContext, TurnRecord,
};

use super::candidates::build_candidates;
use super::executor::execute_move;
use super::parser::extract_waypoint_number;

/// Result of one rollout step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub decision: ActionDecision,
    pub action: NavAction,
    pub ended: bool,
}

/// Orchestrates one trajectory against the simulator and the remote model.
pub struct NavigationAgent {
    config: AgentConfig,
    client: NavInferenceClient,
    sim: Arc<dyn SimulatorPort>,
    prompts: Box<dyn PromptPort>,
    state: NavigationState,
}

impl NavigationAgent {
    /// Start an episode at the simulator's current viewpoint.
    pub async fn begin_episode(
        config: AgentConfig,
        client: NavInferenceClient,
        sim: Arc<dyn SimulatorPort>,
        prompts: Box<dyn PromptPort>,
    ) -> NavResult<Self> {
        if client.model() != config.model {
            return Err(NavError::Config(format!(
                "client model {} does not match agent model {}",
                client.model(),
                config.model
            )));
        }

        let view = sim.current().await.map_err(NavError::Simulator)?;
        let state = NavigationState::new(view.viewpoint_id, view.view_index);
        info!(episode = %state.episode_id, start = %state.current_viewpoint, "episode started");

        Ok(Self {
            config,
            client,
            sim,
            prompts,
            state,
        })
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn ended(&self) -> bool {
        self.state.ended
    }

    /// Run one rollout step over the supplied raw observations.
    ///
    /// Fatal errors (transport exhaustion, protocol violations, simulator
    /// desynchronization) propagate to the caller, who ends the episode.
    /// Unparseable answers are recoverable and fall back to the stop action.
    pub async fn rollout_step(
        &mut self,
        observations: &[CandidateObservation],
    ) -> NavResult<StepOutcome> {
        if self.state.ended {
            return Err(NavError::Input("episode has already ended".to_string()));
        }

        // Exactly two request shapes are supported; reject anything else
        // before any network activity.
        validate_pairing(&self.config.model, self.config.output_mode)?;

        let candidates = build_candidates(observations)?;

        let captions = if self.config.caption_images {
            self.caption_candidates(&candidates).await?
        } else {
            Vec::new()
        };

        let nav_prompt = self
            .prompts
            .build_step(StepContext {
                candidates: &candidates,
                captions: &captions,
                step: self.state.step,
                mode: self.config.output_mode,
            })
            .map_err(NavError::Prompt)?;

        let response_format = match self.config.output_mode {
            OutputMode::Json => Some(ResponseFormat::JsonObject),
            OutputMode::Text => None,
        };

        let completion = self
            .client
            .infer(
                &nav_prompt.task_description,
                &nav_prompt.prompt,
                &nav_prompt.images,
                response_format,
            )
            .await?;

        let decision = match self.config.output_mode {
            OutputMode::Json => decode_structured(&completion.text),
            OutputMode::Text => decode_free_text(&completion.text),
        };

        // The option list shown to the model is the candidates plus the
        // reserved stop slot at the end.
        let option_count = candidates.len() + 1;
        let parsed = extract_waypoint_number(&decision, option_count);

        let action = match parsed {
            Some(i) if i + 1 == option_count => NavAction::Stop,
            Some(i) if i < candidates.len() => NavAction::MoveTo(i),
            Some(i) => {
                warn!(index = i, options = option_count, "chosen waypoint out of range, stopping");
                NavAction::Stop
            }
            None => {
                warn!(answer = %completion.text, "answer did not parse, stopping");
                NavAction::Stop
            }
        };

        let step = self.state.step;
        match action {
            NavAction::Stop => execute_move(self.sim.as_ref(), None, &mut self.state).await?,
            NavAction::MoveTo(i) => {
                execute_move(self.sim.as_ref(), Some(&candidates[i]), &mut self.state).await?
            }
        }
        self.state.step += 1;

        let decision_record = ActionDecision {
            raw_output: completion.text,
            action_index: parsed,
            tokens_used: completion.total_tokens,
        };
        self.prompts
            .record_turn(&TurnRecord::new(step, decision_record.clone()))
            .map_err(NavError::Prompt)?;

        Ok(StepOutcome {
            decision: decision_record,
            action,
            ended: self.state.ended,
        })
    }

    /// Caption every candidate image through the inference client. Slots
    /// without an image get an empty caption so indices stay aligned.
    async fn caption_candidates(&self, candidates: &[Candidate]) -> NavResult<Vec<String>> {
        let prompt = self.prompts.caption_prompt();
        let mut captions = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match &candidate.image {
                Some(image) => {
                    let completion = self
                        .client
                        .caption(&prompt.task_description, &prompt.prompt, image)
                        .await?;
                    captions.push(completion.text);
                }
                None => captions.push(String::new()),
            }
        }

        Ok(captions)
    }
}

/// The two supported request shapes: the free-text model with text
/// parsing, or the structured-output model with JSON parsing.
fn validate_pairing(model: &str, mode: OutputMode) -> NavResult<()> {
    let supported = match mode {
        OutputMode::Text => model == TEXT_MODEL,
        OutputMode::Json => model == JSON_MODEL,
    };
    if supported {
        Ok(())
    } else {
        Err(NavError::UnsupportedPairing {
            model: model.to_string(),
            mode,
        })
    }
}

/// Decode a structured answer. Deserialization failure is recoverable:
/// the empty decision falls through the parser to the stop fallback.
fn decode_structured(text: &str) -> NavDecision {
    match serde_json::from_str::<NavDecision>(text) {
        Ok(decision) => decision,
        Err(e) => {
            warn!(error = %e, "structured answer did not deserialize");
            NavDecision::default()
        }
    }
}

/// Decode a free-text answer by scanning for the action grammar: an
/// explicit waypoint selection wins, otherwise a mention of stopping.
fn decode_free_text(text: &str) -> NavDecision {
    let waypoint = regex::Regex::new(r"Waypoint_\d+")
        .ok()
        .and_then(|re| re.find(text).map(|m| m.as_str().to_string()));

    let action = waypoint.or_else(|| {
        if text.to_lowercase().contains("stop") {
            Some("stop".to_string())
        } else {
            None
        }
    });

    NavDecision {
        action,
        ..Default::default()
    }
}
