// Speaker selection
//
// Deterministic round-robin within each capability. Which capability speaks
// next is decided by the conversation phase, so only one artifact is ever
// waiting for review.

use std::collections::HashSet;

use crate::agents::{Capability, ConversationAgent};
use crate::error::{OrchestrationError, Result};

/// What the conversation is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// A producer must deliver the next artifact
    NeedArtifact,
    /// A describer must review the artifact in flight
    NeedReview,
    /// The gated coordinator at this roster index must confirm another round
    NeedConfirmation(usize),
}

/// Picks the next speaker from a validated roster
#[derive(Debug, Clone)]
pub(crate) struct SpeakerSelector {
    producers: Vec<usize>,
    describers: Vec<usize>,
    gated_coordinator: Option<usize>,
    next_producer: usize,
    next_describer: usize,
}

impl SpeakerSelector {
    /// Validate the roster and index it by capability
    pub(crate) fn new(agents: &[ConversationAgent]) -> Result<Self> {
        let mut seen = HashSet::new();
        for agent in agents {
            if !seen.insert(agent.id().as_str()) {
                return Err(OrchestrationError::InvalidRoster(format!(
                    "duplicate agent id '{}'",
                    agent.id()
                )));
            }
        }

        let indices = |capability: Capability| -> Vec<usize> {
            agents
                .iter()
                .enumerate()
                .filter(|(_, agent)| agent.capability() == capability)
                .map(|(index, _)| index)
                .collect()
        };
        let producers = indices(Capability::ProduceArtifact);
        let describers = indices(Capability::DescribeArtifact);
        let coordinators = indices(Capability::Coordinate);

        if producers.is_empty() {
            return Err(OrchestrationError::InvalidRoster("no artifact producer".to_string()));
        }
        if describers.is_empty() {
            return Err(OrchestrationError::InvalidRoster("no artifact describer".to_string()));
        }
        if coordinators.len() > 1 {
            return Err(OrchestrationError::InvalidRoster(format!(
                "at most one coordinator allowed, found {}",
                coordinators.len()
            )));
        }

        let gated_coordinator = coordinators.first().copied().filter(|&index| {
            matches!(&agents[index], ConversationAgent::Coordinator(c) if c.is_gated())
        });

        Ok(Self { producers, describers, gated_coordinator, next_producer: 0, next_describer: 0 })
    }

    /// Roster index of the agent that speaks in `phase`
    pub(crate) fn next(&mut self, phase: Phase) -> usize {
        match phase {
            Phase::NeedArtifact => {
                let index = self.producers[self.next_producer % self.producers.len()];
                self.next_producer += 1;
                index
            }
            Phase::NeedReview => {
                let index = self.describers[self.next_describer % self.describers.len()];
                self.next_describer += 1;
                index
            }
            Phase::NeedConfirmation(index) => index,
        }
    }

    /// Phase to enter after a review that did not end the conversation
    pub(crate) fn after_review(&self) -> Phase {
        self.gated_coordinator.map_or(Phase::NeedArtifact, Phase::NeedConfirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ArtifactProducer, Coordinator, VisionDescriber};
    use crate::execution::LocalExecutor;
    use loupe_models::ScriptedModel;
    use std::sync::Arc;
    use std::time::Duration;

    fn producer(id: &str) -> ConversationAgent {
        let executor = Arc::new(LocalExecutor::new("python3", Duration::from_secs(1)));
        ArtifactProducer::new(id, Arc::new(ScriptedModel::new("coder")), executor).into()
    }

    fn describer(id: &str) -> ConversationAgent {
        VisionDescriber::new(id, Arc::new(ScriptedModel::new("vision"))).into()
    }

    #[test]
    fn test_round_robin_within_capability() {
        let agents = vec![producer("p1"), describer("d1"), producer("p2")];
        let mut selector = SpeakerSelector::new(&agents).unwrap();

        assert_eq!(selector.next(Phase::NeedArtifact), 0);
        assert_eq!(selector.next(Phase::NeedReview), 1);
        assert_eq!(selector.next(Phase::NeedArtifact), 2);
        assert_eq!(selector.next(Phase::NeedReview), 1);
        assert_eq!(selector.next(Phase::NeedArtifact), 0);
    }

    #[test]
    fn test_ungated_coordinator_is_skipped() {
        let agents = vec![Coordinator::new("user").into(), producer("p"), describer("d")];
        let selector = SpeakerSelector::new(&agents).unwrap();
        assert_eq!(selector.after_review(), Phase::NeedArtifact);
    }

    #[test]
    fn test_rejects_incomplete_rosters() {
        assert!(matches!(
            SpeakerSelector::new(&[describer("d")]),
            Err(OrchestrationError::InvalidRoster(_))
        ));
        assert!(matches!(
            SpeakerSelector::new(&[producer("p")]),
            Err(OrchestrationError::InvalidRoster(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = SpeakerSelector::new(&[producer("same"), describer("same")]).unwrap_err();
        assert!(err.to_string().contains("duplicate agent id 'same'"));
    }

    #[test]
    fn test_rejects_two_coordinators() {
        let agents = vec![
            Coordinator::new("a").into(),
            Coordinator::new("b").into(),
            producer("p"),
            describer("d"),
        ];
        assert!(SpeakerSelector::new(&agents).is_err());
    }
}
