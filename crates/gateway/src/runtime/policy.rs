//! Stop policy: when to stop requesting generation steps.
//!
//! A policy is an OR over [`StopRule`]s, evaluated after every step. The
//! first rule that fires supplies the end reason.

use px_domain::config::AgentConfig;
use px_domain::stream::EndReason;

/// What the orchestrator knows after a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Generation steps completed so far in this cycle.
    pub steps: u32,
    /// Tool calls resolved (executed or errored) so far in this cycle.
    pub tool_results: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRule {
    /// Stop once this many steps have run.
    MaxSteps(u32),
    /// Stop once any tool produced a result: no commentary after tool use.
    AfterToolResult,
}

impl StopRule {
    fn fires(&self, outcome: &StepOutcome) -> Option<EndReason> {
        match *self {
            StopRule::MaxSteps(max) if outcome.steps >= max => Some(EndReason::StepLimit),
            StopRule::AfterToolResult if outcome.tool_results > 0 => Some(EndReason::StopPolicy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopPolicy {
    rules: Vec<StopRule>,
}

impl StopPolicy {
    /// A policy with no rules never fires.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, rule: StopRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        let policy = Self::new().or(StopRule::MaxSteps(cfg.max_steps));
        if cfg.stop_after_tool_result {
            policy.or(StopRule::AfterToolResult)
        } else {
            policy
        }
    }

    pub fn evaluate(&self, outcome: &StepOutcome) -> Option<EndReason> {
        self.rules.iter().find_map(|r| r.fires(outcome))
    }

    pub fn rules(&self) -> &[StopRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_cap_fires_at_max() {
        let policy = StopPolicy::new().or(StopRule::MaxSteps(2));
        let mut o = StepOutcome {
            steps: 1,
            tool_results: 1,
        };
        assert_eq!(policy.evaluate(&o), None);
        o.steps = 2;
        assert_eq!(policy.evaluate(&o), Some(EndReason::StepLimit));
    }

    #[test]
    fn tool_result_rule_needs_a_result() {
        let policy = StopPolicy::new().or(StopRule::AfterToolResult);
        assert_eq!(policy.evaluate(&StepOutcome::default()), None);
        assert_eq!(
            policy.evaluate(&StepOutcome {
                steps: 1,
                tool_results: 1
            }),
            Some(EndReason::StopPolicy)
        );
    }

    #[test]
    fn first_rule_that_fires_wins() {
        let policy = StopPolicy::new()
            .or(StopRule::MaxSteps(1))
            .or(StopRule::AfterToolResult);
        let both = StepOutcome {
            steps: 1,
            tool_results: 2,
        };
        assert_eq!(policy.evaluate(&both), Some(EndReason::StepLimit));
    }

    #[test]
    fn config_builds_both_rules() {
        let policy = StopPolicy::from_config(&AgentConfig::default());
        assert_eq!(
            policy.rules(),
            &[StopRule::MaxSteps(40), StopRule::AfterToolResult]
        );

        let cfg = AgentConfig {
            stop_after_tool_result: false,
            ..Default::default()
        };
        assert_eq!(StopPolicy::from_config(&cfg).rules(), &[StopRule::MaxSteps(40)]);
    }
}
