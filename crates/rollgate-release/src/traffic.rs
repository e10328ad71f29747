//! Traffic controller — read and rewrite the canary/primary weight split on
//! the service's listener rule.
//!
//! Updates are read-modify-write: only the weights of the two configured
//! target groups change. Other actions on the rule, and forward targets
//! that belong to neither pool, are submitted back exactly as read.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rollgate_core::{PoolId, ServiceConfig, Weights};

use crate::api::{ListenerRule, ReleaseApi, RuleAction};
use crate::error::{ReleaseError, ReleaseResult};

pub struct TrafficController {
    service: String,
    api: Arc<dyn ReleaseApi>,
    config: ServiceConfig,
}

impl TrafficController {
    pub fn new(service: &str, api: Arc<dyn ReleaseApi>, config: &ServiceConfig) -> Self {
        Self {
            service: service.to_string(),
            api,
            config: config.clone(),
        }
    }

    fn pool_for(&self, target_group_arn: &str) -> Option<PoolId> {
        self.config.pool_for_target_group(target_group_arn)
    }

    /// Current weights of the two pools on the listener rule.
    pub async fn current_weights(&self) -> ReleaseResult<Weights> {
        let rule = self.api.describe_rule().await?;
        Ok(self.read_weights(&rule))
    }

    /// Extract pool weights from a rule. A pool with no forward target on
    /// the rule reads as weight 0.
    pub fn read_weights(&self, rule: &ListenerRule) -> Weights {
        let mut weights = Weights::default();
        for action in &rule.actions {
            if let RuleAction::Forward { target_groups, .. } = action {
                for target in target_groups {
                    if let Some(pool) = self.pool_for(&target.target_group_arn) {
                        weights.set(pool, target.weight);
                    }
                }
            }
        }
        weights
    }

    /// Write `weights` to the listener rule.
    ///
    /// Fails with [`ReleaseError::NotFound`] if neither pool has a forward
    /// target on the rule, without submitting anything.
    pub async fn update_weights(&self, weights: Weights) -> ReleaseResult<()> {
        let mut rule = self.api.describe_rule().await?;

        let matched = self.rewrite(&mut rule.actions, weights);
        if matched == 0 {
            return Err(ReleaseError::NotFound(format!(
                "no canary or primary target group on rule {}",
                rule.arn
            )));
        }

        debug!(service = %self.service, actions = ?rule.actions, "modifying listener rule");
        self.api.modify_rule(rule.actions).await?;
        info!(service = %self.service, %weights, "traffic weights updated");
        Ok(())
    }

    /// Set the weight of every pool target in `actions`. Returns how many
    /// targets were rewritten.
    fn rewrite(&self, actions: &mut [RuleAction], weights: Weights) -> usize {
        let mut matched = 0;
        for action in actions.iter_mut() {
            if let RuleAction::Forward { target_groups, .. } = action {
                for target in target_groups.iter_mut() {
                    match self.pool_for(&target.target_group_arn) {
                        Some(pool) => {
                            target.weight = weights.get(pool);
                            matched += 1;
                        }
                        None => {
                            warn!(service = %self.service, target_group = %target.target_group_arn, "leaving unrecognized target group untouched");
                        }
                    }
                }
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::api::TargetGroupWeight;
    use crate::clock::ManualClock;
    use crate::simulate::{FleetOp, SimulatedFleet};

    fn setup() -> (Arc<SimulatedFleet>, TrafficController) {
        let clock = Arc::new(ManualClock::new(1_000));
        let fleet = Arc::new(SimulatedFleet::sample(clock));
        let controller = TrafficController::new("api", fleet.clone(), &SimulatedFleet::sample_service());
        (fleet, controller)
    }

    fn target(arn: &str, weight: i64) -> TargetGroupWeight {
        TargetGroupWeight {
            target_group_arn: arn.to_string(),
            weight,
        }
    }

    #[tokio::test]
    async fn reads_current_weights() {
        let (fleet, controller) = setup();
        assert_eq!(controller.current_weights().await.unwrap(), fleet.weights());
    }

    #[tokio::test]
    async fn update_preserves_unrelated_rule_content() {
        let (fleet, controller) = setup();
        let auth = RuleAction::Other {
            action_type: "authenticate-oidc".to_string(),
            order: Some(1),
            params: BTreeMap::from([("issuer".to_string(), "https://idp".to_string())]),
        };
        let mut rule = fleet.rule();
        rule.actions.insert(0, auth.clone());
        if let RuleAction::Forward { target_groups, .. } = &mut rule.actions[1] {
            target_groups.push(target("tg-shadow", 5));
        }
        fleet.set_rule(rule);

        controller.update_weights(Weights::new(25, 75)).await.unwrap();

        let rule = fleet.rule();
        assert_eq!(rule.actions[0], auth);
        match &rule.actions[1] {
            RuleAction::Forward { target_groups, .. } => {
                assert_eq!(
                    target_groups,
                    &vec![
                        target(SimulatedFleet::CANARY_TG, 25),
                        target(SimulatedFleet::PRIMARY_TG, 75),
                        target("tg-shadow", 5),
                    ]
                );
            }
            other => panic!("expected forward action, got {other:?}"),
        }
        assert_eq!(fleet.weights(), Weights::new(25, 75));
    }

    #[tokio::test]
    async fn rule_without_pools_is_not_submitted() {
        let (fleet, controller) = setup();
        let mut rule = fleet.rule();
        rule.actions = vec![RuleAction::Forward {
            order: None,
            target_groups: vec![target("tg-other", 100)],
        }];
        fleet.set_rule(rule);

        let err = controller.update_weights(Weights::new(50, 50)).await.unwrap_err();
        assert!(matches!(err, ReleaseError::NotFound(_)));
        assert_eq!(fleet.call_count(FleetOp::ModifyRule), 0);
    }

    #[tokio::test]
    async fn backend_rejection_is_an_error() {
        let (fleet, controller) = setup();
        let before = fleet.weights();

        let err = controller.update_weights(Weights::new(150, -50)).await.unwrap_err();

        assert!(matches!(err, ReleaseError::Rejected(_)));
        assert_eq!(fleet.weights(), before);
    }

    #[test]
    fn unmatched_pool_reads_zero() {
        let (_fleet, controller) = setup();
        let rule = ListenerRule {
            arn: "rule".to_string(),
            actions: vec![RuleAction::Forward {
                order: None,
                target_groups: vec![target(SimulatedFleet::PRIMARY_TG, 100)],
            }],
        };
        assert_eq!(controller.read_weights(&rule), Weights::new(0, 100));
    }

    #[test]
    fn pools_follow_the_service_config() {
        let clock = Arc::new(ManualClock::new(1_000));
        let fleet = Arc::new(SimulatedFleet::sample(clock));
        let mut config = SimulatedFleet::sample_service();
        config.canary.tg_arn = SimulatedFleet::PRIMARY_TG.to_string();
        config.primary.tg_arn = SimulatedFleet::CANARY_TG.to_string();
        let controller = TrafficController::new("api", fleet.clone(), &config);

        let rule = ListenerRule {
            arn: "rule".to_string(),
            actions: vec![RuleAction::Forward {
                order: None,
                target_groups: vec![
                    target(SimulatedFleet::CANARY_TG, 30),
                    target(SimulatedFleet::PRIMARY_TG, 70),
                ],
            }],
        };
        assert_eq!(controller.read_weights(&rule), Weights::new(70, 30));
    }
}
