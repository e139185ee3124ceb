//! The entitlement gate.
//!
//! [`evaluate`] is the single place that decides whether a feature is usable.
//! Its inputs are already resolved (gating tier, "ever paid", usage in the
//! current window), so it is pure and cheap.
//!
//! # Policy
//!
//! | Gating tier | Analysis | Advanced views | Premium tools |
//! |-------------|----------|----------------|---------------|
//! | premium | unlimited | yes | yes |
//! | basic | 10 per window | yes | no |
//! | pay-per-use | 1 per window | yes | no |
//! | free, never paid | 1 per month | no | no |
//! | free, paid before | 0 | yes | no |
//!
//! Users who paid before keep the advanced views for documents they already
//! analyzed, but receive no free analysis credits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::plan::PlanTier;

/// A gated product feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Analyze a new document (consumes a credit).
    DocumentAnalysis,
    /// Side-by-side contract comparison.
    SideBySideComparison,
    /// Advanced clause suggestions.
    AdvancedClauseSuggestions,
    /// Downloadable improved contract.
    DownloadableImprovements,
    /// Plain-language clause explanations.
    ClauseExplanations,
    /// Agreement generator.
    AgreementGenerator,
    /// Legal chat assistant.
    LegalChat,
    /// Dispute response generator.
    DisputeResponseGenerator,
    /// Jurisdiction suggestions.
    JurisdictionSuggestions,
}

/// How a feature is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureClass {
    /// Consumes analysis credits.
    Metered,
    /// Views on analyzed documents; retained by previous purchasers.
    Advanced,
    /// Premium tools.
    PremiumOnly,
}

impl Feature {
    /// Every feature.
    pub const ALL: [Self; 9] = [
        Self::DocumentAnalysis,
        Self::SideBySideComparison,
        Self::AdvancedClauseSuggestions,
        Self::DownloadableImprovements,
        Self::ClauseExplanations,
        Self::AgreementGenerator,
        Self::LegalChat,
        Self::DisputeResponseGenerator,
        Self::JurisdictionSuggestions,
    ];

    /// Gating class.
    #[must_use]
    pub const fn class(&self) -> FeatureClass {
        match self {
            Self::DocumentAnalysis => FeatureClass::Metered,
            Self::SideBySideComparison
            | Self::AdvancedClauseSuggestions
            | Self::DownloadableImprovements
            | Self::ClauseExplanations => FeatureClass::Advanced,
            Self::AgreementGenerator
            | Self::LegalChat
            | Self::DisputeResponseGenerator
            | Self::JurisdictionSuggestions => FeatureClass::PremiumOnly,
        }
    }

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentAnalysis => "document-analysis",
            Self::SideBySideComparison => "side-by-side-comparison",
            Self::AdvancedClauseSuggestions => "advanced-clause-suggestions",
            Self::DownloadableImprovements => "downloadable-improvements",
            Self::ClauseExplanations => "clause-explanations",
            Self::AgreementGenerator => "agreement-generator",
            Self::LegalChat => "legal-chat",
            Self::DisputeResponseGenerator => "dispute-response-generator",
            Self::JurisdictionSuggestions => "jurisdiction-suggestions",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized feature name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feature: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Everything the gate needs to know about a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanState {
    /// Tier after precedence and expiry.
    pub tier: PlanTier,
    /// Whether the user has at least one completed purchase.
    pub ever_paid: bool,
    /// Analyses counted in the current metering window.
    pub used_this_window: u32,
}

/// Analysis credits left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credits {
    /// Unmetered.
    Unlimited,
    /// Credits left in the current window.
    Remaining(u32),
}

impl Credits {
    /// Whether at least one credit is left.
    #[must_use]
    pub const fn has_any(&self) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Remaining(left) => *left > 0,
        }
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_str("unlimited"),
            Self::Remaining(left) => serializer.serialize_u32(*left),
        }
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u32),
            Label(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(left) => Ok(Self::Remaining(left)),
            Repr::Label(label) if label == "unlimited" => Ok(Self::Unlimited),
            Repr::Label(label) => Err(serde::de::Error::custom(format!(
                "invalid credits value: {label}"
            ))),
        }
    }
}

/// Why a feature is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    /// The monthly free credit is used up.
    FreeLimitReached,
    /// The paid plan's window quota is used up.
    PlanLimitReached,
    /// Free credits are only for users who never paid.
    FreeCreditsUnavailable,
    /// The tier does not include the feature.
    RequiresPlan,
    /// Entitlement state could not be read.
    EvaluationFailed,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FreeLimitReached => "free-limit-reached",
            Self::PlanLimitReached => "plan-limit-reached",
            Self::FreeCreditsUnavailable => "free-credits-unavailable",
            Self::RequiresPlan => "requires-plan",
            Self::EvaluationFailed => "evaluation-failed",
        })
    }
}

/// Outcome of gating one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Analysis credits left in the current window.
    pub remaining_credits: Credits,
    /// Why the action is blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
    /// Lowest tier that would unlock the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_plan: Option<PlanTier>,
}

impl Decision {
    /// The fail-closed decision used when state cannot be read.
    #[must_use]
    pub const fn evaluation_failed() -> Self {
        Self {
            allowed: false,
            remaining_credits: Credits::Remaining(0),
            reason: Some(BlockReason::EvaluationFailed),
            required_plan: None,
        }
    }
}

/// Access granted by the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Granted,
    Metered(u32),
    Denied(PlanTier),
}

fn access(tier: PlanTier, ever_paid: bool, class: FeatureClass) -> Access {
    match (tier, class) {
        (PlanTier::Premium, _) => Access::Granted,
        (PlanTier::Basic | PlanTier::PayPerUse, FeatureClass::Metered) => {
            Access::Metered(tier.window_document_limit().unwrap_or(0))
        }
        (PlanTier::Basic | PlanTier::PayPerUse, FeatureClass::Advanced) => Access::Granted,
        (_, FeatureClass::PremiumOnly) => Access::Denied(PlanTier::Premium),
        (PlanTier::Free, FeatureClass::Metered) if ever_paid => Access::Metered(0),
        (PlanTier::Free, FeatureClass::Metered) => {
            Access::Metered(PlanTier::Free.window_document_limit().unwrap_or(0))
        }
        (PlanTier::Free, FeatureClass::Advanced) if ever_paid => Access::Granted,
        (PlanTier::Free, FeatureClass::Advanced) => Access::Denied(PlanTier::Basic),
    }
}

/// Analysis credits left for `state`.
#[must_use]
pub fn remaining_credits(state: &PlanState) -> Credits {
    credits_for(
        access(state.tier, state.ever_paid, FeatureClass::Metered),
        state.used_this_window,
    )
}

fn credits_for(access: Access, used: u32) -> Credits {
    match access {
        Access::Metered(limit) => Credits::Remaining(limit.saturating_sub(used)),
        Access::Granted => Credits::Unlimited,
        Access::Denied(_) => Credits::Remaining(0),
    }
}

/// Decide whether `feature` is usable in `state`.
#[must_use]
pub fn evaluate(feature: Feature, state: &PlanState) -> Decision {
    let remaining = remaining_credits(state);
    let blocked = |reason, required_plan| Decision {
        allowed: false,
        remaining_credits: remaining,
        reason: Some(reason),
        required_plan: Some(required_plan),
    };

    match access(state.tier, state.ever_paid, feature.class()) {
        Access::Granted => Decision {
            allowed: true,
            remaining_credits: remaining,
            reason: None,
            required_plan: None,
        },
        Access::Denied(required) => blocked(BlockReason::RequiresPlan, required),
        Access::Metered(_) if remaining.has_any() => Decision {
            allowed: true,
            remaining_credits: remaining,
            reason: None,
            required_plan: None,
        },
        Access::Metered(_) => match state.tier {
            PlanTier::Free if state.ever_paid => {
                blocked(BlockReason::FreeCreditsUnavailable, PlanTier::Basic)
            }
            PlanTier::Free => blocked(BlockReason::FreeLimitReached, PlanTier::Basic),
            PlanTier::PayPerUse => blocked(BlockReason::PlanLimitReached, PlanTier::Basic),
            PlanTier::Basic | PlanTier::Premium => {
                blocked(BlockReason::PlanLimitReached, PlanTier::Premium)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(tier: PlanTier, ever_paid: bool, used: u32) -> PlanState {
        PlanState {
            tier,
            ever_paid,
            used_this_window: used,
        }
    }

    #[test]
    fn premium_allows_everything() {
        let premium = state(PlanTier::Premium, true, 250);
        for feature in Feature::ALL {
            let decision = evaluate(feature, &premium);
            assert!(decision.allowed, "{feature} should be allowed");
            assert_eq!(decision.remaining_credits, Credits::Unlimited);
        }
    }

    #[test]
    fn free_credit_is_exhausted_by_one_document() {
        let fresh = evaluate(Feature::DocumentAnalysis, &state(PlanTier::Free, false, 0));
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining_credits, Credits::Remaining(1));

        let used = evaluate(Feature::DocumentAnalysis, &state(PlanTier::Free, false, 1));
        assert!(!used.allowed);
        assert_eq!(used.remaining_credits, Credits::Remaining(0));
        assert_eq!(used.reason, Some(BlockReason::FreeLimitReached));
    }

    #[test]
    fn prior_purchaser_on_free_gets_no_credits_but_keeps_views() {
        let lapsed = state(PlanTier::Free, true, 0);

        let analysis = evaluate(Feature::DocumentAnalysis, &lapsed);
        assert!(!analysis.allowed);
        assert_eq!(analysis.remaining_credits, Credits::Remaining(0));
        assert_eq!(analysis.reason, Some(BlockReason::FreeCreditsUnavailable));

        for feature in [
            Feature::SideBySideComparison,
            Feature::AdvancedClauseSuggestions,
            Feature::DownloadableImprovements,
            Feature::ClauseExplanations,
        ] {
            assert!(evaluate(feature, &lapsed).allowed, "{feature} should be retained");
        }
        assert!(!evaluate(Feature::LegalChat, &lapsed).allowed);
    }

    #[test]
    fn never_paid_free_user_is_locked_out_of_advanced_views() {
        let decision = evaluate(Feature::SideBySideComparison, &state(PlanTier::Free, false, 0));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(BlockReason::RequiresPlan));
        assert_eq!(decision.required_plan, Some(PlanTier::Basic));
    }

    #[test]
    fn basic_meters_ten_per_window() {
        let decision = evaluate(Feature::DocumentAnalysis, &state(PlanTier::Basic, true, 3));
        assert!(decision.allowed);
        assert_eq!(decision.remaining_credits, Credits::Remaining(7));

        let full = evaluate(Feature::DocumentAnalysis, &state(PlanTier::Basic, true, 12));
        assert!(!full.allowed);
        assert_eq!(full.remaining_credits, Credits::Remaining(0));
        assert_eq!(full.reason, Some(BlockReason::PlanLimitReached));
        assert_eq!(full.required_plan, Some(PlanTier::Premium));
    }

    #[test]
    fn basic_and_pay_per_use_exclude_premium_tools() {
        for tier in [PlanTier::Basic, PlanTier::PayPerUse] {
            for feature in [
                Feature::AgreementGenerator,
                Feature::LegalChat,
                Feature::DisputeResponseGenerator,
                Feature::JurisdictionSuggestions,
            ] {
                let decision = evaluate(feature, &state(tier, true, 0));
                assert!(!decision.allowed);
                assert_eq!(decision.required_plan, Some(PlanTier::Premium));
            }
            assert!(evaluate(Feature::ClauseExplanations, &state(tier, true, 0)).allowed);
        }
    }

    #[test]
    fn pay_per_use_covers_one_document() {
        assert!(evaluate(Feature::DocumentAnalysis, &state(PlanTier::PayPerUse, true, 0)).allowed);
        let used = evaluate(Feature::DocumentAnalysis, &state(PlanTier::PayPerUse, true, 1));
        assert!(!used.allowed);
        assert_eq!(used.reason, Some(BlockReason::PlanLimitReached));
    }

    #[test]
    fn only_granted_access_counts_as_unlimited() {
        assert_eq!(credits_for(Access::Granted, 4), Credits::Unlimited);
        assert_eq!(credits_for(Access::Metered(10), 4), Credits::Remaining(6));
        assert_eq!(credits_for(Access::Metered(1), 3), Credits::Remaining(0));
        assert_eq!(
            credits_for(Access::Denied(PlanTier::Basic), 0),
            Credits::Remaining(0)
        );
    }

    #[test]
    fn credits_serialize_as_number_or_label() {
        assert_eq!(serde_json::to_value(Credits::Remaining(7)).unwrap(), 7);
        assert_eq!(
            serde_json::to_value(Credits::Unlimited).unwrap(),
            "unlimited"
        );
        let parsed: Credits = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, Credits::Unlimited);
        assert!(serde_json::from_str::<Credits>("\"lots\"").is_err());
    }

    #[test]
    fn blocked_decision_wire_format() {
        let decision = evaluate(Feature::DocumentAnalysis, &state(PlanTier::Free, false, 1));
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "allowed": false,
                "remaining_credits": 0,
                "reason": "free-limit-reached",
                "required_plan": "basic"
            })
        );
    }

    #[test]
    fn feature_names_roundtrip() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
        assert!("teleport".parse::<Feature>().is_err());
    }
}
