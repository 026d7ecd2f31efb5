//! Access decision for a single mod.
//!
//! Released mods are open to everyone.  Before release, the caller's tier
//! must rank at least as high as the tier the manifest requires.

use serde::{Serialize, Serializer};

use crate::manifest::Manifest;
use crate::tier::Tier;

/// Why access was refused.  Serialises to the user-facing reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    MissingGame,
    MalformedRequest,
    NotFound,
    InvalidTier,
    TierLocked,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::MissingGame => "Missing game",
            Denial::MalformedRequest => "Invalid request",
            Denial::NotFound => "Mod not found",
            Denial::InvalidTier => "Invalid tier",
            Denial::TierLocked => "Tier locked",
        }
    }
}

impl Serialize for Denial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.reason())
    }
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Outcome of an access check, in the shape returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_install: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Denial>,
}

impl Verdict {
    pub fn denied(denial: Denial) -> Self {
        Self {
            allowed: false,
            version: None,
            auto_install: None,
            error: Some(denial),
        }
    }

    fn granted(version: Option<String>, auto_install: Option<bool>) -> Self {
        Self {
            allowed: true,
            version,
            auto_install,
            error: None,
        }
    }
}

/// Decide access to `manifest` for a caller claiming `caller_tier`, as of now.
pub fn evaluate(manifest: Option<&Manifest>, caller_tier: Option<&str>) -> Verdict {
    evaluate_at(manifest, caller_tier, chrono::Utc::now().timestamp())
}

/// Decide access as of `now` (epoch seconds).
pub fn evaluate_at(manifest: Option<&Manifest>, caller_tier: Option<&str>, now: i64) -> Verdict {
    let Some(manifest) = manifest else {
        return Verdict::denied(Denial::NotFound);
    };

    if manifest.release_timestamp() <= now {
        return Verdict::granted(manifest.version.clone(), Some(manifest.auto_install()));
    }

    let Some(caller) = Tier::parse(caller_tier.unwrap_or(Tier::DEFAULT_CALLER.as_str())) else {
        return Verdict::denied(Denial::InvalidTier);
    };

    let required = manifest
        .tier_required
        .as_deref()
        .and_then(Tier::parse)
        .unwrap_or(Tier::DEFAULT_REQUIRED);

    if !caller.satisfies(required) {
        return Verdict::denied(Denial::TierLocked);
    }

    // Early access never carries the install hint.
    Verdict::granted(manifest.version.clone(), None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;

    fn manifest(release: Option<i64>, required: Option<&str>) -> Manifest {
        Manifest {
            version: Some("1.0".to_string()),
            release_timestamp: release,
            tier_required: required.map(str::to_string),
            auto_install: Some(true),
        }
    }

    const ALL_CALLER_TIERS: [Option<&str>; 7] = [
        None,
        Some("follower"),
        Some("bronze"),
        Some("silver"),
        Some("gold"),
        Some("platinum"),
        Some(""),
    ];

    #[test]
    fn missing_manifest_is_not_found() {
        assert_eq!(
            evaluate_at(None, Some("gold"), NOW),
            Verdict::denied(Denial::NotFound)
        );
    }

    #[test]
    fn released_mod_is_open_to_every_caller() {
        for release in [None, Some(0), Some(NOW - 1), Some(NOW)] {
            let m = manifest(release, Some("gold"));
            for tier in ALL_CALLER_TIERS {
                let v = evaluate_at(Some(&m), tier, NOW);
                assert!(v.allowed, "release={release:?} tier={tier:?}");
                assert_eq!(v.version.as_deref(), Some("1.0"));
                assert_eq!(v.auto_install, Some(true));
                assert_eq!(v.error, None);
            }
        }
    }

    #[test]
    fn released_mod_reports_auto_install_false_by_default() {
        let m = Manifest {
            version: Some("2".to_string()),
            ..Manifest::default()
        };
        let v = evaluate_at(Some(&m), None, NOW);
        assert_eq!(v.auto_install, Some(false));
    }

    #[test]
    fn locked_mod_grants_iff_rank_is_sufficient() {
        let tiers = ["follower", "bronze", "silver", "gold"];
        for (req_rank, required) in tiers.into_iter().enumerate() {
            let m = manifest(Some(NOW + 60), Some(required));
            for (caller_rank, caller) in tiers.into_iter().enumerate() {
                let v = evaluate_at(Some(&m), Some(caller), NOW);
                if caller_rank >= req_rank {
                    assert!(v.allowed, "{caller} should open {required}");
                    assert_eq!(v.version.as_deref(), Some("1.0"));
                } else {
                    assert_eq!(v, Verdict::denied(Denial::TierLocked));
                }
            }
        }
    }

    #[test]
    fn locked_and_authorised_omits_auto_install() {
        let m = manifest(Some(NOW + 60), Some("silver"));
        let v = evaluate_at(Some(&m), Some("gold"), NOW);
        assert!(v.allowed);
        assert_eq!(v.auto_install, None);
    }

    #[test]
    fn locked_mod_defaults_to_gold_requirement() {
        let m = manifest(Some(NOW + 60), None);
        assert_eq!(
            evaluate_at(Some(&m), Some("silver"), NOW),
            Verdict::denied(Denial::TierLocked)
        );
        assert!(evaluate_at(Some(&m), Some("gold"), NOW).allowed);
    }

    #[test]
    fn unknown_required_tier_is_treated_as_gold() {
        let m = manifest(Some(NOW + 60), Some("diamond"));
        assert!(!evaluate_at(Some(&m), Some("silver"), NOW).allowed);
        assert!(evaluate_at(Some(&m), Some("gold"), NOW).allowed);
    }

    #[test]
    fn absent_caller_tier_is_follower() {
        let open_to_followers = manifest(Some(NOW + 60), Some("follower"));
        assert!(evaluate_at(Some(&open_to_followers), None, NOW).allowed);

        let bronze_only = manifest(Some(NOW + 60), Some("bronze"));
        assert_eq!(
            evaluate_at(Some(&bronze_only), None, NOW),
            Verdict::denied(Denial::TierLocked)
        );
    }

    #[test]
    fn invalid_caller_tier_on_locked_mod() {
        let m = manifest(Some(NOW + 60), Some("follower"));
        for tier in ["platinum", "", "Gold", "GOLD"] {
            assert_eq!(
                evaluate_at(Some(&m), Some(tier), NOW),
                Verdict::denied(Denial::InvalidTier),
                "{tier:?}"
            );
        }
    }

    #[test]
    fn evaluate_uses_current_time() {
        let past = manifest(Some(1), Some("gold"));
        assert!(evaluate(Some(&past), None).allowed);

        let far_future = manifest(Some(i64::MAX), Some("gold"));
        assert!(!evaluate(Some(&far_future), None).allowed);
    }

    // ── Serialisation ───────────────────────────────────────────────────

    #[test]
    fn public_verdict_json() {
        let v = evaluate_at(Some(&manifest(Some(0), None)), None, NOW);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"allowed": true, "version": "1.0", "auto_install": true})
        );
    }

    #[test]
    fn early_access_verdict_json() {
        let v = evaluate_at(Some(&manifest(Some(NOW + 1), Some("silver"))), Some("gold"), NOW);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"allowed": true, "version": "1.0"})
        );
    }

    #[test]
    fn denial_serialises_as_plain_reason() {
        assert_eq!(
            serde_json::to_value(Denial::TierLocked).unwrap(),
            serde_json::json!("Tier locked")
        );
        assert_eq!(
            serde_json::to_value(Denial::MalformedRequest).unwrap(),
            serde_json::json!("Invalid request")
        );
    }

    #[test]
    fn denial_json_uses_reason_strings() {
        for denial in [
            Denial::MissingGame,
            Denial::MalformedRequest,
            Denial::NotFound,
            Denial::InvalidTier,
            Denial::TierLocked,
        ] {
            assert_eq!(
                serde_json::to_value(Verdict::denied(denial)).unwrap(),
                serde_json::json!({"allowed": false, "error": denial.reason()})
            );
        }
    }
}
