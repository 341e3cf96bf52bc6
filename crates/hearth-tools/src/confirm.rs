//! Dry-run confirmation orchestrator.
//!
//! Every mutating tool builds a [`ChangePreview`] and passes through
//! [`confirm_change`] before anything reaches the client's write path. The
//! abort path looks identical to the caller no matter which route produced
//! it (explicit rejection, unsupported solicitation, or deny-by-default).

use async_trait::async_trait;
use serde_json::Value;

use hearth_client::HassValidationResult;

use crate::yaml::to_yaml;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Kind of mutation being previewed.
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Import,
}

impl ChangeAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Import => "IMPORT",
        }
    }
}

/// Ephemeral preview of one proposed change; lives for a single
/// confirmation round trip.
#[derive(Debug, Clone)]
pub struct ChangePreview {
    pub action: ChangeAction,
    pub resource_kind: String,
    pub identifier: String,
    pub config: Value,
    pub validation: Option<HassValidationResult>,
}

impl ChangePreview {
    pub fn new(
        action: ChangeAction,
        resource_kind: impl Into<String>,
        identifier: impl Into<String>,
        config: Value,
    ) -> Self {
        Self {
            action,
            resource_kind: resource_kind.into(),
            identifier: identifier.into(),
            config,
            validation: None,
        }
    }

    pub fn with_validation(mut self, validation: Option<HassValidationResult>) -> Self {
        self.validation = validation;
        self
    }

    /// Renders the markdown shown to the human: a YAML block of the
    /// candidate config plus validation findings when present.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "## {} {}: {}",
                self.action.label(),
                self.resource_kind,
                self.identifier
            ),
            String::new(),
            "```yaml".to_string(),
            to_yaml(&self.config),
            "```".to_string(),
        ];

        if let Some(validation) = &self.validation {
            lines.push(String::new());
            lines.push(format!(
                "### Validation: {}",
                if validation.valid { "PASSED" } else { "FAILED" }
            ));
            if !validation.errors.is_empty() {
                lines.push("**Errors:**".to_string());
                for error in &validation.errors {
                    lines.push(format!("- {error}"));
                }
            }
            if !validation.warnings.is_empty() {
                lines.push("**Warnings:**".to_string());
                for warning in &validation.warnings {
                    lines.push(format!("- {warning}"));
                }
            }
        }

        lines.push(String::new());
        lines.push("Apply this change?".to_string());
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of one solicitation round trip.
pub enum ConfirmationDecision {
    Approved,
    Rejected,
    /// The calling session cannot prompt a human at all.
    Unsupported,
}

#[async_trait]
/// Channel used to put a rendered preview in front of a human.
pub trait ConfirmationGateway: Send + Sync {
    async fn solicit(&self, preview: &str) -> ConfirmationDecision;
}

#[derive(Debug, Clone, Copy, Default)]
/// Process-wide fallback for sessions without solicitation support.
/// Deny is the safe baseline; approval must be configured explicitly.
pub struct ConfirmPolicy {
    pub approve_when_unsupported: bool,
}

/// Runs the confirmation protocol for one mutating call.
///
/// Validation findings attached to the preview are informational: the human
/// sees them and still chooses. Returns `true` only when the change may be
/// applied.
pub async fn confirm_change(
    gateway: &dyn ConfirmationGateway,
    policy: ConfirmPolicy,
    preview: &ChangePreview,
    bypass: bool,
) -> bool {
    let action = preview.action.label();
    let kind = &preview.resource_kind;
    let identifier = &preview.identifier;

    if bypass {
        tracing::info!("skipping confirmation for {action} {kind}: {identifier}");
        return true;
    }

    let rendered = preview.render();
    match gateway.solicit(&rendered).await {
        ConfirmationDecision::Approved => {
            tracing::info!("user confirmed {action} {kind}: {identifier}");
            true
        }
        ConfirmationDecision::Rejected => {
            tracing::info!("user cancelled {action} {kind}: {identifier}");
            false
        }
        ConfirmationDecision::Unsupported => {
            tracing::warn!(
                "confirmation not supported by client; falling back to {} for {action} {kind}: {identifier}",
                if policy.approve_when_unsupported { "approve" } else { "deny" }
            );
            policy.approve_when_unsupported
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        confirm_change, ChangeAction, ChangePreview, ConfirmPolicy, ConfirmationDecision,
        ConfirmationGateway,
    };
    use async_trait::async_trait;
    use hearth_client::HassValidationResult;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGateway {
        decision: ConfirmationDecision,
        solicitations: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(decision: ConfirmationDecision) -> Self {
            Self {
                decision,
                solicitations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConfirmationGateway for ScriptedGateway {
        async fn solicit(&self, _preview: &str) -> ConfirmationDecision {
            self.solicitations.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    fn sample_preview() -> ChangePreview {
        ChangePreview::new(
            ChangeAction::Create,
            "automation",
            "Morning Lights",
            json!({"alias": "Morning Lights", "triggers": [], "actions": []}),
        )
    }

    #[tokio::test]
    async fn bypass_skips_solicitation_entirely() {
        let gateway = ScriptedGateway::new(ConfirmationDecision::Rejected);
        assert!(confirm_change(&gateway, ConfirmPolicy::default(), &sample_preview(), true).await);
        assert_eq!(gateway.solicitations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approval_and_rejection_pass_through() {
        let approve = ScriptedGateway::new(ConfirmationDecision::Approved);
        assert!(confirm_change(&approve, ConfirmPolicy::default(), &sample_preview(), false).await);

        let reject = ScriptedGateway::new(ConfirmationDecision::Rejected);
        assert!(!confirm_change(&reject, ConfirmPolicy::default(), &sample_preview(), false).await);
        assert_eq!(reject.solicitations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_follows_configured_default() {
        let gateway = ScriptedGateway::new(ConfirmationDecision::Unsupported);
        assert!(!confirm_change(&gateway, ConfirmPolicy::default(), &sample_preview(), false).await);
        let approve_policy = ConfirmPolicy {
            approve_when_unsupported: true,
        };
        assert!(confirm_change(&gateway, approve_policy, &sample_preview(), false).await);
    }

    #[test]
    fn render_includes_yaml_and_question() {
        let rendered = sample_preview().render();
        assert!(rendered.starts_with("## CREATE automation: Morning Lights"));
        assert!(rendered.contains("```yaml"));
        assert!(rendered.contains("alias: Morning Lights"));
        assert!(rendered.ends_with("Apply this change?"));
        assert!(!rendered.contains("Validation"));
    }

    #[test]
    fn render_appends_validation_findings_without_blocking() {
        let preview = sample_preview().with_validation(Some(HassValidationResult {
            valid: false,
            errors: vec!["trigger: Invalid trigger platform".to_string()],
            warnings: vec!["deprecated key".to_string()],
        }));
        let rendered = preview.render();
        assert!(rendered.contains("### Validation: FAILED"));
        assert!(rendered.contains("- trigger: Invalid trigger platform"));
        assert!(rendered.contains("- deprecated key"));
        assert!(rendered.ends_with("Apply this change?"));
    }
}
