//! Capability resolution against server-supplied permitted actions.

use crate::error::CapabilityError;
use crate::types::{Action, Affordance, Affordances, HasPermittedActions};
use rootcause::prelude::Report;
use tracing::debug;

/// Answers "may the current user do X to this resource?".
///
/// The answer is membership of the action in the resource's permitted
/// actions as fetched. No authorization rule is evaluated locally, so a
/// resource whose list is empty or missing permits nothing. The server
/// re-checks every action anyway; the resolver only decides what the user
/// is offered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityResolver;

impl CapabilityResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns true if `action` is in the resource's permitted actions.
    #[must_use]
    pub fn is_permitted<R, A>(&self, resource: &R, action: A) -> bool
    where
        R: HasPermittedActions + ?Sized,
        A: Action,
    {
        self.is_permitted_name(resource, action.as_str())
    }

    /// Returns true if the action called `name` is in the resource's
    /// permitted actions.
    ///
    /// For hosts that take action names from outside, such as a command
    /// line, and have no [`Action`] type for the resource.
    #[must_use]
    pub fn is_permitted_name<R>(&self, resource: &R, name: &str) -> bool
    where
        R: HasPermittedActions + ?Sized,
    {
        resource.permitted_actions().contains(name)
    }

    /// Returns every action of type `A` with its enabled state.
    ///
    /// Names the server permitted that `A` does not declare are reported
    /// separately and never enabled.
    pub fn affordances<R, A>(&self, resource: &R) -> Affordances<A>
    where
        R: HasPermittedActions + ?Sized,
        A: Action,
    {
        let permitted = resource.permitted_actions();

        let actions = A::all()
            .iter()
            .map(|&action| Affordance {
                action,
                enabled: permitted.contains(action.as_str()),
            })
            .collect();

        let unknown: Vec<String> = permitted
            .iter()
            .filter(|name| A::from_name(name).is_none())
            .map(str::to_string)
            .collect();

        if !unknown.is_empty() {
            debug!(
                resource_type = A::RESOURCE_TYPE,
                resource = %resource.describe(),
                unknown = ?unknown,
                "server permits actions this client does not know"
            );
        }

        Affordances::new(actions, unknown)
    }

    /// Checks an action and returns an error if it is not permitted.
    pub fn require<R, A>(&self, resource: &R, action: A) -> Result<(), Report<CapabilityError>>
    where
        R: HasPermittedActions + ?Sized,
        A: Action,
    {
        if !self.is_permitted(resource, action) {
            return Err(CapabilityError::ActionNotPermitted {
                resource: resource.describe(),
                action: action.as_str().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PermittedActions;

    crate::define_actions! {
        enum IouAction for "Iou" {
            Pay => "pay",
            Forgive => "forgive",
            Confirm => "confirm",
        }
    }

    struct Iou {
        id: &'static str,
        actions: PermittedActions,
    }

    impl Iou {
        fn new(id: &'static str, actions: &[&str]) -> Self {
            Self {
                id,
                actions: actions.iter().copied().collect(),
            }
        }
    }

    impl HasPermittedActions for Iou {
        fn permitted_actions(&self) -> &PermittedActions {
            &self.actions
        }

        fn describe(&self) -> String {
            format!("Iou/{}", self.id)
        }
    }

    #[test]
    fn permission_is_list_membership() {
        let resolver = CapabilityResolver::new();
        let iou = Iou::new("1", &["pay"]);

        assert!(resolver.is_permitted(&iou, IouAction::Pay));
        assert!(!resolver.is_permitted(&iou, IouAction::Forgive));
        assert!(!resolver.is_permitted(&iou, IouAction::Confirm));
    }

    #[test]
    fn names_resolve_without_an_action_type() {
        let resolver = CapabilityResolver::new();
        let iou = Iou::new("1", &["pay", "escalate"]);

        assert!(resolver.is_permitted_name(&iou, "escalate"));
        assert!(!resolver.is_permitted_name(&iou, "forgive"));
        assert!(!resolver.is_permitted_name(&iou, ""));
    }

    #[test]
    fn empty_list_permits_nothing() {
        let resolver = CapabilityResolver::new();
        let iou = Iou::new("1", &[]);

        for &action in IouAction::all() {
            assert!(!resolver.is_permitted(&iou, action));
        }
        assert_eq!(resolver.affordances::<_, IouAction>(&iou).enabled().count(), 0);
    }

    #[test]
    fn per_identity_lists_give_disjoint_enabled_sets() {
        let resolver = CapabilityResolver::new();
        // The same instance as fetched by the issuer and by the payee.
        let as_issuer = Iou::new("7", &["pay"]);
        let as_payee = Iou::new("7", &["forgive", "confirm"]);

        let issuer: Vec<_> = resolver
            .affordances::<_, IouAction>(&as_issuer)
            .enabled()
            .collect();
        let payee: Vec<_> = resolver
            .affordances::<_, IouAction>(&as_payee)
            .enabled()
            .collect();

        assert_eq!(issuer, vec![IouAction::Pay]);
        assert_eq!(payee, vec![IouAction::Forgive, IouAction::Confirm]);
        assert!(issuer.iter().all(|action| !payee.contains(action)));
    }

    #[test]
    fn unknown_server_actions_are_reported_but_not_enabled() {
        let resolver = CapabilityResolver::new();
        let iou = Iou::new("1", &["pay", "escalate"]);

        let affordances = resolver.affordances::<_, IouAction>(&iou);

        assert_eq!(affordances.unknown(), ["escalate".to_string()]);
        assert!(affordances.is_enabled(IouAction::Pay));
        assert_eq!(affordances.all().len(), 3);
    }

    #[test]
    fn require_reports_denied_action() {
        let resolver = CapabilityResolver::new();
        let iou = Iou::new("1", &["pay"]);

        assert!(resolver.require(&iou, IouAction::Pay).is_ok());
        assert!(resolver.require(&iou, IouAction::Forgive).is_err());
    }
}
