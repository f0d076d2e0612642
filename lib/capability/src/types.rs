//! Action and permitted-action types.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An action on one resource type.
///
/// Implemented by a fieldless enum per resource type, usually through
/// [`define_actions!`](crate::define_actions).
pub trait Action: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The resource type the actions belong to.
    const RESOURCE_TYPE: &'static str;

    /// Returns the action name the engine uses.
    fn as_str(&self) -> &'static str;

    /// Returns every action of this type.
    fn all() -> &'static [Self];

    /// Looks up an action by its engine name.
    #[must_use]
    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|action| action.as_str() == name)
    }
}

/// Defines a fieldless action enum and implements [`Action`] for it.
///
/// ```
/// tidal_bridge_capability::define_actions! {
///     /// Actions on an order.
///     pub enum OrderAction for "Order" {
///         /// Submit the order.
///         Submit => "submit",
///         /// Cancel the order.
///         Cancel => "cancel",
///     }
/// }
///
/// use tidal_bridge_capability::Action;
/// assert_eq!(OrderAction::from_name("cancel"), Some(OrderAction::Cancel));
/// assert_eq!(OrderAction::Submit.to_string(), "submit");
/// ```
#[macro_export]
macro_rules! define_actions {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $resource:literal {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $action:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )+
        }

        impl $crate::Action for $name {
            const RESOURCE_TYPE: &'static str = $resource;

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $action,)+
                }
            }

            fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::Action::as_str(self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::CapabilityError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                <Self as $crate::Action>::from_name(s).ok_or_else(|| {
                    $crate::CapabilityError::UnknownAction {
                        action_type: $resource,
                        name: s.to_string(),
                    }
                })
            }
        }
    };
}

/// The actions the server says the current user may take on a resource.
///
/// Deserializes from a list of names or from the engine's map of action
/// name to action URL. Serializes as a sorted list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermittedActions(BTreeSet<String>);

impl PermittedActions {
    /// Creates an empty set: nothing is permitted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the server listed `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Returns the listed names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of listed actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no action is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermittedActions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for PermittedActions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Names(Vec<String>),
            Links(BTreeMap<String, IgnoredAny>),
            Missing(()),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Names(names) => names.into_iter().collect(),
            Wire::Links(links) => links.into_keys().collect(),
            Wire::Missing(()) => Self::new(),
        })
    }
}

/// A resource that carries its permitted actions.
pub trait HasPermittedActions {
    /// Returns the actions the server permitted on this resource.
    fn permitted_actions(&self) -> &PermittedActions;

    /// Returns a short description of the resource for errors and logs.
    fn describe(&self) -> String;
}

/// One action with whether the current user may take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordance<A> {
    /// The action.
    pub action: A,
    /// True if the server permitted the action.
    pub enabled: bool,
}

/// Every known action of a type with its enabled state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordances<A> {
    actions: Vec<Affordance<A>>,
    unknown: Vec<String>,
}

impl<A: Action> Affordances<A> {
    pub(crate) fn new(actions: Vec<Affordance<A>>, unknown: Vec<String>) -> Self {
        Self { actions, unknown }
    }

    /// Returns every known action with its state, in declaration order.
    #[must_use]
    pub fn all(&self) -> &[Affordance<A>] {
        &self.actions
    }

    /// Returns the enabled actions.
    pub fn enabled(&self) -> impl Iterator<Item = A> + '_ {
        self.actions
            .iter()
            .filter(|affordance| affordance.enabled)
            .map(|affordance| affordance.action)
    }

    /// Returns true if `action` is enabled.
    #[must_use]
    pub fn is_enabled(&self, action: A) -> bool {
        self.actions
            .iter()
            .any(|affordance| affordance.action == action && affordance.enabled)
    }

    /// Returns names the server permitted that `A` does not declare.
    #[must_use]
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_actions! {
        enum Door for "Door" {
            Open => "open",
            Lock => "lock",
        }
    }

    #[test]
    fn action_names_round_trip_through_from_str() {
        assert_eq!("lock".parse::<Door>(), Ok(Door::Lock));
        assert_eq!(Door::all(), &[Door::Open, Door::Lock]);
        assert_eq!(Door::RESOURCE_TYPE, "Door");

        let err = "kick".parse::<Door>().unwrap_err();
        assert_eq!(
            err,
            crate::CapabilityError::UnknownAction {
                action_type: "Door",
                name: "kick".to_string(),
            }
        );
    }

    #[test]
    fn deserializes_name_list() {
        let actions: PermittedActions =
            serde_json::from_str(r#"["open", "lock", "open"]"#).expect("deserialize");
        assert_eq!(actions.len(), 2);
        assert!(actions.contains("open"));
        assert!(actions.contains("lock"));
    }

    #[test]
    fn deserializes_action_link_map() {
        let actions: PermittedActions = serde_json::from_str(
            r#"{
                "open": "https://engine.test/npl/doors/Door/1/open",
                "lock": null
            }"#,
        )
        .expect("deserialize");
        assert_eq!(actions.iter().collect::<Vec<_>>(), vec!["lock", "open"]);
    }

    #[test]
    fn null_means_nothing_permitted() {
        let actions: PermittedActions = serde_json::from_str("null").expect("deserialize");
        assert!(actions.is_empty());
    }

    #[test]
    fn names_are_case_sensitive() {
        let actions: PermittedActions = ["Open"].into_iter().collect();
        assert!(!actions.contains("open"));
    }
}
