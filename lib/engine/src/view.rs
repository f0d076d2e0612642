//! Staleness-guarded view of one engine resource.
//!
//! A view shows at most one resource at a time. Every fetch is tagged with a
//! ticket, and a result is only applied while its ticket is the latest one
//! the view handed out, so a slow response for a resource the user already
//! navigated away from never overwrites the resource shown now.

use rootcause::prelude::Report;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::EngineClient;
use crate::error::EngineError;
use crate::live::LiveEvent;
use crate::model::ResourceInstance;

/// What a view currently displays.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    /// Nothing selected.
    Empty,
    /// A fetch for the selected resource is outstanding.
    Loading,
    /// The selected resource as last fetched.
    Loaded(ResourceInstance),
    /// The selected resource does not exist.
    NotFound,
    /// The last fetch failed.
    Failed {
        /// Message to show the user.
        message: String,
    },
}

/// Permission to update a view, handed out per fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTicket {
    generation: u64,
    id: String,
}

impl ViewTicket {
    /// Returns the id of the resource the ticket was issued for.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The selected resource and what is shown for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    generation: u64,
    shown: Option<String>,
    state: ViewState,
}

impl ViewSnapshot {
    /// Returns the id of the selected resource.
    #[must_use]
    pub fn shown(&self) -> Option<&str> {
        self.shown.as_deref()
    }

    /// Returns the displayed state.
    #[must_use]
    pub fn state(&self) -> &ViewState {
        &self.state
    }
}

/// A view bound to one resource type.
#[derive(Debug)]
pub struct ResourceView {
    resource_type: String,
    inner: watch::Sender<ViewSnapshot>,
}

impl ResourceView {
    /// Creates an empty view.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        let (inner, _receiver) = watch::channel(ViewSnapshot {
            generation: 0,
            shown: None,
            state: ViewState::Empty,
        });
        Self {
            resource_type: resource_type.into(),
            inner,
        }
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the id of the selected resource.
    #[must_use]
    pub fn shown(&self) -> Option<String> {
        self.inner.borrow().shown.clone()
    }

    /// Returns the displayed state.
    #[must_use]
    pub fn state(&self) -> ViewState {
        self.inner.borrow().state.clone()
    }

    /// Returns a receiver that observes every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.inner.subscribe()
    }

    /// Selects a resource. Outstanding tickets stop being current.
    pub fn navigate(&self, id: impl Into<String>) -> ViewTicket {
        let id = id.into();
        let mut generation = 0;
        self.inner.send_modify(|view| {
            view.generation += 1;
            generation = view.generation;
            view.shown = Some(id.clone());
            view.state = ViewState::Loading;
        });
        ViewTicket { generation, id }
    }

    /// Issues a ticket to re-fetch the selected resource in place.
    ///
    /// The displayed state is kept until the re-fetch lands.
    pub fn reload_ticket(&self) -> Option<ViewTicket> {
        let mut ticket = None;
        self.inner.send_if_modified(|view| {
            if let Some(id) = view.shown.clone() {
                view.generation += 1;
                ticket = Some(ViewTicket {
                    generation: view.generation,
                    id,
                });
            }
            false
        });
        ticket
    }

    /// Returns true if `ticket` is the latest one issued.
    #[must_use]
    pub fn is_current(&self, ticket: &ViewTicket) -> bool {
        self.inner.borrow().generation == ticket.generation
    }

    /// Shows `state` if `ticket` is still current.
    ///
    /// Returns false, leaving the view untouched, for a superseded ticket.
    pub fn apply(&self, ticket: &ViewTicket, state: ViewState) -> bool {
        let applied = self.inner.send_if_modified(|view| {
            if view.generation == ticket.generation {
                view.state = state;
                true
            } else {
                false
            }
        });
        if !applied {
            debug!(id = ticket.id(), "discarding result for a superseded view");
        }
        applied
    }

    /// Selects a resource and fetches it.
    ///
    /// Returns whether the result was applied. A missing resource is shown
    /// as [`ViewState::NotFound`] and is not an error.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if it was applied to the view. Errors of
    /// superseded fetches are discarded.
    pub async fn load(
        &self,
        client: &EngineClient,
        id: impl Into<String>,
    ) -> Result<bool, Report<EngineError>> {
        let ticket = self.navigate(id);
        self.fetch(client, ticket).await
    }

    /// Re-fetches the selected resource, if any.
    ///
    /// # Errors
    ///
    /// As for [`ResourceView::load`].
    pub async fn refresh(&self, client: &EngineClient) -> Result<bool, Report<EngineError>> {
        match self.reload_ticket() {
            Some(ticket) => self.fetch(client, ticket).await,
            None => Ok(false),
        }
    }

    /// Re-fetches the selected resource if a live event concerns it.
    ///
    /// Failures are logged and dropped; the next event retries.
    pub async fn on_event(&self, client: &EngineClient, event: &LiveEvent) -> bool {
        if event.resource_type != self.resource_type
            || self.shown().as_deref() != Some(event.id.as_str())
        {
            return false;
        }

        match self.refresh(client).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(id = %event.id, error = %e, "live update re-fetch failed");
                false
            }
        }
    }

    async fn fetch(
        &self,
        client: &EngineClient,
        ticket: ViewTicket,
    ) -> Result<bool, Report<EngineError>> {
        match client.get(&self.resource_type, ticket.id()).await {
            Ok(instance) => Ok(self.apply(&ticket, ViewState::Loaded(instance))),
            Err(report) => {
                let state = match report.current_context() {
                    EngineError::NotFound { .. } => ViewState::NotFound,
                    error => ViewState::Failed {
                        message: error.to_string(),
                    },
                };
                let failed = matches!(state, ViewState::Failed { .. });
                let applied = self.apply(&ticket, state);
                if applied && failed {
                    Err(report)
                } else {
                    Ok(applied)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveEventKind;
    use crate::testing::{EngineHarness, serve};
    use axum::extract::{Json, Path};
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance(id: &str) -> ResourceInstance {
        serde_json::from_value(json!({ "@id": id })).expect("instance")
    }

    #[test]
    fn late_result_for_previous_resource_is_discarded() {
        let view = ResourceView::new("Iou");
        let for_a = view.navigate("a");
        let for_b = view.navigate("b");

        assert!(view.apply(&for_b, ViewState::Loaded(instance("b"))));
        assert!(!view.apply(&for_a, ViewState::Loaded(instance("a"))));

        assert_eq!(view.shown().as_deref(), Some("b"));
        assert_eq!(view.state(), ViewState::Loaded(instance("b")));
    }

    #[test]
    fn reload_ticket_supersedes_older_fetch_of_same_resource() {
        let view = ResourceView::new("Iou");
        let first = view.navigate("a");
        let reload = view.reload_ticket().expect("resource selected");

        assert!(!view.is_current(&first));
        assert!(view.is_current(&reload));
        assert_eq!(view.state(), ViewState::Loading);
        assert!(ResourceView::new("Iou").reload_ticket().is_none());
    }

    #[tokio::test]
    async fn slow_fetch_never_overwrites_newer_navigation() {
        let router = Router::new().route(
            "/npl/iou/Iou/{id}/",
            get(|Path(id): Path<String>| async move {
                if id == "slow" {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
                Json(json!({ "@id": id }))
            }),
        );
        let harness = EngineHarness::authenticated(serve(router).await, "tok");
        let view = ResourceView::new("Iou");

        let (slow, fast) = tokio::join!(view.load(&harness.client, "slow"), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            view.load(&harness.client, "fast").await
        });

        assert!(!slow.unwrap());
        assert!(fast.unwrap());
        assert_eq!(view.shown().as_deref(), Some("fast"));
        assert_eq!(view.state(), ViewState::Loaded(instance("fast")));
    }

    #[tokio::test]
    async fn missing_resource_is_a_view_state() {
        let harness = EngineHarness::authenticated(serve(Router::new()).await, "tok");
        let view = ResourceView::new("Iou");

        assert!(view.load(&harness.client, "gone").await.unwrap());
        assert_eq!(view.state(), ViewState::NotFound);
    }

    #[tokio::test]
    async fn live_event_refetches_only_the_shown_resource() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let router = Router::new().route(
            "/npl/iou/Iou/{id}/",
            get({
                let fetches = fetches.clone();
                move |Path(id): Path<String>| {
                    let state = if fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                        "unpaid"
                    } else {
                        "paid"
                    };
                    async move { Json(json!({ "@id": id, "@state": state })) }
                }
            }),
        );
        let harness = EngineHarness::authenticated(serve(router).await, "tok");
        let view = ResourceView::new("Iou");
        view.load(&harness.client, "7").await.unwrap();

        let other = LiveEvent {
            resource_type: "Iou".to_string(),
            id: "8".to_string(),
            kind: LiveEventKind::Updated,
        };
        let shown = LiveEvent {
            id: "7".to_string(),
            ..other.clone()
        };

        assert!(!view.on_event(&harness.client, &other).await);
        assert!(view.on_event(&harness.client, &shown).await);

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        match view.state() {
            ViewState::Loaded(iou) => assert_eq!(iou.state.as_deref(), Some("paid")),
            state => panic!("unexpected view state {state:?}"),
        }
    }
}
