//! Plain-text rendering of engine resources for the terminal.

use std::fmt::Write;

use tidal_bridge_capability::HasPermittedActions;
use tidal_bridge_engine::{ResourceInstance, ResourcePage, ViewState};
use tidal_bridge_session::IdentityClaims;

/// Renders what a view shows, from the point of view of `claims`.
#[must_use]
pub fn render_view(state: &ViewState, claims: &IdentityClaims) -> String {
    match state {
        ViewState::Empty => "nothing selected".to_string(),
        ViewState::Loading => "loading".to_string(),
        ViewState::Loaded(instance) => render_instance(instance, claims),
        ViewState::NotFound => "not found".to_string(),
        ViewState::Failed { message } => format!("failed: {message}"),
    }
}

/// Renders one instance with its fields, the caller's parties and the
/// actions offered to the caller.
#[must_use]
pub fn render_instance(instance: &ResourceInstance, claims: &IdentityClaims) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", instance.id);
    if let Some(state) = &instance.state {
        let _ = writeln!(out, "  state:   {state}");
    }
    for (name, value) in &instance.fields {
        let _ = writeln!(out, "  {name}: {value}");
    }

    let parties: Vec<&str> = instance.parties_of(claims).collect();
    let _ = writeln!(out, "  you are: {}", list_or_none(&parties));

    let offered: Vec<&str> = instance.permitted_actions().iter().collect();
    let _ = write!(out, "  actions: {}", list_or_none(&offered));
    out
}

/// Renders a listing, one instance per line.
#[must_use]
pub fn render_page(page: &ResourcePage) -> String {
    let mut out = String::new();
    for instance in &page.items {
        let state = instance.state.as_deref().unwrap_or("-");
        let actions = instance.permitted_actions().len();
        let _ = writeln!(out, "{}  {state}  {actions} action(s)", instance.id);
    }
    match page.total_items {
        Some(total) => {
            let _ = write!(out, "{} of {total}", page.items.len());
        }
        None => {
            let _ = write!(out, "{} item(s)", page.items.len());
        }
    }
    out
}

fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn iou() -> ResourceInstance {
        serde_json::from_value(json!({
            "@id": "7",
            "@state": "unpaid",
            "@actions": ["pay"],
            "@parties": {
                "issuer": { "entity": { "email": ["alice@example.com"] } },
                "payee": { "entity": { "email": ["bob@example.com"] } }
            },
            "amount": 100
        }))
        .expect("instance")
    }

    #[test]
    fn instance_shows_callers_parties_and_actions() {
        let claims = IdentityClaims::new().with_claim("email", ["alice@example.com"]);

        let text = render_instance(&iou(), &claims);

        assert!(text.starts_with("7\n"));
        assert!(text.contains("state:   unpaid"));
        assert!(text.contains("amount: 100"));
        assert!(text.contains("you are: issuer"));
        assert!(text.contains("actions: pay"));
    }

    #[test]
    fn stranger_sees_no_parties() {
        let claims = IdentityClaims::new().with_claim("email", ["eve@example.com"]);

        assert!(render_instance(&iou(), &claims).contains("you are: none"));
    }

    #[test]
    fn view_states_render() {
        let claims = IdentityClaims::new();

        assert_eq!(render_view(&ViewState::NotFound, &claims), "not found");
        assert_eq!(
            render_view(
                &ViewState::Failed {
                    message: "Forbidden".to_string()
                },
                &claims
            ),
            "failed: Forbidden"
        );
    }

    #[test]
    fn page_reports_totals() {
        let page: ResourcePage = serde_json::from_value(json!({
            "items": [{ "@id": "1", "@actions": ["pay", "forgive"] }],
            "page": 1,
            "totalItems": 12
        }))
        .expect("page");

        let text = render_page(&page);

        assert!(text.contains("1  -  2 action(s)"));
        assert!(text.ends_with("1 of 12"));
    }
}
