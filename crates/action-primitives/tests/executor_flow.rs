use std::sync::Arc;

use action_locator::ElementRegistry;
use action_primitives::{ActionError, Executor, ExecutorConfig};
use cdp_adapter::dom::{El, Reaction};
use cdp_adapter::{DomPort, MemoryDom};
use pagepilot_core_types::{ActionDescriptor, ActionKind, FailureKind};
use perceiver_structural::StructuralExtractor;
use tokio_test::assert_ok;

fn signup_page() -> MemoryDom {
    let dom = MemoryDom::new("https://shop.test/signup", "Sign up");
    dom.append(
        dom.body(),
        El::new("form").id("signup").children([
            El::new("label").attr("for", "email").text("Email"),
            El::new("input").id("email").attr("type", "email"),
            El::new("select").id("country").children([
                El::new("option").attr("value", "").text("Choose"),
                El::new("option").attr("value", "de").text("Germany"),
                El::new("option").attr("value", "fr").text("France"),
            ]),
            El::new("input").id("terms").attr("type", "checkbox"),
            El::new("button").id("create").attr("type", "submit").text("Create account"),
        ]),
    );
    dom.append(
        dom.body(),
        El::new("div").class("alert-danger").text("Email already registered").hidden(),
    );
    dom
}

fn executor() -> Executor {
    Executor::new(
        ExecutorConfig::default(),
        Arc::new(StructuralExtractor::default()),
        Arc::new(ElementRegistry::default()),
    )
}

async fn node(dom: &MemoryDom, css: &str) -> cdp_adapter::NodeHandle {
    dom.query_all(dom.document_handle(), css).await.unwrap()[0]
}

#[tokio::test]
async fn signup_form_end_to_end() {
    let dom = signup_page();
    let exec = executor();
    let capture = assert_ok!(exec.capture(&dom).await);
    assert!(capture.snapshot.uids_unique());

    let steps = [
        ActionDescriptor::new(ActionKind::Type)
            .with_target("email")
            .with_value("ada@example.com"),
        ActionDescriptor::new(ActionKind::Select)
            .with_target("country")
            .with_value("france"),
        ActionDescriptor::new(ActionKind::Check).with_target("terms"),
    ];
    for step in &steps {
        let result = assert_ok!(exec.perform(&dom, step).await);
        assert!(result.success, "{} failed: {}", step.kind, result.summary());
    }

    assert_eq!(dom.value_of(node(&dom, "#email").await).as_deref(), Some("ada@example.com"));
    assert_eq!(dom.selected_index(node(&dom, "#country").await), Some(2));
    assert!(dom.is_checked(node(&dom, "#terms").await));

    let form = node(&dom, "#signup").await;
    let banner = node(&dom, ".alert-danger").await;
    dom.on(form, "submit", Reaction::PreventDefault);
    dom.on(form, "submit", Reaction::Show(banner));

    let result = assert_ok!(
        exec.perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_target("create"))
            .await
    );
    assert!(result.success);
    assert_eq!(result.errors, vec!["Email already registered".to_string()]);
    assert!(dom.submissions().is_empty());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["action"], "click");
    assert_eq!(json["target_uid"], "create");
    assert!(json["snapshot"]["elements"].as_array().unwrap().len() >= 4);
}

#[tokio::test]
async fn disabled_control_reports_not_interactable() {
    let dom = MemoryDom::new("https://shop.test/", "Shop");
    dom.append(
        dom.body(),
        El::new("button").id("pay").attr("disabled", "").text("Pay"),
    );
    let result = assert_ok!(
        executor()
            .perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_selector("#pay"))
            .await
    );
    assert!(!result.success);
    assert_eq!(result.failure_kind(), Some(FailureKind::NotInteractable));
}

#[tokio::test]
async fn option_miss_reads_as_not_found() {
    let dom = signup_page();
    let exec = executor();
    assert_ok!(exec.capture(&dom).await);
    let result = assert_ok!(
        exec.perform(
            &dom,
            &ActionDescriptor::new(ActionKind::Select)
                .with_target("country")
                .with_value("Atlantis"),
        )
        .await
    );
    assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
}

#[tokio::test]
async fn broken_connection_surfaces_as_error() {
    let dom = signup_page();
    dom.break_connection(false);
    let outcome = executor()
        .perform(&dom, &ActionDescriptor::new(ActionKind::Wait).with_duration(100))
        .await;
    // A plain wait never touches the page; observation does but cannot fail it.
    let result = assert_ok!(outcome);
    assert!(result.success);
    assert!(result.snapshot.is_none());

    let err = executor()
        .perform(&dom, &ActionDescriptor::new(ActionKind::Submit))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::CdpIo(_)));
}

fn cart_page() -> MemoryDom {
    let dom = MemoryDom::new("https://shop.test/cart", "Cart");
    dom.append(dom.body(), El::new("a").id("orders").attr("href", "/orders").text("Orders"));
    dom.append(dom.body(), El::new("a").id("totals").attr("href", "/cart#totals").text("Totals"));
    dom
}

#[tokio::test]
async fn link_click_reports_navigation() {
    let dom = cart_page();
    let exec = executor();
    assert_ok!(exec.capture(&dom).await);

    let result = assert_ok!(
        exec.perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_target("orders"))
            .await
    );
    assert!(result.success, "{}", result.summary());
    assert!(result.navigated);
    assert_eq!(result.url.as_deref(), Some("https://shop.test/orders"));
    assert!(result.snapshot.is_none());
    assert_eq!(dom.navigations(), vec!["https://shop.test/orders".to_string()]);
}

#[tokio::test]
async fn fragment_jump_stays_on_the_page() {
    let dom = cart_page();
    let exec = executor();
    assert_ok!(exec.capture(&dom).await);

    let result = assert_ok!(
        exec.perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_target("totals"))
            .await
    );
    assert!(result.success, "{}", result.summary());
    assert!(!result.navigated);
    assert!(result.url.is_none());
    assert!(result.snapshot.is_some());
}
