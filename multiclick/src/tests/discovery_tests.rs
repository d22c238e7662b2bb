use crate::discovery::Discovery;
use crate::element::Highlight;
use crate::host::simulated::SimulatedPage;
use std::sync::Arc;

fn discovery_for(page: &SimulatedPage) -> Discovery {
    Discovery::new(Arc::new(page.clone()))
}

#[tokio::test]
async fn scan_filters_hidden_disabled_and_unlabeled() {
    let page = SimulatedPage::new();
    let visible = page.push_button("Claim");
    page.push_hidden("Claim");
    page.push_disabled("Claim");
    page.push_button("   "); // whitespace-only label

    let controls = discovery_for(&page).scan().await.expect("scan");
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].object_id(), visible);
}

#[tokio::test]
async fn scan_preserves_document_order() {
    let page = SimulatedPage::new();
    let ids = vec![
        page.push_button("Follow"),
        page.push_button("Claim"),
        page.push_button("Follow"),
    ];
    let controls = discovery_for(&page).scan().await.expect("scan");
    let scanned: Vec<usize> = controls.iter().map(|c| c.object_id()).collect();
    assert_eq!(scanned, ids);
}

#[tokio::test]
async fn labels_are_trimmed_before_matching() {
    let page = SimulatedPage::new();
    page.push_button("  Claim  ");
    let discovery = discovery_for(&page);

    let matches = discovery.find_by_label("Claim").await.expect("find");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].label(), "Claim");
}

#[tokio::test]
async fn group_sorts_by_count_then_label() {
    let page = SimulatedPage::new();
    for _ in 0..2 {
        page.push_button("Follow");
    }
    for _ in 0..3 {
        page.push_button("Claim");
    }
    // Two singletons to exercise the lexicographic tie-break.
    page.push_button("Buy");
    page.push_button("Accept");

    let groups = discovery_for(&page).scan_groups().await.expect("groups");
    let summary: Vec<(String, usize)> =
        groups.iter().map(|g| (g.label.clone(), g.count)).collect();
    assert_eq!(
        summary,
        vec![
            ("Claim".to_string(), 3),
            ("Follow".to_string(), 2),
            ("Accept".to_string(), 1),
            ("Buy".to_string(), 1),
        ]
    );
    assert_eq!(groups[0].members.len(), 3);
}

#[tokio::test]
async fn find_by_label_is_case_sensitive_and_exact() {
    let page = SimulatedPage::new();
    page.push_button("Claim");
    page.push_button("claim");
    page.push_button("Claim now");
    let discovery = discovery_for(&page);

    assert_eq!(discovery.find_by_label("Claim").await.expect("find").len(), 1);
    assert_eq!(discovery.find_by_label("claim").await.expect("find").len(), 1);
    assert!(discovery.find_by_label("CLAIM").await.expect("find").is_empty());
}

#[tokio::test]
async fn highlight_state_never_affects_scan_results() {
    let page = SimulatedPage::new();
    page.push_button("Claim");
    page.push_button("Claim");
    let discovery = discovery_for(&page);

    let before = discovery.find_by_label("Claim").await.expect("find");
    for control in &before {
        control.set_highlight(Highlight::Pending).expect("highlight");
    }
    let after = discovery.find_by_label("Claim").await.expect("find");
    assert_eq!(before.len(), after.len());
}
