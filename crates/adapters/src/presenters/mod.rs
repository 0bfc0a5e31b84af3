use pixseek_domain::{ResultImageRef, SearchMetrics, SearchState};

/// Number of skeleton slots shown while a search is loading.
pub const LOADING_SLOT_COUNT: usize = 8;

/// What the results area shows for a given search state. Purely derived;
/// holds no state of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsView {
    /// Nothing in the grid. The caller decides between the "no results"
    /// notice and the initial prompt based on `has_searched`.
    Empty,
    /// Fixed count of placeholder slots, in declaration order.
    LoadingSlots(usize),
    /// Result URLs in the order the backend ranked them.
    Items(Vec<String>),
}

pub fn present_results(state: &SearchState) -> ResultsView {
    match state {
        SearchState::Loading => ResultsView::LoadingSlots(LOADING_SLOT_COUNT),
        SearchState::Succeeded(results) if !results.is_empty() => ResultsView::Items(
            results
                .iter()
                .map(|reference| reference.url().to_string())
                .collect(),
        ),
        SearchState::Idle | SearchState::Succeeded(_) | SearchState::Failed(_) => {
            ResultsView::Empty
        }
    }
}

pub fn present_result_row(index: usize, reference: &ResultImageRef) -> String {
    format!("{}\t{}", index + 1, reference.url())
}

pub fn present_metrics(metrics: &SearchMetrics) -> String {
    format!(
        "searches submitted={} completed={} canceled={} last_ms={} p95_ms={}",
        metrics.submitted_jobs,
        metrics.completed_jobs,
        metrics.canceled_jobs,
        metrics
            .last_roundtrip_ms
            .map_or_else(|| "-".to_string(), |ms| ms.to_string()),
        metrics
            .p95_roundtrip_ms
            .map_or_else(|| "-".to_string(), |ms| ms.to_string()),
    )
}
