//! Reply metrics.
//!
//! Small structs used to observe what one `reply` call did and where the time
//! went. They are always collected (the cost is a few `Instant::now()` calls);
//! only `Engine::reply_verbose` hands them to the caller.
//!
//! A turn is a sequence of match steps: the user's message, then one step per
//! redirect followed while rendering.
//!
//! ```text
//! "hi there" ──▶ step 0  topic=random  matched "hi *"    → reply has {@hello}
//!                step 1  topic=random  matched "hello"   (redirect)
//! ```

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct ReplyMetrics {
    /// Total elapsed time for the turn.
    pub total: Duration,
    /// Time spent normalizing and matching, summed over all steps.
    pub matching: Duration,
    /// Time spent rendering (including macro calls), excluding nested matching.
    pub render: Duration,
    /// Triggers tried, summed over all steps.
    pub triggers_tried: usize,
    /// Per-step detail.
    pub steps: Vec<MatchStep>,
}

/// One match attempt.
#[derive(Debug, Default, Clone)]
pub struct MatchStep {
    /// Normalized text that was matched.
    pub input: String,
    /// Topic searched.
    pub topic: String,
    /// Raw pattern of the winning trigger.
    pub matched: Option<String>,
    /// Triggers tried in this step.
    pub tried: usize,
    pub duration: Duration,
    /// Redirect depth (0 for the user's own message).
    pub depth: usize,
}
