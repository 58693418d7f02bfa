use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod bootstrap;
pub mod past_state;
pub mod save_pipeline;
pub mod schedule_service;
pub mod shift_lookup;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}
