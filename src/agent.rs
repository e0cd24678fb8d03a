use std::sync::Arc;

use chrono::Local;
use log::{error, info};
use prometheus::{register_int_counter_vec, IntCounterVec};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::{
    carmen::CarmenClient,
    config::{Config, LaneConfig},
    error::AgentError,
    event::CaptureEvent,
    sink::{RecordOutcome, Recorder, Sink},
    snapshot, trigger,
};

lazy_static::lazy_static! {
    static ref CYCLES: IntCounterVec = register_int_counter_vec!("rpr_cycles", "capture cycles run", &["lane"]).unwrap();
    static ref TRIGGERS: IntCounterVec = register_int_counter_vec!("rpr_trigger_active", "cycles with an active trigger", &["lane"]).unwrap();
    static ref RECOGNITIONS: IntCounterVec = register_int_counter_vec!("rpr_recognitions", "successful vendor recognitions", &["lane"]).unwrap();
    static ref RECOGNITION_FAILURES: IntCounterVec = register_int_counter_vec!("rpr_recognition_failures", "vendor recognition failures", &["lane"]).unwrap();
    static ref RECORDED: IntCounterVec = register_int_counter_vec!("rpr_records_persisted", "events persisted to the durable sink", &["lane"]).unwrap();
    static ref PERSIST_FAILURES: IntCounterVec = register_int_counter_vec!("rpr_persist_failures", "durable sink failures", &["lane"]).unwrap();
    static ref SUPPRESSED: IntCounterVec = register_int_counter_vec!("rpr_records_suppressed", "events withheld from the durable sink (sentinel or duplicate)", &["lane"]).unwrap();
    static ref CYCLE_ERRORS: IntCounterVec = register_int_counter_vec!("rpr_cycle_errors", "cycles that failed", &["lane"]).unwrap();
}

/// Everything a lane loop needs, built once at startup. The only state
/// shared between lanes is read-only config and the recorder's dedup set.
pub struct AgentContext {
    pub config: Arc<Config>,
    pub client: Client,
    pub carmen: CarmenClient,
    pub recorder: Recorder<Sink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Idle,
    Recorded,
    SentinelSkipped,
    Duplicate,
}

/// One poll -> fetch -> recognize -> record pass. Errors propagate to the
/// lane loop boundary and no further.
pub async fn cycle(
    ctx: &AgentContext,
    lane_name: &str,
    lane: &LaneConfig,
) -> Result<CycleOutcome, AgentError> {
    CYCLES.with_label_values(&[lane_name]).inc();
    if !trigger::check_trigger(&ctx.client, lane).await? {
        return Ok(CycleOutcome::Idle);
    }
    TRIGGERS.with_label_values(&[lane_name]).inc();
    info!("{lane_name}: trigger active, capturing snapshot");
    let image = snapshot::fetch_image(&ctx.client, &lane.camera_url).await?;
    let captured_at = Local::now();
    let reading = ctx.carmen.recognize(image.clone()).await?;
    RECOGNITIONS.with_label_values(&[lane_name]).inc();
    info!("{lane_name}: recognized plate '{}'", reading.plate_text);
    let event = CaptureEvent {
        lane: lane_name.to_string(),
        mac_address: lane.mac_address.clone(),
        captured_at,
        reading,
        image,
    };
    match ctx.recorder.record(&event).await? {
        RecordOutcome::Persisted => {
            RECORDED.with_label_values(&[lane_name]).inc();
            Ok(CycleOutcome::Recorded)
        }
        RecordOutcome::SentinelSkipped => {
            SUPPRESSED.with_label_values(&[lane_name]).inc();
            Ok(CycleOutcome::SentinelSkipped)
        }
        RecordOutcome::Duplicate => {
            SUPPRESSED.with_label_values(&[lane_name]).inc();
            Ok(CycleOutcome::Duplicate)
        }
    }
}

/// Runs cycles until the token fires. Cancellation is cooperative,
/// checked at the iteration boundary only; a stalled network call holds
/// the lane for at most the configured HTTP timeout.
pub async fn run_lane(ctx: Arc<AgentContext>, name: String, cancel: CancellationToken) {
    let Some(lane) = ctx.config.lanes.get(&name) else {
        return;
    };
    info!("{name}: lane loop started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = cycle(&ctx, &name, lane).await {
            note_cycle_error(&name, &e);
            error!("{name}: cycle failed: {e}");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(ctx.config.poll_interval()) => {}
        }
    }
    info!("{name}: lane loop stopped");
}

fn note_cycle_error(lane_name: &str, error: &AgentError) {
    CYCLE_ERRORS.with_label_values(&[lane_name]).inc();
    match error {
        AgentError::Recognition(_) => {
            RECOGNITION_FAILURES.with_label_values(&[lane_name]).inc();
        }
        AgentError::Persistence(_) | AgentError::Auth(_) | AgentError::Io(_) => {
            PERSIST_FAILURES.with_label_values(&[lane_name]).inc();
        }
        _ => {}
    }
}
