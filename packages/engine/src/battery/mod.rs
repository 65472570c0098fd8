//! The ordered test battery.
//!
//! Cases run one at a time in declared order. Each gets a fresh
//! [`ResultSet`] that is reported to the operator and then merged into the
//! group's results; a later case may overwrite an earlier key.
//!
//! A case that errors out does not stop the battery: every assertion it
//! declared but had not yet recorded becomes inconclusive with the error
//! text. Only [`EngineError::SessionClosed`] propagates.

pub mod outbox;

use apconform::{ResultSet, Verdict};
use apconform_session_api::Notice;
use tracing::{info, warn};

use crate::client::ApClient;
use crate::error::EngineError;
use crate::operator::Operator;
use crate::poll::RetryPolicy;
use crate::session::SessionActors;

pub use outbox::OutboxCase;

/// Result group for the client-to-server outbox battery.
pub const C2S_SERVER_GROUP: &str = "c2s-server-test-items";

/// What a case may use while it runs.
pub struct BatteryContext<'a> {
    pub client: &'a ApClient,
    pub actors: &'a SessionActors,
    pub retry: RetryPolicy,
    pub max_items: usize,
}

/// Run every outbox case against `ctx.client`, narrating to `operator`.
pub async fn run_outbox_battery(
    ctx: &BatteryContext<'_>,
    operator: &dyn Operator,
    results: &mut ResultSet,
) -> Result<(), EngineError> {
    info!(
        "battery: running outbox cases against {} (session {})",
        ctx.client.uri(),
        ctx.actors.session_id()
    );
    for case in OutboxCase::ALL {
        run_case(case, ctx, operator, results).await?;
    }
    Ok(())
}

async fn run_case(
    case: OutboxCase,
    ctx: &BatteryContext<'_>,
    operator: &dyn Operator,
    results: &mut ResultSet,
) -> Result<(), EngineError> {
    operator
        .notice(Notice::RunningTest {
            name: case.name().to_string(),
        })
        .await?;

    let mut case_results = ResultSet::new();
    match case.run(ctx, &mut case_results).await {
        Ok(()) => {}
        Err(e) if e.is_session_closed() => return Err(e),
        Err(e) => {
            warn!(
                "battery: {} aborted in session {}: {e}",
                case.name(),
                ctx.actors.session_id()
            );
            for id in case.assertions() {
                if !case_results.contains_key(id) {
                    case_results.insert(*id, Verdict::inconclusive(format!("Test aborted: {e}")));
                }
            }
            operator
                .notice(Notice::failure(format!("{} aborted: {e}", case.name())))
                .await?;
        }
    }

    info!(
        "battery: {}: session={}, results={}",
        case.name(),
        ctx.actors.session_id(),
        summarize(&case_results)
    );
    operator
        .notice(Notice::Results {
            items: case_results.clone(),
        })
        .await?;
    results.merge(case_results);
    Ok(())
}

fn summarize(results: &ResultSet) -> String {
    results
        .iter()
        .map(|(id, verdict)| format!("{id}={verdict}"))
        .collect::<Vec<_>>()
        .join(", ")
}
