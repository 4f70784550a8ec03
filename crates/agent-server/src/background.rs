//! Background tasks: scheduled prompts and session expiry

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use agent_core::Agent;
use agent_tools::ScheduledPrompt;
use agent_transport::Outbound;

/// How often idle sessions and per-user locks are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Run every fired cron job through the agent and deliver the result.
///
/// Each prompt gets its own task; the per-user lock inside the agent keeps a
/// job from interleaving with a conversation the user is having.
pub fn spawn_cron_consumer(
    agent: Arc<Agent>,
    outbound: Arc<dyn Outbound>,
    mut rx: UnboundedReceiver<ScheduledPrompt>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(fired) = rx.recv().await {
            let agent = Arc::clone(&agent);
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                tracing::info!(user_id = %fired.user_id, job_id = %fired.job_id, "Running scheduled task");
                let reply = agent.run(&fired.user_id, &fired.prompt).await;
                let text = format!("⏰ Scheduled task result:\n{reply}");
                if let Err(e) = outbound.send(&fired.user_id, &text).await {
                    tracing::error!(user_id = %fired.user_id, job_id = %fired.job_id, error = %e, "Scheduled result delivery failed");
                }
            });
        }
        tracing::info!("Scheduler channel closed, cron consumer exiting");
    })
}

/// Periodically drop expired sessions and unused per-user locks
pub fn spawn_session_sweeper(agent: Arc<Agent>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let sessions = agent.sessions().sweep_expired();
            let locks = agent.prune_idle_locks().await;
            if sessions > 0 || locks > 0 {
                tracing::info!(sessions, locks, "Swept idle state");
            }
        }
    })
}
