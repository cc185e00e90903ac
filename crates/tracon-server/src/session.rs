//! The sim actor.
//!
//! Each [`Sim`] is owned by one task. Everything that touches it, RPC
//! handlers and the session driver alike, sends a boxed job over a channel
//! and waits for the result on a oneshot. Jobs run one at a time, so every
//! operation on a sim is serialized without a lock around the sim itself.
//!
//! ```text
//! RPC handler ──┐
//!               ├─► SimJob ──► actor task (owns Sim) ──► oneshot reply
//! driver task ──┘
//! ```
//!
//! A job that panics is caught and reported to its caller as
//! [`ServerError::SessionPanicked`]; the actor moves on to the next job.
//! The actor exits once every [`SimHandle`] has been dropped.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use tracon_sim::Sim;

use crate::error::ServerError;

/// Jobs queued per sim before senders wait.
const JOB_QUEUE_CAPACITY: usize = 256;

/// Work executed on the actor with exclusive access to the sim.
pub type SimJob = Box<dyn FnOnce(&mut Sim) + Send>;

/// Cloneable address of a sim actor.
#[derive(Debug, Clone)]
pub struct SimHandle {
    tx: mpsc::Sender<SimJob>,
}

impl SimHandle {
    /// Move `sim` onto a new actor task.
    pub fn spawn(sim: Sim) -> Self {
        let (tx, mut rx) = mpsc::channel::<SimJob>(JOB_QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut sim = sim;
            while let Some(job) = rx.recv().await {
                job(&mut sim);
            }
            debug!("Sim actor stopped");
        });
        Self { tx }
    }

    /// Run `f` on the sim and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ServerError>
    where
        F: FnOnce(&mut Sim) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: SimJob = Box::new(move |sim: &mut Sim| {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(sim))).map_err(panic_message);
            if let Err(message) = &outcome {
                error!(%message, "Sim job panicked");
            }
            // The caller may have gone away; nothing to do then.
            let _ = reply_tx.send(outcome);
        });

        if self.tx.send(job).await.is_err() {
            return Err(ServerError::SessionClosed);
        }
        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ServerError::SessionPanicked(message)),
            Err(_) => Err(ServerError::SessionClosed),
        }
    }

    /// Run a fallible sim operation, flattening its error.
    pub async fn try_call<R, F>(&self, f: F) -> Result<R, ServerError>
    where
        F: FnOnce(&mut Sim) -> Result<R, tracon_sim::SimError> + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.call(f).await??)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use tracon_sim::{NewSimConfiguration, SimError, SimulationSettings};
    use tracon_types::Tcp;

    use super::*;

    fn handle() -> SimHandle {
        SimHandle::spawn(Sim::new(
            NewSimConfiguration::default(),
            &SimulationSettings::default(),
        ))
    }

    #[tokio::test]
    async fn call_returns_the_closure_result() {
        let sim = handle();
        let paused = sim
            .call(|sim| {
                sim.toggle_pause(&Tcp::from("2J"));
                sim.state().paused
            })
            .await
            .unwrap();
        assert!(paused);
    }

    #[tokio::test]
    async fn try_call_flattens_sim_errors() {
        let sim = handle();
        let err = sim
            .try_call(|sim| sim.sign_off(&Tcp::from("2J")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Sim(SimError::NoController)));
    }

    #[tokio::test]
    async fn panicking_job_is_reported_and_actor_survives() {
        let sim = handle();
        let err = sim
            .call(|_| -> u8 { panic!("boom") })
            .await
            .unwrap_err();
        match err {
            ServerError::SessionPanicked(message) => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other}"),
        }

        let rate = sim.call(|sim| sim.state().sim_rate).await.unwrap();
        assert!((rate - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let sim = handle();
        let tcp = Tcp::from("2J");
        for _ in 0..3 {
            let tcp = tcp.clone();
            sim.call(move |sim| sim.toggle_pause(&tcp)).await.unwrap();
        }
        let paused = sim.call(|sim| sim.state().paused).await.unwrap();
        assert!(paused);
    }
}
