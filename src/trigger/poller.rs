use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::logging::Level;
use crate::message::Message;
use crate::registry::{CancelledError, Context};

use super::TriggerSelection;

const DEFAULT_SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub ticks: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Drives a source on a trigger, one tick at a time on the calling thread.
#[derive(Debug, Clone)]
pub struct Poller {
    selection: TriggerSelection,
    sleep_slice: Duration,
}

impl Poller {
    pub fn new(selection: TriggerSelection) -> Self {
        Self {
            selection,
            sleep_slice: DEFAULT_SLEEP_SLICE,
        }
    }

    /// Upper bound on how long cancellation can go unnoticed while waiting.
    pub fn with_sleep_slice(mut self, slice: Duration) -> Self {
        self.sleep_slice = slice.max(Duration::from_millis(1));
        self
    }

    /// Runs until the trigger is exhausted or `ctx` is cancelled. Source
    /// failures end the current tick; sink failures only skip the message.
    pub fn run<S, K>(&self, ctx: &mut Context, mut source: S, mut sink: K) -> Result<PollSummary>
    where
        S: FnMut(&mut Context) -> Result<Option<Message>>,
        K: FnMut(&mut Context, Message) -> Result<()>,
    {
        let mut summary = PollSummary::default();
        let mut previous = None;
        loop {
            let Some(fire_at) = self.selection.trigger.next_fire(previous, Utc::now()) else {
                ctx.log(Level::Debug, "trigger exhausted", None);
                break;
            };
            if !self.wait_until(ctx, fire_at) {
                break;
            }
            summary.ticks += 1;
            for _ in 0..self.selection.max_messages_per_poll {
                let message = match source(ctx) {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(err) if err.is::<CancelledError>() => return Ok(summary),
                    Err(err) => {
                        ctx.log(
                            Level::Error,
                            "source failed",
                            Some(json!({ "error": err.to_string() })),
                        );
                        break;
                    }
                };
                match sink(ctx, message) {
                    Ok(()) => summary.delivered += 1,
                    Err(err) if err.is::<CancelledError>() => return Ok(summary),
                    Err(err) => {
                        summary.failed += 1;
                        ctx.log(
                            Level::Error,
                            "message handling failed",
                            Some(json!({ "error": err.to_string() })),
                        );
                    }
                }
            }
            previous = Some(Utc::now());
        }
        Ok(summary)
    }

    /// Sleeps in slices until `fire_at`. False when cancelled first.
    fn wait_until(&self, ctx: &Context, fire_at: DateTime<Utc>) -> bool {
        loop {
            if ctx.is_cancelled() {
                return false;
            }
            let remaining = match (fire_at - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return true,
            };
            thread::sleep(remaining.min(self.sleep_slice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::trigger::TriggerSpec;

    #[test]
    fn past_one_shot_fires_immediately_and_once() {
        let poller = Poller::new(TriggerSelection {
            trigger: TriggerSpec::OneShot(Utc::now() - chrono::Duration::seconds(5)),
            max_messages_per_poll: 3,
        });
        let mut ctx = Registry::new().context();
        let mut produced = 0;
        let summary = poller
            .run(
                &mut ctx,
                |_ctx| {
                    produced += 1;
                    Ok(Some(Message::new(json!(produced))))
                },
                |_ctx, _message| Ok(()),
            )
            .unwrap();
        assert_eq!(summary.ticks, 1);
        assert_eq!(summary.delivered, 3);
    }

    #[test]
    fn cancelled_context_never_polls() {
        let poller = Poller::new(TriggerSelection {
            trigger: TriggerSpec::Periodic {
                period: Duration::from_millis(1),
                initial_delay: Duration::ZERO,
            },
            max_messages_per_poll: 1,
        });
        let mut ctx = Registry::new().context();
        ctx.cancel();
        let summary = poller
            .run(&mut ctx, |_ctx| Ok(None), |_ctx, _message| Ok(()))
            .unwrap();
        assert_eq!(summary, PollSummary::default());
    }
}
