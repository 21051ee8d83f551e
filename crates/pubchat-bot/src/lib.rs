//! Autonomous chat bot.
//!
//! Logs in under a random persona, then cycles forever: refresh the channel
//! list, make sure at least one channel exists, publish a batch of canned
//! phrases to a random channel, pause. Failures after login are logged and
//! worked around, never fatal.

use pubchat::transport::{BroadcastSource, CommandTransport};
use pubchat::{Broadcast, Result, Session};
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::sync::mpsc;

pub const PERSONAS: &[&str] = &[
    "BotAlpha", "BotBeta", "BotGamma", "BotDelta", "BotEpsilon", "BotZeta", "BotEta", "BotTheta",
    "BotIota", "BotKappa", "BotLambda", "BotMu", "BotNu", "BotXi", "BotOmicron", "BotPi", "BotRho",
    "BotSigma", "BotTau", "BotUpsilon",
];

pub const PHRASES: &[&str] = &[
    "Hello everyone!",
    "How is everybody doing?",
    "Anyone up for a chat?",
    "What a beautiful day!",
    "Just testing the system",
    "Working perfectly!",
    "ZeroMQ is amazing!",
    "Distributed systems are fascinating",
    "Shall we run more tests?",
    "Until the next message!",
];

/// Timing and naming knobs for the bot loop.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Messages published per cycle.
    pub batch_size: usize,
    /// Shortest pause between two messages of a batch.
    pub min_pause: Duration,
    /// Longest pause between two messages of a batch.
    pub max_pause: Duration,
    /// Pause between cycles.
    pub cycle_pause: Duration,
    /// Upper bound (exclusive) of the numeric suffix for a cycle's new channel.
    pub channel_range: u32,
    /// Upper bound (exclusive) of the suffix for channels created during recovery.
    pub recovery_channel_range: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            min_pause: Duration::from_secs(1),
            max_pause: Duration::from_secs(3),
            cycle_pause: Duration::from_secs(10),
            channel_range: 1_000,
            recovery_channel_range: 10_000,
        }
    }
}

/// Random persona: a name from [`PERSONAS`] plus a 0-999 suffix.
pub fn persona_name<R: Rng>(rng: &mut R) -> String {
    let base = PERSONAS.choose(rng).copied().unwrap_or("Bot");
    format!("{base}{}", rng.gen_range(0..1000))
}

pub fn channel_name<R: Rng>(rng: &mut R, range: u32) -> String {
    format!("channel{}", rng.gen_range(0..range.max(1)))
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Channel the batch ended on, if a batch ran at all.
    pub channel: Option<String>,
    pub published: usize,
    pub failed: usize,
}

pub struct Bot<T, R> {
    session: Session<T>,
    config: BotConfig,
    rng: R,
    sent: u64,
}

impl<T: CommandTransport, R: Rng> Bot<T, R> {
    pub fn new(session: Session<T>, config: BotConfig, rng: R) -> Self {
        Self {
            session,
            config,
            rng,
            sent: 0,
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Messages published successfully so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Log in under a random persona and start listening. A login failure is
    /// returned to the caller, which is expected to give up.
    pub async fn start<S: BroadcastSource>(
        &mut self,
        source: S,
    ) -> Result<mpsc::UnboundedReceiver<Broadcast>> {
        let name = persona_name(&mut self.rng);
        self.session.login(&name).await?;
        tracing::info!(bot = %name, "bot logged in");
        Ok(self.session.listen(source))
    }

    /// Cycle forever.
    pub async fn run(mut self) {
        loop {
            self.run_cycle().await;
            tracing::info!(pause = ?self.config.cycle_pause, "bot pausing");
            tokio::time::sleep(self.config.cycle_pause).await;
        }
    }

    /// One refresh / ensure-channel / publish-batch cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Err(e) = self.session.list_channels().await {
            tracing::warn!(err = %e, "failed to list channels, keeping cached list");
        }

        if self.session.known_channels().is_empty() {
            let name = channel_name(&mut self.rng, self.config.channel_range);
            if let Err(e) = self.session.create_channel(&name).await {
                tracing::warn!(channel = %name, err = %e, "failed to create channel");
            }
        }

        let Some(mut selected) = self.pick_channel() else {
            tracing::warn!("no channel available, skipping batch");
            return report;
        };

        for _ in 0..self.config.batch_size {
            let phrase = PHRASES.choose(&mut self.rng).copied().unwrap_or_default();
            match self.session.publish(&selected, phrase).await {
                Ok(()) => {
                    self.sent += 1;
                    report.published += 1;
                    tracing::info!(
                        count = self.sent,
                        channel = %selected,
                        text = phrase,
                        "sent message"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(channel = %selected, err = %e, "failed to publish");
                    if let Some(next) = self.recover().await {
                        selected = next;
                    }
                }
            }
            tokio::time::sleep(self.message_pause()).await;
        }

        report.channel = Some(selected);
        report
    }

    /// After a failed publish: pick a fresh channel from a new listing, or
    /// create one if nothing is known. `None` keeps the current selection.
    async fn recover(&mut self) -> Option<String> {
        match self.session.list_channels().await {
            Ok(channels) if !channels.is_empty() => return self.pick_channel(),
            Ok(_) => {}
            Err(e) => tracing::warn!(err = %e, "failed to list channels during recovery"),
        }
        if !self.session.known_channels().is_empty() {
            return None;
        }
        let name = channel_name(&mut self.rng, self.config.recovery_channel_range);
        match self.session.create_channel(&name).await {
            Ok(()) => Some(name),
            Err(e) => {
                tracing::warn!(channel = %name, err = %e, "failed to create recovery channel");
                None
            }
        }
    }

    fn pick_channel(&mut self) -> Option<String> {
        self.session.known_channels().choose(&mut self.rng).cloned()
    }

    fn message_pause(&mut self) -> Duration {
        let min = self.config.min_pause;
        let max = self.config.max_pause.max(min);
        let span = max - min;
        if span.is_zero() {
            return min;
        }
        min + span.mul_f64(self.rng.gen_range(0.0..=1.0))
    }
}
