//! Buzzer and tri-colour light feedback

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Solid light while a session owns the reader
    Busy,
    Success,
    Failure,
}

#[async_trait]
pub trait Indicator: Send + Sync {
    /// Resolves once the sequence has finished playing
    async fn signal(&self, kind: SignalKind);

    /// Everything off, without a sequence
    async fn clear(&self);
}

/// A single digital output
pub trait OutputPin: Send + Sync {
    fn set(&self, on: bool);
}

/// Pin stand-in that only traces level changes
#[derive(Debug)]
pub struct LoggedPin {
    name: &'static str,
}

impl LoggedPin {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name })
    }
}

impl OutputPin for LoggedPin {
    fn set(&self, on: bool) {
        tracing::trace!("pin {} -> {}", self.name, if on { "high" } else { "low" });
    }
}

#[derive(Debug, Clone, Copy)]
enum Colour {
    Red,
    Green,
    Blue,
}

/// Drives a buzzer and an RGB light from plain output pins
pub struct PinIndicator {
    buzzer: Arc<dyn OutputPin>,
    red: Arc<dyn OutputPin>,
    green: Arc<dyn OutputPin>,
    blue: Arc<dyn OutputPin>,
    pulse: Duration,
}

impl PinIndicator {
    pub fn new(
        buzzer: Arc<dyn OutputPin>,
        red: Arc<dyn OutputPin>,
        green: Arc<dyn OutputPin>,
        blue: Arc<dyn OutputPin>,
        pulse: Duration,
    ) -> Self {
        Self {
            buzzer,
            red,
            green,
            blue,
            pulse,
        }
    }

    /// Indicator whose pins only log, for hosts without GPIO
    pub fn logged(pulse: Duration) -> Self {
        Self::new(
            LoggedPin::new("buzzer"),
            LoggedPin::new("red"),
            LoggedPin::new("green"),
            LoggedPin::new("blue"),
            pulse,
        )
    }

    fn light(&self, colour: Option<Colour>) {
        self.red.set(matches!(colour, Some(Colour::Red)));
        self.green.set(matches!(colour, Some(Colour::Green)));
        self.blue.set(matches!(colour, Some(Colour::Blue)));
    }

    fn all_off(&self) {
        self.light(None);
        self.buzzer.set(false);
    }

    async fn buzz(&self, times: u32) {
        for _ in 0..times {
            self.buzzer.set(true);
            tokio::time::sleep(self.pulse).await;
            self.buzzer.set(false);
            tokio::time::sleep(self.pulse).await;
        }
    }

    async fn blink(&self, colour: Colour, times: u32) {
        for _ in 0..times {
            self.light(Some(colour));
            tokio::time::sleep(self.pulse).await;
            self.light(None);
            tokio::time::sleep(self.pulse).await;
        }
    }

    async fn play(&self, colour: Colour, times: u32) {
        // Busy light goes out before the result blinks
        self.all_off();
        tokio::join!(self.buzz(times), self.blink(colour, times));
    }
}

#[async_trait]
impl Indicator for PinIndicator {
    async fn signal(&self, kind: SignalKind) {
        match kind {
            SignalKind::Busy => self.light(Some(Colour::Blue)),
            SignalKind::Success => self.play(Colour::Green, 1).await,
            SignalKind::Failure => self.play(Colour::Red, 2).await,
        }
    }

    async fn clear(&self) {
        self.all_off();
    }
}
