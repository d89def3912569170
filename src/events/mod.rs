//! Engine event queue
//!
//! Audio capture, the wake-word detector, the console and timers all run
//! outside the engine. Their outputs are queued as [`EngineEvent`]s and
//! [`run`] feeds them to the engine one at a time.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::engine::{Engine, Reply};

/// Interval for deadline polling when no other event arrives
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Something that happened outside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A chunk of captured 16-bit mono audio
    Audio(Vec<i16>),
    /// The external wake-word detector fired
    WakeTriggered,
    /// A typed line
    Line(String),
    /// Periodic deadline check
    Tick,
    /// A scheduled wake timer fired
    TimerFired { generation: u64 },
    /// Stop the engine
    Shutdown,
}

impl Engine {
    /// Process one event to completion
    ///
    /// Returns the reply of any command the event executed.
    pub fn handle_event(&mut self, event: EngineEvent) -> Option<Reply> {
        match event {
            EngineEvent::Audio(chunk) => self.process_audio(&chunk),
            EngineEvent::WakeTriggered => {
                self.wake_up();
                None
            }
            EngineEvent::Line(line) => Some(self.handle_line(&line)),
            EngineEvent::Tick => {
                self.poll_timers();
                None
            }
            EngineEvent::TimerFired { generation } => {
                self.timer_fired(generation);
                None
            }
            EngineEvent::Shutdown => Some(Reply::Exit),
        }
    }
}

/// Drive `engine` from `rx` until exit, shutdown or the queue closes
///
/// Each reply is passed to `on_reply`. The wake timer is scheduled here and
/// delivered back as [`EngineEvent::TimerFired`]. Engine steps run on the
/// blocking pool, since skill handlers may wait on external processes.
/// Returns the engine after it has been shut down.
pub async fn run<F>(
    mut engine: Engine,
    mut rx: mpsc::Receiver<EngineEvent>,
    mut on_reply: F,
) -> Engine
where
    F: FnMut(&Reply),
{
    engine.start();

    loop {
        let timer = engine.wake_timer();
        let deadline = timer.map_or_else(
            || Instant::now() + Duration::from_secs(3600),
            |(at, _)| at,
        );

        let fires = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));

        let event = tokio::select! {
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            () = fires, if timer.is_some() => EngineEvent::TimerFired {
                generation: timer.map_or(0, |(_, generation)| generation),
            },
        };

        let reply;
        (engine, reply) = step(engine, move |engine| engine.handle_event(event)).await;
        if let Some(reply) = reply {
            on_reply(&reply);
            if reply == Reply::Exit {
                break;
            }
        }
    }

    step(engine, Engine::shutdown).await.0
}

/// Run `f` on the engine from the blocking pool and hand the engine back
async fn step<T, F>(mut engine: Engine, f: F) -> (Engine, T)
where
    T: Send + 'static,
    F: FnOnce(&mut Engine) -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let out = f(&mut engine);
        (engine, out)
    });
    match task.await {
        Ok(done) => done,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}
