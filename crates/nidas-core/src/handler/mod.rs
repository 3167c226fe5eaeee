// SPDX-License-Identifier: GPL-2.0-or-later

//! Sensor I/O multiplexer.
//!
//! One thread owns an `mio::Poll` registry over every open sensor file
//! descriptor plus a [`Waker`] that lets `add_sensor`/`close_sensor`
//! interrupt an in-progress wait, mirroring the original's `ppoll` over a
//! signal mask. Mutations (add, remove, reopen) are pushed onto a
//! lock-protected command queue and drained at the top of each loop
//! iteration rather than touched directly from another thread, so only
//! the handler thread ever calls into `mio::Poll` itself.

use crate::time::Time;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAKE_TOKEN: Token = Token(usize::MAX);
const MAX_EVENTS: usize = 256;
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SENSOR_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// The device-level primitives a `DSMSensor` exposes to the handler.
/// Implementors own exactly one
/// file descriptor for as long as they're registered.
pub trait HandledSensor: Send {
    /// Raw fd/socket the handler should poll for readability.
    fn source(&mut self) -> &mut dyn mio::event::Source;
    /// Read whatever is ready; appends framed samples to the scanner
    /// internally. Returning `Err` triggers the handler's reopen-on-
    /// failure (or close-only) path.
    fn read_samples(&mut self) -> io::Result<()>;
    /// Re-acquire the device after a close. Runs on the opener thread,
    /// never on the handler thread itself.
    fn reopen(&mut self) -> io::Result<()>;
    fn close(&mut self);
    fn name(&self) -> &str;
}

struct Entry {
    sensor: Box<dyn HandledSensor>,
    timeout_msecs: u64,
    last_data_time: Time,
    consecutive_timeouts: u32,
    lifetime_timeouts: u64,
    reopen_on_failure: bool,
}

/// Per-sensor runtime stats surfaced for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorStats {
    pub consecutive_timeouts: u32,
    pub lifetime_timeouts: u64,
}

enum Command {
    Add {
        token: Token,
        sensor: Box<dyn HandledSensor>,
        timeout_msecs: u64,
        reopen_on_failure: bool,
    },
    Remove(Token),
}

/// Epoll/ppoll-equivalent event loop over every open sensor.
pub struct SensorHandler {
    poll: Mutex<Poll>,
    waker: Arc<Waker>,
    cmd_tx: Sender<Command>,
    cmd_rx: Mutex<Receiver<Command>>,
    next_token: AtomicU64,
    running: AtomicBool,
    stats_interval: Duration,
    sensor_check_interval: Duration,
}

impl SensorHandler {
    pub fn new() -> io::Result<Arc<Self>> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (cmd_tx, cmd_rx) = channel();
        Ok(Arc::new(SensorHandler {
            poll: Mutex::new(poll),
            waker,
            cmd_tx,
            cmd_rx: Mutex::new(cmd_rx),
            next_token: AtomicU64::new(0),
            running: AtomicBool::new(true),
            stats_interval: DEFAULT_STATS_INTERVAL,
            sensor_check_interval: DEFAULT_SENSOR_CHECK_INTERVAL,
        }))
    }

    /// Queue a sensor for registration; picked up at the top of the next
    /// loop iteration. `timeout_msecs == 0` disables the per-sensor
    /// timeout check.
    pub fn add_sensor(
        &self,
        sensor: Box<dyn HandledSensor>,
        timeout_msecs: u64,
        reopen_on_failure: bool,
    ) -> Token {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed) as usize);
        let _ = self.cmd_tx.send(Command::Add {
            token,
            sensor,
            timeout_msecs,
            reopen_on_failure,
        });
        let _ = self.waker.wake();
        token
    }

    pub fn close_sensor(&self, token: Token) {
        let _ = self.cmd_tx.send(Command::Remove(token));
        let _ = self.waker.wake();
    }

    pub fn interrupt(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    /// Run the event loop on the calling thread. Intended to be the body
    /// of the one dedicated handler thread.
    pub fn run(self: &Arc<Self>) {
        let mut sensors: HashMap<Token, Entry> = HashMap::new();
        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut last_stats = Time::now();
        let mut last_check = Time::now();

        while self.running.load(Ordering::Relaxed) {
            self.drain_commands(&mut sensors);

            let poll_interval = self.compute_poll_interval(&sensors);
            {
                let mut poll = self.poll.lock();
                if let Err(e) = poll.poll(&mut events, poll_interval) {
                    if e.kind() != io::ErrorKind::Interrupted {
                        log::error!("SensorHandler poll failed: {e}");
                    }
                    continue;
                }
            }

            let mut failed: Vec<Token> = Vec::new();
            for ev in events.iter() {
                let token = ev.token();
                if token == WAKE_TOKEN {
                    continue;
                }
                if let Some(entry) = sensors.get_mut(&token) {
                    match entry.sensor.read_samples() {
                        Ok(()) => {
                            entry.last_data_time = Time::now();
                            entry.consecutive_timeouts = 0;
                        }
                        Err(e) => {
                            log::error!("sensor {} read failed: {e}", entry.sensor.name());
                            failed.push(token);
                        }
                    }
                }
            }

            for token in failed {
                self.handle_failure(&mut sensors, token);
            }

            let now = Time::now();
            if now - last_stats >= self.stats_interval.as_micros() as i64 {
                // calcStatistics() hook point; counters already live on Entry.
                last_stats = now;
            }
            if now - last_check >= self.sensor_check_interval.as_micros() as i64 {
                self.check_timeouts(&mut sensors, now);
                last_check = now;
            }
        }

        for (_, mut entry) in sensors.drain() {
            entry.sensor.close();
        }
    }

    fn drain_commands(&self, sensors: &mut HashMap<Token, Entry>) {
        let rx = self.cmd_rx.lock();
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::Add {
                    token,
                    mut sensor,
                    timeout_msecs,
                    reopen_on_failure,
                } => {
                    let poll = self.poll.lock();
                    if let Err(e) =
                        poll.registry()
                            .register(sensor.source(), token, Interest::READABLE)
                    {
                        log::error!("failed to register sensor {}: {e}", sensor.name());
                        continue;
                    }
                    sensors.insert(
                        token,
                        Entry {
                            sensor,
                            timeout_msecs,
                            last_data_time: Time::now(),
                            consecutive_timeouts: 0,
                            lifetime_timeouts: 0,
                            reopen_on_failure,
                        },
                    );
                }
                Command::Remove(token) => {
                    if let Some(mut entry) = sensors.remove(&token) {
                        let poll = self.poll.lock();
                        let _ = poll.registry().deregister(entry.sensor.source());
                        entry.sensor.close();
                    }
                }
            }
        }
    }

    /// `pollInterval = min over active sensors of max(timeoutMsecs, 1s)`,
    /// `-1` (here: `None`, mio's "block forever") if nothing has a
    /// timeout configured.
    fn compute_poll_interval(&self, sensors: &HashMap<Token, Entry>) -> Option<Duration> {
        sensors
            .values()
            .filter(|e| e.timeout_msecs > 0)
            .map(|e| Duration::from_millis(e.timeout_msecs.max(1000)))
            .min()
    }

    fn check_timeouts(&self, sensors: &mut HashMap<Token, Entry>, now: Time) {
        for entry in sensors.values_mut() {
            if entry.timeout_msecs == 0 {
                continue;
            }
            let elapsed_ms = (now - entry.last_data_time) / 1000;
            if elapsed_ms >= entry.timeout_msecs as i64 {
                entry.consecutive_timeouts += 1;
                entry.lifetime_timeouts += 1;
                if entry.consecutive_timeouts % 10 == 0 {
                    log::warn!(
                        "[NOTICE] sensor {} timed out {} consecutive times",
                        entry.sensor.name(),
                        entry.consecutive_timeouts
                    );
                }
                entry.last_data_time = now;
            }
        }
    }

    fn handle_failure(&self, sensors: &mut HashMap<Token, Entry>, token: Token) {
        let reopen = sensors.get(&token).is_some_and(|e| e.reopen_on_failure);
        if let Some(mut entry) = sensors.remove(&token) {
            let poll = self.poll.lock();
            let _ = poll.registry().deregister(entry.sensor.source());
            entry.sensor.close();
            if reopen {
                // Runs on a short-lived opener thread so the handler loop
                // never blocks on open().
                let tx = self.cmd_tx.clone();
                let waker = Arc::clone(&self.waker);
                let timeout_msecs = entry.timeout_msecs;
                let reopen_on_failure = entry.reopen_on_failure;
                thread::spawn(move || {
                    let mut sensor = entry.sensor;
                    match sensor.reopen() {
                        Ok(()) => {
                            let _ = tx.send(Command::Add {
                                token,
                                sensor,
                                timeout_msecs,
                                reopen_on_failure,
                            });
                            let _ = waker.wake();
                        }
                        Err(e) => log::error!("reopen of {} failed: {e}", sensor.name()),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::UnixStream as MioUnixStream;
    use std::os::unix::net::UnixStream;

    struct LoopbackSensor {
        io: MioUnixStream,
        name: String,
        reads: u32,
    }

    impl HandledSensor for LoopbackSensor {
        fn source(&mut self) -> &mut dyn mio::event::Source {
            &mut self.io
        }
        fn read_samples(&mut self) -> io::Result<()> {
            use std::io::Read;
            let mut buf = [0u8; 64];
            let n = self.io.read(&mut buf)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed"));
            }
            self.reads += 1;
            Ok(())
        }
        fn reopen(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn add_sensor_receives_data_and_interrupt_stops_loop() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let handler = SensorHandler::new().unwrap();
        let sensor = Box::new(LoopbackSensor {
            io: MioUnixStream::from_std(a),
            name: "loop0".into(),
            reads: 0,
        });
        handler.add_sensor(sensor, 0, false);

        let h2 = Arc::clone(&handler);
        let join = thread::spawn(move || h2.run());

        use std::io::Write;
        let mut b = b;
        b.write_all(b"hello").unwrap();
        thread::sleep(Duration::from_millis(50));

        handler.interrupt();
        join.join().unwrap();
    }
}
