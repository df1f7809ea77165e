//! Background relay of device output into the log.

use {
    crate::{
        error::Result,
        log_sink::{LogSink, log_line},
        monitor::LineAssembler,
        transport::{ReadEvent, Transport},
    },
    log::{debug, trace},
    std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
};

const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Default)]
struct Flags {
    cancel: AtomicBool,
    park_requested: AtomicBool,
    parked: AtomicBool,
    finished: AtomicBool,
}

/// Owned handle to the reader thread.
///
/// Dropping the handle cancels and joins the thread.
#[derive(Debug)]
pub struct ReadLoop {
    flags: Arc<Flags>,
    poll: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ReadLoop {
    /// Start relaying `transport` into `log`.
    ///
    /// `poll` bounds how long the thread sleeps while parked; the transport's
    /// own read timeout bounds how long a read blocks.
    pub fn spawn(
        transport: Box<dyn Transport>,
        log: Arc<dyn LogSink>,
        poll: Duration,
    ) -> Result<Self> {
        let flags = Arc::new(Flags::default());
        let thread_flags = Arc::clone(&flags);
        let handle = thread::Builder::new()
            .name("ideaflash-reader".to_string())
            .spawn(move || {
                run(transport, log.as_ref(), &thread_flags, poll);
                thread_flags
                    .finished
                    .store(true, Ordering::SeqCst);
            })?;

        Ok(Self {
            flags,
            poll,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still relaying.
    pub fn is_running(&self) -> bool {
        !self
            .flags
            .finished
            .load(Ordering::SeqCst)
    }

    /// Stop issuing reads until the returned guard is dropped.
    ///
    /// Returns once the thread has finished any read in progress, so the
    /// caller has the receive buffer to itself.
    pub fn park(&self) -> ParkGuard<'_> {
        let flags = &self.flags;
        flags
            .parked
            .store(false, Ordering::SeqCst);
        flags
            .park_requested
            .store(true, Ordering::SeqCst);
        while !flags
            .parked
            .load(Ordering::SeqCst)
            && !flags
                .finished
                .load(Ordering::SeqCst)
        {
            thread::sleep(Duration::from_millis(1));
        }
        trace!("Reader parked");
        ParkGuard { flags }
    }

    /// Cancel the thread and wait for it to exit. Nothing is logged.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.flags
            .cancel
            .store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .handle
            .take()
        {
            if handle
                .join()
                .is_err()
            {
                debug!("Reader thread panicked");
            }
        }
        trace!("Reader stopped (poll {:?})", self.poll);
    }
}

impl Drop for ReadLoop {
    fn drop(&mut self) {
        if self
            .handle
            .is_some()
        {
            self.stop();
        }
    }
}

/// Keeps the reader parked while alive.
#[derive(Debug)]
pub struct ParkGuard<'a> {
    flags: &'a Flags,
}

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        self.flags
            .park_requested
            .store(false, Ordering::SeqCst);
        trace!("Reader resumed");
    }
}

fn run(mut transport: Box<dyn Transport>, log: &dyn LogSink, flags: &Flags, poll: Duration) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut lines = LineAssembler::new();

    loop {
        if flags
            .cancel
            .load(Ordering::SeqCst)
        {
            debug!("Reader cancelled");
            break;
        }
        if flags
            .park_requested
            .load(Ordering::SeqCst)
        {
            flags
                .parked
                .store(true, Ordering::SeqCst);
            thread::sleep(poll);
            continue;
        }

        match transport.read(&mut buf) {
            Ok(ReadEvent::Data(n)) => {
                for line in lines.push(&buf[..n]) {
                    log_line(log, &line);
                }
            },
            Ok(ReadEvent::Idle) => {},
            Ok(ReadEvent::Closed) => {
                if let Some(tail) = lines.finish() {
                    log_line(log, &tail);
                }
                log.write_line("Serial reader closed");
                break;
            },
            Err(e) => {
                log.error(&format!("Serial read error: {e}"));
                break;
            },
        }
    }

    if let Err(e) = transport.close() {
        debug!("Closing reader handle failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::Error, log_sink::MemoryLog},
        std::{
            collections::VecDeque,
            sync::Mutex,
            time::Instant,
        },
    };

    /// Transport that replays scripted events, then idles.
    struct ScriptedTransport {
        script: Arc<Mutex<VecDeque<Result<Vec<u8>>>>>,
        end: Option<ReadEvent>,
        reads: Arc<Mutex<usize>>,
    }

    impl ScriptedTransport {
        fn new(chunks: Vec<Result<Vec<u8>>>, end: Option<ReadEvent>) -> Self {
            Self {
                script: Arc::new(Mutex::new(chunks.into())),
                end,
                reads: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<ReadEvent> {
            *self.reads.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(ReadEvent::Data(bytes.len()))
                },
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(2));
                    Ok(self.end.unwrap_or(ReadEvent::Idle))
                },
            }
        }

        fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn try_clone(&self) -> Result<Box<dyn Transport>> {
            Err(Error::Unsupported("clone".to_string()))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_relays_lines_then_reports_close() {
        let log = Arc::new(MemoryLog::new());
        let transport = ScriptedTransport::new(
            vec![Ok(b"hello\r\nwor".to_vec()), Ok(b"ld\r\n".to_vec())],
            Some(ReadEvent::Closed),
        );
        let reader = ReadLoop::spawn(Box::new(transport), log.clone(), Duration::from_millis(1))
            .unwrap();

        wait_until(|| !reader.is_running());
        reader.cancel();
        assert_eq!(log.lines(), vec!["hello", "world", "Serial reader closed"]);
    }

    #[test]
    fn test_read_error_is_logged_once() {
        let log = Arc::new(MemoryLog::new());
        let transport = ScriptedTransport::new(
            vec![Err(Error::Io(std::io::Error::other("device unplugged")))],
            None,
        );
        let reader = ReadLoop::spawn(Box::new(transport), log.clone(), Duration::from_millis(1))
            .unwrap();

        wait_until(|| !reader.is_running());
        reader.cancel();
        assert_eq!(
            log.lines(),
            vec!["Error: Serial read error: I/O error: device unplugged"]
        );
    }

    #[test]
    fn test_cancel_is_silent() {
        let log = Arc::new(MemoryLog::new());
        let transport = ScriptedTransport::new(Vec::new(), None);
        let reader = ReadLoop::spawn(Box::new(transport), log.clone(), Duration::from_millis(1))
            .unwrap();
        assert!(reader.is_running());
        reader.cancel();
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_park_stops_reads() {
        let log = Arc::new(MemoryLog::new());
        let transport = ScriptedTransport::new(Vec::new(), None);
        let reads = Arc::clone(&transport.reads);
        let reader = ReadLoop::spawn(Box::new(transport), log, Duration::from_millis(1)).unwrap();

        {
            let _parked = reader.park();
            let before = *reads.lock().unwrap();
            thread::sleep(Duration::from_millis(30));
            assert_eq!(*reads.lock().unwrap(), before);
        }

        let resumed_from = *reads.lock().unwrap();
        wait_until(|| *reads.lock().unwrap() > resumed_from);
        reader.cancel();
    }

    #[test]
    fn test_park_after_exit_returns() {
        let log = Arc::new(MemoryLog::new());
        let transport = ScriptedTransport::new(Vec::new(), Some(ReadEvent::Closed));
        let reader = ReadLoop::spawn(Box::new(transport), log, Duration::from_millis(1)).unwrap();
        wait_until(|| !reader.is_running());
        drop(reader.park());
        reader.cancel();
    }
}
