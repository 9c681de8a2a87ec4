use log::{info, warn, error, debug, trace};
use std::time::{Duration, Instant};
use std::sync::{Arc, Mutex, MutexGuard};
use std::collections::VecDeque;
use chrono::{DateTime, Utc};

/// Engine event for logging and debugging
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EngineEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventType {
    StreamOpened,
    StreamClosed,
    IndexBuildStarted,
    IndexBuildFinished,
    IndexBuildCancelled,
    SeekOperation,
    FormatFallback,
    DecodeError,
    StreamError,
}

impl EngineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEventType::StreamOpened => "STREAM_OPENED",
            EngineEventType::StreamClosed => "STREAM_CLOSED",
            EngineEventType::IndexBuildStarted => "INDEX_BUILD_STARTED",
            EngineEventType::IndexBuildFinished => "INDEX_BUILD_FINISHED",
            EngineEventType::IndexBuildCancelled => "INDEX_BUILD_CANCELLED",
            EngineEventType::SeekOperation => "SEEK_OPERATION",
            EngineEventType::FormatFallback => "FORMAT_FALLBACK",
            EngineEventType::DecodeError => "DECODE_ERROR",
            EngineEventType::StreamError => "STREAM_ERROR",
        }
    }
}

/// Event history shared by a decoder and its index builder thread
#[derive(Clone)]
pub struct EngineLogger {
    events: Arc<Mutex<VecDeque<EngineEvent>>>,
    max_events: usize,
}

impl Default for EngineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 1000,
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("MPEG_ENGINE_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        match log_level.to_lowercase().as_str() {
            "trace" => builder.filter_level(log::LevelFilter::Trace),
            "debug" => builder.filter_level(log::LevelFilter::Debug),
            "info" => builder.filter_level(log::LevelFilter::Info),
            "warn" => builder.filter_level(log::LevelFilter::Warn),
            "error" => builder.filter_level(log::LevelFilter::Error),
            _ => builder.filter_level(log::LevelFilter::Info),
        };

        builder.try_init()?;

        info!("MPEG engine logging initialized with level: {}", log_level);
        Ok(())
    }

    // a panicking holder cannot leave the deque half-updated
    fn lock_events(&self) -> MutexGuard<'_, VecDeque<EngineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log an engine event
    pub fn log_event(&self, event_type: EngineEventType, details: String, duration: Option<Duration>) {
        match event_type {
            EngineEventType::StreamOpened
            | EngineEventType::StreamClosed
            | EngineEventType::IndexBuildFinished => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::IndexBuildStarted
            | EngineEventType::IndexBuildCancelled => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::SeekOperation => {
                debug!("[{}] {} (took: {:?})", event_type.as_str(), details, duration);
            }
            EngineEventType::FormatFallback => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::DecodeError | EngineEventType::StreamError => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let event = EngineEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        let mut events = self.lock_events();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_stream_opened(&self, source: &str, summary: &str, open_time: Duration) {
        self.log_event(
            EngineEventType::StreamOpened,
            format!("Opened {} ({})", source, summary),
            Some(open_time),
        );
    }

    pub fn log_stream_closed(&self, source: &str) {
        self.log_event(EngineEventType::StreamClosed, format!("Closed {}", source), None);
    }

    pub fn log_index_started(&self, step: u64) {
        self.log_event(
            EngineEventType::IndexBuildStarted,
            format!("Building seek index, one entry every {} frames", step),
            None,
        );
    }

    pub fn log_index_finished(&self, frames: u64, entries: usize, build_time: Duration) {
        self.log_event(
            EngineEventType::IndexBuildFinished,
            format!("Seek index complete: {} frames scanned, {} entries", frames, entries),
            Some(build_time),
        );
    }

    pub fn log_index_cancelled(&self, frames: u64) {
        self.log_event(
            EngineEventType::IndexBuildCancelled,
            format!("Seek index build cancelled after {} frames", frames),
            None,
        );
    }

    pub fn log_seek_operation(&self, target: u64, landed: u64, exact: bool, seek_time: Duration) {
        self.log_event(
            EngineEventType::SeekOperation,
            format!(
                "Seek to sample {} landed at {} ({})",
                target,
                landed,
                if exact { "indexed" } else { "approximate" }
            ),
            Some(seek_time),
        );
    }

    pub fn log_format_fallback(&self, reason: &str) {
        self.log_event(
            EngineEventType::FormatFallback,
            format!("Free-format detection failed ({}), retrying without free format", reason),
            None,
        );
    }

    pub fn log_decode_error(&self, source: &str, error: &str) {
        self.log_event(
            EngineEventType::DecodeError,
            format!("Decode error for '{}': {}", source, error),
            None,
        );
    }

    pub fn log_stream_error(&self, error: &str) {
        self.log_event(EngineEventType::StreamError, format!("Stream error: {}", error), None);
    }

    /// Get recent events for debugging
    pub fn get_recent_events(&self, count: usize) -> Vec<EngineEvent> {
        let events = self.lock_events();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    /// Whether any event of this type was recorded
    pub fn has_event(&self, event_type: EngineEventType) -> bool {
        self.lock_events().iter().any(|e| e.event_type == event_type)
    }

    /// Clear event history
    #[cfg(test)]
    pub fn clear_events(&self) {
        self.lock_events().clear();
    }

    /// Get event statistics
    pub fn get_event_statistics(&self) -> EventStatistics {
        let events = self.lock_events();
        let mut stats = EventStatistics::new();

        for event in events.iter() {
            match event.event_type {
                EngineEventType::DecodeError => stats.decode_errors += 1,
                EngineEventType::StreamError => stats.stream_errors += 1,
                EngineEventType::SeekOperation => stats.seek_operations += 1,
                EngineEventType::FormatFallback => stats.format_fallbacks += 1,
                EngineEventType::IndexBuildCancelled => stats.cancelled_builds += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default)]
pub struct EventStatistics {
    pub total_events: usize,
    pub decode_errors: usize,
    pub stream_errors: usize,
    pub seek_operations: usize,
    pub format_fallbacks: usize,
    pub cancelled_builds: usize,
}

impl EventStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_engine_logger_creation() {
        let logger = EngineLogger::new();
        assert_eq!(logger.max_events, 1000);
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = EngineLogger::new();

        logger.log_event(EngineEventType::StreamOpened, "Test open".to_string(), None);

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Test open");
        assert_eq!(events[0].event_type, EngineEventType::StreamOpened);
    }

    #[test]
    fn test_event_history_limit() {
        let mut logger = EngineLogger::new();
        logger.max_events = 3;

        for i in 0..5 {
            logger.log_event(EngineEventType::SeekOperation, format!("Event {}", i), None);
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_shared_between_threads() {
        let logger = EngineLogger::new();
        let worker = logger.clone();

        thread::spawn(move || worker.log_index_started(3)).join().unwrap();

        assert!(logger.has_event(EngineEventType::IndexBuildStarted));
    }

    #[test]
    fn test_event_statistics() {
        let logger = EngineLogger::new();

        logger.log_format_fallback("no matching frame");
        logger.log_decode_error("a.mp3", "bad frame");
        logger.log_decode_error("a.mp3", "bad frame");
        logger.log_seek_operation(1000, 1152, true, Duration::from_millis(1));
        logger.log_index_cancelled(10);

        let stats = logger.get_event_statistics();
        assert_eq!(stats.total_events, 5);
        assert_eq!(stats.format_fallbacks, 1);
        assert_eq!(stats.decode_errors, 2);
        assert_eq!(stats.seek_operations, 1);
        assert_eq!(stats.cancelled_builds, 1);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation".to_string());
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_clear_events() {
        let logger = EngineLogger::new();

        logger.log_stream_closed("x.mp3");
        assert_eq!(logger.get_recent_events(10).len(), 1);

        logger.clear_events();
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(EngineEventType::StreamOpened.as_str(), "STREAM_OPENED");
        assert_eq!(EngineEventType::IndexBuildCancelled.as_str(), "INDEX_BUILD_CANCELLED");
        assert_eq!(EngineEventType::FormatFallback.as_str(), "FORMAT_FALLBACK");
    }

    #[test]
    fn test_specific_log_methods() {
        let logger = EngineLogger::new();

        logger.log_stream_opened("a.mp3", "CBR", Duration::from_millis(2));
        logger.log_index_started(3);
        logger.log_index_finished(300, 100, Duration::from_millis(5));
        logger.log_stream_error("connection reset");
        logger.log_stream_closed("a.mp3");

        let kinds: Vec<_> = logger
            .get_recent_events(10)
            .iter()
            .map(|e| e.event_type.as_str())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "STREAM_OPENED",
                "INDEX_BUILD_STARTED",
                "INDEX_BUILD_FINISHED",
                "STREAM_ERROR",
                "STREAM_CLOSED"
            ]
        );
    }
}
