/// Cross-cutting observer for one decode session.
///
/// Decouples the search loop from specific output mechanisms (the log
/// facade, test probes) so callers can watch a decode without the engine
/// keeping any process-wide state.
pub trait DecodeLogger: Send {
    /// Report that a frame finished, with the surviving beam count.
    fn frame(&mut self, frame: usize, beams: usize);

    /// Record a pruning event for one frame.
    fn pruned(&mut self, frame: usize, before: usize, after: usize);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-decode summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. The engine default, and used
/// where logger output is irrelevant.
pub struct NullDecodeLogger;

impl DecodeLogger for NullDecodeLogger {
    fn frame(&mut self, _frame: usize, _beams: usize) {}
    fn pruned(&mut self, _frame: usize, _before: usize, _after: usize) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger that forwards to the `log` facade and keeps counters for an
/// end-of-decode summary.
#[derive(Debug, Default)]
pub struct LogDecodeLogger {
    frames: usize,
    peak_beams: usize,
    pruned_total: usize,
}

impl LogDecodeLogger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecodeLogger for LogDecodeLogger {
    fn frame(&mut self, frame: usize, beams: usize) {
        self.frames = self.frames.max(frame + 1);
        self.peak_beams = self.peak_beams.max(beams);
        log::trace!("frame {frame}: {beams} beams");
    }

    fn pruned(&mut self, frame: usize, before: usize, after: usize) {
        self.pruned_total += before.saturating_sub(after);
        log::trace!("frame {frame}: pruned {before} -> {after} beams");
    }

    fn info(&mut self, message: &str) {
        log::debug!("{message}");
    }

    fn summary(&self) {
        log::debug!(
            "decoded {} frames, peak {} beams, {} beams pruned",
            self.frames,
            self.peak_beams,
            self.pruned_total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_logger_discards_everything() {
        let mut logger = NullDecodeLogger;
        logger.frame(0, 5);
        logger.pruned(0, 10, 5);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn log_logger_tracks_counters() {
        let mut logger = LogDecodeLogger::new();
        logger.frame(0, 3);
        logger.frame(1, 7);
        logger.frame(2, 4);
        logger.pruned(1, 12, 7);
        logger.pruned(2, 9, 4);
        assert_eq!(logger.frames, 3);
        assert_eq!(logger.peak_beams, 7);
        assert_eq!(logger.pruned_total, 10);
    }
}
