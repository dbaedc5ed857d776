// src/timer.rs
use std::time::Instant;

/// Scoped timing span: logs the elapsed wall time at debug level when it
/// goes out of scope. Compiles down to nothing when the `log` facade is
/// built with a `max_level` feature below debug.
pub struct Span {
    name: &'static str,
    started: Instant,
}

impl Span {
    pub fn enter(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{} took {:.3?}", self.name, self.started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_drops_without_panicking() {
        let span = Span::enter("test_span");
        drop(span);
    }
}
