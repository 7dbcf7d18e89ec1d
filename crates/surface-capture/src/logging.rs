//! Injected logger collaborator.
//!
//! The capture loop writes through a [`LogHandle`] instead of the global
//! `log` macros, so an embedder (or a test) can hand it a private sink.
//! The default handle forwards to whatever `log::logger()` is installed.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

/// Forwards every record to the global `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            log::logger().log(record);
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

#[derive(Clone)]
pub struct LogHandle {
    inner: Arc<dyn Log>,
    target: &'static str,
}

impl LogHandle {
    pub fn new(inner: Arc<dyn Log>, target: &'static str) -> Self {
        Self { inner, target }
    }

    pub fn global(target: &'static str) -> Self {
        Self::new(Arc::new(GlobalLogger), target)
    }

    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            target,
        }
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if !self.inner.enabled(&metadata) {
            return;
        }
        self.inner.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod capture {
    //! A `Log` that keeps records in memory for assertions.

    use log::{Level, Log, Metadata, Record};
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct CapturingLogger {
        records: Mutex<Vec<(Level, String, String)>>,
    }

    impl CapturingLogger {
        pub fn records(&self) -> Vec<(Level, String, String)> {
            self.records.lock().clone()
        }
    }

    impl Log for CapturingLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records.lock().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }
}
