use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE, LOG_TIMEOUT};
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_record::LogRecord;

/// Rendezvous between appenders and the flush thread: one flush in
/// progress. Cloned handles outlive the publishing cycle, so a waiter
/// can always wait on whatever flush was current when it looked.
struct FlushFuture {
    done: Mutex<bool>,
    cv: Condvar,
}

impl FlushFuture {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    fn completed() -> Arc<Self> {
        Arc::new(Self {
            done: Mutex::new(true),
            cv: Condvar::new(),
        })
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cv.wait(&mut done);
        }
    }

    fn complete(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cv.notify_all();
    }
}

struct LogCore {
    log_buffer: Vec<u8>,
    offset: usize,
    next_lsn: Lsn,
    flush_future: Arc<FlushFuture>,
}

/// State shared between appenders and the background flush thread.
struct LogInner {
    disk_manager: Arc<DiskManager>,
    core: Mutex<LogCore>,
    flush_cv: Condvar,
    persistent_lsn: AtomicI32,
    enabled: AtomicBool,
}

impl LogInner {
    fn flush_loop(&self) {
        let mut flush_buffer = vec![0u8; LOG_BUFFER_SIZE];
        loop {
            let mut core = self.core.lock();
            let _ = self.flush_cv.wait_for(&mut core, LOG_TIMEOUT);

            let last_lsn = core.next_lsn - 1;
            let flush_size = core.offset;
            std::mem::swap(&mut core.log_buffer, &mut flush_buffer);
            core.offset = 0;
            let future = FlushFuture::pending();
            core.flush_future = future.clone();
            let stop = !self.enabled.load(Ordering::SeqCst);
            drop(core);

            // Log IO failure is fatal for the process
            if flush_size > 0 {
                self.disk_manager
                    .write_log(&flush_buffer[..flush_size])
                    .expect("write-ahead log IO failed");
                trace!("flushed {} log bytes through lsn {}", flush_size, last_lsn);
            }
            self.persistent_lsn.store(last_lsn, Ordering::SeqCst);
            future.complete();

            if stop && self.core.lock().offset == 0 {
                break;
            }
        }
    }
}

/// Write-ahead log manager: appenders serialize records into an
/// in-memory buffer; a background thread group-flushes by swapping in a
/// second buffer and writing the full one outside the mutex.
///
/// Durability contract: every record with `lsn <= persistent_lsn()` is
/// on disk.
pub struct LogManager {
    inner: Arc<LogInner>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self {
            inner: Arc::new(LogInner {
                disk_manager,
                core: Mutex::new(LogCore {
                    log_buffer: vec![0u8; LOG_BUFFER_SIZE],
                    offset: 0,
                    next_lsn: 0,
                    flush_future: FlushFuture::completed(),
                }),
                flush_cv: Condvar::new(),
                persistent_lsn: AtomicI32::new(INVALID_LSN),
                enabled: AtomicBool::new(false),
            }),
            flush_thread: Mutex::new(None),
        }
    }

    /// Whether logging is currently on (flush thread running).
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Highest LSN known durable on disk.
    pub fn persistent_lsn(&self) -> Lsn {
        self.inner.persistent_lsn.load(Ordering::SeqCst)
    }

    /// LSN the next appended record will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.inner.core.lock().next_lsn
    }

    /// Start the background flush thread and enable logging.
    pub fn run_flush_thread(&self) {
        if self.inner.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || inner.flush_loop());
        *self.flush_thread.lock() = Some(handle);
    }

    /// Disable logging and join the flush thread; buffered records are
    /// flushed on the way out.
    pub fn stop_flush_thread(&self) {
        if !self.inner.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.flush_cv.notify_one();
        if let Some(handle) = self.flush_thread.lock().take() {
            handle.join().expect("log flush thread panicked");
        }
    }

    /// Append one record, assigning its LSN. When the record does not
    /// fit, the appender kicks the flusher and waits on the in-progress
    /// flush before re-testing.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Lsn {
        let size = record.size as usize;
        debug_assert!(size <= LOG_BUFFER_SIZE);

        let mut core = self.inner.core.lock();
        while core.offset + size > LOG_BUFFER_SIZE {
            self.inner.flush_cv.notify_one();
            let future = core.flush_future.clone();
            drop(core);
            future.wait();
            core = self.inner.core.lock();
        }

        record.lsn = core.next_lsn;
        core.next_lsn += 1;
        let offset = core.offset;
        record.serialize_into(&mut core.log_buffer[offset..offset + size]);
        core.offset += size;
        record.lsn
    }

    /// Kick the flusher and wait for the current flush to complete. Used
    /// by the buffer pool before writing a page whose LSN is past the
    /// persistent LSN, and by commit/abort to make their record durable.
    pub fn force_flush_and_wait(&self) {
        let future = {
            let core = self.inner.core.lock();
            self.inner.flush_cv.notify_one();
            core.flush_future.clone()
        };
        future.wait();
    }

    /// Wait for the in-progress flush without forcing one.
    pub fn wait_for_flush(&self) {
        let future = self.inner.core.lock().flush_future.clone();
        future.wait();
    }

    /// Block until every record up to and including `lsn` is durable.
    pub fn flush_till_lsn(&self, lsn: Lsn) {
        while self.persistent_lsn() < lsn {
            self.force_flush_and_wait();
        }
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.stop_flush_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Rid;
    use crate::storage::tuple::Tuple;
    use crate::transaction::wal::log_record::LOG_HEADER_SIZE;
    use tempfile::NamedTempFile;

    fn test_log_manager() -> (Arc<LogManager>, Arc<DiskManager>, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let disk = Arc::new(DiskManager::new(file.path()).unwrap());
        (Arc::new(LogManager::new(disk.clone())), disk, file)
    }

    #[test]
    fn test_lsn_assignment_is_monotonic() {
        let (log_manager, _disk, _file) = test_log_manager();

        let mut begin = LogRecord::new_begin(1);
        let mut insert = LogRecord::new_insert(1, 0, Rid::new(2, 0), Tuple::from_bytes(b"x"));
        let lsn0 = log_manager.append_log_record(&mut begin);
        let lsn1 = log_manager.append_log_record(&mut insert);
        assert_eq!(lsn0, 0);
        assert_eq!(lsn1, 1);
        assert_eq!(log_manager.next_lsn(), 2);
    }

    #[test]
    fn test_flush_advances_persistent_lsn() {
        let (log_manager, disk, _file) = test_log_manager();
        log_manager.run_flush_thread();

        let mut record = LogRecord::new_begin(3);
        let lsn = log_manager.append_log_record(&mut record);
        log_manager.flush_till_lsn(lsn);
        assert!(log_manager.persistent_lsn() >= lsn);

        log_manager.stop_flush_thread();
        assert_eq!(disk.log_size().unwrap(), record.size as u64);
    }

    #[test]
    fn test_stop_flushes_tail() {
        let (log_manager, disk, _file) = test_log_manager();
        log_manager.run_flush_thread();

        for txn in 0..8 {
            let mut record = LogRecord::new_begin(txn);
            log_manager.append_log_record(&mut record);
        }
        log_manager.stop_flush_thread();

        assert_eq!(disk.log_size().unwrap(), 8 * LOG_HEADER_SIZE as u64);
        assert_eq!(log_manager.persistent_lsn(), 7);
    }
}
