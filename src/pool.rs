//src/pool.rs
//
// Fixed-size worker pool for one pass over a line-oriented file.
//
// Every worker loops over three steps:
//   1. lock the shared cursor, take the next line, unlock
//   2. parse the line with no lock held
//   3. lock the shared state, merge the parsed item, unlock
// A worker stops when the cursor reports end of input. The two locks are
// independent; neither is ever held while the other is taken.

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{PivotError, RecordError, Result};
use crate::input::LineCursor;
use crate::types::ScanStats;

#[derive(Default)]
struct Counters {
    lines: AtomicU64,
    kept: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ScanStats {
        ScanStats {
            lines: self.lines.load(Ordering::Relaxed),
            kept: self.kept.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Shared, read-only pieces of one pass.
struct Pass<'a, R, S, P, M> {
    path: &'a Path,
    cursor: Mutex<LineCursor<R>>,
    state: &'a Mutex<S>,
    parse: &'a P,
    merge: &'a M,
    counters: Counters,
    failure: Mutex<Option<PivotError>>,
    stop: AtomicBool,
}

/// Run `threads` workers over every remaining line of `reader`.
///
/// `parse` receives the line's sequence number (0-based, file order) and its
/// text. `Ok(None)` filters the line out, `Err` rejects it; neither stops the
/// pass. `merge` runs inside the state lock. The first read or merge error
/// stops all workers and is returned.
pub fn scan_lines<R, S, T, P, M>(
    path: &Path,
    reader: R,
    threads: usize,
    state: &Mutex<S>,
    parse: P,
    merge: M,
) -> Result<ScanStats>
where
    R: BufRead + Send,
    S: Send,
    P: Fn(u64, &str) -> std::result::Result<Option<T>, RecordError> + Sync,
    M: Fn(&mut S, T) -> Result<()> + Sync,
{
    let threads = threads.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

    let pass = Pass {
        path,
        cursor: Mutex::new(LineCursor::new(reader)),
        state,
        parse: &parse,
        merge: &merge,
        counters: Counters::default(),
        failure: Mutex::new(None),
        stop: AtomicBool::new(false),
    };

    pool.scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|_| pass.run_worker());
        }
    });

    if let Some(err) = pass.failure.into_inner() {
        return Err(err);
    }
    let stats = pass.counters.snapshot();
    log::debug!(
        "{}: {} lines, {} kept, {} skipped, {} rejected",
        path.display(),
        stats.lines,
        stats.kept,
        stats.skipped,
        stats.rejected
    );
    Ok(stats)
}

impl<'a, R, S, T, P, M> Pass<'a, R, S, P, M>
where
    R: BufRead,
    P: Fn(u64, &str) -> std::result::Result<Option<T>, RecordError>,
    M: Fn(&mut S, T) -> Result<()>,
{
    fn run_worker(&self) {
        let mut buf = Vec::new();

        while !self.stop.load(Ordering::Relaxed) {
            let next = self.cursor.lock().next_line(&mut buf);
            let seq = match next {
                Ok(Some(seq)) => seq,
                Ok(None) => break,
                Err(e) => {
                    self.fail(PivotError::io(self.path, e));
                    break;
                }
            };
            self.counters.lines.fetch_add(1, Ordering::Relaxed);

            let parsed = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Ok(line) => (self.parse)(seq, line),
                Err(_) => Err(RecordError::InvalidUtf8),
            };

            match parsed {
                Ok(Some(item)) => {
                    let merged = {
                        let mut state = self.state.lock();
                        (self.merge)(&mut *state, item)
                    };
                    if let Err(e) = merged {
                        self.fail(e);
                        break;
                    }
                    self.counters.kept.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{}: record #{} rejected: {}", self.path.display(), seq, e);
                }
            }
        }
    }

    fn fail(&self, err: PivotError) {
        self.stop.store(true, Ordering::Relaxed);
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}
