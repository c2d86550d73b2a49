use crate::error::{ArchiveError, ArchiveResult};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use std::thread;

/// Bounded hand-off queue between two stages.
pub fn queue<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel::bounded(capacity.max(1))
}

/// A set of worker threads sharing one error channel and one completion
/// channel.
///
/// Every spawned stage reports exactly once: its error, or a completion
/// tick. [`Pipeline::drive`] consumes the final queue until all stages have
/// ticked or one of them failed. Threads are not joined; once the driver
/// returns, stages still running stop at their next send.
pub struct Pipeline {
    err_tx: Sender<ArchiveError>,
    err_rx: Receiver<ArchiveError>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    spawned: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        let (err_tx, err_rx) = channel::unbounded();
        let (done_tx, done_rx) = channel::unbounded();
        Self {
            err_tx,
            err_rx,
            done_tx,
            done_rx,
            spawned: 0,
        }
    }

    pub fn spawn<F>(&mut self, name: &str, work: F) -> ArchiveResult<()>
    where
        F: FnOnce() -> ArchiveResult<()> + Send + 'static,
    {
        let err_tx = self.err_tx.clone();
        let done_tx = self.done_tx.clone();
        thread::Builder::new()
            .name(format!("scx-{name}"))
            .spawn(move || match work() {
                Ok(()) => {
                    let _ = done_tx.send(());
                }
                Err(err) => {
                    let _ = err_tx.send(err);
                }
            })
            .map_err(|_| ArchiveError::Pipeline(name.to_string()))?;
        self.spawned += 1;
        Ok(())
    }

    /// Feed every item of `output` to `sink` until all stages complete.
    ///
    /// The first stage error, or the first sink error, is returned as is.
    /// Items still buffered when the last completion arrives are drained
    /// before returning.
    pub fn drive<T, F>(self, output: Receiver<T>, mut sink: F) -> ArchiveResult<()>
    where
        F: FnMut(T) -> ArchiveResult<()>,
    {
        let Self {
            err_tx,
            err_rx,
            done_tx,
            done_rx,
            spawned,
        } = self;
        drop(err_tx);
        drop(done_tx);

        let mut remaining = spawned;
        if remaining == 0 {
            return output.try_iter().try_for_each(&mut sink);
        }

        let closed = channel::never::<T>();
        let mut output_open = true;
        loop {
            // Once the queue closes only the report channels are watched.
            let live = if output_open { &output } else { &closed };
            select! {
                recv(live) -> item => match item {
                    Ok(item) => sink(item)?,
                    Err(_) => output_open = false,
                },
                recv(err_rx) -> err => {
                    if let Ok(err) = err {
                        return Err(err);
                    }
                }
                recv(done_rx) -> tick => match tick {
                    Ok(()) => {
                        remaining -= 1;
                        if remaining == 0 {
                            return output.try_iter().try_for_each(&mut sink);
                        }
                    }
                    Err(_) => {
                        if let Ok(err) = err_rx.try_recv() {
                            return Err(err);
                        }
                        return Err(ArchiveError::Pipeline(format!(
                            "{remaining} of {spawned}"
                        )));
                    }
                },
            }
        }
    }
}
