//! Background worker pool with one job queue and one result queue.

use crate::common::*;

/// The per-job work done by a [WorkerPool].
pub trait JobProcessor
where
    Self: Send + Sync + 'static,
{
    type Job: Send + 'static;
    type Output: Send + 'static;

    fn process(&self, job: Self::Job, thread_id: usize) -> Result<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolInit {
    /// Prefix of worker thread names.
    pub name: String,
    pub num_workers: usize,
    /// Bound of both queues. Callers keep the number of outstanding jobs
    /// within this bound, otherwise `push_job` blocks.
    pub capacity: usize,
}

impl WorkerPoolInit {
    pub fn build<P>(self, processor: Arc<P>) -> Result<WorkerPool<P>>
    where
        P: JobProcessor,
    {
        let Self {
            name,
            num_workers,
            capacity,
        } = self;
        ensure!(num_workers > 0, "the number of workers must be positive");
        ensure!(capacity > 0, "the queue capacity must be positive");

        let (job_tx, job_rx) = flume::bounded::<P::Job>(capacity);
        let (result_tx, result_rx) = flume::bounded(capacity);
        let abort = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..num_workers)
            .map(|thread_id| {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let abort = abort.clone();
                let processor = processor.clone();

                thread::Builder::new()
                    .name(format!("{}-{}", name, thread_id))
                    .spawn(move || {
                        while let Ok(job) = job_rx.recv() {
                            if abort.load(atomic::Ordering::SeqCst) {
                                break;
                            }
                            let result = processor.process(job, thread_id);
                            if result_tx.send(result).is_err() {
                                break;
                            }
                        }
                    })
            })
            .collect::<io::Result<_>>()?;

        debug!("started worker pool '{}' with {} workers", name, num_workers);

        Ok(WorkerPool {
            name,
            job_tx: Some(job_tx),
            result_rx: Some(result_rx),
            peeked: None,
            abort,
            workers,
        })
    }
}

/// Persistent worker threads fed through bounded channels.
///
/// Results are delivered in completion order. With more than one worker it
/// may differ from the order in which jobs were pushed.
pub struct WorkerPool<P>
where
    P: JobProcessor,
{
    name: String,
    job_tx: Option<flume::Sender<P::Job>>,
    result_rx: Option<flume::Receiver<Result<P::Output>>>,
    peeked: Option<Result<P::Output>>,
    abort: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl<P> WorkerPool<P>
where
    P: JobProcessor,
{
    pub fn push_job(&self, job: P::Job) -> Result<()> {
        let job_tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| format_err!("worker pool '{}' is aborted", self.name))?;
        job_tx
            .send(job)
            .map_err(|_| format_err!("workers of pool '{}' are gone", self.name))?;
        Ok(())
    }

    /// Blocks until a result is available and removes it.
    pub fn pop_result(&mut self) -> Result<P::Output> {
        match self.peeked.take() {
            Some(result) => result,
            None => self.recv_result()?,
        }
    }

    /// Blocks until a result is available without removing it.
    pub fn peek_result(&mut self) -> Result<&P::Output> {
        if self.peeked.is_none() {
            let result = self.recv_result()?;
            self.peeked = Some(result);
        }

        match &self.peeked {
            Some(Ok(output)) => Ok(output),
            Some(Err(err)) => Err(format_err!("{:#}", err)),
            None => unreachable!(),
        }
    }

    /// Stops and joins every worker, then drops pending jobs and results.
    pub fn abort_all(&mut self) {
        if self.job_tx.is_none() {
            return;
        }
        self.abort.store(true, atomic::Ordering::SeqCst);

        // disconnecting both queues wakes workers blocked on either side
        self.job_tx = None;
        self.result_rx = None;
        self.peeked = None;

        self.workers.drain(..).for_each(|worker| {
            if worker.join().is_err() {
                warn!("a worker of pool '{}' panicked", self.name);
            }
        });
        debug!("worker pool '{}' is aborted", self.name);
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    fn recv_result(&self) -> Result<Result<P::Output>> {
        let result_rx = self
            .result_rx
            .as_ref()
            .ok_or_else(|| format_err!("worker pool '{}' is aborted", self.name))?;
        let result = result_rx
            .recv()
            .map_err(|_| format_err!("workers of pool '{}' are gone", self.name))?;
        Ok(result)
    }
}

impl<P> Drop for WorkerPool<P>
where
    P: JobProcessor,
{
    fn drop(&mut self) {
        if self.job_tx.is_some() {
            warn!(
                "worker pool '{}' is dropped without abort_all(), aborting now",
                self.name
            );
            self.abort_all();
        }
    }
}

impl<P> Debug for WorkerPool<P>
where
    P: JobProcessor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("num_workers", &self.workers.len())
            .field("aborted", &self.job_tx.is_none())
            .finish()
    }
}
