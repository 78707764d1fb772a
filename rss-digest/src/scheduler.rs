use crate::digest::{DigestAccumulator, DigestRecord};
use crate::parser::{extract_articles, EntryExtractor};
use crate::state::{State, StateStore};
use crate::traits::{ArticleExtractor, FeedTransport};
use crate::types::{
    Article, DigestError, FeedError, FeedOutcome, FeedSource, Result, RunSummary, SchedulerConfig,
};
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches a batch of feeds with a fixed pool of workers and funnels every
/// result through one collector, which is the only code touching the seen
/// state and the pending digest.
pub struct FeedFetchScheduler {
    transport: Arc<dyn FeedTransport>,
    extractor: Arc<dyn ArticleExtractor>,
    state_store: StateStore,
    digest: DigestAccumulator,
    config: SchedulerConfig,
    fetch_timeout: Duration,
}

impl FeedFetchScheduler {
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        state_store: StateStore,
        digest: DigestAccumulator,
    ) -> Self {
        Self {
            transport,
            extractor: Arc::new(EntryExtractor),
            state_store,
            digest,
            config: SchedulerConfig::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArticleExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Upper bound for a single feed's fetch + parse.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run against today's (local date) digest.
    pub async fn run(
        &self,
        sources: &[FeedSource],
        limit: usize,
        workers: usize,
    ) -> Result<RunSummary> {
        self.run_on(Local::now().date_naive(), sources, limit, workers)
            .await
    }

    pub async fn run_on(
        &self,
        date: NaiveDate,
        sources: &[FeedSource],
        limit: usize,
        workers: usize,
    ) -> Result<RunSummary> {
        if sources.is_empty() {
            warn!("No feeds to fetch");
            return Ok(RunSummary::default());
        }

        let worker_count = workers.max(1).min(sources.len());
        let checkpoint_every = self.config.checkpoint_interval(sources.len());
        info!(
            "Fetching {} feeds with {} workers (checkpoint every {} feeds)",
            sources.len(),
            worker_count,
            checkpoint_every
        );

        let (job_sender, job_receiver) = mpsc::unbounded_channel::<FeedSource>();
        for source in sources {
            // receiver is alive until the workers below finish
            let _ = job_sender.send(source.clone());
        }
        drop(job_sender);
        let jobs = Arc::new(Mutex::new(job_receiver));

        let (outcome_sender, mut outcome_receiver) = mpsc::unbounded_channel::<FeedOutcome>();
        let job = FetchJob {
            transport: self.transport.clone(),
            extractor: self.extractor.clone(),
            limit,
            timeout: self.fetch_timeout,
        };

        let handles: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    jobs.clone(),
                    outcome_sender.clone(),
                    job.clone(),
                ))
            })
            .collect();
        drop(outcome_sender);

        let mut collector = Collector {
            state: self.state_store.load(),
            pending: DigestRecord::new(),
            summary: RunSummary {
                feeds_total: sources.len(),
                ..Default::default()
            },
            seen_cap: self.config.seen_cap,
        };

        let mut completed = 0;
        while let Some(outcome) = outcome_receiver.recv().await {
            collector.absorb(outcome);
            completed += 1;

            if completed % checkpoint_every == 0 && completed < sources.len() {
                self.checkpoint(date, &mut collector).await;
            }
        }

        for (worker_id, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!("Worker {} ended abnormally: {}", worker_id, e);
            }
        }

        if completed < sources.len() {
            warn!(
                "Only {} of {} feeds reported back",
                completed,
                sources.len()
            );
        }

        self.finish(date, collector).await
    }

    /// Mid-run persistence. Failures are logged; the final save retries.
    /// State is only written once every pending article is in the digest.
    async fn checkpoint(&self, date: NaiveDate, collector: &mut Collector) {
        if !collector.pending.is_empty() {
            let snapshot = collector.pending.clone();
            match self.persist_digest(date, snapshot).await {
                Ok(path) => {
                    debug!("Checkpoint digest written to {}", path.display());
                    // persisted; the next merge only needs what arrives later
                    collector.pending = DigestRecord::new();
                }
                Err(e) => {
                    error!("Checkpoint digest save failed, state not saved: {}", e);
                    return;
                }
            }
        }

        match self.persist_state(collector.state.clone()).await {
            Ok(()) => info!(
                "Checkpoint: {}/{} feeds processed",
                collector.summary.feeds_processed + collector.summary.errors.len(),
                collector.summary.feeds_total
            ),
            Err(e) => error!("Checkpoint state save failed: {}", e),
        }
    }

    /// Final persistence: digest first, then state. A failed digest save
    /// leaves state untouched so its articles come back as new next run.
    async fn finish(&self, date: NaiveDate, collector: Collector) -> Result<RunSummary> {
        let Collector {
            state,
            pending,
            mut summary,
            ..
        } = collector;

        let digest_path = self.persist_digest(date, pending).await.map_err(|e| {
            error!("Digest save failed, state not saved: {}", e);
            e
        })?;
        self.persist_state(state).await?;
        summary.digest_path = Some(digest_path);

        info!(
            "Run complete: {} new, {} skipped, {} errors across {} feeds",
            summary.new_count,
            summary.skipped_count,
            summary.errors.len(),
            summary.feeds_total
        );
        Ok(summary)
    }

    async fn persist_digest(&self, date: NaiveDate, record: DigestRecord) -> Result<PathBuf> {
        let digest = self.digest.clone();
        tokio::task::spawn_blocking(move || digest.merge(date, &record))
            .await
            .map_err(|e| DigestError::General(format!("digest save task failed: {}", e)))?
    }

    async fn persist_state(&self, state: State) -> Result<()> {
        let store = self.state_store.clone();
        tokio::task::spawn_blocking(move || store.save(&state))
            .await
            .map_err(|e| DigestError::General(format!("state save task failed: {}", e)))?
    }
}

/// Owns every piece of shared mutable run state.
struct Collector {
    state: State,
    pending: DigestRecord,
    summary: RunSummary,
    seen_cap: usize,
}

impl Collector {
    fn absorb(&mut self, outcome: FeedOutcome) {
        match outcome {
            FeedOutcome::Fetched { source, candidates } => {
                let candidate_count = candidates.len();
                let fresh = self.unseen(&source.url, candidates);
                let links: Vec<&str> = fresh.iter().map(|a| a.link.as_str()).collect();
                self.state
                    .mark_seen_capped(&source.url, links.as_slice(), self.seen_cap);

                let new_count = fresh.len();
                let skipped = candidate_count - new_count;
                if new_count > 0 {
                    self.pending.add_articles(&source.title, &source.url, fresh);
                    info!("{}: {} new articles", source.title, new_count);
                } else {
                    debug!("{}: nothing new ({} already seen)", source.title, skipped);
                }

                self.summary.feeds_processed += 1;
                self.summary.new_count += new_count;
                self.summary.skipped_count += skipped;
            }
            FeedOutcome::Failed { source, error } => {
                warn!("{}: fetch failed: {}", source.title, error);
                self.summary.errors.push(FeedError {
                    feed_title: source.title,
                    feed_url: source.url,
                    message: error.to_string(),
                });
            }
        }
    }

    /// Candidates with a link that is neither already seen nor repeated
    /// earlier in the same batch, in feed order.
    fn unseen(&self, feed_url: &str, candidates: Vec<Article>) -> Vec<Article> {
        let seen = self.state.seen_links(feed_url);
        let mut batch = HashSet::new();
        candidates
            .into_iter()
            .filter(|a| {
                !a.link.is_empty() && !seen.contains(a.link.as_str()) && batch.insert(a.link.clone())
            })
            .collect()
    }
}

#[derive(Clone)]
struct FetchJob {
    transport: Arc<dyn FeedTransport>,
    extractor: Arc<dyn ArticleExtractor>,
    limit: usize,
    timeout: Duration,
}

impl FetchJob {
    /// Never panics or errors out: every failure becomes `Failed`.
    async fn run(&self, source: FeedSource) -> FeedOutcome {
        let attempt = AssertUnwindSafe(self.candidates(&source))
            .catch_unwind()
            .await;

        match attempt {
            Ok(Ok(candidates)) => FeedOutcome::Fetched { source, candidates },
            Ok(Err(error)) => FeedOutcome::Failed { source, error },
            Err(panic) => FeedOutcome::Failed {
                source,
                error: DigestError::General(format!(
                    "feed task panicked: {}",
                    panic_message(panic.as_ref())
                )),
            },
        }
    }

    async fn candidates(&self, source: &FeedSource) -> Result<Vec<Article>> {
        let feed = match tokio::time::timeout(self.timeout, self.transport.fetch(&source.url)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(DigestError::Timeout {
                    millis: self.timeout.as_millis() as u64,
                })
            }
        };

        Ok(extract_articles(
            self.extractor.as_ref(),
            &feed.entries,
            self.limit,
        ))
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<FeedSource>>>,
    outcomes: mpsc::UnboundedSender<FeedOutcome>,
    job: FetchJob,
) {
    loop {
        let next = {
            let mut receiver = jobs.lock().await;
            receiver.recv().await
        };
        let Some(source) = next else {
            break;
        };

        debug!("Worker {} fetching {}", worker_id, source.url);
        let outcome = job.run(source).await;
        if outcomes.send(outcome).is_err() {
            warn!("Worker {}: collector is gone, stopping", worker_id);
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
