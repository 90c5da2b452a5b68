//! Blocking front for the async pipelines.
//!
//! A [`Dispatcher`] owns a tokio runtime on a dedicated thread. Callers on
//! ordinary threads submit [`Job`]s over a queue and block on a oneshot
//! reply. Each job runs as its own task, so jobs from different callers
//! proceed concurrently. Jobs are never cancelled once accepted; shutdown
//! waits for every accepted job to finish.

use bytes::Bytes;
use chanstore_core::{ChannelRef, StoreError, StoreResult};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::download::DownloadOutput;
use crate::store::ChannelStore;
use crate::upload::{FolderEntry, UploadReport};

#[derive(Debug, Clone)]
pub enum Job {
    UploadFile {
        channel: ChannelRef,
        logical_name: String,
        data: Bytes,
        secure: bool,
    },
    UploadFolder {
        channel: ChannelRef,
        folder_name: String,
        entries: Vec<FolderEntry>,
        secure: bool,
    },
    Download {
        channel: ChannelRef,
        requested: String,
    },
    Delete {
        channel: ChannelRef,
        logical_name: String,
    },
    List {
        channel: ChannelRef,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::UploadFile { .. } => "upload_file",
            Job::UploadFolder { .. } => "upload_folder",
            Job::Download { .. } => "download",
            Job::Delete { .. } => "delete",
            Job::List { .. } => "list",
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobOutput {
    Uploaded(UploadReport),
    Downloaded(DownloadOutput),
    Deleted(bool),
    Listed(Vec<CatalogEntry>),
}

struct Envelope {
    job: Job,
    reply: oneshot::Sender<StoreResult<JobOutput>>,
}

/// A submitted job's eventual result.
pub struct PendingJob {
    rx: oneshot::Receiver<StoreResult<JobOutput>>,
}

impl PendingJob {
    /// Block the calling thread until the job finishes.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> StoreResult<JobOutput> {
        self.rx
            .blocking_recv()
            .map_err(|_| stopped("job dropped before completion"))?
    }
}

fn stopped(what: &str) -> StoreError {
    StoreError::Other(anyhow::anyhow!("dispatcher stopped: {what}"))
}

fn unexpected(output: JobOutput) -> StoreError {
    StoreError::Other(anyhow::anyhow!("unexpected job output: {output:?}"))
}

pub struct Dispatcher {
    tx: Option<mpsc::UnboundedSender<Envelope>>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the runtime thread serving `store`.
    pub fn start(store: ChannelStore, worker_threads: usize) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("chanstore-worker")
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("chanstore-dispatch".into())
            .spawn(move || runtime.block_on(serve(store, rx)))?;

        info!(worker_threads, "dispatcher started");
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue `job` and return a handle to its result.
    pub fn submit(&self, job: Job) -> StoreResult<PendingJob> {
        let (reply, rx) = oneshot::channel();
        let tx = self.tx.as_ref().ok_or_else(|| stopped("already shut down"))?;
        tx.send(Envelope { job, reply })
            .map_err(|_| stopped("runtime thread exited"))?;
        Ok(PendingJob { rx })
    }

    /// Queue `job` and block until it completes.
    pub fn run(&self, job: Job) -> StoreResult<JobOutput> {
        self.submit(job)?.wait()
    }

    pub fn upload_file(
        &self,
        channel: &ChannelRef,
        logical_name: &str,
        data: impl Into<Bytes>,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        match self.run(Job::UploadFile {
            channel: channel.clone(),
            logical_name: logical_name.to_string(),
            data: data.into(),
            secure,
        })? {
            JobOutput::Uploaded(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub fn upload_folder(
        &self,
        channel: &ChannelRef,
        folder_name: &str,
        entries: Vec<FolderEntry>,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        match self.run(Job::UploadFolder {
            channel: channel.clone(),
            folder_name: folder_name.to_string(),
            entries,
            secure,
        })? {
            JobOutput::Uploaded(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub fn download(&self, channel: &ChannelRef, requested: &str) -> StoreResult<DownloadOutput> {
        match self.run(Job::Download {
            channel: channel.clone(),
            requested: requested.to_string(),
        })? {
            JobOutput::Downloaded(output) => Ok(output),
            other => Err(unexpected(other)),
        }
    }

    pub fn delete(&self, channel: &ChannelRef, logical_name: &str) -> StoreResult<bool> {
        match self.run(Job::Delete {
            channel: channel.clone(),
            logical_name: logical_name.to_string(),
        })? {
            JobOutput::Deleted(deleted) => Ok(deleted),
            other => Err(unexpected(other)),
        }
    }

    pub fn list(&self, channel: &ChannelRef) -> StoreResult<Vec<CatalogEntry>> {
        match self.run(Job::List {
            channel: channel.clone(),
        })? {
            JobOutput::Listed(entries) => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    /// Stop accepting jobs and wait for accepted ones to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(store: ChannelStore, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(Envelope { job, reply }) = envelope else {
                    break;
                };
                let store = store.clone();
                running.spawn(async move {
                    let kind = job.kind();
                    let result = execute(&store, job).await;
                    if let Err(e) = &result {
                        debug!(job = kind, "job failed: {e}");
                    }
                    // caller may have given up waiting
                    let _ = reply.send(result);
                });
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    warn!("job task aborted: {e}");
                }
            }
        }
    }

    while let Some(joined) = running.join_next().await {
        if let Err(e) = joined {
            warn!("job task aborted: {e}");
        }
    }
    info!("dispatcher drained");
}

async fn execute(store: &ChannelStore, job: Job) -> StoreResult<JobOutput> {
    match job {
        Job::UploadFile {
            channel,
            logical_name,
            data,
            secure,
        } => store
            .upload_file(&channel, &logical_name, data, secure)
            .await
            .map(JobOutput::Uploaded),
        Job::UploadFolder {
            channel,
            folder_name,
            entries,
            secure,
        } => store
            .upload_folder(&channel, &folder_name, entries, secure)
            .await
            .map(JobOutput::Uploaded),
        Job::Download { channel, requested } => store
            .download(&channel, &requested)
            .await
            .map(JobOutput::Downloaded),
        Job::Delete {
            channel,
            logical_name,
        } => store
            .delete(&channel, &logical_name)
            .await
            .map(JobOutput::Deleted),
        Job::List { channel } => store.list(&channel).await.map(JobOutput::Listed),
    }
}
