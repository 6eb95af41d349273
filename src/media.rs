use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::blocking::Client;

use crate::data::{ImageResult, ImageService, LoadedImage, Reply};
use crate::handle::Handle;

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub timeout: Duration,
    pub max_bytes: u64,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 2,
            timeout: Duration::from_secs(30),
            max_bytes: 20 * 1024 * 1024,
            http_client: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media: no image source")]
    MissingSource,
    #[error("media: request failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("media: image exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

struct Job {
    source: String,
    reply: Reply<ImageResult>,
}

struct Inner {
    cfg: Config,
    client: Client,
}

/// Thread pool that fetches and decodes thumbnails off the owner thread.
pub struct Loader {
    jobs: Sender<Job>,
    stop: Sender<()>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Loader {
    pub fn new(cfg: Config) -> Result<Self> {
        let mut cfg = cfg;
        if cfg.workers == 0 {
            cfg.workers = 2;
        }

        let client = if let Some(client) = cfg.http_client.clone() {
            client
        } else {
            Client::builder()
                .timeout(cfg.timeout)
                .user_agent(format!("postcell/{}", crate::VERSION))
                .build()
                .context("media: build http client")?
        };

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();
        let inner = Arc::new(Inner { cfg, client });

        let mut handles = Vec::new();
        for _ in 0..inner.cfg.workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Ok(Self {
            jobs: job_tx,
            stop: stop_tx,
            handles,
        })
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ImageService for Loader {
    fn load(&self, source: Option<&str>, reply: Reply<ImageResult>) -> Handle {
        let handle = reply.ticket().clone();
        match source.map(str::trim).filter(|s| !s.is_empty()) {
            Some(source) => {
                let job = Job {
                    source: source.to_string(),
                    reply,
                };
                if let Err(err) = self.jobs.send(job) {
                    let job = err.into_inner();
                    job.reply
                        .send(Err(anyhow::anyhow!("media: loader stopped")));
                }
            }
            None => {
                reply.send(Err(MediaError::MissingSource.into()));
            }
        }
        handle
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        if job.reply.is_cancelled() {
            return;
        }
        let result = self.fetch(&job.source);
        if job.reply.is_cancelled() {
            return;
        }
        if let Err(err) = &result {
            tracing::warn!(source = %job.source, "image load failed: {err:#}");
        }
        job.reply.send(result);
    }

    fn fetch(&self, source: &str) -> Result<LoadedImage> {
        let bytes = if is_remote(source) {
            self.download(source)?
        } else {
            let path = source.strip_prefix("file://").unwrap_or(source);
            fs::read(path).with_context(|| format!("media: read {path}"))?
        };
        if bytes.len() as u64 > self.cfg.max_bytes {
            return Err(MediaError::TooLarge {
                limit: self.cfg.max_bytes,
            }
            .into());
        }

        let image = image::load_from_memory(&bytes).context("media: decode")?;
        Ok(LoadedImage {
            source: source.to_string(),
            image: Arc::new(image),
        })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .context("media: download")?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status()).into());
        }

        let mut bytes = Vec::new();
        response
            .take(self.cfg.max_bytes + 1)
            .read_to_end(&mut bytes)
            .context("media: body")?;
        Ok(bytes)
    }
}

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Completion, Payload};
    use crate::state::Slot;
    use tempfile::tempdir;

    fn loader() -> Loader {
        Loader::new(Config {
            workers: 1,
            ..Config::default()
        })
        .unwrap()
    }

    fn recv(rx: &Receiver<Completion>) -> Option<ImageResult> {
        match rx.recv_timeout(Duration::from_secs(5)).ok()?.payload {
            Payload::Image(result) => Some(result),
            _ => None,
        }
    }

    #[test]
    fn loads_local_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        image::RgbImage::new(3, 2).save(&path).unwrap();
        let source = path.to_string_lossy().to_string();

        let (tx, rx) = unbounded();
        let loader = loader();
        loader.load(Some(&source), Reply::new(tx, Slot::Thumbnail, 1, Handle::new()));

        let loaded = recv(&rx).expect("completion").expect("decoded image");
        assert_eq!(loaded.source, source);
        assert_eq!(loaded.image.width(), 3);
    }

    #[test]
    fn missing_source_is_an_error() {
        let (tx, rx) = unbounded();
        let loader = loader();
        loader.load(None, Reply::new(tx, Slot::Thumbnail, 1, Handle::new()));

        let err = recv(&rx).expect("completion").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::MissingSource)
        ));
    }

    #[test]
    fn cancelled_request_never_replies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        image::RgbImage::new(1, 1).save(&path).unwrap();

        let (tx, rx) = unbounded();
        let ticket = Handle::new();
        ticket.cancel();
        let loader = loader();
        loader.load(
            Some(&path.to_string_lossy()),
            Reply::new(tx, Slot::Thumbnail, 1, ticket),
        );

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn undecodable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not an image").unwrap();

        let (tx, rx) = unbounded();
        let loader = loader();
        loader.load(
            Some(&path.to_string_lossy()),
            Reply::new(tx, Slot::Thumbnail, 1, Handle::new()),
        );

        assert!(recv(&rx).expect("completion").is_err());
    }
}
