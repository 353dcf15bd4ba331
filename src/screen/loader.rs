use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hashbrown::HashMap;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::errors::{Result, ScreenError};
use crate::pixels::PixelBuffer;
use crate::registry::Handle;
use crate::screen::{Screen, TextureOptions};

/// Produces the pixels of a texture away from the drawing thread.
pub type LoadJob = Box<dyn FnOnce() -> anyhow::Result<PixelBuffer> + Send + 'static>;

/// Identifies a submitted load until its texture has been collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

struct PendingLoad {
    parent: Handle,
    options: TextureOptions,
    rx: oneshot::Receiver<anyhow::Result<PixelBuffer>>,
}

struct FinishedLoad {
    parent: Handle,
    options: TextureOptions,
    result: anyhow::Result<PixelBuffer>,
}

/// Runs texture decode jobs on helper threads.
///
/// A job owns its data until it hands the finished pixels over through a oneshot channel.
/// Textures are only ever registered by the thread that owns the [`Screen`].
pub struct TextureLoader {
    runtime: Arc<Runtime>,
    pending: HashMap<LoadTicket, PendingLoad>,
    next_ticket: u64,
}

impl TextureLoader {
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .max_blocking_threads(threads.max(1))
            .thread_name("stimgl-loader")
            .enable_all()
            .build()
            .context("failed to start the texture loader runtime")
            .map_err(ScreenError::Loader)?;
        log::debug!("Texture loader started with {threads} thread(s)");

        Ok(Self {
            runtime: Arc::new(runtime),
            pending: HashMap::new(),
            next_ticket: 1,
        })
    }

    /// Queues `job`. Its pixels become a texture of `parent` once collected.
    pub fn submit(&mut self, parent: Handle, options: TextureOptions, job: LoadJob) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;

        let (tx, rx) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            // the receiver may have given up already
            let _ = tx.send(job());
        });
        self.pending.insert(ticket, PendingLoad { parent, options, rx });
        log::debug!("Window[{parent}]: queued {ticket}");
        ticket
    }

    /// Number of loads submitted but not yet collected.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn try_take(&mut self, ticket: LoadTicket) -> Result<Option<FinishedLoad>> {
        let entry = self.pending.get_mut(&ticket).ok_or_else(|| unknown_ticket(ticket))?;
        let result = match entry.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Closed) => {
                self.pending.remove(&ticket);
                return Err(ScreenError::Loader(anyhow::anyhow!("{ticket} ended without a result")));
            }
        };
        let entry = self.pending.remove(&ticket).ok_or_else(|| unknown_ticket(ticket))?;
        Ok(Some(FinishedLoad {
            parent: entry.parent,
            options: entry.options,
            result,
        }))
    }

    fn wait(&mut self, ticket: LoadTicket, timeout: Duration) -> Result<FinishedLoad> {
        let entry = self.pending.get_mut(&ticket).ok_or_else(|| unknown_ticket(ticket))?;
        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, &mut entry.rx).await });
        let result = match received {
            Err(_) => return Err(ScreenError::Timeout(timeout)),
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow::anyhow!("{ticket} ended without a result")),
        };
        let entry = self.pending.remove(&ticket).ok_or_else(|| unknown_ticket(ticket))?;
        Ok(FinishedLoad {
            parent: entry.parent,
            options: entry.options,
            result,
        })
    }
}

fn unknown_ticket(ticket: LoadTicket) -> ScreenError {
    ScreenError::invalid_argument("ticket", format!("{ticket} is not pending"))
}

impl Screen {
    /// Runs `job` on the loader and returns a ticket for collecting the texture.
    pub fn load_texture_async(&mut self, parent: Handle, options: TextureOptions, job: LoadJob) -> Result<LoadTicket> {
        self.registry.lookup(parent)?;
        Ok(self.loader()?.submit(parent, options, job))
    }

    /// Decodes a PNG file on the loader.
    pub fn load_png_async(&mut self, parent: Handle, path: impl AsRef<Path>) -> Result<LoadTicket> {
        let path = path.as_ref().to_path_buf();
        let job: LoadJob = Box::new(move || {
            let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
            PixelBuffer::from_png(BufReader::new(file)).with_context(|| format!("failed to decode {}", path.display()))
        });
        self.load_texture_async(parent, TextureOptions::default(), job)
    }

    /// Registers the texture of a finished load. `None` while the job still runs.
    pub fn poll_texture(&mut self, ticket: LoadTicket) -> Result<Option<Handle>> {
        let loader = self.loader.as_mut().ok_or_else(|| unknown_ticket(ticket))?;
        match loader.try_take(ticket)? {
            Some(done) => self.register_loaded(ticket, done).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks until a load finished, then registers its texture.
    pub fn wait_texture(&mut self, ticket: LoadTicket, timeout: Duration) -> Result<Handle> {
        let loader = self.loader.as_mut().ok_or_else(|| unknown_ticket(ticket))?;
        let done = loader.wait(ticket, timeout)?;
        self.register_loaded(ticket, done)
    }

    fn register_loaded(&mut self, ticket: LoadTicket, done: FinishedLoad) -> Result<Handle> {
        let pixels = done.result.map_err(ScreenError::Loader)?;
        let handle = self.make_texture_with(done.parent, pixels, done.options)?;
        log::debug!("Window[{}]: {ticket} became texture {handle}", done.parent);
        Ok(handle)
    }

    fn loader(&mut self) -> Result<&mut TextureLoader> {
        let loader = match self.loader.take() {
            Some(loader) => loader,
            None => TextureLoader::new(self.config.loader_threads)?,
        };
        Ok(self.loader.insert(loader))
    }
}
