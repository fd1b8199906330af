use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{EmberError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A single disk operation. The buffers are raw pointers because the
/// request crosses a thread boundary while the submitting thread blocks on
/// the completion channel, keeping the borrow alive.
enum DiskCommand {
    Read { page_id: PageId, buf: *mut u8 },
    Write { page_id: PageId, buf: *const u8 },
}

struct DiskRequest {
    command: DiskCommand,
    done: Sender<Result<()>>,
}

// Safety: the submitting thread blocks until `done` fires, so the pointed-to
// buffer stays valid and is touched by exactly one thread at a time.
unsafe impl Send for DiskRequest {}

/// DiskScheduler funnels page I/O through a single background worker.
/// Submissions block until the worker reports completion, so callers see
/// plain blocking-pager semantics and I/O errors propagate to them.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    requests: Option<Sender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(64);

        let worker_disk = Arc::clone(&disk_manager);
        let worker = thread::spawn(move || Self::run_worker(worker_disk, receiver));

        Self {
            disk_manager,
            requests: Some(sender),
            worker: Some(worker),
        }
    }

    /// Reads a page, blocking until the worker has filled `data`.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (done, completed) = bounded(1);
        self.submit(DiskRequest {
            command: DiskCommand::Read {
                page_id,
                buf: data.as_mut_ptr(),
            },
            done,
        })?;

        completed
            .recv()
            .map_err(|_| EmberError::Scheduler(format!("read of {page_id} never completed")))?
    }

    /// Writes a page, blocking until the worker has persisted `data`.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (done, completed) = bounded(1);
        self.submit(DiskRequest {
            command: DiskCommand::Write {
                page_id,
                buf: data.as_ptr(),
            },
            done,
        })?;

        completed
            .recv()
            .map_err(|_| EmberError::Scheduler(format!("write of {page_id} never completed")))?
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        let Some(sender) = self.requests.as_ref() else {
            return Err(EmberError::Scheduler("scheduler is shut down".into()));
        };
        sender
            .send(request)
            .map_err(|_| EmberError::Scheduler("request queue disconnected".into()))
    }

    /// Worker loop: drains requests until every sender is gone.
    fn run_worker(disk_manager: Arc<DiskManager>, requests: Receiver<DiskRequest>) {
        for request in requests {
            let outcome = match request.command {
                DiskCommand::Read { page_id, buf } => {
                    // Safety: see the Send impl on DiskRequest.
                    let data = unsafe { std::slice::from_raw_parts_mut(buf, PAGE_SIZE) };
                    disk_manager.read_page(page_id, data)
                }
                DiskCommand::Write { page_id, buf } => {
                    // Safety: see the Send impl on DiskRequest.
                    let data = unsafe { std::slice::from_raw_parts(buf, PAGE_SIZE) };
                    disk_manager.write_page(page_id, data)
                }
            };
            let _ = request.done.send(outcome);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        scheduler.write_page(PageId::new(0), &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler.read_page(PageId::new(0), &mut read_data).unwrap();
        assert_eq!(read_data[0], 42);
    }

    #[test]
    fn test_scheduler_interleaved_pages() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        for i in 0..8u8 {
            let data = [i; PAGE_SIZE];
            scheduler.write_page(PageId::new(i as u32), &data).unwrap();
        }

        for i in (0..8u8).rev() {
            let mut data = [0u8; PAGE_SIZE];
            scheduler.read_page(PageId::new(i as u32), &mut data).unwrap();
            assert_eq!(data[0], i);
        }
    }
}
