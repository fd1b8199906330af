use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is the blocking pager: it reads and writes fixed-size pages
/// of a single database file, addressed by page ID. It does not allocate
/// page IDs; that is the buffer pool's job. Deallocation is bookkeeping
/// only, identifiers are never reused.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: PathBuf,
    /// Number of page reads served
    num_reads: AtomicU32,
    /// Number of page writes served
    num_writes: AtomicU32,
    /// Number of deallocation notices received
    num_deallocations: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            db_file: Mutex::new(db_file),
            db_path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_deallocations: AtomicU32::new(0),
        })
    }

    /// Reads one page into `data`. Reading past the end of the file yields
    /// zeroes, so freshly allocated pages read back blank.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes one page from `data` and flushes it to the file.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Records that a page identifier has been retired. Space is not
    /// reclaimed and identifiers are not reused.
    pub fn deallocate_page(&self, _page_id: PageId) {
        self.num_deallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn num_deallocations(&self) -> u32 {
        self.num_deallocations.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces all written data down to the device.
    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}
